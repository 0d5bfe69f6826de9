//! Engine lifecycle.
//!
//! An engine moves `Uninitialized -> Initializing -> Ready` exactly once.
//! Concurrent callers of [`LifecycleGuard::initialize`] share one load; a
//! failed load returns the guard to `Uninitialized` so a later call can retry.
//!
//! Loading ends with a heap probe (allocate, write, read back, free) so an
//! engine with a broken heap is rejected here rather than on first use.

use std::sync::atomic::{AtomicU8, Ordering};

use async_trait::async_trait;
use pqid_native::{create_software_engine, EngineConfig, NativeEngine, NativeHeap, SoftwareEngine};
use tokio::sync::{Mutex, OnceCell};
use tracing::{info, warn};

use crate::arena::ForeignArena;
use crate::error::PkiError;

const PROBE_PATTERN: &[u8] = b"pqid-heap-probe\x00\xa5\x5a";

/// Lifecycle state of an engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LifecycleState {
    /// No engine loaded.
    Uninitialized = 0,
    /// A load is in progress.
    Initializing = 1,
    /// Engine loaded and probed.
    Ready = 2,
}

impl LifecycleState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Initializing,
            2 => Self::Ready,
            _ => Self::Uninitialized,
        }
    }
}

/// Source of a native engine.
#[async_trait]
pub trait EngineLoader: Send + Sync {
    /// Engine type produced.
    type Engine: NativeEngine;

    /// Load and return a fresh engine.
    async fn load(&self) -> Result<Self::Engine, PkiError>;
}

/// Loads the in-process [`SoftwareEngine`].
#[derive(Debug, Clone, Default)]
pub struct SoftwareEngineLoader {
    config: EngineConfig,
}

impl SoftwareEngineLoader {
    /// Loader with a custom heap configuration.
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl EngineLoader for SoftwareEngineLoader {
    type Engine = SoftwareEngine;

    async fn load(&self) -> Result<SoftwareEngine, PkiError> {
        create_software_engine(&self.config).map_err(|e| PkiError::initialization(e.to_string()))
    }
}

/// Holds the engine once loaded and serializes access to it.
pub struct LifecycleGuard<E> {
    engine: OnceCell<Mutex<E>>,
    state: AtomicU8,
}

impl<E: NativeEngine> LifecycleGuard<E> {
    /// A guard with no engine.
    #[must_use]
    pub fn new() -> Self {
        Self {
            engine: OnceCell::new(),
            state: AtomicU8::new(LifecycleState::Uninitialized as u8),
        }
    }

    /// Current state.
    pub fn state(&self) -> LifecycleState {
        if self.engine.initialized() {
            LifecycleState::Ready
        } else {
            LifecycleState::from_u8(self.state.load(Ordering::Acquire))
        }
    }

    /// Load the engine if not already loaded.
    ///
    /// # Errors
    ///
    /// Returns [`PkiError::InitializationFailed`] if loading or the heap probe
    /// fails. The guard stays `Uninitialized` in that case.
    pub async fn initialize<L>(&self, loader: &L) -> Result<(), PkiError>
    where
        L: EngineLoader<Engine = E> + ?Sized,
    {
        if self.engine.initialized() {
            return Ok(());
        }

        self.engine
            .get_or_try_init(|| async {
                self.state
                    .store(LifecycleState::Initializing as u8, Ordering::Release);
                info!("Lifecycle: loading native engine");

                let engine = loader.load().await?;
                probe_heap(&engine)?;

                info!("Lifecycle: native engine ready");
                Ok::<_, PkiError>(Mutex::new(engine))
            })
            .await
            .map(|_| ())
            .map_err(|e| {
                self.state
                    .store(LifecycleState::Uninitialized as u8, Ordering::Release);
                warn!(error = %e, "Lifecycle: engine initialization failed");
                match e {
                    PkiError::InitializationFailed { .. } => e,
                    other => PkiError::initialization(other.to_string()),
                }
            })
    }

    /// The loaded engine.
    ///
    /// # Errors
    ///
    /// Returns [`PkiError::NotInitialized`] unless the state is `Ready`.
    pub fn engine(&self) -> Result<&Mutex<E>, PkiError> {
        self.engine.get().ok_or(PkiError::NotInitialized)
    }
}

impl<E: NativeEngine> Default for LifecycleGuard<E> {
    fn default() -> Self {
        Self::new()
    }
}

fn probe_heap<E: NativeHeap + ?Sized>(engine: &E) -> Result<(), PkiError> {
    let mut arena = ForeignArena::new(engine);
    let buffer = arena
        .allocate_bytes(PROBE_PATTERN)
        .map_err(|e| PkiError::initialization(format!("heap probe: {e}")))?;
    let echoed = arena
        .read_bytes(buffer, PROBE_PATTERN.len())
        .map_err(|e| PkiError::initialization(format!("heap probe: {e}")))?;
    if echoed != PROBE_PATTERN {
        return Err(PkiError::initialization(
            "heap probe: read back different bytes",
        ));
    }
    Ok(())
}
