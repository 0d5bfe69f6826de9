//! # pqid-native
//!
//! The native signing engine behind pqid.
//!
//! The identity orchestrator never touches key material through Rust
//! references. It talks to an engine that owns a separate linear heap and
//! exposes two capabilities:
//!
//! - [`NativeHeap`]: `malloc` / `free` / copy in / copy out by 32-bit address
//! - [`NativeEngine`]: eight ML-DSA-65 primitives over heap addresses
//!
//! [`SoftwareEngine`] implements both in-process on top of `pqid-crypto`,
//! producing the binary CSR and certificate layouts in [`record`].
//!
//! ## Usage
//!
//! ```rust,ignore
//! use pqid_native::{create_software_engine, EngineConfig, NativeEngine, NativeHeap};
//!
//! let engine = create_software_engine(&EngineConfig::default())?;
//! let private_key = engine.malloc(4032);
//! let public_key = engine.malloc(1952);
//! assert!(engine.generate_keypair(private_key, public_key));
//! let public = engine.read_memory(public_key, 1952)?;
//! engine.free(private_key);
//! engine.free(public_key);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)] // Allow Type in module::Type
#![allow(clippy::must_use_candidate)] // Not all functions need must_use

mod config;
mod engine;
mod error;
mod factory;
mod heap;
mod software;

/// Binary CSR and certificate records.
pub mod record;

pub use config::{EngineConfig, DEFAULT_INITIAL_MEMORY, DEFAULT_MAX_MEMORY, PAGE_SIZE};
pub use engine::{NativeEngine, NativeHeap};
pub use error::EngineError;
pub use factory::create_software_engine;
pub use heap::{HeapStats, LinearMemory, Ptr, ALIGNMENT, NULL, POINTER_SIZE};
pub use software::SoftwareEngine;
