//! Test doubles: an allocation-tracking engine and counting loaders.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use pqid_core::{
    EngineConfig, EngineError, EngineLoader, HeapStats, IdentityEngine, NativeEngine, NativeHeap,
    PkiConfig, PkiError, Ptr, SoftwareEngine, SoftwareEngineLoader, SubjectInfo,
};
use pqid_native::NULL;

/// Fault switches shared between a test and the engine it drives.
#[derive(Debug, Default)]
pub struct Faults {
    mallocs: AtomicUsize,
    fail_at: AtomicUsize,
    fail_primitives: AtomicBool,
}

impl Faults {
    /// Return null from the `n`th malloc from now on (1-based).
    pub fn fail_nth_malloc(&self, n: usize) {
        self.mallocs.store(0, Ordering::SeqCst);
        self.fail_at.store(n, Ordering::SeqCst);
    }

    /// Stop failing allocations.
    pub fn disarm(&self) {
        self.fail_at.store(0, Ordering::SeqCst);
    }

    /// Make every primitive report failure.
    pub fn fail_primitives(&self, on: bool) {
        self.fail_primitives.store(on, Ordering::SeqCst);
    }

    fn should_fail_malloc(&self) -> bool {
        let n = self.mallocs.fetch_add(1, Ordering::SeqCst) + 1;
        self.fail_at.load(Ordering::SeqCst) == n
    }

    fn primitives_fail(&self) -> bool {
        self.fail_primitives.load(Ordering::SeqCst)
    }
}

/// Software engine with injectable allocation and primitive failures.
pub struct TrackingEngine {
    inner: SoftwareEngine,
    faults: Arc<Faults>,
}

impl NativeHeap for TrackingEngine {
    fn malloc(&self, size: usize) -> Ptr {
        if self.faults.should_fail_malloc() {
            return NULL;
        }
        self.inner.malloc(size)
    }

    fn free(&self, ptr: Ptr) {
        self.inner.free(ptr);
    }

    fn write_memory(&self, ptr: Ptr, data: &[u8]) -> Result<(), EngineError> {
        self.inner.write_memory(ptr, data)
    }

    fn read_memory(&self, ptr: Ptr, len: usize) -> Result<Vec<u8>, EngineError> {
        self.inner.read_memory(ptr, len)
    }

    fn heap_stats(&self) -> HeapStats {
        self.inner.heap_stats()
    }
}

impl NativeEngine for TrackingEngine {
    fn generate_keypair(&self, out_private: Ptr, out_public: Ptr) -> bool {
        !self.faults.primitives_fail() && self.inner.generate_keypair(out_private, out_public)
    }

    fn generate_csr(
        &self,
        private_key: Ptr,
        public_key: Ptr,
        subject: Ptr,
        subject_count: usize,
        out: Ptr,
        out_capacity: usize,
    ) -> usize {
        if self.faults.primitives_fail() {
            return 0;
        }
        self.inner
            .generate_csr(private_key, public_key, subject, subject_count, out, out_capacity)
    }

    fn self_sign_certificate(
        &self,
        csr: Ptr,
        csr_len: usize,
        private_key: Ptr,
        out: Ptr,
        out_capacity: usize,
        validity_days: u32,
    ) -> usize {
        if self.faults.primitives_fail() {
            return 0;
        }
        self.inner
            .self_sign_certificate(csr, csr_len, private_key, out, out_capacity, validity_days)
    }

    fn sign_certificate(
        &self,
        csr: Ptr,
        csr_len: usize,
        ca_certificate: Ptr,
        ca_certificate_len: usize,
        ca_private_key: Ptr,
        ca_private_key_len: usize,
        out: Ptr,
        out_capacity: usize,
        validity_days: u32,
    ) -> usize {
        if self.faults.primitives_fail() {
            return 0;
        }
        self.inner.sign_certificate(
            csr,
            csr_len,
            ca_certificate,
            ca_certificate_len,
            ca_private_key,
            ca_private_key_len,
            out,
            out_capacity,
            validity_days,
        )
    }

    fn sign_message(
        &self,
        private_key: Ptr,
        message: Ptr,
        message_len: usize,
        out_signature: Ptr,
        out_capacity: usize,
    ) -> usize {
        if self.faults.primitives_fail() {
            return 0;
        }
        self.inner
            .sign_message(private_key, message, message_len, out_signature, out_capacity)
    }

    fn verify_message(
        &self,
        public_key: Ptr,
        signature: Ptr,
        signature_len: usize,
        message: Ptr,
        message_len: usize,
    ) -> bool {
        !self.faults.primitives_fail()
            && self
                .inner
                .verify_message(public_key, signature, signature_len, message, message_len)
    }

    fn verify_with_certificate(
        &self,
        certificate: Ptr,
        certificate_len: usize,
        signature: Ptr,
        signature_len: usize,
        message: Ptr,
        message_len: usize,
    ) -> bool {
        !self.faults.primitives_fail()
            && self.inner.verify_with_certificate(
                certificate,
                certificate_len,
                signature,
                signature_len,
                message,
                message_len,
            )
    }

    fn verify_issued_by_ca(
        &self,
        certificate: Ptr,
        certificate_len: usize,
        ca_certificate: Ptr,
        ca_certificate_len: usize,
    ) -> bool {
        !self.faults.primitives_fail()
            && self.inner.verify_issued_by_ca(
                certificate,
                certificate_len,
                ca_certificate,
                ca_certificate_len,
            )
    }
}

/// Loader for [`TrackingEngine`] that counts loads.
#[derive(Default)]
pub struct TrackingLoader {
    pub faults: Arc<Faults>,
    pub loads: AtomicUsize,
    pub delay: Option<Duration>,
}

#[async_trait]
impl EngineLoader for TrackingLoader {
    type Engine = TrackingEngine;

    async fn load(&self) -> Result<TrackingEngine, PkiError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(TrackingEngine {
            inner: SoftwareEngine::new(&EngineConfig::default()),
            faults: Arc::clone(&self.faults),
        })
    }
}

/// Loader that always fails.
pub struct FailingLoader;

#[async_trait]
impl EngineLoader for FailingLoader {
    type Engine = SoftwareEngine;

    async fn load(&self) -> Result<SoftwareEngine, PkiError> {
        Err(PkiError::initialization("engine module not found"))
    }
}

/// A ready software-backed engine.
pub async fn software() -> IdentityEngine {
    IdentityEngine::initialized(PkiConfig::default(), &SoftwareEngineLoader::default())
        .await
        .expect("software engine initializes")
}

/// A ready tracking engine plus its fault switches.
pub async fn tracking() -> (IdentityEngine<TrackingEngine>, Arc<Faults>) {
    let loader = TrackingLoader::default();
    let faults = Arc::clone(&loader.faults);
    let engine = IdentityEngine::initialized(PkiConfig::default(), &loader)
        .await
        .expect("tracking engine initializes");
    (engine, faults)
}

pub fn subject(entries: &[&str]) -> SubjectInfo {
    SubjectInfo::try_from(entries).expect("valid subject")
}
