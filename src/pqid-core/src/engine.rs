//! Key and certificate orchestration.
//!
//! Every operation follows the same template:
//!
//! 1. Validate argument shapes (no native call on bad input)
//! 2. Take the engine lock
//! 3. Open a [`ForeignArena`], copy inputs into engine memory
//! 4. Invoke the primitive
//! 5. Copy out exactly the bytes the primitive reports as written
//! 6. Drop the arena (all buffers freed), then release the lock
//!
//! A falsy primitive result becomes the operation's typed failure. Nothing
//! is retried.
//!
//! ## Identity Flow
//!
//! ```text
//! generate_key_pair ──► generate_csr ──┬─► generate_self_signed_certificate
//!                                      └─► sign_certificate (by a CA)
//!                                                │
//!                          sign / verify / verify_with_certificate
//!                          verify_certificate_issued_by_ca
//! ```

use pqid_crypto::{ML_DSA_65_PRIVATE_KEY_SIZE, ML_DSA_65_PUBLIC_KEY_SIZE};
use pqid_native::{HeapStats, NativeEngine, NativeHeap, SoftwareEngine};
use tracing::{debug, info, instrument, warn};

use crate::arena::ForeignArena;
use crate::config::PkiConfig;
use crate::error::PkiError;
use crate::lifecycle::{EngineLoader, LifecycleGuard, LifecycleState};
use crate::types::{check_private_key, check_public_key, Certificate, Csr, KeyPair, Signature, SubjectInfo};

/// Post-quantum identity engine.
///
/// Explicit context object: create one, [`initialize`](Self::initialize) it
/// with a loader, then share it (it is `Send + Sync`, wrap in `Arc` as needed).
/// Operations on one instance are serialized on its native engine.
pub struct IdentityEngine<E = SoftwareEngine> {
    config: PkiConfig,
    lifecycle: LifecycleGuard<E>,
}

impl<E: NativeEngine> IdentityEngine<E> {
    /// Create an uninitialized engine with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(PkiConfig::default())
    }

    /// Create an uninitialized engine with custom configuration.
    #[must_use]
    pub fn with_config(config: PkiConfig) -> Self {
        info!(
            output_capacity = config.output_capacity,
            default_validity_days = config.default_validity_days,
            "IdentityEngine: created"
        );
        Self {
            config,
            lifecycle: LifecycleGuard::new(),
        }
    }

    /// Create and initialize in one step.
    ///
    /// # Errors
    ///
    /// Returns [`PkiError::InvalidArgument`] for an unusable configuration and
    /// [`PkiError::InitializationFailed`] if the engine cannot load.
    pub async fn initialized<L>(config: PkiConfig, loader: &L) -> Result<Self, PkiError>
    where
        L: EngineLoader<Engine = E> + ?Sized,
    {
        let engine = Self::with_config(config);
        engine.initialize(loader).await?;
        Ok(engine)
    }

    /// Load the native engine. No-op once ready.
    ///
    /// The configuration is checked first; a rejected configuration leaves
    /// the engine uninitialized and the loader untouched.
    ///
    /// # Errors
    ///
    /// Returns [`PkiError::InvalidArgument`] for an unusable configuration and
    /// [`PkiError::InitializationFailed`] if the engine cannot load.
    pub async fn initialize<L>(&self, loader: &L) -> Result<(), PkiError>
    where
        L: EngineLoader<Engine = E> + ?Sized,
    {
        if let Err(err) = self.config.validate() {
            warn!(error = %err, "IdentityEngine: configuration rejected");
            return Err(err);
        }
        self.lifecycle.initialize(loader).await
    }

    /// Lifecycle state.
    pub fn state(&self) -> LifecycleState {
        self.lifecycle.state()
    }

    /// Whether operations can run.
    pub fn is_ready(&self) -> bool {
        self.state() == LifecycleState::Ready
    }

    /// Active configuration.
    pub fn config(&self) -> &PkiConfig {
        &self.config
    }

    /// Native heap occupancy. Zero live allocations between operations.
    pub async fn heap_stats(&self) -> Result<HeapStats, PkiError> {
        let engine = self.lifecycle.engine()?.lock().await;
        Ok(engine.heap_stats())
    }

    /// Generate an ML-DSA-65 key pair.
    #[instrument(skip_all)]
    pub async fn generate_key_pair(&self) -> Result<KeyPair, PkiError> {
        let engine = self.lifecycle.engine()?.lock().await;
        let key_pair = generate_key_pair_locked(&*engine)?;
        info!("IdentityEngine: key pair generated");
        Ok(key_pair)
    }

    /// Build a CSR for `public_key` and `subject`, signed by `private_key`.
    #[instrument(skip_all, fields(subject_entries = subject.len()))]
    pub async fn generate_csr(
        &self,
        private_key: &[u8],
        public_key: &[u8],
        subject: &SubjectInfo,
    ) -> Result<Csr, PkiError> {
        check_private_key(private_key)?;
        check_public_key(public_key)?;

        let engine = self.lifecycle.engine()?.lock().await;
        let csr = generate_csr_locked(&*engine, self.config.output_capacity, private_key, public_key, subject)?;
        info!(csr_len = csr.len(), "IdentityEngine: CSR generated");
        Ok(csr)
    }

    /// Issue a self-signed CA certificate.
    ///
    /// `validity_days` defaults to [`PkiConfig::default_validity_days`].
    #[instrument(skip_all)]
    pub async fn generate_self_signed_certificate(
        &self,
        private_key: &[u8],
        csr: impl AsRef<[u8]>,
        validity_days: Option<u32>,
    ) -> Result<Certificate, PkiError> {
        let csr = csr.as_ref();
        check_private_key(private_key)?;
        non_empty("CSR", csr)?;
        let days = self.validity(validity_days)?;

        let engine = self.lifecycle.engine()?.lock().await;
        let certificate = self_sign_locked(&*engine, self.config.output_capacity, private_key, csr, days)?;
        info!(
            certificate_len = certificate.len(),
            validity_days = days,
            "IdentityEngine: self-signed certificate issued"
        );
        Ok(certificate)
    }

    /// Issue a certificate for `csr`, signed by the CA.
    ///
    /// `validity_days` defaults to [`PkiConfig::default_validity_days`].
    #[instrument(skip_all)]
    pub async fn sign_certificate(
        &self,
        ca_private_key: &[u8],
        csr: impl AsRef<[u8]>,
        ca_certificate: impl AsRef<[u8]>,
        validity_days: Option<u32>,
    ) -> Result<Certificate, PkiError> {
        let (csr, ca_certificate) = (csr.as_ref(), ca_certificate.as_ref());
        check_private_key(ca_private_key)?;
        non_empty("CSR", csr)?;
        non_empty("CA certificate", ca_certificate)?;
        let days = self.validity(validity_days)?;

        let engine = self.lifecycle.engine()?.lock().await;
        let certificate = sign_certificate_locked(
            &*engine,
            self.config.output_capacity,
            ca_private_key,
            csr,
            ca_certificate,
            days,
        )?;
        info!(
            certificate_len = certificate.len(),
            validity_days = days,
            "IdentityEngine: CA-signed certificate issued"
        );
        Ok(certificate)
    }

    /// Sign a message (text or bytes).
    #[instrument(skip_all, fields(message_len = message.as_ref().len()))]
    pub async fn sign(
        &self,
        private_key: &[u8],
        message: impl AsRef<[u8]>,
    ) -> Result<Signature, PkiError> {
        check_private_key(private_key)?;

        let engine = self.lifecycle.engine()?.lock().await;
        let signature = sign_locked(&*engine, self.config.output_capacity, private_key, message.as_ref())?;
        debug!(signature_len = signature.len(), "IdentityEngine: message signed");
        Ok(signature)
    }

    /// Verify `signature` over `message` under a raw public key.
    ///
    /// A mismatch is `Ok(false)`.
    #[instrument(skip_all)]
    pub async fn verify(
        &self,
        public_key: &[u8],
        signature: impl AsRef<[u8]>,
        message: impl AsRef<[u8]>,
    ) -> Result<bool, PkiError> {
        check_public_key(public_key)?;

        let engine = self.lifecycle.engine()?.lock().await;
        let valid = verify_locked(&*engine, public_key, signature.as_ref(), message.as_ref())
            .map_err(PkiError::into_verification)?;
        debug!(valid, "IdentityEngine: signature checked");
        Ok(valid)
    }

    /// Verify `signature` over `message` under the key in `certificate`.
    #[instrument(skip_all)]
    pub async fn verify_with_certificate(
        &self,
        certificate: impl AsRef<[u8]>,
        signature: impl AsRef<[u8]>,
        message: impl AsRef<[u8]>,
    ) -> Result<bool, PkiError> {
        let certificate = certificate.as_ref();
        non_empty("certificate", certificate)?;

        let engine = self.lifecycle.engine()?.lock().await;
        let valid = verify_with_certificate_locked(
            &*engine,
            certificate,
            signature.as_ref(),
            message.as_ref(),
        )
        .map_err(PkiError::into_verification)?;
        debug!(valid, "IdentityEngine: signature checked against certificate");
        Ok(valid)
    }

    /// Whether `certificate` was issued by `ca_certificate`.
    ///
    /// A self-signed certificate is its own issuer.
    #[instrument(skip_all)]
    pub async fn verify_certificate_issued_by_ca(
        &self,
        certificate: impl AsRef<[u8]>,
        ca_certificate: impl AsRef<[u8]>,
    ) -> Result<bool, PkiError> {
        let (certificate, ca_certificate) = (certificate.as_ref(), ca_certificate.as_ref());
        non_empty("certificate", certificate)?;
        non_empty("CA certificate", ca_certificate)?;

        let engine = self.lifecycle.engine()?.lock().await;
        let valid = issued_by_locked(&*engine, certificate, ca_certificate)
            .map_err(PkiError::into_verification)?;
        debug!(valid, "IdentityEngine: issuer checked");
        Ok(valid)
    }

    fn validity(&self, requested: Option<u32>) -> Result<u32, PkiError> {
        match requested.unwrap_or(self.config.default_validity_days) {
            0 => Err(PkiError::invalid_argument("validity_days must be positive")),
            days => Ok(days),
        }
    }
}

impl<E: NativeEngine> Default for IdentityEngine<E> {
    fn default() -> Self {
        Self::new()
    }
}

fn non_empty(what: &str, bytes: &[u8]) -> Result<(), PkiError> {
    if bytes.is_empty() {
        return Err(PkiError::invalid_argument(format!("{what} must not be empty")));
    }
    Ok(())
}

// The functions below run with the engine lock held. Each owns its arena, so
// every buffer is freed before the caller releases the lock.

fn generate_key_pair_locked<E: NativeEngine + ?Sized>(engine: &E) -> Result<KeyPair, PkiError> {
    let mut arena = ForeignArena::new(engine);
    let private_key = arena.allocate(ML_DSA_65_PRIVATE_KEY_SIZE)?;
    let public_key = arena.allocate(ML_DSA_65_PUBLIC_KEY_SIZE)?;

    if !engine.generate_keypair(private_key.ptr(), public_key.ptr()) {
        warn!("IdentityEngine: native key generation failed");
        return Err(PkiError::KeyGenerationFailed);
    }

    KeyPair::from_parts(
        arena.read_bytes(private_key, ML_DSA_65_PRIVATE_KEY_SIZE)?,
        arena.read_bytes(public_key, ML_DSA_65_PUBLIC_KEY_SIZE)?,
    )
}

fn generate_csr_locked<E: NativeEngine + ?Sized>(
    engine: &E,
    capacity: usize,
    private_key: &[u8],
    public_key: &[u8],
    subject: &SubjectInfo,
) -> Result<Csr, PkiError> {
    let mut arena = ForeignArena::new(engine);
    let private_key = arena.allocate_bytes(private_key)?;
    let public_key = arena.allocate_bytes(public_key)?;
    let subject_array = arena.allocate_string_array(subject.entries())?;
    let out = arena.allocate(capacity)?;

    let written = engine.generate_csr(
        private_key.ptr(),
        public_key.ptr(),
        subject_array.array().ptr(),
        subject_array.len(),
        out.ptr(),
        capacity,
    );
    if written == 0 {
        warn!("IdentityEngine: native CSR generation failed");
        return Err(PkiError::CsrGenerationFailed);
    }
    Ok(Csr::from(arena.read_bytes(out, written)?))
}

fn self_sign_locked<E: NativeEngine + ?Sized>(
    engine: &E,
    capacity: usize,
    private_key: &[u8],
    csr: &[u8],
    validity_days: u32,
) -> Result<Certificate, PkiError> {
    let mut arena = ForeignArena::new(engine);
    let csr_buffer = arena.allocate_bytes(csr)?;
    let private_key = arena.allocate_bytes(private_key)?;
    let out = arena.allocate(capacity)?;

    let written = engine.self_sign_certificate(
        csr_buffer.ptr(),
        csr.len(),
        private_key.ptr(),
        out.ptr(),
        capacity,
        validity_days,
    );
    if written == 0 {
        warn!("IdentityEngine: native self-signing failed");
        return Err(PkiError::CertificateGenerationFailed);
    }
    Ok(Certificate::from(arena.read_bytes(out, written)?))
}

fn sign_certificate_locked<E: NativeEngine + ?Sized>(
    engine: &E,
    capacity: usize,
    ca_private_key: &[u8],
    csr: &[u8],
    ca_certificate: &[u8],
    validity_days: u32,
) -> Result<Certificate, PkiError> {
    let mut arena = ForeignArena::new(engine);
    let csr_buffer = arena.allocate_bytes(csr)?;
    let ca_buffer = arena.allocate_bytes(ca_certificate)?;
    let key_buffer = arena.allocate_bytes(ca_private_key)?;
    let out = arena.allocate(capacity)?;

    let written = engine.sign_certificate(
        csr_buffer.ptr(),
        csr.len(),
        ca_buffer.ptr(),
        ca_certificate.len(),
        key_buffer.ptr(),
        ca_private_key.len(),
        out.ptr(),
        capacity,
        validity_days,
    );
    if written == 0 {
        warn!("IdentityEngine: native CA signing failed");
        return Err(PkiError::CertificateSigningFailed);
    }
    Ok(Certificate::from(arena.read_bytes(out, written)?))
}

fn sign_locked<E: NativeEngine + ?Sized>(
    engine: &E,
    capacity: usize,
    private_key: &[u8],
    message: &[u8],
) -> Result<Signature, PkiError> {
    let mut arena = ForeignArena::new(engine);
    let key_buffer = arena.allocate_bytes(private_key)?;
    let message_buffer = arena.allocate_bytes(message)?;
    let out = arena.allocate(capacity)?;

    let written = engine.sign_message(
        key_buffer.ptr(),
        message_buffer.ptr(),
        message.len(),
        out.ptr(),
        capacity,
    );
    if written == 0 {
        warn!("IdentityEngine: native signing failed");
        return Err(PkiError::SigningFailed);
    }
    Ok(Signature::from(arena.read_bytes(out, written)?))
}

fn verify_locked<E: NativeEngine + ?Sized>(
    engine: &E,
    public_key: &[u8],
    signature: &[u8],
    message: &[u8],
) -> Result<bool, PkiError> {
    let mut arena = ForeignArena::new(engine);
    let key_buffer = arena.allocate_bytes(public_key)?;
    let signature_buffer = arena.allocate_bytes(signature)?;
    let message_buffer = arena.allocate_bytes(message)?;

    Ok(engine.verify_message(
        key_buffer.ptr(),
        signature_buffer.ptr(),
        signature.len(),
        message_buffer.ptr(),
        message.len(),
    ))
}

fn verify_with_certificate_locked<E: NativeEngine + ?Sized>(
    engine: &E,
    certificate: &[u8],
    signature: &[u8],
    message: &[u8],
) -> Result<bool, PkiError> {
    let mut arena = ForeignArena::new(engine);
    let certificate_buffer = arena.allocate_bytes(certificate)?;
    let signature_buffer = arena.allocate_bytes(signature)?;
    let message_buffer = arena.allocate_bytes(message)?;

    Ok(engine.verify_with_certificate(
        certificate_buffer.ptr(),
        certificate.len(),
        signature_buffer.ptr(),
        signature.len(),
        message_buffer.ptr(),
        message.len(),
    ))
}

fn issued_by_locked<E: NativeEngine + ?Sized>(
    engine: &E,
    certificate: &[u8],
    ca_certificate: &[u8],
) -> Result<bool, PkiError> {
    let mut arena = ForeignArena::new(engine);
    let certificate_buffer = arena.allocate_bytes(certificate)?;
    let ca_buffer = arena.allocate_bytes(ca_certificate)?;

    Ok(engine.verify_issued_by_ca(
        certificate_buffer.ptr(),
        certificate.len(),
        ca_buffer.ptr(),
        ca_certificate.len(),
    ))
}
