//! Software signing engine.
//!
//! Implements [`NativeEngine`] in-process on top of `pqid-crypto`, with its
//! own [`LinearMemory`]. Callers interact with it exactly as they would with
//! an engine compiled to a separate module: through heap addresses only.
//!
//! Primitive failures are logged here and collapsed into `0` / `false`.

use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use rand_core::{OsRng, RngCore};

use pqid_crypto::{
    constant_time_eq, MlDsa65Signer, MlDsa65Verifier, PqcSigner, PqcVerifier,
    ML_DSA_65_PRIVATE_KEY_SIZE, ML_DSA_65_PUBLIC_KEY_SIZE,
};

use crate::config::EngineConfig;
use crate::engine::{NativeEngine, NativeHeap};
use crate::error::EngineError;
use crate::heap::{HeapStats, LinearMemory, Ptr, NULL, POINTER_SIZE};
use crate::record::{key_identifier, CertificateRecord, CsrRecord, Name, SERIAL_SIZE};

const SECONDS_PER_DAY: i64 = 86_400;

/// In-process ML-DSA-65 engine.
pub struct SoftwareEngine {
    memory: Mutex<LinearMemory>,
}

impl SoftwareEngine {
    /// Create an engine with the given heap configuration.
    #[must_use]
    pub fn new(config: &EngineConfig) -> Self {
        tracing::debug!(
            max_memory = config.max_memory,
            initial_memory = config.initial_memory,
            "SoftwareEngine: creating linear heap"
        );
        Self {
            memory: Mutex::new(LinearMemory::new(config)),
        }
    }

    fn memory(&self) -> Result<MutexGuard<'_, LinearMemory>, EngineError> {
        self.memory.lock().map_err(|_| EngineError::LockPoisoned)
    }

    fn read(&self, ptr: Ptr, len: usize) -> Result<Vec<u8>, EngineError> {
        self.memory()?.read(ptr, len)
    }

    fn write_output(&self, out: Ptr, capacity: usize, data: &[u8]) -> Result<usize, EngineError> {
        if data.len() > capacity {
            return Err(EngineError::OutputTooLarge {
                needed: data.len(),
                capacity,
            });
        }
        self.memory()?.write(out, data)?;
        Ok(data.len())
    }

    fn read_subject(&self, array: Ptr, count: usize) -> Result<Name, EngineError> {
        let memory = self.memory()?;
        let mut attributes = Vec::with_capacity(count.min(64));
        for index in 0..count {
            let slot = array
                .checked_add((index * POINTER_SIZE) as Ptr)
                .ok_or(EngineError::OutOfBounds {
                    ptr: array,
                    len: count * POINTER_SIZE,
                })?;
            let element = memory.read_ptr(slot)?;
            let raw = memory.read_c_string(element)?;
            let attribute = String::from_utf8(raw)
                .map_err(|_| EngineError::invalid_subject("attribute is not UTF-8"))?;
            attributes.push(attribute);
        }
        Name::from_attributes(attributes)
    }

    fn try_generate_keypair(&self, out_private: Ptr, out_public: Ptr) -> Result<(), EngineError> {
        let signer = MlDsa65Signer::new()?;
        let public_key = signer.public_key()?;
        let private_key = signer.private_key();

        let mut memory = self.memory()?;
        memory.write(out_private, &private_key)?;
        memory.write(out_public, &public_key)?;
        Ok(())
    }

    fn try_generate_csr(
        &self,
        private_key: Ptr,
        public_key: Ptr,
        subject: Ptr,
        subject_count: usize,
    ) -> Result<Vec<u8>, EngineError> {
        let subject = self.read_subject(subject, subject_count)?;
        let signer =
            MlDsa65Signer::from_private_key(&self.read(private_key, ML_DSA_65_PRIVATE_KEY_SIZE)?)?;
        let public_key = self.read(public_key, ML_DSA_65_PUBLIC_KEY_SIZE)?;

        let mut csr = CsrRecord {
            subject,
            public_key,
            signature: Vec::new(),
        };
        csr.signature = signer.sign(&csr.to_be_signed())?;
        csr.encode()
    }

    fn try_self_sign(
        &self,
        csr: Ptr,
        csr_len: usize,
        private_key: Ptr,
        validity_days: u32,
    ) -> Result<Vec<u8>, EngineError> {
        let csr = CsrRecord::decode(&self.read(csr, csr_len)?)?;
        let valid = MlDsa65Verifier::new().verify(
            &csr.public_key,
            &csr.to_be_signed(),
            &csr.signature,
        )?;
        if !valid {
            return Err(EngineError::CsrSignatureMismatch);
        }

        let signer =
            MlDsa65Signer::from_private_key(&self.read(private_key, ML_DSA_65_PRIVATE_KEY_SIZE)?)?;
        let (not_before, not_after) = validity_window(validity_days)?;
        let key_id = key_identifier(&csr.public_key);

        let mut certificate = CertificateRecord {
            serial: random_serial(),
            not_before,
            not_after,
            issuer: csr.subject.clone(),
            subject: csr.subject,
            public_key: csr.public_key,
            is_ca: true,
            subject_key_id: key_id,
            authority_key_id: key_id,
            signature: Vec::new(),
        };
        certificate.signature = signer.sign(&certificate.to_be_signed())?;
        certificate.encode()
    }

    #[allow(clippy::too_many_arguments)]
    fn try_sign_certificate(
        &self,
        csr: Ptr,
        csr_len: usize,
        ca_certificate: Ptr,
        ca_certificate_len: usize,
        ca_private_key: Ptr,
        ca_private_key_len: usize,
        validity_days: u32,
    ) -> Result<Vec<u8>, EngineError> {
        let csr = CsrRecord::decode(&self.read(csr, csr_len)?)?;
        let ca = CertificateRecord::decode(&self.read(ca_certificate, ca_certificate_len)?)?;
        if !ca.is_ca {
            return Err(EngineError::NotCertificateAuthority {
                subject: ca.subject.to_string(),
            });
        }
        let now = Utc::now().timestamp();
        if !ca.is_valid_at(now) {
            return Err(EngineError::CertificateNotCurrent {
                timestamp: now,
                not_before: ca.not_before,
                not_after: ca.not_after,
            });
        }
        let signer = MlDsa65Signer::from_private_key(&self.read(ca_private_key, ca_private_key_len)?)?;
        let (not_before, not_after) = validity_window(validity_days)?;

        let mut certificate = CertificateRecord {
            serial: random_serial(),
            not_before,
            not_after,
            issuer: ca.subject,
            subject: csr.subject,
            subject_key_id: key_identifier(&csr.public_key),
            public_key: csr.public_key,
            is_ca: false,
            authority_key_id: ca.subject_key_id,
            signature: Vec::new(),
        };
        certificate.signature = signer.sign(&certificate.to_be_signed())?;
        certificate.encode()
    }

    fn try_sign_message(
        &self,
        private_key: Ptr,
        message: Ptr,
        message_len: usize,
    ) -> Result<Vec<u8>, EngineError> {
        let signer =
            MlDsa65Signer::from_private_key(&self.read(private_key, ML_DSA_65_PRIVATE_KEY_SIZE)?)?;
        let message = self.read(message, message_len)?;
        Ok(signer.sign(&message)?)
    }

    fn try_verify_message(
        &self,
        public_key: Ptr,
        signature: Ptr,
        signature_len: usize,
        message: Ptr,
        message_len: usize,
    ) -> Result<bool, EngineError> {
        let public_key = self.read(public_key, ML_DSA_65_PUBLIC_KEY_SIZE)?;
        let signature = self.read(signature, signature_len)?;
        let message = self.read(message, message_len)?;
        Ok(MlDsa65Verifier::new().verify(&public_key, &message, &signature)?)
    }

    fn try_verify_with_certificate(
        &self,
        certificate: Ptr,
        certificate_len: usize,
        signature: Ptr,
        signature_len: usize,
        message: Ptr,
        message_len: usize,
    ) -> Result<bool, EngineError> {
        let certificate = CertificateRecord::decode(&self.read(certificate, certificate_len)?)?;
        let signature = self.read(signature, signature_len)?;
        let message = self.read(message, message_len)?;
        Ok(MlDsa65Verifier::new().verify(&certificate.public_key, &message, &signature)?)
    }

    fn try_verify_issued_by_ca(
        &self,
        certificate: Ptr,
        certificate_len: usize,
        ca_certificate: Ptr,
        ca_certificate_len: usize,
    ) -> Result<bool, EngineError> {
        let certificate = CertificateRecord::decode(&self.read(certificate, certificate_len)?)?;
        let ca = CertificateRecord::decode(&self.read(ca_certificate, ca_certificate_len)?)?;

        if certificate.issuer != ca.subject {
            tracing::debug!(issuer = %certificate.issuer, ca_subject = %ca.subject, "issuer mismatch");
            return Ok(false);
        }
        if !constant_time_eq(&certificate.authority_key_id, &ca.subject_key_id) {
            tracing::debug!("authority key identifier mismatch");
            return Ok(false);
        }
        if !ca.is_ca {
            tracing::debug!(ca_subject = %ca.subject, "issuer is not a certificate authority");
            return Ok(false);
        }
        let now = Utc::now().timestamp();
        if !certificate.is_valid_at(now) || !ca.is_valid_at(now) {
            tracing::debug!(
                now,
                not_before = certificate.not_before,
                not_after = certificate.not_after,
                "certificate or issuer outside validity window"
            );
            return Ok(false);
        }
        Ok(MlDsa65Verifier::new().verify(
            &ca.public_key,
            &certificate.to_be_signed(),
            &certificate.signature,
        )?)
    }
}

impl Default for SoftwareEngine {
    fn default() -> Self {
        Self::new(&EngineConfig::default())
    }
}

impl NativeHeap for SoftwareEngine {
    fn malloc(&self, size: usize) -> Ptr {
        match self.memory() {
            Ok(mut memory) => memory.malloc(size),
            Err(e) => {
                tracing::error!(error = %e, "malloc failed");
                NULL
            }
        }
    }

    fn free(&self, ptr: Ptr) {
        match self.memory() {
            Ok(mut memory) => memory.free(ptr),
            Err(e) => tracing::error!(error = %e, ptr, "free failed"),
        }
    }

    fn write_memory(&self, ptr: Ptr, data: &[u8]) -> Result<(), EngineError> {
        self.memory()?.write(ptr, data)
    }

    fn read_memory(&self, ptr: Ptr, len: usize) -> Result<Vec<u8>, EngineError> {
        self.read(ptr, len)
    }

    fn heap_stats(&self) -> HeapStats {
        self.memory()
            .map(|memory| memory.stats())
            .unwrap_or_default()
    }
}

impl NativeEngine for SoftwareEngine {
    fn generate_keypair(&self, out_private: Ptr, out_public: Ptr) -> bool {
        report_bool(
            "generate_keypair",
            self.try_generate_keypair(out_private, out_public).map(|()| true),
        )
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
        report_len(
            "generate_csr",
            self.try_generate_csr(private_key, public_key, subject, subject_count)
                .and_then(|csr| self.write_output(out, out_capacity, &csr)),
        )
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
        report_len(
            "self_sign_certificate",
            self.try_self_sign(csr, csr_len, private_key, validity_days)
                .and_then(|cert| self.write_output(out, out_capacity, &cert)),
        )
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
        report_len(
            "sign_certificate",
            self.try_sign_certificate(
                csr,
                csr_len,
                ca_certificate,
                ca_certificate_len,
                ca_private_key,
                ca_private_key_len,
                validity_days,
            )
            .and_then(|cert| self.write_output(out, out_capacity, &cert)),
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
        report_len(
            "sign_message",
            self.try_sign_message(private_key, message, message_len)
                .and_then(|sig| self.write_output(out_signature, out_capacity, &sig)),
        )
    }

    fn verify_message(
        &self,
        public_key: Ptr,
        signature: Ptr,
        signature_len: usize,
        message: Ptr,
        message_len: usize,
    ) -> bool {
        report_bool(
            "verify_message",
            self.try_verify_message(public_key, signature, signature_len, message, message_len),
        )
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
        report_bool(
            "verify_with_certificate",
            self.try_verify_with_certificate(
                certificate,
                certificate_len,
                signature,
                signature_len,
                message,
                message_len,
            ),
        )
    }

    fn verify_issued_by_ca(
        &self,
        certificate: Ptr,
        certificate_len: usize,
        ca_certificate: Ptr,
        ca_certificate_len: usize,
    ) -> bool {
        report_bool(
            "verify_issued_by_ca",
            self.try_verify_issued_by_ca(
                certificate,
                certificate_len,
                ca_certificate,
                ca_certificate_len,
            ),
        )
    }
}

fn report_len(primitive: &'static str, result: Result<usize, EngineError>) -> usize {
    match result {
        Ok(written) => {
            tracing::debug!(primitive, written, "primitive succeeded");
            written
        }
        Err(e) => {
            tracing::warn!(primitive, error = %e, "primitive failed");
            0
        }
    }
}

fn report_bool(primitive: &'static str, result: Result<bool, EngineError>) -> bool {
    match result {
        Ok(value) => value,
        Err(e) => {
            tracing::debug!(primitive, error = %e, "primitive rejected input");
            false
        }
    }
}

fn random_serial() -> [u8; SERIAL_SIZE] {
    let mut serial = [0u8; SERIAL_SIZE];
    OsRng.fill_bytes(&mut serial);
    serial[0] &= 0x7F;
    if serial.iter().all(|&b| b == 0) {
        serial[SERIAL_SIZE - 1] = 1;
    }
    serial
}

fn validity_window(days: u32) -> Result<(i64, i64), EngineError> {
    let not_before = Utc::now().timestamp();
    let not_after = i64::from(days)
        .checked_mul(SECONDS_PER_DAY)
        .and_then(|span| not_before.checked_add(span))
        .ok_or(EngineError::InvalidValidity { days })?;
    Ok((not_before, not_after))
}
