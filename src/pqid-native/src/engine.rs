//! Native engine capability traits.
//!
//! This module defines the boundary between the identity orchestrator and a
//! signing engine that owns its own memory. Nothing crosses the boundary
//! except heap addresses, lengths and scalar results: the caller copies
//! inputs into engine memory, invokes a primitive, and copies outputs back.
//!
//! ## Result Conventions
//!
//! - Producing primitives return the number of bytes written, `0` on failure
//! - Predicates return `false` both for "no" and for malformed input
//! - Outputs that exceed the caller's capacity are a failure, never truncated

use crate::error::EngineError;
use crate::heap::{HeapStats, Ptr};

/// Heap capability of a native engine.
///
/// Addresses are only meaningful to the engine that issued them.
pub trait NativeHeap: Send + Sync {
    /// Allocate `size` bytes. Returns the null address on failure.
    fn malloc(&self, size: usize) -> Ptr;

    /// Release an allocation. Freeing null is a no-op.
    fn free(&self, ptr: Ptr);

    /// Copy bytes into engine memory.
    fn write_memory(&self, ptr: Ptr, data: &[u8]) -> Result<(), EngineError>;

    /// Copy bytes out of engine memory.
    fn read_memory(&self, ptr: Ptr, len: usize) -> Result<Vec<u8>, EngineError>;

    /// Current heap occupancy.
    fn heap_stats(&self) -> HeapStats;
}

/// The eight ML-DSA identity primitives.
///
/// Fixed-size key arguments are addresses of exactly 4032-byte (private) or
/// 1952-byte (public) regions. The subject array is a region of
/// `subject_count` 4-byte little-endian pointers to NUL-terminated strings.
#[allow(clippy::too_many_arguments)]
pub trait NativeEngine: NativeHeap {
    /// Generate a key pair into two caller-provided regions.
    fn generate_keypair(&self, out_private: Ptr, out_public: Ptr) -> bool;

    /// Build a CSR for `public_key` and `subject`, signed by `private_key`.
    fn generate_csr(
        &self,
        private_key: Ptr,
        public_key: Ptr,
        subject: Ptr,
        subject_count: usize,
        out: Ptr,
        out_capacity: usize,
    ) -> usize;

    /// Issue a self-signed CA certificate from a CSR.
    fn self_sign_certificate(
        &self,
        csr: Ptr,
        csr_len: usize,
        private_key: Ptr,
        out: Ptr,
        out_capacity: usize,
        validity_days: u32,
    ) -> usize;

    /// Issue a certificate for a CSR, signed by a CA.
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
    ) -> usize;

    /// Sign a message.
    fn sign_message(
        &self,
        private_key: Ptr,
        message: Ptr,
        message_len: usize,
        out_signature: Ptr,
        out_capacity: usize,
    ) -> usize;

    /// Verify a signature against a raw public key.
    fn verify_message(
        &self,
        public_key: Ptr,
        signature: Ptr,
        signature_len: usize,
        message: Ptr,
        message_len: usize,
    ) -> bool;

    /// Verify a signature against the public key inside a certificate.
    fn verify_with_certificate(
        &self,
        certificate: Ptr,
        certificate_len: usize,
        signature: Ptr,
        signature_len: usize,
        message: Ptr,
        message_len: usize,
    ) -> bool;

    /// Check that `certificate` was issued by `ca_certificate`.
    fn verify_issued_by_ca(
        &self,
        certificate: Ptr,
        certificate_len: usize,
        ca_certificate: Ptr,
        ca_certificate_len: usize,
    ) -> bool;
}
