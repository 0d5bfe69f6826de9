//! # pqid-ffi
//!
//! C-compatible FFI interface for pqid.
//!
//! This crate provides a stable C ABI over [`pqid_core::IdentityEngine`] for
//! applications written in any language that can call C functions.
//!
//! ## Usage
//!
//! ```c
//! #include "pqid.h"
//!
//! int main() {
//!     PqidHandle* handle = pqid_init();
//!     if (!handle) {
//!         return 1;
//!     }
//!
//!     uint8_t private_key[4032];
//!     uint8_t public_key[1952];
//!     pqid_generate_key_pair(handle, private_key, sizeof private_key,
//!                            public_key, sizeof public_key);
//!
//!     uint8_t* signature = NULL;
//!     size_t signature_len = 0;
//!     if (pqid_sign(handle, private_key, sizeof private_key,
//!                   (const uint8_t*)"hello", 5,
//!                   &signature, &signature_len) == 0) {
//!         int32_t valid = 0;
//!         pqid_verify(handle, public_key, sizeof public_key,
//!                     signature, signature_len,
//!                     (const uint8_t*)"hello", 5, &valid);
//!         pqid_free(signature);
//!     }
//!
//!     pqid_destroy(handle);
//!     return 0;
//! }
//! ```
//!
//! ## Conventions
//!
//! - Every function returns `0` or a negative [`PqidError`] code
//! - Variable-length outputs are `malloc`ed; release them with `pqid_free`
//! - Key outputs are written into caller buffers
//! - Verification writes `1` (valid) or `0` (invalid) to an `int32_t`
//! - `validity_days == 0` selects the engine's configured default

#![allow(clippy::missing_safety_doc)] // FFI functions are inherently unsafe
#![allow(clippy::too_many_arguments)] // C signatures pass pointer/length pairs

use std::ffi::{c_void, CStr};
use std::ptr;

use pqid_core::{
    IdentityEngine, KeyPair, PkiConfig, PkiError, SoftwareEngine, SoftwareEngineLoader,
    SubjectInfo, ML_DSA_65_PRIVATE_KEY_SIZE, ML_DSA_65_PUBLIC_KEY_SIZE,
};
use tokio::runtime::Runtime;

/// Opaque handle to a pqid instance.
#[repr(C)]
pub struct PqidHandle {
    runtime: Runtime,
    engine: IdentityEngine<SoftwareEngine>,
}

/// Error codes returned by FFI functions.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PqidError {
    /// Success.
    Success = 0,
    /// Null pointer, bad length or malformed argument.
    InvalidArgument = -1,
    /// Engine failed to load.
    InitializationFailed = -2,
    /// Engine not loaded.
    NotInitialized = -3,
    /// Engine or host allocation failed.
    AllocationFailure = -4,
    /// Key generation failed.
    KeyGenerationFailed = -5,
    /// CSR generation failed.
    CsrGenerationFailed = -6,
    /// Self-signed certificate generation failed.
    CertificateGenerationFailed = -7,
    /// CA signing failed.
    CertificateSigningFailed = -8,
    /// Message signing failed.
    SigningFailed = -9,
    /// Verification could not be carried out.
    VerificationError = -10,
    /// Internal error.
    InternalError = -99,
}

impl From<&PkiError> for PqidError {
    fn from(error: &PkiError) -> Self {
        match error {
            PkiError::NotInitialized => Self::NotInitialized,
            PkiError::InitializationFailed { .. } => Self::InitializationFailed,
            PkiError::InvalidArgument { .. }
            | PkiError::InvalidHex { .. }
            | PkiError::InvalidPem { .. } => Self::InvalidArgument,
            PkiError::AllocationFailure { .. } => Self::AllocationFailure,
            PkiError::KeyGenerationFailed => Self::KeyGenerationFailed,
            PkiError::CsrGenerationFailed => Self::CsrGenerationFailed,
            PkiError::CertificateGenerationFailed => Self::CertificateGenerationFailed,
            PkiError::CertificateSigningFailed => Self::CertificateSigningFailed,
            PkiError::SigningFailed => Self::SigningFailed,
            PkiError::VerificationError { .. } => Self::VerificationError,
            PkiError::BufferOverrun { .. } | PkiError::Engine(_) => Self::InternalError,
        }
    }
}

fn fail(operation: &str, error: &PkiError) -> i32 {
    tracing::error!(operation, error = %error, "pqid FFI call failed");
    PqidError::from(error) as i32
}

/// Borrow `len` bytes at `data`. A null pointer is only valid with `len == 0`.
unsafe fn input<'a>(data: *const u8, len: usize) -> Option<&'a [u8]> {
    if data.is_null() {
        return (len == 0).then_some(&[][..]);
    }
    Some(std::slice::from_raw_parts(data, len))
}

/// Copy `bytes` into a fresh `malloc` buffer and hand it to the caller.
unsafe fn hand_out(bytes: &[u8], out_data: *mut *mut u8, out_len: *mut usize) -> i32 {
    let ptr = libc::malloc(bytes.len().max(1)) as *mut u8;
    if ptr.is_null() {
        return PqidError::AllocationFailure as i32;
    }
    ptr::copy_nonoverlapping(bytes.as_ptr(), ptr, bytes.len());
    *out_data = ptr;
    *out_len = bytes.len();
    PqidError::Success as i32
}

fn validity(days: u32) -> Option<u32> {
    (days != 0).then_some(days)
}

/// Initialize a pqid instance with the in-process engine.
///
/// Returns a handle that must be passed to all other functions.
/// Returns NULL on failure.
///
/// # Safety
///
/// The returned handle must be freed with `pqid_destroy`.
#[no_mangle]
pub extern "C" fn pqid_init() -> *mut PqidHandle {
    let runtime = match Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!("Failed to create runtime: {}", e);
            return ptr::null_mut();
        },
    };

    let engine = match runtime.block_on(IdentityEngine::initialized(
        PkiConfig::default(),
        &SoftwareEngineLoader::default(),
    )) {
        Ok(engine) => engine,
        Err(e) => {
            tracing::error!("Failed to initialize engine: {}", e);
            return ptr::null_mut();
        },
    };

    Box::into_raw(Box::new(PqidHandle { runtime, engine }))
}

/// Generate an ML-DSA-65 key pair into caller buffers.
///
/// `private_capacity` must be at least 4032 and `public_capacity` at least
/// 1952; exactly that many bytes are written.
///
/// # Safety
///
/// - `handle` must be a valid handle from `pqid_init`
/// - output pointers must be writable for their stated capacities
#[no_mangle]
pub unsafe extern "C" fn pqid_generate_key_pair(
    handle: *mut PqidHandle,
    out_private_key: *mut u8,
    private_capacity: usize,
    out_public_key: *mut u8,
    public_capacity: usize,
) -> i32 {
    if handle.is_null() || out_private_key.is_null() || out_public_key.is_null() {
        return PqidError::InvalidArgument as i32;
    }
    if private_capacity < ML_DSA_65_PRIVATE_KEY_SIZE || public_capacity < ML_DSA_65_PUBLIC_KEY_SIZE {
        return PqidError::InvalidArgument as i32;
    }

    let handle = &*handle;
    let key_pair: KeyPair = match handle.runtime.block_on(handle.engine.generate_key_pair()) {
        Ok(kp) => kp,
        Err(e) => return fail("generate_key_pair", &e),
    };

    ptr::copy_nonoverlapping(
        key_pair.private_key().as_ptr(),
        out_private_key,
        key_pair.private_key().len(),
    );
    ptr::copy_nonoverlapping(
        key_pair.public_key().as_ptr(),
        out_public_key,
        key_pair.public_key().len(),
    );
    PqidError::Success as i32
}

/// Create a CSR for `subject` (`subject_count` NUL-terminated `KEY=VALUE`
/// strings, in order).
///
/// # Safety
///
/// - `handle` must be a valid handle from `pqid_init`
/// - input pointers must be readable for their stated lengths
/// - `subject` must point to `subject_count` valid C strings
/// - `out_csr` and `out_len` must be valid pointers
#[no_mangle]
pub unsafe extern "C" fn pqid_generate_csr(
    handle: *mut PqidHandle,
    private_key: *const u8,
    private_key_len: usize,
    public_key: *const u8,
    public_key_len: usize,
    subject: *const *const libc::c_char,
    subject_count: usize,
    out_csr: *mut *mut u8,
    out_len: *mut usize,
) -> i32 {
    if handle.is_null() || subject.is_null() || out_csr.is_null() || out_len.is_null() {
        return PqidError::InvalidArgument as i32;
    }
    let (Some(private_key), Some(public_key)) = (
        input(private_key, private_key_len),
        input(public_key, public_key_len),
    ) else {
        return PqidError::InvalidArgument as i32;
    };

    let mut entries = Vec::with_capacity(subject_count);
    for entry in std::slice::from_raw_parts(subject, subject_count) {
        if entry.is_null() {
            return PqidError::InvalidArgument as i32;
        }
        match CStr::from_ptr(*entry).to_str() {
            Ok(s) => entries.push(s.to_owned()),
            Err(_) => return PqidError::InvalidArgument as i32,
        }
    }
    let subject = match SubjectInfo::new(entries) {
        Ok(subject) => subject,
        Err(e) => return fail("generate_csr", &e),
    };

    let handle = &*handle;
    match handle
        .runtime
        .block_on(handle.engine.generate_csr(private_key, public_key, &subject))
    {
        Ok(csr) => hand_out(csr.as_bytes(), out_csr, out_len),
        Err(e) => fail("generate_csr", &e),
    }
}

/// Issue a self-signed CA certificate from a CSR.
///
/// # Safety
///
/// - `handle` must be a valid handle from `pqid_init`
/// - input pointers must be readable for their stated lengths
/// - `out_certificate` and `out_len` must be valid pointers
#[no_mangle]
pub unsafe extern "C" fn pqid_generate_self_signed_certificate(
    handle: *mut PqidHandle,
    private_key: *const u8,
    private_key_len: usize,
    csr: *const u8,
    csr_len: usize,
    validity_days: u32,
    out_certificate: *mut *mut u8,
    out_len: *mut usize,
) -> i32 {
    if handle.is_null() || out_certificate.is_null() || out_len.is_null() {
        return PqidError::InvalidArgument as i32;
    }
    let (Some(private_key), Some(csr)) = (input(private_key, private_key_len), input(csr, csr_len))
    else {
        return PqidError::InvalidArgument as i32;
    };

    let handle = &*handle;
    match handle.runtime.block_on(handle.engine.generate_self_signed_certificate(
        private_key,
        csr,
        validity(validity_days),
    )) {
        Ok(certificate) => hand_out(certificate.as_bytes(), out_certificate, out_len),
        Err(e) => fail("generate_self_signed_certificate", &e),
    }
}

/// Issue a certificate for a CSR, signed by a CA.
///
/// # Safety
///
/// - `handle` must be a valid handle from `pqid_init`
/// - input pointers must be readable for their stated lengths
/// - `out_certificate` and `out_len` must be valid pointers
#[no_mangle]
pub unsafe extern "C" fn pqid_sign_certificate(
    handle: *mut PqidHandle,
    ca_private_key: *const u8,
    ca_private_key_len: usize,
    csr: *const u8,
    csr_len: usize,
    ca_certificate: *const u8,
    ca_certificate_len: usize,
    validity_days: u32,
    out_certificate: *mut *mut u8,
    out_len: *mut usize,
) -> i32 {
    if handle.is_null() || out_certificate.is_null() || out_len.is_null() {
        return PqidError::InvalidArgument as i32;
    }
    let (Some(ca_private_key), Some(csr), Some(ca_certificate)) = (
        input(ca_private_key, ca_private_key_len),
        input(csr, csr_len),
        input(ca_certificate, ca_certificate_len),
    ) else {
        return PqidError::InvalidArgument as i32;
    };

    let handle = &*handle;
    match handle.runtime.block_on(handle.engine.sign_certificate(
        ca_private_key,
        csr,
        ca_certificate,
        validity(validity_days),
    )) {
        Ok(certificate) => hand_out(certificate.as_bytes(), out_certificate, out_len),
        Err(e) => fail("sign_certificate", &e),
    }
}

/// Sign a message.
///
/// # Safety
///
/// - `handle` must be a valid handle from `pqid_init`
/// - input pointers must be readable for their stated lengths
/// - `out_signature` and `out_len` must be valid pointers
#[no_mangle]
pub unsafe extern "C" fn pqid_sign(
    handle: *mut PqidHandle,
    private_key: *const u8,
    private_key_len: usize,
    message: *const u8,
    message_len: usize,
    out_signature: *mut *mut u8,
    out_len: *mut usize,
) -> i32 {
    if handle.is_null() || out_signature.is_null() || out_len.is_null() {
        return PqidError::InvalidArgument as i32;
    }
    let (Some(private_key), Some(message)) =
        (input(private_key, private_key_len), input(message, message_len))
    else {
        return PqidError::InvalidArgument as i32;
    };

    let handle = &*handle;
    match handle.runtime.block_on(handle.engine.sign(private_key, message)) {
        Ok(signature) => hand_out(signature.as_bytes(), out_signature, out_len),
        Err(e) => fail("sign", &e),
    }
}

/// Verify a signature against a raw public key.
///
/// # Safety
///
/// - `handle` must be a valid handle from `pqid_init`
/// - input pointers must be readable for their stated lengths
/// - `out_valid` must be a valid pointer
#[no_mangle]
pub unsafe extern "C" fn pqid_verify(
    handle: *mut PqidHandle,
    public_key: *const u8,
    public_key_len: usize,
    signature: *const u8,
    signature_len: usize,
    message: *const u8,
    message_len: usize,
    out_valid: *mut i32,
) -> i32 {
    if handle.is_null() || out_valid.is_null() {
        return PqidError::InvalidArgument as i32;
    }
    let (Some(public_key), Some(signature), Some(message)) = (
        input(public_key, public_key_len),
        input(signature, signature_len),
        input(message, message_len),
    ) else {
        return PqidError::InvalidArgument as i32;
    };

    let handle = &*handle;
    match handle
        .runtime
        .block_on(handle.engine.verify(public_key, signature, message))
    {
        Ok(valid) => {
            *out_valid = i32::from(valid);
            PqidError::Success as i32
        },
        Err(e) => fail("verify", &e),
    }
}

/// Verify a signature against the public key inside a certificate.
///
/// # Safety
///
/// - `handle` must be a valid handle from `pqid_init`
/// - input pointers must be readable for their stated lengths
/// - `out_valid` must be a valid pointer
#[no_mangle]
pub unsafe extern "C" fn pqid_verify_with_certificate(
    handle: *mut PqidHandle,
    certificate: *const u8,
    certificate_len: usize,
    signature: *const u8,
    signature_len: usize,
    message: *const u8,
    message_len: usize,
    out_valid: *mut i32,
) -> i32 {
    if handle.is_null() || out_valid.is_null() {
        return PqidError::InvalidArgument as i32;
    }
    let (Some(certificate), Some(signature), Some(message)) = (
        input(certificate, certificate_len),
        input(signature, signature_len),
        input(message, message_len),
    ) else {
        return PqidError::InvalidArgument as i32;
    };

    let handle = &*handle;
    match handle.runtime.block_on(
        handle
            .engine
            .verify_with_certificate(certificate, signature, message),
    ) {
        Ok(valid) => {
            *out_valid = i32::from(valid);
            PqidError::Success as i32
        },
        Err(e) => fail("verify_with_certificate", &e),
    }
}

/// Check that a certificate was issued by a CA certificate.
///
/// # Safety
///
/// - `handle` must be a valid handle from `pqid_init`
/// - input pointers must be readable for their stated lengths
/// - `out_valid` must be a valid pointer
#[no_mangle]
pub unsafe extern "C" fn pqid_verify_certificate_issued_by_ca(
    handle: *mut PqidHandle,
    certificate: *const u8,
    certificate_len: usize,
    ca_certificate: *const u8,
    ca_certificate_len: usize,
    out_valid: *mut i32,
) -> i32 {
    if handle.is_null() || out_valid.is_null() {
        return PqidError::InvalidArgument as i32;
    }
    let (Some(certificate), Some(ca_certificate)) = (
        input(certificate, certificate_len),
        input(ca_certificate, ca_certificate_len),
    ) else {
        return PqidError::InvalidArgument as i32;
    };

    let handle = &*handle;
    match handle.runtime.block_on(
        handle
            .engine
            .verify_certificate_issued_by_ca(certificate, ca_certificate),
    ) {
        Ok(valid) => {
            *out_valid = i32::from(valid);
            PqidError::Success as i32
        },
        Err(e) => fail("verify_certificate_issued_by_ca", &e),
    }
}

/// Free memory allocated by pqid functions.
///
/// # Safety
///
/// `data` must be a pointer returned by a pqid function, or NULL.
#[no_mangle]
pub unsafe extern "C" fn pqid_free(data: *mut c_void) {
    if !data.is_null() {
        libc::free(data);
    }
}

/// Destroy the pqid handle and release resources.
///
/// # Safety
///
/// `handle` must be a valid handle from `pqid_init`.
/// After this call, the handle is invalid and must not be used.
#[no_mangle]
pub unsafe extern "C" fn pqid_destroy(handle: *mut PqidHandle) {
    if !handle.is_null() {
        drop(Box::from_raw(handle));
    }
}

/// Get the library version.
///
/// Returns a static string with the version number.
#[no_mangle]
pub extern "C" fn pqid_version() -> *const libc::c_char {
    concat!(env!("CARGO_PKG_VERSION"), "\0").as_ptr() as *const libc::c_char
}
