//! # pqid-crypto
//!
//! Post-quantum signature primitives for the pqid identity engine.
//!
//! Everything in pqid is signed with **ML-DSA-65** (FIPS 204). Keys travel as
//! raw encodings of fixed size:
//!
//! ```text
//! private key  4032 bytes
//! public key   1952 bytes
//! signature    3309 bytes
//! ```
//!
//! The [`PqcSigner`] / [`PqcVerifier`] traits keep the algorithm behind a seam
//! so the native engine can be exercised against the same interface in tests.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod mldsa65;
mod signer;
mod types;

pub use error::{CryptoError, Material};
pub use mldsa65::{MlDsa65Signer, MlDsa65Verifier};
pub use signer::{PqcSigner, PqcVerifier};
pub use types::{
    PqcAlgorithm, ML_DSA_65_PRIVATE_KEY_SIZE, ML_DSA_65_PUBLIC_KEY_SIZE, ML_DSA_65_SEED_SIZE,
    ML_DSA_65_SIGNATURE_SIZE,
};

/// Constant-time byte comparison.
///
/// Compares two byte slices in constant time to prevent timing attacks.
/// Returns `true` if the slices are equal, `false` otherwise.
///
/// Uses the `subtle` crate's `ConstantTimeEq` trait for the comparison.
/// The length check still returns early, but length is typically not secret.
#[must_use]
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    use subtle::ConstantTimeEq;

    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}
