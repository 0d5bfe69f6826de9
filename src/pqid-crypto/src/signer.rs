//! Signer and verifier seams.

use crate::error::CryptoError;
use crate::types::PqcAlgorithm;

/// Trait for PQC signature operations.
pub trait PqcSigner {
    /// Get the algorithm used by this signer.
    fn algorithm(&self) -> PqcAlgorithm;

    /// Get the encoded public key.
    fn public_key(&self) -> Result<Vec<u8>, CryptoError>;

    /// Sign data and return the encoded signature.
    fn sign(&self, data: &[u8]) -> Result<Vec<u8>, CryptoError>;
}

/// Trait for PQC signature verification.
pub trait PqcVerifier {
    /// Verify a signature against a public key.
    ///
    /// Returns `Ok(false)` for a well-formed signature that does not match.
    /// Malformed keys or signatures are reported as errors.
    fn verify(&self, public_key: &[u8], data: &[u8], signature: &[u8])
        -> Result<bool, CryptoError>;
}
