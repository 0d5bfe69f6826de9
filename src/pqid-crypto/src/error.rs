//! Errors from the ML-DSA-65 layer.

use std::fmt;

use thiserror::Error;

/// Which ML-DSA-65 buffer an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Material {
    /// 32-byte key generation seed.
    Seed,
    /// 4032-byte encoded signing key.
    PrivateKey,
    /// 1952-byte encoded verifying key.
    PublicKey,
    /// 3309-byte encoded signature.
    Signature,
}

impl fmt::Display for Material {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Seed => "ML-DSA-65 seed",
            Self::PrivateKey => "ML-DSA-65 private key",
            Self::PublicKey => "ML-DSA-65 public key",
            Self::Signature => "ML-DSA-65 signature",
        })
    }
}

/// Errors from key import, signing and signature decoding.
///
/// A signature that decodes but does not match is not an error; verifiers
/// report it as `Ok(false)`.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// A buffer crossed the engine boundary with the wrong length.
    #[error("{material} must be {expected} bytes, got {actual}")]
    WrongLength {
        /// Buffer role.
        material: Material,
        /// Length the encoding requires.
        expected: usize,
        /// Length received.
        actual: usize,
    },

    /// Correct length, but the bytes do not decode.
    #[error("{material} rejected: {detail}")]
    Malformed {
        /// Buffer role.
        material: Material,
        /// What the decoder refused.
        detail: &'static str,
    },

    /// The signer was imported from a bare private key and has no public half.
    #[error("Public key not available for this signer")]
    PublicKeyUnavailable,

    /// The signing primitive itself failed.
    #[error("ML-DSA-65 signing failed: {0}")]
    Signing(String),
}

impl CryptoError {
    /// Check `actual` against the fixed size of `material`.
    pub(crate) fn check_length(
        material: Material,
        expected: usize,
        actual: usize,
    ) -> Result<(), Self> {
        if actual == expected {
            Ok(())
        } else {
            Err(Self::WrongLength {
                material,
                expected,
                actual,
            })
        }
    }

    /// The buffer role this error is about, if any.
    #[must_use]
    pub fn material(&self) -> Option<Material> {
        match self {
            Self::WrongLength { material, .. } | Self::Malformed { material, .. } => {
                Some(*material)
            }
            Self::PublicKeyUnavailable | Self::Signing(_) => None,
        }
    }
}
