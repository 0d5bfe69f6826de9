//! Algorithm identifiers and fixed encoding sizes.

use serde::{Deserialize, Serialize};

/// ML-DSA-65 encoded signing key size.
pub const ML_DSA_65_PRIVATE_KEY_SIZE: usize = 4032;

/// ML-DSA-65 encoded verifying key size.
pub const ML_DSA_65_PUBLIC_KEY_SIZE: usize = 1952;

/// ML-DSA-65 encoded signature size.
pub const ML_DSA_65_SIGNATURE_SIZE: usize = 3309;

/// Key generation seed size (the FIPS 204 `xi` value).
pub const ML_DSA_65_SEED_SIZE: usize = 32;

/// Post-quantum signature algorithm.
///
/// Based on NIST FIPS 204 (ML-DSA), finalized August 2024.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum PqcAlgorithm {
    /// ML-DSA-65 (Dilithium3)
    /// Security level 3 (~192-bit classical)
    MlDsa65 = 2,
}

impl PqcAlgorithm {
    /// Get signature size in bytes.
    #[must_use]
    pub const fn signature_size(&self) -> usize {
        match self {
            Self::MlDsa65 => ML_DSA_65_SIGNATURE_SIZE,
        }
    }

    /// Get public key size in bytes.
    #[must_use]
    pub const fn public_key_size(&self) -> usize {
        match self {
            Self::MlDsa65 => ML_DSA_65_PUBLIC_KEY_SIZE,
        }
    }

    /// Get encoded private key size in bytes.
    #[must_use]
    pub const fn private_key_size(&self) -> usize {
        match self {
            Self::MlDsa65 => ML_DSA_65_PRIVATE_KEY_SIZE,
        }
    }

    /// Human-readable algorithm name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::MlDsa65 => "ML-DSA-65",
        }
    }
}
