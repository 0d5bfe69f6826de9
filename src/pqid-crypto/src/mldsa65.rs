//! ML-DSA (FIPS 204) post-quantum signature operations.
//!
//! This module provides ML-DSA-65 key generation, signing and verification
//! over the raw encodings that cross the native boundary.
//!
//! ## Key Sizes
//!
//! - Public key: 1,952 bytes
//! - Secret key: 4,032 bytes
//! - Signature: 3,309 bytes
//!
//! Signatures are produced with the deterministic variant and an empty
//! context string.

use ml_dsa::signature::{Signer, Verifier};
use ml_dsa::{
    EncodedSignature, EncodedSigningKey, EncodedVerifyingKey, KeyGen, MlDsa65, Signature,
    SigningKey, VerifyingKey, B32,
};
use rand_core::{OsRng, RngCore};

use crate::error::{CryptoError, Material};
use crate::signer::{PqcSigner, PqcVerifier};
use crate::types::{
    PqcAlgorithm, ML_DSA_65_PRIVATE_KEY_SIZE, ML_DSA_65_PUBLIC_KEY_SIZE, ML_DSA_65_SEED_SIZE,
    ML_DSA_65_SIGNATURE_SIZE,
};

/// ML-DSA-65 signer.
///
/// A signer created by key generation knows both halves of the key pair.
/// A signer imported from an encoded private key can sign but cannot report
/// its public key, because the expanded signing key does not carry `t1`.
pub struct MlDsa65Signer {
    signing_key: SigningKey<MlDsa65>,
    verifying_key: Option<VerifyingKey<MlDsa65>>,
}

impl MlDsa65Signer {
    /// Create a new signer with a randomly generated key pair.
    ///
    /// # Errors
    ///
    /// Currently infallible, but returns Result for API consistency.
    pub fn new() -> Result<Self, CryptoError> {
        // Generate a random 32-byte seed using the system CSPRNG
        let mut seed_bytes = [0u8; ML_DSA_65_SEED_SIZE];
        OsRng.fill_bytes(&mut seed_bytes);

        Self::from_seed(&seed_bytes)
    }

    /// Create a signer from seed bytes.
    ///
    /// # Arguments
    ///
    /// * `seed` - 32-byte seed for deterministic key generation
    ///
    /// # Errors
    ///
    /// Returns error if seed is wrong length.
    pub fn from_seed(seed: &[u8]) -> Result<Self, CryptoError> {
        CryptoError::check_length(Material::Seed, ML_DSA_65_SEED_SIZE, seed.len())?;

        let mut xi = [0u8; ML_DSA_65_SEED_SIZE];
        xi.copy_from_slice(seed);
        let xi = B32::from(xi);

        // Re-materialize from the encodings so the signer owns its keys outright.
        let key_pair = MlDsa65::key_gen_internal(&xi);
        let signing_key = SigningKey::<MlDsa65>::decode(&key_pair.signing_key().encode());
        let verifying_key = VerifyingKey::<MlDsa65>::decode(&key_pair.verifying_key().encode());
        Ok(Self {
            signing_key,
            verifying_key: Some(verifying_key),
        })
    }

    /// Import a signer from a 4032-byte encoded private key.
    ///
    /// # Errors
    ///
    /// Returns error if the key has the wrong length.
    pub fn from_private_key(private_key: &[u8]) -> Result<Self, CryptoError> {
        CryptoError::check_length(
            Material::PrivateKey,
            ML_DSA_65_PRIVATE_KEY_SIZE,
            private_key.len(),
        )?;

        let encoded = EncodedSigningKey::<MlDsa65>::try_from(private_key)
            .map_err(|_| CryptoError::Malformed {
                material: Material::PrivateKey,
                detail: "encoding rejected",
            })?;

        Ok(Self {
            signing_key: SigningKey::<MlDsa65>::decode(&encoded),
            verifying_key: None,
        })
    }

    /// Encoded private key (4032 bytes).
    ///
    /// The caller owns the returned buffer and is responsible for its lifetime.
    #[must_use]
    pub fn private_key(&self) -> Vec<u8> {
        self.signing_key.encode().to_vec()
    }
}

impl PqcSigner for MlDsa65Signer {
    fn algorithm(&self) -> PqcAlgorithm {
        PqcAlgorithm::MlDsa65
    }

    fn public_key(&self) -> Result<Vec<u8>, CryptoError> {
        let verifying_key = self
            .verifying_key
            .as_ref()
            .ok_or(CryptoError::PublicKeyUnavailable)?;
        Ok(verifying_key.encode().to_vec())
    }

    fn sign(&self, data: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let signature: Signature<MlDsa65> = self
            .signing_key
            .try_sign(data)
            .map_err(|e| CryptoError::Signing(e.to_string()))?;
        Ok(signature.encode().to_vec())
    }
}

/// ML-DSA-65 verifier.
pub struct MlDsa65Verifier;

impl MlDsa65Verifier {
    /// Create a new verifier.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Default for MlDsa65Verifier {
    fn default() -> Self {
        Self::new()
    }
}

impl PqcVerifier for MlDsa65Verifier {
    fn verify(
        &self,
        public_key: &[u8],
        data: &[u8],
        signature: &[u8],
    ) -> Result<bool, CryptoError> {
        CryptoError::check_length(Material::PublicKey, ML_DSA_65_PUBLIC_KEY_SIZE, public_key.len())?;
        CryptoError::check_length(Material::Signature, ML_DSA_65_SIGNATURE_SIZE, signature.len())?;

        // Parse public key: &[u8] -> EncodedVerifyingKey -> VerifyingKey
        let encoded_vk = EncodedVerifyingKey::<MlDsa65>::try_from(public_key)
            .map_err(|_| CryptoError::Malformed {
                material: Material::PublicKey,
                detail: "encoding rejected",
            })?;
        let vk = VerifyingKey::<MlDsa65>::decode(&encoded_vk);

        // Parse signature: &[u8] -> EncodedSignature -> Signature
        let encoded_sig = EncodedSignature::<MlDsa65>::try_from(signature)
            .map_err(|_| CryptoError::Malformed {
                material: Material::Signature,
                detail: "encoding rejected",
            })?;
        let sig = Signature::<MlDsa65>::decode(&encoded_sig)
            .ok_or(CryptoError::Malformed {
                material: Material::Signature,
                detail: "malformed hint vector",
            })?;

        Ok(vk.verify(data, &sig).is_ok())
    }
}
