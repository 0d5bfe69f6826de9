//! Identity artifacts exchanged with callers.
//!
//! Keys, CSRs, certificates and signatures are opaque byte buffers to the
//! orchestrator. The newtypes exist so an API cannot confuse one artifact
//! for another, and so tooling can serialize them as hex.

use std::fmt;

use pqid_crypto::{ML_DSA_65_PRIVATE_KEY_SIZE, ML_DSA_65_PUBLIC_KEY_SIZE};
use pqid_native::record::{CertificateRecord, CsrRecord};
use serde::{Deserialize, Serialize};

use crate::codec;
use crate::error::PkiError;

/// Freshly generated ML-DSA-65 key pair.
///
/// The engine keeps no copy; dropping this value is the only way the private
/// key goes away. `Debug` output never includes private key bytes.
///
/// Deserialization goes through [`KeyPair::from_parts`], so a decoded value
/// always carries correctly sized keys.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "EncodedKeyPair")]
pub struct KeyPair {
    #[serde(serialize_with = "hex::serde::serialize")]
    private_key: Vec<u8>,
    #[serde(serialize_with = "hex::serde::serialize")]
    public_key: Vec<u8>,
}

#[derive(Deserialize)]
struct EncodedKeyPair {
    #[serde(with = "hex")]
    private_key: Vec<u8>,
    #[serde(with = "hex")]
    public_key: Vec<u8>,
}

impl TryFrom<EncodedKeyPair> for KeyPair {
    type Error = PkiError;

    fn try_from(encoded: EncodedKeyPair) -> Result<Self, Self::Error> {
        Self::from_parts(encoded.private_key, encoded.public_key)
    }
}

impl KeyPair {
    /// Assemble a key pair from raw encodings.
    ///
    /// # Errors
    ///
    /// Returns [`PkiError::InvalidArgument`] if either key has the wrong size.
    pub fn from_parts(private_key: Vec<u8>, public_key: Vec<u8>) -> Result<Self, PkiError> {
        check_private_key(&private_key)?;
        check_public_key(&public_key)?;
        Ok(Self {
            private_key,
            public_key,
        })
    }

    /// Encoded private key (4032 bytes).
    #[must_use]
    pub fn private_key(&self) -> &[u8] {
        &self.private_key
    }

    /// Encoded public key (1952 bytes).
    #[must_use]
    pub fn public_key(&self) -> &[u8] {
        &self.public_key
    }

    /// Split into `(private_key, public_key)`.
    #[must_use]
    pub fn into_parts(self) -> (Vec<u8>, Vec<u8>) {
        (self.private_key, self.public_key)
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("private_key", &format_args!("<{} bytes redacted>", self.private_key.len()))
            .field("public_key", &codec::fingerprint(&self.public_key))
            .finish()
    }
}

/// Ordered subject attributes such as `["C=US", "CN=example.com"]`.
///
/// Order is significant. Entries must be non-empty and free of NUL bytes,
/// since each one crosses the native boundary as a C string. The engine
/// additionally requires `KEY=VALUE` shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct SubjectInfo(Vec<String>);

impl SubjectInfo {
    /// Validate and wrap attribute strings.
    ///
    /// # Errors
    ///
    /// Returns [`PkiError::InvalidArgument`] for an empty sequence, an empty
    /// entry, or an entry containing NUL.
    pub fn new<I, S>(entries: I) -> Result<Self, PkiError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let entries: Vec<String> = entries.into_iter().map(Into::into).collect();
        if entries.is_empty() {
            return Err(PkiError::invalid_argument("subject must have at least one entry"));
        }
        for (index, entry) in entries.iter().enumerate() {
            if entry.is_empty() {
                return Err(PkiError::invalid_argument(format!(
                    "subject entry {index} is empty"
                )));
            }
            if entry.contains('\0') {
                return Err(PkiError::invalid_argument(format!(
                    "subject entry {index} contains NUL"
                )));
            }
        }
        Ok(Self(entries))
    }

    /// The entries in order.
    #[must_use]
    pub fn entries(&self) -> &[String] {
        &self.0
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether there are no entries. Construction rejects an empty list, so
    /// this is false for every `SubjectInfo`; it pairs with [`Self::len`].
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl TryFrom<Vec<String>> for SubjectInfo {
    type Error = PkiError;

    fn try_from(entries: Vec<String>) -> Result<Self, Self::Error> {
        Self::new(entries)
    }
}

impl TryFrom<&[&str]> for SubjectInfo {
    type Error = PkiError;

    fn try_from(entries: &[&str]) -> Result<Self, Self::Error> {
        Self::new(entries.iter().copied())
    }
}

impl<'de> Deserialize<'de> for SubjectInfo {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let entries = Vec::<String>::deserialize(deserializer)?;
        Self::new(entries).map_err(serde::de::Error::custom)
    }
}

macro_rules! opaque_artifact {
    ($(#[$meta:meta])* $name:ident, $label:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(#[serde(with = "hex")] Vec<u8>);

        impl $name {
            /// PEM label for this artifact.
            pub const PEM_LABEL: &'static str = $label;

            /// Raw bytes.
            #[must_use]
            pub fn as_bytes(&self) -> &[u8] {
                &self.0
            }

            /// Take the raw bytes.
            #[must_use]
            pub fn into_bytes(self) -> Vec<u8> {
                self.0
            }

            /// Byte length.
            #[must_use]
            pub fn len(&self) -> usize {
                self.0.len()
            }

            /// Whether the buffer is empty.
            #[must_use]
            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }

            /// Encode as PEM.
            #[must_use]
            pub fn to_pem(&self) -> String {
                codec::to_pem(&self.0, Self::PEM_LABEL)
            }

            /// Decode from PEM, requiring this artifact's label.
            ///
            /// # Errors
            ///
            /// Returns [`PkiError::InvalidPem`] if the framing or label is wrong.
            pub fn from_pem(pem: &str) -> Result<Self, PkiError> {
                codec::from_pem_labeled(pem, Self::PEM_LABEL).map(Self)
            }
        }

        impl From<Vec<u8>> for $name {
            fn from(bytes: Vec<u8>) -> Self {
                Self(bytes)
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                &self.0
            }
        }
    };
}

opaque_artifact!(
    /// Certificate signing request binding a public key to a subject.
    Csr,
    codec::LABEL_CSR
);

opaque_artifact!(
    /// Certificate issued by a CA or by its own subject.
    Certificate,
    codec::LABEL_CERTIFICATE
);

opaque_artifact!(
    /// ML-DSA-65 signature over one message.
    Signature,
    codec::LABEL_SIGNATURE
);

impl Csr {
    /// Decode the engine's CSR record for inspection.
    ///
    /// # Errors
    ///
    /// Returns [`PkiError::Engine`] if the bytes are not a CSR record.
    pub fn record(&self) -> Result<CsrRecord, PkiError> {
        Ok(CsrRecord::decode(&self.0)?)
    }
}

impl Certificate {
    /// Decode the engine's certificate record for inspection.
    ///
    /// # Errors
    ///
    /// Returns [`PkiError::Engine`] if the bytes are not a certificate record.
    pub fn record(&self) -> Result<CertificateRecord, PkiError> {
        Ok(CertificateRecord::decode(&self.0)?)
    }
}

pub(crate) fn check_private_key(key: &[u8]) -> Result<(), PkiError> {
    if key.len() != ML_DSA_65_PRIVATE_KEY_SIZE {
        return Err(PkiError::invalid_argument(format!(
            "private key must be {ML_DSA_65_PRIVATE_KEY_SIZE} bytes, got {}",
            key.len()
        )));
    }
    Ok(())
}

pub(crate) fn check_public_key(key: &[u8]) -> Result<(), PkiError> {
    if key.len() != ML_DSA_65_PUBLIC_KEY_SIZE {
        return Err(PkiError::invalid_argument(format!(
            "public key must be {ML_DSA_65_PUBLIC_KEY_SIZE} bytes, got {}",
            key.len()
        )));
    }
    Ok(())
}
