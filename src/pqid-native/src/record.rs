//! Binary CSR and certificate records.
//!
//! All integers are big-endian; strings are length-prefixed UTF-8.
//!
//! ```text
//! Name        := count:u16 || count x (len:u16 || utf8[len])
//! CSR         := "PQCR" || 1:u8 || Name(subject) || public_key[1952]
//!                || sig_len:u16 || signature
//! Certificate := "PQCT" || 3:u8 || serial[16] || not_before:i64 || not_after:i64
//!                || Name(issuer) || Name(subject) || public_key[1952]
//!                || is_ca:u8 || subject_key_id[20] || authority_key_id[20]
//!                || sig_len:u16 || signature
//! ```
//!
//! The signature covers every byte in front of `sig_len`. Trailing bytes
//! after the signature make the record invalid.

use serde::Serialize;
use sha2::{Digest, Sha256};

use pqid_crypto::ML_DSA_65_PUBLIC_KEY_SIZE;

use crate::error::EngineError;

/// CSR magic.
pub const CSR_MAGIC: &[u8; 4] = b"PQCR";

/// CSR format version.
pub const CSR_VERSION: u8 = 1;

/// Certificate magic.
pub const CERTIFICATE_MAGIC: &[u8; 4] = b"PQCT";

/// Certificate format version.
pub const CERTIFICATE_VERSION: u8 = 3;

/// Serial number length.
pub const SERIAL_SIZE: usize = 16;

/// Key identifier length (truncated SHA-256).
pub const KEY_ID_SIZE: usize = 20;

/// Key identifier of an encoded public key: first 20 bytes of its SHA-256.
#[must_use]
pub fn key_identifier(public_key: &[u8]) -> [u8; KEY_ID_SIZE] {
    let digest = Sha256::digest(public_key);
    let mut id = [0u8; KEY_ID_SIZE];
    id.copy_from_slice(&digest[..KEY_ID_SIZE]);
    id
}

/// Ordered distinguished-name attributes, e.g. `["C=US", "CN=example.com"]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Name(Vec<String>);

impl Name {
    /// Build a name from `KEY=VALUE` attributes.
    ///
    /// Each attribute needs a non-empty key and a non-empty value.
    pub fn from_attributes(attributes: Vec<String>) -> Result<Self, EngineError> {
        if attributes.is_empty() {
            return Err(EngineError::invalid_subject("no attributes"));
        }
        if attributes.len() > usize::from(u16::MAX) {
            return Err(EngineError::invalid_subject("too many attributes"));
        }
        for attribute in &attributes {
            match attribute.find('=') {
                Some(pos) if pos > 0 && pos + 1 < attribute.len() => {}
                _ => {
                    return Err(EngineError::invalid_subject(format!(
                        "expected KEY=VALUE, got {attribute:?}"
                    )))
                }
            }
            if attribute.len() > usize::from(u16::MAX) {
                return Err(EngineError::invalid_subject("attribute too long"));
            }
        }
        Ok(Self(attributes))
    }

    /// The attributes in order.
    #[must_use]
    pub fn attributes(&self) -> &[String] {
        &self.0
    }

    fn encode_into(&self, out: &mut Vec<u8>) {
        // Lengths are bounded by from_attributes / decode.
        out.extend_from_slice(&(self.0.len() as u16).to_be_bytes());
        for attribute in &self.0 {
            out.extend_from_slice(&(attribute.len() as u16).to_be_bytes());
            out.extend_from_slice(attribute.as_bytes());
        }
    }

    fn decode_from(reader: &mut Reader<'_>) -> Result<Self, EngineError> {
        let count = reader.u16()?;
        let mut attributes = Vec::with_capacity(usize::from(count));
        for _ in 0..count {
            let len = reader.u16()?;
            let raw = reader.take(usize::from(len))?;
            let attribute = std::str::from_utf8(raw)
                .map_err(|_| EngineError::malformed("name attribute is not UTF-8"))?;
            attributes.push(attribute.to_string());
        }
        Self::from_attributes(attributes)
            .map_err(|e| EngineError::malformed(format!("bad name: {e}")))
    }
}

impl std::fmt::Display for Name {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0.join(", "))
    }
}

/// Certificate signing request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsrRecord {
    /// Requested subject.
    pub subject: Name,
    /// Encoded ML-DSA-65 public key.
    pub public_key: Vec<u8>,
    /// Signature by the matching private key over [`Self::to_be_signed`].
    pub signature: Vec<u8>,
}

impl CsrRecord {
    /// Bytes covered by the signature.
    #[must_use]
    pub fn to_be_signed(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(16 + self.public_key.len());
        out.extend_from_slice(CSR_MAGIC);
        out.push(CSR_VERSION);
        self.subject.encode_into(&mut out);
        out.extend_from_slice(&self.public_key);
        out
    }

    /// Full encoding.
    pub fn encode(&self) -> Result<Vec<u8>, EngineError> {
        let mut out = self.to_be_signed();
        append_signature(&mut out, &self.signature)?;
        Ok(out)
    }

    /// Decode and validate structure (not the signature).
    pub fn decode(bytes: &[u8]) -> Result<Self, EngineError> {
        let mut reader = Reader::new(bytes);
        reader.expect_magic(CSR_MAGIC, CSR_VERSION)?;
        let subject = Name::decode_from(&mut reader)?;
        let public_key = reader.take(ML_DSA_65_PUBLIC_KEY_SIZE)?.to_vec();
        let signature = reader.signature()?;
        reader.finish()?;
        Ok(Self {
            subject,
            public_key,
            signature,
        })
    }
}

/// Issued certificate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CertificateRecord {
    /// Random serial number, top bit clear.
    #[serde(serialize_with = "hex::serde::serialize")]
    pub serial: [u8; SERIAL_SIZE],
    /// Start of validity, unix seconds.
    pub not_before: i64,
    /// End of validity, unix seconds.
    pub not_after: i64,
    /// Issuer name.
    pub issuer: Name,
    /// Subject name.
    pub subject: Name,
    /// Encoded ML-DSA-65 public key of the subject.
    #[serde(skip)]
    pub public_key: Vec<u8>,
    /// Whether the certificate may issue other certificates.
    pub is_ca: bool,
    /// Key identifier of `public_key`.
    #[serde(serialize_with = "hex::serde::serialize")]
    pub subject_key_id: [u8; KEY_ID_SIZE],
    /// Key identifier of the issuing key.
    #[serde(serialize_with = "hex::serde::serialize")]
    pub authority_key_id: [u8; KEY_ID_SIZE],
    /// Issuer's signature over [`Self::to_be_signed`].
    #[serde(skip)]
    pub signature: Vec<u8>,
}

impl CertificateRecord {
    /// Bytes covered by the signature.
    #[must_use]
    pub fn to_be_signed(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(128 + self.public_key.len());
        out.extend_from_slice(CERTIFICATE_MAGIC);
        out.push(CERTIFICATE_VERSION);
        out.extend_from_slice(&self.serial);
        out.extend_from_slice(&self.not_before.to_be_bytes());
        out.extend_from_slice(&self.not_after.to_be_bytes());
        self.issuer.encode_into(&mut out);
        self.subject.encode_into(&mut out);
        out.extend_from_slice(&self.public_key);
        out.push(u8::from(self.is_ca));
        out.extend_from_slice(&self.subject_key_id);
        out.extend_from_slice(&self.authority_key_id);
        out
    }

    /// Full encoding.
    pub fn encode(&self) -> Result<Vec<u8>, EngineError> {
        let mut out = self.to_be_signed();
        append_signature(&mut out, &self.signature)?;
        Ok(out)
    }

    /// Decode and validate structure (not the signature).
    pub fn decode(bytes: &[u8]) -> Result<Self, EngineError> {
        let mut reader = Reader::new(bytes);
        reader.expect_magic(CERTIFICATE_MAGIC, CERTIFICATE_VERSION)?;
        let serial = reader.array::<SERIAL_SIZE>()?;
        let not_before = i64::from_be_bytes(reader.array::<8>()?);
        let not_after = i64::from_be_bytes(reader.array::<8>()?);
        let issuer = Name::decode_from(&mut reader)?;
        let subject = Name::decode_from(&mut reader)?;
        let public_key = reader.take(ML_DSA_65_PUBLIC_KEY_SIZE)?.to_vec();
        let is_ca = match reader.array::<1>()?[0] {
            0 => false,
            1 => true,
            other => return Err(EngineError::malformed(format!("is_ca flag {other}"))),
        };
        let subject_key_id = reader.array::<KEY_ID_SIZE>()?;
        let authority_key_id = reader.array::<KEY_ID_SIZE>()?;
        let signature = reader.signature()?;
        reader.finish()?;
        Ok(Self {
            serial,
            not_before,
            not_after,
            issuer,
            subject,
            public_key,
            is_ca,
            subject_key_id,
            authority_key_id,
            signature,
        })
    }

    /// Whether issuer and subject coincide.
    #[must_use]
    pub fn is_self_issued(&self) -> bool {
        self.issuer == self.subject
    }

    /// Whether `timestamp` (unix seconds) lies inside the validity window,
    /// both ends inclusive.
    #[must_use]
    pub fn is_valid_at(&self, timestamp: i64) -> bool {
        self.not_before <= timestamp && timestamp <= self.not_after
    }
}

fn append_signature(out: &mut Vec<u8>, signature: &[u8]) -> Result<(), EngineError> {
    let len = u16::try_from(signature.len())
        .map_err(|_| EngineError::malformed("signature longer than 65535 bytes"))?;
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(signature);
    Ok(())
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], EngineError> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.bytes.len())
            .ok_or_else(|| EngineError::malformed(format!("truncated at offset {}", self.pos)))?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], EngineError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn u16(&mut self) -> Result<u16, EngineError> {
        Ok(u16::from_be_bytes(self.array::<2>()?))
    }

    fn expect_magic(&mut self, magic: &[u8; 4], version: u8) -> Result<(), EngineError> {
        if self.take(4)? != magic {
            return Err(EngineError::malformed("bad magic"));
        }
        let found = self.array::<1>()?[0];
        if found != version {
            return Err(EngineError::malformed(format!("unsupported version {found}")));
        }
        Ok(())
    }

    fn signature(&mut self) -> Result<Vec<u8>, EngineError> {
        let len = self.u16()?;
        Ok(self.take(usize::from(len))?.to_vec())
    }

    fn finish(&self) -> Result<(), EngineError> {
        if self.pos != self.bytes.len() {
            return Err(EngineError::malformed(format!(
                "{} trailing bytes",
                self.bytes.len() - self.pos
            )));
        }
        Ok(())
    }
}
