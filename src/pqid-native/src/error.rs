//! Error types for the native engine.

use pqid_crypto::CryptoError;
use thiserror::Error;

use crate::heap::Ptr;

/// Errors raised inside the native engine.
///
/// Primitives never surface these across the call boundary; they are logged
/// and collapsed into the primitive's failure value (`0` or `false`). The heap
/// accessors on [`crate::NativeHeap`] do return them to the caller.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Address 0 was used where a live allocation was required.
    #[error("Null pointer dereference")]
    NullPointer,

    /// Access falls outside every live allocation.
    #[error("Out of bounds access: {len} bytes at {ptr:#x}")]
    OutOfBounds {
        /// Start address of the access.
        ptr: Ptr,
        /// Number of bytes accessed.
        len: usize,
    },

    /// A C string had no NUL terminator before the end of its allocation.
    #[error("Unterminated string at {ptr:#x}")]
    UnterminatedString {
        /// Address of the string.
        ptr: Ptr,
    },

    /// Subject attributes were rejected.
    #[error("Invalid subject: {reason}")]
    InvalidSubject {
        /// Reason the subject is invalid.
        reason: String,
    },

    /// A CSR or certificate record could not be decoded.
    #[error("Malformed record: {reason}")]
    MalformedRecord {
        /// Reason the record is malformed.
        reason: String,
    },

    /// The CSR's own signature does not verify.
    #[error("CSR signature does not verify")]
    CsrSignatureMismatch,

    /// The issuing certificate is not marked as a certificate authority.
    #[error("Issuer is not a certificate authority: {subject}")]
    NotCertificateAuthority {
        /// Subject of the would-be issuer.
        subject: String,
    },

    /// A certificate is used outside its validity window.
    #[error("Certificate not valid at {timestamp}: window {not_before}..={not_after}")]
    CertificateNotCurrent {
        /// Time of use, unix seconds.
        timestamp: i64,
        /// Start of validity.
        not_before: i64,
        /// End of validity.
        not_after: i64,
    },

    /// The encoded output does not fit the caller's buffer.
    #[error("Output too large: need {needed} bytes, capacity {capacity}")]
    OutputTooLarge {
        /// Bytes required.
        needed: usize,
        /// Bytes available.
        capacity: usize,
    },

    /// Validity period overflows the timestamp range.
    #[error("Invalid validity period: {days} days")]
    InvalidValidity {
        /// Requested number of days.
        days: u32,
    },

    /// Engine configuration rejected.
    #[error("Invalid configuration: {reason}")]
    InvalidConfiguration {
        /// Reason the configuration is invalid.
        reason: String,
    },

    /// Internal lock was poisoned by a panicking thread.
    #[error("Engine lock poisoned")]
    LockPoisoned,

    /// Underlying signature primitive failed.
    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

impl EngineError {
    /// Create a malformed record error.
    #[must_use]
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedRecord {
            reason: reason.into(),
        }
    }

    /// Create an invalid subject error.
    #[must_use]
    pub fn invalid_subject(reason: impl Into<String>) -> Self {
        Self::InvalidSubject {
            reason: reason.into(),
        }
    }

    /// Create an invalid configuration error.
    #[must_use]
    pub fn invalid_configuration(reason: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            reason: reason.into(),
        }
    }
}
