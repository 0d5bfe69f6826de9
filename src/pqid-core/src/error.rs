//! Error types for identity operations.

use pqid_native::EngineError;
use thiserror::Error;

/// Errors that can occur during key, certificate and signature operations.
#[derive(Debug, Error)]
pub enum PkiError {
    /// An operation ran before the engine was initialized.
    #[error("Engine not initialized")]
    NotInitialized,

    /// Loading or probing the native engine failed.
    #[error("Engine initialization failed: {reason}")]
    InitializationFailed {
        /// Reason for the failure.
        reason: String,
    },

    /// Argument rejected before any native call.
    #[error("Invalid argument: {reason}")]
    InvalidArgument {
        /// Reason the argument is invalid.
        reason: String,
    },

    /// The native allocator returned null.
    #[error("Native allocation of {size} bytes failed")]
    AllocationFailure {
        /// Requested size.
        size: usize,
    },

    /// Access beyond a foreign buffer's capacity.
    #[error("Buffer overrun: {requested} bytes requested, capacity {capacity}")]
    BufferOverrun {
        /// Bytes requested.
        requested: usize,
        /// Capacity of the buffer.
        capacity: usize,
    },

    /// Key pair generation failed.
    #[error("Key generation failed")]
    KeyGenerationFailed,

    /// CSR generation failed.
    #[error("CSR generation failed")]
    CsrGenerationFailed,

    /// Self-signed certificate generation failed.
    #[error("Certificate generation failed")]
    CertificateGenerationFailed,

    /// CA signing of a CSR failed.
    #[error("Certificate signing failed")]
    CertificateSigningFailed,

    /// Message signing failed.
    #[error("Signing failed")]
    SigningFailed,

    /// A verification operation could not run.
    #[error("Verification error: {reason}")]
    VerificationError {
        /// Reason for the failure.
        reason: String,
    },

    /// Malformed hexadecimal text.
    #[error("Invalid hex: {reason}")]
    InvalidHex {
        /// Reason the input is invalid.
        reason: String,
    },

    /// Malformed PEM text.
    #[error("Invalid PEM: {reason}")]
    InvalidPem {
        /// Reason the input is invalid.
        reason: String,
    },

    /// Native engine fault.
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),
}

impl PkiError {
    /// Create an invalid argument error.
    #[must_use]
    pub fn invalid_argument(reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            reason: reason.into(),
        }
    }

    /// Create an initialization failure.
    #[must_use]
    pub fn initialization(reason: impl Into<String>) -> Self {
        Self::InitializationFailed {
            reason: reason.into(),
        }
    }

    /// Create a verification error.
    #[must_use]
    pub fn verification(reason: impl Into<String>) -> Self {
        Self::VerificationError {
            reason: reason.into(),
        }
    }

    /// Create an invalid PEM error.
    #[must_use]
    pub fn invalid_pem(reason: impl Into<String>) -> Self {
        Self::InvalidPem {
            reason: reason.into(),
        }
    }

    /// Whether the error was raised before the native engine was touched.
    #[must_use]
    pub fn is_argument_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidArgument { .. } | Self::InvalidHex { .. } | Self::InvalidPem { .. }
        )
    }

    /// Rewrap marshaling failures for verification operations.
    ///
    /// Verification reports allocation and heap faults as
    /// [`PkiError::VerificationError`]; argument errors pass through.
    #[must_use]
    pub(crate) fn into_verification(self) -> Self {
        match self {
            e @ (Self::AllocationFailure { .. }
            | Self::BufferOverrun { .. }
            | Self::Engine(_)) => Self::verification(e.to_string()),
            other => other,
        }
    }
}
