//! Configuration for the identity engine.

use crate::error::PkiError;

/// Default capacity of native output buffers: 1 MiB.
pub const DEFAULT_OUTPUT_CAPACITY: usize = 1024 * 1024;

/// Default certificate validity in days.
pub const DEFAULT_VALIDITY_DAYS: u32 = 365;

/// Largest output buffer the 32-bit native address space can hold.
pub const MAX_OUTPUT_CAPACITY: usize = u32::MAX as usize;

/// Configuration for [`crate::IdentityEngine`].
#[derive(Debug, Clone)]
pub struct PkiConfig {
    /// Size of each native output buffer (CSR, certificate, signature).
    /// Outputs larger than this fail instead of being truncated.
    pub output_capacity: usize,
    /// Validity used when a certificate operation is given `None`.
    pub default_validity_days: u32,
}

impl Default for PkiConfig {
    fn default() -> Self {
        Self {
            output_capacity: DEFAULT_OUTPUT_CAPACITY,
            default_validity_days: DEFAULT_VALIDITY_DAYS,
        }
    }
}

impl PkiConfig {
    /// Set the output buffer capacity.
    #[must_use]
    pub fn output_capacity(mut self, bytes: usize) -> Self {
        self.output_capacity = bytes;
        self
    }

    /// Set the default validity period.
    #[must_use]
    pub fn default_validity_days(mut self, days: u32) -> Self {
        self.default_validity_days = days;
        self
    }

    /// Check that the configuration can drive a native engine.
    ///
    /// # Errors
    ///
    /// Returns [`PkiError::InvalidArgument`] for a zero output capacity, a
    /// capacity past [`MAX_OUTPUT_CAPACITY`], or a zero default validity.
    pub fn validate(&self) -> Result<(), PkiError> {
        if self.output_capacity == 0 {
            return Err(PkiError::invalid_argument("output_capacity must be non-zero"));
        }
        if self.output_capacity > MAX_OUTPUT_CAPACITY {
            return Err(PkiError::invalid_argument(format!(
                "output_capacity {} exceeds the native address space ({MAX_OUTPUT_CAPACITY} bytes)",
                self.output_capacity
            )));
        }
        if self.default_validity_days == 0 {
            return Err(PkiError::invalid_argument(
                "default_validity_days must be at least 1",
            ));
        }
        Ok(())
    }
}
