//! Engine construction.

use crate::config::{EngineConfig, PAGE_SIZE};
use crate::error::EngineError;
use crate::software::SoftwareEngine;

/// Create the in-process software engine after validating its configuration.
///
/// # Errors
///
/// Returns error if the ceiling is below one page, exceeds the 32-bit
/// address space, or is smaller than the initial commitment.
pub fn create_software_engine(config: &EngineConfig) -> Result<SoftwareEngine, EngineError> {
    if config.max_memory < PAGE_SIZE {
        return Err(EngineError::invalid_configuration(format!(
            "max_memory must be at least one page ({PAGE_SIZE} bytes)"
        )));
    }
    if config.max_memory > u32::MAX as usize {
        return Err(EngineError::invalid_configuration(
            "max_memory exceeds the 32-bit address space",
        ));
    }
    if config.initial_memory > config.max_memory {
        return Err(EngineError::invalid_configuration(
            "initial_memory exceeds max_memory",
        ));
    }

    tracing::info!(
        max_memory = config.max_memory,
        "Native engine: using in-process software engine"
    );
    Ok(SoftwareEngine::new(config))
}
