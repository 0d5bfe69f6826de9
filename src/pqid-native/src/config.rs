//! Engine configuration.

/// Size of one linear-memory page (matches the wasm page size).
pub const PAGE_SIZE: usize = 64 * 1024;

/// Default heap ceiling: 64 MiB.
pub const DEFAULT_MAX_MEMORY: usize = 64 * 1024 * 1024;

/// Default memory reserved at construction: 1 MiB.
pub const DEFAULT_INITIAL_MEMORY: usize = 1024 * 1024;

/// Configuration for a [`crate::SoftwareEngine`].
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Hard ceiling on the linear heap, in bytes.
    /// Allocations that would grow past it return the null address.
    pub max_memory: usize,

    /// Bytes committed up front. Rounded up to whole pages.
    pub initial_memory: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_memory: DEFAULT_MAX_MEMORY,
            initial_memory: DEFAULT_INITIAL_MEMORY,
        }
    }
}

impl EngineConfig {
    /// Set the heap ceiling.
    #[must_use]
    pub fn max_memory(mut self, bytes: usize) -> Self {
        self.max_memory = bytes;
        self
    }

    /// Set the initially committed memory.
    #[must_use]
    pub fn initial_memory(mut self, bytes: usize) -> Self {
        self.initial_memory = bytes;
        self
    }
}
