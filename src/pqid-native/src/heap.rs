//! Linear heap for the software engine.
//!
//! The engine exposes memory the way a wasm32 module does: one flat byte
//! array addressed by 32-bit offsets, where address 0 is null. Callers
//! allocate with `malloc`, copy bytes in and out by address, and `free` when
//! done. Pointer-sized slots are 4 bytes, little-endian.
//!
//! ## Allocation Policy
//!
//! - First fit over the gaps between live allocations
//! - 8-byte alignment, first block at [`HEAP_BASE`]
//! - Memory grows in whole pages up to the configured ceiling
//! - Freed regions are zeroed immediately
//! - Every access must lie inside a single live allocation

use std::collections::BTreeMap;

use crate::config::{EngineConfig, PAGE_SIZE};
use crate::error::EngineError;

/// Address into the linear heap.
pub type Ptr = u32;

/// The null address.
pub const NULL: Ptr = 0;

/// Width of a pointer slot in the heap (wasm32).
pub const POINTER_SIZE: usize = 4;

/// Alignment of every allocation.
pub const ALIGNMENT: usize = 8;

/// First usable address. Keeps low addresses free so that 0 stays invalid.
pub const HEAP_BASE: usize = 16;

/// Round up to [`ALIGNMENT`]; `None` past the end of the address space.
const fn align_up(value: usize) -> Option<usize> {
    match value.checked_add(ALIGNMENT - 1) {
        Some(padded) => Some(padded & !(ALIGNMENT - 1)),
        None => None,
    }
}

/// Snapshot of heap occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HeapStats {
    /// Number of live allocations.
    pub live_allocations: usize,
    /// Sum of requested sizes of live allocations.
    pub live_bytes: usize,
    /// Bytes of memory currently committed.
    pub committed_bytes: usize,
}

/// Flat, growable byte heap with allocation tracking.
#[derive(Debug)]
pub struct LinearMemory {
    bytes: Vec<u8>,
    /// start address -> requested size
    live: BTreeMap<usize, usize>,
    max_memory: usize,
}

impl LinearMemory {
    /// Create a heap from configuration.
    ///
    /// The ceiling is clamped to the 32-bit address space.
    #[must_use]
    pub fn new(config: &EngineConfig) -> Self {
        let max_memory = config.max_memory.min(u32::MAX as usize);
        let initial = round_to_page(config.initial_memory).min(max_memory);
        Self {
            bytes: vec![0; initial],
            live: BTreeMap::new(),
            max_memory,
        }
    }

    /// Allocate `size` bytes. Returns [`NULL`] when the heap is exhausted.
    ///
    /// Zero-size requests still reserve one alignment unit so that every
    /// returned address is unique.
    pub fn malloc(&mut self, size: usize) -> Ptr {
        let size = size.max(1);
        let Some(footprint) = align_up(size) else {
            tracing::debug!(size, "allocation size overflows the address space");
            return NULL;
        };

        let mut cursor = HEAP_BASE;
        for (&start, &len) in &self.live {
            if start >= cursor && start - cursor >= footprint {
                break;
            }
            // Live entries sit below max_memory, which is clamped to u32::MAX.
            cursor = align_up(start + len).unwrap_or(usize::MAX);
        }

        let end = cursor.checked_add(footprint).unwrap_or(usize::MAX);
        if end > self.max_memory {
            tracing::debug!(size, max_memory = self.max_memory, "heap exhausted");
            return NULL;
        }
        if end > self.bytes.len() {
            let grown = round_to_page(end).min(self.max_memory);
            self.bytes.resize(grown, 0);
        }

        self.live.insert(cursor, size);
        cursor as Ptr
    }

    /// Release an allocation and zero its bytes.
    ///
    /// Freeing [`NULL`] is a no-op. Freeing an address that is not the start
    /// of a live allocation is logged and ignored.
    pub fn free(&mut self, ptr: Ptr) {
        if ptr == NULL {
            return;
        }
        let start = ptr as usize;
        match self.live.remove(&start) {
            Some(len) => self.bytes[start..start + len].fill(0),
            None => tracing::warn!(ptr, "free of unknown address ignored"),
        }
    }

    /// Copy `data` into the heap at `ptr`.
    pub fn write(&mut self, ptr: Ptr, data: &[u8]) -> Result<(), EngineError> {
        let range = self.checked_range(ptr, data.len())?;
        self.bytes[range].copy_from_slice(data);
        Ok(())
    }

    /// Copy `len` bytes out of the heap at `ptr`.
    pub fn read(&self, ptr: Ptr, len: usize) -> Result<Vec<u8>, EngineError> {
        let range = self.checked_range(ptr, len)?;
        Ok(self.bytes[range].to_vec())
    }

    /// Read a NUL-terminated string starting at `ptr`.
    ///
    /// The terminator must occur before the end of the enclosing allocation.
    pub fn read_c_string(&self, ptr: Ptr) -> Result<Vec<u8>, EngineError> {
        let (start, len) = self.enclosing(ptr)?;
        let from = ptr as usize;
        let window = &self.bytes[from..start + len];
        let end = window
            .iter()
            .position(|&b| b == 0)
            .ok_or(EngineError::UnterminatedString { ptr })?;
        Ok(window[..end].to_vec())
    }

    /// Read a 4-byte little-endian pointer slot.
    pub fn read_ptr(&self, ptr: Ptr) -> Result<Ptr, EngineError> {
        let raw = self.read(ptr, POINTER_SIZE)?;
        Ok(Ptr::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
    }

    /// Current occupancy.
    #[must_use]
    pub fn stats(&self) -> HeapStats {
        HeapStats {
            live_allocations: self.live.len(),
            live_bytes: self.live.values().sum(),
            committed_bytes: self.bytes.len(),
        }
    }

    fn enclosing(&self, ptr: Ptr) -> Result<(usize, usize), EngineError> {
        if ptr == NULL {
            return Err(EngineError::NullPointer);
        }
        let addr = ptr as usize;
        self.live
            .range(..=addr)
            .next_back()
            .map(|(&start, &len)| (start, len))
            .filter(|&(start, len)| addr < start + len)
            .ok_or(EngineError::OutOfBounds { ptr, len: 0 })
    }

    fn checked_range(&self, ptr: Ptr, len: usize) -> Result<std::ops::Range<usize>, EngineError> {
        let (start, alloc_len) = self
            .enclosing(ptr)
            .map_err(|e| match e {
                EngineError::OutOfBounds { ptr, .. } => EngineError::OutOfBounds { ptr, len },
                other => other,
            })?;
        let from = ptr as usize;
        let to = from
            .checked_add(len)
            .ok_or(EngineError::OutOfBounds { ptr, len })?;
        if to > start + alloc_len {
            return Err(EngineError::OutOfBounds { ptr, len });
        }
        Ok(from..to)
    }
}

fn round_to_page(bytes: usize) -> usize {
    bytes.div_ceil(PAGE_SIZE).saturating_mul(PAGE_SIZE)
}
