//! Scoped native-heap allocations.
//!
//! Every orchestrator operation opens one [`ForeignArena`] over the engine's
//! heap. Buffers acquired through the arena are registered with it; dropping
//! the arena frees whatever is still registered, newest first. That covers
//! normal return, early return, `?` propagation and unwinding alike, so no
//! operation can leak engine memory.
//!
//! ## String Arrays
//!
//! A string array is laid out the way a wasm32 C caller expects:
//!
//! ```text
//! element buffers:  "C=US\0"  "CN=example.com\0"
//! index buffer:     [ptr0: u32 LE][ptr1: u32 LE]
//! ```
//!
//! Elements are allocated first, the index last. If any allocation in the
//! batch fails, everything the batch acquired is released before the error
//! is returned.

use pqid_native::{NativeHeap, Ptr, NULL, POINTER_SIZE};

use crate::error::PkiError;

/// Handle to a live native allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForeignBuffer {
    ptr: Ptr,
    capacity: usize,
}

impl ForeignBuffer {
    /// Heap address.
    #[must_use]
    pub fn ptr(&self) -> Ptr {
        self.ptr
    }

    /// Allocated size in bytes.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// A marshaled string array: the pointer index plus one buffer per string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StringArray {
    array: ForeignBuffer,
    elements: Vec<ForeignBuffer>,
}

impl StringArray {
    /// The pointer index.
    #[must_use]
    pub fn array(&self) -> ForeignBuffer {
        self.array
    }

    /// Element buffers in input order.
    #[must_use]
    pub fn elements(&self) -> &[ForeignBuffer] {
        &self.elements
    }

    /// Number of strings.
    #[must_use]
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// Whether the array holds no strings.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}

/// Scope guard over allocations in one engine heap.
pub struct ForeignArena<'e, E: NativeHeap + ?Sized> {
    heap: &'e E,
    live: Vec<ForeignBuffer>,
}

impl<'e, E: NativeHeap + ?Sized> ForeignArena<'e, E> {
    /// Open an arena over `heap`.
    pub fn new(heap: &'e E) -> Self {
        Self {
            heap,
            live: Vec::new(),
        }
    }

    /// Allocate `size` bytes.
    ///
    /// # Errors
    ///
    /// Returns [`PkiError::AllocationFailure`] if the engine returns null.
    pub fn allocate(&mut self, size: usize) -> Result<ForeignBuffer, PkiError> {
        let ptr = self.heap.malloc(size);
        if ptr == NULL {
            tracing::warn!(size, "native allocation failed");
            return Err(PkiError::AllocationFailure { size });
        }
        let buffer = ForeignBuffer {
            ptr,
            capacity: size,
        };
        self.live.push(buffer);
        Ok(buffer)
    }

    /// Copy `data` into `buffer`.
    ///
    /// # Errors
    ///
    /// Returns [`PkiError::BufferOverrun`] if `data` exceeds the capacity.
    pub fn write_bytes(&self, buffer: ForeignBuffer, data: &[u8]) -> Result<(), PkiError> {
        if data.len() > buffer.capacity {
            return Err(PkiError::BufferOverrun {
                requested: data.len(),
                capacity: buffer.capacity,
            });
        }
        self.heap.write_memory(buffer.ptr, data)?;
        Ok(())
    }

    /// Copy exactly `size` bytes out of `buffer`.
    ///
    /// # Errors
    ///
    /// Returns [`PkiError::BufferOverrun`] if `size` exceeds the capacity.
    pub fn read_bytes(&self, buffer: ForeignBuffer, size: usize) -> Result<Vec<u8>, PkiError> {
        if size > buffer.capacity {
            return Err(PkiError::BufferOverrun {
                requested: size,
                capacity: buffer.capacity,
            });
        }
        Ok(self.heap.read_memory(buffer.ptr, size)?)
    }

    /// Allocate `max(data.len(), 1)` bytes and copy `data` in.
    ///
    /// # Errors
    ///
    /// Returns [`PkiError::AllocationFailure`] if the engine returns null.
    pub fn allocate_bytes(&mut self, data: &[u8]) -> Result<ForeignBuffer, PkiError> {
        let buffer = self.allocate(data.len().max(1))?;
        self.write_bytes(buffer, data)?;
        Ok(buffer)
    }

    /// Marshal `strings` as NUL-terminated buffers plus a pointer index.
    ///
    /// # Errors
    ///
    /// Returns the first allocation or copy failure, after releasing every
    /// buffer this call acquired.
    pub fn allocate_string_array<S: AsRef<str>>(
        &mut self,
        strings: &[S],
    ) -> Result<StringArray, PkiError> {
        let mark = self.live.len();
        let result = self.try_allocate_string_array(strings);
        if result.is_err() {
            self.release_since(mark);
        }
        result
    }

    fn try_allocate_string_array<S: AsRef<str>>(
        &mut self,
        strings: &[S],
    ) -> Result<StringArray, PkiError> {
        let mut elements = Vec::with_capacity(strings.len());
        let mut index = Vec::with_capacity(strings.len() * POINTER_SIZE);
        for s in strings {
            let mut bytes = Vec::with_capacity(s.as_ref().len() + 1);
            bytes.extend_from_slice(s.as_ref().as_bytes());
            bytes.push(0);
            let element = self.allocate_bytes(&bytes)?;
            index.extend_from_slice(&element.ptr.to_le_bytes());
            elements.push(element);
        }
        let array = self.allocate_bytes(&index)?;
        Ok(StringArray { array, elements })
    }

    /// Free `buffer` now. Releasing a buffer twice is a no-op.
    pub fn release(&mut self, buffer: ForeignBuffer) {
        if let Some(pos) = self.live.iter().rposition(|b| b.ptr == buffer.ptr) {
            self.live.remove(pos);
            self.heap.free(buffer.ptr);
        }
    }

    /// Free a string array's index and elements now.
    pub fn release_string_array(&mut self, strings: &StringArray) {
        self.release(strings.array);
        for element in strings.elements.iter().rev() {
            self.release(*element);
        }
    }

    /// Number of allocations still registered.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    fn release_since(&mut self, mark: usize) {
        while self.live.len() > mark {
            if let Some(buffer) = self.live.pop() {
                self.heap.free(buffer.ptr);
            }
        }
    }
}

impl<E: NativeHeap + ?Sized> Drop for ForeignArena<'_, E> {
    fn drop(&mut self) {
        if !self.live.is_empty() {
            tracing::trace!(count = self.live.len(), "arena releasing allocations");
        }
        self.release_since(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pqid_native::{EngineConfig, SoftwareEngine, PAGE_SIZE};

    fn engine() -> SoftwareEngine {
        SoftwareEngine::new(&EngineConfig::default())
    }

    fn tiny_engine() -> SoftwareEngine {
        SoftwareEngine::new(&EngineConfig::default().max_memory(PAGE_SIZE).initial_memory(0))
    }

    #[test]
    fn test_drop_releases_everything() {
        let engine = engine();
        {
            let mut arena = ForeignArena::new(&engine);
            arena.allocate(10).unwrap();
            arena.allocate_bytes(b"abc").unwrap();
            arena.allocate_string_array(&["C=US", "CN=x"]).unwrap();
            assert_eq!(engine.heap_stats().live_allocations, 5);
        }
        assert_eq!(engine.heap_stats().live_allocations, 0);
    }

    #[test]
    fn test_drop_on_error_path() {
        fn failing(engine: &SoftwareEngine) -> Result<(), PkiError> {
            let mut arena = ForeignArena::new(engine);
            let buffer = arena.allocate_bytes(b"abc")?;
            arena.write_bytes(buffer, b"longer than three")?;
            Ok(())
        }
        let engine = engine();
        assert!(matches!(
            failing(&engine),
            Err(PkiError::BufferOverrun {
                requested: 17,
                capacity: 3
            })
        ));
        assert_eq!(engine.heap_stats().live_allocations, 0);
    }

    #[test]
    fn test_allocate_bytes_exact_and_empty() {
        let engine = engine();
        let mut arena = ForeignArena::new(&engine);
        let buffer = arena.allocate_bytes(b"hello").unwrap();
        assert_eq!(buffer.capacity(), 5);
        assert_eq!(arena.read_bytes(buffer, 5).unwrap(), b"hello");

        let empty = arena.allocate_bytes(&[]).unwrap();
        assert_eq!(empty.capacity(), 1);
        assert_eq!(arena.read_bytes(empty, 0).unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn test_read_beyond_capacity() {
        let engine = engine();
        let mut arena = ForeignArena::new(&engine);
        let buffer = arena.allocate(4).unwrap();
        assert!(matches!(
            arena.read_bytes(buffer, 5),
            Err(PkiError::BufferOverrun {
                requested: 5,
                capacity: 4
            })
        ));
    }

    #[test]
    fn test_string_array_layout() {
        let engine = engine();
        let mut arena = ForeignArena::new(&engine);
        let strings = arena.allocate_string_array(&["C=US", "CN=example.com"]).unwrap();
        assert_eq!(strings.len(), 2);
        assert_eq!(strings.array().capacity(), 8);

        let index = arena.read_bytes(strings.array(), 8).unwrap();
        for (slot, element) in index.chunks(POINTER_SIZE).zip(strings.elements()) {
            let ptr = Ptr::from_le_bytes([slot[0], slot[1], slot[2], slot[3]]);
            assert_eq!(ptr, element.ptr());
        }
        assert_eq!(arena.read_bytes(strings.elements()[0], 5).unwrap(), b"C=US\0");
    }

    #[test]
    fn test_string_array_rolls_back_on_failure() {
        let engine = tiny_engine();
        let mut arena = ForeignArena::new(&engine);
        let keep = arena.allocate(16).unwrap();

        let big = "x".repeat(PAGE_SIZE / 2);
        let result = arena.allocate_string_array(&[big.as_str(), big.as_str()]);
        assert!(matches!(result, Err(PkiError::AllocationFailure { .. })));

        // only the allocation made before the batch survives
        assert_eq!(arena.live_count(), 1);
        assert_eq!(engine.heap_stats().live_allocations, 1);
        arena.release(keep);
        assert_eq!(engine.heap_stats().live_allocations, 0);
    }

    #[test]
    fn test_release_is_idempotent() {
        let engine = engine();
        let mut arena = ForeignArena::new(&engine);
        let buffer = arena.allocate(8).unwrap();
        arena.release(buffer);
        arena.release(buffer);
        assert_eq!(arena.live_count(), 0);

        let strings = arena.allocate_string_array(&["CN=a"]).unwrap();
        arena.release_string_array(&strings);
        arena.release_string_array(&strings);
        assert_eq!(engine.heap_stats().live_allocations, 0);
    }

    #[test]
    fn test_allocation_failure_reports_size() {
        let engine = tiny_engine();
        let mut arena = ForeignArena::new(&engine);
        assert!(matches!(
            arena.allocate(PAGE_SIZE * 2),
            Err(PkiError::AllocationFailure { size }) if size == PAGE_SIZE * 2
        ));
    }
}
