//! SharedArrayBuffer implementation
//!
//! SharedArrayBuffer allows sharing raw binary data between contexts.
//! Copies never duplicate or detach it: every context that receives one
//! references the same backing store.

use parking_lot::Mutex;
use std::sync::Arc;

use crate::backing_store::BackingStore;
use crate::memory::AllocationTicket;

/// A shared array buffer handle
///
/// Cloning the inner `Arc<BackingStore>` is how the memory is shared.
#[derive(Debug)]
pub struct SharedArrayBuffer {
    store: Arc<BackingStore>,
    /// This handle's share of the owning context's guard
    allocation: Mutex<Option<AllocationTicket>>,
}

impl SharedArrayBuffer {
    /// Create a new SharedArrayBuffer with the specified byte length
    pub fn new(byte_length: usize) -> Self {
        Self::from_backing_store(Arc::new(BackingStore::new(byte_length)))
    }

    /// Create a handle over an existing store
    pub fn from_backing_store(store: Arc<BackingStore>) -> Self {
        Self {
            store,
            allocation: Mutex::new(None),
        }
    }

    /// Charge this handle to a context's guard
    pub fn attach_allocation(&self, ticket: AllocationTicket) {
        *self.allocation.lock() = Some(ticket);
    }

    /// The shared backing store
    #[inline]
    pub fn backing_store(&self) -> &Arc<BackingStore> {
        &self.store
    }

    /// Get the byte length of this buffer
    #[inline]
    pub fn byte_length(&self) -> usize {
        self.store.byte_length()
    }

    /// Read a byte at the given index
    #[inline]
    pub fn get(&self, index: usize) -> Option<u8> {
        self.store.get(index)
    }

    /// Write a byte at the given index
    #[inline]
    pub fn set(&self, index: usize, value: u8) -> bool {
        self.store.set(index, value)
    }

    /// Whether two handles refer to the same memory
    pub fn shares_memory_with(&self, other: &SharedArrayBuffer) -> bool {
        Arc::ptr_eq(&self.store, &other.store)
    }
}
