//! ArrayBuffer implementation
//!
//! ArrayBuffer is the exclusive (non-shared) raw buffer. It can be detached
//! by a transfer, after which its bytes are gone for good. Unlike
//! SharedArrayBuffer, its backing store is never visible to two contexts at
//! the same time.

use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::backing_store::BackingStore;
use crate::error::{CopyError, CopyResult};
use crate::memory::AllocationTicket;
use crate::shared_buffer::SharedArrayBuffer;
use crate::value::Value;

#[derive(Debug)]
enum BufferState {
    /// Store not allocated yet (zero-length or optimized views)
    Lazy(usize),
    Live(Arc<BackingStore>),
    Detached,
}

/// A JavaScript ArrayBuffer
///
/// The state lock is what makes a concurrent duplicate and transfer safe:
/// a reader either clones the live store or observes detachment, never a
/// stale store.
#[derive(Debug)]
pub struct JsArrayBuffer {
    state: RwLock<BufferState>,
    /// Externally pinned buffers cannot be detached
    detachable: AtomicBool,
    /// Bytes booked against the owning context's guard
    allocation: Mutex<Option<AllocationTicket>>,
}

impl JsArrayBuffer {
    /// Create a new zero-filled ArrayBuffer with the specified byte length
    pub fn new(byte_length: usize) -> Self {
        Self::from_backing_store(Arc::new(BackingStore::new(byte_length)))
    }

    /// Create an ArrayBuffer holding a copy of `bytes`
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self::from_backing_store(Arc::new(BackingStore::from_bytes(bytes)))
    }

    /// Create an ArrayBuffer whose store is allocated on first use
    pub fn lazy(byte_length: usize) -> Self {
        Self {
            state: RwLock::new(BufferState::Lazy(byte_length)),
            detachable: AtomicBool::new(true),
            allocation: Mutex::new(None),
        }
    }

    /// Wrap an existing backing store
    pub fn from_backing_store(store: Arc<BackingStore>) -> Self {
        Self {
            state: RwLock::new(BufferState::Live(store)),
            detachable: AtomicBool::new(true),
            allocation: Mutex::new(None),
        }
    }

    /// Check if the buffer is detached
    pub fn is_detached(&self) -> bool {
        matches!(*self.state.read(), BufferState::Detached)
    }

    /// Whether a backing store has been allocated (or the buffer is detached)
    pub fn has_buffer(&self) -> bool {
        !matches!(*self.state.read(), BufferState::Lazy(_))
    }

    /// Whether a transfer may detach this buffer
    pub fn is_detachable(&self) -> bool {
        self.detachable.load(Ordering::Acquire)
    }

    /// Pin or unpin the buffer
    pub fn set_detachable(&self, detachable: bool) {
        // Serialized with take_backing_store through the state lock
        let _state = self.state.write();
        self.detachable.store(detachable, Ordering::Release);
    }

    /// Charge this buffer to a context's guard, replacing any earlier charge
    pub fn attach_allocation(&self, ticket: AllocationTicket) {
        *self.allocation.lock() = Some(ticket);
    }

    /// Give the bytes charged for this buffer back to its guard
    pub fn release_allocation(&self) {
        self.allocation.lock().take();
    }

    /// Bytes currently charged to a guard, if any
    pub fn allocated_size(&self) -> Option<usize> {
        self.allocation.lock().as_ref().map(AllocationTicket::size)
    }

    /// Get the byte length (0 if detached)
    pub fn byte_length(&self) -> usize {
        match &*self.state.read() {
            BufferState::Lazy(len) => *len,
            BufferState::Live(store) => store.byte_length(),
            BufferState::Detached => 0,
        }
    }

    /// Get the backing store, allocating it first if it is still lazy.
    /// Returns None if detached.
    pub fn backing_store(&self) -> Option<Arc<BackingStore>> {
        if let BufferState::Live(store) = &*self.state.read() {
            return Some(store.clone());
        }
        let mut state = self.state.write();
        match &*state {
            BufferState::Live(store) => Some(store.clone()),
            BufferState::Lazy(len) => {
                let store = Arc::new(BackingStore::new(*len));
                *state = BufferState::Live(store.clone());
                Some(store)
            }
            BufferState::Detached => None,
        }
    }

    /// Detach the buffer
    pub fn detach(&self) {
        *self.state.write() = BufferState::Detached;
        self.release_allocation();
    }

    /// Take the backing store and detach in one step.
    ///
    /// Fails with `BufferNotDetachable` if the buffer is pinned and
    /// `BufferInvalid` if it is already detached. The charge against the
    /// context's guard stays until [`release_allocation`](Self::release_allocation),
    /// so an aborted transfer can [`restore_backing_store`](Self::restore_backing_store).
    pub fn take_backing_store(&self) -> CopyResult<Arc<BackingStore>> {
        let mut state = self.state.write();
        if !self.is_detachable() {
            return Err(CopyError::BufferNotDetachable);
        }
        match std::mem::replace(&mut *state, BufferState::Detached) {
            BufferState::Live(store) => Ok(store),
            BufferState::Lazy(len) => Ok(Arc::new(BackingStore::new(len))),
            BufferState::Detached => Err(CopyError::BufferInvalid),
        }
    }

    /// Re-attach a store taken by a transfer that was then abandoned.
    ///
    /// Does nothing unless the buffer is still detached.
    pub fn restore_backing_store(&self, store: Arc<BackingStore>) {
        let mut state = self.state.write();
        if matches!(*state, BufferState::Detached) {
            *state = BufferState::Live(store);
        }
    }

    /// Read a byte at the given index
    pub fn get(&self, index: usize) -> Option<u8> {
        self.backing_store()?.get(index)
    }

    /// Write a byte at the given index
    pub fn set(&self, index: usize, value: u8) -> bool {
        self.backing_store().is_some_and(|s| s.set(index, value))
    }

    /// Read bytes into a slice
    pub fn read_bytes(&self, offset: usize, dest: &mut [u8]) -> bool {
        self.backing_store()
            .is_some_and(|s| s.read_bytes(offset, dest))
    }

    /// Write bytes from a slice
    pub fn write_bytes(&self, offset: usize, src: &[u8]) -> bool {
        self.backing_store().is_some_and(|s| s.write_bytes(offset, src))
    }

    /// Snapshot the contents. Returns None if detached.
    pub fn to_vec(&self) -> Option<Vec<u8>> {
        match &*self.state.read() {
            BufferState::Lazy(len) => Some(vec![0; *len]),
            BufferState::Live(store) => Some(store.to_vec()),
            BufferState::Detached => None,
        }
    }
}

/// Either kind of buffer a view can sit on.
#[derive(Debug, Clone)]
pub enum BufferRef {
    /// Exclusive ArrayBuffer
    Array(Arc<JsArrayBuffer>),
    /// SharedArrayBuffer
    Shared(Arc<SharedArrayBuffer>),
}

impl BufferRef {
    /// Byte length of the buffer (0 if detached)
    pub fn byte_length(&self) -> usize {
        match self {
            Self::Array(ab) => ab.byte_length(),
            Self::Shared(sab) => sab.byte_length(),
        }
    }

    /// Whether this is a SharedArrayBuffer
    pub fn is_shared(&self) -> bool {
        matches!(self, Self::Shared(_))
    }

    /// Whether the buffer is detached (never true for shared buffers)
    pub fn is_detached(&self) -> bool {
        match self {
            Self::Array(ab) => ab.is_detached(),
            Self::Shared(_) => false,
        }
    }

    /// The backing store, if the buffer is live
    pub fn backing_store(&self) -> Option<Arc<BackingStore>> {
        match self {
            Self::Array(ab) => ab.backing_store(),
            Self::Shared(sab) => Some(sab.backing_store().clone()),
        }
    }

    /// Charge the buffer to a context's guard
    pub fn attach_allocation(&self, ticket: AllocationTicket) {
        match self {
            Self::Array(ab) => ab.attach_allocation(ticket),
            Self::Shared(sab) => sab.attach_allocation(ticket),
        }
    }

    /// Convert back into a value
    pub fn to_value(&self) -> Value {
        match self {
            Self::Array(ab) => Value::array_buffer(ab.clone()),
            Self::Shared(sab) => Value::shared_array_buffer(sab.clone()),
        }
    }

    /// Interpret a value as a buffer
    pub fn from_value(value: &Value) -> Option<Self> {
        if let Some(ab) = value.as_array_buffer() {
            Some(Self::Array(ab.clone()))
        } else {
            value
                .as_shared_array_buffer()
                .map(|sab| Self::Shared(sab.clone()))
        }
    }
}
