//! Allocation guard for array buffer memory.
//!
//! A context may carry an [`AllocationGuard`] that approves buffer
//! allocations before they happen and keeps accounting for buffers handed
//! to it from another context. No guard means no limit.
//!
//! Every tracked buffer holds an [`AllocationTicket`]; the bytes go back to
//! the guard when the buffer is dropped or detached.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::array_buffer::BufferRef;

/// Approves and tracks array buffer allocations for one context.
pub trait AllocationGuard: Send + Sync {
    /// Whether an allocation of `size` bytes fits in the budget.
    ///
    /// Must be asked before any allocation whose failure would be fatal.
    fn check(&self, size: usize) -> bool;

    /// Record a buffer that now belongs to this context: freshly allocated,
    /// shared in, or transferred in.
    fn track(&self, buffer: &BufferRef, size: usize);

    /// Give back `size` bytes of a tracked buffer that is gone.
    fn release(&self, size: usize);
}

/// Bytes a tracked buffer holds against its context's guard.
pub struct AllocationTicket {
    guard: Arc<dyn AllocationGuard>,
    size: usize,
}

impl AllocationTicket {
    /// Book `size` bytes to be released through `guard` on drop
    pub fn new(guard: Arc<dyn AllocationGuard>, size: usize) -> Self {
        Self { guard, size }
    }

    /// Bytes held by this ticket
    pub fn size(&self) -> usize {
        self.size
    }
}

impl Drop for AllocationTicket {
    fn drop(&mut self) {
        self.guard.release(self.size);
    }
}

impl std::fmt::Debug for AllocationTicket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AllocationTicket").field("size", &self.size).finish()
    }
}

/// Byte-limited allocation guard.
///
/// Tracks the bytes of live buffers handed to the context against a fixed
/// limit.
#[derive(Debug)]
pub struct LimitedAllocator {
    /// Total bytes currently accounted
    allocated: AtomicUsize,
    /// Maximum bytes allowed
    limit: usize,
    /// Number of buffers tracked
    tracked: AtomicUsize,
}

impl LimitedAllocator {
    /// Create a guard with the specified limit
    pub fn new(limit: usize) -> Self {
        Self {
            allocated: AtomicUsize::new(0),
            limit,
            tracked: AtomicUsize::new(0),
        }
    }

    /// Book `size` bytes, failing if that would exceed the limit.
    pub fn alloc(&self, size: usize) -> bool {
        let mut current = self.allocated.load(Ordering::Relaxed);
        loop {
            let Some(next) = current.checked_add(size).filter(|n| *n <= self.limit) else {
                return false;
            };
            match self.allocated.compare_exchange_weak(
                current,
                next,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }

    /// Record deallocation of `size` bytes
    pub fn free(&self, size: usize) {
        let _ = self
            .allocated
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |current| {
                Some(current.saturating_sub(size))
            });
    }

    /// Get current allocated bytes
    pub fn allocated(&self) -> usize {
        self.allocated.load(Ordering::Relaxed)
    }

    /// Get the limit
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Number of foreign buffers tracked so far
    pub fn tracked_count(&self) -> usize {
        self.tracked.load(Ordering::Relaxed)
    }

    /// Whether the accounted bytes exceed the limit
    pub fn is_over_limit(&self) -> bool {
        self.allocated() > self.limit
    }
}

impl AllocationGuard for LimitedAllocator {
    fn check(&self, size: usize) -> bool {
        let fits = self
            .allocated()
            .checked_add(size)
            .is_some_and(|total| total <= self.limit);
        if !fits {
            tracing::warn!(
                requested = size,
                allocated = self.allocated(),
                limit = self.limit,
                "array buffer allocation rejected"
            );
        }
        fits
    }

    fn track(&self, buffer: &BufferRef, size: usize) {
        // The store already exists; accounting may go over the limit here and
        // is caught by the next check.
        self.allocated.fetch_add(size, Ordering::Relaxed);
        self.tracked.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(size, shared = buffer.is_shared(), "tracking foreign buffer");
    }

    fn release(&self, size: usize) {
        self.free(size);
        tracing::trace!(size, "tracked buffer released");
    }
}
