//! Process-wide accounting of live external copy memory.

use std::sync::atomic::{AtomicUsize, Ordering};

/// Sum of `size` over every live [`SizedCopy`].
static TOTAL_EXTERNAL_SIZE: AtomicUsize = AtomicUsize::new(0);

/// Total bytes held by live external copies, across all contexts and threads.
pub fn total_external_size() -> usize {
    TOTAL_EXTERNAL_SIZE.load(Ordering::Relaxed)
}

/// Size charged by one copy against the global counter.
///
/// Construction adds, drop subtracts, [`update`](Self::update) applies the
/// delta. The size is atomic so a copy shared by reference can shrink when
/// its buffer is transferred out.
#[derive(Debug)]
pub struct SizedCopy {
    size: AtomicUsize,
}

impl SizedCopy {
    /// Charge `size` bytes
    pub fn new(size: usize) -> Self {
        TOTAL_EXTERNAL_SIZE.fetch_add(size, Ordering::Relaxed);
        Self {
            size: AtomicUsize::new(size),
        }
    }

    /// Bytes currently charged
    pub fn size(&self) -> usize {
        self.size.load(Ordering::Relaxed)
    }

    /// Change the charged size in place
    pub fn update(&self, size: usize) {
        let previous = self.size.swap(size, Ordering::AcqRel);
        if size >= previous {
            TOTAL_EXTERNAL_SIZE.fetch_add(size - previous, Ordering::Relaxed);
        } else {
            TOTAL_EXTERNAL_SIZE.fetch_sub(previous - size, Ordering::Relaxed);
        }
    }
}

impl Drop for SizedCopy {
    fn drop(&mut self) {
        TOTAL_EXTERNAL_SIZE.fetch_sub(*self.size.get_mut(), Ordering::Relaxed);
    }
}
