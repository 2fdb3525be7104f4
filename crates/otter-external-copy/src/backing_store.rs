//! Backing store for array buffers
//!
//! A backing store is the raw byte allocation behind an `ArrayBuffer` or
//! `SharedArrayBuffer`. Stores are shared through `Arc`: one store may be
//! referenced by a buffer handle in one context, an external copy in flight,
//! and a handle in another context all at once.

use std::sync::atomic::{AtomicU8, Ordering};

/// A byte allocation that can be read and written from any thread.
///
/// Bytes are atomics so that shared memory written by one context while
/// another reads it stays well defined.
#[derive(Debug)]
pub struct BackingStore {
    /// The underlying atomic byte array
    data: Box<[AtomicU8]>,
}

impl BackingStore {
    /// Create a zero-filled store with the specified byte length
    pub fn new(byte_length: usize) -> Self {
        let data: Vec<AtomicU8> = (0..byte_length).map(|_| AtomicU8::new(0)).collect();
        Self {
            data: data.into_boxed_slice(),
        }
    }

    /// Create a store holding a copy of `bytes`
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let data: Vec<AtomicU8> = bytes.iter().map(|b| AtomicU8::new(*b)).collect();
        Self {
            data: data.into_boxed_slice(),
        }
    }

    /// Get the byte length of this store
    #[inline]
    pub fn byte_length(&self) -> usize {
        self.data.len()
    }

    /// Read a byte at the given index
    #[inline]
    pub fn get(&self, index: usize) -> Option<u8> {
        self.data.get(index).map(|v| v.load(Ordering::SeqCst))
    }

    /// Write a byte at the given index
    #[inline]
    pub fn set(&self, index: usize, value: u8) -> bool {
        if let Some(cell) = self.data.get(index) {
            cell.store(value, Ordering::SeqCst);
            true
        } else {
            false
        }
    }

    /// Read bytes into a slice
    pub fn read_bytes(&self, offset: usize, dest: &mut [u8]) -> bool {
        let Some(end) = offset.checked_add(dest.len()) else {
            return false;
        };
        if end > self.data.len() {
            return false;
        }
        for (i, byte) in dest.iter_mut().enumerate() {
            *byte = self.data[offset + i].load(Ordering::SeqCst);
        }
        true
    }

    /// Write bytes from a slice
    pub fn write_bytes(&self, offset: usize, src: &[u8]) -> bool {
        let Some(end) = offset.checked_add(src.len()) else {
            return false;
        };
        if end > self.data.len() {
            return false;
        }
        for (i, &byte) in src.iter().enumerate() {
            self.data[offset + i].store(byte, Ordering::SeqCst);
        }
        true
    }

    /// Snapshot the whole store
    pub fn to_vec(&self) -> Vec<u8> {
        self.data.iter().map(|b| b.load(Ordering::SeqCst)).collect()
    }

    /// Create an independent store with the same bytes
    pub fn duplicate(&self) -> Self {
        let data: Vec<AtomicU8> = self
            .data
            .iter()
            .map(|b| AtomicU8::new(b.load(Ordering::SeqCst)))
            .collect();
        Self {
            data: data.into_boxed_slice(),
        }
    }
}
