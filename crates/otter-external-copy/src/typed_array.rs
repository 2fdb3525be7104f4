//! TypedArray and DataView implementation
//!
//! Views are windows over an ArrayBuffer or SharedArrayBuffer. All twelve
//! view types share one representation keyed by [`ViewKind`].

use std::sync::Arc;

use crate::array_buffer::{BufferRef, JsArrayBuffer};
use crate::object::JsObject;

/// The kind of view - determines element size and interpretation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViewKind {
    /// Int8Array - 8-bit signed integers
    Int8,
    /// Uint8Array - 8-bit unsigned integers
    Uint8,
    /// Uint8ClampedArray - 8-bit unsigned integers (clamped)
    Uint8Clamped,
    /// Int16Array - 16-bit signed integers
    Int16,
    /// Uint16Array - 16-bit unsigned integers
    Uint16,
    /// Int32Array - 32-bit signed integers
    Int32,
    /// Uint32Array - 32-bit unsigned integers
    Uint32,
    /// Float32Array - 32-bit floating point
    Float32,
    /// Float64Array - 64-bit floating point
    Float64,
    /// BigInt64Array - 64-bit signed integers (BigInt)
    BigInt64,
    /// BigUint64Array - 64-bit unsigned integers (BigInt)
    BigUint64,
    /// DataView - raw byte window
    DataView,
}

impl ViewKind {
    /// All view kinds
    pub const ALL: [ViewKind; 12] = [
        ViewKind::Int8,
        ViewKind::Uint8,
        ViewKind::Uint8Clamped,
        ViewKind::Int16,
        ViewKind::Uint16,
        ViewKind::Int32,
        ViewKind::Uint32,
        ViewKind::Float32,
        ViewKind::Float64,
        ViewKind::BigInt64,
        ViewKind::BigUint64,
        ViewKind::DataView,
    ];

    /// Get the byte size of each element
    pub fn element_size(&self) -> usize {
        match self {
            ViewKind::Int8 | ViewKind::Uint8 | ViewKind::Uint8Clamped | ViewKind::DataView => 1,
            ViewKind::Int16 | ViewKind::Uint16 => 2,
            ViewKind::Int32 | ViewKind::Uint32 | ViewKind::Float32 => 4,
            ViewKind::Float64 | ViewKind::BigInt64 | ViewKind::BigUint64 => 8,
        }
    }

    /// Get the constructor name of this view type
    pub fn name(&self) -> &'static str {
        match self {
            ViewKind::Int8 => "Int8Array",
            ViewKind::Uint8 => "Uint8Array",
            ViewKind::Uint8Clamped => "Uint8ClampedArray",
            ViewKind::Int16 => "Int16Array",
            ViewKind::Uint16 => "Uint16Array",
            ViewKind::Int32 => "Int32Array",
            ViewKind::Uint32 => "Uint32Array",
            ViewKind::Float32 => "Float32Array",
            ViewKind::Float64 => "Float64Array",
            ViewKind::BigInt64 => "BigInt64Array",
            ViewKind::BigUint64 => "BigUint64Array",
            ViewKind::DataView => "DataView",
        }
    }

    /// Check if this is a BigInt typed array
    pub fn is_bigint(&self) -> bool {
        matches!(self, ViewKind::BigInt64 | ViewKind::BigUint64)
    }
}

/// A typed array or DataView
///
/// Does not copy data - it references the underlying buffer.
#[derive(Debug)]
pub struct JsArrayBufferView {
    /// Associated object (own properties and prototype)
    pub object: Arc<JsObject>,
    /// The underlying buffer
    buffer: BufferRef,
    /// Byte offset into the buffer
    byte_offset: usize,
    /// Number of elements (bytes for DataView)
    length: usize,
    kind: ViewKind,
}

impl JsArrayBufferView {
    /// Create a view over `byte_length` bytes of `buffer` starting at `byte_offset`
    pub fn new(
        object: Arc<JsObject>,
        buffer: BufferRef,
        kind: ViewKind,
        byte_offset: usize,
        byte_length: usize,
    ) -> Result<Self, &'static str> {
        if buffer.is_detached() {
            return Err("cannot create a view on a detached buffer");
        }

        let elem_size = kind.element_size();
        if byte_offset % elem_size != 0 {
            return Err("byte offset must be aligned to element size");
        }
        if byte_length % elem_size != 0 {
            return Err("byte length must be a multiple of element size");
        }

        let end = byte_offset
            .checked_add(byte_length)
            .ok_or("view length overflow")?;
        if end > buffer.byte_length() {
            return Err("view would extend past end of buffer");
        }

        Ok(Self {
            object,
            buffer,
            byte_offset,
            length: byte_length / elem_size,
            kind,
        })
    }

    /// Create a view over a fresh zero-filled ArrayBuffer
    pub fn with_length(kind: ViewKind, length: usize) -> Self {
        let buffer = Arc::new(JsArrayBuffer::new(length * kind.element_size()));
        Self {
            object: Arc::new(JsObject::with_class_name(kind.name(), None)),
            buffer: BufferRef::Array(buffer),
            byte_offset: 0,
            length,
            kind,
        }
    }

    /// Create a view over an ArrayBuffer holding a copy of `bytes`
    pub fn from_bytes(kind: ViewKind, bytes: &[u8]) -> Result<Self, &'static str> {
        let buffer = BufferRef::Array(Arc::new(JsArrayBuffer::from_bytes(bytes)));
        let object = Arc::new(JsObject::with_class_name(kind.name(), None));
        Self::new(object, buffer, kind, 0, bytes.len())
    }

    /// Get the kind of this view
    pub fn kind(&self) -> ViewKind {
        self.kind
    }

    /// Get the underlying buffer
    pub fn buffer(&self) -> &BufferRef {
        &self.buffer
    }

    /// Get the byte offset into the buffer
    pub fn byte_offset(&self) -> usize {
        self.byte_offset
    }

    /// Get the byte length of the view (0 if detached)
    pub fn byte_length(&self) -> usize {
        if self.buffer.is_detached() {
            0
        } else {
            self.length * self.kind.element_size()
        }
    }

    /// Get the number of elements (0 if detached)
    pub fn length(&self) -> usize {
        if self.buffer.is_detached() {
            0
        } else {
            self.length
        }
    }

    /// Check if the underlying buffer is detached
    pub fn is_detached(&self) -> bool {
        self.buffer.is_detached()
    }

    /// Whether the underlying buffer has a real allocation yet
    pub fn has_buffer(&self) -> bool {
        match &self.buffer {
            BufferRef::Array(ab) => ab.has_buffer(),
            BufferRef::Shared(_) => true,
        }
    }

    fn read_element(&self, index: usize) -> Option<[u8; 8]> {
        if index >= self.length() {
            return None;
        }
        let size = self.kind.element_size();
        let mut bytes = [0u8; 8];
        let store = self.buffer.backing_store()?;
        store
            .read_bytes(self.byte_offset + index * size, &mut bytes[..size])
            .then_some(bytes)
    }

    fn write_element(&self, index: usize, bytes: &[u8]) -> bool {
        if index >= self.length() {
            return false;
        }
        let offset = self.byte_offset + index * self.kind.element_size();
        self.buffer
            .backing_store()
            .is_some_and(|store| store.write_bytes(offset, bytes))
    }

    /// Get an element as f64 (for non-BigInt arrays; DataView reads bytes)
    pub fn get(&self, index: usize) -> Option<f64> {
        let b = self.read_element(index)?;
        Some(match self.kind {
            ViewKind::Int8 => b[0] as i8 as f64,
            ViewKind::Uint8 | ViewKind::Uint8Clamped | ViewKind::DataView => b[0] as f64,
            ViewKind::Int16 => i16::from_le_bytes([b[0], b[1]]) as f64,
            ViewKind::Uint16 => u16::from_le_bytes([b[0], b[1]]) as f64,
            ViewKind::Int32 => i32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f64,
            ViewKind::Uint32 => u32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f64,
            ViewKind::Float32 => f32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f64,
            ViewKind::Float64 => f64::from_le_bytes(b),
            // BigInt arrays return NaN for regular get - use get_bigint
            ViewKind::BigInt64 | ViewKind::BigUint64 => f64::NAN,
        })
    }

    /// Set an element from f64 (for non-BigInt arrays)
    pub fn set(&self, index: usize, value: f64) -> bool {
        match self.kind {
            ViewKind::Int8 => self.write_element(index, &[value as i8 as u8]),
            ViewKind::Uint8 | ViewKind::DataView => self.write_element(index, &[value as u8]),
            ViewKind::Uint8Clamped => {
                let clamped = if value.is_nan() {
                    0
                } else {
                    value.clamp(0.0, 255.0).round() as u8
                };
                self.write_element(index, &[clamped])
            }
            ViewKind::Int16 => self.write_element(index, &(value as i16).to_le_bytes()),
            ViewKind::Uint16 => self.write_element(index, &(value as u16).to_le_bytes()),
            ViewKind::Int32 => self.write_element(index, &(value as i32).to_le_bytes()),
            ViewKind::Uint32 => self.write_element(index, &(value as u32).to_le_bytes()),
            ViewKind::Float32 => self.write_element(index, &(value as f32).to_le_bytes()),
            ViewKind::Float64 => self.write_element(index, &value.to_le_bytes()),
            ViewKind::BigInt64 | ViewKind::BigUint64 => false,
        }
    }

    /// Get an element as i64 (for BigInt arrays)
    pub fn get_bigint(&self, index: usize) -> Option<i64> {
        if !self.kind.is_bigint() {
            return None;
        }
        self.read_element(index).map(i64::from_le_bytes)
    }

    /// Set an element from i64 (for BigInt arrays)
    pub fn set_bigint(&self, index: usize, value: i64) -> bool {
        self.kind.is_bigint() && self.write_element(index, &value.to_le_bytes())
    }

    /// Snapshot the bytes covered by this view. Returns None if detached.
    pub fn to_vec(&self) -> Option<Vec<u8>> {
        let store = self.buffer.backing_store()?;
        let mut bytes = vec![0u8; self.byte_length()];
        store
            .read_bytes(self.byte_offset, &mut bytes)
            .then_some(bytes)
    }
}
