//! Copies of typed arrays and DataViews.
//!
//! A view copy holds only metadata. Its buffer travels separately through the
//! clone pass and is bound to the copy on the receiving side before the
//! view is rebuilt.

use std::sync::Arc;

use super::Transferable;
use super::size::SizedCopy;
use crate::array_buffer::BufferRef;
use crate::context::Context;
use crate::error::{CopyError, CopyResult};
use crate::object::{JsObject, PropertyKey};
use crate::typed_array::{JsArrayBufferView, ViewKind};
use crate::value::Value;

/// Metadata of a view plus its late-bound buffer and extra properties.
#[derive(Debug)]
pub struct ArrayBufferViewCopy {
    size: SizedCopy,
    kind: ViewKind,
    byte_offset: usize,
    byte_length: usize,
    is_node_buffer: bool,
    underlying_buffer: Option<BufferRef>,
    own_properties: Option<Arc<JsObject>>,
}

impl ArrayBufferViewCopy {
    /// Record metadata
    pub fn new(kind: ViewKind, byte_offset: usize, byte_length: usize, is_node_buffer: bool) -> Self {
        Self {
            size: SizedCopy::new(std::mem::size_of::<Self>()),
            kind,
            byte_offset,
            byte_length,
            is_node_buffer,
            underlying_buffer: None,
            own_properties: None,
        }
    }

    /// Capture the metadata of `view`.
    ///
    /// A view whose buffer was never allocated is realized here, once the
    /// context's allocation guard has approved the size.
    pub fn copy(view: &JsArrayBufferView, ctx: &Context) -> CopyResult<Self> {
        if !view.has_buffer() {
            ctx.check_allocation(view.byte_length())?;
            view.buffer().backing_store().ok_or(CopyError::BufferInvalid)?;
        }
        let is_node_buffer = match (ctx.buffer_prototype(), view.object.prototype()) {
            (Some(expected), Some(actual)) => Arc::ptr_eq(&expected, &actual),
            _ => false,
        };
        Ok(Self::new(
            view.kind(),
            view.byte_offset(),
            view.byte_length(),
            is_node_buffer,
        ))
    }

    /// Snapshot the named own properties of `view` into a plain object.
    ///
    /// Index keys and symbols are skipped. Non-enumerable properties are
    /// included and come out enumerable. A throwing getter skips its key.
    pub fn copy_own_properties(view: &JsArrayBufferView, ctx: &Context) -> Arc<JsObject> {
        let properties = ctx.new_object();
        for key in view.object.own_keys() {
            if !matches!(key, PropertyKey::String(_)) {
                continue;
            }
            let Some(desc) = view.object.own_property(&key) else {
                continue;
            };
            if let Ok(value) = desc.read() {
                properties.set(key, value);
            }
        }
        properties
    }

    /// An unbound copy of the same metadata, for one materialization
    pub fn unbound(&self) -> Self {
        Self::new(self.kind, self.byte_offset, self.byte_length, self.is_node_buffer)
    }

    /// Element kind
    pub fn kind(&self) -> ViewKind {
        self.kind
    }

    /// Offset into the buffer
    pub fn byte_offset(&self) -> usize {
        self.byte_offset
    }

    /// Length in bytes
    pub fn byte_length(&self) -> usize {
        self.byte_length
    }

    /// Whether the view carried the host `Buffer` prototype
    pub fn is_node_buffer(&self) -> bool {
        self.is_node_buffer
    }

    /// Whether the buffer has been bound
    pub fn is_bound(&self) -> bool {
        self.underlying_buffer.is_some()
    }

    /// Bind the materialized buffer. Binding twice is a protocol bug.
    pub fn set_underlying_buffer(&mut self, buffer: BufferRef) {
        assert!(
            self.underlying_buffer.is_none(),
            "view copy buffer bound twice"
        );
        self.underlying_buffer = Some(buffer);
    }

    /// Bind the materialized extra properties. Binding twice is a protocol bug.
    pub fn set_own_properties(&mut self, properties: Arc<JsObject>) {
        assert!(
            self.own_properties.is_none(),
            "view copy properties bound twice"
        );
        self.own_properties = Some(properties);
    }

    /// Rebuild the view over the bound buffer.
    ///
    /// # Panics
    ///
    /// Panics if no buffer has been bound.
    pub fn copy_into_view(&self, ctx: &Context) -> CopyResult<Arc<JsArrayBufferView>> {
        let buffer = self
            .underlying_buffer
            .clone()
            .expect("view copy materialized before its buffer was bound");

        let prototype = if self.is_node_buffer && self.kind == ViewKind::Uint8 {
            ctx.buffer_prototype()
        } else {
            None
        };
        let object = Arc::new(JsObject::with_class_name(self.kind.name(), prototype));
        let view = JsArrayBufferView::new(
            object,
            buffer,
            self.kind,
            self.byte_offset,
            self.byte_length,
        )
        .map_err(CopyError::data_clone)?;

        if let Some(properties) = &self.own_properties {
            for key in properties.own_enumerable_keys() {
                if let Some(value) = properties.get(&key) {
                    view.object.set(key, value);
                }
            }
        }
        Ok(Arc::new(view))
    }
}

impl Transferable for ArrayBufferViewCopy {
    fn copy_into(&self, ctx: &Context, _transfer_in: bool) -> CopyResult<Value> {
        self.copy_into_view(ctx).map(Value::array_buffer_view)
    }

    fn size(&self) -> usize {
        self.size.size()
    }
}
