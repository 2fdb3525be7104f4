//! Copies of ArrayBuffer and SharedArrayBuffer.
//!
//! An [`ArrayBufferCopy`] owns its backing store outright and can hand it to
//! exactly one target by transfer, or copy its bytes into any number of
//! targets. A [`SharedArrayBufferCopy`] always shares its store.

use parking_lot::RwLock;
use std::sync::Arc;

use super::Transferable;
use super::size::SizedCopy;
use crate::array_buffer::{BufferRef, JsArrayBuffer};
use crate::backing_store::BackingStore;
use crate::context::Context;
use crate::error::{CopyError, CopyResult};
use crate::shared_buffer::SharedArrayBuffer;
use crate::value::Value;

/// Copy of an exclusive ArrayBuffer.
///
/// The store slot is locked because one thread may copy out of it while
/// another transfers it in.
#[derive(Debug)]
pub struct ArrayBufferCopy {
    size: SizedCopy,
    backing_store: RwLock<Option<Arc<BackingStore>>>,
}

impl ArrayBufferCopy {
    pub(crate) fn from_store(store: Arc<BackingStore>) -> Self {
        Self {
            size: SizedCopy::new(store.byte_length()),
            backing_store: RwLock::new(Some(store)),
        }
    }

    /// Copy the bytes of `source` into a fresh store. The source is untouched.
    pub fn duplicate(source: &JsArrayBuffer) -> CopyResult<Self> {
        let store = source.backing_store().ok_or(CopyError::BufferInvalid)?;
        Ok(Self::from_store(Arc::new(store.duplicate())))
    }

    /// Copy `bytes` into a fresh store
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self::from_store(Arc::new(BackingStore::from_bytes(bytes)))
    }

    /// Take the store of `source` and detach it.
    pub fn transfer(source: &JsArrayBuffer) -> CopyResult<Self> {
        let store = source.take_backing_store()?;
        source.release_allocation();
        tracing::debug!(bytes = store.byte_length(), "array buffer transferred out");
        Ok(Self::from_store(store))
    }

    /// Whether the store has already been handed to a target
    pub fn is_consumed(&self) -> bool {
        self.backing_store.read().is_none()
    }

    /// Byte length of the held store (0 once consumed)
    pub fn byte_length(&self) -> usize {
        self.backing_store
            .read()
            .as_ref()
            .map_or(0, |store| store.byte_length())
    }

    /// Materialize as a buffer handle.
    ///
    /// With `transfer_in` the store moves into the target without copying and
    /// this copy becomes unusable. Otherwise the bytes are copied into a new
    /// buffer after the target's allocation guard approves the size.
    pub fn copy_into_buffer(&self, ctx: &Context, transfer_in: bool) -> CopyResult<Arc<JsArrayBuffer>> {
        if transfer_in {
            let store = self
                .backing_store
                .write()
                .take()
                .ok_or(CopyError::BufferInvalid)?;
            self.size.update(0);
            let size = store.byte_length();
            let buffer = Arc::new(JsArrayBuffer::from_backing_store(store));
            ctx.track(&BufferRef::Array(buffer.clone()), size);
            tracing::debug!(context = ctx.id(), bytes = size, "array buffer transferred in");
            Ok(buffer)
        } else {
            let store = self
                .backing_store
                .read()
                .clone()
                .ok_or(CopyError::BufferInvalid)?;
            ctx.check_allocation(store.byte_length())?;
            Ok(ctx.new_array_buffer(&store.to_vec()))
        }
    }
}

impl Transferable for ArrayBufferCopy {
    fn copy_into(&self, ctx: &Context, transfer_in: bool) -> CopyResult<Value> {
        self.copy_into_buffer(ctx, transfer_in).map(Value::array_buffer)
    }

    fn size(&self) -> usize {
        self.size.size()
    }
}

/// Copy of a SharedArrayBuffer. Every materialization shares the same store.
#[derive(Debug)]
pub struct SharedArrayBufferCopy {
    size: SizedCopy,
    backing_store: Arc<BackingStore>,
}

impl SharedArrayBufferCopy {
    /// Capture a reference to the store of `source`
    pub fn new(source: &SharedArrayBuffer) -> Self {
        let backing_store = source.backing_store().clone();
        Self {
            size: SizedCopy::new(backing_store.byte_length()),
            backing_store,
        }
    }

    /// The shared store
    pub fn backing_store(&self) -> &Arc<BackingStore> {
        &self.backing_store
    }

    /// Materialize as a shared buffer handle over the same store
    pub fn copy_into_buffer(&self, ctx: &Context) -> Arc<SharedArrayBuffer> {
        let buffer = Arc::new(SharedArrayBuffer::from_backing_store(
            self.backing_store.clone(),
        ));
        ctx.track(
            &BufferRef::Shared(buffer.clone()),
            self.backing_store.byte_length(),
        );
        buffer
    }
}

impl Transferable for SharedArrayBufferCopy {
    fn copy_into(&self, ctx: &Context, _transfer_in: bool) -> CopyResult<Value> {
        Ok(Value::shared_array_buffer(self.copy_into_buffer(ctx)))
    }

    fn size(&self) -> usize {
        self.size.size()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ContextConfig;

    #[test]
    fn test_duplicate_leaves_source() {
        let source = JsArrayBuffer::from_bytes(&[1, 2, 3]);
        let a = ArrayBufferCopy::duplicate(&source).unwrap();
        let b = ArrayBufferCopy::duplicate(&source).unwrap();
        assert!(!source.is_detached());

        let ctx = Context::default();
        let out_a = a.copy_into_buffer(&ctx, false).unwrap();
        let out_b = b.copy_into_buffer(&ctx, false).unwrap();
        assert_eq!(out_a.to_vec(), Some(vec![1, 2, 3]));
        assert_eq!(out_b.to_vec(), Some(vec![1, 2, 3]));
        assert!(!Arc::ptr_eq(
            &out_a.backing_store().unwrap(),
            &out_b.backing_store().unwrap()
        ));
    }

    #[test]
    fn test_transfer_detaches_source() {
        let source = JsArrayBuffer::from_bytes(&[9; 16]);
        let copy = ArrayBufferCopy::transfer(&source).unwrap();
        assert!(source.is_detached());
        assert_eq!(source.byte_length(), 0);
        assert_eq!(copy.byte_length(), 16);

        assert_eq!(
            ArrayBufferCopy::transfer(&source).unwrap_err(),
            CopyError::BufferInvalid
        );
        assert_eq!(
            ArrayBufferCopy::duplicate(&source).unwrap_err(),
            CopyError::BufferInvalid
        );
    }

    #[test]
    fn test_pinned_buffer_cannot_transfer() {
        let source = JsArrayBuffer::from_bytes(&[1]);
        source.set_detachable(false);
        assert_eq!(
            ArrayBufferCopy::transfer(&source).unwrap_err(),
            CopyError::BufferNotDetachable
        );
        assert!(!source.is_detached());
    }

    #[test]
    fn test_transfer_in_consumes_copy() {
        let ctx = Context::default();
        let copy = ArrayBufferCopy::from_bytes(&[4, 5]);
        let out = copy.copy_into_buffer(&ctx, true).unwrap();
        assert_eq!(out.to_vec(), Some(vec![4, 5]));
        assert!(copy.is_consumed());
        assert_eq!(copy.size(), 0);
        assert_eq!(
            copy.copy_into(&ctx, true).unwrap_err(),
            CopyError::BufferInvalid
        );
        assert_eq!(
            copy.copy_into(&ctx, false).unwrap_err(),
            CopyError::BufferInvalid
        );
    }

    #[test]
    fn test_copy_in_respects_limit() {
        let ctx = Context::new(ContextConfig::new().array_buffer_limit(4));
        let copy = ArrayBufferCopy::from_bytes(&[0; 8]);
        assert_eq!(
            copy.copy_into(&ctx, false).unwrap_err(),
            CopyError::AllocationLimitExceeded { requested: 8 }
        );
        assert!(!copy.is_consumed());
    }

    #[test]
    fn test_shared_copy_shares_store() {
        let ctx = Context::new(ContextConfig::new().array_buffer_limit(1));
        let source = SharedArrayBuffer::new(8);
        let copy = SharedArrayBufferCopy::new(&source);
        let a = copy.copy_into_buffer(&ctx);
        let b = copy.copy_into_buffer(&ctx);
        assert!(a.shares_memory_with(&source));
        assert!(a.shares_memory_with(&b));
        a.set(0, 7);
        assert_eq!(source.get(0), Some(7));
    }
}
