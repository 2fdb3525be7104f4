//! Isolated execution context
//!
//! A `Context` is the source or target of a copy. It owns the pieces of
//! per-context state the copy engine consults: the optional allocation
//! guard and the optional host `Buffer` prototype. Every copy and
//! materialization takes the context explicitly; there is no ambient
//! "current context".

use parking_lot::RwLock;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::array_buffer::{BufferRef, JsArrayBuffer};
use crate::config::ContextConfig;
use crate::error::{CopyError, CopyResult};
use crate::memory::{AllocationGuard, AllocationTicket, LimitedAllocator};
use crate::object::{JsObject, PropertyAttributes, PropertyDescriptor, PropertyKey};
use crate::value::Value;

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

/// One isolated execution context.
pub struct Context {
    id: u64,
    allocator: Option<Arc<dyn AllocationGuard>>,
    buffer_prototype: RwLock<Option<Arc<JsObject>>>,
}

impl Context {
    /// Create a new context with the given configuration.
    pub fn new(config: ContextConfig) -> Self {
        let allocator = config
            .array_buffer_limit
            .map(|limit| Arc::new(LimitedAllocator::new(limit)) as Arc<dyn AllocationGuard>);
        let buffer_prototype = config
            .node_buffer_prototype
            .then(|| Arc::new(JsObject::with_class_name("Buffer", None)));
        let id = NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(
            context = id,
            limit = ?config.array_buffer_limit,
            "context created"
        );
        Self {
            id,
            allocator,
            buffer_prototype: RwLock::new(buffer_prototype),
        }
    }

    /// Replace the allocation guard.
    pub fn with_allocator(mut self, allocator: Arc<dyn AllocationGuard>) -> Self {
        self.allocator = Some(allocator);
        self
    }

    /// Context id, for diagnostics
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The allocation guard, if any
    pub fn allocator(&self) -> Option<&dyn AllocationGuard> {
        self.allocator.as_deref()
    }

    /// Fail with `AllocationLimitExceeded` if the guard rejects `size` bytes.
    pub fn check_allocation(&self, size: usize) -> CopyResult<()> {
        match &self.allocator {
            Some(guard) if !guard.check(size) => Err(CopyError::allocation_failed(size)),
            _ => Ok(()),
        }
    }

    /// Whether the guard's accounting has gone past its limit
    pub fn is_over_limit(&self) -> bool {
        self.allocator.as_ref().is_some_and(|guard| !guard.check(0))
    }

    /// Report a buffer that now belongs to this context to the guard.
    ///
    /// The buffer carries the charge and gives it back when it is dropped
    /// or detached.
    pub fn track(&self, buffer: &BufferRef, size: usize) {
        if let Some(guard) = &self.allocator {
            guard.track(buffer, size);
            buffer.attach_allocation(AllocationTicket::new(guard.clone(), size));
        }
    }

    /// The host `Buffer` prototype, if one was registered
    pub fn buffer_prototype(&self) -> Option<Arc<JsObject>> {
        self.buffer_prototype.read().clone()
    }

    /// Register (or clear) the host `Buffer` prototype
    pub fn set_buffer_prototype(&self, prototype: Option<Arc<JsObject>>) {
        *self.buffer_prototype.write() = prototype;
    }

    /// Create a plain object
    pub fn new_object(&self) -> Arc<JsObject> {
        Arc::new(JsObject::new(None))
    }

    /// Create an array of `length` undefined elements
    pub fn new_array(&self, length: usize) -> Arc<JsObject> {
        Arc::new(JsObject::array(length))
    }

    /// Create an error object of the given constructor with a `message`.
    pub fn new_error(&self, class_name: &str, message: Arc<str>) -> Arc<JsObject> {
        let error = Arc::new(JsObject::with_class_name(class_name, None));
        error.define_property(
            PropertyKey::string("message"),
            PropertyDescriptor::data_with_attrs(Value::String(message), PropertyAttributes::hidden()),
        );
        error
    }

    /// Allocate an ArrayBuffer holding a copy of `bytes`.
    ///
    /// Does not consult the guard's limit; callers check first.
    pub fn new_array_buffer(&self, bytes: &[u8]) -> Arc<JsArrayBuffer> {
        let buffer = Arc::new(JsArrayBuffer::from_bytes(bytes));
        self.track(&BufferRef::Array(buffer.clone()), bytes.len());
        buffer
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new(ContextConfig::default())
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("id", &self.id)
            .field("limited", &self.allocator.is_some())
            .finish()
    }
}
