//! # Otter External Copy
//!
//! Moves values between isolated contexts that share no heap.
//!
//! ## Design Principles
//!
//! - **Owned copies**: an [`ExternalCopy`] outlives the context it was taken from
//! - **Two buffer modes**: deep copy, or zero-copy transfer that detaches the source
//! - **Explicit contexts**: every copy and materialization names its [`Context`]
//! - **Global accounting**: live copy memory is summed in one atomic counter

#![warn(clippy::all)]
#![warn(missing_docs)]

pub mod array_buffer;
pub mod backing_store;
pub mod config;
pub mod context;
pub mod error;
pub mod external_copy;
pub mod memory;
pub mod object;
pub mod serializer;
pub mod shared_buffer;
pub mod typed_array;
pub mod value;

pub use array_buffer::{BufferRef, JsArrayBuffer};
pub use config::{ContextConfig, CopyOptions};
pub use context::Context;
pub use error::{CopyError, CopyResult};
pub use external_copy::{ExternalCopy, Transferable, total_external_size};
pub use memory::{AllocationGuard, LimitedAllocator};
pub use object::{JsObject, PropertyKey};
pub use shared_buffer::SharedArrayBuffer;
pub use typed_array::{JsArrayBufferView, ViewKind};
pub use value::Value;
