//! External copies
//!
//! An [`ExternalCopy`] is a value captured out of one context into memory
//! owned by no context. It can be materialized into any number of target
//! contexts later, long after the source is gone.
//!
//! Every copy charges its size against a process-wide counter readable
//! through [`total_external_size`].

mod buffer;
mod error;
mod primitive;
mod serialized;
mod size;
mod view;

pub use buffer::{ArrayBufferCopy, SharedArrayBufferCopy};
pub use error::{ErrorCopy, ErrorType, NON_ERROR_THROWN};
pub use primitive::{BigIntCopy, ScalarCopy, ScalarValue, StringCopy};
pub use serialized::SerializedCopy;
pub use size::{SizedCopy, total_external_size};
pub use view::ArrayBufferViewCopy;

use crate::array_buffer::BufferRef;
use crate::config::CopyOptions;
use crate::context::Context;
use crate::error::{CopyError, CopyResult};
use crate::value::Value;

/// Something that can be materialized into a context.
pub trait Transferable: Send + Sync + std::fmt::Debug {
    /// Build the value in `ctx`.
    ///
    /// With `transfer_in` the copy may hand its resources over and become
    /// unusable afterwards; otherwise it stays intact.
    fn copy_into(&self, ctx: &Context, transfer_in: bool) -> CopyResult<Value>;

    /// Bytes this copy charges against the global counter
    fn size(&self) -> usize;

    /// Materialize with transfer-in semantics
    fn transfer_in(&self, ctx: &Context) -> CopyResult<Value> {
        self.copy_into(ctx, true)
    }
}

/// A copy of any transferable value kind.
#[derive(Debug)]
pub enum ExternalCopy {
    /// `undefined`
    Undefined,
    /// `null`
    Null,
    /// Boolean
    Boolean(ScalarCopy<bool>),
    /// Number that fits in `i32` but not `u32`
    Int32(ScalarCopy<i32>),
    /// Number that fits in `u32`
    Uint32(ScalarCopy<u32>),
    /// Any other number
    Number(ScalarCopy<f64>),
    /// BigInt
    BigInt(BigIntCopy),
    /// String
    String(StringCopy),
    /// Captured error
    Error(ErrorCopy),
    /// ArrayBuffer, duplicated or transferred
    ArrayBuffer(ArrayBufferCopy),
    /// SharedArrayBuffer
    SharedArrayBuffer(SharedArrayBufferCopy),
    /// Typed array or DataView metadata (only inside a clone pass)
    ArrayBufferView(ArrayBufferViewCopy),
    /// Object graph
    Serialized(SerializedCopy),
    /// Higher-layer transferable
    Host(Box<dyn Transferable>),
}

impl ExternalCopy {
    /// Copy `value` out of `ctx`.
    ///
    /// A top-level proxy is replaced by its target. ArrayBuffers are
    /// transferred when `transfer_out` is set or they are in the transfer
    /// list; every other object goes through the structured clone codec.
    pub fn copy(value: &Value, ctx: &Context, options: &CopyOptions) -> CopyResult<Self> {
        let value = match value {
            Value::Proxy(proxy) => {
                if matches!(proxy.target, Value::Proxy(_)) {
                    return Err(CopyError::UnsupportedValueKind("proxy of a proxy"));
                }
                &proxy.target
            }
            other => other,
        };

        if let Some(copy) = Self::copy_if_primitive(value) {
            return Ok(copy);
        }

        match value {
            Value::ArrayBuffer(buffer) => {
                let copy = if options.transfer_out || options.is_listed(buffer) {
                    ArrayBufferCopy::transfer(buffer)?
                } else {
                    ArrayBufferCopy::duplicate(buffer)?
                };
                Ok(Self::ArrayBuffer(copy))
            }
            Value::SharedArrayBuffer(buffer) => {
                Ok(Self::SharedArrayBuffer(SharedArrayBufferCopy::new(buffer)))
            }
            Value::ArrayBufferView(view) => {
                if !view.has_buffer() {
                    ctx.check_allocation(view.byte_length())?;
                    view.buffer().backing_store().ok_or(CopyError::BufferInvalid)?;
                }
                let own_buffer = match view.buffer() {
                    BufferRef::Array(buffer) if options.transfer_out && !options.is_listed(buffer) => {
                        Some([buffer.clone()])
                    }
                    _ => None,
                };
                let transfer_list = match &own_buffer {
                    Some(list) => list.as_slice(),
                    None => options.transfer_list.as_slice(),
                };
                SerializedCopy::new(value, ctx, transfer_list).map(Self::Serialized)
            }
            Value::Symbol(_) => Err(CopyError::UnsupportedValueKind("symbol")),
            _ => SerializedCopy::new(value, ctx, &options.transfer_list).map(Self::Serialized),
        }
    }

    /// Copy `value` if it is a primitive. Objects give `None`.
    pub fn copy_if_primitive(value: &Value) -> Option<Self> {
        let copy = match value {
            Value::Undefined => Self::Undefined,
            Value::Null => Self::Null,
            Value::Boolean(b) => Self::Boolean(ScalarCopy::new(*b)),
            Value::String(s) => Self::String(StringCopy::new(s)),
            Value::BigInt(n) => Self::BigInt(BigIntCopy::new(n)),
            Value::Int32(_) | Value::Number(_) => {
                let n = value.as_number()?;
                if value.is_uint32() {
                    Self::Uint32(ScalarCopy::new(n as u32))
                } else if value.is_int32() {
                    Self::Int32(ScalarCopy::new(n as i32))
                } else {
                    Self::Number(ScalarCopy::new(n))
                }
            }
            _ => return None,
        };
        Some(copy)
    }

    /// Capture a value thrown by untrusted code.
    ///
    /// Error-like objects become [`ErrorCopy`]s, primitives are copied as
    /// themselves, and anything else becomes a generic error saying a
    /// non-error was thrown.
    pub fn copy_thrown_value(value: &Value) -> Self {
        if let Some(error) = ErrorCopy::detect(value) {
            return Self::Error(error);
        }
        Self::copy_if_primitive(value)
            .unwrap_or_else(|| Self::Error(ErrorCopy::non_error_thrown()))
    }

    /// Materialize, then fail if the target's allocation guard ended up over
    /// its limit.
    pub fn copy_into_check_heap(&self, ctx: &Context, transfer_in: bool) -> CopyResult<Value> {
        let value = self.copy_into(ctx, transfer_in)?;
        if ctx.is_over_limit() {
            return Err(CopyError::allocation_failed(self.size()));
        }
        Ok(value)
    }

    fn as_transferable(&self) -> Option<&dyn Transferable> {
        match self {
            Self::Undefined | Self::Null => None,
            Self::Boolean(copy) => Some(copy),
            Self::Int32(copy) => Some(copy),
            Self::Uint32(copy) => Some(copy),
            Self::Number(copy) => Some(copy),
            Self::BigInt(copy) => Some(copy),
            Self::String(copy) => Some(copy),
            Self::Error(copy) => Some(copy),
            Self::ArrayBuffer(copy) => Some(copy),
            Self::SharedArrayBuffer(copy) => Some(copy),
            Self::ArrayBufferView(copy) => Some(copy),
            Self::Serialized(copy) => Some(copy),
            Self::Host(copy) => Some(copy.as_ref()),
        }
    }
}

impl Transferable for ExternalCopy {
    fn copy_into(&self, ctx: &Context, transfer_in: bool) -> CopyResult<Value> {
        match self {
            Self::Undefined => Ok(Value::Undefined),
            Self::Null => Ok(Value::Null),
            other => match other.as_transferable() {
                Some(copy) => copy.copy_into(ctx, transfer_in),
                None => Ok(Value::Undefined),
            },
        }
    }

    fn size(&self) -> usize {
        self.as_transferable().map_or(0, Transferable::size)
    }
}
