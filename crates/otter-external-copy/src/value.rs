//! JavaScript values
//!
//! The value representation a context hands to the copy engine and gets
//! back from it. Heap values are `Arc`s, so identity is pointer identity.

use num_bigint::BigInt;
use std::sync::Arc;

use crate::array_buffer::JsArrayBuffer;
use crate::error::CopyResult;
use crate::external_copy::Transferable;
use crate::object::JsObject;
use crate::shared_buffer::SharedArrayBuffer;
use crate::typed_array::JsArrayBufferView;

/// A native (host) function. Functions have no copy representation.
#[derive(Debug)]
pub struct NativeFunction {
    /// Function name
    pub name: Arc<str>,
}

/// A Proxy exotic object
#[derive(Debug, Clone)]
pub struct JsProxy {
    /// Proxy target
    pub target: Value,
    /// Proxy handler
    pub handler: Arc<JsObject>,
}

/// A compiled WebAssembly module. Compiled code is immutable and shared
/// between contexts by reference.
#[derive(Debug)]
pub struct CompiledModule {
    /// Module name, for diagnostics
    pub name: Arc<str>,
    /// Wire bytes the module was compiled from
    pub wire_bytes: Arc<[u8]>,
}

impl CompiledModule {
    /// Create a compiled module handle
    pub fn new(name: &str, wire_bytes: &[u8]) -> Self {
        Self {
            name: Arc::from(name),
            wire_bytes: Arc::from(wire_bytes),
        }
    }
}

/// An object owned by a higher layer that knows how to move itself across
/// contexts (references, handles to existing copies, ...).
pub trait HostObject: Send + Sync + std::fmt::Debug {
    /// Constructor name reported to scripts
    fn class_name(&self) -> &str;

    /// Capture a transferable for this object.
    fn transfer_out(&self) -> CopyResult<Box<dyn Transferable>>;
}

/// A JavaScript value
#[derive(Clone)]
pub enum Value {
    /// `undefined`
    Undefined,
    /// `null`
    Null,
    /// Boolean
    Boolean(bool),
    /// Small integer (number that fits in 32 bits)
    Int32(i32),
    /// IEEE-754 double
    Number(f64),
    /// Arbitrary precision integer
    BigInt(Arc<BigInt>),
    /// String
    String(Arc<str>),
    /// Symbol (by id)
    Symbol(u64),
    /// Ordinary object (errors included)
    Object(Arc<JsObject>),
    /// Array
    Array(Arc<JsObject>),
    /// Date (time value in ms)
    Date(f64),
    /// Function
    Function(Arc<NativeFunction>),
    /// Proxy
    Proxy(Arc<JsProxy>),
    /// ArrayBuffer
    ArrayBuffer(Arc<JsArrayBuffer>),
    /// SharedArrayBuffer
    SharedArrayBuffer(Arc<SharedArrayBuffer>),
    /// Typed array or DataView
    ArrayBufferView(Arc<JsArrayBufferView>),
    /// Compiled WebAssembly module
    WasmModule(Arc<CompiledModule>),
    /// Higher-layer transferable object
    Host(Arc<dyn HostObject>),
}

impl Value {
    /// Create undefined value
    #[inline]
    pub const fn undefined() -> Self {
        Self::Undefined
    }

    /// Create null value
    #[inline]
    pub const fn null() -> Self {
        Self::Null
    }

    /// Create boolean value
    #[inline]
    pub const fn boolean(b: bool) -> Self {
        Self::Boolean(b)
    }

    /// Create 32-bit integer value
    #[inline]
    pub const fn int32(n: i32) -> Self {
        Self::Int32(n)
    }

    /// Create number value
    #[inline]
    pub const fn number(n: f64) -> Self {
        Self::Number(n)
    }

    /// Create a number from an unsigned 32-bit integer, staying small when it fits
    pub fn uint32(n: u32) -> Self {
        match i32::try_from(n) {
            Ok(i) => Self::Int32(i),
            Err(_) => Self::Number(n as f64),
        }
    }

    /// Create BigInt value
    pub fn bigint(n: BigInt) -> Self {
        Self::BigInt(Arc::new(n))
    }

    /// Create string value
    pub fn string(s: impl Into<Arc<str>>) -> Self {
        Self::String(s.into())
    }

    /// Create object value
    pub fn object(obj: Arc<JsObject>) -> Self {
        Self::Object(obj)
    }

    /// Create array value
    pub fn array(arr: Arc<JsObject>) -> Self {
        Self::Array(arr)
    }

    /// Create ArrayBuffer value
    pub fn array_buffer(ab: Arc<JsArrayBuffer>) -> Self {
        Self::ArrayBuffer(ab)
    }

    /// Create SharedArrayBuffer value
    pub fn shared_array_buffer(sab: Arc<SharedArrayBuffer>) -> Self {
        Self::SharedArrayBuffer(sab)
    }

    /// Create typed array / DataView value
    pub fn array_buffer_view(view: Arc<JsArrayBufferView>) -> Self {
        Self::ArrayBufferView(view)
    }

    /// Check if undefined
    #[inline]
    pub fn is_undefined(&self) -> bool {
        matches!(self, Self::Undefined)
    }

    /// Check if null
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Check if this is a number
    #[inline]
    pub fn is_number(&self) -> bool {
        matches!(self, Self::Int32(_) | Self::Number(_))
    }

    /// Check if this is a string
    #[inline]
    pub fn is_string(&self) -> bool {
        matches!(self, Self::String(_))
    }

    /// Whether this value is an object of any kind (not a primitive)
    pub fn is_object(&self) -> bool {
        !matches!(
            self,
            Self::Undefined
                | Self::Null
                | Self::Boolean(_)
                | Self::Int32(_)
                | Self::Number(_)
                | Self::BigInt(_)
                | Self::String(_)
                | Self::Symbol(_)
        )
    }

    /// Check if the number is an integer representable as `i32` (`-0` is not)
    pub fn is_int32(&self) -> bool {
        match self {
            Self::Int32(_) => true,
            Self::Number(n) => {
                n.fract() == 0.0
                    && *n >= i32::MIN as f64
                    && *n <= i32::MAX as f64
                    && !(*n == 0.0 && n.is_sign_negative())
            }
            _ => false,
        }
    }

    /// Check if the number is an integer representable as `u32` (`-0` is not)
    pub fn is_uint32(&self) -> bool {
        match self {
            Self::Int32(i) => *i >= 0,
            Self::Number(n) => {
                n.fract() == 0.0
                    && *n >= 0.0
                    && *n <= u32::MAX as f64
                    && !n.is_sign_negative()
            }
            _ => false,
        }
    }

    /// Get as boolean
    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            Self::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Get as number
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Int32(i) => Some(*i as f64),
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Get as string
    pub fn as_string(&self) -> Option<&Arc<str>> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get as BigInt
    pub fn as_bigint(&self) -> Option<&BigInt> {
        match self {
            Self::BigInt(n) => Some(n),
            _ => None,
        }
    }

    /// Get as object (ordinary objects and arrays)
    pub fn as_object(&self) -> Option<&Arc<JsObject>> {
        match self {
            Self::Object(o) | Self::Array(o) => Some(o),
            _ => None,
        }
    }

    /// Get as ArrayBuffer
    pub fn as_array_buffer(&self) -> Option<&Arc<JsArrayBuffer>> {
        match self {
            Self::ArrayBuffer(ab) => Some(ab),
            _ => None,
        }
    }

    /// Get as SharedArrayBuffer
    pub fn as_shared_array_buffer(&self) -> Option<&Arc<SharedArrayBuffer>> {
        match self {
            Self::SharedArrayBuffer(sab) => Some(sab),
            _ => None,
        }
    }

    /// Get as typed array / DataView
    pub fn as_array_buffer_view(&self) -> Option<&Arc<JsArrayBufferView>> {
        match self {
            Self::ArrayBufferView(view) => Some(view),
            _ => None,
        }
    }

    /// Get as compiled module
    pub fn as_wasm_module(&self) -> Option<&Arc<CompiledModule>> {
        match self {
            Self::WasmModule(m) => Some(m),
            _ => None,
        }
    }

    /// Kind name for diagnostics
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Undefined => "undefined",
            Self::Null => "null",
            Self::Boolean(_) => "boolean",
            Self::Int32(_) | Self::Number(_) => "number",
            Self::BigInt(_) => "bigint",
            Self::String(_) => "string",
            Self::Symbol(_) => "symbol",
            Self::Object(_) => "object",
            Self::Array(_) => "array",
            Self::Date(_) => "date",
            Self::Function(_) => "function",
            Self::Proxy(_) => "proxy",
            Self::ArrayBuffer(_) => "ArrayBuffer",
            Self::SharedArrayBuffer(_) => "SharedArrayBuffer",
            Self::ArrayBufferView(_) => "ArrayBufferView",
            Self::WasmModule(_) => "WebAssembly.Module",
            Self::Host(_) => "host object",
        }
    }

    /// Address of the heap allocation, for identity maps
    pub fn heap_identity(&self) -> Option<usize> {
        let ptr = match self {
            Self::Object(o) | Self::Array(o) => Arc::as_ptr(o) as *const () as usize,
            Self::ArrayBuffer(ab) => Arc::as_ptr(ab) as *const () as usize,
            Self::SharedArrayBuffer(sab) => Arc::as_ptr(sab) as *const () as usize,
            Self::ArrayBufferView(view) => Arc::as_ptr(view) as *const () as usize,
            Self::WasmModule(m) => Arc::as_ptr(m) as *const () as usize,
            Self::Host(h) => Arc::as_ptr(h) as *const () as usize,
            _ => return None,
        };
        Some(ptr)
    }

    /// String conversion used when capturing error details
    pub fn to_display_string(&self) -> String {
        match self {
            Self::Undefined => "undefined".to_string(),
            Self::Null => "null".to_string(),
            Self::Boolean(b) => b.to_string(),
            Self::Int32(i) => i.to_string(),
            Self::Number(n) => format_number(*n),
            Self::BigInt(n) => n.to_string(),
            Self::String(s) => s.to_string(),
            Self::Symbol(id) => format!("Symbol({id})"),
            Self::Array(_) => String::new(),
            Self::Object(o) => format!("[object {}]", o.class_name()),
            Self::Host(h) => format!("[object {}]", h.class_name()),
            other => format!("[object {}]", other.type_name()),
        }
    }
}

fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        let s = if n > 0.0 { "Infinity" } else { "-Infinity" };
        s.to_string()
    } else if n == 0.0 {
        "0".to_string()
    } else if n.fract() == 0.0 && n.abs() < 1e21 {
        // f64 Display never switches to exponent form
        format!("{n}")
    } else {
        n.to_string()
    }
}

impl PartialEq for Value {
    /// Strict equality: numbers by value, strings by content, heap values by identity.
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Undefined, Self::Undefined) | (Self::Null, Self::Null) => true,
            (Self::Boolean(a), Self::Boolean(b)) => a == b,
            (Self::Int32(_) | Self::Number(_), Self::Int32(_) | Self::Number(_)) => {
                self.as_number() == other.as_number()
            }
            (Self::BigInt(a), Self::BigInt(b)) => a == b,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Symbol(a), Self::Symbol(b)) => a == b,
            (Self::Date(a), Self::Date(b)) => a.to_bits() == b.to_bits(),
            (Self::Function(a), Self::Function(b)) => Arc::ptr_eq(a, b),
            (Self::Proxy(a), Self::Proxy(b)) => Arc::ptr_eq(a, b),
            _ => match (self.heap_identity(), other.heap_identity()) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            },
        }
    }
}

impl std::fmt::Debug for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Undefined => write!(f, "undefined"),
            Self::Null => write!(f, "null"),
            Self::Boolean(b) => write!(f, "{b}"),
            Self::Int32(i) => write!(f, "{i}"),
            Self::Number(n) => write!(f, "{n}"),
            Self::BigInt(n) => write!(f, "{n}n"),
            Self::String(s) => write!(f, "{s:?}"),
            Self::Symbol(id) => write!(f, "Symbol({id})"),
            Self::Object(o) | Self::Array(o) => write!(f, "{o:?}"),
            Self::Date(t) => write!(f, "Date({t})"),
            Self::Function(func) => write!(f, "[Function: {}]", func.name),
            Self::Proxy(_) => write!(f, "Proxy"),
            Self::ArrayBuffer(ab) => write!(f, "ArrayBuffer({})", ab.byte_length()),
            Self::SharedArrayBuffer(sab) => write!(f, "SharedArrayBuffer({})", sab.byte_length()),
            Self::ArrayBufferView(view) => write!(f, "{}({})", view.kind().name(), view.length()),
            Self::WasmModule(m) => write!(f, "WebAssembly.Module({})", m.name),
            Self::Host(h) => write!(f, "{h:?}"),
        }
    }
}
