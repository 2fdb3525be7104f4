//! Structured clone codec
//!
//! A tag-per-value byte format for object graphs. The codec handles plain
//! data itself and hands everything it cannot clone (views, higher-layer
//! host objects, shared buffers, compiled modules) to a delegate.
//!
//! Heap values get an id the first time they are written. Later occurrences
//! in the same pass are written as back-references, so identity and cycles
//! survive the round trip.

pub mod delegate;

pub use delegate::{CloneDeserializerDelegate, CloneSerializerDelegate, TransferableTable};

use rustc_hash::FxHashMap;
use num_bigint::{BigInt, BigUint, Sign};
use std::sync::Arc;

use crate::array_buffer::JsArrayBuffer;
use crate::context::Context;
use crate::error::{CopyError, CopyResult};
use crate::object::{JsObject, PropertyKey};
use crate::shared_buffer::SharedArrayBuffer;
use crate::value::{CompiledModule, Value};

/// Format version written in the header
pub const FORMAT_VERSION: u8 = 1;

mod tag {
    pub const VERSION: u8 = 0xFF;
    pub const UNDEFINED: u8 = b'_';
    pub const NULL: u8 = b'0';
    pub const TRUE: u8 = b'T';
    pub const FALSE: u8 = b'F';
    pub const INT32: u8 = b'I';
    pub const DOUBLE: u8 = b'N';
    pub const BIGINT: u8 = b'Z';
    pub const STRING: u8 = b'S';
    pub const DATE: u8 = b'D';
    pub const BEGIN_OBJECT: u8 = b'o';
    pub const END_OBJECT: u8 = b'{';
    pub const BEGIN_ARRAY: u8 = b'A';
    pub const END_ARRAY: u8 = b'$';
    pub const ARRAY_BUFFER: u8 = b'B';
    pub const ARRAY_BUFFER_TRANSFER: u8 = b't';
    pub const SHARED_ARRAY_BUFFER: u8 = b'u';
    pub const WASM_MODULE_TRANSFER: u8 = b'w';
    pub const HOST_OBJECT: u8 = b'\\';
    pub const OBJECT_REFERENCE: u8 = b'^';
}

/// Serializer-side extension points.
pub trait SerializerDelegate {
    /// Id for a shared buffer seen for the first time in this pass
    fn get_shared_array_buffer_id(&mut self, buffer: &Arc<SharedArrayBuffer>) -> CopyResult<u32>;

    /// Id for a compiled module, in its own id space
    fn get_wasm_module_transfer_id(&mut self, module: &Arc<CompiledModule>) -> CopyResult<u32>;

    /// Write a value the codec cannot clone. The delegate may recurse into
    /// [`ValueSerializer::write_value`].
    fn write_host_object(&mut self, serializer: &mut ValueSerializer, value: &Value) -> CopyResult<()>;
}

/// Deserializer-side extension points, mirroring [`SerializerDelegate`].
pub trait DeserializerDelegate {
    /// Shared buffer for an id handed out while serializing
    fn get_shared_array_buffer_from_id(&mut self, ctx: &Context, id: u32) -> CopyResult<Arc<SharedArrayBuffer>>;

    /// Compiled module for an id handed out while serializing
    fn get_wasm_module_from_id(&mut self, id: u32) -> CopyResult<Arc<CompiledModule>>;

    /// Read a value written by [`SerializerDelegate::write_host_object`]
    fn read_host_object(&mut self, deserializer: &mut ValueDeserializer<'_>, ctx: &Context) -> CopyResult<Value>;
}

/// Writes values into a byte buffer.
#[derive(Default)]
pub struct ValueSerializer {
    buffer: Vec<u8>,
    id_map: FxHashMap<usize, u32>,
    next_id: u32,
    array_buffer_transfer_map: FxHashMap<usize, u32>,
    /// Holds every identified value so no address is reused mid-pass
    seen: Vec<Value>,
}

impl ValueSerializer {
    /// Create an empty serializer
    pub fn new() -> Self {
        Self::default()
    }

    /// Write the format header
    pub fn write_header(&mut self) {
        self.buffer.push(tag::VERSION);
        self.buffer.push(FORMAT_VERSION);
    }

    /// Write `buffer` as transfer id `id` instead of its bytes
    pub fn transfer_array_buffer(&mut self, id: u32, buffer: &Arc<JsArrayBuffer>) {
        let key = Arc::as_ptr(buffer) as *const () as usize;
        self.array_buffer_transfer_map.insert(key, id);
        self.seen.push(Value::array_buffer(buffer.clone()));
    }

    /// Write a raw unsigned integer
    pub fn write_uint32(&mut self, value: u32) {
        self.write_varint(u64::from(value));
    }

    /// Bytes written so far
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Whether nothing has been written yet
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Take the written bytes
    pub fn release(self) -> Vec<u8> {
        self.buffer
    }

    /// Serialize one value and everything reachable from it.
    pub fn write_value(&mut self, value: &Value, delegate: &mut dyn SerializerDelegate) -> CopyResult<()> {
        match value {
            Value::Undefined => self.buffer.push(tag::UNDEFINED),
            Value::Null => self.buffer.push(tag::NULL),
            Value::Boolean(true) => self.buffer.push(tag::TRUE),
            Value::Boolean(false) => self.buffer.push(tag::FALSE),
            Value::Int32(n) => self.write_int32(*n),
            Value::Number(n) => {
                self.buffer.push(tag::DOUBLE);
                self.buffer.extend_from_slice(&n.to_le_bytes());
            }
            Value::BigInt(n) => self.write_bigint(n)?,
            Value::String(s) => self.write_string(s)?,
            Value::Date(t) => {
                self.buffer.push(tag::DATE);
                self.buffer.extend_from_slice(&t.to_le_bytes());
            }
            Value::Symbol(_) | Value::Function(_) | Value::Proxy(_) => {
                return Err(CopyError::data_clone(format!(
                    "{} could not be cloned.",
                    value.type_name()
                )));
            }
            _ => self.write_heap_value(value, delegate)?,
        }
        Ok(())
    }

    fn write_heap_value(&mut self, value: &Value, delegate: &mut dyn SerializerDelegate) -> CopyResult<()> {
        let Some(identity) = value.heap_identity() else {
            return Err(CopyError::data_clone("value could not be cloned."));
        };
        if let Some(id) = self.id_map.get(&identity) {
            let id = *id;
            self.buffer.push(tag::OBJECT_REFERENCE);
            self.write_uint32(id);
            return Ok(());
        }
        if let Some(id) = self.array_buffer_transfer_map.get(&identity) {
            let id = *id;
            self.assign_id(identity, value);
            self.buffer.push(tag::ARRAY_BUFFER_TRANSFER);
            self.write_uint32(id);
            return Ok(());
        }
        self.assign_id(identity, value);

        match value {
            Value::Object(object) => self.write_object(object, delegate),
            Value::Array(array) => self.write_array(array, delegate),
            Value::ArrayBuffer(buffer) => {
                let bytes = buffer.to_vec().ok_or_else(|| {
                    CopyError::data_clone("An ArrayBuffer is detached and could not be cloned.")
                })?;
                self.buffer.push(tag::ARRAY_BUFFER);
                self.write_length(bytes.len())?;
                self.buffer.extend_from_slice(&bytes);
                Ok(())
            }
            Value::SharedArrayBuffer(buffer) => {
                let id = delegate.get_shared_array_buffer_id(buffer)?;
                self.buffer.push(tag::SHARED_ARRAY_BUFFER);
                self.write_uint32(id);
                Ok(())
            }
            Value::WasmModule(module) => {
                let id = delegate.get_wasm_module_transfer_id(module)?;
                self.buffer.push(tag::WASM_MODULE_TRANSFER);
                self.write_uint32(id);
                Ok(())
            }
            _ => {
                self.buffer.push(tag::HOST_OBJECT);
                delegate.write_host_object(self, value)
            }
        }
    }

    fn assign_id(&mut self, identity: usize, value: &Value) {
        self.id_map.insert(identity, self.next_id);
        self.next_id += 1;
        self.seen.push(value.clone());
    }

    fn write_object(&mut self, object: &JsObject, delegate: &mut dyn SerializerDelegate) -> CopyResult<()> {
        self.buffer.push(tag::BEGIN_OBJECT);
        let count = self.write_properties(object, object.own_enumerable_keys(), delegate)?;
        self.buffer.push(tag::END_OBJECT);
        self.write_uint32(count);
        Ok(())
    }

    fn write_array(&mut self, array: &JsObject, delegate: &mut dyn SerializerDelegate) -> CopyResult<()> {
        let length = Self::checked_length(array.array_length())?;
        self.buffer.push(tag::BEGIN_ARRAY);
        self.write_uint32(length);
        for index in 0..length {
            let element = array
                .get(&PropertyKey::Index(index))
                .unwrap_or(Value::Undefined);
            self.write_value(&element, delegate)?;
        }
        let named = array
            .own_enumerable_keys()
            .into_iter()
            .filter(|key| !matches!(key, PropertyKey::Index(i) if *i < length))
            .collect();
        let count = self.write_properties(array, named, delegate)?;
        self.buffer.push(tag::END_ARRAY);
        self.write_uint32(count);
        self.write_uint32(length);
        Ok(())
    }

    fn write_properties(
        &mut self,
        object: &JsObject,
        keys: Vec<PropertyKey>,
        delegate: &mut dyn SerializerDelegate,
    ) -> CopyResult<u32> {
        let mut count = 0;
        for key in keys {
            let value = match object.try_get(&key) {
                Ok(Some(value)) => value,
                Ok(None) => continue,
                Err(thrown) => {
                    return Err(CopyError::data_clone(format!(
                        "property getter threw: {}",
                        thrown.to_display_string()
                    )));
                }
            };
            match &key {
                PropertyKey::String(name) => self.write_string(name)?,
                PropertyKey::Index(i) => self.write_value(&Value::uint32(*i), delegate)?,
                PropertyKey::Symbol(_) => continue,
            }
            self.write_value(&value, delegate)?;
            count += 1;
        }
        Ok(count)
    }

    fn write_int32(&mut self, n: i32) {
        self.buffer.push(tag::INT32);
        let zigzag = ((n << 1) ^ (n >> 31)) as u32;
        self.write_uint32(zigzag);
    }

    fn write_bigint(&mut self, n: &BigInt) -> CopyResult<()> {
        let (sign, words) = n.to_u64_digits();
        self.buffer.push(tag::BIGINT);
        self.buffer.push(u8::from(sign == Sign::Minus));
        self.write_length(words.len())?;
        for word in words {
            self.buffer.extend_from_slice(&word.to_le_bytes());
        }
        Ok(())
    }

    fn write_string(&mut self, s: &str) -> CopyResult<()> {
        self.buffer.push(tag::STRING);
        self.write_length(s.len())?;
        self.buffer.extend_from_slice(s.as_bytes());
        Ok(())
    }

    /// Lengths are framed as `u32`; anything longer cannot be represented.
    fn checked_length(len: usize) -> CopyResult<u32> {
        u32::try_from(len)
            .map_err(|_| CopyError::data_clone(format!("length {len} is too large to be cloned.")))
    }

    fn write_length(&mut self, len: usize) -> CopyResult<()> {
        let len = Self::checked_length(len)?;
        self.write_uint32(len);
        Ok(())
    }

    fn write_varint(&mut self, mut value: u64) {
        loop {
            let byte = (value & 0x7F) as u8;
            value >>= 7;
            if value == 0 {
                self.buffer.push(byte);
                return;
            }
            self.buffer.push(byte | 0x80);
        }
    }
}

impl std::fmt::Debug for ValueSerializer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValueSerializer")
            .field("bytes", &self.buffer.len())
            .field("objects", &self.next_id)
            .finish()
    }
}

fn malformed() -> CopyError {
    CopyError::data_clone("Unable to deserialize cloned data.")
}

/// Reads values written by [`ValueSerializer`].
pub struct ValueDeserializer<'a> {
    data: &'a [u8],
    position: usize,
    /// Materialized heap values by id; `None` while still being built
    objects: Vec<Option<Value>>,
    array_buffer_transfer_map: FxHashMap<u32, Arc<JsArrayBuffer>>,
}

impl<'a> ValueDeserializer<'a> {
    /// Create a deserializer over `data`
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            position: 0,
            objects: Vec::new(),
            array_buffer_transfer_map: FxHashMap::default(),
        }
    }

    /// Read and validate the format header
    pub fn read_header(&mut self) -> CopyResult<()> {
        if self.read_byte()? != tag::VERSION {
            return Err(malformed());
        }
        let version = self.read_byte()?;
        if version != FORMAT_VERSION {
            return Err(CopyError::data_clone(format!(
                "Unsupported clone format version {version}"
            )));
        }
        Ok(())
    }

    /// Resolve transfer id `id` to `buffer`
    pub fn transfer_array_buffer(&mut self, id: u32, buffer: Arc<JsArrayBuffer>) {
        self.array_buffer_transfer_map.insert(id, buffer);
    }

    /// Read a raw unsigned integer
    pub fn read_uint32(&mut self) -> CopyResult<u32> {
        let value = self.read_varint()?;
        u32::try_from(value).map_err(|_| malformed())
    }

    /// Whether all input has been consumed
    pub fn is_at_end(&self) -> bool {
        self.position >= self.data.len()
    }

    /// Read one value, materializing it in `ctx`.
    pub fn read_value(&mut self, ctx: &Context, delegate: &mut dyn DeserializerDelegate) -> CopyResult<Value> {
        let value = match self.read_byte()? {
            tag::UNDEFINED => Value::Undefined,
            tag::NULL => Value::Null,
            tag::TRUE => Value::Boolean(true),
            tag::FALSE => Value::Boolean(false),
            tag::INT32 => {
                let zigzag = self.read_uint32()?;
                Value::Int32(((zigzag >> 1) as i32) ^ -((zigzag & 1) as i32))
            }
            tag::DOUBLE => Value::Number(self.read_f64()?),
            tag::BIGINT => self.read_bigint()?,
            tag::STRING => Value::String(Arc::from(self.read_str()?)),
            tag::DATE => Value::Date(self.read_f64()?),
            tag::OBJECT_REFERENCE => {
                let id = self.read_uint32()?;
                self.objects
                    .get(id as usize)
                    .cloned()
                    .flatten()
                    .ok_or_else(malformed)?
            }
            tag::BEGIN_OBJECT => {
                let object = ctx.new_object();
                let id = self.reserve_id();
                self.objects[id] = Some(Value::object(object.clone()));
                let count = self.read_properties(&object, tag::END_OBJECT, ctx, delegate)?;
                if self.read_uint32()? != count {
                    return Err(malformed());
                }
                Value::object(object)
            }
            tag::BEGIN_ARRAY => {
                let length = self.read_uint32()?;
                let array = ctx.new_array(length as usize);
                let id = self.reserve_id();
                self.objects[id] = Some(Value::array(array.clone()));
                for index in 0..length {
                    let element = self.read_value(ctx, delegate)?;
                    array.set(PropertyKey::Index(index), element);
                }
                let count = self.read_properties(&array, tag::END_ARRAY, ctx, delegate)?;
                if self.read_uint32()? != count || self.read_uint32()? != length {
                    return Err(malformed());
                }
                Value::array(array)
            }
            tag::ARRAY_BUFFER => {
                let id = self.reserve_id();
                let length = self.read_uint32()? as usize;
                let bytes = self.read_bytes(length)?;
                ctx.check_allocation(length)?;
                let value = Value::array_buffer(ctx.new_array_buffer(bytes));
                self.objects[id] = Some(value.clone());
                value
            }
            tag::ARRAY_BUFFER_TRANSFER => {
                let id = self.reserve_id();
                let transfer_id = self.read_uint32()?;
                let buffer = self
                    .array_buffer_transfer_map
                    .get(&transfer_id)
                    .cloned()
                    .ok_or_else(malformed)?;
                let value = Value::array_buffer(buffer);
                self.objects[id] = Some(value.clone());
                value
            }
            tag::SHARED_ARRAY_BUFFER => {
                let id = self.reserve_id();
                let clone_id = self.read_uint32()?;
                let value = Value::shared_array_buffer(
                    delegate.get_shared_array_buffer_from_id(ctx, clone_id)?,
                );
                self.objects[id] = Some(value.clone());
                value
            }
            tag::WASM_MODULE_TRANSFER => {
                let id = self.reserve_id();
                let transfer_id = self.read_uint32()?;
                let value = Value::WasmModule(delegate.get_wasm_module_from_id(transfer_id)?);
                self.objects[id] = Some(value.clone());
                value
            }
            tag::HOST_OBJECT => {
                let id = self.reserve_id();
                let value = delegate.read_host_object(self, ctx)?;
                self.objects[id] = Some(value.clone());
                value
            }
            _ => return Err(malformed()),
        };
        Ok(value)
    }

    fn reserve_id(&mut self) -> usize {
        self.objects.push(None);
        self.objects.len() - 1
    }

    fn read_properties(
        &mut self,
        object: &JsObject,
        end_tag: u8,
        ctx: &Context,
        delegate: &mut dyn DeserializerDelegate,
    ) -> CopyResult<u32> {
        let mut count = 0;
        loop {
            if self.peek_byte()? == end_tag {
                self.position += 1;
                return Ok(count);
            }
            let key = match self.read_value(ctx, delegate)? {
                Value::String(name) => PropertyKey::String(name),
                key if key.is_uint32() => {
                    PropertyKey::Index(key.as_number().ok_or_else(malformed)? as u32)
                }
                _ => return Err(malformed()),
            };
            let value = self.read_value(ctx, delegate)?;
            object.set(key, value);
            count += 1;
        }
    }

    fn read_bigint(&mut self) -> CopyResult<Value> {
        let negative = self.read_byte()? != 0;
        let count = self.read_uint32()? as usize;
        let bytes = self.read_bytes(count.checked_mul(8).ok_or_else(malformed)?)?;
        let magnitude = BigUint::from_bytes_le(bytes);
        let sign = if negative { Sign::Minus } else { Sign::Plus };
        Ok(Value::bigint(BigInt::from_biguint(sign, magnitude)))
    }

    fn read_str(&mut self) -> CopyResult<&'a str> {
        let length = self.read_uint32()? as usize;
        let bytes = self.read_bytes(length)?;
        std::str::from_utf8(bytes).map_err(|_| malformed())
    }

    fn read_f64(&mut self) -> CopyResult<f64> {
        let bytes = self.read_bytes(8)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(bytes);
        Ok(f64::from_le_bytes(raw))
    }

    fn read_byte(&mut self) -> CopyResult<u8> {
        let byte = self.peek_byte()?;
        self.position += 1;
        Ok(byte)
    }

    fn peek_byte(&self) -> CopyResult<u8> {
        self.data.get(self.position).copied().ok_or_else(malformed)
    }

    fn read_bytes(&mut self, length: usize) -> CopyResult<&'a [u8]> {
        let end = self.position.checked_add(length).ok_or_else(malformed)?;
        let data: &'a [u8] = self.data;
        let bytes = data.get(self.position..end).ok_or_else(malformed)?;
        self.position = end;
        Ok(bytes)
    }

    fn read_varint(&mut self) -> CopyResult<u64> {
        let mut result = 0u64;
        let mut shift = 0;
        loop {
            let byte = self.read_byte()?;
            if shift >= 64 {
                return Err(malformed());
            }
            result |= u64::from(byte & 0x7F) << shift;
            if byte & 0x80 == 0 {
                return Ok(result);
            }
            shift += 7;
        }
    }
}

impl std::fmt::Debug for ValueDeserializer<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValueDeserializer")
            .field("position", &self.position)
            .field("len", &self.data.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Delegate for graphs without host objects
    struct NoHostObjects;

    impl SerializerDelegate for NoHostObjects {
        fn get_shared_array_buffer_id(&mut self, _: &Arc<SharedArrayBuffer>) -> CopyResult<u32> {
            Err(CopyError::data_clone("no shared buffers"))
        }

        fn get_wasm_module_transfer_id(&mut self, _: &Arc<CompiledModule>) -> CopyResult<u32> {
            Err(CopyError::data_clone("no modules"))
        }

        fn write_host_object(&mut self, _: &mut ValueSerializer, _: &Value) -> CopyResult<()> {
            Err(CopyError::data_clone("no host objects"))
        }
    }

    impl DeserializerDelegate for NoHostObjects {
        fn get_shared_array_buffer_from_id(&mut self, _: &Context, _: u32) -> CopyResult<Arc<SharedArrayBuffer>> {
            Err(CopyError::data_clone("no shared buffers"))
        }

        fn get_wasm_module_from_id(&mut self, _: u32) -> CopyResult<Arc<CompiledModule>> {
            Err(CopyError::data_clone("no modules"))
        }

        fn read_host_object(&mut self, _: &mut ValueDeserializer<'_>, _: &Context) -> CopyResult<Value> {
            Err(CopyError::data_clone("no host objects"))
        }
    }

    fn round_trip(value: &Value) -> CopyResult<Value> {
        let mut serializer = ValueSerializer::new();
        serializer.write_header();
        serializer.write_value(value, &mut NoHostObjects)?;
        let bytes = serializer.release();

        let ctx = Context::default();
        let mut deserializer = ValueDeserializer::new(&bytes);
        deserializer.read_header()?;
        let out = deserializer.read_value(&ctx, &mut NoHostObjects)?;
        assert!(deserializer.is_at_end());
        Ok(out)
    }

    #[test]
    fn test_scalars() {
        for value in [
            Value::undefined(),
            Value::null(),
            Value::boolean(true),
            Value::int32(i32::MIN),
            Value::int32(-1),
            Value::number(1.5),
            Value::string("héllo"),
            Value::Date(1_700_000_000_000.0),
        ] {
            assert_eq!(round_trip(&value).unwrap(), value);
        }
    }

    #[test]
    fn test_negative_zero_and_nan_bits() {
        for n in [-0.0, f64::NAN] {
            let Value::Number(out) = round_trip(&Value::number(n)).unwrap() else {
                panic!("expected a double");
            };
            assert_eq!(out.to_bits(), n.to_bits());
        }
    }

    #[test]
    fn test_bigint() {
        let n: BigInt = -(BigInt::from(u64::MAX) * BigInt::from(3));
        assert_eq!(round_trip(&Value::bigint(n.clone())).unwrap().as_bigint(), Some(&n));
    }

    #[test]
    fn test_nested_object_and_array() {
        let inner = Arc::new(JsObject::array(2));
        inner.set(PropertyKey::Index(0), Value::int32(1));
        inner.set(PropertyKey::Index(1), Value::string("two"));
        inner.set(PropertyKey::string("extra"), Value::boolean(false));
        let outer = Arc::new(JsObject::new(None));
        outer.set(PropertyKey::string("list"), Value::array(inner));
        outer.set(PropertyKey::Index(5), Value::null());

        let out = round_trip(&Value::object(outer)).unwrap();
        let object = out.as_object().unwrap();
        assert!(object.has_own(&PropertyKey::Index(5)));
        let list = object.get(&PropertyKey::string("list")).unwrap();
        let list = list.as_object().unwrap();
        assert!(list.is_array());
        assert_eq!(list.array_length(), 2);
        assert_eq!(list.get(&PropertyKey::Index(1)), Some(Value::string("two")));
        assert_eq!(
            list.get(&PropertyKey::string("extra")),
            Some(Value::boolean(false))
        );
    }

    #[test]
    fn test_identity_and_cycles_survive() {
        let shared = Arc::new(JsObject::new(None));
        let root = Arc::new(JsObject::new(None));
        root.set(PropertyKey::string("a"), Value::object(shared.clone()));
        root.set(PropertyKey::string("b"), Value::object(shared));
        root.set(PropertyKey::string("self"), Value::object(root.clone()));

        let out = round_trip(&Value::object(root)).unwrap();
        let object = out.as_object().unwrap();
        let a = object.get(&PropertyKey::string("a")).unwrap();
        let b = object.get(&PropertyKey::string("b")).unwrap();
        assert_eq!(a, b);
        assert_eq!(object.get(&PropertyKey::string("self")).unwrap(), out);
    }

    #[test]
    fn test_inline_array_buffer_is_a_copy() {
        let buffer = Arc::new(JsArrayBuffer::from_bytes(&[1, 2, 3]));
        let out = round_trip(&Value::array_buffer(buffer.clone())).unwrap();
        let copied = out.as_array_buffer().unwrap();
        assert_eq!(copied.to_vec(), Some(vec![1, 2, 3]));
        assert!(!Arc::ptr_eq(copied, &buffer));
        assert!(!buffer.is_detached());
    }

    #[test]
    fn test_unclonable_values() {
        let func = Value::Function(Arc::new(crate::value::NativeFunction {
            name: Arc::from("f"),
        }));
        assert!(round_trip(&func).unwrap_err().is_data_clone());
        assert!(round_trip(&Value::Symbol(1)).unwrap_err().is_data_clone());

        let object = Arc::new(JsObject::new(None));
        object.define_property(
            PropertyKey::string("bad"),
            crate::object::PropertyDescriptor::getter(|| Err(Value::string("trap"))),
        );
        assert!(round_trip(&Value::object(object)).unwrap_err().is_data_clone());
    }

    #[test]
    fn test_truncated_input_is_rejected() {
        let mut serializer = ValueSerializer::new();
        serializer.write_header();
        serializer
            .write_value(&Value::string("truncate me"), &mut NoHostObjects)
            .unwrap();
        let bytes = serializer.release();

        let ctx = Context::default();
        let mut deserializer = ValueDeserializer::new(&bytes[..bytes.len() - 3]);
        deserializer.read_header().unwrap();
        assert!(
            deserializer
                .read_value(&ctx, &mut NoHostObjects)
                .unwrap_err()
                .is_data_clone()
        );
    }

    #[test]
    fn test_bad_version() {
        let mut deserializer = ValueDeserializer::new(&[tag::VERSION, FORMAT_VERSION + 1]);
        assert!(deserializer.read_header().unwrap_err().is_data_clone());
    }

    #[test]
    #[cfg(target_pointer_width = "64")]
    fn test_oversized_length_is_rejected() {
        let mut serializer = ValueSerializer::new();
        let too_long = u32::MAX as usize + 1;
        assert!(serializer.write_length(too_long).unwrap_err().is_data_clone());
        assert!(serializer.is_empty());
        serializer.write_length(u32::MAX as usize).unwrap();
        assert!(!serializer.is_empty());
    }
}
