//! JavaScript objects
//!
//! Ordered own properties with attributes, optional accessors, a prototype
//! link and a constructor name. This is the slice of the host object model
//! that value transfer needs to read from and write into.

use indexmap::IndexMap;
use parking_lot::RwLock;
use std::sync::Arc;

use crate::value::Value;

/// Property key (string, symbol, or array index)
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum PropertyKey {
    /// String property key
    String(Arc<str>),
    /// Symbol property key
    Symbol(u64),
    /// Integer index (for arrays and typed arrays)
    Index(u32),
}

impl PropertyKey {
    /// Create a string property key
    pub fn string(s: &str) -> Self {
        Self::String(Arc::from(s))
    }

    /// Create an index property key
    pub fn index(i: u32) -> Self {
        Self::Index(i)
    }

    /// Key name for string keys
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for PropertyKey {
    fn from(s: &str) -> Self {
        Self::string(s)
    }
}

impl From<u32> for PropertyKey {
    fn from(i: u32) -> Self {
        Self::Index(i)
    }
}

/// Property attributes
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PropertyAttributes {
    /// Property is writable
    pub writable: bool,
    /// Property is enumerable
    pub enumerable: bool,
    /// Property is configurable
    pub configurable: bool,
}

impl PropertyAttributes {
    /// Default data property attributes
    pub const fn data() -> Self {
        Self {
            writable: true,
            enumerable: true,
            configurable: true,
        }
    }

    /// Writable and configurable but not enumerable (`name`, `message`, `stack`)
    pub const fn hidden() -> Self {
        Self {
            writable: true,
            enumerable: false,
            configurable: true,
        }
    }
}

/// Getter body. An `Err` is a thrown value.
pub type Getter = Arc<dyn Fn() -> Result<Value, Value> + Send + Sync>;

/// Property descriptor
#[derive(Clone)]
pub enum PropertyDescriptor {
    /// Data property
    Data {
        /// The value
        value: Value,
        /// Attributes
        attributes: PropertyAttributes,
    },
    /// Accessor property
    Accessor {
        /// Getter
        get: Getter,
        /// Attributes
        attributes: PropertyAttributes,
    },
}

impl PropertyDescriptor {
    /// Create a data property
    pub fn data(value: Value) -> Self {
        Self::Data {
            value,
            attributes: PropertyAttributes::data(),
        }
    }

    /// Create a data property with specific attributes
    pub fn data_with_attrs(value: Value, attributes: PropertyAttributes) -> Self {
        Self::Data { value, attributes }
    }

    /// Create an enumerable accessor property
    pub fn getter(get: impl Fn() -> Result<Value, Value> + Send + Sync + 'static) -> Self {
        Self::Accessor {
            get: Arc::new(get),
            attributes: PropertyAttributes::data(),
        }
    }

    /// Attributes of either kind
    pub fn attributes(&self) -> PropertyAttributes {
        match self {
            Self::Data { attributes, .. } | Self::Accessor { attributes, .. } => *attributes,
        }
    }

    /// Read the value, running the getter for accessors
    pub fn read(&self) -> Result<Value, Value> {
        match self {
            Self::Data { value, .. } => Ok(value.clone()),
            Self::Accessor { get, .. } => get(),
        }
    }
}

impl std::fmt::Debug for PropertyDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Data { value, attributes } => f
                .debug_struct("Data")
                .field("value", value)
                .field("attributes", attributes)
                .finish(),
            Self::Accessor { attributes, .. } => f
                .debug_struct("Accessor")
                .field("attributes", attributes)
                .finish_non_exhaustive(),
        }
    }
}

/// A JavaScript object
///
/// Thread-safe with interior mutability.
pub struct JsObject {
    /// Properties storage, in insertion order
    properties: RwLock<IndexMap<PropertyKey, PropertyDescriptor>>,
    /// Prototype (None for null prototype)
    prototype: RwLock<Option<Arc<JsObject>>>,
    /// Array elements (for arrays)
    elements: RwLock<Vec<Value>>,
    /// Constructor name reported by the host
    class_name: Arc<str>,
    is_array: bool,
}

impl JsObject {
    /// Create a new empty object
    pub fn new(prototype: Option<Arc<JsObject>>) -> Self {
        Self::with_class_name("Object", prototype)
    }

    /// Create an object reporting `class_name` as its constructor name
    pub fn with_class_name(class_name: &str, prototype: Option<Arc<JsObject>>) -> Self {
        Self {
            properties: RwLock::new(IndexMap::new()),
            prototype: RwLock::new(prototype),
            elements: RwLock::new(Vec::new()),
            class_name: Arc::from(class_name),
            is_array: false,
        }
    }

    /// Create a new array
    pub fn array(length: usize) -> Self {
        let mut obj = Self::with_class_name("Array", None);
        obj.is_array = true;
        obj.elements.get_mut().resize(length, Value::undefined());
        obj
    }

    /// Constructor name
    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    /// Get property by key, following the prototype chain.
    ///
    /// A throwing getter is reported as `Err` with the thrown value.
    pub fn try_get(&self, key: &PropertyKey) -> Result<Option<Value>, Value> {
        let own = self.properties.read().get(key).cloned();
        if let Some(desc) = own {
            return desc.read().map(Some);
        }

        if let PropertyKey::Index(i) = key {
            let elements = self.elements.read();
            if let Some(v) = elements.get(*i as usize) {
                return Ok(Some(v.clone()));
            }
        }

        let prototype = self.prototype.read().clone();
        match prototype {
            Some(proto) => proto.try_get(key),
            None => Ok(None),
        }
    }

    /// Get property by key; a throwing getter reads as absent
    pub fn get(&self, key: &PropertyKey) -> Option<Value> {
        self.try_get(key).ok().flatten()
    }

    /// Set property by key
    pub fn set(&self, key: PropertyKey, value: Value) -> bool {
        if let PropertyKey::Index(i) = &key {
            let mut elements = self.elements.write();
            let idx = *i as usize;
            if idx < elements.len() {
                elements[idx] = value;
                return true;
            } else if self.is_array {
                elements.resize(idx + 1, Value::undefined());
                elements[idx] = value;
                return true;
            }
        }

        let mut props = self.properties.write();
        if let Some(PropertyDescriptor::Data { value: slot, attributes }) = props.get_mut(&key) {
            if !attributes.writable {
                return false;
            }
            *slot = value;
            return true;
        }
        props.insert(key, PropertyDescriptor::data(value));
        true
    }

    /// Define a property with descriptor
    pub fn define_property(&self, key: PropertyKey, desc: PropertyDescriptor) -> bool {
        self.properties.write().insert(key, desc);
        true
    }

    /// Own property descriptor
    pub fn own_property(&self, key: &PropertyKey) -> Option<PropertyDescriptor> {
        self.properties.read().get(key).cloned()
    }

    /// Check if object has own property
    pub fn has_own(&self, key: &PropertyKey) -> bool {
        if self.properties.read().contains_key(key) {
            return true;
        }
        if let PropertyKey::Index(i) = key {
            return (*i as usize) < self.elements.read().len();
        }
        false
    }

    /// Get own property keys: indices first, then named keys in insertion order
    pub fn own_keys(&self) -> Vec<PropertyKey> {
        let elements = self.elements.read().len();
        let mut keys: Vec<PropertyKey> = (0..elements as u32).map(PropertyKey::Index).collect();
        keys.extend(self.properties.read().keys().cloned());
        keys
    }

    /// Own keys whose properties are enumerable
    pub fn own_enumerable_keys(&self) -> Vec<PropertyKey> {
        let elements = self.elements.read().len();
        let mut keys: Vec<PropertyKey> = (0..elements as u32).map(PropertyKey::Index).collect();
        keys.extend(
            self.properties
                .read()
                .iter()
                .filter(|(_, desc)| desc.attributes().enumerable)
                .map(|(key, _)| key.clone()),
        );
        keys
    }

    /// Get prototype
    pub fn prototype(&self) -> Option<Arc<JsObject>> {
        self.prototype.read().clone()
    }

    /// Replace the prototype
    pub fn set_prototype(&self, prototype: Option<Arc<JsObject>>) {
        *self.prototype.write() = prototype;
    }

    /// Check if object is an array
    pub fn is_array(&self) -> bool {
        self.is_array
    }

    /// Get array length (for arrays)
    pub fn array_length(&self) -> usize {
        self.elements.read().len()
    }
}

impl std::fmt::Debug for JsObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let props = self.properties.read();
        f.debug_struct("JsObject")
            .field("class_name", &self.class_name)
            .field("properties", &props.len())
            .field("is_array", &self.is_array)
            .finish()
    }
}
