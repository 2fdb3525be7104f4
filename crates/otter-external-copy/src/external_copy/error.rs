//! Copies of thrown errors.
//!
//! Untrusted code can throw anything. Error objects are captured by their
//! constructor name so the subtype survives the trip into another context.

use std::sync::Arc;

use super::Transferable;
use super::primitive::StringCopy;
use super::size::SizedCopy;
use crate::context::Context;
use crate::error::CopyResult;
use crate::object::{JsObject, PropertyAttributes, PropertyDescriptor, PropertyKey};
use crate::value::Value;

/// Message used when the thrown value does not look like an error at all
pub const NON_ERROR_THROWN: &str =
    "An object was thrown from supplied code, but that object was not an instance of `Error`.";

/// Error subtype recovered from the constructor name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorType {
    /// `Error`
    Error,
    /// `RangeError`
    RangeError,
    /// `ReferenceError`
    ReferenceError,
    /// `SyntaxError`
    SyntaxError,
    /// `TypeError`
    TypeError,
    /// Anything else that carries a message or stack
    CustomError,
}

impl ErrorType {
    /// Classify a constructor name
    pub fn from_constructor_name(name: &str) -> Self {
        match name {
            "Error" => Self::Error,
            "RangeError" => Self::RangeError,
            "ReferenceError" => Self::ReferenceError,
            "SyntaxError" => Self::SyntaxError,
            "TypeError" => Self::TypeError,
            _ => Self::CustomError,
        }
    }

    /// Constructor used to rebuild the error. Custom errors become plain `Error`s.
    pub fn constructor_name(&self) -> &'static str {
        match self {
            Self::Error | Self::CustomError => "Error",
            Self::RangeError => "RangeError",
            Self::ReferenceError => "ReferenceError",
            Self::SyntaxError => "SyntaxError",
            Self::TypeError => "TypeError",
        }
    }
}

/// Copy of an error object: subtype, message, stack, and name for custom errors.
#[derive(Debug)]
pub struct ErrorCopy {
    size: SizedCopy,
    error_type: ErrorType,
    name: Option<StringCopy>,
    message: StringCopy,
    stack: Option<StringCopy>,
}

impl ErrorCopy {
    /// Build a copy from parts
    pub fn new(
        error_type: ErrorType,
        name: Option<&str>,
        message: &str,
        stack: Option<&str>,
    ) -> Self {
        Self {
            size: SizedCopy::new(std::mem::size_of::<Self>()),
            error_type,
            name: name.map(StringCopy::new),
            message: StringCopy::new(message),
            stack: stack.map(StringCopy::new),
        }
    }

    /// The generic descriptor for a thrown non-error object
    pub fn non_error_thrown() -> Self {
        Self::new(ErrorType::Error, None, NON_ERROR_THROWN, None)
    }

    /// Capture `value` if it looks like an error.
    ///
    /// A well-known constructor name is enough on its own. Other objects
    /// qualify if they expose a `message` or `stack`. Throwing getters read
    /// as absent.
    pub fn detect(value: &Value) -> Option<Self> {
        let object = value.as_object()?;
        let error_type = ErrorType::from_constructor_name(object.class_name());
        let message = read_string_property(object, "message");
        let stack = read_string_property(object, "stack");

        if error_type == ErrorType::CustomError && message.is_none() && stack.is_none() {
            return None;
        }
        let name = match error_type {
            ErrorType::CustomError => read_string_property(object, "name"),
            _ => None,
        };
        Some(Self::new(
            error_type,
            name.as_deref(),
            message.as_deref().unwrap_or(""),
            stack.as_deref(),
        ))
    }

    /// Error subtype
    pub fn error_type(&self) -> ErrorType {
        self.error_type
    }

    /// Custom error name
    pub fn name(&self) -> Option<&str> {
        self.name.as_ref().map(StringCopy::as_str)
    }

    /// Error message
    pub fn message(&self) -> &str {
        self.message.as_str()
    }

    /// Captured stack
    pub fn stack(&self) -> Option<&str> {
        self.stack.as_ref().map(StringCopy::as_str)
    }
}

fn read_string_property(object: &JsObject, key: &str) -> Option<String> {
    match object.try_get(&PropertyKey::string(key)) {
        Ok(Some(value)) if !value.is_undefined() => Some(value.to_display_string()),
        _ => None,
    }
}

impl Transferable for ErrorCopy {
    fn copy_into(&self, ctx: &Context, _transfer_in: bool) -> CopyResult<Value> {
        let error = ctx.new_error(
            self.error_type.constructor_name(),
            Arc::from(self.message.as_str()),
        );
        if let Some(name) = &self.name {
            error.define_property(
                PropertyKey::string("name"),
                PropertyDescriptor::data_with_attrs(name.to_value(), PropertyAttributes::hidden()),
            );
        }
        if let Some(stack) = &self.stack {
            error.define_property(
                PropertyKey::string("stack"),
                PropertyDescriptor::data_with_attrs(stack.to_value(), PropertyAttributes::hidden()),
            );
        }
        Ok(Value::object(error))
    }

    fn size(&self) -> usize {
        self.size.size()
            + self.message.size()
            + self.name.as_ref().map_or(0, StringCopy::size)
            + self.stack.as_ref().map_or(0, StringCopy::size)
    }
}
