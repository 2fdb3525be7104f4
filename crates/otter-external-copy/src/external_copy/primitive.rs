//! Copies of primitive values: numbers, booleans, bigints and strings.
//!
//! All of them are immutable and self-contained, so materializing is free
//! of side effects and can happen any number of times.

use num_bigint::{BigInt, BigUint, Sign};
use std::sync::Arc;

use super::Transferable;
use super::size::SizedCopy;
use crate::context::Context;
use crate::error::CopyResult;
use crate::value::Value;

/// A scalar that re-materializes as a number or boolean value.
pub trait ScalarValue: Copy + Send + Sync + std::fmt::Debug + 'static {
    /// Build the value in the target context
    fn into_value(self) -> Value;
}

impl ScalarValue for bool {
    fn into_value(self) -> Value {
        Value::boolean(self)
    }
}

impl ScalarValue for i32 {
    fn into_value(self) -> Value {
        Value::int32(self)
    }
}

impl ScalarValue for u32 {
    fn into_value(self) -> Value {
        Value::uint32(self)
    }
}

impl ScalarValue for f64 {
    fn into_value(self) -> Value {
        Value::number(self)
    }
}

/// Copy of a number or boolean, stored by value.
#[derive(Debug)]
pub struct ScalarCopy<T: ScalarValue> {
    size: SizedCopy,
    value: T,
}

impl<T: ScalarValue> ScalarCopy<T> {
    /// Capture `value`
    pub fn new(value: T) -> Self {
        Self {
            size: SizedCopy::new(std::mem::size_of::<Self>()),
            value,
        }
    }

    /// The stored value
    pub fn value(&self) -> T {
        self.value
    }
}

impl<T: ScalarValue> Transferable for ScalarCopy<T> {
    fn copy_into(&self, _ctx: &Context, _transfer_in: bool) -> CopyResult<Value> {
        Ok(self.value.into_value())
    }

    fn size(&self) -> usize {
        self.size.size()
    }
}

/// Copy of a BigInt as a sign and little-endian 64-bit words.
#[derive(Debug)]
pub struct BigIntCopy {
    size: SizedCopy,
    negative: bool,
    words: Vec<u64>,
}

impl BigIntCopy {
    /// Capture `value`
    pub fn new(value: &BigInt) -> Self {
        let (sign, words) = value.to_u64_digits();
        Self {
            size: SizedCopy::new(std::mem::size_of::<Self>() + words.len() * 8),
            negative: sign == Sign::Minus,
            words,
        }
    }

    /// Whether the value is negative
    pub fn is_negative(&self) -> bool {
        self.negative
    }

    /// Magnitude words, least significant first
    pub fn words(&self) -> &[u64] {
        &self.words
    }

    /// Rebuild the integer
    pub fn to_bigint(&self) -> BigInt {
        let bytes: Vec<u8> = self.words.iter().flat_map(|w| w.to_le_bytes()).collect();
        let magnitude = BigUint::from_bytes_le(&bytes);
        let sign = if self.negative { Sign::Minus } else { Sign::Plus };
        BigInt::from_biguint(sign, magnitude)
    }
}

impl Transferable for BigIntCopy {
    fn copy_into(&self, _ctx: &Context, _transfer_in: bool) -> CopyResult<Value> {
        Ok(Value::bigint(self.to_bigint()))
    }

    fn size(&self) -> usize {
        self.size.size()
    }
}

/// Copy of a string.
#[derive(Debug)]
pub struct StringCopy {
    size: SizedCopy,
    value: Arc<str>,
}

impl StringCopy {
    /// Capture a copy of `value`
    pub fn new(value: &str) -> Self {
        Self {
            size: SizedCopy::new(std::mem::size_of::<Self>() + value.len()),
            value: Arc::from(value),
        }
    }

    /// The copied text
    pub fn as_str(&self) -> &str {
        &self.value
    }

    /// Materialize as a string value
    pub fn to_value(&self) -> Value {
        Value::String(self.value.clone())
    }
}

impl Transferable for StringCopy {
    fn copy_into(&self, _ctx: &Context, _transfer_in: bool) -> CopyResult<Value> {
        Ok(self.to_value())
    }

    fn size(&self) -> usize {
        self.size.size()
    }
}
