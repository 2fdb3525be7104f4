//! Configuration types for contexts and copy operations.

use std::sync::Arc;

use serde::Deserialize;

use crate::array_buffer::JsArrayBuffer;
use crate::error::{CopyError, CopyResult};

/// Configuration for creating a new [`Context`](crate::context::Context).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ContextConfig {
    /// Byte limit for array buffer allocations in this context.
    /// Default: None (no limit enforced)
    pub array_buffer_limit: Option<usize>,

    /// Create a host `Buffer` prototype so `Uint8Array` copies flagged as
    /// buffers are re-parented onto it.
    /// Default: false
    pub node_buffer_prototype: bool,
}

impl ContextConfig {
    /// Create a new config with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a config from a JSON document.
    pub fn from_json(json: &str) -> CopyResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| CopyError::InvalidConfig(e.to_string()))
    }

    /// Set the array buffer allocation limit.
    pub fn array_buffer_limit(mut self, limit: usize) -> Self {
        self.array_buffer_limit = Some(limit);
        self
    }

    /// Enable or disable the host `Buffer` prototype.
    pub fn node_buffer_prototype(mut self, enabled: bool) -> Self {
        self.node_buffer_prototype = enabled;
        self
    }
}

/// Per-call options for [`ExternalCopy::copy`](crate::external_copy::ExternalCopy::copy).
#[derive(Debug, Clone, Default)]
pub struct CopyOptions {
    /// Transfer the top-level buffer (or a view's buffer) instead of copying it.
    pub transfer_out: bool,
    /// Buffers anywhere in the value graph that are moved rather than copied.
    pub transfer_list: Vec<Arc<JsArrayBuffer>>,
}

impl CopyOptions {
    /// Options for a plain deep copy.
    pub fn new() -> Self {
        Self::default()
    }

    /// Options that transfer the top-level buffer out.
    pub fn transfer() -> Self {
        Self {
            transfer_out: true,
            ..Default::default()
        }
    }

    /// Set the transfer flag.
    pub fn transfer_out(mut self, enabled: bool) -> Self {
        self.transfer_out = enabled;
        self
    }

    /// Add a buffer to the transfer list.
    pub fn with_transfer(mut self, buffer: Arc<JsArrayBuffer>) -> Self {
        self.transfer_list.push(buffer);
        self
    }

    /// Whether `buffer` is in the transfer list (by identity).
    pub fn is_listed(&self, buffer: &Arc<JsArrayBuffer>) -> bool {
        self.transfer_list.iter().any(|b| Arc::ptr_eq(b, buffer))
    }
}
