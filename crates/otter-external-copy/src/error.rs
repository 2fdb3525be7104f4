//! Error types for value transfer

use thiserror::Error;

/// Errors raised while copying a value out of one context or materializing
/// it into another.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CopyError {
    /// The target's allocation guard rejected a buffer allocation.
    ///
    /// Raised before the allocation happens, since a failed buffer allocation
    /// inside the host runtime is not recoverable.
    #[error("RangeError: Array buffer allocation failed")]
    AllocationLimitExceeded {
        /// Number of bytes that were requested
        requested: usize,
    },

    /// The backing store is detached, was already consumed by a transfer,
    /// or was never initialized.
    #[error("Array buffer is invalid")]
    BufferInvalid,

    /// Transfer was requested on a buffer that cannot be detached.
    #[error("Array buffer is invalid: buffer is not detachable")]
    BufferNotDetachable,

    /// The value kind has no external copy representation.
    #[error("TypeError: Unsupported type: {0}")]
    UnsupportedValueKind(&'static str),

    /// A host object extension point could not complete, or the clone codec
    /// met a value (or a byte stream) it cannot handle.
    #[error("DataCloneError: {0}")]
    DataClone(String),

    /// A context configuration document could not be parsed.
    #[error("Invalid context config: {0}")]
    InvalidConfig(String),
}

impl CopyError {
    /// Create a data clone error
    pub fn data_clone(msg: impl Into<String>) -> Self {
        Self::DataClone(msg.into())
    }

    /// Create an allocation limit error
    pub fn allocation_failed(requested: usize) -> Self {
        Self::AllocationLimitExceeded { requested }
    }

    /// Whether this is already a codec-level clone error
    pub fn is_data_clone(&self) -> bool {
        matches!(self, Self::DataClone(_))
    }

    /// Convert into the single error kind reported back to the codec.
    ///
    /// Clone errors pass through unchanged; anything else keeps its message.
    pub fn into_data_clone(self) -> Self {
        match self {
            Self::DataClone(_) => self,
            other => Self::DataClone(other.to_string()),
        }
    }
}

/// Result type for copy operations
pub type CopyResult<T> = std::result::Result<T, CopyError>;
