// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use thiserror::Error;

use crate::ByteOrder;

/// Shorthand for results of buffer operations.
pub type Result<T> = std::result::Result<T, BufferError>;

/// A fault reported by a buffer operation.
///
/// Faults are reported immediately and are never retried inside the crate. An operation that
/// fails leaves the buffer in the state it was in before the call.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum BufferError {
    /// The accessed range `[index, index + length)` does not fit in the buffer.
    #[error("range [{index}, {index} + {length}) is out of bounds for a buffer of capacity {capacity}")]
    OutOfBounds {
        /// First byte of the requested range.
        index: usize,
        /// Length of the requested range.
        length: usize,
        /// Capacity of the buffer at the time of the access.
        capacity: usize,
    },

    /// Growth was requested beyond the maximum capacity of the buffer.
    ///
    /// The buffer is unchanged and any views into it remain valid.
    #[error("requested capacity {requested} exceeds the maximum of {max} bytes")]
    CapacityExceeded {
        /// The capacity that was requested.
        requested: usize,
        /// The hard limit that applies to the buffer.
        max: usize,
    },

    /// A mutation was attempted on a read-only buffer.
    #[error("buffer is read-only")]
    ReadOnly,

    /// The backend has no way to perform the operation.
    #[error("operation '{operation}' is not supported by this buffer")]
    Unsupported {
        /// Name of the operation that was attempted.
        operation: &'static str,
    },

    /// A child buffer does not use the byte order of the composite it was appended to.
    #[error("child buffer uses {actual:?} byte order but the composite uses {expected:?}")]
    OrderMismatch {
        /// Order of the composite.
        expected: ByteOrder,
        /// Order of the rejected child.
        actual: ByteOrder,
    },

    /// The off-heap memory behind the buffer has already been released.
    #[error("native memory has already been released")]
    Released,

    /// The view was created before its parent reallocated its storage.
    #[error("view refers to storage that was replaced when the parent buffer grew")]
    Stale,

    /// Bytes could not be decoded as, or encoded from, the requested string encoding.
    #[error("invalid string data: {reason}")]
    InvalidString {
        /// What was wrong with the data.
        reason: &'static str,
    },
}

impl BufferError {
    pub(crate) const fn out_of_bounds(index: usize, length: usize, capacity: usize) -> Self {
        Self::OutOfBounds { index, length, capacity }
    }

    pub(crate) const fn unsupported(operation: &'static str) -> Self {
        Self::Unsupported { operation }
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use static_assertions::assert_impl_all;

    use super::*;

    assert_impl_all!(BufferError: Send, Sync, std::error::Error);

    #[test]
    fn out_of_bounds_message_names_range() {
        let error = BufferError::out_of_bounds(6, 4, 8);
        assert_eq!(
            error.to_string(),
            "range [6, 6 + 4) is out of bounds for a buffer of capacity 8"
        );
    }

    #[test]
    fn unsupported_message_names_operation() {
        let error = BufferError::unsupported("ensure_capacity");
        assert!(error.to_string().contains("ensure_capacity"));
    }
}
