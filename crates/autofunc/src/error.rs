//! Error types for autofunc.
//!
//! Shape mismatches and other caller programming errors panic at node
//! construction. Only faults that originate from external bytes are reported
//! as values.

use thiserror::Error;

/// Errors that can occur while decoding a persisted [`Variable`](crate::Variable).
#[derive(Debug, Error)]
pub enum SerializeError {
    /// The input ended before the encoded vector was complete.
    #[error("truncated variable data: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    /// The input continued past the end of the encoded vector.
    #[error("{extra} trailing bytes after encoded variable")]
    TrailingBytes { extra: usize },

    /// The encoded length cannot be represented on this platform.
    #[error("encoded length {length} does not fit in memory")]
    LengthOverflow { length: u64 },

    /// Underlying reader or writer failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
