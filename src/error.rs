use std::io;

use thiserror::Error;

/// Errors returned by [`crate::Store`] and [`crate::Log`] (and, internally,
/// by the index and segment layers beneath them).
#[derive(Debug, Error)]
pub enum Error {
    /// A read addressed an offset outside `[lowest_offset, highest_offset]`.
    #[error("offset out of range: {offset}")]
    OutOfRange {
        /// The offset that was requested.
        offset: u64,
    },

    /// A write was attempted against a segment whose index has no remaining
    /// capacity. [`crate::Log::append`] handles this internally by rolling to
    /// a new segment; it should not normally escape to callers of the log.
    #[error("segment is full")]
    Full,

    /// An operation was invoked on a store, index, segment or log that was
    /// already closed.
    #[error("operation on closed {0}")]
    NotOpen(&'static str),

    /// A length prefix decoded to a value exceeding the remaining bytes in
    /// the store, or an index entry pointed past the store's logical size.
    #[error("corrupt {what}: {detail}")]
    Corrupt {
        /// Which artifact was found to be corrupt (e.g. `"store"`, `"index"`).
        what: &'static str,
        /// Human-readable detail about the inconsistency.
        detail: String,
    },

    /// An underlying I/O operation (read, write, mmap, sync, truncate,
    /// unlink) failed. Propagated verbatim; never retried internally.
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl Error {
    /// `true` if this error represents an out-of-range read, which transport
    /// layers typically map to a "not found" category rather than "internal".
    pub fn is_out_of_range(&self) -> bool {
        matches!(self, Error::OutOfRange { .. })
    }

    /// The offset that was out of range, if this is an [`Error::OutOfRange`].
    pub fn offset(&self) -> Option<u64> {
        match self {
            Error::OutOfRange { offset } => Some(*offset),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<Error> for io::Error {
    fn from(e: Error) -> Self {
        match e {
            Error::Io(e) => e,
            Error::OutOfRange { offset } => io::Error::new(io::ErrorKind::NotFound, format!("offset out of range: {offset}")),
            Error::Full => io::Error::new(io::ErrorKind::Other, "segment is full"),
            Error::NotOpen(what) => io::Error::new(io::ErrorKind::Other, format!("operation on closed {what}")),
            Error::Corrupt { what, detail } => io::Error::new(io::ErrorKind::InvalidData, format!("corrupt {what}: {detail}")),
        }
    }
}
