//! An append-only, offset-addressed commit log.
//!
//! A log is a directory of segments; a segment pairs a length-prefixed
//! [`Store`] file with a fixed-width, memory-mapped [`Index`] file. Records
//! are appended to the active (most recent) segment and assigned
//! monotonically increasing offsets; once a segment reaches its configured
//! size it is sealed and a new one opened. Reads address a record by its
//! global offset and are routed to the segment whose range contains it.
//!
//! Payload encoding is intentionally out of scope: callers provide an
//! [`Encode`]/[`Decode`] implementation, or use the bytes-passthrough
//! [`Record`] type.

mod commitlog;
pub mod config;
pub mod error;
mod index;
pub mod record;
mod segment;
mod store;

pub use crate::commitlog::{CommitLog, Log, Reader};
pub use crate::config::{Config, SegmentConfig};
pub use crate::error::{Error, Result};
pub use crate::record::{Decode, Encode, Record};
pub use crate::store::Store;
