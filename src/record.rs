use std::io;

/// Maps an application record onto the opaque bytes the store persists.
///
/// The log calls this once per [`crate::Log::append`]; the storage layer
/// never interprets the resulting bytes.
pub trait Encode {
    /// Encode `self` into `out`, appending to whatever `out` already holds.
    fn encode(&self, out: &mut Vec<u8>);
}

/// The inverse of [`Encode`]: maps the opaque bytes read back from the store
/// onto an application record.
pub trait Decode: Sized {
    /// Decode `buf`, the exact bytes previously passed to [`Encode::encode`].
    fn decode(offset: u64, buf: &[u8]) -> io::Result<Self>;
}

/// A minimal record type treating the payload as opaque bytes.
///
/// Implements [`Encode`]/[`Decode`] as a straight passthrough, so callers who
/// don't need a richer payload schema can use [`Log<Record>`](crate::Log) out
/// of the box.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Record {
    /// The offset assigned by the log on append. Ignored on encode; set by
    /// [`Decode::decode`] from the offset the log read at.
    pub offset: u64,
    /// The opaque payload.
    pub value: Vec<u8>,
}

impl Record {
    pub fn new(value: impl Into<Vec<u8>>) -> Self {
        Self {
            offset: 0,
            value: value.into(),
        }
    }
}

impl Encode for Record {
    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.value);
    }
}

impl Decode for Record {
    fn decode(offset: u64, buf: &[u8]) -> io::Result<Self> {
        Ok(Record {
            offset,
            value: buf.to_vec(),
        })
    }
}
