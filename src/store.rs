use std::fs::File;
use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write as _};
use std::sync::Mutex;

use log::trace;

use crate::error::{Error, Result};

/// Width, in bytes, of the big-endian length prefix in front of every frame.
pub const LEN_WIDTH: u64 = 8;

/// A buffered, length-prefixed, append-only byte file with positional reads.
///
/// Frames are laid out as `len:u64-BE ‖ payload:bytes(len)`. `Store` owns a
/// single [`File`] opened in append mode: because appends always land at the
/// current end of file regardless of the handle's seek position (`O_APPEND`
/// semantics, mirrored by Windows' `FILE_APPEND_DATA`), positional reads may
/// freely seek the same handle without disturbing subsequent appends. All
/// access is serialized by `inner`, so no two operations can interleave their
/// seeks.
#[derive(Debug)]
pub struct Store {
    inner: Mutex<Inner>,
    name: String,
}

#[derive(Debug)]
struct Inner {
    writer: BufWriter<File>,
    size: u64,
    closed: bool,
}

impl Store {
    /// Wrap `file`, an already-opened append-mode file, as a `Store`.
    ///
    /// `size` is initialized from the file's current length, so reopening a
    /// store that was not cleanly closed still sees every frame that made it
    /// to disk.
    pub fn new(file: File, name: impl Into<String>) -> io::Result<Self> {
        let size = file.metadata()?.len();
        Ok(Self {
            inner: Mutex::new(Inner {
                writer: BufWriter::new(file),
                size,
                closed: false,
            }),
            name: name.into(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current logical size in bytes, including buffered-but-unflushed data.
    pub fn size(&self) -> u64 {
        self.inner.lock().unwrap().size
    }

    /// Append `p` as a new frame. Returns `(bytes_written, pos)`, where `pos`
    /// is the byte position at which the frame starts.
    pub fn append(&self, p: &[u8]) -> Result<(u64, u64)> {
        let mut inner = self.inner.lock().unwrap();
        if inner.closed {
            return Err(Error::NotOpen("store"));
        }

        let pos = inner.size;
        inner.writer.write_all(&(p.len() as u64).to_be_bytes())?;
        inner.writer.write_all(p)?;

        let written = LEN_WIDTH + p.len() as u64;
        inner.size += written;
        trace!("store {}: appended {} bytes at {}", self.name, written, pos);
        Ok((written, pos))
    }

    /// Read the frame starting at `pos`. Flushes the write buffer first, so a
    /// frame written but not yet flushed is still visible.
    pub fn read(&self, pos: u64) -> Result<Vec<u8>> {
        let mut inner = self.inner.lock().unwrap();
        if inner.closed {
            return Err(Error::NotOpen("store"));
        }
        inner.writer.flush()?;

        let mut len_buf = [0u8; LEN_WIDTH as usize];
        read_exact_at(inner.writer.get_mut(), pos, &mut len_buf)?;
        let len = u64::from_be_bytes(len_buf);

        if pos + LEN_WIDTH + len > inner.size {
            return Err(Error::Corrupt {
                what: "store",
                detail: format!(
                    "frame at {pos} declares length {len}, exceeding store size {}",
                    inner.size
                ),
            });
        }

        let mut buf = vec![0u8; len as usize];
        read_exact_at(inner.writer.get_mut(), pos + LEN_WIDTH, &mut buf)?;
        Ok(buf)
    }

    /// Positional read into `buf`, starting at `offset`. Flushes first, like
    /// [`Store::read`]. Used by [`crate::Log::reader`] to stream raw frames
    /// across segments without going through the index.
    pub fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<usize> {
        let mut inner = self.inner.lock().unwrap();
        if inner.closed {
            return Err(Error::NotOpen("store"));
        }
        inner.writer.flush()?;

        let file = inner.writer.get_mut();
        file.seek(SeekFrom::Start(offset))?;
        let n = read_up_to(file, buf)?;
        Ok(n)
    }

    /// Drain the write buffer to the file. Does not fsync.
    pub fn flush(&self) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.closed {
            return Err(Error::NotOpen("store"));
        }
        inner.writer.flush()?;
        Ok(())
    }

    /// Fsync the underlying file, after flushing the write buffer.
    pub fn sync(&self) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.closed {
            return Err(Error::NotOpen("store"));
        }
        inner.writer.flush()?;
        inner.writer.get_ref().sync_data()?;
        Ok(())
    }

    /// Flush and close the store. Subsequent operations return
    /// [`Error::NotOpen`].
    pub fn close(&self) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.closed {
            return Err(Error::NotOpen("store"));
        }
        inner.writer.flush()?;
        inner.closed = true;
        Ok(())
    }
}

fn read_exact_at(file: &mut File, pos: u64, buf: &mut [u8]) -> io::Result<()> {
    file.seek(SeekFrom::Start(pos))?;
    file.read_exact(buf)
}

fn read_up_to(file: &mut File, buf: &mut [u8]) -> io::Result<usize> {
    let mut read = 0;
    while read < buf.len() {
        match file.read(&mut buf[read..]) {
            Ok(0) => break,
            Ok(n) => read += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(read)
}
