use std::fs::{self, File};
use std::path::{Path, PathBuf};

use log::{debug, warn};

use crate::config::SegmentConfig;
use crate::error::{Error, Result};
use crate::index::{Index, IndexError};
use crate::record::{Decode, Encode};
use crate::store::Store;

pub const STORE_EXT: &str = "store";
pub const INDEX_EXT: &str = "index";

pub fn store_path(dir: &Path, base_offset: u64) -> PathBuf {
    dir.join(format!("{base_offset}.{STORE_EXT}"))
}

pub fn index_path(dir: &Path, base_offset: u64) -> PathBuf {
    dir.join(format!("{base_offset}.{INDEX_EXT}"))
}

/// Pairs one [`Store`] and one [`Index`] under a shared base offset.
///
/// `base_offset` is the global offset of the first record in the segment;
/// `next_offset` (tracked internally) is the global offset the next append
/// will receive. Both files are named after `base_offset`.
#[derive(Debug)]
pub(crate) struct Segment {
    store: Store,
    index: Index,
    base_offset: u64,
    next_offset: std::sync::atomic::AtomicU64,
    config: SegmentConfig,
}

impl Segment {
    /// Open (or create) the segment rooted at `base_offset` in `dir`.
    ///
    /// Reconstructs `next_offset` from the index: if the index has an entry,
    /// `next_offset = base_offset + rel_off + 1`; otherwise `next_offset =
    /// base_offset`. This is what lets a log resume cleanly after a
    /// crash-safe shutdown.
    pub(crate) fn open(dir: &Path, base_offset: u64, config: SegmentConfig) -> Result<Self> {
        let store_file = File::options()
            .create(true)
            .read(true)
            .append(true)
            .open(store_path(dir, base_offset))?;
        let store = Store::new(store_file, store_path(dir, base_offset).display().to_string())?;

        let index_file = File::options()
            .create(true)
            .read(true)
            .write(true)
            .open(index_path(dir, base_offset))?;
        let index = Index::open(
            index_file,
            index_path(dir, base_offset).display().to_string(),
            config.max_index_bytes,
            store.size(),
        )
        .map_err(index_err(base_offset, 0))?;

        let next_offset = match index.read_last() {
            Ok((rel_off, pos)) => {
                if pos + crate::store::LEN_WIDTH > store.size() {
                    warn!(
                        "segment {base_offset}: index entry at rel_off={rel_off} points past store size ({pos} + header > {})",
                        store.size()
                    );
                }
                base_offset + rel_off as u64 + 1
            }
            Err(IndexError::Empty) => base_offset,
            Err(e) => return Err(index_err(base_offset, 0)(e)),
        };

        debug!("segment {base_offset}: opened, next_offset={next_offset}");

        Ok(Self {
            store,
            index,
            base_offset,
            next_offset: std::sync::atomic::AtomicU64::new(next_offset),
            config,
        })
    }

    pub(crate) fn base_offset(&self) -> u64 {
        self.base_offset
    }

    pub(crate) fn next_offset(&self) -> u64 {
        self.next_offset.load(std::sync::atomic::Ordering::SeqCst)
    }

    /// `true` if this segment has reached either of its configured caps.
    pub(crate) fn is_full(&self) -> bool {
        self.store.size() >= self.config.max_store_bytes
            || self.index.size() >= self.config.max_index_bytes
            || self.index.is_full()
    }

    /// Assign `record` the next offset, encode and append it. Returns the
    /// assigned global offset.
    pub(crate) fn append<T: Encode>(&self, record: &T) -> Result<u64> {
        let offset = self.next_offset();

        let mut buf = Vec::new();
        record.encode(&mut buf);

        let (_, pos) = self.store.append(&buf)?;

        let rel_off = (offset - self.base_offset) as u32;
        self.index.write(rel_off, pos).map_err(index_err(self.base_offset, offset))?;

        self.next_offset.store(offset + 1, std::sync::atomic::Ordering::SeqCst);
        Ok(offset)
    }

    /// Read and decode the record at `offset`, which must lie within
    /// `[base_offset, next_offset)`.
    pub(crate) fn read<T: Decode>(&self, offset: u64) -> Result<T> {
        let rel_off = (offset - self.base_offset) as u32;
        let (_, pos) = self.index.read(rel_off).map_err(index_err(self.base_offset, offset))?;
        let buf = self.store.read(pos)?;
        T::decode(offset, &buf).map_err(Error::Io)
    }

    pub(crate) fn flush(&self) -> Result<()> {
        self.store.flush()?;
        self.index.flush().map_err(index_err(self.base_offset, 0))?;
        Ok(())
    }

    pub(crate) fn sync(&self) -> Result<()> {
        self.store.sync()?;
        self.index.flush().map_err(index_err(self.base_offset, 0))?;
        Ok(())
    }

    pub(crate) fn close(&self) -> Result<()> {
        self.index.close().map_err(index_err(self.base_offset, 0))?;
        self.store.close()?;
        Ok(())
    }

    /// Close and unlink both files.
    pub(crate) fn remove(&self, dir: &Path) -> Result<()> {
        self.close()?;
        fs::remove_file(store_path(dir, self.base_offset))?;
        fs::remove_file(index_path(dir, self.base_offset))?;
        Ok(())
    }

    pub(crate) fn store(&self) -> &Store {
        &self.store
    }
}

/// Turn an [`IndexError`] into a [`crate::Error`], filling in the offset
/// context the index itself doesn't carry.
fn index_err(base_offset: u64, offset: u64) -> impl Fn(IndexError) -> Error {
    move |e| {
        match &e {
            IndexError::Io(e) => warn!("segment {base_offset}: index I/O error: {e}"),
            _ => {}
        }
        match e {
            IndexError::Empty | IndexError::OutOfRange => Error::OutOfRange { offset },
            IndexError::Full => Error::Full,
            IndexError::NotOpen => Error::NotOpen("segment"),
            IndexError::Io(e) => Error::Io(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Record;
    use tempfile::tempdir;

    fn config(max_store_bytes: u64, max_index_bytes: u64) -> SegmentConfig {
        SegmentConfig {
            max_store_bytes,
            max_index_bytes,
            initial_offset: 0,
            sync_on_append: false,
        }
    }

    #[test]
    fn append_and_read() {
        let dir = tempdir().unwrap();
        let c = config(1024, crate::index::ENTRY_WIDTH * 3);
        let seg = Segment::open(dir.path(), 16, c).unwrap();
        assert_eq!(seg.next_offset(), 16);
        assert!(!seg.is_full());

        let expected = Record::new(*b"hello world");
        for i in 0..3u64 {
            let off = seg.append(&expected).unwrap();
            assert_eq!(off, 16 + i);

            let actual: Record = seg.read(off).unwrap();
            assert_eq!(actual.value, expected.value);
        }

        assert!(matches!(seg.append(&expected), Err(Error::Full)));
        assert!(seg.is_full());
    }

    #[test]
    fn rebuild_after_reopen() {
        let dir = tempdir().unwrap();
        let expected = Record::new(*b"hello world");
        let c = config(1024, 1024);
        {
            let seg = Segment::open(dir.path(), 16, c).unwrap();
            for _ in 0..3 {
                seg.append(&expected).unwrap();
            }
            seg.close().unwrap();
        }

        let seg = Segment::open(dir.path(), 16, c).unwrap();
        assert_eq!(seg.next_offset(), 19);
        let actual: Record = seg.read(18).unwrap();
        assert_eq!(actual.value, expected.value);
    }

    #[test]
    fn remove_deletes_both_files() {
        let dir = tempdir().unwrap();
        let c = config(1024, 1024);
        let seg = Segment::open(dir.path(), 0, c).unwrap();
        seg.append(&Record::new(*b"x")).unwrap();
        seg.remove(dir.path()).unwrap();

        assert!(!store_path(dir.path(), 0).exists());
        assert!(!index_path(dir.path(), 0).exists());
    }
}
