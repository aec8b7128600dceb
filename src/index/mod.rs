use std::fs::File;
use std::io;
use std::sync::Mutex;

use log::{debug, warn};
use memmap2::MmapMut;
use thiserror::Error;

/// Width, in bytes, of the relative-offset field of an entry.
const REL_OFF_WIDTH: u64 = 4;
/// Width, in bytes, of the store-position field of an entry.
const POS_WIDTH: u64 = 8;
/// Width, in bytes, of one index entry: `rel_off:u32-BE ‖ pos:u64-BE`.
pub const ENTRY_WIDTH: u64 = REL_OFF_WIDTH + POS_WIDTH;

/// Errors specific to [`Index`] operations.
///
/// The segment layer maps these onto [`crate::Error`] with the offset
/// context the index itself doesn't have.
#[derive(Debug, Error)]
pub enum IndexError {
    /// The index has no entries.
    #[error("index is empty")]
    Empty,
    /// The requested entry is past the end of the valid entry region.
    #[error("entry out of range")]
    OutOfRange,
    /// A write was attempted with no remaining capacity under the mmap.
    #[error("index is full")]
    Full,
    /// The index was already closed.
    #[error("operation on closed index")]
    NotOpen,
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// A fixed-width, memory-mapped table mapping a relative offset to a store
/// byte-position.
///
/// On open, the backing file is grown (via truncation) to `max_index_bytes`
/// so the mmap can address the full future extent without ever needing to
/// remap; on close it is shrunk back to the logical `size`, so unused tail
/// space is not persisted. Unmapping strictly precedes that truncate, since
/// some platforms (Windows, notably) refuse to resize a file with an active
/// mapping.
#[derive(Debug)]
pub struct Index {
    inner: Mutex<Inner>,
    name: String,
}

#[derive(Debug)]
struct Inner {
    file: File,
    mmap: Option<MmapMut>,
    /// Logical number of valid entry bytes. Always a multiple of
    /// [`ENTRY_WIDTH`] at quiescent moments.
    size: u64,
    /// Length, in bytes, of the mmap (== the preallocated `max_index_bytes`).
    cap: u64,
    closed: bool,
}

impl Index {
    /// Open `file` as an index, preallocating it to `max_index_bytes`.
    ///
    /// `store_size` is the logical size of the segment's store and is used
    /// only to reconstruct `size` when the file was not cleanly closed (see
    /// [`reconcile_size`]); it has no other effect.
    pub fn open(file: File, name: impl Into<String>, max_index_bytes: u64, store_size: u64) -> Result<Self, IndexError> {
        let original_size = file.metadata()?.len();
        file.set_len(max_index_bytes)?;
        // SAFETY: `file` outlives the mapping (owned by `Inner` alongside it)
        // and is not truncated again while the mapping is alive.
        let mmap = unsafe { MmapMut::map_mut(&file)? };

        let size = if original_size < max_index_bytes {
            // The file was either freshly created (size 0) or previously
            // closed cleanly, in which case its length already *is* the
            // valid entry region.
            original_size
        } else {
            debug!("index file was not shrunk on last close, reconstructing size");
            reconcile_size(&mmap, max_index_bytes, store_size)
        };

        Ok(Self {
            inner: Mutex::new(Inner {
                file,
                mmap: Some(mmap),
                size,
                cap: max_index_bytes,
                closed: false,
            }),
            name: name.into(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Logical number of valid entry bytes currently stored.
    pub fn size(&self) -> u64 {
        self.inner.lock().unwrap().size
    }

    /// `true` if a further [`Index::write`] would not fit under the cap.
    pub fn is_full(&self) -> bool {
        let inner = self.inner.lock().unwrap();
        inner.size + ENTRY_WIDTH > inner.cap
    }

    /// Append a `(rel_off, pos)` entry at the current write position.
    pub fn write(&self, rel_off: u32, pos: u64) -> Result<(), IndexError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.closed {
            return Err(IndexError::NotOpen);
        }
        if inner.size + ENTRY_WIDTH > inner.cap {
            return Err(IndexError::Full);
        }

        let mmap = inner.mmap.as_mut().expect("mmap present while open");
        let start = inner.size as usize;
        mmap[start..start + REL_OFF_WIDTH as usize].copy_from_slice(&rel_off.to_be_bytes());
        mmap[start + REL_OFF_WIDTH as usize..start + ENTRY_WIDTH as usize].copy_from_slice(&pos.to_be_bytes());
        inner.size += ENTRY_WIDTH;
        Ok(())
    }

    /// Read the entry at `rel_off`.
    pub fn read(&self, rel_off: u32) -> Result<(u32, u64), IndexError> {
        let inner = self.inner.lock().unwrap();
        if inner.closed {
            return Err(IndexError::NotOpen);
        }
        if inner.size == 0 {
            return Err(IndexError::Empty);
        }
        let ep = rel_off as u64 * ENTRY_WIDTH;
        if inner.size < ep + ENTRY_WIDTH {
            return Err(IndexError::OutOfRange);
        }
        let mmap = inner.mmap.as_ref().expect("mmap present while open");
        Ok(decode_entry(mmap, ep))
    }

    /// Read the last written entry.
    pub fn read_last(&self) -> Result<(u32, u64), IndexError> {
        let inner = self.inner.lock().unwrap();
        if inner.closed {
            return Err(IndexError::NotOpen);
        }
        if inner.size == 0 {
            return Err(IndexError::Empty);
        }
        let last = (inner.size / ENTRY_WIDTH) - 1;
        let mmap = inner.mmap.as_ref().expect("mmap present while open");
        Ok(decode_entry(mmap, last * ENTRY_WIDTH))
    }

    /// Asynchronously `msync` the mapping, then `fsync` the file.
    pub fn flush(&self) -> Result<(), IndexError> {
        let inner = self.inner.lock().unwrap();
        if inner.closed {
            return Err(IndexError::NotOpen);
        }
        inner.mmap.as_ref().expect("mmap present while open").flush_async()?;
        inner.file.sync_all()?;
        Ok(())
    }

    /// Flush, unmap, and truncate the file back to `size`. Subsequent
    /// operations return [`IndexError::NotOpen`].
    pub fn close(&self) -> Result<(), IndexError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.closed {
            return Err(IndexError::NotOpen);
        }
        inner.mmap.as_ref().expect("mmap present while open").flush_async()?;
        inner.file.sync_all()?;
        // Unmap before truncating: some platforms refuse to resize a file
        // with an active mapping.
        inner.mmap = None;
        inner.file.set_len(inner.size)?;
        inner.closed = true;
        Ok(())
    }
}

fn decode_entry(mmap: &MmapMut, start: u64) -> (u32, u64) {
    let start = start as usize;
    let rel_off = u32::from_be_bytes(mmap[start..start + REL_OFF_WIDTH as usize].try_into().unwrap());
    let pos = u64::from_be_bytes(
        mmap[start + REL_OFF_WIDTH as usize..start + ENTRY_WIDTH as usize]
            .try_into()
            .unwrap(),
    );
    (rel_off, pos)
}

/// Reconstruct `size` for an index file that was preallocated to `cap` by a
/// run that did not close cleanly (so the file's length alone cannot tell us
/// how many entries are valid).
///
/// Binary-searches for the greatest `k` such that entry `k` decodes with
/// `rel_off == k` and `pos < store_size` — by construction, entry `k` in a
/// segment's index always carries `rel_off == k`, and valid entries are a
/// contiguous prefix, so this predicate is true on `[0, size/ENTRY_WIDTH)`
/// and false beyond it.
///
/// One case is irreducibly ambiguous: if the very first record in the
/// segment starts at store position `0`, a genuine entry `(0, 0)` is
/// byte-for-byte identical to an untouched, zero-filled slot. This function
/// resolves that in favor of treating it as a real entry whenever the store
/// is non-empty, which can overcount by at most one entry, and only in that
/// exact boundary case.
fn reconcile_size(mmap: &MmapMut, cap: u64, store_size: u64) -> u64 {
    let max_entries = cap / ENTRY_WIDTH;
    if max_entries == 0 {
        return 0;
    }

    let valid = |k: u64| -> bool {
        let (rel_off, pos) = decode_entry(mmap, k * ENTRY_WIDTH);
        rel_off as u64 == k && pos < store_size
    };

    if !valid(0) {
        return 0;
    }

    let (mut lo, mut hi) = (0u64, max_entries);
    while lo + 1 < hi {
        let mid = lo + (hi - lo) / 2;
        if valid(mid) {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    warn!("reconstructed index size: {} valid entries", lo + 1);
    (lo + 1) * ENTRY_WIDTH
}
