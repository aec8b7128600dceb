use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use log::{debug, info};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::record::{Decode, Encode};
use crate::segment::{Segment, STORE_EXT};

/// Capability exposed to the transport/service layer: assign an offset to a
/// record on append, and fetch a record back out by offset.
///
/// [`Log`] is the only implementation shipped by this crate; the trait
/// exists so callers embedding this crate can swap in a test double without
/// depending on `Log`'s concrete type.
pub trait CommitLog<T> {
    fn append(&self, record: &T) -> Result<u64>;
    fn read(&self, offset: u64) -> Result<T>;
}

/// An ordered composition of segments presenting a single, contiguous
/// offset address space.
///
/// All public operations are thread-safe: a single reader/writer lock
/// guards the segment list and serializes list-mutating operations (a
/// rolling append, `truncate`, `close`, `reset`, `remove`) against every
/// other operation, while permitting concurrent reads.
#[derive(Debug)]
pub struct Log {
    dir: PathBuf,
    config: Config,
    segments: RwLock<Vec<Arc<Segment>>>,
}

impl Log {
    /// Open (recovering existing segments) or create a log rooted at `dir`.
    pub fn open(dir: impl Into<PathBuf>, config: Config) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        let config = config.normalized();

        let segments = Self::recover_segments(&dir, &config)?;
        info!(
            "log {}: opened with {} segment(s), offsets [{}, {})",
            dir.display(),
            segments.len(),
            segments.first().unwrap().base_offset(),
            segments.last().unwrap().next_offset(),
        );

        Ok(Self {
            dir,
            config,
            segments: RwLock::new(segments),
        })
    }

    fn recover_segments(dir: &Path, config: &Config) -> Result<Vec<Arc<Segment>>> {
        let mut base_offsets = discover_base_offsets(dir)?;
        base_offsets.sort_unstable();
        base_offsets.dedup();

        let mut segments = Vec::with_capacity(base_offsets.len().max(1));
        for base_offset in base_offsets {
            segments.push(Arc::new(Segment::open(dir, base_offset, config.segment)?));
        }
        if segments.is_empty() {
            debug!("log {}: starting fresh", dir.display());
            segments.push(Arc::new(Segment::open(dir, config.segment.initial_offset, config.segment)?));
        }
        Ok(segments)
    }

    /// Append `record`, rolling to a new segment first if the active segment
    /// is full. Returns the assigned global offset.
    pub fn append<T: Encode>(&self, record: &T) -> Result<u64> {
        let mut segments = self.segments.write().unwrap();

        if segments.last().expect("log always has a segment").is_full() {
            let new_base = highest_offset(&segments) + 1;
            debug!("log {}: rolling to new segment at offset {new_base}", self.dir.display());
            segments.push(Arc::new(Segment::open(&self.dir, new_base, self.config.segment)?));
        }

        let active = segments.last().expect("log always has a segment");
        let offset = active.append(record)?;
        if self.config.segment.sync_on_append {
            active.sync()?;
        }
        Ok(offset)
    }

    /// Read and decode the record at `offset`, scanning segments linearly
    /// for the one whose range contains it.
    pub fn read<T: Decode>(&self, offset: u64) -> Result<T> {
        let segments = self.segments.read().unwrap();
        segments
            .iter()
            .find(|s| s.base_offset() <= offset && offset < s.next_offset())
            .ok_or(Error::OutOfRange { offset })
            .and_then(|s| s.read(offset))
    }

    /// The highest assigned offset, or `0` if the log holds no records.
    ///
    /// This is ambiguous with "exactly one record at offset 0"; prefer
    /// [`Log::highest_offset_checked`] when that distinction matters.
    pub fn highest_offset(&self) -> u64 {
        highest_offset(&self.segments.read().unwrap())
    }

    /// The highest assigned offset, or `None` if the log holds no records.
    pub fn highest_offset_checked(&self) -> Option<u64> {
        let segments = self.segments.read().unwrap();
        let first = segments.first().unwrap();
        if segments.len() == 1 && first.next_offset() == first.base_offset() {
            None
        } else {
            Some(highest_offset(&segments))
        }
    }

    /// The lowest offset still held by the log.
    pub fn lowest_offset(&self) -> u64 {
        self.segments.read().unwrap().first().unwrap().base_offset()
    }

    /// Flush every segment's store and index.
    pub fn flush(&self) -> Result<()> {
        let segments = self.segments.write().unwrap();
        for segment in segments.iter() {
            segment.flush()?;
        }
        Ok(())
    }

    /// Close every segment in order.
    pub fn close(&self) -> Result<()> {
        let segments = self.segments.write().unwrap();
        for segment in segments.iter() {
            segment.close()?;
        }
        Ok(())
    }

    /// Close the log and remove its directory tree.
    pub fn remove(&self) -> Result<()> {
        self.close()?;
        fs::remove_dir_all(&self.dir)?;
        Ok(())
    }

    /// Remove the log, then recreate it empty at `config.segment.initial_offset`.
    pub fn reset(&self) -> Result<()> {
        self.remove()?;
        fs::create_dir_all(&self.dir)?;
        let segment = Segment::open(&self.dir, self.config.segment.initial_offset, self.config.segment)?;
        *self.segments.write().unwrap() = vec![Arc::new(segment)];
        info!("log {}: reset", self.dir.display());
        Ok(())
    }

    /// Drop every segment whose entire offset range lies at or below
    /// `lowest`. Partial-range truncation within a segment is not supported.
    /// The active (last) segment is never dropped, even if its own range lies
    /// at or below `lowest`, so the log always retains `segments[len-1]` as
    /// its append target.
    pub fn truncate(&self, lowest: u64) -> Result<()> {
        let mut segments = self.segments.write().unwrap();
        let last = segments.len() - 1;
        let mut retained = Vec::with_capacity(segments.len());
        let mut removed = 0usize;
        for (i, segment) in segments.drain(..).enumerate() {
            if i == last || segment.next_offset() > lowest + 1 {
                retained.push(segment);
            } else {
                segment.remove(&self.dir)?;
                removed += 1;
            }
        }
        *segments = retained;
        info!("log {}: truncated below {lowest}, removed {removed} segment(s)", self.dir.display());
        Ok(())
    }

    /// A byte stream concatenating every segment's store, starting over at
    /// byte `0` for each. Snapshot of the segment list at call time: later
    /// appends (or rolls, or truncation) are not reflected.
    pub fn reader(&self) -> Reader {
        let segments = self.segments.read().unwrap().clone();
        Reader { segments, idx: 0, pos: 0 }
    }
}

impl<T: Encode + Decode> CommitLog<T> for Log {
    fn append(&self, record: &T) -> Result<u64> {
        Log::append(self, record)
    }

    fn read(&self, offset: u64) -> Result<T> {
        Log::read(self, offset)
    }
}

fn highest_offset(segments: &[Arc<Segment>]) -> u64 {
    let next = segments.last().expect("log always has a segment").next_offset();
    if next == 0 {
        0
    } else {
        next - 1
    }
}

fn discover_base_offsets(dir: &Path) -> Result<Vec<u64>> {
    let mut base_offsets = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some(STORE_EXT) {
            continue;
        }
        if let Some(base_offset) = path.file_stem().and_then(|s| s.to_str()).and_then(|s| s.parse::<u64>().ok()) {
            base_offsets.push(base_offset);
        }
    }
    Ok(base_offsets)
}

/// Sequential byte stream over a snapshot of a log's segments, each read in
/// turn from its own byte `0`. See [`Log::reader`].
#[derive(Debug)]
pub struct Reader {
    segments: Vec<Arc<Segment>>,
    idx: usize,
    pos: u64,
}

impl io::Read for Reader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            let Some(segment) = self.segments.get(self.idx) else {
                return Ok(0);
            };
            let n = segment.store().read_at(buf, self.pos)?;
            if n == 0 {
                self.idx += 1;
                self.pos = 0;
                continue;
            }
            self.pos += n as u64;
            return Ok(n);
        }
    }
}
