/// [`crate::Log`] configuration.
///
/// Mirrors the reference implementation's `Config.Segment` grouping: all
/// tunables live under [`Config::segment`] since, today, the log itself has
/// no top-level options of its own.
#[derive(Clone, Copy, Debug, Default)]
pub struct Config {
    pub segment: SegmentConfig,
}

/// Per-segment tunables.
///
/// A value of `0` for `max_store_bytes` or `max_index_bytes` is treated as
/// "unset" when [`crate::Log::open`] constructs a segment, which applies the
/// documented defaults rather than constructing a segment that is
/// immediately full. [`SegmentConfig::default`] therefore intentionally
/// returns zeroes rather than the defaults, so callers using
/// `..Default::default()` get the same normalization as an explicit `0`.
#[derive(Clone, Copy, Debug, Default)]
pub struct SegmentConfig {
    /// Maximum number of bytes a segment's store file may grow to before the
    /// segment is considered full. Normalized to `1024` if `0`.
    pub max_store_bytes: u64,
    /// Maximum number of bytes a segment's index file may grow to before the
    /// segment is considered full. Normalized to `1024` if `0`.
    pub max_index_bytes: u64,
    /// The offset assigned to the first segment of a freshly created log.
    /// Ignored when existing segments are recovered from disk.
    pub initial_offset: u64,
    /// If `true`, every [`crate::Log::append`] additionally fsyncs the active
    /// segment's store and index before returning. Default `false`: the log
    /// is buffered/flush-on-demand, per the storage layer's durability model.
    pub sync_on_append: bool,
}

pub(crate) const DEFAULT_MAX_STORE_BYTES: u64 = 1024;
pub(crate) const DEFAULT_MAX_INDEX_BYTES: u64 = 1024;

impl SegmentConfig {
    pub(crate) fn normalized(mut self) -> Self {
        if self.max_store_bytes == 0 {
            self.max_store_bytes = DEFAULT_MAX_STORE_BYTES;
        }
        if self.max_index_bytes == 0 {
            self.max_index_bytes = DEFAULT_MAX_INDEX_BYTES;
        }
        self
    }

    pub fn with_max_store_bytes(mut self, max_store_bytes: u64) -> Self {
        self.max_store_bytes = max_store_bytes;
        self
    }

    pub fn with_max_index_bytes(mut self, max_index_bytes: u64) -> Self {
        self.max_index_bytes = max_index_bytes;
        self
    }

    pub fn with_initial_offset(mut self, initial_offset: u64) -> Self {
        self.initial_offset = initial_offset;
        self
    }

    pub fn with_sync_on_append(mut self, sync_on_append: bool) -> Self {
        self.sync_on_append = sync_on_append;
        self
    }
}

impl Config {
    /// Returns a copy of `self` with `segment` defaults applied for any
    /// zero-valued byte caps.
    pub(crate) fn normalized(mut self) -> Self {
        self.segment = self.segment.normalized();
        self
    }

    pub fn with_segment(mut self, segment: SegmentConfig) -> Self {
        self.segment = segment;
        self
    }
}
