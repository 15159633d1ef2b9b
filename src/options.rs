//! Tuning knobs shared by the sync and async extractors

/// Configuration for extraction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractOptions {
    /// Capacity of the read buffer wrapped around the source (default: 64KB,
    /// values under 512 bytes are raised to 512)
    pub buffer_size: usize,
    /// Check CRC-32 and sizes of every decoded entry (default: true)
    pub verify_checksums: bool,
    /// After a single-file extraction found its entry, keep reading until the
    /// archive's entries are exhausted instead of dropping the source (default: true)
    pub drain_remaining: bool,
    /// Largest decompressed size accepted for one buffered entry (default: unbounded)
    pub max_entry_size: Option<u64>,
    /// Largest decompressed size accepted across all buffered entries of a
    /// multi-file extraction (default: unbounded)
    pub max_total_size: Option<u64>,
}

/// Default read buffer capacity
pub const DEFAULT_BUFFER_SIZE: usize = 64 * 1024;

/// Smallest read buffer the readers will use
pub const MIN_BUFFER_SIZE: usize = 512;

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            verify_checksums: true,
            drain_remaining: true,
            max_entry_size: None,
            max_total_size: None,
        }
    }
}

impl ExtractOptions {
    /// Bounded memory: entries up to 256MB, 1GB in total
    pub fn strict() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            verify_checksums: true,
            drain_remaining: true,
            max_entry_size: Some(256 * 1024 * 1024),
            max_total_size: Some(1024 * 1024 * 1024),
        }
    }

    /// Skip checksum verification, for archives written by sloppy tools
    pub fn lenient() -> Self {
        Self {
            verify_checksums: false,
            ..Self::default()
        }
    }

    /// Set the read buffer capacity
    pub fn with_buffer_size(mut self, size: usize) -> Self {
        assert!(
            size >= MIN_BUFFER_SIZE,
            "buffer_size must be at least 512 bytes"
        );
        self.buffer_size = size;
        self
    }

    pub fn with_verify_checksums(mut self, verify: bool) -> Self {
        self.verify_checksums = verify;
        self
    }

    /// `false` makes single-file extraction return right after its match,
    /// releasing the source without reading the rest of the archive
    pub fn with_drain_remaining(mut self, drain: bool) -> Self {
        self.drain_remaining = drain;
        self
    }

    /// Cap the decompressed size of any single buffered entry
    pub fn with_max_entry_size(mut self, limit: u64) -> Self {
        self.max_entry_size = Some(limit);
        self
    }

    /// Cap the decompressed size buffered by one multi-file extraction
    pub fn with_max_total_size(mut self, limit: u64) -> Self {
        self.max_total_size = Some(limit);
        self
    }
}
