//! Engine configuration and per-operation options.

/// Configuration for opening a database.
#[derive(Debug, Clone)]
pub struct Config {
    /// Size of the engine's block cache in bytes.
    pub cache_size: u64,

    /// Whether values are compressed on disk.
    pub compression: bool,

    /// Whether to create the database if it doesn't exist.
    pub create_if_missing: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_size: 8 * 1024 * 1024, // 8 MiB
            compression: true,
            create_if_missing: true,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the block cache size in bytes.
    #[must_use]
    pub const fn cache_size(mut self, bytes: u64) -> Self {
        self.cache_size = bytes;
        self
    }

    /// Sets whether values are compressed on disk.
    #[must_use]
    pub const fn compression(mut self, value: bool) -> Self {
        self.compression = value;
        self
    }

    /// Sets whether to create the database if missing.
    #[must_use]
    pub const fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }
}

/// Options applied to a single write (put, delete, or batch).
#[derive(Debug, Clone, Default)]
pub struct WriteOptions {
    /// Whether the write must reach durable storage before completion.
    pub sync: bool,
}

impl WriteOptions {
    /// Creates write options with defaults (asynchronous writes).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether the write is flushed to durable storage.
    #[must_use]
    pub const fn sync(mut self, value: bool) -> Self {
        self.sync = value;
        self
    }
}

/// Options applied to a single read.
#[derive(Debug, Clone)]
pub struct ReadOptions {
    /// Whether stored checksums are verified on this read.
    pub verify_checksums: bool,

    /// Whether the read populates the engine's cache.
    pub fill_cache: bool,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            verify_checksums: false,
            fill_cache: true,
        }
    }
}

impl ReadOptions {
    /// Creates read options with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether checksums are verified on this read.
    #[must_use]
    pub const fn verify_checksums(mut self, value: bool) -> Self {
        self.verify_checksums = value;
        self
    }

    /// Sets whether the read populates the engine's cache.
    #[must_use]
    pub const fn fill_cache(mut self, value: bool) -> Self {
        self.fill_cache = value;
        self
    }
}
