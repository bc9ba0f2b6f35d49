//! Engine trait definitions.

use std::path::Path;

use crate::batch::Batch;
use crate::config::{Config, ReadOptions, WriteOptions};
use crate::error::EngineResult;

/// A storage engine that can open databases at filesystem paths.
///
/// Engines are **opaque ordered key-value stores**. The dispatch layer above
/// drives them synchronously from worker threads and never looks inside;
/// all knowledge of file formats, caching, and compaction lives behind this
/// trait.
///
/// # Implementors
///
/// - [`super::MemoryEngine`] - For testing and ephemeral stores
/// - [`super::LogEngine`] - For persistent storage
pub trait Engine: Send + Sync {
    /// Opens the database at `path`, creating it according to `config`.
    ///
    /// Blocks the invoking thread until the engine has recovered its
    /// on-disk state.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The path does not exist and `create_if_missing` is false
    /// - Another process holds the database lock
    /// - Recovery detects corruption
    /// - An I/O error occurs
    fn open(&self, path: &Path, config: &Config) -> EngineResult<Box<dyn EngineHandle>>;

    /// Removes all state of the database at `path`.
    ///
    /// Must not be called while the database is open.
    ///
    /// # Errors
    ///
    /// Returns an error if the state cannot be removed.
    fn destroy(&self, path: &Path) -> EngineResult<()>;
}

/// An open database inside an engine.
///
/// # Invariants
///
/// - All calls block the invoking thread until the engine returns
/// - No call retries internally; retry policy belongs to the caller
/// - Implementations must be `Send + Sync`: the dispatch layer executes
///   operations from multiple worker threads concurrently, holding only a
///   shared reference for the duration of one operation
pub trait EngineHandle: Send + Sync {
    /// Reads the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NotFound`](crate::EngineError::NotFound) if
    /// the key is absent, never success with an empty payload.
    fn get(&self, key: &[u8], options: &ReadOptions) -> EngineResult<Vec<u8>>;

    /// Applies a batch of mutations as a single atomic write.
    ///
    /// Either all entries become visible or none do. Entries targeting the
    /// same key apply in batch order (last writer wins). Single puts and
    /// deletes go through this call as one-entry batches.
    ///
    /// # Errors
    ///
    /// Returns an error if the write cannot be made durable.
    fn write(&self, batch: &Batch, options: &WriteOptions) -> EngineResult<()>;

    /// Returns the value of an engine-specific introspection property.
    ///
    /// Returns `None` for unrecognized property names.
    fn property(&self, name: &str) -> Option<String>;

    /// Flushes outstanding state and prepares the handle for release.
    ///
    /// Close is retryable: on failure the handle remains usable and close
    /// may be invoked again. The caller drops the handle only after a
    /// successful close.
    ///
    /// # Errors
    ///
    /// Returns an error if outstanding state cannot be flushed.
    fn close(&self) -> EngineResult<()>;
}
