//! In-memory engine for testing.

use std::collections::BTreeMap;
use std::path::Path;

use parking_lot::RwLock;

use crate::batch::{Batch, BatchOp};
use crate::config::{Config, ReadOptions, WriteOptions};
use crate::engine::{Engine, EngineHandle};
use crate::error::{EngineError, EngineResult};

/// An ordered in-memory engine.
///
/// Each open produces a fresh, empty store that exists only in memory.
/// Suitable for:
/// - Unit tests of the dispatch layer without disk I/O
/// - Ephemeral databases that don't need persistence
///
/// # Thread Safety
///
/// Handles are thread-safe and can be driven from multiple worker threads.
///
/// # Example
///
/// ```rust
/// use strata_engine::{Batch, Config, Engine, EngineHandle, MemoryEngine, ReadOptions, WriteOptions};
/// use std::path::Path;
///
/// let engine = MemoryEngine::new();
/// let db = engine.open(Path::new("unused"), &Config::default()).unwrap();
/// let batch = Batch::single_put(b"k".to_vec(), b"v".to_vec());
/// db.write(&batch, &WriteOptions::default()).unwrap();
/// assert_eq!(db.get(b"k", &ReadOptions::default()).unwrap(), b"v");
/// ```
#[derive(Debug, Default)]
pub struct MemoryEngine;

impl MemoryEngine {
    /// Creates a new in-memory engine.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Engine for MemoryEngine {
    fn open(&self, _path: &Path, _config: &Config) -> EngineResult<Box<dyn EngineHandle>> {
        Ok(Box::new(MemoryHandle::default()))
    }

    fn destroy(&self, _path: &Path) -> EngineResult<()> {
        // Nothing on disk to remove
        Ok(())
    }
}

/// An open in-memory store.
#[derive(Debug, Default)]
pub struct MemoryHandle {
    table: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryHandle {
    /// Returns the number of live entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.table.read().len()
    }

    /// Returns true if the store holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.table.read().is_empty()
    }
}

impl EngineHandle for MemoryHandle {
    fn get(&self, key: &[u8], _options: &ReadOptions) -> EngineResult<Vec<u8>> {
        self.table
            .read()
            .get(key)
            .cloned()
            .ok_or(EngineError::NotFound)
    }

    fn write(&self, batch: &Batch, _options: &WriteOptions) -> EngineResult<()> {
        // Apply under a single write lock so no reader observes a partial batch.
        let mut table = self.table.write();
        for op in batch.ops() {
            match op {
                BatchOp::Put { key, value } => {
                    table.insert(key.clone(), value.clone());
                }
                BatchOp::Delete { key } => {
                    table.remove(key);
                }
            }
        }
        Ok(())
    }

    fn property(&self, name: &str) -> Option<String> {
        match name {
            "strata.engine" => Some("memory".to_string()),
            "strata.num-entries" => Some(self.table.read().len().to_string()),
            _ => None,
        }
    }

    fn close(&self) -> EngineResult<()> {
        // No durable state to flush
        Ok(())
    }
}
