//! # Strata Core
//!
//! Asynchronous dispatch layer for StrataDB.
//!
//! StrataDB is an embeddable, ordered, persistent key-value store. This
//! crate is its caller-facing surface: a non-blocking request interface
//! over a synchronous storage engine.
//!
//! - [`Database`] - lifecycle-gated handle dispatching operations to a
//!   worker pool
//! - [`WorkerPool`] - bounded execution threads with a shared FIFO queue
//! - [`Status`] / [`StoreResult`] - classified operation outcomes
//! - [`Ticket`] - single-slot completion channel for blocking callers
//!
//! ## Usage
//!
//! ```rust,ignore
//! use strata_core::{Database, Ticket};
//! use strata_engine::{Config, LogEngine};
//!
//! let db = Database::new("/var/lib/mystore", LogEngine::new());
//!
//! let (opened, done) = Ticket::new();
//! db.open(Config::default().cache_size(10 << 20), move |res| done.complete(res));
//! opened.wait()?;
//!
//! db.put(b"key".to_vec(), b"value".to_vec(), |res| {
//!     if let Err(status) = res {
//!         eprintln!("put failed: {status}");
//!     }
//! });
//! ```
//!
//! Hosts must close the database before process exit to guarantee
//! durability of the most recent writes.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod database;
mod pool;
mod status;
mod ticket;

pub use database::{Database, Lifecycle};
pub use pool::{WorkerPool, DEFAULT_WORKERS};
pub use status::{Status, StatusKind, StoreResult};
pub use ticket::{Completion, Ticket};

// Re-export the engine vocabulary so most callers need only this crate.
pub use strata_engine::{
    Batch, BatchBuilder, BatchOp, Config, Engine, EngineError, EngineHandle, EngineResult,
    LogEngine, MemoryEngine, ReadOptions, WriteOptions,
};
