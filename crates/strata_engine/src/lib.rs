//! # Strata Engine
//!
//! Storage engine traits and adapters for StrataDB.
//!
//! This crate provides the vocabulary the dispatch layer speaks to a
//! storage engine:
//!
//! - The [`Engine`] and [`EngineHandle`] traits - a synchronous façade
//!   over an opaque ordered key-value engine
//! - [`Batch`] and [`BatchBuilder`] - atomic multi-operation writes
//! - [`Config`], [`ReadOptions`], [`WriteOptions`] - tuning knobs
//! - [`MemoryEngine`] - ordered in-memory engine for tests
//! - [`LogEngine`] - persistent log-structured engine
//!
//! ## Design Principles
//!
//! - Engines are opaque: callers never see file formats or caching
//! - All engine calls block the invoking thread; concurrency lives above
//! - Absent keys are reported as [`EngineError::NotFound`], never as
//!   success with an empty payload
//! - No retries at this layer; retry policy belongs to callers

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod batch;
mod config;
mod engine;
mod error;
mod log;
mod memory;

pub use batch::{Batch, BatchBuilder, BatchOp};
pub use config::{Config, ReadOptions, WriteOptions};
pub use engine::{Engine, EngineHandle};
pub use error::{EngineError, EngineResult};
pub use log::{LogEngine, LogHandle};
pub use memory::{MemoryEngine, MemoryHandle};
