//! Shared helpers for StrataDB benchmarks.

use strata_core::{Config, Database, MemoryEngine, StoreResult, Ticket};

/// Opens an in-memory database, blocking until ready.
#[must_use]
pub fn open_memory_db() -> Database {
    let db = Database::new("bench", MemoryEngine::new());
    let (ticket, done) = Ticket::new();
    db.open(Config::default(), move |res| done.complete(res));
    ticket.wait().expect("bench database failed to open");
    db
}

/// Stores a value, blocking for the outcome.
pub fn put_blocking(db: &Database, key: Vec<u8>, value: Vec<u8>) -> StoreResult<()> {
    let (ticket, done) = Ticket::new();
    db.put(key, value, move |res| done.complete(res));
    ticket.wait()
}

/// Reads a value, blocking for the outcome.
pub fn get_blocking(db: &Database, key: Vec<u8>) -> StoreResult<Vec<u8>> {
    let (ticket, done) = Ticket::new();
    db.get(key, move |res| done.complete(res));
    ticket.wait()
}

/// Deterministic key for the `i`-th benchmark entry.
#[must_use]
pub fn bench_key(i: u64) -> Vec<u8> {
    format!("bench-key-{i:012}").into_bytes()
}
