//! Test fixtures and blocking helpers.

use std::path::Path;
use std::sync::Once;

use strata_core::{Batch, Config, Database, LogEngine, StoreResult, Ticket};
use tempfile::TempDir;

/// Initializes a tracing subscriber for test debugging.
///
/// Reads the `RUST_LOG` environment filter. Safe to call from multiple
/// tests; only the first call installs the subscriber.
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        use tracing_subscriber::EnvFilter;
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .init();
    });
}

/// Runs `f` against an opened log-engine database in a temp directory.
///
/// The database is closed and the directory removed when `f` returns.
pub fn with_temp_db<F, T>(f: F) -> T
where
    F: FnOnce(&Database) -> T,
{
    let dir = TempDir::new().expect("failed to create temp dir");
    let db = Database::new(dir.path(), LogEngine::new());
    open_wait(&db, Config::default()).expect("failed to open database");

    let result = f(&db);

    close_wait(&db).expect("failed to close database");
    result
}

/// Creates a closed handle over a log engine at `path`.
#[must_use]
pub fn log_database(path: &Path) -> Database {
    Database::new(path, LogEngine::new())
}

/// Opens a database and blocks for the outcome.
pub fn open_wait(db: &Database, config: Config) -> StoreResult<()> {
    let (ticket, done) = Ticket::new();
    db.open(config, move |res| done.complete(res));
    ticket.wait()
}

/// Stores a value and blocks for the outcome.
pub fn put_wait(db: &Database, key: &[u8], value: &[u8]) -> StoreResult<()> {
    let (ticket, done) = Ticket::new();
    db.put(key.to_vec(), value.to_vec(), move |res| done.complete(res));
    ticket.wait()
}

/// Reads a value and blocks for the outcome.
pub fn get_wait(db: &Database, key: &[u8]) -> StoreResult<Vec<u8>> {
    let (ticket, done) = Ticket::new();
    db.get(key.to_vec(), move |res| done.complete(res));
    ticket.wait()
}

/// Deletes a key and blocks for the outcome.
pub fn delete_wait(db: &Database, key: &[u8]) -> StoreResult<()> {
    let (ticket, done) = Ticket::new();
    db.delete(key.to_vec(), move |res| done.complete(res));
    ticket.wait()
}

/// Applies a batch and blocks for the outcome.
pub fn batch_wait(db: &Database, batch: Batch) -> StoreResult<()> {
    let (ticket, done) = Ticket::new();
    db.batch(batch, move |res| done.complete(res));
    ticket.wait()
}

/// Closes a database and blocks for the outcome.
pub fn close_wait(db: &Database) -> StoreResult<()> {
    let (ticket, done) = Ticket::new();
    db.close(move |res| done.complete(res));
    ticket.wait()
}

/// Destroys a closed database and blocks for the outcome.
pub fn destroy_wait(db: &Database) -> StoreResult<()> {
    let (ticket, done) = Ticket::new();
    db.destroy(move |res| done.complete(res));
    ticket.wait()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temp_db_roundtrip() {
        with_temp_db(|db| {
            put_wait(db, b"k", b"v").unwrap();
            assert_eq!(get_wait(db, b"k").unwrap(), b"v");
        });
    }

    #[test]
    fn temp_db_is_isolated() {
        with_temp_db(|db| {
            assert!(get_wait(db, b"k").unwrap_err().is_not_found());
        });
    }
}
