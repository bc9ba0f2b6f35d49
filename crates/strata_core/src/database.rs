//! Database handle and operation dispatcher.
//!
//! A [`Database`] represents one logical database bound to a filesystem
//! path. Callers submit operations that never block the calling thread;
//! each operation becomes a job on the worker pool, runs against the
//! engine, and reports its outcome through a continuation invoked exactly
//! once.
//!
//! The handle owns a lifecycle state machine:
//!
//! ```text
//! Closed → Opening → Open → Closing → Closed
//! ```
//!
//! A failed open returns to `Closed`; a failed close returns to `Open`
//! (close is retryable). Operations other than open/close are accepted
//! only while `Open` and rejected synchronously otherwise. Operations
//! accepted before a close always finish before the engine is released;
//! operations arriving after are always rejected. There is no window in
//! which a request is silently dropped or executed against a torn-down
//! engine.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};
use tracing::{debug, trace, warn};

use strata_engine::{Batch, Config, Engine, EngineHandle, ReadOptions, WriteOptions};

use crate::pool::WorkerPool;
use crate::status::{Status, StoreResult};

/// Lifecycle state of a database handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// No engine instance exists.
    Closed,
    /// An open request is executing.
    Opening,
    /// The engine is available for operations.
    Open,
    /// A close request is executing; new operations are rejected.
    Closing,
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Closed => "closed",
            Self::Opening => "opening",
            Self::Open => "open",
            Self::Closing => "closing",
        };
        write!(f, "{name}")
    }
}

/// Boxed continuation for an operation producing `T`.
type OnDone<T> = Box<dyn FnOnce(StoreResult<T>) + Send + 'static>;

/// Keeps a continuation reachable from both the job that will normally
/// invoke it and the submission path, which must still be able to reject
/// it if the pool refuses the job. Whichever side takes it first delivers
/// the single terminal notification.
type Slot<T> = Arc<Mutex<Option<OnDone<T>>>>;

struct DbState {
    lifecycle: Lifecycle,
    /// The engine instance. `Some` exactly while `Open` or `Closing`
    /// (until a close succeeds). Workers receive per-job clones and never
    /// retain them past a single job.
    engine: Option<Arc<dyn EngineHandle>>,
    /// Operations admitted but not yet finished against the engine.
    in_flight: usize,
    /// True while a close job is executing the engine's close. Serializes
    /// concurrent close retries so the engine close is never entered
    /// twice at once.
    close_active: bool,
    /// Incremented on every successful open. A close job captures the
    /// epoch at submission so a stale retry cannot tear down a database
    /// that was closed and reopened while the retry was queued.
    epoch: u64,
}

struct DatabaseInner {
    path: PathBuf,
    engine: Box<dyn Engine>,
    pool: Arc<WorkerPool>,
    state: Mutex<DbState>,
    /// Signalled whenever `in_flight` drops to zero.
    idle: Condvar,
    /// Monotonic per-handle submission counter, for tracing.
    submissions: AtomicU64,
}

impl DatabaseInner {
    fn next_seq(&self) -> u64 {
        self.submissions.fetch_add(1, Ordering::Relaxed)
    }

    fn finish_op(&self) {
        let mut state = self.state.lock();
        state.in_flight -= 1;
        if state.in_flight == 0 {
            self.idle.notify_all();
        }
    }
}

impl Drop for DatabaseInner {
    fn drop(&mut self) {
        // Jobs hold a clone of this Arc, so reaching Drop means no
        // operation is in flight; a best-effort close keeps recent writes
        // durable for callers that forgot to close.
        let engine = {
            let mut state = self.state.lock();
            state.engine.take()
        };
        if let Some(engine) = engine {
            warn!(path = %self.path.display(), "database dropped while open");
            if let Err(err) = engine.close() {
                warn!(path = %self.path.display(), error = %err, "close on drop failed");
            }
        }
    }
}

/// A handle to one logical database.
///
/// Cloning is cheap and all clones refer to the same handle. Operations
/// are fire-and-forget: they return immediately and deliver their result
/// to the supplied continuation on a worker thread. Continuations for
/// requests rejected before submission (lifecycle violations) run
/// synchronously on the calling thread.
///
/// # Example
///
/// ```rust,ignore
/// use strata_core::{Database, Ticket};
/// use strata_engine::{Config, LogEngine};
///
/// let db = Database::new("/var/lib/mystore", LogEngine::new());
/// let (ticket, done) = Ticket::new();
/// db.open(Config::default(), move |res| done.complete(res));
/// ticket.wait()?;
/// ```
#[derive(Clone)]
pub struct Database {
    inner: Arc<DatabaseInner>,
}

impl Database {
    /// Creates a handle in the `Closed` state with its own worker pool.
    pub fn new(path: impl Into<PathBuf>, engine: impl Engine + 'static) -> Self {
        Self::with_pool(path, engine, Arc::new(WorkerPool::new()))
    }

    /// Creates a handle in the `Closed` state sharing an existing pool.
    ///
    /// The pool must outlive all use of the handle; operations submitted
    /// after the pool is shut down are rejected with an invalid-state
    /// error.
    pub fn with_pool(
        path: impl Into<PathBuf>,
        engine: impl Engine + 'static,
        pool: Arc<WorkerPool>,
    ) -> Self {
        Self {
            inner: Arc::new(DatabaseInner {
                path: path.into(),
                engine: Box::new(engine),
                pool,
                state: Mutex::new(DbState {
                    lifecycle: Lifecycle::Closed,
                    engine: None,
                    in_flight: 0,
                    close_active: false,
                    epoch: 0,
                }),
                idle: Condvar::new(),
                submissions: AtomicU64::new(0),
            }),
        }
    }

    /// Returns the filesystem path this handle is bound to.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// Returns true while the handle is in the `Open` state.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.inner.state.lock().lifecycle == Lifecycle::Open
    }

    /// Returns the current lifecycle state.
    #[must_use]
    pub fn lifecycle(&self) -> Lifecycle {
        self.inner.state.lock().lifecycle
    }

    /// Opens the database.
    ///
    /// Legal only from `Closed`; an open or opening handle rejects the
    /// request immediately with an invalid-state error (no queuing). On
    /// success the handle moves to `Open`; on failure it returns to
    /// `Closed` with the classified error.
    pub fn open(&self, config: Config, on_done: impl FnOnce(StoreResult<()>) + Send + 'static) {
        let seq = self.inner.next_seq();
        let inner = Arc::clone(&self.inner);
        let slot = new_slot(on_done);
        let job_slot = Arc::clone(&slot);
        let job = move || {
            let Some(cb) = job_slot.lock().take() else { return };
            let result = inner.engine.open(&inner.path, &config);
            let mut state = inner.state.lock();
            match result {
                Ok(handle) => {
                    state.lifecycle = Lifecycle::Open;
                    state.engine = Some(Arc::from(handle));
                    state.epoch += 1;
                    drop(state);
                    debug!(seq, path = %inner.path.display(), "database opened");
                    cb(Ok(()));
                }
                Err(err) => {
                    state.lifecycle = Lifecycle::Closed;
                    drop(state);
                    warn!(seq, path = %inner.path.display(), error = %err, "open failed");
                    cb(Err(err.into()));
                }
            }
        };

        let mut state = self.inner.state.lock();
        if state.lifecycle != Lifecycle::Closed {
            let current = state.lifecycle;
            drop(state);
            reject(&slot, Status::invalid_state(format!(
                "cannot open: database is {current}"
            )));
            return;
        }
        state.lifecycle = Lifecycle::Opening;
        trace!(seq, "submitting open");
        let accepted = self.inner.pool.submit(job);
        drop(state);

        if !accepted {
            let mut state = self.inner.state.lock();
            if state.lifecycle == Lifecycle::Opening {
                state.lifecycle = Lifecycle::Closed;
            }
            drop(state);
            reject(&slot, Status::invalid_state("worker pool is shut down"));
        }
    }

    /// Reads the value stored under `key` with default read options.
    ///
    /// An absent key reports a not-found error, never success with an
    /// empty payload.
    pub fn get(
        &self,
        key: impl Into<Vec<u8>>,
        on_result: impl FnOnce(StoreResult<Vec<u8>>) + Send + 'static,
    ) {
        self.get_with(key, ReadOptions::default(), on_result);
    }

    /// Reads the value stored under `key` with explicit read options.
    pub fn get_with(
        &self,
        key: impl Into<Vec<u8>>,
        options: ReadOptions,
        on_result: impl FnOnce(StoreResult<Vec<u8>>) + Send + 'static,
    ) {
        let key = key.into();
        self.submit_op("get", Box::new(on_result), move |engine| {
            engine.get(&key, &options).map_err(Status::from)
        });
    }

    /// Stores `value` under `key` with default write options.
    pub fn put(
        &self,
        key: impl Into<Vec<u8>>,
        value: impl Into<Vec<u8>>,
        on_done: impl FnOnce(StoreResult<()>) + Send + 'static,
    ) {
        self.put_with(key, value, WriteOptions::default(), on_done);
    }

    /// Stores `value` under `key` with explicit write options.
    pub fn put_with(
        &self,
        key: impl Into<Vec<u8>>,
        value: impl Into<Vec<u8>>,
        options: WriteOptions,
        on_done: impl FnOnce(StoreResult<()>) + Send + 'static,
    ) {
        let batch = Batch::single_put(key.into(), value.into());
        self.submit_op("put", Box::new(on_done), move |engine| {
            engine.write(&batch, &options).map_err(Status::from)
        });
    }

    /// Removes `key` with default write options.
    ///
    /// Deleting an absent key is a success, not an error.
    pub fn delete(
        &self,
        key: impl Into<Vec<u8>>,
        on_done: impl FnOnce(StoreResult<()>) + Send + 'static,
    ) {
        self.delete_with(key, WriteOptions::default(), on_done);
    }

    /// Removes `key` with explicit write options.
    pub fn delete_with(
        &self,
        key: impl Into<Vec<u8>>,
        options: WriteOptions,
        on_done: impl FnOnce(StoreResult<()>) + Send + 'static,
    ) {
        let batch = Batch::single_delete(key.into());
        self.submit_op("delete", Box::new(on_done), move |engine| {
            engine.write(&batch, &options).map_err(Status::from)
        });
    }

    /// Applies a batch atomically with default write options.
    ///
    /// An empty batch is legal and applies as a no-op success.
    pub fn batch(&self, batch: Batch, on_done: impl FnOnce(StoreResult<()>) + Send + 'static) {
        self.batch_with(batch, WriteOptions::default(), on_done);
    }

    /// Applies a batch atomically with explicit write options.
    pub fn batch_with(
        &self,
        batch: Batch,
        options: WriteOptions,
        on_done: impl FnOnce(StoreResult<()>) + Send + 'static,
    ) {
        self.submit_op("batch", Box::new(on_done), move |engine| {
            engine.write(&batch, &options).map_err(Status::from)
        });
    }

    /// Closes the database.
    ///
    /// Legal from `Open`, or from `Closing` as an idempotent retry. The
    /// engine is released only after every operation accepted before this
    /// close has finished; operations arriving later are rejected. On
    /// failure the handle returns to `Open` and close may be retried.
    pub fn close(&self, on_done: impl FnOnce(StoreResult<()>) + Send + 'static) {
        let seq = self.inner.next_seq();
        let inner = Arc::clone(&self.inner);
        let slot = new_slot(on_done);
        let job_slot = Arc::clone(&slot);

        let mut state = self.inner.state.lock();
        match state.lifecycle {
            Lifecycle::Open => state.lifecycle = Lifecycle::Closing,
            Lifecycle::Closing => {} // retry of an in-progress close
            current @ (Lifecycle::Closed | Lifecycle::Opening) => {
                drop(state);
                reject(&slot, Status::invalid_state(format!(
                    "cannot close: database is {current}"
                )));
                return;
            }
        }
        let epoch = state.epoch;
        let job = move || {
            let Some(cb) = job_slot.lock().take() else { return };
            // Wait for every operation admitted before this close to
            // finish; the engine must never be torn down under a live
            // worker. Re-assert Closing on each wakeup: a concurrent close
            // retry may have failed meanwhile and reverted to Open.
            let engine = {
                let mut state = inner.state.lock();
                loop {
                    if state.epoch != epoch {
                        // The session this close targeted was already
                        // released and the database reopened meanwhile.
                        drop(state);
                        cb(Ok(()));
                        return;
                    }
                    if matches!(state.lifecycle, Lifecycle::Open | Lifecycle::Closing) {
                        state.lifecycle = Lifecycle::Closing;
                    }
                    if state.in_flight == 0 && !state.close_active {
                        break;
                    }
                    inner.idle.wait(&mut state);
                }
                match state.engine.clone() {
                    Some(engine) => {
                        state.close_active = true;
                        engine
                    }
                    None => {
                        // A concurrent close already released the engine.
                        if state.lifecycle == Lifecycle::Closing {
                            state.lifecycle = Lifecycle::Closed;
                        }
                        drop(state);
                        cb(Ok(()));
                        return;
                    }
                }
            };

            let result = engine.close();
            {
                let mut state = inner.state.lock();
                state.close_active = false;
                match &result {
                    Ok(()) => {
                        state.engine = None;
                        state.lifecycle = Lifecycle::Closed;
                    }
                    Err(_) => {
                        state.lifecycle = Lifecycle::Open;
                    }
                }
                // Wake close retries parked on the serialization flag.
                inner.idle.notify_all();
            }
            match result {
                Ok(()) => {
                    debug!(seq, path = %inner.path.display(), "database closed");
                    cb(Ok(()));
                }
                Err(err) => {
                    warn!(seq, path = %inner.path.display(), error = %err, "close failed");
                    cb(Err(err.into()));
                }
            }
        };
        trace!(seq, "submitting close");
        let accepted = self.inner.pool.submit(job);
        drop(state);

        if !accepted {
            let mut state = self.inner.state.lock();
            if state.lifecycle == Lifecycle::Closing {
                state.lifecycle = if state.engine.is_some() {
                    Lifecycle::Open
                } else {
                    Lifecycle::Closed
                };
            }
            drop(state);
            reject(&slot, Status::invalid_state("worker pool is shut down"));
        }
    }

    /// Removes all state of the database at this handle's path.
    ///
    /// Legal only while `Closed`.
    pub fn destroy(&self, on_done: impl FnOnce(StoreResult<()>) + Send + 'static) {
        let seq = self.inner.next_seq();
        {
            let state = self.inner.state.lock();
            if state.lifecycle != Lifecycle::Closed {
                let current = state.lifecycle;
                drop(state);
                on_done(Err(Status::invalid_state(format!(
                    "cannot destroy: database is {current}"
                ))));
                return;
            }
        }
        trace!(seq, "submitting destroy");

        let inner = Arc::clone(&self.inner);
        let slot = new_slot(on_done);
        let job_slot = Arc::clone(&slot);
        let accepted = self.inner.pool.submit(move || {
            if let Some(cb) = job_slot.lock().take() {
                cb(inner.engine.destroy(&inner.path).map_err(Status::from));
            }
        });
        if !accepted {
            reject(&slot, Status::invalid_state("worker pool is shut down"));
        }
    }

    /// Returns an engine introspection property.
    ///
    /// Synchronous: property lookups do not touch disk. Returns `None`
    /// for property names the engine does not recognize.
    ///
    /// # Errors
    ///
    /// Returns an invalid-state error unless the database is `Open`.
    pub fn property(&self, name: &str) -> StoreResult<Option<String>> {
        let state = self.inner.state.lock();
        if state.lifecycle != Lifecycle::Open {
            return Err(Status::invalid_state(format!(
                "cannot read property: database is {}",
                state.lifecycle
            )));
        }
        let engine = state.engine.clone();
        drop(state);
        Ok(engine.and_then(|engine| engine.property(name)))
    }

    /// Admits and dispatches a get/put/delete/batch operation.
    ///
    /// Admission (lifecycle check, in-flight increment) and queue
    /// insertion happen under one state lock, so the FIFO queue order
    /// matches admission order: every operation admitted before a close
    /// is queued ahead of the close job. The job fetches the engine at
    /// execution time; a nonzero in-flight count keeps the close-wait
    /// rule from releasing it in the meantime.
    fn submit_op<T: 'static>(
        &self,
        op: &'static str,
        on_done: OnDone<T>,
        work: impl FnOnce(&dyn EngineHandle) -> StoreResult<T> + Send + 'static,
    ) {
        let seq = self.inner.next_seq();
        let inner = Arc::clone(&self.inner);
        let slot = new_slot_boxed(on_done);
        let job_slot = Arc::clone(&slot);
        let job = move || {
            let Some(cb) = job_slot.lock().take() else { return };
            trace!(seq, "executing operation");
            let engine = inner.state.lock().engine.clone();
            let result = match engine {
                Some(engine) => work(engine.as_ref()),
                None => Err(Status::invalid_state("engine is not available")),
            };
            inner.finish_op();
            cb(result);
        };

        let mut state = self.inner.state.lock();
        if state.lifecycle != Lifecycle::Open {
            let current = state.lifecycle;
            drop(state);
            reject(&slot, Status::invalid_state(format!(
                "cannot {op}: database is {current}"
            )));
            return;
        }
        state.in_flight += 1;
        trace!(seq, op, "submitting operation");
        let accepted = self.inner.pool.submit(job);
        drop(state);

        if !accepted {
            self.inner.finish_op();
            reject(&slot, Status::invalid_state("worker pool is shut down"));
        }
    }
}

fn new_slot<T, F>(on_done: F) -> Slot<T>
where
    F: FnOnce(StoreResult<T>) + Send + 'static,
{
    Arc::new(Mutex::new(Some(Box::new(on_done) as OnDone<T>)))
}

fn new_slot_boxed<T>(on_done: OnDone<T>) -> Slot<T> {
    Arc::new(Mutex::new(Some(on_done)))
}

/// Delivers a rejection through the slot, if the job hasn't already won.
fn reject<T>(slot: &Slot<T>, status: Status) {
    if let Some(cb) = slot.lock().take() {
        cb(Err(status));
    }
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("Database")
            .field("path", &self.inner.path)
            .field("lifecycle", &state.lifecycle)
            .field("in_flight", &state.in_flight)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ticket::Ticket;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize};
    use std::sync::mpsc::{self, Receiver, Sender};
    use std::time::Duration;

    use parking_lot::RwLock;
    use strata_engine::{BatchBuilder, BatchOp, EngineError, EngineResult, MemoryEngine};

    /// Observable, scriptable engine for dispatcher tests.
    #[derive(Default)]
    struct ProbeState {
        get_calls: AtomicUsize,
        write_calls: AtomicUsize,
        close_calls: AtomicUsize,
        closed: AtomicBool,
        /// Remaining open attempts that fail.
        fail_opens: AtomicUsize,
        /// Remaining close attempts that fail.
        fail_closes: AtomicUsize,
        /// Next gated call blocks until the sender side fires.
        open_gate: Mutex<Option<Receiver<()>>>,
        get_gate: Mutex<Option<Receiver<()>>>,
    }

    #[derive(Default)]
    struct ProbeEngine {
        state: Arc<ProbeState>,
    }

    impl ProbeEngine {
        fn new() -> (Self, Arc<ProbeState>) {
            let state = Arc::new(ProbeState::default());
            (
                Self {
                    state: Arc::clone(&state),
                },
                state,
            )
        }
    }

    impl ProbeState {
        fn gate_next_open(&self) -> Sender<()> {
            let (tx, rx) = mpsc::channel();
            *self.open_gate.lock() = Some(rx);
            tx
        }

        fn gate_next_get(&self) -> Sender<()> {
            let (tx, rx) = mpsc::channel();
            *self.get_gate.lock() = Some(rx);
            tx
        }

        fn take_failure(counter: &AtomicUsize) -> bool {
            counter
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
        }
    }

    impl Engine for ProbeEngine {
        fn open(&self, _path: &Path, _config: &Config) -> EngineResult<Box<dyn EngineHandle>> {
            if let Some(gate) = self.state.open_gate.lock().take() {
                let _ = gate.recv();
            }
            if ProbeState::take_failure(&self.state.fail_opens) {
                return Err(EngineError::Io(std::io::Error::other(
                    "injected open failure",
                )));
            }
            Ok(Box::new(ProbeHandle {
                state: Arc::clone(&self.state),
                table: RwLock::new(BTreeMap::new()),
            }))
        }

        fn destroy(&self, _path: &Path) -> EngineResult<()> {
            Ok(())
        }
    }

    struct ProbeHandle {
        state: Arc<ProbeState>,
        table: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
    }

    impl EngineHandle for ProbeHandle {
        fn get(&self, key: &[u8], _options: &ReadOptions) -> EngineResult<Vec<u8>> {
            self.state.get_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = self.state.get_gate.lock().take() {
                let _ = gate.recv();
            }
            self.table
                .read()
                .get(key)
                .cloned()
                .ok_or(EngineError::NotFound)
        }

        fn write(&self, batch: &Batch, _options: &WriteOptions) -> EngineResult<()> {
            self.state.write_calls.fetch_add(1, Ordering::SeqCst);
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
            (name == "probe.entries").then(|| self.table.read().len().to_string())
        }

        fn close(&self) -> EngineResult<()> {
            self.state.close_calls.fetch_add(1, Ordering::SeqCst);
            if ProbeState::take_failure(&self.state.fail_closes) {
                return Err(EngineError::Io(std::io::Error::other(
                    "injected close failure",
                )));
            }
            self.state.closed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    fn open_db(db: &Database) {
        let (ticket, done) = Ticket::new();
        db.open(Config::default(), move |res| done.complete(res));
        ticket.wait().unwrap();
    }

    fn put_wait(db: &Database, key: &[u8], value: &[u8]) {
        let (ticket, done) = Ticket::new();
        db.put(key.to_vec(), value.to_vec(), move |res| done.complete(res));
        ticket.wait().unwrap();
    }

    fn get_wait(db: &Database, key: &[u8]) -> StoreResult<Vec<u8>> {
        let (ticket, done) = Ticket::new();
        db.get(key.to_vec(), move |res| done.complete(res));
        ticket.wait()
    }

    fn close_wait(db: &Database) -> StoreResult<()> {
        let (ticket, done) = Ticket::new();
        db.close(move |res| done.complete(res));
        ticket.wait()
    }

    #[test]
    fn starts_closed() {
        let db = Database::new("probe", MemoryEngine::new());
        assert_eq!(db.lifecycle(), Lifecycle::Closed);
        assert!(!db.is_open());
        assert_eq!(db.path(), Path::new("probe"));
    }

    #[test]
    fn open_then_close() {
        let db = Database::new("probe", MemoryEngine::new());
        open_db(&db);
        assert!(db.is_open());
        close_wait(&db).unwrap();
        assert_eq!(db.lifecycle(), Lifecycle::Closed);
    }

    #[test]
    fn operations_while_closed_are_rejected_without_engine_calls() {
        let (engine, state) = ProbeEngine::new();
        let db = Database::new("probe", engine);

        let err = get_wait(&db, b"k").unwrap_err();
        assert!(err.is_invalid_state());

        let (ticket, done) = Ticket::new();
        db.put(b"k".to_vec(), b"v".to_vec(), move |res| done.complete(res));
        assert!(ticket.wait().unwrap_err().is_invalid_state());

        let (ticket, done) = Ticket::new();
        db.delete(b"k".to_vec(), move |res| done.complete(res));
        assert!(ticket.wait().unwrap_err().is_invalid_state());

        let (ticket, done) = Ticket::new();
        db.batch(BatchBuilder::new().build().unwrap(), move |res| {
            done.complete(res)
        });
        assert!(ticket.wait().unwrap_err().is_invalid_state());

        assert_eq!(state.get_calls.load(Ordering::SeqCst), 0);
        assert_eq!(state.write_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn open_while_open_is_rejected() {
        let db = Database::new("probe", MemoryEngine::new());
        open_db(&db);

        let (ticket, done) = Ticket::new();
        db.open(Config::default(), move |res| done.complete(res));
        assert!(ticket.wait().unwrap_err().is_invalid_state());
        assert!(db.is_open());
    }

    #[test]
    fn open_while_opening_is_rejected() {
        let (engine, state) = ProbeEngine::new();
        let gate = state.gate_next_open();
        let db = Database::new("probe", engine);

        let (first, first_done) = Ticket::new();
        db.open(Config::default(), move |res| first_done.complete(res));

        // The first open is parked inside the engine; a second must fail
        // immediately rather than queue.
        let (second, second_done) = Ticket::new();
        db.open(Config::default(), move |res| second_done.complete(res));
        assert!(second.wait().unwrap_err().is_invalid_state());

        gate.send(()).unwrap();
        first.wait().unwrap();
        assert!(db.is_open());
    }

    #[test]
    fn operations_while_opening_are_rejected() {
        let (engine, state) = ProbeEngine::new();
        let gate = state.gate_next_open();
        let db = Database::new("probe", engine);

        let (open_ticket, open_done) = Ticket::new();
        db.open(Config::default(), move |res| open_done.complete(res));

        let err = get_wait(&db, b"k").unwrap_err();
        assert!(err.is_invalid_state());
        assert_eq!(state.get_calls.load(Ordering::SeqCst), 0);

        gate.send(()).unwrap();
        open_ticket.wait().unwrap();
    }

    #[test]
    fn failed_open_returns_to_closed_and_is_retryable() {
        let (engine, state) = ProbeEngine::new();
        state.fail_opens.store(1, Ordering::SeqCst);
        let db = Database::new("probe", engine);

        let (ticket, done) = Ticket::new();
        db.open(Config::default(), move |res| done.complete(res));
        assert!(ticket.wait().unwrap_err().is_io_error());
        assert_eq!(db.lifecycle(), Lifecycle::Closed);

        open_db(&db);
        assert!(db.is_open());
    }

    #[test]
    fn put_get_delete_roundtrip() {
        let db = Database::new("probe", MemoryEngine::new());
        open_db(&db);

        put_wait(&db, b"k", b"v");
        assert_eq!(get_wait(&db, b"k").unwrap(), b"v");

        let (ticket, done) = Ticket::new();
        db.delete(b"k".to_vec(), move |res| done.complete(res));
        ticket.wait().unwrap();

        assert!(get_wait(&db, b"k").unwrap_err().is_not_found());
    }

    #[test]
    fn get_missing_reports_not_found() {
        let db = Database::new("probe", MemoryEngine::new());
        open_db(&db);
        assert!(get_wait(&db, b"missing").unwrap_err().is_not_found());
    }

    #[test]
    fn delete_of_absent_key_succeeds() {
        let db = Database::new("probe", MemoryEngine::new());
        open_db(&db);

        let (ticket, done) = Ticket::new();
        db.delete(b"never-put".to_vec(), move |res| done.complete(res));
        ticket.wait().unwrap();
    }

    #[test]
    fn batch_applies_atomically_in_order() {
        let db = Database::new("probe", MemoryEngine::new());
        open_db(&db);

        put_wait(&db, b"a", b"0");
        let batch = BatchBuilder::new()
            .put(b"a".to_vec(), b"1".to_vec())
            .put(b"b".to_vec(), b"2".to_vec())
            .delete(b"a".to_vec())
            .build()
            .unwrap();

        let (ticket, done) = Ticket::new();
        db.batch(batch, move |res| done.complete(res));
        ticket.wait().unwrap();

        assert!(get_wait(&db, b"a").unwrap_err().is_not_found());
        assert_eq!(get_wait(&db, b"b").unwrap(), b"2");
    }

    #[test]
    fn empty_batch_succeeds() {
        let db = Database::new("probe", MemoryEngine::new());
        open_db(&db);

        let (ticket, done) = Ticket::new();
        db.batch(BatchBuilder::new().build().unwrap(), move |res| {
            done.complete(res)
        });
        ticket.wait().unwrap();
    }

    #[test]
    fn close_waits_for_in_flight_operations() {
        let (engine, state) = ProbeEngine::new();
        let db = Database::new("probe", engine);
        open_db(&db);
        put_wait(&db, b"k", b"v");

        let gate = state.gate_next_get();
        let (get_ticket, get_done) = Ticket::new();
        db.get(b"k".to_vec(), move |res| get_done.complete(res));

        let (close_ticket, close_done) = Ticket::new();
        db.close(move |res| close_done.complete(res));

        // The close must not finish while the get is parked in the engine.
        std::thread::sleep(Duration::from_millis(100));
        assert!(!state.closed.load(Ordering::SeqCst));
        assert_eq!(db.lifecycle(), Lifecycle::Closing);

        gate.send(()).unwrap();
        assert_eq!(get_ticket.wait().unwrap(), b"v");
        close_ticket.wait().unwrap();
        assert!(state.closed.load(Ordering::SeqCst));
        assert_eq!(db.lifecycle(), Lifecycle::Closed);
    }

    #[test]
    fn operations_after_close_accepted_are_rejected() {
        let (engine, state) = ProbeEngine::new();
        let db = Database::new("probe", engine);
        open_db(&db);
        put_wait(&db, b"k", b"v");

        // Park a get so the close stays in Closing.
        let gate = state.gate_next_get();
        let (get_ticket, get_done) = Ticket::new();
        db.get(b"k".to_vec(), move |res| get_done.complete(res));

        let (close_ticket, close_done) = Ticket::new();
        db.close(move |res| close_done.complete(res));
        assert_eq!(db.lifecycle(), Lifecycle::Closing);

        let writes_before = state.write_calls.load(Ordering::SeqCst);
        let (put_ticket, put_done) = Ticket::new();
        db.put(b"late".to_vec(), b"x".to_vec(), move |res| {
            put_done.complete(res)
        });
        assert!(put_ticket.wait().unwrap_err().is_invalid_state());
        assert_eq!(state.write_calls.load(Ordering::SeqCst), writes_before);

        gate.send(()).unwrap();
        get_ticket.wait().unwrap();
        close_ticket.wait().unwrap();
    }

    #[test]
    fn failed_close_returns_to_open_and_is_retryable() {
        let (engine, state) = ProbeEngine::new();
        state.fail_closes.store(1, Ordering::SeqCst);
        let db = Database::new("probe", engine);
        open_db(&db);
        put_wait(&db, b"k", b"v");

        assert!(close_wait(&db).unwrap_err().is_io_error());
        assert!(db.is_open());
        assert!(!state.closed.load(Ordering::SeqCst));

        // The handle is still fully usable.
        assert_eq!(get_wait(&db, b"k").unwrap(), b"v");

        // Retry succeeds and releases the engine exactly once.
        close_wait(&db).unwrap();
        assert!(state.closed.load(Ordering::SeqCst));
        assert_eq!(db.lifecycle(), Lifecycle::Closed);
    }

    #[test]
    fn close_while_closed_is_rejected() {
        let db = Database::new("probe", MemoryEngine::new());
        assert!(close_wait(&db).unwrap_err().is_invalid_state());

        open_db(&db);
        close_wait(&db).unwrap();
        assert!(close_wait(&db).unwrap_err().is_invalid_state());
    }

    #[test]
    fn reopen_after_close() {
        let db = Database::new("probe", MemoryEngine::new());
        open_db(&db);
        close_wait(&db).unwrap();
        open_db(&db);
        assert!(db.is_open());
    }

    #[test]
    fn property_requires_open() {
        let (engine, _state) = ProbeEngine::new();
        let db = Database::new("probe", engine);
        assert!(db.property("probe.entries").unwrap_err().is_invalid_state());

        open_db(&db);
        assert_eq!(db.property("probe.entries").unwrap().as_deref(), Some("0"));
        assert_eq!(db.property("unknown").unwrap(), None);
    }

    #[test]
    fn destroy_requires_closed() {
        let db = Database::new("probe", MemoryEngine::new());
        open_db(&db);

        let (ticket, done) = Ticket::new();
        db.destroy(move |res| done.complete(res));
        assert!(ticket.wait().unwrap_err().is_invalid_state());

        close_wait(&db).unwrap();
        let (ticket, done) = Ticket::new();
        db.destroy(move |res| done.complete(res));
        ticket.wait().unwrap();
    }

    #[test]
    fn continuations_run_off_the_calling_thread() {
        let db = Database::new("probe", MemoryEngine::new());
        open_db(&db);

        let (ticket, done) = Ticket::new();
        let caller = std::thread::current().id();
        db.put(b"k".to_vec(), b"v".to_vec(), move |res| {
            done.complete(res.map(|()| std::thread::current().id()));
        });
        let worker = ticket.wait().unwrap();
        assert_ne!(worker, caller);
    }

    #[test]
    fn concurrent_writers_all_complete() {
        let db = Database::new("probe", MemoryEngine::new());
        open_db(&db);

        let tickets: Vec<_> = (0..64)
            .map(|i: u32| {
                let (ticket, done) = Ticket::new();
                db.put(
                    format!("key-{i}").into_bytes(),
                    i.to_le_bytes().to_vec(),
                    move |res| done.complete(res),
                );
                ticket
            })
            .collect();
        for ticket in tickets {
            ticket.wait().unwrap();
        }

        for i in 0..64u32 {
            let value = get_wait(&db, format!("key-{i}").as_bytes()).unwrap();
            assert_eq!(value, i.to_le_bytes());
        }
    }

    #[test]
    fn single_worker_pool_cannot_deadlock_close_behind_operations() {
        // With one worker the close job shares a thread with every
        // operation job; admitted operations must drain first.
        let pool = Arc::new(WorkerPool::with_workers(1));
        let db = Database::with_pool("probe", MemoryEngine::new(), pool);
        open_db(&db);

        let tickets: Vec<_> = (0..8)
            .map(|i: u32| {
                let (ticket, done) = Ticket::new();
                db.put(format!("k{i}").into_bytes(), b"v".to_vec(), move |res| {
                    done.complete(res)
                });
                ticket
            })
            .collect();

        let (close_ticket, close_done) = Ticket::new();
        db.close(move |res| close_done.complete(res));

        for ticket in tickets {
            ticket.wait().unwrap();
        }
        close_ticket.wait().unwrap();
        assert_eq!(db.lifecycle(), Lifecycle::Closed);
    }

    #[test]
    fn drop_while_open_closes_engine() {
        let (engine, state) = ProbeEngine::new();
        {
            let db = Database::new("probe", engine);
            open_db(&db);
        }
        assert!(state.closed.load(Ordering::SeqCst));
        assert_eq!(state.close_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn shared_pool_serves_multiple_handles() {
        let pool = Arc::new(WorkerPool::with_workers(2));
        let db1 = Database::with_pool("one", MemoryEngine::new(), Arc::clone(&pool));
        let db2 = Database::with_pool("two", MemoryEngine::new(), Arc::clone(&pool));

        open_db(&db1);
        open_db(&db2);
        put_wait(&db1, b"k", b"from-one");
        put_wait(&db2, b"k", b"from-two");

        assert_eq!(get_wait(&db1, b"k").unwrap(), b"from-one");
        assert_eq!(get_wait(&db2, b"k").unwrap(), b"from-two");

        close_wait(&db1).unwrap();
        close_wait(&db2).unwrap();
    }

    #[test]
    fn operations_on_shut_down_pool_are_rejected_not_lost() {
        let pool = Arc::new(WorkerPool::with_workers(1));
        let db = Database::with_pool("probe", MemoryEngine::new(), Arc::clone(&pool));
        open_db(&db);

        pool.shutdown();

        let (ticket, done) = Ticket::new();
        db.put(b"k".to_vec(), b"v".to_vec(), move |res| done.complete(res));
        assert!(ticket.wait().unwrap_err().is_invalid_state());
        // The rejected write must not leave the close-wait counter stuck.
        assert_eq!(db.inner.state.lock().in_flight, 0);
    }
}
