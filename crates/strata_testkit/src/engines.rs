//! Fault-injecting engine double.
//!
//! [`FaultEngine`] wraps any engine and injects scripted failures or
//! blocking gates at each of the four adapter calls. Dispatcher tests use
//! it to exercise classified error paths and the close-wait window
//! without disk involvement.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;

use parking_lot::Mutex;
use strata_engine::{
    Batch, Config, Engine, EngineError, EngineHandle, EngineResult, ReadOptions, WriteOptions,
};

/// Shared fault script consulted by a [`FaultEngine`] and its handles.
#[derive(Debug, Default)]
pub struct FaultPlan {
    fail_opens: AtomicUsize,
    fail_gets: AtomicUsize,
    fail_writes: AtomicUsize,
    fail_closes: AtomicUsize,
    get_gate: Mutex<Option<Receiver<()>>>,
    write_gate: Mutex<Option<Receiver<()>>>,
}

impl FaultPlan {
    /// Makes the next `n` open calls fail with an I/O error.
    pub fn fail_opens(&self, n: usize) {
        self.fail_opens.store(n, Ordering::SeqCst);
    }

    /// Makes the next `n` get calls fail with an I/O error.
    pub fn fail_gets(&self, n: usize) {
        self.fail_gets.store(n, Ordering::SeqCst);
    }

    /// Makes the next `n` write calls fail with an I/O error.
    pub fn fail_writes(&self, n: usize) {
        self.fail_writes.store(n, Ordering::SeqCst);
    }

    /// Makes the next `n` close calls fail with an I/O error.
    pub fn fail_closes(&self, n: usize) {
        self.fail_closes.store(n, Ordering::SeqCst);
    }

    /// Parks the next get call until the returned sender fires (or drops).
    pub fn gate_next_get(&self) -> Sender<()> {
        let (tx, rx) = mpsc::channel();
        *self.get_gate.lock() = Some(rx);
        tx
    }

    /// Parks the next write call until the returned sender fires (or drops).
    pub fn gate_next_write(&self) -> Sender<()> {
        let (tx, rx) = mpsc::channel();
        *self.write_gate.lock() = Some(rx);
        tx
    }

    fn take_failure(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn injected(op: &str) -> EngineError {
        EngineError::Io(std::io::Error::other(format!("injected {op} failure")))
    }
}

/// An engine wrapper driven by a [`FaultPlan`].
pub struct FaultEngine<E> {
    inner: E,
    plan: Arc<FaultPlan>,
}

impl<E: Engine> FaultEngine<E> {
    /// Wraps `inner`, returning the engine and its shared fault plan.
    pub fn new(inner: E) -> (Self, Arc<FaultPlan>) {
        let plan = Arc::new(FaultPlan::default());
        (
            Self {
                inner,
                plan: Arc::clone(&plan),
            },
            plan,
        )
    }
}

impl<E: Engine> Engine for FaultEngine<E> {
    fn open(&self, path: &Path, config: &Config) -> EngineResult<Box<dyn EngineHandle>> {
        if FaultPlan::take_failure(&self.plan.fail_opens) {
            return Err(FaultPlan::injected("open"));
        }
        let inner = self.inner.open(path, config)?;
        Ok(Box::new(FaultHandle {
            inner,
            plan: Arc::clone(&self.plan),
        }))
    }

    fn destroy(&self, path: &Path) -> EngineResult<()> {
        self.inner.destroy(path)
    }
}

struct FaultHandle {
    inner: Box<dyn EngineHandle>,
    plan: Arc<FaultPlan>,
}

impl EngineHandle for FaultHandle {
    fn get(&self, key: &[u8], options: &ReadOptions) -> EngineResult<Vec<u8>> {
        if let Some(gate) = self.plan.get_gate.lock().take() {
            let _ = gate.recv();
        }
        if FaultPlan::take_failure(&self.plan.fail_gets) {
            return Err(FaultPlan::injected("get"));
        }
        self.inner.get(key, options)
    }

    fn write(&self, batch: &Batch, options: &WriteOptions) -> EngineResult<()> {
        if let Some(gate) = self.plan.write_gate.lock().take() {
            let _ = gate.recv();
        }
        if FaultPlan::take_failure(&self.plan.fail_writes) {
            return Err(FaultPlan::injected("write"));
        }
        self.inner.write(batch, options)
    }

    fn property(&self, name: &str) -> Option<String> {
        self.inner.property(name)
    }

    fn close(&self) -> EngineResult<()> {
        if FaultPlan::take_failure(&self.plan.fail_closes) {
            return Err(FaultPlan::injected("close"));
        }
        self.inner.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_engine::MemoryEngine;

    #[test]
    fn injects_open_failures_then_recovers() {
        let (engine, plan) = FaultEngine::new(MemoryEngine::new());
        plan.fail_opens(1);

        assert!(engine.open(Path::new("p"), &Config::default()).is_err());
        assert!(engine.open(Path::new("p"), &Config::default()).is_ok());
    }

    #[test]
    fn injects_get_and_write_failures() {
        let (engine, plan) = FaultEngine::new(MemoryEngine::new());
        let db = engine.open(Path::new("p"), &Config::default()).unwrap();

        plan.fail_writes(1);
        let batch = Batch::single_put(b"k".to_vec(), b"v".to_vec());
        assert!(db.write(&batch, &WriteOptions::default()).is_err());
        db.write(&batch, &WriteOptions::default()).unwrap();

        plan.fail_gets(1);
        assert!(matches!(
            db.get(b"k", &ReadOptions::default()),
            Err(EngineError::Io(_))
        ));
        assert_eq!(db.get(b"k", &ReadOptions::default()).unwrap(), b"v");
    }

    #[test]
    fn passes_through_when_unscripted() {
        let (engine, _plan) = FaultEngine::new(MemoryEngine::new());
        let db = engine.open(Path::new("p"), &Config::default()).unwrap();

        db.write(
            &Batch::single_put(b"k".to_vec(), b"v".to_vec()),
            &WriteOptions::default(),
        )
        .unwrap();
        assert_eq!(db.get(b"k", &ReadOptions::default()).unwrap(), b"v");
        db.close().unwrap();
    }
}
