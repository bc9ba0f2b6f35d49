//! Lifecycle-gating and close-wait tests driven through the public
//! surface with a fault-injecting engine.

use std::time::Duration;

use strata_core::{Config, Database, Lifecycle, MemoryEngine, Ticket};
use strata_testkit::prelude::*;

fn fault_db() -> (Database, std::sync::Arc<FaultPlan>) {
    let (engine, plan) = FaultEngine::new(MemoryEngine::new());
    (Database::new("fault", engine), plan)
}

#[test]
fn operations_require_open() {
    let (db, _plan) = fault_db();

    assert!(get_wait(&db, b"k").unwrap_err().is_invalid_state());
    assert!(put_wait(&db, b"k", b"v").unwrap_err().is_invalid_state());
    assert!(delete_wait(&db, b"k").unwrap_err().is_invalid_state());
    assert!(close_wait(&db).unwrap_err().is_invalid_state());
}

#[test]
fn failed_open_leaves_handle_reusable() {
    let (db, plan) = fault_db();
    plan.fail_opens(1);

    let err = open_wait(&db, Config::default()).unwrap_err();
    assert!(err.is_io_error());
    assert_eq!(db.lifecycle(), Lifecycle::Closed);

    open_wait(&db, Config::default()).unwrap();
    put_wait(&db, b"k", b"v").unwrap();
    close_wait(&db).unwrap();
}

#[test]
fn write_failures_are_classified_and_nonfatal() {
    let (db, plan) = fault_db();
    open_wait(&db, Config::default()).unwrap();

    plan.fail_writes(1);
    assert!(put_wait(&db, b"k", b"v").unwrap_err().is_io_error());

    // The handle stays open and the next write goes through.
    assert!(db.is_open());
    put_wait(&db, b"k", b"v").unwrap();
    assert_eq!(get_wait(&db, b"k").unwrap(), b"v");
    close_wait(&db).unwrap();
}

#[test]
fn close_waits_for_parked_write() {
    let (db, plan) = fault_db();
    open_wait(&db, Config::default()).unwrap();

    let gate = plan.gate_next_write();
    let (write_ticket, write_done) = Ticket::new();
    db.put(b"slow".to_vec(), b"v".to_vec(), move |res| {
        write_done.complete(res)
    });

    let (close_ticket, close_done) = Ticket::new();
    db.close(move |res| close_done.complete(res));

    std::thread::sleep(Duration::from_millis(100));
    assert_eq!(db.lifecycle(), Lifecycle::Closing);

    gate.send(()).unwrap();
    write_ticket.wait().unwrap();
    close_ticket.wait().unwrap();
    assert_eq!(db.lifecycle(), Lifecycle::Closed);
}

#[test]
fn requests_after_close_are_rejected_while_earlier_ones_finish() {
    let (db, plan) = fault_db();
    open_wait(&db, Config::default()).unwrap();

    let gate = plan.gate_next_get();
    put_wait(&db, b"k", b"v").unwrap();

    let (get_ticket, get_done) = Ticket::new();
    db.get(b"k".to_vec(), move |res| get_done.complete(res));

    let (close_ticket, close_done) = Ticket::new();
    db.close(move |res| close_done.complete(res));

    // Submitted after the close was accepted: rejected, not queued.
    assert!(put_wait(&db, b"late", b"x").unwrap_err().is_invalid_state());

    gate.send(()).unwrap();
    assert_eq!(get_ticket.wait().unwrap(), b"v");
    close_ticket.wait().unwrap();
}

#[test]
fn failed_close_is_retryable_without_double_release() {
    let (db, plan) = fault_db();
    open_wait(&db, Config::default()).unwrap();
    put_wait(&db, b"k", b"v").unwrap();

    plan.fail_closes(1);
    assert!(close_wait(&db).unwrap_err().is_io_error());
    assert_eq!(db.lifecycle(), Lifecycle::Open);

    // Handle still serves reads between the attempts.
    assert_eq!(get_wait(&db, b"k").unwrap(), b"v");

    close_wait(&db).unwrap();
    assert_eq!(db.lifecycle(), Lifecycle::Closed);

    // A third close is a lifecycle violation, not a crash.
    assert!(close_wait(&db).unwrap_err().is_invalid_state());
}

#[test]
fn read_failures_are_classified() {
    let (db, plan) = fault_db();
    open_wait(&db, Config::default()).unwrap();
    put_wait(&db, b"k", b"v").unwrap();

    plan.fail_gets(1);
    let err = get_wait(&db, b"k").unwrap_err();
    assert!(err.is_io_error());
    assert!(!err.is_not_found());

    assert_eq!(get_wait(&db, b"k").unwrap(), b"v");
    close_wait(&db).unwrap();
}
