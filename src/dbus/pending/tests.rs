use {
    crate::dbus::{
        DbusError, Message,
        pending::{PendingCall, PendingCalls, Timeout},
    },
    std::{
        sync::Arc,
        thread,
        time::{Duration, Instant},
    },
};

fn reply() -> Message {
    let call = Message::method_call(None, "/", None, "Ping").unwrap();
    Message::method_return(&call)
}

fn call(pending: &Arc<PendingCalls>, serial: u32) -> PendingCall {
    let slot = pending.register(serial).unwrap().unwrap();
    PendingCall::new(serial, slot, pending.clone())
}

#[test]
fn reply_for_other_serial_keeps_call_pending() {
    let pending = Arc::new(PendingCalls::default());
    let c = call(&pending, 1);
    assert!(!pending.complete(2, Ok(reply())));
    assert!(c.try_take().is_none());
    assert_eq!(pending.len(), 1);
    assert!(pending.complete(1, Ok(reply())));
    assert_eq!(pending.len(), 0);
    assert!(c.try_take().unwrap().is_ok());
}

#[test]
fn wait_wakes_up_on_completion() {
    let pending = Arc::new(PendingCalls::default());
    let c = call(&pending, 7);
    let p2 = pending.clone();
    let t = thread::spawn(move || {
        thread::sleep(Duration::from_millis(20));
        assert!(p2.complete(7, Ok(reply())));
    });
    let res = c.wait(Timeout::Infinite);
    t.join().unwrap();
    assert!(res.is_ok());
}

#[test]
fn timeout_removes_call() {
    let pending = Arc::new(PendingCalls::default());
    let c = call(&pending, 3);
    let start = Instant::now();
    let res = c.wait(Timeout::After(Duration::from_millis(50)));
    let elapsed = start.elapsed();
    assert!(matches!(res, Err(DbusError::Timeout)));
    assert!(elapsed >= Duration::from_millis(50));
    assert!(elapsed < Duration::from_millis(500));
    assert_eq!(pending.len(), 0);
    assert!(!pending.complete(3, Ok(reply())));
}

#[test]
fn drop_cancels() {
    let pending = Arc::new(PendingCalls::default());
    let c = call(&pending, 4);
    assert_eq!(pending.len(), 1);
    c.cancel();
    assert_eq!(pending.len(), 0);
}

#[test]
fn stale_handle_does_not_remove_new_call() {
    let pending = Arc::new(PendingCalls::default());
    let old = call(&pending, 5);
    assert!(pending.complete(5, Ok(reply())));
    let new = call(&pending, 5);
    drop(old);
    assert_eq!(pending.len(), 1);
    drop(new);
    assert_eq!(pending.len(), 0);
}

#[test]
fn close_drains_everything() {
    let pending = Arc::new(PendingCalls::default());
    let calls: Vec<_> = (1..=3).map(|s| call(&pending, s)).collect();
    pending.close();
    assert_eq!(pending.len(), 0);
    for c in &calls {
        assert!(matches!(c.try_take(), Some(Err(DbusError::ConnectionClosed))));
    }
    assert!(matches!(
        pending.register(9),
        Err(DbusError::ConnectionClosed)
    ));
}

#[test]
fn outstanding_serial_is_not_reused() {
    let pending = Arc::new(PendingCalls::default());
    let first = call(&pending, 6);
    assert!(pending.register(6).unwrap().is_none());
    assert_eq!(pending.len(), 1);
    assert!(pending.complete(6, Ok(reply())));
    assert!(first.try_take().unwrap().is_ok());
    let second = call(&pending, 6);
    assert_eq!(second.serial(), 6);
}
