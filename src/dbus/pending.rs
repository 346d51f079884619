use {
    crate::dbus::{DbusError, Message},
    ahash::AHashMap,
    parking_lot::{Condvar, Mutex},
    std::{
        mem,
        sync::{Arc, OnceLock},
        thread::{self, ThreadId},
        time::{Duration, Instant},
    },
};

#[cfg(test)]
mod tests;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(25);

/// How long to wait for a reply.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum Timeout {
    #[default]
    Default,
    Infinite,
    After(Duration),
}

impl Timeout {
    fn deadline(self) -> Option<Instant> {
        match self {
            Timeout::Default => Some(Instant::now() + DEFAULT_TIMEOUT),
            Timeout::Infinite => None,
            Timeout::After(d) => Instant::now().checked_add(d),
        }
    }
}

impl From<Duration> for Timeout {
    fn from(d: Duration) -> Self {
        Timeout::After(d)
    }
}

pub(super) type Reply = Result<Message, DbusError>;

#[derive(Default)]
pub(super) struct ReplySlot {
    data: Mutex<Option<Reply>>,
    cond: Condvar,
}

impl ReplySlot {
    fn complete(&self, reply: Reply) {
        let mut data = self.data.lock();
        if data.is_none() {
            *data = Some(reply);
            self.cond.notify_all();
        }
    }

    fn take(&self) -> Option<Reply> {
        self.data.lock().take()
    }

    fn is_complete(&self) -> bool {
        self.data.lock().is_some()
    }

    fn wait(&self, deadline: Option<Instant>) -> Option<Reply> {
        let mut data = self.data.lock();
        loop {
            if let Some(reply) = data.take() {
                return Some(reply);
            }
            match deadline {
                None => self.cond.wait(&mut data),
                Some(deadline) => {
                    if self.cond.wait_until(&mut data, deadline).timed_out() {
                        return data.take();
                    }
                }
            }
        }
    }
}

#[derive(Default)]
struct PendingInner {
    closed: bool,
    slots: AHashMap<u32, Arc<ReplySlot>>,
}

/// The calls that are waiting for a reply, keyed by serial.
#[derive(Default)]
pub(super) struct PendingCalls {
    inner: Mutex<PendingInner>,
    dispatch_thread: OnceLock<ThreadId>,
}

impl PendingCalls {
    /// Returns `None` if a call with this serial is still outstanding.
    pub fn register(&self, serial: u32) -> Result<Option<Arc<ReplySlot>>, DbusError> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return Err(DbusError::ConnectionClosed);
        }
        if inner.slots.contains_key(&serial) {
            return Ok(None);
        }
        let slot = Arc::new(ReplySlot::default());
        inner.slots.insert(serial, slot.clone());
        Ok(Some(slot))
    }

    /// Completes the call with the given serial. Returns false if no such call exists.
    pub fn complete(&self, serial: u32, reply: Reply) -> bool {
        let slot = self.inner.lock().slots.remove(&serial);
        match slot {
            Some(slot) => {
                slot.complete(reply);
                true
            }
            None => false,
        }
    }

    fn remove(&self, serial: u32, slot: &Arc<ReplySlot>) {
        let mut inner = self.inner.lock();
        if let Some(s) = inner.slots.get(&serial) {
            if Arc::ptr_eq(s, slot) {
                inner.slots.remove(&serial);
            }
        }
    }

    /// Refuses further registrations and fails all calls with `ConnectionClosed`.
    pub fn close(&self) {
        let slots = {
            let mut inner = self.inner.lock();
            inner.closed = true;
            mem::take(&mut inner.slots)
        };
        for (_, slot) in slots {
            slot.complete(Err(DbusError::ConnectionClosed));
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().slots.len()
    }

    pub fn set_dispatch_thread(&self) {
        let _ = self.dispatch_thread.set(thread::current().id());
    }

    pub fn on_dispatch_thread(&self) -> bool {
        self.dispatch_thread.get() == Some(&thread::current().id())
    }
}

/// A method call that was sent and whose reply has not been consumed.
///
/// Dropping the handle cancels the call. A reply that arrives later is dropped.
pub struct PendingCall {
    serial: u32,
    slot: Arc<ReplySlot>,
    pending: Arc<PendingCalls>,
}

impl PendingCall {
    pub(super) fn new(serial: u32, slot: Arc<ReplySlot>, pending: Arc<PendingCalls>) -> Self {
        Self {
            serial,
            slot,
            pending,
        }
    }

    pub fn serial(&self) -> u32 {
        self.serial
    }

    /// Blocks until the reply arrives, the timeout expires or the connection closes.
    pub fn wait(self, timeout: Timeout) -> Result<Message, DbusError> {
        if self.pending.on_dispatch_thread() && !self.slot.is_complete() {
            return Err(DbusError::WouldDeadlock);
        }
        if let Some(reply) = self.slot.wait(timeout.deadline()) {
            return reply;
        }
        self.pending.remove(self.serial, &self.slot);
        match self.slot.take() {
            Some(reply) => reply,
            None => Err(DbusError::Timeout),
        }
    }

    /// Returns the reply if it has already arrived.
    pub fn try_take(&self) -> Option<Result<Message, DbusError>> {
        self.slot.take()
    }

    pub fn cancel(self) {}
}

impl Drop for PendingCall {
    fn drop(&mut self) {
        self.pending.remove(self.serial, &self.slot);
    }
}
