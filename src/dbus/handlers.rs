use {
    crate::dbus::{
        Connection, DbusError, MatchRule, Message, MessageType, connection::Shared, names,
    },
    num_derive::{FromPrimitive, ToPrimitive},
    parking_lot::Mutex,
    smallvec::SmallVec,
    std::{
        mem,
        sync::{Arc, Weak},
    },
};

#[derive(Copy, Clone, Debug, Eq, PartialEq, FromPrimitive, ToPrimitive)]
pub enum HandlerResult {
    Handled = 0,
    NotYetHandled = 1,
    NeedMemory = 2,
}

/// Receives messages on the dispatch thread.
///
/// Blocking on a reply from within a handler fails with `WouldDeadlock`.
pub trait MessageHandler: Send + Sync {
    fn handle(&self, conn: &Connection, msg: &Message) -> HandlerResult;
}

impl<F> MessageHandler for F
where
    F: Fn(&Connection, &Message) -> HandlerResult + Send + Sync,
{
    fn handle(&self, conn: &Connection, msg: &Message) -> HandlerResult {
        self(conn, msg)
    }
}

pub(super) enum HandlerKind {
    Filter,
    Object(String),
    Fallback(String),
    Signal(MatchRule),
}

struct Entry {
    id: u64,
    kind: HandlerKind,
    handler: Arc<dyn MessageHandler>,
}

#[derive(Default)]
struct HandlersInner {
    next_id: u64,
    entries: Vec<Entry>,
}

#[derive(Default)]
pub(super) struct Handlers {
    inner: Mutex<HandlersInner>,
}

impl Handlers {
    pub fn add(&self, kind: HandlerKind, handler: Arc<dyn MessageHandler>) -> Result<u64, DbusError> {
        if let HandlerKind::Object(path) | HandlerKind::Fallback(path) = &kind {
            names::validate_object_path(path)?;
        }
        let mut inner = self.inner.lock();
        if let HandlerKind::Object(path) | HandlerKind::Fallback(path) = &kind {
            let in_use = inner.entries.iter().any(|e| match &e.kind {
                HandlerKind::Object(p) | HandlerKind::Fallback(p) => p == path,
                _ => false,
            });
            if in_use {
                return Err(DbusError::ObjectPathInUse(path.clone()));
            }
        }
        inner.next_id += 1;
        let id = inner.next_id;
        inner.entries.push(Entry { id, kind, handler });
        Ok(id)
    }

    pub fn remove(&self, id: u64) {
        let removed = {
            let mut inner = self.inner.lock();
            inner
                .entries
                .iter()
                .position(|e| e.id == id)
                .map(|pos| inner.entries.remove(pos))
        };
        drop(removed);
    }

    pub fn clear(&self) {
        let entries = mem::take(&mut self.inner.lock().entries);
        drop(entries);
    }

    /// Offers `msg` to the matching handlers in order and returns whether one
    /// of them handled it.
    ///
    /// Filters come first, then the object registered for the exact path, then
    /// fallbacks from the longest prefix to the shortest. Signals go to the
    /// signal handlers whose rule matches.
    pub fn dispatch(&self, conn: &Connection, msg: &Message) -> bool {
        let candidates = self.candidates(msg);
        for handler in candidates {
            match handler.handle(conn, msg) {
                HandlerResult::Handled => return true,
                HandlerResult::NotYetHandled | HandlerResult::NeedMemory => {}
            }
        }
        false
    }

    fn candidates(&self, msg: &Message) -> SmallVec<[Arc<dyn MessageHandler>; 4]> {
        let inner = self.inner.lock();
        let mut res = SmallVec::new();
        for e in &inner.entries {
            if let HandlerKind::Filter = e.kind {
                res.push(e.handler.clone());
            }
        }
        match msg.message_type() {
            MessageType::MethodCall => {
                let Some(path) = msg.path() else {
                    return res;
                };
                for e in &inner.entries {
                    if let HandlerKind::Object(p) = &e.kind {
                        if p == path {
                            res.push(e.handler.clone());
                        }
                    }
                }
                let mut fallbacks: SmallVec<[(usize, &Arc<dyn MessageHandler>); 4]> = inner
                    .entries
                    .iter()
                    .filter_map(|e| match &e.kind {
                        HandlerKind::Fallback(p) if is_below(path, p) => Some((p.len(), &e.handler)),
                        _ => None,
                    })
                    .collect();
                fallbacks.sort_by(|a, b| b.0.cmp(&a.0));
                res.extend(fallbacks.into_iter().map(|(_, h)| h.clone()));
            }
            MessageType::Signal => {
                for e in &inner.entries {
                    if let HandlerKind::Signal(rule) = &e.kind {
                        if rule.matches(msg) {
                            res.push(e.handler.clone());
                        }
                    }
                }
            }
            MessageType::MethodReturn | MessageType::Error => {}
        }
        res
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }
}

fn is_below(path: &str, prefix: &str) -> bool {
    if prefix == "/" {
        return true;
    }
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

/// Keeps a handler registered. Dropping it removes the handler.
#[must_use]
pub struct HandlerRegistration {
    shared: Weak<Shared>,
    id: u64,
    match_rule: Option<String>,
}

impl HandlerRegistration {
    pub(super) fn new(shared: &Arc<Shared>, id: u64) -> Self {
        Self {
            shared: Arc::downgrade(shared),
            id,
            match_rule: None,
        }
    }

    pub(super) fn set_match_rule(&mut self, rule: String) {
        self.match_rule = Some(rule);
    }

    pub fn unregister(self) {}
}

impl Drop for HandlerRegistration {
    fn drop(&mut self) {
        let Some(shared) = self.shared.upgrade() else {
            return;
        };
        shared.handlers.remove(self.id);
        if let Some(rule) = self.match_rule.take() {
            let conn = Connection { shared };
            if conn.is_connected() {
                conn.remove_match_no_reply(&rule);
            }
        }
    }
}
