use {
    crate::{
        dbus::{
            BusAddress, DbusError, MatchRule, Message, MessageType, TY_ARRAY, TY_BOOLEAN, TY_BYTE,
            TY_DOUBLE, TY_INT16, TY_INT32, TY_INT64, TY_OBJECT_PATH, TY_SIGNATURE, TY_STRING,
            TY_UINT16, TY_UINT32, TY_UINT64, TY_UNIX_FD, TY_VARIANT, Transport, UnixTransport,
            auth,
            handlers::{HandlerKind, HandlerRegistration, Handlers, MessageHandler},
            holder, incoming,
            pending::{PendingCall, PendingCalls, Timeout},
        },
        utils::errorfmt::ErrorFmt,
    },
    parking_lot::Mutex,
    std::{
        sync::{
            Arc, OnceLock,
            atomic::{AtomicU32, Ordering::Relaxed},
        },
        thread::{self, JoinHandle},
    },
};


#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ConnectionState {
    Connecting,
    Authenticated,
    Open,
    Closing,
    Closed,
}

pub(super) struct Shared {
    pub bus_name: String,
    pub transport: Arc<dyn Transport>,
    pub state: Mutex<ConnectionState>,
    pub next_serial: AtomicU32,
    pub write_lock: Mutex<()>,
    pub pending: Arc<PendingCalls>,
    pub handlers: Handlers,
    pub unique_name: OnceLock<String>,
    pub server_guid: String,
    pub unix_fds: bool,
    pub dispatcher: Mutex<Option<JoinHandle<()>>>,
}

/// A connection to a message bus or to a peer.
///
/// Cloning is cheap. The connection is closed when the last clone is dropped
/// or when [`Connection::close`] is called.
#[derive(Clone)]
pub struct Connection {
    pub(super) shared: Arc<Shared>,
}

impl Connection {
    /// Connects to a bus.
    ///
    /// Unless `private` is set, connections are shared per address within the
    /// process.
    pub fn connect(bus: impl Into<BusAddress>, private: bool) -> Result<Self, DbusError> {
        let bus = bus.into();
        match private {
            true => Self::open(&bus),
            false => holder::get(&bus),
        }
    }

    pub(super) fn open(bus: &BusAddress) -> Result<Self, DbusError> {
        let addr = bus.resolve()?;
        let name = bus.to_string();
        let mut error = None;
        for entry in addr.entries() {
            let Some(socket) = entry.unix_socket() else {
                log::debug!("{}: Skipping `{}` transport", name, entry.transport());
                continue;
            };
            match UnixTransport::connect(&socket) {
                Ok(t) => return Self::from_transport(&name, Arc::new(t), true),
                Err(e) => {
                    log::debug!("{}: Could not connect: {}", name, ErrorFmt(&e));
                    error = Some(e);
                }
            }
        }
        Err(error.unwrap_or_else(|| DbusError::UnsupportedAddress(addr.as_str().to_owned())))
    }

    /// Authenticates over `transport` and starts the dispatch thread.
    ///
    /// If `register` is set, the connection says `Hello` to the bus and
    /// acquires a unique name before it is returned.
    pub fn from_transport(
        name: &str,
        transport: Arc<dyn Transport>,
        register: bool,
    ) -> Result<Self, DbusError> {
        let auth = match auth::authenticate(&*transport) {
            Ok(a) => a,
            Err(e) => {
                transport.shutdown();
                return Err(e);
            }
        };
        log::info!(
            "{}: Authenticated (server {}, fd passing: {})",
            name,
            auth.guid,
            auth.unix_fds
        );
        let shared = Arc::new(Shared {
            bus_name: name.to_owned(),
            transport,
            state: Mutex::new(ConnectionState::Authenticated),
            next_serial: AtomicU32::new(1),
            write_lock: Default::default(),
            pending: Default::default(),
            handlers: Default::default(),
            unique_name: Default::default(),
            server_guid: auth.guid,
            unix_fds: auth.unix_fds,
            dispatcher: Default::default(),
        });
        incoming::spawn(&shared, auth.leftover)?;
        let conn = Connection { shared };
        if register {
            let unique_name = conn.hello()?;
            log::info!("{}: Acquired unique name {}", name, unique_name);
        }
        {
            let mut state = conn.shared.state.lock();
            if *state == ConnectionState::Authenticated {
                *state = ConnectionState::Open;
            }
        }
        Ok(conn)
    }

    /// Sends a message without waiting for a reply and returns its serial.
    pub fn send(&self, msg: Message) -> Result<u32, DbusError> {
        self.check_sendable(&msg)?;
        let serial = self.shared.next_serial();
        self.shared.write_message(&msg, serial)?;
        Ok(serial)
    }

    /// Sends a method call and returns a handle for its reply.
    pub fn send_with_reply_handle(&self, mut msg: Message) -> Result<PendingCall, DbusError> {
        self.check_sendable(&msg)?;
        msg.set_no_reply(false);
        let (serial, slot) = loop {
            let serial = self.shared.next_serial();
            if let Some(slot) = self.shared.pending.register(serial)? {
                break (serial, slot);
            }
        };
        let call = PendingCall::new(serial, slot, self.shared.pending.clone());
        self.shared.write_message(&msg, serial)?;
        Ok(call)
    }

    /// Sends a method call and blocks until the reply arrives.
    ///
    /// Error replies are returned as messages.
    pub fn send_with_reply(&self, msg: Message, timeout: Timeout) -> Result<Message, DbusError> {
        if self.shared.pending.on_dispatch_thread() {
            return Err(DbusError::WouldDeadlock);
        }
        self.send_with_reply_handle(msg)?.wait(timeout)
    }

    /// Like `send_with_reply` but turns error replies into `DbusError::CallError`.
    pub fn call(&self, msg: Message, timeout: Timeout) -> Result<Message, DbusError> {
        let reply = self.send_with_reply(msg, timeout)?;
        match reply.call_error() {
            Some(e) => Err(DbusError::CallError(e)),
            None => Ok(reply),
        }
    }

    fn check_sendable(&self, msg: &Message) -> Result<(), DbusError> {
        if !self.is_connected() {
            return Err(DbusError::ConnectionClosed);
        }
        if msg.contains_unix_fds() && !self.shared.unix_fds {
            return Err(DbusError::UnixFd);
        }
        Ok(())
    }

    /// Closes the connection. Pending calls fail with `ConnectionClosed`.
    pub fn close(&self) {
        self.shared.close();
    }

    pub fn state(&self) -> ConnectionState {
        *self.shared.state.lock()
    }

    pub fn is_connected(&self) -> bool {
        matches!(
            self.state(),
            ConnectionState::Authenticated | ConnectionState::Open
        )
    }

    pub fn is_authenticated(&self) -> bool {
        self.is_connected()
    }

    /// Always false since only `EXTERNAL` authentication is supported.
    pub fn is_anonymous(&self) -> bool {
        false
    }

    /// The guid the server sent during authentication.
    pub fn server_id(&self) -> &str {
        &self.shared.server_guid
    }

    pub fn bus_name(&self) -> &str {
        &self.shared.bus_name
    }

    /// Returns whether values of the given type code can be sent.
    pub fn can_send_type(&self, type_code: u8) -> bool {
        match type_code {
            TY_UNIX_FD => self.shared.unix_fds,
            TY_BYTE | TY_BOOLEAN | TY_INT16 | TY_UINT16 | TY_INT32 | TY_UINT32 | TY_INT64
            | TY_UINT64 | TY_DOUBLE | TY_STRING | TY_OBJECT_PATH | TY_SIGNATURE | TY_ARRAY
            | TY_VARIANT | b'(' | b'{' => true,
            _ => false,
        }
    }

    /// The number of method calls that are waiting for a reply.
    pub fn pending_calls(&self) -> usize {
        self.shared.pending.len()
    }

    /// Routes method calls for exactly `path` to `handler`.
    pub fn register_object_path(
        &self,
        path: &str,
        handler: impl MessageHandler + 'static,
    ) -> Result<HandlerRegistration, DbusError> {
        self.register(HandlerKind::Object(path.to_owned()), handler)
    }

    /// Routes method calls for `path` and everything below it to `handler`.
    ///
    /// Handlers registered for longer prefixes are tried first.
    pub fn register_fallback(
        &self,
        path: &str,
        handler: impl MessageHandler + 'static,
    ) -> Result<HandlerRegistration, DbusError> {
        self.register(HandlerKind::Fallback(path.to_owned()), handler)
    }

    /// Passes every incoming message except replies to `handler` before any
    /// other handler sees it.
    pub fn add_filter(
        &self,
        handler: impl MessageHandler + 'static,
    ) -> Result<HandlerRegistration, DbusError> {
        self.register(HandlerKind::Filter, handler)
    }

    /// Passes signals that match `rule` to `handler`.
    ///
    /// On bus connections the rule is also registered with the bus. Dropping
    /// the registration removes it again.
    pub fn add_signal_handler(
        &self,
        rule: MatchRule,
        handler: impl MessageHandler + 'static,
    ) -> Result<HandlerRegistration, DbusError> {
        let rule_str = rule.to_string();
        let mut registration = self.register(HandlerKind::Signal(rule), handler)?;
        if self.shared.unique_name.get().is_some() {
            self.add_match(&rule_str)?;
            registration.set_match_rule(rule_str);
        }
        Ok(registration)
    }

    fn register(
        &self,
        kind: HandlerKind,
        handler: impl MessageHandler + 'static,
    ) -> Result<HandlerRegistration, DbusError> {
        if !self.is_connected() {
            return Err(DbusError::ConnectionClosed);
        }
        let id = self.shared.handlers.add(kind, Arc::new(handler))?;
        Ok(HandlerRegistration::new(&self.shared, id))
    }
}

impl Shared {
    pub(super) fn next_serial(&self) -> u32 {
        loop {
            let serial = self.next_serial.fetch_add(1, Relaxed);
            if serial != 0 {
                return serial;
            }
        }
    }

    pub(super) fn is_closing(&self) -> bool {
        matches!(
            *self.state.lock(),
            ConnectionState::Closing | ConnectionState::Closed
        )
    }

    pub(super) fn close(&self) {
        {
            let mut state = self.state.lock();
            if matches!(*state, ConnectionState::Closing | ConnectionState::Closed) {
                return;
            }
            *state = ConnectionState::Closing;
        }
        log::debug!("{}: Closing the connection", self.bus_name);
        self.transport.shutdown();
        self.pending.close();
        self.handlers.clear();
        let dispatcher = self.dispatcher.lock().take();
        if let Some(dispatcher) = dispatcher {
            if dispatcher.thread().id() != thread::current().id() {
                if dispatcher.join().is_err() {
                    log::error!("{}: The dispatch thread panicked", self.bus_name);
                }
            }
        }
        *self.state.lock() = ConnectionState::Closed;
    }

    pub(super) fn dispatch(self: &Arc<Self>, msg: Message) {
        match msg.message_type() {
            MessageType::MethodReturn | MessageType::Error => {
                let Some(serial) = msg.reply_serial() else {
                    return;
                };
                if !self.pending.complete(serial, Ok(msg)) {
                    log::debug!(
                        "{}: Dropping a reply to unknown serial {}",
                        self.bus_name,
                        serial
                    );
                }
            }
            MessageType::MethodCall | MessageType::Signal => {
                let conn = Connection {
                    shared: self.clone(),
                };
                if !self.handlers.dispatch(&conn, &msg) {
                    log::debug!(
                        "{}: Dropping unhandled {:?} {}.{} on {}",
                        self.bus_name,
                        msg.message_type(),
                        msg.interface().unwrap_or(""),
                        msg.member().unwrap_or(""),
                        msg.path().unwrap_or(""),
                    );
                }
            }
        }
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        self.close();
    }
}
