//! A minimal message bus that runs inside the test process.

use {
    crate::dbus::{
        BUS_DEST, BUS_INTERFACE, Connection, DBUS_NAME_FLAG_ALLOW_REPLACEMENT,
        DBUS_NAME_FLAG_DO_NOT_QUEUE, DBUS_NAME_FLAG_REPLACE_EXISTING, DbusError, DynamicType,
        Message, MessageType, Transport, UnixTransport, Value, incoming::MessageReader, names,
        transport::recv_bytes,
    },
    ahash::AHashMap,
    parking_lot::Mutex,
    std::{collections::VecDeque, mem::MaybeUninit, sync::Arc, thread},
};

pub const GUID: &str = "0123456789abcdef0123456789abcdef";
const BUS_ID: &str = "fedcba9876543210fedcba9876543210";

pub struct TestBus {
    inner: Arc<BusInner>,
}

#[derive(Default)]
struct BusInner {
    state: Mutex<BusState>,
}

#[derive(Default)]
struct BusState {
    next_client: u32,
    next_serial: u32,
    clients: AHashMap<String, Arc<Client>>,
    /// Owner queues, the primary owner first.
    names: AHashMap<String, Vec<(String, u32)>>,
}

struct Client {
    name: String,
    transport: Arc<UnixTransport>,
    write_lock: Mutex<()>,
    rules: Mutex<Vec<String>>,
}

impl Client {
    fn send(&self, msg: &Message, serial: u32) {
        let Ok(buf) = msg.marshal(serial) else {
            return;
        };
        let _lock = self.write_lock.lock();
        let mut buf = &buf[..];
        let mut fds = msg.fds();
        while buf.len() > 0 {
            match self.transport.send(buf, fds) {
                Ok(n) => {
                    buf = &buf[n..];
                    fds = &[];
                }
                Err(_) => return,
            }
        }
    }
}

type BusResult = Result<Vec<Value>, (&'static str, String)>;

impl TestBus {
    pub fn new() -> Self {
        Self {
            inner: Default::default(),
        }
    }

    pub fn connect(&self) -> Connection {
        let (client, server) = UnixTransport::pair().unwrap();
        let inner = self.inner.clone();
        thread::spawn(move || inner.serve(Arc::new(server)));
        Connection::from_transport("test bus", Arc::new(client), true).unwrap()
    }

    pub fn client_count(&self) -> usize {
        self.inner.state.lock().clients.len()
    }
}

impl BusInner {
    fn serve(&self, transport: Arc<UnixTransport>) {
        if server_auth(&*transport, &format!("OK {}", GUID)).is_err() {
            return;
        }
        let mut reader = MessageReader::new(transport.clone(), vec![]);
        let mut me = None;
        while let Ok(msg) = reader.read_message() {
            if let Some(msg) = msg {
                self.handle(&transport, &mut me, msg);
            }
        }
        if let Some(me) = me {
            self.disconnect(&me.name);
        }
    }

    fn next_serial(&self) -> u32 {
        let mut state = self.state.lock();
        state.next_serial += 1;
        state.next_serial
    }

    fn handle(&self, transport: &Arc<UnixTransport>, me: &mut Option<Arc<Client>>, mut msg: Message) {
        if me.is_none() {
            if !msg.is_method_call(BUS_INTERFACE, "Hello") {
                return;
            }
            *me = Some(self.add_client(transport));
        }
        let Some(client) = me.clone() else {
            return;
        };
        let _ = msg.set_sender(Some(&client.name));
        match msg.destination() {
            Some(BUS_DEST) => self.handle_bus_call(&client, &msg),
            Some(dest) => match self.resolve(dest) {
                Some(target) => target.send(&msg, msg.serial()),
                None => {
                    if msg.message_type() == MessageType::MethodCall && !msg.no_reply() {
                        let text = format!("The name {} was not provided", dest);
                        if let Ok(mut reply) =
                            Message::error(&msg, "org.freedesktop.DBus.Error.ServiceUnknown", Some(&text))
                        {
                            let _ = reply.set_sender(Some(BUS_DEST));
                            client.send(&reply, self.next_serial());
                        }
                    }
                }
            },
            None => {
                if msg.message_type() == MessageType::Signal {
                    let clients: Vec<_> = self.state.lock().clients.values().cloned().collect();
                    for c in clients {
                        c.send(&msg, msg.serial());
                    }
                }
            }
        }
    }

    fn add_client(&self, transport: &Arc<UnixTransport>) -> Arc<Client> {
        let mut state = self.state.lock();
        state.next_client += 1;
        let client = Arc::new(Client {
            name: format!(":1.{}", state.next_client),
            transport: transport.clone(),
            write_lock: Default::default(),
            rules: Default::default(),
        });
        state.clients.insert(client.name.clone(), client.clone());
        client
    }

    fn disconnect(&self, name: &str) {
        let mut state = self.state.lock();
        state.clients.remove(name);
        state.names.retain(|_, owners| {
            owners.retain(|(owner, _)| owner != name);
            owners.len() > 0
        });
    }

    fn resolve(&self, name: &str) -> Option<Arc<Client>> {
        let state = self.state.lock();
        let unique = match names::is_unique_name(name) {
            true => name,
            false => state.names.get(name)?.first()?.0.as_str(),
        };
        state.clients.get(unique).cloned()
    }

    fn handle_bus_call(&self, client: &Client, msg: &Message) {
        if msg.message_type() != MessageType::MethodCall {
            return;
        }
        let args = msg.read_all().unwrap_or_default();
        let arg_str = |i: usize| args.get(i).and_then(Value::as_str).unwrap_or("").to_owned();
        let member = msg.member().unwrap_or("");
        let result: BusResult = match member {
            "Hello" => Ok(vec![client.name.as_str().into()]),
            "GetId" => Ok(vec![BUS_ID.into()]),
            "RequestName" => {
                let flags = args.get(1).and_then(Value::as_u32).unwrap_or(0);
                Ok(vec![self.request_name(&client.name, &arg_str(0), flags).into()])
            }
            "ReleaseName" => Ok(vec![self.release_name(&client.name, &arg_str(0)).into()]),
            "NameHasOwner" => Ok(vec![self.resolve(&arg_str(0)).is_some().into()]),
            "GetNameOwner" => match self.resolve(&arg_str(0)) {
                Some(c) => Ok(vec![c.name.as_str().into()]),
                None => Err(no_owner(&arg_str(0))),
            },
            "GetConnectionUnixUser" => match self.resolve(&arg_str(0)) {
                Some(_) => Ok(vec![(uapi::getuid() as u32).into()]),
                None => Err(no_owner(&arg_str(0))),
            },
            "ListNames" => {
                let state = self.state.lock();
                let mut names = vec![Value::from(BUS_DEST)];
                names.extend(state.clients.keys().map(|n| Value::from(n.as_str())));
                names.extend(state.names.keys().map(|n| Value::from(n.as_str())));
                Ok(vec![Value::array(DynamicType::String, names)])
            }
            "AddMatch" => {
                client.rules.lock().push(arg_str(0));
                Ok(vec![])
            }
            "RemoveMatch" => {
                let mut rules = client.rules.lock();
                match rules.iter().position(|r| *r == arg_str(0)) {
                    Some(pos) => {
                        rules.remove(pos);
                        Ok(vec![])
                    }
                    None => Err((
                        "org.freedesktop.DBus.Error.MatchRuleNotFound",
                        "The given match rule wasn't found".to_owned(),
                    )),
                }
            }
            _ => Err((
                "org.freedesktop.DBus.Error.UnknownMethod",
                format!("Unknown method {}", member),
            )),
        };
        if msg.no_reply() {
            return;
        }
        let reply = match result {
            Ok(values) => {
                let mut reply = Message::method_return(msg);
                reply.append_args(&values).map(|_| reply)
            }
            Err((name, text)) => Message::error(msg, name, Some(&text)),
        };
        if let Ok(mut reply) = reply {
            let _ = reply.set_sender(Some(BUS_DEST));
            client.send(&reply, self.next_serial());
        }
    }

    fn request_name(&self, client: &str, name: &str, flags: u32) -> u32 {
        let mut state = self.state.lock();
        let owners = state.names.entry(name.to_owned()).or_default();
        let Some((primary, primary_flags)) = owners.first().cloned() else {
            owners.push((client.to_owned(), flags));
            return 1;
        };
        if primary == client {
            owners[0].1 = flags;
            return 4;
        }
        if flags & DBUS_NAME_FLAG_REPLACE_EXISTING != 0
            && primary_flags & DBUS_NAME_FLAG_ALLOW_REPLACEMENT != 0
        {
            owners.retain(|(o, _)| o != client);
            if primary_flags & DBUS_NAME_FLAG_DO_NOT_QUEUE != 0 {
                owners.remove(0);
            }
            owners.insert(0, (client.to_owned(), flags));
            return 1;
        }
        if flags & DBUS_NAME_FLAG_DO_NOT_QUEUE != 0 {
            return 3;
        }
        if !owners.iter().any(|(o, _)| o == client) {
            owners.push((client.to_owned(), flags));
        }
        2
    }

    fn release_name(&self, client: &str, name: &str) -> u32 {
        let mut state = self.state.lock();
        let Some(owners) = state.names.get_mut(name) else {
            return 2;
        };
        let Some(pos) = owners.iter().position(|(o, _)| o == client) else {
            return 3;
        };
        owners.remove(pos);
        if owners.is_empty() {
            state.names.remove(name);
        }
        1
    }
}

fn no_owner(name: &str) -> (&'static str, String) {
    (
        "org.freedesktop.DBus.Error.NameHasNoOwner",
        format!("Could not get owner of name '{}': no such name", name),
    )
}

/// Runs the server side of the handshake, answering `AUTH` with `auth_reply`.
pub fn server_auth(transport: &dyn Transport, auth_reply: &str) -> Result<(), DbusError> {
    loop {
        let line = read_line(transport)?;
        let cmd = line.split(' ').next().unwrap_or("");
        let reply = match cmd {
            "AUTH" => auth_reply,
            "NEGOTIATE_UNIX_FD" => "AGREE_UNIX_FD",
            "BEGIN" => return Ok(()),
            _ => "ERROR",
        };
        let reply = format!("{}\r\n", reply);
        transport.send(reply.as_bytes(), &[])?;
    }
}

fn read_line(transport: &dyn Transport) -> Result<String, DbusError> {
    let mut line = vec![];
    let mut fds = VecDeque::new();
    loop {
        let mut buf = [MaybeUninit::<u8>::uninit(); 1];
        let read = recv_bytes(transport, &mut buf, &mut fds)?;
        match read.first() {
            None => return Err(DbusError::Hangup),
            Some(b'\n') => break,
            Some(b'\r' | 0) => {}
            Some(&b) => line.push(b),
        }
    }
    Ok(String::from_utf8_lossy(&line).into_owned())
}
