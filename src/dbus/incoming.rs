use {
    crate::{
        dbus::{
            DbusError, DispatchStatus, Message, UnixFd,
            connection::Shared,
            message::frame_len,
            transport::{Transport, recv_bytes},
        },
        utils::errorfmt::ErrorFmt,
    },
    std::{
        collections::VecDeque,
        mem::MaybeUninit,
        sync::{Arc, Weak},
        thread,
    },
};

/// Splits the byte stream of a transport into messages.
pub(super) struct MessageReader {
    transport: Arc<dyn Transport>,
    buf: Box<[MaybeUninit<u8>; 4096]>,
    pending: Vec<u8>,
    fds: VecDeque<UnixFd>,
}

impl MessageReader {
    pub fn new(transport: Arc<dyn Transport>, leftover: Vec<u8>) -> Self {
        Self {
            transport,
            buf: Box::new([MaybeUninit::uninit(); 4096]),
            pending: leftover,
            fds: Default::default(),
        }
    }

    /// Blocks until a complete message has been received.
    ///
    /// Returns `None` for messages of unknown type.
    pub fn read_message(&mut self) -> Result<Option<Message>, DbusError> {
        let len = loop {
            if let Some(len) = frame_len(&self.pending)? {
                break len;
            }
            self.fill()?;
        };
        while self.pending.len() < len {
            self.fill()?;
        }
        let msg = Message::decode(&self.pending[..len], &mut self.fds)?;
        self.pending.drain(..len);
        Ok(msg)
    }

    pub fn has_complete_frame(&self) -> bool {
        matches!(frame_len(&self.pending), Ok(Some(len)) if self.pending.len() >= len)
    }

    fn fill(&mut self) -> Result<(), DbusError> {
        let read = recv_bytes(&*self.transport, &mut self.buf[..], &mut self.fds)?;
        if read.is_empty() {
            return Err(DbusError::Hangup);
        }
        self.pending.extend_from_slice(read);
        Ok(())
    }
}

pub(super) struct Dispatcher {
    shared: Weak<Shared>,
    bus_name: String,
    reader: MessageReader,
}

impl Dispatcher {
    /// Reads and routes one message.
    pub fn dispatch_one(&mut self) -> Result<DispatchStatus, DbusError> {
        if let Some(msg) = self.reader.read_message()? {
            let Some(shared) = self.shared.upgrade() else {
                return Err(DbusError::ConnectionClosed);
            };
            shared.dispatch(msg);
        }
        match self.reader.has_complete_frame() {
            true => Ok(DispatchStatus::DataRemains),
            false => Ok(DispatchStatus::Complete),
        }
    }

    fn run(mut self) {
        loop {
            if let Err(e) = self.dispatch_one() {
                let Some(shared) = self.shared.upgrade() else {
                    return;
                };
                if shared.is_closing() {
                    log::debug!("{}: Dispatch thread exiting: {}", self.bus_name, ErrorFmt(e));
                } else {
                    log::error!(
                        "{}: Could not process an incoming message: {}",
                        self.bus_name,
                        ErrorFmt(e)
                    );
                }
                shared.close();
                return;
            }
        }
    }
}

/// Starts the thread that reads from the transport of `shared`.
pub(super) fn spawn(shared: &Arc<Shared>, leftover: Vec<u8>) -> Result<(), DbusError> {
    let dispatcher = Dispatcher {
        shared: Arc::downgrade(shared),
        bus_name: shared.bus_name.clone(),
        reader: MessageReader::new(shared.transport.clone(), leftover),
    };
    let pending = shared.pending.clone();
    let res = thread::Builder::new()
        .name(format!("dbus {}", shared.bus_name))
        .spawn(move || {
            pending.set_dispatch_thread();
            drop(pending);
            dispatcher.run();
        });
    match res {
        Ok(handle) => {
            *shared.dispatcher.lock() = Some(handle);
            Ok(())
        }
        Err(e) => Err(DbusError::SpawnThread(e.into())),
    }
}
