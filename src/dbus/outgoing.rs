use {
    crate::{
        dbus::{DbusError, Message, UnixFd, connection::Shared, transport::Transport},
        utils::errorfmt::ErrorFmt,
    },
};

impl Shared {
    /// Marshals `msg` with the given serial and writes it in one piece.
    ///
    /// A failed write closes the connection.
    pub(super) fn write_message(&self, msg: &Message, serial: u32) -> Result<(), DbusError> {
        let buf = msg.marshal(serial)?;
        let res = {
            let _lock = self.write_lock.lock();
            if self.is_closing() {
                return Err(DbusError::ConnectionClosed);
            }
            write_all(&*self.transport, &buf, msg.fds())
        };
        if let Err(e) = res {
            if !self.is_closing() {
                log::error!("{}: Could not write a message: {}", self.bus_name, ErrorFmt(&e));
            }
            self.close();
            return Err(e);
        }
        Ok(())
    }
}

fn write_all(transport: &dyn Transport, mut buf: &[u8], mut fds: &[UnixFd]) -> Result<(), DbusError> {
    while buf.len() > 0 {
        let n = transport.send(buf, fds)?;
        fds = &[];
        buf = &buf[n..];
    }
    Ok(())
}
