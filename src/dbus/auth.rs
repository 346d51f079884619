use {
    crate::{
        dbus::{DbusError, transport::{Transport, recv_bytes}},
        utils::hex,
    },
    std::{collections::VecDeque, mem::MaybeUninit},
};

const BUF_SIZE: usize = 128;
const MAX_LINE_LEN: usize = 16 * 1024;

pub(super) struct AuthResult {
    pub guid: String,
    pub unix_fds: bool,
    /// Bytes the server sent after the last line of the handshake.
    pub leftover: Vec<u8>,
}

/// Runs the client side of the SASL `EXTERNAL` handshake up to and including `BEGIN`.
pub(super) fn authenticate(transport: &dyn Transport) -> Result<AuthResult, DbusError> {
    let mut auth = Auth {
        transport,
        pending: vec![],
    };
    let uid = hex::to_hex(uapi::getuid().to_string());
    auth.write(&format!("\0AUTH EXTERNAL {}\r\n", uid))?;
    let line = auth.readline()?;
    let guid = match line_to_cmd(&line) {
        ("OK", guid) => guid.to_owned(),
        ("REJECTED", _) => return Err(DbusError::Auth),
        _ => return Err(DbusError::AuthProtocol(line.trim().to_owned())),
    };
    let mut unix_fds = false;
    if transport.supports_fds() {
        auth.write("NEGOTIATE_UNIX_FD\r\n")?;
        let line = auth.readline()?;
        match line_to_cmd(&line) {
            ("AGREE_UNIX_FD", _) => unix_fds = true,
            ("ERROR", _) => {}
            _ => return Err(DbusError::AuthProtocol(line.trim().to_owned())),
        }
    }
    auth.write("BEGIN\r\n")?;
    Ok(AuthResult {
        guid,
        unix_fds,
        leftover: auth.pending,
    })
}

struct Auth<'a> {
    transport: &'a dyn Transport,
    pending: Vec<u8>,
}

impl Auth<'_> {
    fn readline(&mut self) -> Result<String, DbusError> {
        let mut buf = [MaybeUninit::<u8>::uninit(); BUF_SIZE];
        let mut fds = VecDeque::new();
        loop {
            if let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
                let line: Vec<u8> = self.pending.drain(..=pos).collect();
                return match String::from_utf8(line) {
                    Ok(s) => Ok(s),
                    Err(e) => Err(DbusError::AuthProtocol(
                        String::from_utf8_lossy(e.as_bytes()).into_owned(),
                    )),
                };
            }
            if self.pending.len() > MAX_LINE_LEN {
                return Err(DbusError::AuthProtocol("line too long".to_owned()));
            }
            let read = recv_bytes(self.transport, &mut buf, &mut fds)?;
            if read.is_empty() {
                return Err(DbusError::Hangup);
            }
            self.pending.extend_from_slice(read);
        }
    }

    fn write(&mut self, s: &str) -> Result<(), DbusError> {
        let mut buf = s.as_bytes();
        while buf.len() > 0 {
            let n = self.transport.send(buf, &[])?;
            buf = &buf[n..];
        }
        Ok(())
    }
}

fn line_to_cmd(line: &str) -> (&str, &str) {
    let line = line.trim();
    line.split_once(' ').unwrap_or((line, ""))
}
