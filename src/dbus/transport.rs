use {
    crate::dbus::{DbusError, UnixFd, UnixSocketAddr},
    std::{collections::VecDeque, mem::MaybeUninit},
    uapi::{Errno, MaybeUninitSliceExt, Msghdr, MsghdrMut, OwnedFd, c},
};

#[cfg(test)]
mod tests;

/// A byte stream to the bus.
///
/// Implementations are used from the dispatch thread and from callers at the
/// same time. Reads happen on one thread only, writes are serialized by the
/// connection.
///
/// # Safety
///
/// When `recv` returns `Ok(n)`, `n` must not exceed the length of `buf` and the
/// first `n` bytes of `buf` must have been initialized.
pub unsafe trait Transport: Send + Sync {
    /// Writes a prefix of `buf` and returns its length. `fds` travel with the
    /// first byte.
    fn send(&self, buf: &[u8], fds: &[UnixFd]) -> Result<usize, DbusError>;

    /// Reads into `buf` and returns the number of bytes that were initialized.
    /// 0 means the peer closed the stream. Received fds are appended to `fds`.
    fn recv(
        &self,
        buf: &mut [MaybeUninit<u8>],
        fds: &mut VecDeque<UnixFd>,
    ) -> Result<usize, DbusError>;

    fn supports_fds(&self) -> bool;

    /// Unblocks pending reads and fails all further I/O.
    fn shutdown(&self);
}

/// Reads from `transport` and returns the bytes that were received.
pub(super) fn recv_bytes<'a>(
    transport: &dyn Transport,
    buf: &'a mut [MaybeUninit<u8>],
    fds: &mut VecDeque<UnixFd>,
) -> Result<&'a [u8], DbusError> {
    let n = transport.recv(buf, fds)?.min(buf.len());
    unsafe { Ok(buf[..n].slice_assume_init_ref()) }
}

pub struct UnixTransport {
    fd: OwnedFd,
}

impl UnixTransport {
    pub fn connect(addr: &UnixSocketAddr) -> Result<Self, DbusError> {
        let path = match addr {
            UnixSocketAddr::Path(p) => p,
            UnixSocketAddr::Abstract(name) => {
                return Err(DbusError::UnsupportedAddress(format!(
                    "unix:abstract={}",
                    name
                )));
            }
        };
        let socket = match uapi::socket(c::AF_UNIX, c::SOCK_STREAM | c::SOCK_CLOEXEC, 0) {
            Ok(s) => s,
            Err(e) => return Err(DbusError::Socket(e.into())),
        };
        let mut sadr: c::sockaddr_un = uapi::pod_zeroed();
        sadr.sun_family = c::AF_UNIX as _;
        let sun_path = uapi::as_bytes_mut(&mut sadr.sun_path[..]);
        if path.len() >= sun_path.len() {
            return Err(DbusError::PathTooLong(path.clone()));
        }
        sun_path[..path.len()].copy_from_slice(path);
        if let Err(e) = uapi::connect(socket.raw(), &sadr) {
            return Err(DbusError::Connect(path.clone(), e.into()));
        }
        Ok(Self { fd: socket })
    }

    pub fn from_fd(fd: OwnedFd) -> Self {
        Self { fd }
    }

    /// Creates two connected transports.
    pub fn pair() -> Result<(Self, Self), DbusError> {
        match uapi::socketpair(c::AF_UNIX, c::SOCK_STREAM | c::SOCK_CLOEXEC, 0) {
            Ok((a, b)) => Ok((Self::from_fd(a), Self::from_fd(b))),
            Err(e) => Err(DbusError::Socket(e.into())),
        }
    }

    fn sendmsg(&self, buf: &[u8], fds: &[UnixFd]) -> Result<usize, Errno> {
        let mut cmsg = vec![];
        if fds.len() > 0 {
            let raw: Vec<c::c_int> = fds.iter().map(|f| f.raw()).collect();
            let space = uapi::cmsg_space(size_of_val(&raw[..]));
            cmsg.resize(space, MaybeUninit::<u8>::uninit());
            let hdr = c::cmsghdr {
                cmsg_len: 0,
                cmsg_level: c::SOL_SOCKET,
                cmsg_type: c::SCM_RIGHTS,
            };
            let mut spare = &mut cmsg[..];
            let len = uapi::cmsg_write(&mut spare, hdr, &raw[..])?;
            cmsg.truncate(len);
        }
        let iov = [buf];
        let msg = Msghdr {
            iov: &iov[..],
            control: Some(&cmsg[..]),
            name: uapi::sockaddr_none_ref(),
        };
        uapi::sendmsg(self.fd.raw(), &msg, c::MSG_NOSIGNAL)
    }

    fn recvmsg(
        &self,
        buf: &mut [MaybeUninit<u8>],
        fds: &mut VecDeque<UnixFd>,
    ) -> Result<usize, Errno> {
        let mut cmsg = [MaybeUninit::<u8>::uninit(); 256];
        let mut iov = [buf];
        let mut hdr = MsghdrMut {
            iov: &mut iov[..],
            control: Some(&mut cmsg[..]),
            name: uapi::sockaddr_none_mut(),
            flags: 0,
        };
        let (ivec, _, mut cmsg) = uapi::recvmsg(self.fd.raw(), &mut hdr, c::MSG_CMSG_CLOEXEC)?;
        let n = ivec.len();
        while cmsg.len() > 0 {
            let (_, hdr, body) = uapi::cmsg_read(&mut cmsg)?;
            if hdr.cmsg_level == c::SOL_SOCKET && hdr.cmsg_type == c::SCM_RIGHTS {
                for fd in uapi::pod_iter(body)? {
                    fds.push_back(UnixFd::new(OwnedFd::new(fd)));
                }
            }
        }
        Ok(n)
    }
}

unsafe impl Transport for UnixTransport {
    fn send(&self, buf: &[u8], fds: &[UnixFd]) -> Result<usize, DbusError> {
        loop {
            match self.sendmsg(buf, fds) {
                Ok(n) => return Ok(n),
                Err(Errno(c::EINTR)) => {}
                Err(e) => return Err(DbusError::WriteError(e.into())),
            }
        }
    }

    fn recv(
        &self,
        buf: &mut [MaybeUninit<u8>],
        fds: &mut VecDeque<UnixFd>,
    ) -> Result<usize, DbusError> {
        loop {
            match self.recvmsg(buf, fds) {
                Ok(n) => return Ok(n),
                Err(Errno(c::EINTR)) => {}
                Err(e) => return Err(DbusError::ReadError(e.into())),
            }
        }
    }

    fn supports_fds(&self) -> bool {
        true
    }

    fn shutdown(&self) {
        let _ = uapi::shutdown(self.fd.raw(), c::SHUT_RDWR);
    }
}
