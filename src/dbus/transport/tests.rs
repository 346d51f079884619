use {
    crate::dbus::{
        DbusError, Message, UnixFd,
        incoming::MessageReader,
        transport::{Transport, recv_bytes},
    },
    parking_lot::Mutex,
    std::{collections::VecDeque, mem::MaybeUninit, sync::Arc},
};

/// Hands out its bytes a few at a time.
struct Trickle {
    data: Mutex<VecDeque<u8>>,
    chunk: usize,
}

unsafe impl Transport for Trickle {
    fn send(&self, buf: &[u8], _fds: &[UnixFd]) -> Result<usize, DbusError> {
        Ok(buf.len())
    }

    fn recv(
        &self,
        buf: &mut [MaybeUninit<u8>],
        _fds: &mut VecDeque<UnixFd>,
    ) -> Result<usize, DbusError> {
        let mut data = self.data.lock();
        let n = buf.len().min(self.chunk).min(data.len());
        for (dst, src) in buf.iter_mut().zip(data.drain(..n)) {
            dst.write(src);
        }
        Ok(n)
    }

    fn supports_fds(&self) -> bool {
        false
    }

    fn shutdown(&self) {}
}

fn trickle(data: Vec<u8>, chunk: usize) -> Arc<Trickle> {
    Arc::new(Trickle {
        data: Mutex::new(data.into()),
        chunk,
    })
}

#[test]
fn recv_bytes_returns_initialized_prefix() {
    let t = trickle(vec![1, 2, 3, 4, 5], 3);
    let mut buf = [MaybeUninit::<u8>::uninit(); 8];
    let mut fds = VecDeque::new();
    assert_eq!(recv_bytes(&*t, &mut buf, &mut fds).unwrap(), &[1, 2, 3]);
    assert_eq!(recv_bytes(&*t, &mut buf, &mut fds).unwrap(), &[4, 5]);
    assert!(recv_bytes(&*t, &mut buf, &mut fds).unwrap().is_empty());
}

#[test]
fn reader_reassembles_split_frames() {
    let mut msg = Message::signal("/a", "org.example.Iface", "Changed").unwrap();
    msg.append("payload").unwrap();
    let mut bytes = msg.marshal(9).unwrap();
    bytes.extend_from_slice(&msg.marshal(10).unwrap());
    let mut reader = MessageReader::new(trickle(bytes, 3), vec![]);
    for serial in [9, 10] {
        let read = reader.read_message().unwrap().unwrap();
        assert_eq!(read.serial(), serial);
        assert!(read.is_signal("org.example.Iface", "Changed"));
        assert_eq!(read.read_all().unwrap(), [msg.read_all().unwrap()[0].clone()]);
    }
    assert!(matches!(reader.read_message(), Err(DbusError::Hangup)));
}
