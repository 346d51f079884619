use {
    crate::dbus::{
        EncodeError, Endian, Formatter, MAX_ARRAY_LEN, MAX_SIGNATURE_LEN, SignatureError,
        types::{UnixFd, Value},
    },
    byteorder::{BigEndian, ByteOrder, LittleEndian},
};

macro_rules! write_int {
    ($name:ident, $ty:ty, $write:ident) => {
        pub fn $name(&mut self, v: $ty) {
            const SIZE: usize = size_of::<$ty>();
            self.pad_to(SIZE);
            let mut bytes = [0; SIZE];
            match self.endian {
                Endian::Little => LittleEndian::$write(&mut bytes, v),
                Endian::Big => BigEndian::$write(&mut bytes, v),
            }
            self.buf.extend_from_slice(&bytes);
        }
    };
}

impl<'a> Formatter<'a> {
    /// Offsets are aligned relative to the start of `buf`.
    pub fn new(buf: &'a mut Vec<u8>, fds: &'a mut Vec<UnixFd>, endian: Endian) -> Self {
        Self { buf, fds, endian }
    }

    pub fn pad_to(&mut self, alignment: usize) {
        let new = self.buf.len() + (self.buf.len().wrapping_neg() & (alignment - 1));
        self.buf.resize(new, 0);
    }

    pub fn write_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    write_int!(write_i16, i16, write_i16);
    write_int!(write_u16, u16, write_u16);
    write_int!(write_i32, i32, write_i32);
    write_int!(write_u32, u32, write_u32);
    write_int!(write_i64, i64, write_i64);
    write_int!(write_u64, u64, write_u64);
    write_int!(write_f64, f64, write_f64);

    pub fn patch_u32(&mut self, pos: usize, v: u32) {
        let bytes = &mut self.buf[pos..pos + 4];
        match self.endian {
            Endian::Little => LittleEndian::write_u32(bytes, v),
            Endian::Big => BigEndian::write_u32(bytes, v),
        }
    }

    pub fn write_str(&mut self, s: &str) -> Result<(), EncodeError> {
        if s.as_bytes().contains(&0) {
            return Err(EncodeError::EmbeddedNul);
        }
        let Ok(len) = u32::try_from(s.len()) else {
            return Err(EncodeError::LengthOverflow);
        };
        self.write_u32(len);
        self.buf.extend_from_slice(s.as_bytes());
        self.buf.push(0);
        Ok(())
    }

    pub fn write_signature(&mut self, s: &str) -> Result<(), EncodeError> {
        if s.len() > MAX_SIGNATURE_LEN {
            return Err(SignatureError::TooLong.into());
        }
        self.buf.push(s.len() as u8);
        self.buf.extend_from_slice(s.as_bytes());
        self.buf.push(0);
        Ok(())
    }

    pub fn write_fd(&mut self, fd: &UnixFd) {
        let idx = self.fds.len() as u32;
        self.fds.push(fd.clone());
        self.write_u32(idx);
    }

    pub fn write_variant(&mut self, v: &Value) -> Result<(), EncodeError> {
        let ty = v.dynamic_type()?;
        self.write_signature(&ty.signature())?;
        ty.marshal(self, v)
    }

    /// Writes the length prefix and padding of an array and then its elements.
    pub fn write_array(
        &mut self,
        alignment: usize,
        f: impl FnOnce(&mut Self) -> Result<(), EncodeError>,
    ) -> Result<(), EncodeError> {
        self.pad_to(4);
        let len_pos = self.buf.len();
        self.write_u32(0);
        self.pad_to(alignment);
        let start = self.buf.len();
        f(self)?;
        let len = self.buf.len() - start;
        if len > MAX_ARRAY_LEN {
            return Err(EncodeError::ArrayTooLong);
        }
        self.patch_u32(len_pos, len as u32);
        Ok(())
    }
}
