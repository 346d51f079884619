use {
    crate::dbus::{
        DecodeError, DynamicType, Endian, MAX_ARRAY_LEN, MAX_DEPTH, Parser,
        types::{ObjectPath, Signature, UnixFd, Value},
    },
    bstr::ByteSlice,
    byteorder::{BigEndian, ByteOrder, LittleEndian},
};

macro_rules! read_int {
    ($name:ident, $ty:ty, $read:ident) => {
        pub fn $name(&mut self) -> Result<$ty, DecodeError> {
            const SIZE: usize = size_of::<$ty>();
            self.align_to(SIZE)?;
            let Some(bytes) = self.buf.get(self.pos..self.pos + SIZE) else {
                return Err(DecodeError::UnexpectedEof);
            };
            let v = match self.endian {
                Endian::Little => LittleEndian::$read(bytes),
                Endian::Big => BigEndian::$read(bytes),
            };
            self.pos += SIZE;
            Ok(v)
        }
    };
}

impl<'a> Parser<'a> {
    /// `buf` must start at an 8-byte boundary of the message.
    pub fn new(buf: &'a [u8], endian: Endian, fds: &'a [UnixFd]) -> Self {
        Self {
            buf,
            pos: 0,
            endian,
            fds,
            depth: 0,
        }
    }

    pub fn eof(&self) -> bool {
        self.pos == self.buf.len()
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    pub fn align_to(&mut self, n: usize) -> Result<(), DecodeError> {
        let new = self.pos + (self.pos.wrapping_neg() & (n - 1));
        if new > self.buf.len() {
            return Err(DecodeError::UnexpectedEof);
        }
        if self.buf[self.pos..new].iter().any(|&b| b != 0) {
            return Err(DecodeError::NonZeroPadding);
        }
        self.pos = new;
        Ok(())
    }

    pub fn read_u8(&mut self) -> Result<u8, DecodeError> {
        let Some(&b) = self.buf.get(self.pos) else {
            return Err(DecodeError::UnexpectedEof);
        };
        self.pos += 1;
        Ok(b)
    }

    read_int!(read_i16, i16, read_i16);
    read_int!(read_u16, u16, read_u16);
    read_int!(read_i32, i32, read_i32);
    read_int!(read_u32, u32, read_u32);
    read_int!(read_i64, i64, read_i64);
    read_int!(read_u64, u64, read_u64);
    read_int!(read_f64, f64, read_f64);

    pub fn read_bool(&mut self) -> Result<bool, DecodeError> {
        match self.read_u32()? {
            0 => Ok(false),
            1 => Ok(true),
            _ => Err(DecodeError::InvalidBoolValue),
        }
    }

    pub fn read_fd(&mut self) -> Result<UnixFd, DecodeError> {
        let idx = self.read_u32()? as usize;
        match self.fds.get(idx) {
            Some(fd) => Ok(fd.clone()),
            None => Err(DecodeError::OobFds),
        }
    }

    pub fn read_string(&mut self) -> Result<&'a str, DecodeError> {
        let len = self.read_u32()? as usize;
        self.read_string_(len)
    }

    pub fn read_object_path(&mut self) -> Result<ObjectPath, DecodeError> {
        let s = self.read_string()?;
        ObjectPath::new(s).map_err(|_| DecodeError::InvalidObjectPath(s.to_owned()))
    }

    pub fn read_signature(&mut self) -> Result<Signature, DecodeError> {
        let len = self.read_u8()? as usize;
        let s = self.read_string_(len)?;
        DynamicType::parse_signature(s)?;
        Ok(Signature::new_unchecked(s.to_owned()))
    }

    fn read_string_(&mut self, len: usize) -> Result<&'a str, DecodeError> {
        if self.buf.len() - self.pos < len + 1 {
            return Err(DecodeError::UnexpectedEof);
        }
        let s = &self.buf[self.pos..self.pos + len];
        if self.buf[self.pos + len] != 0 {
            return Err(DecodeError::MissingNul);
        }
        if s.contains(&0) {
            return Err(DecodeError::EmbeddedNul);
        }
        self.pos += len + 1;
        match s.to_str() {
            Ok(s) => Ok(s),
            _ => Err(DecodeError::InvalidUtf8),
        }
    }

    pub fn read_variant(&mut self) -> Result<Value, DecodeError> {
        let sig = self.read_signature()?;
        let ty = DynamicType::parse_single(&sig)?;
        self.nested(|p| ty.parse(p))
    }

    /// Runs `f` one container level deeper.
    pub fn nested<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, DecodeError>,
    ) -> Result<T, DecodeError> {
        if self.depth >= MAX_DEPTH {
            return Err(DecodeError::TooDeep);
        }
        self.depth += 1;
        let res = f(self);
        self.depth -= 1;
        res
    }

    pub fn read_array_with<T>(
        &mut self,
        alignment: usize,
        mut f: impl FnMut(&mut Parser<'a>) -> Result<T, DecodeError>,
    ) -> Result<Vec<T>, DecodeError> {
        let len = self.read_u32()? as usize;
        if len > MAX_ARRAY_LEN {
            return Err(DecodeError::ArrayTooLong);
        }
        self.align_to(alignment)?;
        if self.buf.len() - self.pos < len {
            return Err(DecodeError::UnexpectedEof);
        }
        if self.depth >= MAX_DEPTH {
            return Err(DecodeError::TooDeep);
        }
        let mut parser = Parser {
            buf: &self.buf[..self.pos + len],
            pos: self.pos,
            endian: self.endian,
            fds: self.fds,
            depth: self.depth + 1,
        };
        self.pos += len;
        let mut res = vec![];
        while !parser.eof() {
            res.push(f(&mut parser)?);
        }
        Ok(res)
    }
}
