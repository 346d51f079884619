use {
    crate::dbus::{
        ALLOW_INTERACTIVE_AUTHORIZATION, CallError, DbusError, DecodeError, DynamicType,
        EncodeError, Endian, Formatter, HDR_DESTINATION, HDR_ERROR_NAME, HDR_INTERFACE,
        HDR_MEMBER, HDR_PATH, HDR_REPLY_SERIAL, HDR_SENDER, HDR_SIGNATURE, HDR_UNIX_FDS,
        MAX_ARRAY_LEN, MAX_MESSAGE_LEN, MAX_SIGNATURE_LEN, NO_AUTO_START, NO_REPLY_EXPECTED,
        PROTOCOL_VERSION, Parser, TypeError, ValidationError, names,
        types::{ObjectPath, UnixFd, Value},
    },
    byteorder::{BigEndian, ByteOrder, LittleEndian},
    num_derive::{FromPrimitive, ToPrimitive},
    num_traits::FromPrimitive,
    std::{collections::VecDeque, vec},
};

#[cfg(test)]
mod tests;

const FIXED_HEADER_LEN: usize = 16;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, FromPrimitive, ToPrimitive)]
pub enum MessageType {
    MethodCall = 1,
    MethodReturn = 2,
    Error = 3,
    Signal = 4,
}

/// A D-Bus message: header fields plus a marshaled body.
///
/// The serial is assigned by the connection when the message is sent.
#[derive(Clone, Debug)]
pub struct Message {
    ty: MessageType,
    flags: u8,
    serial: u32,
    reply_serial: Option<u32>,
    path: Option<ObjectPath>,
    interface: Option<String>,
    member: Option<String>,
    error_name: Option<String>,
    destination: Option<String>,
    sender: Option<String>,
    signature: String,
    body: Vec<u8>,
    fds: Vec<UnixFd>,
    endian: Endian,
}

impl Message {
    fn new(ty: MessageType) -> Self {
        Self {
            ty,
            flags: 0,
            serial: 0,
            reply_serial: None,
            path: None,
            interface: None,
            member: None,
            error_name: None,
            destination: None,
            sender: None,
            signature: String::new(),
            body: vec![],
            fds: vec![],
            endian: Endian::NATIVE,
        }
    }

    pub fn method_call(
        destination: Option<&str>,
        path: &str,
        interface: Option<&str>,
        member: &str,
    ) -> Result<Self, ValidationError> {
        let mut msg = Self::new(MessageType::MethodCall);
        msg.set_destination(destination)?;
        msg.set_path(Some(path))?;
        msg.set_interface(interface)?;
        msg.set_member(Some(member))?;
        Ok(msg)
    }

    pub fn method_return(reply_to: &Message) -> Self {
        let mut msg = Self::new(MessageType::MethodReturn);
        msg.reply_to(reply_to);
        msg
    }

    pub fn error(reply_to: &Message, name: &str, text: Option<&str>) -> Result<Self, DbusError> {
        let mut msg = Self::new(MessageType::Error);
        msg.set_error_name(Some(name))?;
        msg.reply_to(reply_to);
        if let Some(text) = text {
            msg.append(text)?;
        }
        Ok(msg)
    }

    pub fn signal(path: &str, interface: &str, member: &str) -> Result<Self, ValidationError> {
        let mut msg = Self::new(MessageType::Signal);
        msg.set_path(Some(path))?;
        msg.set_interface(Some(interface))?;
        msg.set_member(Some(member))?;
        msg.set_no_reply(true);
        Ok(msg)
    }

    fn reply_to(&mut self, call: &Message) {
        self.flags |= NO_REPLY_EXPECTED;
        self.reply_serial = Some(call.serial);
        self.destination = call.sender.clone();
    }

    pub fn message_type(&self) -> MessageType {
        self.ty
    }

    pub fn flags(&self) -> u8 {
        self.flags
    }

    pub fn serial(&self) -> u32 {
        self.serial
    }

    pub fn reply_serial(&self) -> Option<u32> {
        self.reply_serial
    }

    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    pub fn interface(&self) -> Option<&str> {
        self.interface.as_deref()
    }

    pub fn member(&self) -> Option<&str> {
        self.member.as_deref()
    }

    pub fn error_name(&self) -> Option<&str> {
        self.error_name.as_deref()
    }

    pub fn destination(&self) -> Option<&str> {
        self.destination.as_deref()
    }

    pub fn sender(&self) -> Option<&str> {
        self.sender.as_deref()
    }

    pub fn signature(&self) -> &str {
        &self.signature
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn fds(&self) -> &[UnixFd] {
        &self.fds
    }

    pub fn endian(&self) -> Endian {
        self.endian
    }

    pub fn set_path(&mut self, path: Option<&str>) -> Result<(), ValidationError> {
        self.path = path.map(ObjectPath::new).transpose()?;
        Ok(())
    }

    pub fn set_interface(&mut self, interface: Option<&str>) -> Result<(), ValidationError> {
        if let Some(i) = interface {
            names::validate_interface(i)?;
        }
        self.interface = interface.map(|s| s.to_owned());
        Ok(())
    }

    pub fn set_member(&mut self, member: Option<&str>) -> Result<(), ValidationError> {
        if let Some(m) = member {
            names::validate_member(m)?;
        }
        self.member = member.map(|s| s.to_owned());
        Ok(())
    }

    pub fn set_error_name(&mut self, name: Option<&str>) -> Result<(), ValidationError> {
        if let Some(n) = name {
            names::validate_error_name(n)?;
        }
        self.error_name = name.map(|s| s.to_owned());
        Ok(())
    }

    pub fn set_destination(&mut self, destination: Option<&str>) -> Result<(), ValidationError> {
        if let Some(d) = destination {
            names::validate_bus_name(d)?;
        }
        self.destination = destination.map(|s| s.to_owned());
        Ok(())
    }

    pub fn set_sender(&mut self, sender: Option<&str>) -> Result<(), ValidationError> {
        if let Some(s) = sender {
            names::validate_bus_name(s)?;
        }
        self.sender = sender.map(|s| s.to_owned());
        Ok(())
    }

    pub fn set_reply_serial(&mut self, serial: Option<u32>) {
        self.reply_serial = serial;
    }

    pub fn set_endian(&mut self, endian: Endian) {
        if self.body.is_empty() {
            self.endian = endian;
        }
    }

    fn set_flag(&mut self, flag: u8, set: bool) {
        match set {
            true => self.flags |= flag,
            false => self.flags &= !flag,
        }
    }

    pub fn set_no_reply(&mut self, no_reply: bool) {
        self.set_flag(NO_REPLY_EXPECTED, no_reply);
    }

    pub fn no_reply(&self) -> bool {
        self.flags & NO_REPLY_EXPECTED != 0
    }

    pub fn set_auto_start(&mut self, auto_start: bool) {
        self.set_flag(NO_AUTO_START, !auto_start);
    }

    pub fn auto_start(&self) -> bool {
        self.flags & NO_AUTO_START == 0
    }

    pub fn set_allow_interactive_authorization(&mut self, allow: bool) {
        self.set_flag(ALLOW_INTERACTIVE_AUTHORIZATION, allow);
    }

    pub fn has_path(&self, path: &str) -> bool {
        self.path() == Some(path)
    }

    pub fn has_interface(&self, interface: &str) -> bool {
        self.interface() == Some(interface)
    }

    pub fn has_member(&self, member: &str) -> bool {
        self.member() == Some(member)
    }

    pub fn has_destination(&self, destination: &str) -> bool {
        self.destination() == Some(destination)
    }

    pub fn has_sender(&self, sender: &str) -> bool {
        self.sender() == Some(sender)
    }

    pub fn has_signature(&self, signature: &str) -> bool {
        self.signature == signature
    }

    pub fn is_method_call(&self, interface: &str, member: &str) -> bool {
        self.ty == MessageType::MethodCall
            && self.has_interface(interface)
            && self.has_member(member)
    }

    pub fn is_signal(&self, interface: &str, member: &str) -> bool {
        self.ty == MessageType::Signal && self.has_interface(interface) && self.has_member(member)
    }

    pub fn is_error(&self, name: &str) -> bool {
        self.ty == MessageType::Error && self.error_name() == Some(name)
    }

    pub fn contains_unix_fds(&self) -> bool {
        !self.fds.is_empty()
    }

    /// The leading string argument of an error message.
    pub fn error_text(&self) -> Option<String> {
        if self.ty != MessageType::Error || !self.signature.starts_with('s') {
            return None;
        }
        self.iter().next()?.ok()?.into_string()
    }

    pub fn call_error(&self) -> Option<CallError> {
        if self.ty != MessageType::Error {
            return None;
        }
        Some(CallError {
            name: self.error_name.clone().unwrap_or_default(),
            msg: self.error_text(),
        })
    }

    /// Appends one argument. The message is unchanged if this fails.
    pub fn append(&mut self, value: impl Into<Value>) -> Result<(), DbusError> {
        let value = value.into();
        let sig_len = self.signature.len();
        let body_len = self.body.len();
        let fds_len = self.fds.len();
        let res = self.append_(&value);
        if res.is_err() {
            self.signature.truncate(sig_len);
            self.body.truncate(body_len);
            self.fds.truncate(fds_len);
        }
        res
    }

    /// Appends all arguments or none of them.
    pub fn append_args(&mut self, values: &[Value]) -> Result<(), DbusError> {
        let sig_len = self.signature.len();
        let body_len = self.body.len();
        let fds_len = self.fds.len();
        let res = values.iter().try_for_each(|v| self.append_(v));
        if res.is_err() {
            self.signature.truncate(sig_len);
            self.body.truncate(body_len);
            self.fds.truncate(fds_len);
        }
        res
    }

    fn append_(&mut self, value: &Value) -> Result<(), DbusError> {
        let ty = value.dynamic_type()?;
        ty.write_signature(&mut self.signature);
        if self.signature.len() > MAX_SIGNATURE_LEN {
            return Err(TypeError::SignatureTooLong.into());
        }
        let mut fmt = Formatter::new(&mut self.body, &mut self.fds, self.endian);
        ty.marshal(&mut fmt, value)?;
        Ok(())
    }

    /// Decodes the body lazily. Call again to restart from the first argument.
    pub fn iter(&self) -> ArgIter<'_> {
        let (types, error) = match DynamicType::parse_signature(&self.signature) {
            Ok(t) => (t, None),
            Err(e) => (vec![], Some(e.into())),
        };
        ArgIter {
            parser: Parser::new(&self.body, self.endian, &self.fds),
            types: types.into_iter(),
            error,
        }
    }

    pub fn read_all(&self) -> Result<Vec<Value>, DecodeError> {
        self.iter().collect()
    }

    pub(super) fn marshal(&self, serial: u32) -> Result<Vec<u8>, EncodeError> {
        let Ok(body_len) = u32::try_from(self.body.len()) else {
            return Err(EncodeError::MessageTooLong);
        };
        let mut buf = Vec::with_capacity(128 + self.body.len());
        let mut fds = vec![];
        let mut fmt = Formatter::new(&mut buf, &mut fds, self.endian);
        fmt.write_u8(self.endian.raw());
        fmt.write_u8(self.ty as u8);
        fmt.write_u8(self.flags);
        fmt.write_u8(PROTOCOL_VERSION);
        fmt.write_u32(body_len);
        fmt.write_u32(serial);
        fmt.write_array(8, |fmt| {
            if let Some(path) = &self.path {
                field(fmt, HDR_PATH, "o")?;
                fmt.write_str(path)?;
            }
            str_field(fmt, HDR_INTERFACE, &self.interface)?;
            str_field(fmt, HDR_MEMBER, &self.member)?;
            str_field(fmt, HDR_ERROR_NAME, &self.error_name)?;
            if let Some(serial) = self.reply_serial {
                field(fmt, HDR_REPLY_SERIAL, "u")?;
                fmt.write_u32(serial);
            }
            str_field(fmt, HDR_DESTINATION, &self.destination)?;
            str_field(fmt, HDR_SENDER, &self.sender)?;
            if !self.signature.is_empty() {
                field(fmt, HDR_SIGNATURE, "g")?;
                fmt.write_signature(&self.signature)?;
            }
            if !self.fds.is_empty() {
                field(fmt, HDR_UNIX_FDS, "u")?;
                fmt.write_u32(self.fds.len() as u32);
            }
            Ok(())
        })?;
        fmt.pad_to(8);
        buf.extend_from_slice(&self.body);
        if buf.len() > MAX_MESSAGE_LEN {
            return Err(EncodeError::MessageTooLong);
        }
        Ok(buf)
    }

    /// Decodes one complete frame. Fds announced by the header are taken from the
    /// front of `fds`. Messages of unknown type yield `None`.
    pub(super) fn decode(
        buf: &[u8],
        fds: &mut VecDeque<UnixFd>,
    ) -> Result<Option<Message>, DecodeError> {
        let Some(&endian) = buf.first() else {
            return Err(DecodeError::UnexpectedEof);
        };
        let Some(endian) = Endian::from_raw(endian) else {
            return Err(DecodeError::InvalidEndianess(endian));
        };
        let mut parser = Parser::new(buf, endian, &[]);
        parser.read_u8()?;
        let ty = parser.read_u8()?;
        let flags = parser.read_u8()?;
        let version = parser.read_u8()?;
        if version != PROTOCOL_VERSION {
            return Err(DecodeError::InvalidProtocol(version));
        }
        let body_len = parser.read_u32()? as usize;
        let serial = parser.read_u32()?;
        if serial == 0 {
            return Err(DecodeError::ZeroSerial);
        }
        let fields = parser.read_array_with(8, |p| {
            p.align_to(8)?;
            let code = p.read_u8()?;
            let value = p.read_variant()?;
            Ok((code, value))
        })?;
        parser.align_to(8)?;
        let body = &buf[parser.pos()..];
        if body.len() != body_len {
            return Err(DecodeError::UnexpectedEof);
        }
        let mut msg = Message::new(MessageType::MethodCall);
        msg.flags = flags;
        msg.serial = serial;
        msg.endian = endian;
        let mut num_fds = 0;
        for (code, value) in fields {
            let invalid = || DecodeError::InvalidHeaderField(code);
            match code {
                HDR_PATH => match value {
                    Value::ObjectPath(p) => msg.path = Some(p),
                    _ => return Err(invalid()),
                },
                HDR_INTERFACE | HDR_MEMBER | HDR_ERROR_NAME | HDR_DESTINATION | HDR_SENDER => {
                    let Value::String(s) = value else {
                        return Err(invalid());
                    };
                    match code {
                        HDR_INTERFACE => names::validate_interface(&s)?,
                        HDR_MEMBER => names::validate_member(&s)?,
                        HDR_ERROR_NAME => names::validate_error_name(&s)?,
                        _ => names::validate_bus_name(&s)?,
                    }
                    let slot = match code {
                        HDR_INTERFACE => &mut msg.interface,
                        HDR_MEMBER => &mut msg.member,
                        HDR_ERROR_NAME => &mut msg.error_name,
                        HDR_DESTINATION => &mut msg.destination,
                        _ => &mut msg.sender,
                    };
                    *slot = Some(s);
                }
                HDR_REPLY_SERIAL => match value {
                    Value::U32(s) => msg.reply_serial = Some(s),
                    _ => return Err(invalid()),
                },
                HDR_SIGNATURE => match value {
                    Value::Signature(s) => msg.signature = s.as_str().to_owned(),
                    _ => return Err(invalid()),
                },
                HDR_UNIX_FDS => match value {
                    Value::U32(n) => num_fds = n as usize,
                    _ => return Err(invalid()),
                },
                _ => {}
            }
        }
        if fds.len() < num_fds {
            return Err(DecodeError::TooFewFds);
        }
        msg.fds = fds.drain(..num_fds).collect();
        if msg.signature.is_empty() && !body.is_empty() {
            return Err(DecodeError::MissingHeader("SIGNATURE"));
        }
        msg.body = body.to_vec();
        msg.ty = match MessageType::from_u8(ty) {
            Some(ty) => ty,
            None => return Ok(None),
        };
        let missing = match msg.ty {
            MessageType::MethodCall => {
                first_missing(&[(msg.path.is_some(), "PATH"), (msg.member.is_some(), "MEMBER")])
            }
            MessageType::MethodReturn => {
                first_missing(&[(msg.reply_serial.is_some(), "REPLY_SERIAL")])
            }
            MessageType::Error => first_missing(&[
                (msg.error_name.is_some(), "ERROR_NAME"),
                (msg.reply_serial.is_some(), "REPLY_SERIAL"),
            ]),
            MessageType::Signal => first_missing(&[
                (msg.path.is_some(), "PATH"),
                (msg.interface.is_some(), "INTERFACE"),
                (msg.member.is_some(), "MEMBER"),
            ]),
        };
        if let Some(name) = missing {
            return Err(DecodeError::MissingHeader(name));
        }
        Ok(Some(msg))
    }
}

fn field(fmt: &mut Formatter<'_>, code: u8, sig: &str) -> Result<(), EncodeError> {
    fmt.pad_to(8);
    fmt.write_u8(code);
    fmt.write_signature(sig)
}

fn str_field(
    fmt: &mut Formatter<'_>,
    code: u8,
    v: &Option<String>,
) -> Result<(), EncodeError> {
    if let Some(v) = v {
        field(fmt, code, "s")?;
        fmt.write_str(v)?;
    }
    Ok(())
}

fn first_missing(fields: &[(bool, &'static str)]) -> Option<&'static str> {
    fields
        .iter()
        .find(|(present, _)| !present)
        .map(|(_, name)| *name)
}

/// Returns the length of the frame that starts at `buf` once its fixed header
/// is available.
pub(super) fn frame_len(buf: &[u8]) -> Result<Option<usize>, DecodeError> {
    if buf.len() < FIXED_HEADER_LEN {
        return Ok(None);
    }
    let read_u32 = |b: &[u8]| match Endian::from_raw(buf[0]) {
        Some(Endian::Little) => Ok(LittleEndian::read_u32(b) as usize),
        Some(Endian::Big) => Ok(BigEndian::read_u32(b) as usize),
        None => Err(DecodeError::InvalidEndianess(buf[0])),
    };
    let body_len = read_u32(&buf[4..8])?;
    let fields_len = read_u32(&buf[12..16])?;
    if fields_len > MAX_ARRAY_LEN {
        return Err(DecodeError::ArrayTooLong);
    }
    let header_len = (FIXED_HEADER_LEN + fields_len + 7) & !7;
    let total = header_len + body_len;
    if total > MAX_MESSAGE_LEN {
        return Err(DecodeError::MessageTooLong);
    }
    Ok(Some(total))
}

pub struct ArgIter<'a> {
    parser: Parser<'a>,
    types: vec::IntoIter<DynamicType>,
    error: Option<DecodeError>,
}

impl Iterator for ArgIter<'_> {
    type Item = Result<Value, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(e) = self.error.take() {
            return Some(Err(e));
        }
        let ty = self.types.next()?;
        let res = ty.parse(&mut self.parser);
        if res.is_err() {
            self.types = vec![].into_iter();
        }
        Some(res)
    }
}
