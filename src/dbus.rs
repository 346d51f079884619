use {
    crate::utils::oserror::OsError,
    bstr::BString,
    num_derive::{FromPrimitive, ToPrimitive},
    std::fmt::{Display, Formatter as FmtFormatter},
    thiserror::Error,
};

pub use {
    address::{AddressEntry, BusAddress, ResolvedAddress, UnixSocketAddr},
    bus::{ReleaseNameReply, RequestNameReply},
    codec::{decode, encode},
    connection::{Connection, ConnectionState},
    handlers::{HandlerRegistration, HandlerResult, MessageHandler},
    match_rule::MatchRule,
    message::{ArgIter, Message, MessageType},
    pending::{DEFAULT_TIMEOUT, PendingCall, Timeout},
    transport::{Transport, UnixTransport},
    types::{ObjectPath, Signature, UnixFd, Value},
};

mod address;
mod auth;
mod bus;
mod codec;
mod connection;
mod dynamic_type;
mod formatter;
mod handlers;
mod holder;
mod incoming;
mod match_rule;
mod message;
pub mod names;
mod outgoing;
mod parser;
mod pending;
#[cfg(test)]
mod test_bus;
mod transport;
mod types;

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct CallError {
    pub name: String,
    pub msg: Option<String>,
}

impl Display for CallError {
    fn fmt(&self, f: &mut FmtFormatter<'_>) -> std::fmt::Result {
        if let Some(msg) = &self.msg {
            write!(f, "{}: {}", self.name, msg)
        } else {
            write!(f, "{}", self.name)
        }
    }
}

/// A name or path that violates the D-Bus naming grammar.
#[derive(Debug, Clone, Error, Eq, PartialEq)]
pub enum ValidationError {
    #[error("`{0}` is not a valid object path")]
    ObjectPath(String),
    #[error("`{0}` is not a valid interface name")]
    Interface(String),
    #[error("`{0}` is not a valid member name")]
    Member(String),
    #[error("`{0}` is not a valid error name")]
    ErrorName(String),
    #[error("`{0}` is not a valid bus name")]
    BusName(String),
    #[error("`{0}` is not a valid signature")]
    Signature(String, #[source] SignatureError),
}

#[derive(Debug, Clone, Error, Eq, PartialEq)]
pub enum SignatureError {
    #[error("Signature is empty")]
    Empty,
    #[error("Signature is longer than 255 bytes")]
    TooLong,
    #[error("Encountered an unknown type `{}` in a signature", *.0 as char)]
    UnknownType(u8),
    #[error("Struct signature does not contain a terminating ')'")]
    UnterminatedStruct,
    #[error("Struct signature contains no fields")]
    EmptyStruct,
    #[error("Dict signature does not contain a terminating '}}'")]
    UnterminatedDict,
    #[error("Dict signature contains trailing types")]
    DictTrailing,
    #[error("Dict entry appears outside of an array")]
    DictOutsideArray,
    #[error("Dict key is not a basic type")]
    NonBasicDictKey,
    #[error("Signature nests containers too deeply")]
    TooDeep,
    #[error("Signature is not a single complete type")]
    NotSingleType,
}

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("Value of type `{actual}` does not match signature `{expected}`")]
    SignatureMismatch { expected: String, actual: String },
    #[error("Signature describes {expected} values but {actual} were supplied")]
    ValueCount { expected: usize, actual: usize },
    #[error("String contains an embedded nul byte")]
    EmbeddedNul,
    #[error("`{0}` is not a valid object path")]
    InvalidObjectPath(String),
    #[error("Array is larger than 64 MiB")]
    ArrayTooLong,
    #[error("Message is larger than 128 MiB")]
    MessageTooLong,
    #[error("Length does not fit into 32 bits")]
    LengthOverflow,
    #[error(transparent)]
    Signature(#[from] SignatureError),
    #[error(transparent)]
    Type(#[from] TypeError),
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Unexpected end of message")]
    UnexpectedEof,
    #[error("String does not contain valid UTF-8")]
    InvalidUtf8,
    #[error("String is not terminated by a nul byte")]
    MissingNul,
    #[error("String contains an embedded nul byte")]
    EmbeddedNul,
    #[error("Boolean value was not 0 or 1")]
    InvalidBoolValue,
    #[error("Padding contains non-zero bytes")]
    NonZeroPadding,
    #[error("Array is larger than 64 MiB")]
    ArrayTooLong,
    #[error("FD index is out of bounds")]
    OobFds,
    #[error("Peer did not send enough fds")]
    TooFewFds,
    #[error("`{0}` is not a valid object path")]
    InvalidObjectPath(String),
    #[error("Values are nested too deeply")]
    TooDeep,
    #[error("Message has an invalid endianess marker {0:#x}")]
    InvalidEndianess(u8),
    #[error("Peer speaks an unexpected protocol version {0}")]
    InvalidProtocol(u8),
    #[error("Message is larger than 128 MiB")]
    MessageTooLong,
    #[error("Message has serial 0")]
    ZeroSerial,
    #[error("Header field {0} has an invalid type")]
    InvalidHeaderField(u8),
    #[error("Message does not contain the required {0} header")]
    MissingHeader(&'static str),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Signature(#[from] SignatureError),
}

/// A value whose shape cannot be represented in a message body.
#[derive(Debug, Clone, Error, Eq, PartialEq)]
pub enum TypeError {
    #[error("Array elements do not have the declared element type `{0}`")]
    HeterogeneousArray(String),
    #[error("Dict key is not a basic type")]
    NonBasicDictKey,
    #[error("Struct contains no fields")]
    EmptyStruct,
    #[error("Dict entry appears outside of an array")]
    DictEntryOutsideArray,
    #[error("Body signature would be longer than 255 bytes")]
    SignatureTooLong,
    #[error("Values are nested too deeply")]
    TooDeep,
}

#[derive(Debug, Error)]
pub enum DbusError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("Could not encode a message")]
    Encode(#[from] EncodeError),
    #[error("Could not decode a message")]
    Decode(#[from] DecodeError),
    #[error("Value cannot be represented in a message")]
    Type(#[from] TypeError),
    #[error("Server did not accept our authentication")]
    Auth,
    #[error("Server sent an unexpected authentication response `{0}`")]
    AuthProtocol(String),
    #[error("The method call timed out")]
    Timeout,
    #[error("The connection is closed")]
    ConnectionClosed,
    #[error("The peer closed the connection")]
    Hangup,
    #[error("{0}")]
    CallError(CallError),
    #[error("Blocking on a reply from the dispatch thread would deadlock")]
    WouldDeadlock,
    #[error("Connection does not support fd passing")]
    UnixFd,
    #[error("Object path {0} already has a handler")]
    ObjectPathInUse(String),
    #[error("Reply has signature `{actual}` but `{expected}` was expected")]
    UnexpectedSignature {
        expected: &'static str,
        actual: String,
    },
    #[error("Bus returned an unknown reply code {0}")]
    UnknownReplyCode(u32),
    #[error("The connection is not registered with a bus")]
    NoUniqueName,
    #[error("No address is known for the {0}")]
    NoAddress(&'static str),
    #[error("Address `{0}` is malformed")]
    InvalidAddress(String),
    #[error("Address `{0}` contains no supported transport")]
    UnsupportedAddress(String),
    #[error("Socket path {0} is too long")]
    PathTooLong(BString),
    #[error("Could not create a socket")]
    Socket(#[source] OsError),
    #[error("Could not connect to {0}")]
    Connect(BString, #[source] OsError),
    #[error("Could not write to the dbus socket")]
    WriteError(#[source] OsError),
    #[error("Could not read from the dbus socket")]
    ReadError(#[source] OsError),
    #[error("Could not spawn the dispatch thread")]
    SpawnThread(#[source] OsError),
}

/// The byte order of a marshaled message.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Endian {
    Little,
    Big,
}

impl Endian {
    #[cfg(target_endian = "little")]
    pub const NATIVE: Self = Self::Little;
    #[cfg(not(target_endian = "little"))]
    pub const NATIVE: Self = Self::Big;

    pub fn from_raw(b: u8) -> Option<Self> {
        match b {
            LITTLE_ENDIAN => Some(Self::Little),
            BIG_ENDIAN => Some(Self::Big),
            _ => None,
        }
    }

    pub fn raw(self) -> u8 {
        match self {
            Self::Little => LITTLE_ENDIAN,
            Self::Big => BIG_ENDIAN,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, FromPrimitive, ToPrimitive)]
pub enum BusType {
    Session = 0,
    System = 1,
    Starter = 2,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, FromPrimitive, ToPrimitive)]
pub enum DispatchStatus {
    DataRemains = 0,
    Complete = 1,
    NeedMemory = 2,
}

pub const TY_BYTE: u8 = b'y';
pub const TY_BOOLEAN: u8 = b'b';
pub const TY_INT16: u8 = b'n';
pub const TY_UINT16: u8 = b'q';
pub const TY_INT32: u8 = b'i';
pub const TY_UINT32: u8 = b'u';
pub const TY_INT64: u8 = b'x';
pub const TY_UINT64: u8 = b't';
pub const TY_DOUBLE: u8 = b'd';
pub const TY_STRING: u8 = b's';
pub const TY_OBJECT_PATH: u8 = b'o';
pub const TY_SIGNATURE: u8 = b'g';
pub const TY_ARRAY: u8 = b'a';
pub const TY_VARIANT: u8 = b'v';
pub const TY_UNIX_FD: u8 = b'h';

const HDR_PATH: u8 = 1;
const HDR_INTERFACE: u8 = 2;
const HDR_MEMBER: u8 = 3;
const HDR_ERROR_NAME: u8 = 4;
const HDR_REPLY_SERIAL: u8 = 5;
const HDR_DESTINATION: u8 = 6;
const HDR_SENDER: u8 = 7;
const HDR_SIGNATURE: u8 = 8;
const HDR_UNIX_FDS: u8 = 9;

const NO_REPLY_EXPECTED: u8 = 0x1;
const NO_AUTO_START: u8 = 0x2;
const ALLOW_INTERACTIVE_AUTHORIZATION: u8 = 0x4;

const LITTLE_ENDIAN: u8 = b'l';
const BIG_ENDIAN: u8 = b'B';
const PROTOCOL_VERSION: u8 = 1;

const MAX_SIGNATURE_LEN: usize = 255;
const MAX_NAME_LEN: usize = 255;
const MAX_ARRAY_LEN: usize = 1 << 26;
const MAX_MESSAGE_LEN: usize = 1 << 27;
const MAX_ARRAY_DEPTH: usize = 32;
const MAX_STRUCT_DEPTH: usize = 32;
const MAX_DEPTH: usize = MAX_ARRAY_DEPTH + MAX_STRUCT_DEPTH;

pub const BUS_DEST: &str = "org.freedesktop.DBus";
pub const BUS_PATH: &str = "/org/freedesktop/DBus";
pub const BUS_INTERFACE: &str = "org.freedesktop.DBus";

pub const DBUS_NAME_FLAG_ALLOW_REPLACEMENT: u32 = 0x1;
pub const DBUS_NAME_FLAG_REPLACE_EXISTING: u32 = 0x2;
pub const DBUS_NAME_FLAG_DO_NOT_QUEUE: u32 = 0x4;

/// The type of a single complete value, parsed from a signature.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum DynamicType {
    U8,
    Bool,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    F64,
    String,
    ObjectPath,
    Signature,
    Variant,
    Fd,
    Array(Box<DynamicType>),
    DictEntry(Box<DynamicType>, Box<DynamicType>),
    Struct(Vec<DynamicType>),
}

pub struct Parser<'a> {
    buf: &'a [u8],
    pos: usize,
    endian: Endian,
    fds: &'a [UnixFd],
    depth: usize,
}

pub struct Formatter<'a> {
    buf: &'a mut Vec<u8>,
    fds: &'a mut Vec<UnixFd>,
    endian: Endian,
}
