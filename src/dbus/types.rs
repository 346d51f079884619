use {
    crate::dbus::{
        DynamicType, MAX_DEPTH, SignatureError, TY_ARRAY, TY_BOOLEAN, TY_BYTE, TY_DOUBLE,
        TY_INT16, TY_INT32, TY_INT64, TY_OBJECT_PATH, TY_SIGNATURE, TY_STRING, TY_UINT16,
        TY_UINT32, TY_UINT64, TY_UNIX_FD, TY_VARIANT, TypeError, ValidationError, names,
    },
    std::{
        fmt::{self, Debug, Display, Formatter},
        ops::Deref,
        sync::Arc,
    },
    uapi::{OwnedFd, c},
};

#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct Signature(String);

impl Signature {
    pub fn new(s: impl Into<String>) -> Result<Self, ValidationError> {
        let s = s.into();
        match DynamicType::parse_signature(&s) {
            Ok(_) => Ok(Self(s)),
            Err(e) => Err(ValidationError::Signature(s, e)),
        }
    }

    pub(super) fn new_unchecked(s: String) -> Self {
        Self(s)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Deref for Signature {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct ObjectPath(String);

impl ObjectPath {
    pub fn new(s: impl Into<String>) -> Result<Self, ValidationError> {
        let s = s.into();
        names::validate_object_path(&s)?;
        Ok(Self(s))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Deref for ObjectPath {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// A file descriptor carried out of band next to a message.
#[derive(Clone)]
pub struct UnixFd(Arc<OwnedFd>);

impl UnixFd {
    pub fn new(fd: OwnedFd) -> Self {
        Self(Arc::new(fd))
    }

    pub fn raw(&self) -> c::c_int {
        self.0.raw()
    }
}

impl PartialEq for UnixFd {
    fn eq(&self, other: &Self) -> bool {
        self.raw() == other.raw()
    }
}

impl Debug for UnixFd {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "UnixFd({})", self.raw())
    }
}

/// A single argument of a message body.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    U8(u8),
    Bool(bool),
    I16(i16),
    U16(u16),
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),
    F64(f64),
    String(String),
    ObjectPath(ObjectPath),
    Signature(Signature),
    Variant(Box<Value>),
    Fd(UnixFd),
    Array(DynamicType, Vec<Value>),
    DictEntry(Box<Value>, Box<Value>),
    Struct(Vec<Value>),
}

macro_rules! accessor {
    ($name:ident, $variant:ident, $ty:ty) => {
        pub fn $name(&self) -> Option<$ty> {
            match self {
                Value::$variant(v) => Some(*v),
                _ => None,
            }
        }
    };
}

impl Value {
    accessor!(as_u8, U8, u8);
    accessor!(as_bool, Bool, bool);
    accessor!(as_i16, I16, i16);
    accessor!(as_u16, U16, u16);
    accessor!(as_i32, I32, i32);
    accessor!(as_u32, U32, u32);
    accessor!(as_i64, I64, i64);
    accessor!(as_u64, U64, u64);
    accessor!(as_f64, F64, f64);

    pub fn array(ty: DynamicType, values: Vec<Value>) -> Self {
        Value::Array(ty, values)
    }

    /// Builds an `a{..}` value from key/value pairs.
    pub fn dict<I>(key: DynamicType, value: DynamicType, entries: I) -> Self
    where
        I: IntoIterator<Item = (Value, Value)>,
    {
        let entries = entries
            .into_iter()
            .map(|(k, v)| Value::DictEntry(Box::new(k), Box::new(v)))
            .collect();
        Value::Array(
            DynamicType::DictEntry(Box::new(key), Box::new(value)),
            entries,
        )
    }

    pub fn variant(v: impl Into<Value>) -> Self {
        Value::Variant(Box::new(v.into()))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_object_path(&self) -> Option<&ObjectPath> {
        match self {
            Value::ObjectPath(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_signature(&self) -> Option<&Signature> {
        match self {
            Value::Signature(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_fd(&self) -> Option<&UnixFd> {
        match self {
            Value::Fd(fd) => Some(fd),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(_, v) => Some(v),
            _ => None,
        }
    }

    pub fn as_struct(&self) -> Option<&[Value]> {
        match self {
            Value::Struct(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_variant(&self) -> Option<&Value> {
        match self {
            Value::Variant(v) => Some(v),
            _ => None,
        }
    }

    pub fn into_string(self) -> Option<String> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Computes the type of this value, checking that containers are well formed.
    pub fn dynamic_type(&self) -> Result<DynamicType, TypeError> {
        self.dynamic_type_(0)
    }

    fn dynamic_type_(&self, depth: usize) -> Result<DynamicType, TypeError> {
        if depth > MAX_DEPTH {
            return Err(TypeError::TooDeep);
        }
        let ty = match self {
            Value::U8(..) => DynamicType::U8,
            Value::Bool(..) => DynamicType::Bool,
            Value::I16(..) => DynamicType::I16,
            Value::U16(..) => DynamicType::U16,
            Value::I32(..) => DynamicType::I32,
            Value::U32(..) => DynamicType::U32,
            Value::I64(..) => DynamicType::I64,
            Value::U64(..) => DynamicType::U64,
            Value::F64(..) => DynamicType::F64,
            Value::String(..) => DynamicType::String,
            Value::ObjectPath(..) => DynamicType::ObjectPath,
            Value::Signature(..) => DynamicType::Signature,
            Value::Fd(..) => DynamicType::Fd,
            Value::Variant(v) => {
                v.dynamic_type_(depth + 1)?;
                DynamicType::Variant
            }
            Value::Array(el, values) => {
                if let Err(e) = el.validate_element() {
                    return Err(match e {
                        SignatureError::NonBasicDictKey => TypeError::NonBasicDictKey,
                        SignatureError::EmptyStruct => TypeError::EmptyStruct,
                        _ => TypeError::TooDeep,
                    });
                }
                for v in values {
                    let actual = match v {
                        Value::DictEntry(k, v) => {
                            let k = k.dynamic_type_(depth + 1)?;
                            let v = v.dynamic_type_(depth + 1)?;
                            DynamicType::DictEntry(Box::new(k), Box::new(v))
                        }
                        _ => v.dynamic_type_(depth + 1)?,
                    };
                    if &actual != el {
                        return Err(TypeError::HeterogeneousArray(el.signature()));
                    }
                }
                DynamicType::Array(Box::new(el.clone()))
            }
            Value::DictEntry(..) => return Err(TypeError::DictEntryOutsideArray),
            Value::Struct(fields) => {
                if fields.is_empty() {
                    return Err(TypeError::EmptyStruct);
                }
                let mut tys = Vec::with_capacity(fields.len());
                for f in fields {
                    tys.push(f.dynamic_type_(depth + 1)?);
                }
                DynamicType::Struct(tys)
            }
        };
        Ok(ty)
    }

    pub(super) fn type_code(&self) -> u8 {
        match self {
            Value::U8(..) => TY_BYTE,
            Value::Bool(..) => TY_BOOLEAN,
            Value::I16(..) => TY_INT16,
            Value::U16(..) => TY_UINT16,
            Value::I32(..) => TY_INT32,
            Value::U32(..) => TY_UINT32,
            Value::I64(..) => TY_INT64,
            Value::U64(..) => TY_UINT64,
            Value::F64(..) => TY_DOUBLE,
            Value::String(..) => TY_STRING,
            Value::ObjectPath(..) => TY_OBJECT_PATH,
            Value::Signature(..) => TY_SIGNATURE,
            Value::Variant(..) => TY_VARIANT,
            Value::Fd(..) => TY_UNIX_FD,
            Value::Array(..) => TY_ARRAY,
            Value::DictEntry(..) => b'{',
            Value::Struct(..) => b'(',
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Value::U8(v) => write!(f, "byte {}", v),
            Value::Bool(v) => write!(f, "{}", v),
            Value::I16(v) => write!(f, "int16 {}", v),
            Value::U16(v) => write!(f, "uint16 {}", v),
            Value::I32(v) => write!(f, "{}", v),
            Value::U32(v) => write!(f, "uint32 {}", v),
            Value::I64(v) => write!(f, "int64 {}", v),
            Value::U64(v) => write!(f, "uint64 {}", v),
            Value::F64(v) => write!(f, "{:?}", v),
            Value::String(v) => write!(f, "{:?}", v),
            Value::ObjectPath(v) => write!(f, "objectpath {:?}", v.as_str()),
            Value::Signature(v) => write!(f, "signature {:?}", v.as_str()),
            Value::Variant(v) => write!(f, "<{}>", v),
            Value::Fd(v) => write!(f, "handle {}", v.raw()),
            Value::Array(ty, values) => {
                let dict = matches!(ty, DynamicType::DictEntry(..));
                f.write_str(if dict { "{" } else { "[" })?;
                for (idx, v) in values.iter().enumerate() {
                    if idx > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", v)?;
                }
                f.write_str(if dict { "}" } else { "]" })
            }
            Value::DictEntry(k, v) => write!(f, "{}: {}", k, v),
            Value::Struct(fields) => {
                f.write_str("(")?;
                for (idx, v) in fields.iter().enumerate() {
                    if idx > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", v)?;
                }
                if fields.len() == 1 {
                    f.write_str(",")?;
                }
                f.write_str(")")
            }
        }
    }
}

macro_rules! from {
    ($ty:ty, $variant:ident) => {
        impl From<$ty> for Value {
            fn from(v: $ty) -> Self {
                Value::$variant(v)
            }
        }
    };
}

from!(u8, U8);
from!(bool, Bool);
from!(i16, I16);
from!(u16, U16);
from!(i32, I32);
from!(u32, U32);
from!(i64, I64);
from!(u64, U64);
from!(f64, F64);
from!(String, String);
from!(ObjectPath, ObjectPath);
from!(Signature, Signature);
from!(UnixFd, Fd);

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_owned())
    }
}
