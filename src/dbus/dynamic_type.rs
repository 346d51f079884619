use {
    crate::dbus::{
        DecodeError, DynamicType, EncodeError, Formatter, MAX_ARRAY_DEPTH, MAX_SIGNATURE_LEN,
        MAX_STRUCT_DEPTH, Parser, SignatureError, TY_ARRAY, TY_BOOLEAN, TY_BYTE, TY_DOUBLE,
        TY_INT16, TY_INT32, TY_INT64, TY_OBJECT_PATH, TY_SIGNATURE, TY_STRING, TY_UINT16,
        TY_UINT32, TY_UINT64, TY_UNIX_FD, TY_VARIANT,
        types::Value,
    },
    std::fmt::{self, Display},
};

#[derive(Copy, Clone, Default)]
struct Nesting {
    arrays: usize,
    structs: usize,
}

impl Nesting {
    fn array(self) -> Result<Self, SignatureError> {
        if self.arrays >= MAX_ARRAY_DEPTH {
            return Err(SignatureError::TooDeep);
        }
        Ok(Self {
            arrays: self.arrays + 1,
            ..self
        })
    }

    fn structure(self) -> Result<Self, SignatureError> {
        if self.structs >= MAX_STRUCT_DEPTH {
            return Err(SignatureError::TooDeep);
        }
        Ok(Self {
            structs: self.structs + 1,
            ..self
        })
    }
}

impl DynamicType {
    /// Parses the first complete type of `s` and returns the unparsed remainder.
    pub fn from_signature(s: &[u8]) -> Result<(DynamicType, &[u8]), SignatureError> {
        Self::from_signature_(s, Nesting::default(), false)
    }

    fn from_signature_(
        s: &[u8],
        nesting: Nesting,
        in_array: bool,
    ) -> Result<(DynamicType, &[u8]), SignatureError> {
        let Some((&first, mut s)) = s.split_first() else {
            return Err(SignatureError::Empty);
        };
        let dp = match first {
            TY_BYTE => DynamicType::U8,
            TY_BOOLEAN => DynamicType::Bool,
            TY_INT16 => DynamicType::I16,
            TY_UINT16 => DynamicType::U16,
            TY_INT32 => DynamicType::I32,
            TY_UINT32 => DynamicType::U32,
            TY_INT64 => DynamicType::I64,
            TY_UINT64 => DynamicType::U64,
            TY_DOUBLE => DynamicType::F64,
            TY_STRING => DynamicType::String,
            TY_OBJECT_PATH => DynamicType::ObjectPath,
            TY_SIGNATURE => DynamicType::Signature,
            TY_VARIANT => DynamicType::Variant,
            TY_UNIX_FD => DynamicType::Fd,
            TY_ARRAY => {
                let (elty, rem) = Self::from_signature_(s, nesting.array()?, true)?;
                s = rem;
                DynamicType::Array(Box::new(elty))
            }
            b'{' => {
                if !in_array {
                    return Err(SignatureError::DictOutsideArray);
                }
                let nesting = nesting.structure()?;
                let (keyty, rem) = Self::from_signature_(s, nesting, false)?;
                if !keyty.is_basic() {
                    return Err(SignatureError::NonBasicDictKey);
                }
                let (valty, rem) = Self::from_signature_(rem, nesting, false)?;
                match rem.split_first() {
                    None => return Err(SignatureError::UnterminatedDict),
                    Some((b'}', rem)) => s = rem,
                    Some(_) => return Err(SignatureError::DictTrailing),
                }
                DynamicType::DictEntry(Box::new(keyty), Box::new(valty))
            }
            b'(' => {
                let nesting = nesting.structure()?;
                let mut fields = vec![];
                loop {
                    match s.split_first() {
                        None => return Err(SignatureError::UnterminatedStruct),
                        Some((b')', rem)) => {
                            s = rem;
                            break;
                        }
                        _ => {}
                    }
                    let (fieldty, rem) = Self::from_signature_(s, nesting, false)?;
                    s = rem;
                    fields.push(fieldty);
                }
                if fields.is_empty() {
                    return Err(SignatureError::EmptyStruct);
                }
                DynamicType::Struct(fields)
            }
            _ => return Err(SignatureError::UnknownType(first)),
        };
        Ok((dp, s))
    }

    /// Parses a sequence of complete types. The empty signature is valid.
    pub fn parse_signature(s: &str) -> Result<Vec<DynamicType>, SignatureError> {
        if s.len() > MAX_SIGNATURE_LEN {
            return Err(SignatureError::TooLong);
        }
        let mut s = s.as_bytes();
        let mut res = vec![];
        while !s.is_empty() {
            let (ty, rem) = Self::from_signature(s)?;
            res.push(ty);
            s = rem;
        }
        Ok(res)
    }

    /// Parses a signature that must contain exactly one complete type.
    pub fn parse_single(s: &str) -> Result<DynamicType, SignatureError> {
        if s.len() > MAX_SIGNATURE_LEN {
            return Err(SignatureError::TooLong);
        }
        let (ty, rem) = Self::from_signature(s.as_bytes())?;
        if !rem.is_empty() {
            return Err(SignatureError::NotSingleType);
        }
        Ok(ty)
    }

    /// Checks that this type can appear as the element type of an array.
    pub(super) fn validate_element(&self) -> Result<(), SignatureError> {
        self.validate(Nesting::default().array()?, true)
    }

    fn validate(&self, nesting: Nesting, in_array: bool) -> Result<(), SignatureError> {
        match self {
            DynamicType::Array(el) => el.validate(nesting.array()?, true),
            DynamicType::DictEntry(k, v) => {
                if !in_array {
                    return Err(SignatureError::DictOutsideArray);
                }
                if !k.is_basic() {
                    return Err(SignatureError::NonBasicDictKey);
                }
                let nesting = nesting.structure()?;
                v.validate(nesting, false)
            }
            DynamicType::Struct(fields) => {
                if fields.is_empty() {
                    return Err(SignatureError::EmptyStruct);
                }
                let nesting = nesting.structure()?;
                fields.iter().try_for_each(|f| f.validate(nesting, false))
            }
            _ => Ok(()),
        }
    }

    pub fn is_basic(&self) -> bool {
        !matches!(
            self,
            DynamicType::Variant
                | DynamicType::Array(_)
                | DynamicType::DictEntry(..)
                | DynamicType::Struct(_)
        )
    }

    pub fn alignment(&self) -> usize {
        match self {
            DynamicType::U8 => 1,
            DynamicType::Bool => 4,
            DynamicType::I16 => 2,
            DynamicType::U16 => 2,
            DynamicType::I32 => 4,
            DynamicType::U32 => 4,
            DynamicType::I64 => 8,
            DynamicType::U64 => 8,
            DynamicType::F64 => 8,
            DynamicType::String => 4,
            DynamicType::ObjectPath => 4,
            DynamicType::Signature => 1,
            DynamicType::Variant => 1,
            DynamicType::Array(_) => 4,
            DynamicType::DictEntry(_, _) => 8,
            DynamicType::Struct(_) => 8,
            DynamicType::Fd => 4,
        }
    }

    pub fn write_signature(&self, w: &mut String) {
        let c = match self {
            DynamicType::U8 => TY_BYTE,
            DynamicType::Bool => TY_BOOLEAN,
            DynamicType::I16 => TY_INT16,
            DynamicType::U16 => TY_UINT16,
            DynamicType::I32 => TY_INT32,
            DynamicType::U32 => TY_UINT32,
            DynamicType::I64 => TY_INT64,
            DynamicType::U64 => TY_UINT64,
            DynamicType::F64 => TY_DOUBLE,
            DynamicType::String => TY_STRING,
            DynamicType::ObjectPath => TY_OBJECT_PATH,
            DynamicType::Signature => TY_SIGNATURE,
            DynamicType::Variant => TY_VARIANT,
            DynamicType::Fd => TY_UNIX_FD,
            DynamicType::Array(el) => {
                w.push(TY_ARRAY as char);
                el.write_signature(w);
                return;
            }
            DynamicType::DictEntry(k, v) => {
                w.push('{');
                k.write_signature(w);
                v.write_signature(w);
                w.push('}');
                return;
            }
            DynamicType::Struct(f) => {
                w.push('(');
                for f in f {
                    f.write_signature(w);
                }
                w.push(')');
                return;
            }
        };
        w.push(c as char);
    }

    pub fn signature(&self) -> String {
        let mut s = String::new();
        self.write_signature(&mut s);
        s
    }

    pub(super) fn parse(&self, parser: &mut Parser<'_>) -> Result<Value, DecodeError> {
        let var = match self {
            DynamicType::U8 => Value::U8(parser.read_u8()?),
            DynamicType::Bool => Value::Bool(parser.read_bool()?),
            DynamicType::I16 => Value::I16(parser.read_i16()?),
            DynamicType::U16 => Value::U16(parser.read_u16()?),
            DynamicType::I32 => Value::I32(parser.read_i32()?),
            DynamicType::U32 => Value::U32(parser.read_u32()?),
            DynamicType::I64 => Value::I64(parser.read_i64()?),
            DynamicType::U64 => Value::U64(parser.read_u64()?),
            DynamicType::F64 => Value::F64(parser.read_f64()?),
            DynamicType::String => Value::String(parser.read_string()?.to_owned()),
            DynamicType::ObjectPath => Value::ObjectPath(parser.read_object_path()?),
            DynamicType::Signature => Value::Signature(parser.read_signature()?),
            DynamicType::Variant => Value::Variant(Box::new(parser.read_variant()?)),
            DynamicType::Fd => Value::Fd(parser.read_fd()?),
            DynamicType::Array(el) => {
                let values = parser.read_array_with(el.alignment(), |p| el.parse(p))?;
                Value::Array((**el).clone(), values)
            }
            DynamicType::DictEntry(k, v) => {
                parser.align_to(8)?;
                let k = parser.nested(|p| k.parse(p))?;
                let v = parser.nested(|p| v.parse(p))?;
                Value::DictEntry(Box::new(k), Box::new(v))
            }
            DynamicType::Struct(fields) => {
                parser.align_to(8)?;
                let mut res = Vec::with_capacity(fields.len());
                for field in fields {
                    res.push(parser.nested(|p| field.parse(p))?);
                }
                Value::Struct(res)
            }
        };
        Ok(var)
    }

    pub(super) fn marshal(&self, fmt: &mut Formatter<'_>, value: &Value) -> Result<(), EncodeError> {
        match (self, value) {
            (DynamicType::U8, Value::U8(v)) => fmt.write_u8(*v),
            (DynamicType::Bool, Value::Bool(v)) => fmt.write_u32(*v as u32),
            (DynamicType::I16, Value::I16(v)) => fmt.write_i16(*v),
            (DynamicType::U16, Value::U16(v)) => fmt.write_u16(*v),
            (DynamicType::I32, Value::I32(v)) => fmt.write_i32(*v),
            (DynamicType::U32, Value::U32(v)) => fmt.write_u32(*v),
            (DynamicType::I64, Value::I64(v)) => fmt.write_i64(*v),
            (DynamicType::U64, Value::U64(v)) => fmt.write_u64(*v),
            (DynamicType::F64, Value::F64(v)) => fmt.write_f64(*v),
            (DynamicType::String, Value::String(v)) => fmt.write_str(v)?,
            (DynamicType::ObjectPath, Value::ObjectPath(v)) => fmt.write_str(v)?,
            (DynamicType::Signature, Value::Signature(v)) => fmt.write_signature(v)?,
            (DynamicType::Variant, Value::Variant(v)) => fmt.write_variant(v)?,
            (DynamicType::Fd, Value::Fd(v)) => fmt.write_fd(v),
            (DynamicType::Array(el), Value::Array(actual, values)) if **el == *actual => {
                fmt.write_array(el.alignment(), |fmt| {
                    values.iter().try_for_each(|v| el.marshal(fmt, v))
                })?;
            }
            (DynamicType::DictEntry(kt, vt), Value::DictEntry(k, v)) => {
                fmt.pad_to(8);
                kt.marshal(fmt, k)?;
                vt.marshal(fmt, v)?;
            }
            (DynamicType::Struct(tys), Value::Struct(fields)) if tys.len() == fields.len() => {
                fmt.pad_to(8);
                for (ty, field) in tys.iter().zip(fields) {
                    ty.marshal(fmt, field)?;
                }
            }
            _ => {
                let actual = match value.dynamic_type() {
                    Ok(ty) => ty.signature(),
                    Err(_) => (value.type_code() as char).to_string(),
                };
                return Err(EncodeError::SignatureMismatch {
                    expected: self.signature(),
                    actual,
                });
            }
        }
        Ok(())
    }
}

impl Display for DynamicType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.signature())
    }
}
