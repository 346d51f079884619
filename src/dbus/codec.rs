use crate::dbus::{
    DecodeError, DynamicType, EncodeError, Endian, Formatter, Parser,
    types::{UnixFd, Value},
};


/// Marshals `values` according to `signature`.
///
/// Fd values are written as indices. Use [`Message`](super::Message) to transfer the
/// descriptors themselves.
pub fn encode(values: &[Value], signature: &str, endian: Endian) -> Result<Vec<u8>, EncodeError> {
    let mut buf = vec![];
    let mut fds = vec![];
    encode_with_fds(&mut buf, &mut fds, values, signature, endian)?;
    Ok(buf)
}

/// Unmarshals the values described by `signature` from the start of `bytes`.
///
/// Returns the values and the number of bytes consumed.
pub fn decode(
    bytes: &[u8],
    signature: &str,
    endian: Endian,
) -> Result<(Vec<Value>, usize), DecodeError> {
    decode_with_fds(bytes, signature, endian, &[])
}

pub(super) fn encode_with_fds(
    buf: &mut Vec<u8>,
    fds: &mut Vec<UnixFd>,
    values: &[Value],
    signature: &str,
    endian: Endian,
) -> Result<(), EncodeError> {
    let types = DynamicType::parse_signature(signature)?;
    if types.len() != values.len() {
        return Err(EncodeError::ValueCount {
            expected: types.len(),
            actual: values.len(),
        });
    }
    let mut fmt = Formatter::new(buf, fds, endian);
    for (ty, value) in types.iter().zip(values) {
        ty.marshal(&mut fmt, value)?;
    }
    Ok(())
}

pub(super) fn decode_with_fds(
    bytes: &[u8],
    signature: &str,
    endian: Endian,
    fds: &[UnixFd],
) -> Result<(Vec<Value>, usize), DecodeError> {
    let types = DynamicType::parse_signature(signature)?;
    let mut parser = Parser::new(bytes, endian, fds);
    let mut values = Vec::with_capacity(types.len());
    for ty in &types {
        values.push(ty.parse(&mut parser)?);
    }
    Ok((values, parser.pos()))
}
