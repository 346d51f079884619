use {
    crate::{
        cli::call::{ArgError, parse_arg},
        dbus::{ObjectPath, Value},
    },
};

#[test]
fn basic_types() {
    assert_eq!(parse_arg("y:7").unwrap(), Value::U8(7));
    assert_eq!(parse_arg("b:true").unwrap(), Value::Bool(true));
    assert_eq!(parse_arg("n:-3").unwrap(), Value::I16(-3));
    assert_eq!(parse_arg("t:18446744073709551615").unwrap(), Value::U64(u64::MAX));
    assert_eq!(parse_arg("d:1.5").unwrap(), Value::F64(1.5));
    assert_eq!(parse_arg("s:a:b").unwrap(), Value::from("a:b"));
    assert_eq!(parse_arg("s:").unwrap(), Value::from(""));
    assert_eq!(
        parse_arg("o:/org/example").unwrap(),
        Value::from(ObjectPath::new("/org/example").unwrap())
    );
    assert_eq!(
        parse_arg("v:u:5").unwrap(),
        Value::variant(5u32)
    );
}

#[test]
fn errors() {
    assert!(matches!(parse_arg("5"), Err(ArgError::MissingType(_))));
    assert!(matches!(parse_arg("z:5"), Err(ArgError::UnknownType(t)) if t == "z"));
    assert!(matches!(parse_arg("y:256"), Err(ArgError::InvalidValue(..))));
    assert!(matches!(parse_arg("b:yes"), Err(ArgError::InvalidValue(..))));
    assert!(matches!(parse_arg("o:nope"), Err(ArgError::Validation(_))));
    assert!(matches!(parse_arg("g:a{"), Err(ArgError::Validation(_))));
}
