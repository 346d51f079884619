use {
    crate::dbus::{
        CallError, DbusError, DecodeError, DynamicType, Endian, MessageType, TypeError,
        ValidationError, Value,
        message::{Message, frame_len},
    },
    std::collections::VecDeque,
};

fn round_trip(msg: &Message, serial: u32) -> Message {
    let bytes = msg.marshal(serial).unwrap();
    assert_eq!(frame_len(&bytes).unwrap(), Some(bytes.len()));
    let mut fds = VecDeque::new();
    Message::decode(&bytes, &mut fds).unwrap().unwrap()
}

#[test]
fn constructors_validate() {
    let res = Message::method_call(None, "no-slash", None, "Ping");
    assert_eq!(
        res.unwrap_err(),
        ValidationError::ObjectPath("no-slash".to_owned())
    );
    let res = Message::method_call(None, "/", Some("iface"), "Ping");
    assert!(matches!(res, Err(ValidationError::Interface(_))));
    let res = Message::method_call(None, "/", None, "Pi.ng");
    assert!(matches!(res, Err(ValidationError::Member(_))));
    let res = Message::method_call(Some("bad"), "/", None, "Ping");
    assert!(matches!(res, Err(ValidationError::BusName(_))));
    let res = Message::signal("/", "a.b", "1x");
    assert!(matches!(res, Err(ValidationError::Member(_))));
    let call = Message::method_call(None, "/", None, "Ping").unwrap();
    let res = Message::error(&call, "NotAnErrorName", None);
    assert!(matches!(
        res,
        Err(DbusError::Validation(ValidationError::ErrorName(_)))
    ));
}

#[test]
fn append_and_iterate() {
    let mut msg = Message::method_call(Some("org.example"), "/a", Some("a.b"), "M").unwrap();
    msg.append(7u32).unwrap();
    msg.append("x").unwrap();
    msg.append(Value::array(DynamicType::String, vec!["y".into()]))
        .unwrap();
    assert_eq!(msg.signature(), "usas");
    let mut iter = msg.iter();
    assert_eq!(iter.next().unwrap().unwrap(), Value::U32(7));
    assert_eq!(iter.next().unwrap().unwrap(), Value::String("x".to_owned()));
    assert!(iter.next().unwrap().is_ok());
    assert!(iter.next().is_none());
    assert!(iter.next().is_none());
    let mut iter = msg.iter();
    assert_eq!(iter.next().unwrap().unwrap(), Value::U32(7));
    assert_eq!(msg.read_all().unwrap().len(), 3);
}

#[test]
fn failed_append_leaves_message_unchanged() {
    let mut msg = Message::signal("/", "a.b", "S").unwrap();
    msg.append(1u8).unwrap();
    let body = msg.body().to_vec();
    let bad = Value::array(DynamicType::I32, vec![Value::U8(1)]);
    assert!(matches!(
        msg.append(bad),
        Err(DbusError::Type(TypeError::HeterogeneousArray(_)))
    ));
    let res = msg.append_args(&[Value::U32(1), Value::Struct(vec![])]);
    assert!(matches!(res, Err(DbusError::Type(TypeError::EmptyStruct))));
    assert_eq!(msg.signature(), "y");
    assert_eq!(msg.body(), &body[..]);
}

#[test]
fn type_errors() {
    let mut msg = Message::signal("/", "a.b", "S").unwrap();
    let entry = Value::DictEntry(Box::new(1u32.into()), Box::new(2u32.into()));
    assert!(matches!(
        msg.append(entry),
        Err(DbusError::Type(TypeError::DictEntryOutsideArray))
    ));
    let dict = Value::Array(
        DynamicType::DictEntry(Box::new(DynamicType::Variant), Box::new(DynamicType::U8)),
        vec![],
    );
    assert!(matches!(
        msg.append(dict),
        Err(DbusError::Type(TypeError::NonBasicDictKey))
    ));
    for _ in 0..255 {
        msg.append(0u8).unwrap();
    }
    assert!(matches!(
        msg.append(0u8),
        Err(DbusError::Type(TypeError::SignatureTooLong))
    ));
    assert_eq!(msg.signature().len(), 255);
}

#[test]
fn replies_address_the_caller() {
    let mut call = Message::method_call(Some(":1.1"), "/obj", Some("a.b"), "M").unwrap();
    call.set_sender(Some(":1.7")).unwrap();
    let call = round_trip(&call, 42);
    assert_eq!(call.serial(), 42);
    let reply = Message::method_return(&call);
    assert_eq!(reply.message_type(), MessageType::MethodReturn);
    assert_eq!(reply.reply_serial(), Some(42));
    assert_eq!(reply.destination(), Some(":1.7"));
    assert!(reply.no_reply());
    let err = Message::error(&call, "org.example.Error.Failed", Some("broken")).unwrap();
    assert_eq!(err.reply_serial(), Some(42));
    assert_eq!(err.destination(), Some(":1.7"));
    assert_eq!(err.error_text().as_deref(), Some("broken"));
    assert!(err.is_error("org.example.Error.Failed"));
    assert_eq!(
        err.call_error(),
        Some(CallError {
            name: "org.example.Error.Failed".to_owned(),
            msg: Some("broken".to_owned()),
        })
    );
    assert_eq!(reply.call_error(), None);
}

#[test]
fn marshal_round_trip() {
    for endian in [Endian::Little, Endian::Big] {
        let mut msg = Message::method_call(
            Some("org.freedesktop.DBus"),
            "/org/freedesktop/DBus",
            Some("org.freedesktop.DBus"),
            "RequestName",
        )
        .unwrap();
        msg.set_endian(endian);
        msg.set_auto_start(false);
        msg.append("org.example.Name").unwrap();
        msg.append(4u32).unwrap();
        let decoded = round_trip(&msg, 3);
        assert_eq!(decoded.endian(), endian);
        assert_eq!(decoded.message_type(), MessageType::MethodCall);
        assert!(decoded.is_method_call("org.freedesktop.DBus", "RequestName"));
        assert!(decoded.has_path("/org/freedesktop/DBus"));
        assert!(decoded.has_destination("org.freedesktop.DBus"));
        assert!(!decoded.auto_start());
        assert!(!decoded.no_reply());
        assert_eq!(decoded.signature(), "su");
        assert_eq!(
            decoded.read_all().unwrap(),
            [Value::from("org.example.Name"), Value::U32(4)]
        );
    }
}

#[test]
fn header_is_padded_to_eight() {
    let msg = Message::signal("/", "a.b", "S").unwrap();
    let bytes = msg.marshal(1).unwrap();
    assert_eq!(bytes.len() % 8, 0);
    assert_eq!(bytes[3], 1);
    assert_eq!(bytes[1], MessageType::Signal as u8);
}

#[test]
fn missing_headers() {
    let call = Message::method_call(None, "/", None, "M").unwrap();
    let mut reply = Message::method_return(&call);
    reply.set_reply_serial(None);
    let bytes = reply.marshal(2).unwrap();
    let res = Message::decode(&bytes, &mut VecDeque::new());
    assert!(matches!(
        res,
        Err(DecodeError::MissingHeader("REPLY_SERIAL"))
    ));
}

#[test]
fn zero_serial_is_rejected() {
    let msg = Message::signal("/", "a.b", "S").unwrap();
    let bytes = msg.marshal(0).unwrap();
    let res = Message::decode(&bytes, &mut VecDeque::new());
    assert!(matches!(res, Err(DecodeError::ZeroSerial)));
}

#[test]
fn unknown_message_types_are_skipped() {
    let msg = Message::signal("/", "a.b", "S").unwrap();
    let mut bytes = msg.marshal(5).unwrap();
    bytes[1] = 9;
    let res = Message::decode(&bytes, &mut VecDeque::new()).unwrap();
    assert!(res.is_none());
}

#[test]
fn frame_len_needs_fixed_header() {
    let msg = Message::signal("/a", "a.b", "S").unwrap();
    let bytes = msg.marshal(5).unwrap();
    assert_eq!(frame_len(&bytes[..15]).unwrap(), None);
    assert_eq!(frame_len(&bytes[..16]).unwrap(), Some(bytes.len()));
    let mut bad = bytes.clone();
    bad[0] = b'x';
    assert!(matches!(
        frame_len(&bad),
        Err(DecodeError::InvalidEndianess(b'x'))
    ));
}
