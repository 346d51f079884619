use crate::dbus::{
    DBUS_NAME_FLAG_ALLOW_REPLACEMENT, DBUS_NAME_FLAG_DO_NOT_QUEUE,
    DBUS_NAME_FLAG_REPLACE_EXISTING, DbusError, ReleaseNameReply, RequestNameReply,
    test_bus::TestBus,
};

const NAME: &str = "org.example.Service";

#[test]
fn request_and_release() {
    let bus = TestBus::new();
    let a = bus.connect();
    let b = bus.connect();
    assert!(!a.name_has_owner(NAME).unwrap());
    assert_eq!(
        a.request_name(NAME, 0).unwrap(),
        RequestNameReply::PrimaryOwner
    );
    assert_eq!(
        a.request_name(NAME, 0).unwrap(),
        RequestNameReply::AlreadyOwner
    );
    assert_eq!(
        b.request_name(NAME, DBUS_NAME_FLAG_DO_NOT_QUEUE).unwrap(),
        RequestNameReply::Exists
    );
    assert_eq!(b.request_name(NAME, 0).unwrap(), RequestNameReply::InQueue);
    assert!(b.name_has_owner(NAME).unwrap());
    assert_eq!(b.name_owner(NAME).unwrap(), a.unique_name().unwrap());

    assert_eq!(
        a.release_name(NAME).unwrap(),
        ReleaseNameReply::Released
    );
    assert_eq!(a.name_owner(NAME).unwrap(), b.unique_name().unwrap());
    assert_eq!(
        a.release_name(NAME).unwrap(),
        ReleaseNameReply::NotOwner
    );
    assert_eq!(
        a.release_name("org.example.Nobody").unwrap(),
        ReleaseNameReply::NonExistent
    );
}

#[test]
fn replacement() {
    let bus = TestBus::new();
    let a = bus.connect();
    let b = bus.connect();
    assert_eq!(
        a.request_name(NAME, DBUS_NAME_FLAG_ALLOW_REPLACEMENT)
            .unwrap(),
        RequestNameReply::PrimaryOwner
    );
    assert_eq!(
        b.request_name(NAME, DBUS_NAME_FLAG_REPLACE_EXISTING)
            .unwrap(),
        RequestNameReply::PrimaryOwner
    );
    assert_eq!(a.name_owner(NAME).unwrap(), b.unique_name().unwrap());
}

#[test]
fn names_are_dropped_with_the_connection() {
    let bus = TestBus::new();
    let a = bus.connect();
    let b = bus.connect();
    a.request_name(NAME, 0).unwrap();
    a.close();
    let start = std::time::Instant::now();
    while b.name_has_owner(NAME).unwrap() {
        assert!(start.elapsed() < std::time::Duration::from_secs(5));
        std::thread::sleep(std::time::Duration::from_millis(5));
    }
}

#[test]
fn queries() {
    let bus = TestBus::new();
    let a = bus.connect();
    let b = bus.connect();
    let id = a.bus_id().unwrap();
    assert_eq!(id.len(), 32);
    assert_ne!(id, a.server_id());
    let uid = a.unix_user(b.unique_name().unwrap()).unwrap();
    assert_eq!(uid, uapi::getuid() as u32);
    let names = a.list_names().unwrap();
    assert!(names.iter().any(|n| n == "org.freedesktop.DBus"));
    assert!(names.iter().any(|n| n == a.unique_name().unwrap()));
    assert!(names.iter().any(|n| n == b.unique_name().unwrap()));
    match a.name_owner("org.example.Nobody") {
        Err(DbusError::CallError(e)) => {
            assert_eq!(e.name, "org.freedesktop.DBus.Error.NameHasNoOwner")
        }
        _ => panic!("expected NameHasNoOwner"),
    }
    assert!(matches!(
        a.request_name("not a name", 0),
        Err(DbusError::Validation(_))
    ));
}

#[test]
fn match_rules() {
    let bus = TestBus::new();
    let a = bus.connect();
    let rule = "type='signal',interface='org.example.Foo'";
    a.add_match(rule).unwrap();
    a.remove_match(rule).unwrap();
    match a.remove_match(rule) {
        Err(DbusError::CallError(e)) => {
            assert_eq!(e.name, "org.freedesktop.DBus.Error.MatchRuleNotFound")
        }
        _ => panic!("expected MatchRuleNotFound"),
    }
}
