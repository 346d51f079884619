use {
    crate::dbus::{BusAddress, BusType, DbusError, ResolvedAddress, UnixSocketAddr},
    bstr::BString,
};

fn env(vars: &'static [(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
    move |name| {
        vars.iter()
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v.to_string())
    }
}

#[test]
fn session_from_env() {
    let addr = BusAddress::Session
        .resolve_with(&env(&[
            ("DBUS_SESSION_BUS_ADDRESS", "unix:path=/tmp/a,guid=0123"),
            ("XDG_RUNTIME_DIR", "/run/user/1000"),
        ]))
        .unwrap();
    assert_eq!(addr.as_str(), "unix:path=/tmp/a,guid=0123");
    let entry = &addr.entries()[0];
    assert_eq!(entry.transport(), "unix");
    assert_eq!(entry.guid(), Some("0123"));
    assert_eq!(
        entry.unix_socket(),
        Some(UnixSocketAddr::Path(BString::from("/tmp/a")))
    );
}

#[test]
fn session_falls_back_to_runtime_dir() {
    let addr = BusAddress::Session
        .resolve_with(&env(&[("XDG_RUNTIME_DIR", "/run/user/1 000")]))
        .unwrap();
    assert_eq!(addr.as_str(), "unix:path=/run/user/1%20000/bus");
    assert_eq!(
        addr.entries()[0].unix_socket(),
        Some(UnixSocketAddr::Path(BString::from("/run/user/1 000/bus")))
    );
    let res = BusAddress::Session.resolve_with(&env(&[]));
    assert!(matches!(res, Err(DbusError::NoAddress("session bus"))));
}

#[test]
fn system_default() {
    let addr = BusAddress::System.resolve_with(&env(&[])).unwrap();
    assert_eq!(
        addr.entries()[0].unix_socket(),
        Some(UnixSocketAddr::Path(BString::from(
            "/var/run/dbus/system_bus_socket"
        )))
    );
    let addr = BusAddress::from(BusType::System)
        .resolve_with(&env(&[("DBUS_SYSTEM_BUS_ADDRESS", "unix:path=/x")]))
        .unwrap();
    assert_eq!(addr.as_str(), "unix:path=/x");
}

#[test]
fn starter() {
    let addr = BusAddress::Starter
        .resolve_with(&env(&[("DBUS_STARTER_ADDRESS", "unix:path=/s")]))
        .unwrap();
    assert_eq!(addr.as_str(), "unix:path=/s");
    let addr = BusAddress::Starter
        .resolve_with(&env(&[
            ("DBUS_STARTER_BUS_TYPE", "system"),
            ("DBUS_SYSTEM_BUS_ADDRESS", "unix:path=/sys"),
        ]))
        .unwrap();
    assert_eq!(addr.as_str(), "unix:path=/sys");
    let res = BusAddress::Starter.resolve_with(&env(&[]));
    assert!(matches!(res, Err(DbusError::NoAddress("starter bus"))));
}

#[test]
fn multiple_entries() {
    let addr = ResolvedAddress::parse("tcp:host=localhost,port=1;unix:abstract=/tmp/dbus-x;")
        .unwrap();
    assert_eq!(addr.entries().len(), 2);
    assert_eq!(addr.entries()[0].transport(), "tcp");
    assert_eq!(addr.entries()[0].get("port"), Some(&b"1"[..]));
    assert_eq!(addr.entries()[0].unix_socket(), None);
    assert_eq!(
        addr.entries()[1].unix_socket(),
        Some(UnixSocketAddr::Abstract(BString::from("/tmp/dbus-x")))
    );
}

#[test]
fn malformed() {
    for bad in ["", ";", "unix", ":path=/x", "unix:path", "unix:=x", "unix:path=%4", "unix:path=%zz"] {
        assert!(
            matches!(ResolvedAddress::parse(bad), Err(DbusError::InvalidAddress(_))),
            "{}",
            bad
        );
    }
}
