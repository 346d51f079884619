use {
    crate::dbus::{BusAddress, Connection, DbusError},
    ahash::AHashMap,
    parking_lot::Mutex,
    std::sync::LazyLock,
};


/// The shared connections of this process.
#[derive(Default)]
struct DbusHolder {
    connections: Mutex<AHashMap<BusAddress, Connection>>,
}

static HOLDER: LazyLock<DbusHolder> = LazyLock::new(Default::default);

/// Returns the shared connection to `bus`, replacing it if it has died.
///
/// The cache is not locked while connecting.
pub(super) fn get(bus: &BusAddress) -> Result<Connection, DbusError> {
    if let Some(c) = cached(bus) {
        return Ok(c);
    }
    let c = Connection::open(bus)?;
    let existing = {
        let mut connections = HOLDER.connections.lock();
        let live = connections.get(bus).filter(|e| e.is_connected()).cloned();
        if live.is_none() {
            connections.insert(bus.clone(), c.clone());
        }
        live
    };
    match existing {
        Some(e) => {
            log::debug!("{}: Lost the race for the shared connection", bus);
            c.close();
            Ok(e)
        }
        None => Ok(c),
    }
}

fn cached(bus: &BusAddress) -> Option<Connection> {
    let mut connections = HOLDER.connections.lock();
    let c = connections.get(bus)?;
    if c.is_connected() {
        return Some(c.clone());
    }
    log::info!("{}: Shared connection is dead, reconnecting", bus);
    connections.remove(bus);
    None
}
