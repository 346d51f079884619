use {
    crate::{
        dbus::{BusType, DbusError},
        utils::{hex, xrd::XRD},
    },
    bstr::{BString, ByteSlice},
    std::fmt::{self, Display, Formatter},
};

#[cfg(test)]
mod tests;

const SESSION_BUS_ADDRESS: &str = "DBUS_SESSION_BUS_ADDRESS";
const SYSTEM_BUS_ADDRESS: &str = "DBUS_SYSTEM_BUS_ADDRESS";
const STARTER_ADDRESS: &str = "DBUS_STARTER_ADDRESS";
const STARTER_BUS_TYPE: &str = "DBUS_STARTER_BUS_TYPE";
const DEFAULT_SYSTEM_BUS_ADDRESS: &str = "unix:path=/var/run/dbus/system_bus_socket";

/// Which bus to connect to.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum BusAddress {
    Session,
    System,
    Starter,
    Address(String),
}

impl From<BusType> for BusAddress {
    fn from(ty: BusType) -> Self {
        match ty {
            BusType::Session => Self::Session,
            BusType::System => Self::System,
            BusType::Starter => Self::Starter,
        }
    }
}

impl Display for BusAddress {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            BusAddress::Session => f.write_str("session bus"),
            BusAddress::System => f.write_str("system bus"),
            BusAddress::Starter => f.write_str("starter bus"),
            BusAddress::Address(a) => f.write_str(a),
        }
    }
}

impl BusAddress {
    pub fn resolve(&self) -> Result<ResolvedAddress, DbusError> {
        self.resolve_with(&|name| std::env::var(name).ok())
    }

    /// Resolves the address, looking up environment variables through `env`.
    pub fn resolve_with(
        &self,
        env: &dyn Fn(&str) -> Option<String>,
    ) -> Result<ResolvedAddress, DbusError> {
        match self {
            BusAddress::Session => {
                if let Some(addr) = env(SESSION_BUS_ADDRESS) {
                    return ResolvedAddress::parse(&addr);
                }
                match env(XRD) {
                    Some(xrd) => ResolvedAddress::parse(&format!(
                        "unix:path={}",
                        escape(format!("{}/bus", xrd).as_bytes())
                    )),
                    None => Err(DbusError::NoAddress("session bus")),
                }
            }
            BusAddress::System => match env(SYSTEM_BUS_ADDRESS) {
                Some(addr) => ResolvedAddress::parse(&addr),
                None => ResolvedAddress::parse(DEFAULT_SYSTEM_BUS_ADDRESS),
            },
            BusAddress::Starter => {
                if let Some(addr) = env(STARTER_ADDRESS) {
                    return ResolvedAddress::parse(&addr);
                }
                match env(STARTER_BUS_TYPE).as_deref() {
                    Some("session") => BusAddress::Session.resolve_with(env),
                    Some("system") => BusAddress::System.resolve_with(env),
                    _ => Err(DbusError::NoAddress("starter bus")),
                }
            }
            BusAddress::Address(addr) => ResolvedAddress::parse(addr),
        }
    }
}

/// A parsed address string: transports to try in order.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ResolvedAddress {
    text: String,
    entries: Vec<AddressEntry>,
}

impl ResolvedAddress {
    pub fn parse(s: &str) -> Result<Self, DbusError> {
        let invalid = || DbusError::InvalidAddress(s.to_owned());
        let mut entries = vec![];
        for entry in s.split(';').filter(|e| !e.is_empty()) {
            let Some((transport, params)) = entry.split_once(':') else {
                return Err(invalid());
            };
            if transport.is_empty() {
                return Err(invalid());
            }
            let mut parsed = vec![];
            for param in params.split(',').filter(|p| !p.is_empty()) {
                let Some((key, value)) = param.split_once('=') else {
                    return Err(invalid());
                };
                if key.is_empty() {
                    return Err(invalid());
                }
                let Some(value) = unescape(value) else {
                    return Err(invalid());
                };
                parsed.push((key.to_owned(), value));
            }
            entries.push(AddressEntry {
                transport: transport.to_owned(),
                params: parsed,
            });
        }
        if entries.is_empty() {
            return Err(invalid());
        }
        Ok(Self {
            text: s.to_owned(),
            entries,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn entries(&self) -> &[AddressEntry] {
        &self.entries
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AddressEntry {
    transport: String,
    params: Vec<(String, BString)>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum UnixSocketAddr {
    Path(BString),
    Abstract(BString),
}

impl AddressEntry {
    pub fn transport(&self) -> &str {
        &self.transport
    }

    pub fn get(&self, key: &str) -> Option<&[u8]> {
        self.params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_bytes())
    }

    pub fn guid(&self) -> Option<&str> {
        self.get("guid").and_then(|g| g.to_str().ok())
    }

    pub fn unix_socket(&self) -> Option<UnixSocketAddr> {
        if self.transport != "unix" {
            return None;
        }
        if let Some(path) = self.get("path") {
            return Some(UnixSocketAddr::Path(path.into()));
        }
        self.get("abstract")
            .map(|name| UnixSocketAddr::Abstract(name.into()))
    }
}

fn is_optionally_escaped(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'/' | b'.' | b'\\')
}

fn escape(s: &[u8]) -> String {
    let mut res = String::with_capacity(s.len());
    for &b in s {
        if is_optionally_escaped(b) {
            res.push(b as char);
        } else {
            res.push('%');
            res.push_str(&hex::to_hex([b]));
        }
    }
    res
}

fn unescape(s: &str) -> Option<BString> {
    let mut res = vec![];
    let mut bytes = s.bytes();
    while let Some(b) = bytes.next() {
        if b != b'%' {
            res.push(b);
            continue;
        }
        let hi = (bytes.next()? as char).to_digit(16)?;
        let lo = (bytes.next()? as char).to_digit(16)?;
        res.push((hi * 16 + lo) as u8);
    }
    Some(res.into())
}
