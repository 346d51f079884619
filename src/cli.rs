mod call;
mod generate;
mod info;
mod monitor;
mod name;

use {
    crate::{
        dbus::{BusAddress, BusType, Connection, Timeout},
        logger::Logger,
        utils::errorfmt::ErrorFmt,
    },
    ::log::Level,
    clap::{Args, Parser, Subcommand, ValueEnum},
    clap_complete::Shell,
};

/// A D-Bus client.
#[derive(Parser, Debug)]
#[command(name = "jay-dbus", version)]
struct JayDbus {
    #[command(flatten)]
    global: GlobalArgs,
    #[command(subcommand)]
    command: Cmd,
}

#[derive(Args, Debug)]
pub struct GlobalArgs {
    /// The log level.
    #[arg(value_enum, long, default_value_t)]
    pub log_level: CliLogLevel,
    /// The bus to connect to.
    #[arg(value_enum, long, default_value_t)]
    pub bus: CliBus,
    /// Connect to this address instead, e.g. `unix:path=/run/user/1000/bus`.
    #[arg(long)]
    pub address: Option<String>,
    /// How long to wait for replies, e.g. `500ms` or `1m 5s`.
    #[arg(long)]
    pub timeout: Option<humantime::Duration>,
}

impl GlobalArgs {
    fn bus_address(&self) -> BusAddress {
        match &self.address {
            Some(a) => BusAddress::Address(a.clone()),
            None => BusType::from(self.bus).into(),
        }
    }

    fn timeout(&self) -> Timeout {
        match &self.timeout {
            Some(t) => Timeout::After(**t),
            None => Timeout::Default,
        }
    }

    fn connect(&self) -> Connection {
        let bus = self.bus_address();
        match Connection::connect(bus.clone(), true) {
            Ok(c) => c,
            Err(e) => fatal!("Could not connect to the {}: {}", bus, ErrorFmt(e)),
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Cmd {
    /// Print information about the connection and the bus.
    Info,
    /// List the names that are currently owned on the bus.
    ListNames,
    /// Print the unique name of the owner of a name.
    Owner(OwnerArgs),
    /// Request a well-known name and hold it for a while.
    RequestName(RequestNameArgs),
    /// Release a well-known name and print the reply of the bus.
    ReleaseName(ReleaseNameArgs),
    /// Call a method and print the reply.
    Call(CallArgs),
    /// Emit a signal.
    Emit(EmitArgs),
    /// Print signals as they arrive.
    Monitor(MonitorArgs),
    /// Generate shell completion scripts for jay-dbus.
    GenerateCompletion(GenerateArgs),
}

#[derive(Args, Debug)]
pub struct OwnerArgs {
    /// The name to look up.
    pub name: String,
}

#[derive(Args, Debug)]
pub struct RequestNameArgs {
    /// The well-known name.
    pub name: String,
    /// Allow other connections to take the name over.
    #[arg(long)]
    pub allow_replacement: bool,
    /// Take the name over from its current owner if it allows it.
    #[arg(long)]
    pub replace_existing: bool,
    /// Fail instead of waiting in the queue.
    #[arg(long)]
    pub do_not_queue: bool,
    /// How long to hold the name before releasing it.
    #[arg(long, default_value = "0s")]
    pub hold: humantime::Duration,
}

#[derive(Args, Debug)]
pub struct ReleaseNameArgs {
    /// The well-known name.
    pub name: String,
}

#[derive(Args, Debug)]
pub struct CallArgs {
    /// The destination of the call.
    pub destination: String,
    /// The object path.
    pub path: String,
    /// The method, qualified by its interface, e.g. `org.freedesktop.DBus.GetId`.
    pub method: String,
    /// The arguments, written as `TYPE:VALUE`.
    ///
    /// TYPE is one of y, b, n, q, i, u, x, t, d, s, o, g. A variant is written as
    /// `v:TYPE:VALUE`, e.g. `v:s:hello`.
    pub args: Vec<String>,
}

#[derive(Args, Debug)]
pub struct EmitArgs {
    /// The object path.
    pub path: String,
    /// The signal, qualified by its interface.
    pub signal: String,
    /// The arguments, written as in `call`.
    pub args: Vec<String>,
}

#[derive(Args, Debug)]
pub struct MonitorArgs {
    /// Only print signals from this interface.
    #[arg(long)]
    pub interface: Option<String>,
    /// Only print signals with this member name.
    #[arg(long)]
    pub member: Option<String>,
    /// Only print signals from this sender.
    #[arg(long)]
    pub sender: Option<String>,
    /// Only print signals emitted at or below this path.
    #[arg(long)]
    pub path_namespace: Option<String>,
}

#[derive(Args, Debug)]
pub struct GenerateArgs {
    /// The shell to generate completions for
    #[arg(value_enum)]
    shell: Shell,
}

#[derive(ValueEnum, Debug, Copy, Clone, Hash, Default)]
pub enum CliLogLevel {
    Trace,
    Debug,
    Info,
    #[default]
    Warn,
    Error,
}

impl From<CliLogLevel> for Level {
    fn from(l: CliLogLevel) -> Self {
        match l {
            CliLogLevel::Trace => Level::Trace,
            CliLogLevel::Debug => Level::Debug,
            CliLogLevel::Info => Level::Info,
            CliLogLevel::Warn => Level::Warn,
            CliLogLevel::Error => Level::Error,
        }
    }
}

#[derive(ValueEnum, Debug, Copy, Clone, Hash, Default)]
pub enum CliBus {
    #[default]
    Session,
    System,
    Starter,
}

impl From<CliBus> for BusType {
    fn from(b: CliBus) -> Self {
        match b {
            CliBus::Session => BusType::Session,
            CliBus::System => BusType::System,
            CliBus::Starter => BusType::Starter,
        }
    }
}

pub fn main() {
    let cli = JayDbus::parse();
    let _logger = Logger::install_stderr(cli.global.log_level.into());
    match cli.command {
        Cmd::Info => info::info(cli.global),
        Cmd::ListNames => info::list_names(cli.global),
        Cmd::Owner(a) => info::owner(cli.global, a),
        Cmd::RequestName(a) => name::request(cli.global, a),
        Cmd::ReleaseName(a) => name::release(cli.global, a),
        Cmd::Call(a) => call::call(cli.global, a),
        Cmd::Emit(a) => call::emit(cli.global, a),
        Cmd::Monitor(a) => monitor::main(cli.global, a),
        Cmd::GenerateCompletion(g) => generate::main(g),
    }
}
