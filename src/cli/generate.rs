use {
    crate::cli::{GenerateArgs, JayDbus},
    clap::CommandFactory,
    std::io::stdout,
};

pub fn main(args: GenerateArgs) {
    let stdout = stdout();
    let mut stdout = stdout.lock();
    clap_complete::generate(args.shell, &mut JayDbus::command(), "jay-dbus", &mut stdout);
}
