fn main() {
    jay_dbus::cli::main();
}
