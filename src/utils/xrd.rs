pub const XRD: &str = "XDG_RUNTIME_DIR";
