use {
    crate::{
        cli::{GlobalArgs, OwnerArgs},
        dbus::TY_UNIX_FD,
        utils::errorfmt::ErrorFmt,
    },
};

pub fn info(global: GlobalArgs) {
    let conn = global.connect();
    let bus_id = match conn.bus_id() {
        Ok(id) => id,
        Err(e) => fatal!("Could not retrieve the bus id: {}", ErrorFmt(e)),
    };
    println!("Unique name: {}", conn.unique_name().unwrap_or("-"));
    println!("Server guid: {}", conn.server_id());
    println!("Bus id: {}", bus_id);
    println!("Fd passing: {}", conn.can_send_type(TY_UNIX_FD));
}

pub fn list_names(global: GlobalArgs) {
    let conn = global.connect();
    let mut names = match conn.list_names() {
        Ok(n) => n,
        Err(e) => fatal!("Could not list names: {}", ErrorFmt(e)),
    };
    names.sort();
    for name in names {
        println!("{}", name);
    }
}

pub fn owner(global: GlobalArgs, args: OwnerArgs) {
    let conn = global.connect();
    match conn.name_owner(&args.name) {
        Ok(owner) => println!("{}", owner),
        Err(e) => fatal!("Could not look up the owner of {}: {}", args.name, ErrorFmt(e)),
    }
}
