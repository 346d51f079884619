use {
    crate::{
        cli::{GlobalArgs, ReleaseNameArgs, RequestNameArgs},
        dbus::{
            DBUS_NAME_FLAG_ALLOW_REPLACEMENT, DBUS_NAME_FLAG_DO_NOT_QUEUE,
            DBUS_NAME_FLAG_REPLACE_EXISTING, ReleaseNameReply, RequestNameReply,
        },
        utils::errorfmt::ErrorFmt,
    },
    std::thread,
};

pub fn request(global: GlobalArgs, args: RequestNameArgs) {
    let mut flags = 0;
    if args.allow_replacement {
        flags |= DBUS_NAME_FLAG_ALLOW_REPLACEMENT;
    }
    if args.replace_existing {
        flags |= DBUS_NAME_FLAG_REPLACE_EXISTING;
    }
    if args.do_not_queue {
        flags |= DBUS_NAME_FLAG_DO_NOT_QUEUE;
    }
    let conn = global.connect();
    let reply = match conn.request_name(&args.name, flags) {
        Ok(r) => r,
        Err(e) => fatal!("Could not request {}: {}", args.name, ErrorFmt(e)),
    };
    match reply {
        RequestNameReply::PrimaryOwner => println!("Acquired {}", args.name),
        RequestNameReply::InQueue => println!("Waiting in the queue for {}", args.name),
        RequestNameReply::Exists => fatal!("{} is already owned", args.name),
        RequestNameReply::AlreadyOwner => println!("Already owned {}", args.name),
    }
    thread::sleep(*args.hold);
    match conn.release_name(&args.name) {
        Ok(r) => log::info!("Released {}: {:?}", args.name, r),
        Err(e) => log::error!("Could not release {}: {}", args.name, ErrorFmt(e)),
    }
}

pub fn release(global: GlobalArgs, args: ReleaseNameArgs) {
    let conn = global.connect();
    match conn.release_name(&args.name) {
        Ok(ReleaseNameReply::Released) => println!("Released {}", args.name),
        Ok(ReleaseNameReply::NonExistent) => println!("{} is not owned by anyone", args.name),
        Ok(ReleaseNameReply::NotOwner) => println!("{} is owned by another connection", args.name),
        Err(e) => fatal!("Could not release {}: {}", args.name, ErrorFmt(e)),
    }
}
