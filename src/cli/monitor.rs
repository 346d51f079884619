use {
    crate::{
        cli::{GlobalArgs, MonitorArgs, call::format_body},
        dbus::{Connection, HandlerResult, MatchRule, Message, MessageType, ValidationError},
        utils::errorfmt::ErrorFmt,
    },
    std::sync::mpsc,
};

fn rule(args: &MonitorArgs) -> Result<MatchRule, ValidationError> {
    let mut rule = MatchRule::new().message_type(MessageType::Signal);
    if let Some(interface) = &args.interface {
        rule = rule.interface(interface)?;
    }
    if let Some(member) = &args.member {
        rule = rule.member(member)?;
    }
    if let Some(sender) = &args.sender {
        rule = rule.sender(sender)?;
    }
    if let Some(ns) = &args.path_namespace {
        rule = rule.path_namespace(ns)?;
    }
    Ok(rule)
}

pub fn main(global: GlobalArgs, args: MonitorArgs) {
    let rule = match rule(&args) {
        Ok(r) => r,
        Err(e) => fatal!("Invalid filter: {}", ErrorFmt(e)),
    };
    let conn = global.connect();
    let (tx, rx) = mpsc::channel();
    let handler = move |_: &Connection, msg: &Message| {
        let _ = tx.send(msg.clone());
        HandlerResult::Handled
    };
    let _registration = match conn.add_signal_handler(rule, handler) {
        Ok(r) => r,
        Err(e) => fatal!("Could not subscribe to signals: {}", ErrorFmt(e)),
    };
    while let Ok(msg) = rx.recv() {
        println!(
            "{} {}.{} at {}: {}",
            msg.sender().unwrap_or("-"),
            msg.interface().unwrap_or(""),
            msg.member().unwrap_or(""),
            msg.path().unwrap_or(""),
            format_body(&msg),
        );
    }
    log::info!("The connection was closed");
}
