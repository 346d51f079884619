use {
    crate::{
        cli::{CallArgs, EmitArgs, GlobalArgs},
        dbus::{Message, ObjectPath, Signature, ValidationError, Value},
        utils::errorfmt::ErrorFmt,
    },
    thiserror::Error,
};

#[cfg(test)]
mod tests;

#[derive(Debug, Error)]
enum ArgError {
    #[error("Argument `{0}` is not of the form TYPE:VALUE")]
    MissingType(String),
    #[error("Unknown argument type `{0}`")]
    UnknownType(String),
    #[error("`{0}` is not a valid value of type `{1}`")]
    InvalidValue(String, String),
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

fn parse_arg(s: &str) -> Result<Value, ArgError> {
    let Some((ty, value)) = s.split_once(':') else {
        return Err(ArgError::MissingType(s.to_owned()));
    };
    let invalid = || ArgError::InvalidValue(value.to_owned(), ty.to_owned());
    macro_rules! num {
        ($ty:ty) => {
            match value.parse::<$ty>() {
                Ok(v) => Value::from(v),
                Err(_) => return Err(invalid()),
            }
        };
    }
    let v = match ty {
        "y" => num!(u8),
        "b" => match value {
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            _ => return Err(invalid()),
        },
        "n" => num!(i16),
        "q" => num!(u16),
        "i" => num!(i32),
        "u" => num!(u32),
        "x" => num!(i64),
        "t" => num!(u64),
        "d" => num!(f64),
        "s" => Value::from(value),
        "o" => ObjectPath::new(value)?.into(),
        "g" => Signature::new(value)?.into(),
        "v" => Value::variant(parse_arg(value)?),
        _ => return Err(ArgError::UnknownType(ty.to_owned())),
    };
    Ok(v)
}

/// Splits `org.example.Iface.Member` into interface and member.
fn split_member(s: &str) -> (&str, &str) {
    match s.rsplit_once('.') {
        Some((interface, member)) => (interface, member),
        None => fatal!("`{}` is not qualified by an interface", s),
    }
}

fn append_args(msg: &mut Message, args: &[String]) {
    for arg in args {
        let value = match parse_arg(arg) {
            Ok(v) => v,
            Err(e) => fatal!("Could not parse argument: {}", ErrorFmt(e)),
        };
        if let Err(e) = msg.append(value) {
            fatal!("Could not append argument `{}`: {}", arg, ErrorFmt(e));
        }
    }
}

pub(super) fn format_body(msg: &Message) -> String {
    match msg.read_all() {
        Ok(values) => Value::Struct(values).to_string(),
        Err(e) => format!("<{}>", ErrorFmt(e)),
    }
}

pub fn call(global: GlobalArgs, args: CallArgs) {
    let (interface, member) = split_member(&args.method);
    let mut msg = match Message::method_call(
        Some(&args.destination),
        &args.path,
        Some(interface),
        member,
    ) {
        Ok(m) => m,
        Err(e) => fatal!("Invalid method call: {}", ErrorFmt(e)),
    };
    append_args(&mut msg, &args.args);
    let conn = global.connect();
    let reply = match conn.call(msg, global.timeout()) {
        Ok(r) => r,
        Err(e) => fatal!("{} failed: {}", args.method, ErrorFmt(e)),
    };
    println!("{}", format_body(&reply));
}

pub fn emit(global: GlobalArgs, args: EmitArgs) {
    let (interface, member) = split_member(&args.signal);
    let mut msg = match Message::signal(&args.path, interface, member) {
        Ok(m) => m,
        Err(e) => fatal!("Invalid signal: {}", ErrorFmt(e)),
    };
    append_args(&mut msg, &args.args);
    let conn = global.connect();
    if let Err(e) = conn.send(msg) {
        fatal!("Could not emit {}: {}", args.signal, ErrorFmt(e));
    }
    conn.close();
}
