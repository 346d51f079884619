use {
    crate::dbus::{
        BUS_DEST, BUS_INTERFACE, BUS_PATH, Connection, DbusError, Message, Value, names,
        pending::Timeout,
    },
    num_derive::{FromPrimitive, ToPrimitive},
    num_traits::FromPrimitive,
};

#[cfg(test)]
mod tests;

#[derive(Copy, Clone, Debug, Eq, PartialEq, FromPrimitive, ToPrimitive)]
pub enum RequestNameReply {
    PrimaryOwner = 1,
    InQueue = 2,
    Exists = 3,
    AlreadyOwner = 4,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, FromPrimitive, ToPrimitive)]
pub enum ReleaseNameReply {
    Released = 1,
    NonExistent = 2,
    NotOwner = 3,
}

/// Methods of the `org.freedesktop.DBus` interface.
impl Connection {
    fn bus_message(member: &str, args: &[Value]) -> Result<Message, DbusError> {
        let mut msg = Message::method_call(Some(BUS_DEST), BUS_PATH, Some(BUS_INTERFACE), member)?;
        msg.append_args(args)?;
        Ok(msg)
    }

    fn bus_call(
        &self,
        member: &str,
        args: &[Value],
        signature: &'static str,
    ) -> Result<Vec<Value>, DbusError> {
        let reply = self.call(Self::bus_message(member, args)?, Timeout::Default)?;
        if reply.signature() != signature {
            return Err(DbusError::UnexpectedSignature {
                expected: signature,
                actual: reply.signature().to_owned(),
            });
        }
        Ok(reply.read_all()?)
    }

    fn bus_call_string(&self, member: &str, args: &[Value]) -> Result<String, DbusError> {
        let mut values = self.bus_call(member, args, "s")?;
        match values.pop().and_then(Value::into_string) {
            Some(s) => Ok(s),
            None => Err(DbusError::UnexpectedSignature {
                expected: "s",
                actual: String::new(),
            }),
        }
    }

    fn bus_call_u32(&self, member: &str, args: &[Value]) -> Result<u32, DbusError> {
        let values = self.bus_call(member, args, "u")?;
        match values.first().and_then(Value::as_u32) {
            Some(v) => Ok(v),
            None => Err(DbusError::UnexpectedSignature {
                expected: "u",
                actual: String::new(),
            }),
        }
    }

    pub(super) fn hello(&self) -> Result<String, DbusError> {
        let name = self.bus_call_string("Hello", &[])?;
        let _ = self.shared.unique_name.set(name.clone());
        Ok(name)
    }

    /// The unique name the bus assigned to this connection.
    pub fn unique_name(&self) -> Result<&str, DbusError> {
        match self.shared.unique_name.get() {
            Some(n) => Ok(n),
            None => Err(DbusError::NoUniqueName),
        }
    }

    pub fn request_name(&self, name: &str, flags: u32) -> Result<RequestNameReply, DbusError> {
        names::validate_bus_name(name)?;
        let code = self.bus_call_u32("RequestName", &[name.into(), flags.into()])?;
        match RequestNameReply::from_u32(code) {
            Some(r) => Ok(r),
            None => Err(DbusError::UnknownReplyCode(code)),
        }
    }

    pub fn release_name(&self, name: &str) -> Result<ReleaseNameReply, DbusError> {
        names::validate_bus_name(name)?;
        let code = self.bus_call_u32("ReleaseName", &[name.into()])?;
        match ReleaseNameReply::from_u32(code) {
            Some(r) => Ok(r),
            None => Err(DbusError::UnknownReplyCode(code)),
        }
    }

    /// The id of the bus, as opposed to the guid of the server.
    pub fn bus_id(&self) -> Result<String, DbusError> {
        self.bus_call_string("GetId", &[])
    }

    pub fn unix_user(&self, name: &str) -> Result<u32, DbusError> {
        names::validate_bus_name(name)?;
        self.bus_call_u32("GetConnectionUnixUser", &[name.into()])
    }

    pub fn name_has_owner(&self, name: &str) -> Result<bool, DbusError> {
        names::validate_bus_name(name)?;
        let values = self.bus_call("NameHasOwner", &[name.into()], "b")?;
        match values.first().and_then(Value::as_bool) {
            Some(b) => Ok(b),
            None => Err(DbusError::UnexpectedSignature {
                expected: "b",
                actual: String::new(),
            }),
        }
    }

    pub fn name_owner(&self, name: &str) -> Result<String, DbusError> {
        names::validate_bus_name(name)?;
        self.bus_call_string("GetNameOwner", &[name.into()])
    }

    pub fn list_names(&self) -> Result<Vec<String>, DbusError> {
        let mut values = self.bus_call("ListNames", &[], "as")?;
        let names = match values.pop() {
            Some(Value::Array(_, names)) => names,
            _ => {
                return Err(DbusError::UnexpectedSignature {
                    expected: "as",
                    actual: String::new(),
                });
            }
        };
        Ok(names.into_iter().filter_map(Value::into_string).collect())
    }

    pub fn add_match(&self, rule: &str) -> Result<(), DbusError> {
        self.bus_call("AddMatch", &[rule.into()], "")?;
        Ok(())
    }

    pub fn remove_match(&self, rule: &str) -> Result<(), DbusError> {
        self.bus_call("RemoveMatch", &[rule.into()], "")?;
        Ok(())
    }

    pub(super) fn remove_match_no_reply(&self, rule: &str) {
        let res = Self::bus_message("RemoveMatch", &[rule.into()]).and_then(|mut msg| {
            msg.set_no_reply(true);
            self.send(msg)
        });
        if let Err(e) = res {
            log::warn!(
                "{}: Could not remove match rule {}: {}",
                self.bus_name(),
                rule,
                crate::utils::errorfmt::ErrorFmt(e)
            );
        }
    }
}
