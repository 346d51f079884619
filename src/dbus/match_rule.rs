use {
    crate::dbus::{Message, MessageType, ValidationError, names},
    std::fmt::{self, Display, Formatter},
};


/// A bus match rule, e.g. `type='signal',interface='org.example.Foo'`.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct MatchRule {
    ty: Option<MessageType>,
    sender: Option<String>,
    interface: Option<String>,
    member: Option<String>,
    path: Option<String>,
    path_namespace: Option<String>,
    destination: Option<String>,
}

impl MatchRule {
    pub fn new() -> Self {
        Self::default()
    }

    /// A rule for signals with the given interface and member.
    pub fn signal(interface: &str, member: &str) -> Result<Self, ValidationError> {
        Self::new()
            .message_type(MessageType::Signal)
            .interface(interface)?
            .member(member)
    }

    pub fn message_type(mut self, ty: MessageType) -> Self {
        self.ty = Some(ty);
        self
    }

    pub fn sender(mut self, sender: &str) -> Result<Self, ValidationError> {
        names::validate_bus_name(sender)?;
        self.sender = Some(sender.to_owned());
        Ok(self)
    }

    pub fn interface(mut self, interface: &str) -> Result<Self, ValidationError> {
        names::validate_interface(interface)?;
        self.interface = Some(interface.to_owned());
        Ok(self)
    }

    pub fn member(mut self, member: &str) -> Result<Self, ValidationError> {
        names::validate_member(member)?;
        self.member = Some(member.to_owned());
        Ok(self)
    }

    pub fn path(mut self, path: &str) -> Result<Self, ValidationError> {
        names::validate_object_path(path)?;
        self.path = Some(path.to_owned());
        Ok(self)
    }

    pub fn path_namespace(mut self, path: &str) -> Result<Self, ValidationError> {
        names::validate_object_path(path)?;
        self.path_namespace = Some(path.to_owned());
        Ok(self)
    }

    pub fn destination(mut self, destination: &str) -> Result<Self, ValidationError> {
        names::validate_bus_name(destination)?;
        self.destination = Some(destination.to_owned());
        Ok(self)
    }

    /// Checks the rule against a received message.
    ///
    /// Well-known sender names are not resolved and always match.
    pub fn matches(&self, msg: &Message) -> bool {
        if let Some(ty) = self.ty {
            if msg.message_type() != ty {
                return false;
            }
        }
        if let Some(sender) = &self.sender {
            if names::is_unique_name(sender) && msg.sender() != Some(sender) {
                return false;
            }
        }
        let eq = |rule: &Option<String>, actual: Option<&str>| match rule {
            Some(rule) => actual == Some(rule.as_str()),
            None => true,
        };
        if !eq(&self.interface, msg.interface())
            || !eq(&self.member, msg.member())
            || !eq(&self.path, msg.path())
            || !eq(&self.destination, msg.destination())
        {
            return false;
        }
        if let Some(ns) = &self.path_namespace {
            let Some(path) = msg.path() else {
                return false;
            };
            let inside = match path.strip_prefix(ns.as_str()) {
                Some(rest) => rest.is_empty() || rest.starts_with('/') || ns == "/",
                None => false,
            };
            if !inside {
                return false;
            }
        }
        true
    }
}

impl Display for MatchRule {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let ty = self.ty.map(|ty| match ty {
            MessageType::MethodCall => "method_call",
            MessageType::MethodReturn => "method_return",
            MessageType::Error => "error",
            MessageType::Signal => "signal",
        });
        let fields = [
            ("type", ty),
            ("sender", self.sender.as_deref()),
            ("interface", self.interface.as_deref()),
            ("member", self.member.as_deref()),
            ("path", self.path.as_deref()),
            ("path_namespace", self.path_namespace.as_deref()),
            ("destination", self.destination.as_deref()),
        ];
        let mut first = true;
        for (key, value) in fields {
            let Some(value) = value else {
                continue;
            };
            if !first {
                f.write_str(",")?;
            }
            first = false;
            write!(f, "{}='{}'", key, value.replace('\'', "'\\''"))?;
        }
        Ok(())
    }
}
