use std::fmt;

/// A namespace-qualified name. Node names, definition names and function names all use
/// this form; the namespace is absent for names in no namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QName {
    namespace: Option<String>,
    local_name: String,
}

impl QName {
    pub fn new(namespace: Option<impl Into<String>>, local_name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.map(Into::into),
            local_name: local_name.into(),
        }
    }

    pub fn local(local_name: impl Into<String>) -> Self {
        Self {
            namespace: None,
            local_name: local_name.into(),
        }
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    pub fn local_name(&self) -> &str {
        &self.local_name
    }
}

/// Renders `Q{namespace}local` when qualified, the bare local name otherwise.
impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "Q{{{}}}{}", ns, self.local_name),
            None => f.write_str(&self.local_name),
        }
    }
}

impl From<&str> for QName {
    fn from(s: &str) -> Self {
        QName::local(s)
    }
}

impl From<String> for QName {
    fn from(s: String) -> Self {
        QName::local(s)
    }
}
