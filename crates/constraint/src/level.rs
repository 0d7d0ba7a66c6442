use std::fmt;

/// Severity of a constraint and of the findings it produces, least severe first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Level {
    None,
    Informational,
    Debug,
    Warning,
    #[default]
    Error,
    Critical,
}

impl Level {
    pub fn name(&self) -> &'static str {
        match self {
            Level::None => "NONE",
            Level::Informational => "INFORMATIONAL",
            Level::Debug => "DEBUG",
            Level::Warning => "WARNING",
            Level::Error => "ERROR",
            Level::Critical => "CRITICAL",
        }
    }

    pub fn from_name(name: &str) -> Option<Level> {
        match name.to_ascii_uppercase().as_str() {
            "NONE" => Some(Level::None),
            "INFORMATIONAL" => Some(Level::Informational),
            "DEBUG" => Some(Level::Debug),
            "WARNING" => Some(Level::Warning),
            "ERROR" => Some(Level::Error),
            "CRITICAL" => Some(Level::Critical),
            _ => None,
        }
    }

    pub fn is_failure(&self) -> bool {
        *self >= Level::Error
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
