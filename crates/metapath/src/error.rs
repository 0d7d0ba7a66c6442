use std::fmt;
use thiserror::Error;

/// Sub-codes of [`MetapathError::Type`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeErrorCode {
    /// An operand of the wrong dynamic kind reached an operation.
    InvalidType,
    /// A path step was applied to something that is not a node item.
    NotANodeItemForStep,
    /// A node with no typed value (document or assembly) was atomized.
    NodeHasNoTypedValue,
    /// A function item, map or array was atomized where a single atomic is needed.
    CannotAtomizeFunction,
}

impl TypeErrorCode {
    pub fn code(&self) -> &'static str {
        match self {
            TypeErrorCode::InvalidType => "MPTY0004",
            TypeErrorCode::NotANodeItemForStep => "MPTY0020",
            TypeErrorCode::NodeHasNoTypedValue => "FOTY0012",
            TypeErrorCode::CannotAtomizeFunction => "FOTY0013",
        }
    }
}

/// Sub-codes of [`MetapathError::Array`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArrayErrorCode {
    IndexOutOfBounds,
    NegativeArrayLength,
}

impl ArrayErrorCode {
    pub fn code(&self) -> &'static str {
        match self {
            ArrayErrorCode::IndexOutOfBounds => "FOAY0001",
            ArrayErrorCode::NegativeArrayLength => "FOAY0002",
        }
    }
}

/// Sub-codes of [`MetapathError::Temporal`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TemporalErrorCode {
    /// A date or time computation left the representable range.
    DateTimeOverflow,
    /// A duration computation left the representable range.
    DurationOverflow,
    /// A timezone outside `-PT14H..=PT14H` or not a whole number of minutes.
    InvalidTimezone,
}

impl TemporalErrorCode {
    pub fn code(&self) -> &'static str {
        match self {
            TemporalErrorCode::DateTimeOverflow => "FODT0001",
            TemporalErrorCode::DurationOverflow => "FODT0002",
            TemporalErrorCode::InvalidTimezone => "FODT0003",
        }
    }
}

/// Sub-codes of [`MetapathError::Uri`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UriErrorCode {
    /// A relative reference needed the static base URI and none was set.
    BaseUriNotDefined,
    /// A base or relative reference is not a valid URI.
    InvalidArgument,
}

impl UriErrorCode {
    pub fn code(&self) -> &'static str {
        match self {
            UriErrorCode::BaseUriNotDefined => "FONS0005",
            UriErrorCode::InvalidArgument => "FORG0002",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CardinalityCode {
    ZeroOrOne,
    OneOrMore,
    ExactlyOne,
}

impl CardinalityCode {
    pub fn code(&self) -> &'static str {
        match self {
            CardinalityCode::ZeroOrOne => "FORG0003",
            CardinalityCode::OneOrMore => "FORG0004",
            CardinalityCode::ExactlyOne => "FORG0005",
        }
    }
}

impl fmt::Display for CardinalityCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CardinalityCode::ZeroOrOne => "zero or one item",
            CardinalityCode::OneOrMore => "one or more items",
            CardinalityCode::ExactlyOne => "exactly one item",
        })
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MetapathError {
    #[error("Syntax error at {line}:{column} in '{expression}': {message}")]
    Syntax {
        expression: String,
        line: usize,
        column: usize,
        message: String,
    },

    #[error("Static error in '{expression}': {message}")]
    Static { expression: String, message: String },

    #[error("Type error [{}]: {message}", code.code())]
    Type { code: TypeErrorCode, message: String },

    #[error("Array error [{}]: {message}", code.code())]
    Array { code: ArrayErrorCode, message: String },

    #[error("Cannot cast '{value}' to {target}")]
    InvalidCast { value: String, target: String },

    #[error("Expected {expected}, got {actual} items")]
    Cardinality {
        expected: CardinalityCode,
        actual: usize,
    },

    #[error("Function '{function}' error: {message}")]
    Function { function: String, message: String },

    #[error("Variable '${name}' not found")]
    UnknownVariable { name: String },

    #[error("Duplicate key '{key}' in map constructor")]
    DuplicateMapKey { key: String },

    #[error("Division by zero")]
    DivisionByZero,

    #[error("Arithmetic error [FOAR0002]: {0}")]
    NumericOverflow(String),

    #[error("Date/time error [{}]: {message}", code.code())]
    Temporal { code: TemporalErrorCode, message: String },

    #[error("URI error [{}]: {message}", code.code())]
    Uri { code: UriErrorCode, message: String },

    #[error("Map error [FOJS0003]: duplicate key '{key}' in map:merge")]
    MergeDuplicateKey { key: String },

    #[error("Context item is required but not set")]
    NoContextItem,

    #[error("Dynamic error: {0}")]
    Dynamic(String),

    #[error("{code}: {message}")]
    Raised { code: String, message: String },

    #[error("Usage error: {0}")]
    Usage(String),
}

impl MetapathError {
    /// The stable error code of this error.
    pub fn code(&self) -> &str {
        match self {
            MetapathError::Syntax { .. } => "MPST0003",
            MetapathError::Static { .. } => "MPST0017",
            MetapathError::Type { code, .. } => code.code(),
            MetapathError::Array { code, .. } => code.code(),
            MetapathError::InvalidCast { .. } => "FORG0001",
            MetapathError::Cardinality { expected, .. } => expected.code(),
            MetapathError::Function { .. } => "FORG0006",
            MetapathError::UnknownVariable { .. } => "MPST0008",
            MetapathError::DuplicateMapKey { .. } => "XQDY0137",
            MetapathError::DivisionByZero => "FOAR0001",
            MetapathError::NumericOverflow(_) => "FOAR0002",
            MetapathError::Temporal { code, .. } => code.code(),
            MetapathError::Uri { code, .. } => code.code(),
            MetapathError::MergeDuplicateKey { .. } => "FOJS0003",
            MetapathError::NoContextItem => "MPDY0002",
            MetapathError::Dynamic(_) => "MPDY0050",
            MetapathError::Raised { code, .. } => code,
            MetapathError::Usage(_) => "USAGE",
        }
    }

    pub fn syntax(
        expression: impl Into<String>,
        line: usize,
        column: usize,
        message: impl Into<String>,
    ) -> Self {
        Self::Syntax {
            expression: expression.into(),
            line,
            column,
            message: message.into(),
        }
    }

    pub fn static_error(expression: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Static {
            expression: expression.into(),
            message: message.into(),
        }
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        Self::Type {
            code: TypeErrorCode::InvalidType,
            message: message.into(),
        }
    }

    pub fn typed(code: TypeErrorCode, message: impl Into<String>) -> Self {
        Self::Type {
            code,
            message: message.into(),
        }
    }

    pub fn index_out_of_bounds(index: i64, size: usize) -> Self {
        Self::Array {
            code: ArrayErrorCode::IndexOutOfBounds,
            message: format!(
                "The index '{}' is outside the range of values for the array size '{}'.",
                index, size
            ),
        }
    }

    pub fn negative_array_length(length: i64) -> Self {
        Self::Array {
            code: ArrayErrorCode::NegativeArrayLength,
            message: format!("The length '{}' is negative.", length),
        }
    }

    pub fn invalid_cast(value: impl Into<String>, target: impl Into<String>) -> Self {
        Self::InvalidCast {
            value: value.into(),
            target: target.into(),
        }
    }

    pub fn function(function: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Function {
            function: function.into(),
            message: message.into(),
        }
    }

    pub fn numeric_overflow(message: impl Into<String>) -> Self {
        Self::NumericOverflow(message.into())
    }

    pub fn date_time_overflow(message: impl Into<String>) -> Self {
        Self::Temporal {
            code: TemporalErrorCode::DateTimeOverflow,
            message: message.into(),
        }
    }

    pub fn duration_overflow(message: impl Into<String>) -> Self {
        Self::Temporal {
            code: TemporalErrorCode::DurationOverflow,
            message: message.into(),
        }
    }

    pub fn invalid_timezone(message: impl Into<String>) -> Self {
        Self::Temporal {
            code: TemporalErrorCode::InvalidTimezone,
            message: message.into(),
        }
    }

    pub fn uri(code: UriErrorCode, message: impl Into<String>) -> Self {
        Self::Uri {
            code,
            message: message.into(),
        }
    }

    pub fn dynamic_error(message: impl Into<String>) -> Self {
        Self::Dynamic(message.into())
    }

    pub fn usage(message: impl Into<String>) -> Self {
        Self::Usage(message.into())
    }

    pub fn is_type_error(&self, code: TypeErrorCode) -> bool {
        matches!(self, MetapathError::Type { code: c, .. } if *c == code)
    }

    pub fn is_array_error(&self, code: ArrayErrorCode) -> bool {
        matches!(self, MetapathError::Array { code: c, .. } if *c == code)
    }

    pub fn is_temporal_error(&self, code: TemporalErrorCode) -> bool {
        matches!(self, MetapathError::Temporal { code: c, .. } if *c == code)
    }

    pub fn is_uri_error(&self, code: UriErrorCode) -> bool {
        matches!(self, MetapathError::Uri { code: c, .. } if *c == code)
    }
}
