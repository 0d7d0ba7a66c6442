//! Datatype adapters for leaf values.
//!
//! An adapter knows the lexical space of one datatype and how it is classified when
//! projected into a JSON-like value model. Parsing into typed atomic values happens in
//! the evaluator; this module only decides whether text is lexically valid.

use crate::error::MdmError;
use regex::Regex;
use std::fmt;
use std::sync::LazyLock;

/// The raw value classification used by object-notation bindings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RawKind {
    String,
    Boolean,
    Integer,
    Number,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    String,
    Token,
    Boolean,
    Integer,
    NonNegativeInteger,
    PositiveInteger,
    Decimal,
    Date,
    DateTime,
    DateWithTimezone,
    DateTimeWithTimezone,
    DayTimeDuration,
    YearMonthDuration,
    Uri,
    UriReference,
    Uuid,
    EmailAddress,
    Hostname,
    Base64,
    MarkupLine,
    MarkupMultiline,
}

static STRING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)^\S(.*\S)?$").expect("BUG: invalid STRING_RE regex literal")
});

static TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\p{L}|_)(\p{L}|\p{N}|[.\-_])*$").expect("BUG: invalid TOKEN_RE regex literal")
});

static INTEGER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[-+]?\d+$").expect("BUG: invalid INTEGER_RE regex literal"));

static DECIMAL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[-+]?(\d+(\.\d*)?|\.\d+)$").expect("BUG: invalid DECIMAL_RE regex literal")
});

static DATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^-?\d{4,}-(\d{2})-(\d{2})(Z|[+-]\d{2}:\d{2})?$")
        .expect("BUG: invalid DATE_RE regex literal")
});

static DATE_TIME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^-?\d{4,}-(\d{2})-(\d{2})T(\d{2}):(\d{2}):(\d{2})(\.\d+)?(Z|[+-]\d{2}:\d{2})?$",
    )
    .expect("BUG: invalid DATE_TIME_RE regex literal")
});

static DAY_TIME_DURATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^-?P(\d+D)?(T(\d+H)?(\d+M)?(\d+(\.\d+)?S)?)?$")
        .expect("BUG: invalid DAY_TIME_DURATION_RE regex literal")
});

static YEAR_MONTH_DURATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^-?P(\d+Y)?(\d+M)?$").expect("BUG: invalid YEAR_MONTH_DURATION_RE regex literal")
});

static URI_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z][a-zA-Z0-9+.\-]*:\S*$").expect("BUG: invalid URI_RE regex literal")
});

static UUID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9A-Fa-f]{8}-[0-9A-Fa-f]{4}-[45][0-9A-Fa-f]{3}-[89ABab][0-9A-Fa-f]{3}-[0-9A-Fa-f]{12}$")
        .expect("BUG: invalid UUID_RE regex literal")
});

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("BUG: invalid EMAIL_RE regex literal")
});

static HOSTNAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^[A-Za-z0-9]([A-Za-z0-9\-]{0,61}[A-Za-z0-9])?(\.[A-Za-z0-9]([A-Za-z0-9\-]{0,61}[A-Za-z0-9])?)*$",
    )
    .expect("BUG: invalid HOSTNAME_RE regex literal")
});

static BASE64_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9+/]*={0,2}$").expect("BUG: invalid BASE64_RE regex literal")
});

impl DataType {
    /// All adapters, in declaration order.
    pub const ALL: [DataType; 21] = [
        DataType::String,
        DataType::Token,
        DataType::Boolean,
        DataType::Integer,
        DataType::NonNegativeInteger,
        DataType::PositiveInteger,
        DataType::Decimal,
        DataType::Date,
        DataType::DateTime,
        DataType::DateWithTimezone,
        DataType::DateTimeWithTimezone,
        DataType::DayTimeDuration,
        DataType::YearMonthDuration,
        DataType::Uri,
        DataType::UriReference,
        DataType::Uuid,
        DataType::EmailAddress,
        DataType::Hostname,
        DataType::Base64,
        DataType::MarkupLine,
        DataType::MarkupMultiline,
    ];

    /// The datatype's name as used in module definitions.
    pub fn name(&self) -> &'static str {
        match self {
            DataType::String => "string",
            DataType::Token => "token",
            DataType::Boolean => "boolean",
            DataType::Integer => "integer",
            DataType::NonNegativeInteger => "non-negative-integer",
            DataType::PositiveInteger => "positive-integer",
            DataType::Decimal => "decimal",
            DataType::Date => "date",
            DataType::DateTime => "date-time",
            DataType::DateWithTimezone => "date-with-timezone",
            DataType::DateTimeWithTimezone => "date-time-with-timezone",
            DataType::DayTimeDuration => "day-time-duration",
            DataType::YearMonthDuration => "year-month-duration",
            DataType::Uri => "uri",
            DataType::UriReference => "uri-reference",
            DataType::Uuid => "uuid",
            DataType::EmailAddress => "email-address",
            DataType::Hostname => "hostname",
            DataType::Base64 => "base64",
            DataType::MarkupLine => "markup-line",
            DataType::MarkupMultiline => "markup-multiline",
        }
    }

    pub fn from_name(name: &str) -> Option<DataType> {
        DataType::ALL.iter().copied().find(|dt| dt.name() == name)
    }

    pub fn raw_kind(&self) -> RawKind {
        match self {
            DataType::Boolean => RawKind::Boolean,
            DataType::Integer | DataType::NonNegativeInteger | DataType::PositiveInteger => {
                RawKind::Integer
            }
            DataType::Decimal => RawKind::Number,
            _ => RawKind::String,
        }
    }

    /// Checks that `value` is in this datatype's lexical space.
    pub fn validate(&self, value: &str) -> Result<(), MdmError> {
        if self.is_valid(value) {
            Ok(())
        } else {
            Err(MdmError::invalid_value(value, self.name()))
        }
    }

    pub fn is_valid(&self, value: &str) -> bool {
        match self {
            DataType::String => STRING_RE.is_match(value),
            DataType::Token => TOKEN_RE.is_match(value),
            DataType::Boolean => matches!(value, "true" | "false" | "1" | "0"),
            DataType::Integer => INTEGER_RE.is_match(value) && value.parse::<i64>().is_ok(),
            DataType::NonNegativeInteger => parse_integer(value).is_some_and(|i| i >= 0),
            DataType::PositiveInteger => parse_integer(value).is_some_and(|i| i >= 1),
            DataType::Decimal => DECIMAL_RE.is_match(value),
            DataType::Date => valid_date(value, false),
            DataType::DateWithTimezone => valid_date(value, true),
            DataType::DateTime => valid_date_time(value, false),
            DataType::DateTimeWithTimezone => valid_date_time(value, true),
            DataType::DayTimeDuration => {
                DAY_TIME_DURATION_RE.is_match(value)
                    && !value.ends_with('P')
                    && !value.ends_with('T')
            }
            DataType::YearMonthDuration => {
                YEAR_MONTH_DURATION_RE.is_match(value) && !value.ends_with('P')
            }
            DataType::Uri => URI_RE.is_match(value),
            DataType::UriReference => !value.chars().any(char::is_whitespace),
            DataType::Uuid => UUID_RE.is_match(value),
            DataType::EmailAddress => EMAIL_RE.is_match(value),
            DataType::Hostname => HOSTNAME_RE.is_match(value),
            DataType::Base64 => BASE64_RE.is_match(value) && value.len() % 4 == 0,
            DataType::MarkupLine | DataType::MarkupMultiline => true,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn parse_integer(value: &str) -> Option<i64> {
    if INTEGER_RE.is_match(value) {
        value.parse().ok()
    } else {
        None
    }
}

fn in_range(text: Option<regex::Match<'_>>, min: u32, max: u32) -> bool {
    text.and_then(|m| m.as_str().parse::<u32>().ok())
        .is_some_and(|v| (min..=max).contains(&v))
}

fn valid_date(value: &str, require_timezone: bool) -> bool {
    match DATE_RE.captures(value) {
        Some(caps) => {
            in_range(caps.get(1), 1, 12)
                && in_range(caps.get(2), 1, 31)
                && (!require_timezone || caps.get(3).is_some())
        }
        None => false,
    }
}

fn valid_date_time(value: &str, require_timezone: bool) -> bool {
    match DATE_TIME_RE.captures(value) {
        Some(caps) => {
            in_range(caps.get(1), 1, 12)
                && in_range(caps.get(2), 1, 31)
                && in_range(caps.get(3), 0, 24)
                && in_range(caps.get(4), 0, 59)
                && in_range(caps.get(5), 0, 59)
                && (!require_timezone || caps.get(7).is_some())
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_round_trip() {
        for dt in DataType::ALL {
            assert_eq!(DataType::from_name(dt.name()), Some(dt));
        }
        assert_eq!(DataType::from_name("nope"), None);
    }

    #[test]
    fn test_string_rejects_surrounding_whitespace() {
        assert!(DataType::String.is_valid("hello world"));
        assert!(!DataType::String.is_valid(" padded"));
        assert!(!DataType::String.is_valid(""));
    }

    #[test]
    fn test_integer_family() {
        assert!(DataType::Integer.is_valid("-5"));
        assert!(!DataType::Integer.is_valid("5.0"));
        assert!(DataType::NonNegativeInteger.is_valid("0"));
        assert!(!DataType::PositiveInteger.is_valid("0"));
        assert!(DataType::PositiveInteger.is_valid("+12"));
    }

    #[test]
    fn test_temporal() {
        assert!(DataType::Date.is_valid("2024-02-29"));
        assert!(DataType::Date.is_valid("2024-02-29Z"));
        assert!(!DataType::DateWithTimezone.is_valid("2024-02-29"));
        assert!(!DataType::Date.is_valid("2024-13-01"));
        assert!(DataType::DateTime.is_valid("2024-01-01T10:15:30.5+02:00"));
        assert!(DataType::DayTimeDuration.is_valid("P1DT2H"));
        assert!(!DataType::DayTimeDuration.is_valid("P"));
        assert!(DataType::YearMonthDuration.is_valid("-P1Y2M"));
    }

    #[test]
    fn test_raw_kind() {
        assert_eq!(DataType::Boolean.raw_kind(), RawKind::Boolean);
        assert_eq!(DataType::PositiveInteger.raw_kind(), RawKind::Integer);
        assert_eq!(DataType::Decimal.raw_kind(), RawKind::Number);
        assert_eq!(DataType::Uuid.raw_kind(), RawKind::String);
    }

    #[test]
    fn test_validate_error_names_datatype() {
        let err = DataType::Uuid.validate("not-a-uuid").unwrap_err();
        assert_eq!(err.to_string(), "Value 'not-a-uuid' is not a valid 'uuid'");
    }
}
