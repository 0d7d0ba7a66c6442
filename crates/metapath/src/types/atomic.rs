use super::temporal::{Date, DateTime, Duration, Time};
use crate::error::MetapathError;
use metaschema_mdm::DataType;
use rust_decimal::Decimal;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use std::fmt;
use std::hash::{Hash, Hasher};

/// A leaf scalar value.
///
/// Equality and hashing on this type are strict: two values are equal only when they have
/// the same variant and the same value. Comparisons that promote between numeric types or
/// cast untyped operands live in [`crate::operators`].
#[derive(Debug, Clone)]
pub enum AtomicValue {
    String(String),
    UntypedAtomic(String),
    AnyUri(String),
    Boolean(bool),
    Integer(i64),
    Decimal(Decimal),
    Double(f64),
    Date(Date),
    DateTime(DateTime),
    Time(Time),
    Duration(Duration),
    DayTimeDuration(Duration),
    YearMonthDuration(Duration),
}

/// Atomic types usable in `instance of`, `cast as`, `castable as` and constructor calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AtomicType {
    AnyAtomic,
    Numeric,
    String,
    UntypedAtomic,
    AnyUri,
    Boolean,
    Integer,
    Decimal,
    Double,
    Date,
    DateTime,
    Time,
    Duration,
    DayTimeDuration,
    YearMonthDuration,
    /// A schema datatype restricting one of the primitive types by its lexical space.
    Data(DataType),
}

impl AtomicType {
    /// Resolves a type by local name, accepting both the XPath spellings and the schema
    /// datatype names (`date-time`, `non-negative-integer`, ...).
    pub fn from_name(local: &str) -> Option<AtomicType> {
        let ty = match local {
            "anyAtomicType" => AtomicType::AnyAtomic,
            "numeric" => AtomicType::Numeric,
            "string" => AtomicType::String,
            "untypedAtomic" => AtomicType::UntypedAtomic,
            "anyURI" | "uri" => AtomicType::AnyUri,
            "boolean" => AtomicType::Boolean,
            "integer" => AtomicType::Integer,
            "decimal" => AtomicType::Decimal,
            "double" => AtomicType::Double,
            "date" => AtomicType::Date,
            "dateTime" | "date-time" => AtomicType::DateTime,
            "time" => AtomicType::Time,
            "duration" => AtomicType::Duration,
            "dayTimeDuration" | "day-time-duration" => AtomicType::DayTimeDuration,
            "yearMonthDuration" | "year-month-duration" => AtomicType::YearMonthDuration,
            other => AtomicType::Data(DataType::from_name(other)?),
        };
        Some(ty)
    }

    pub fn name(&self) -> &'static str {
        match self {
            AtomicType::AnyAtomic => "anyAtomicType",
            AtomicType::Numeric => "numeric",
            AtomicType::String => "string",
            AtomicType::UntypedAtomic => "untypedAtomic",
            AtomicType::AnyUri => "anyURI",
            AtomicType::Boolean => "boolean",
            AtomicType::Integer => "integer",
            AtomicType::Decimal => "decimal",
            AtomicType::Double => "double",
            AtomicType::Date => "date",
            AtomicType::DateTime => "dateTime",
            AtomicType::Time => "time",
            AtomicType::Duration => "duration",
            AtomicType::DayTimeDuration => "dayTimeDuration",
            AtomicType::YearMonthDuration => "yearMonthDuration",
            AtomicType::Data(dt) => dt.name(),
        }
    }

    /// Abstract types can be tested against but never be the target of a cast.
    pub fn is_abstract(&self) -> bool {
        matches!(self, AtomicType::AnyAtomic | AtomicType::Numeric)
    }
}

impl fmt::Display for AtomicType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl AtomicValue {
    pub fn type_name(&self) -> &'static str {
        self.atomic_type().name()
    }

    pub fn atomic_type(&self) -> AtomicType {
        match self {
            AtomicValue::String(_) => AtomicType::String,
            AtomicValue::UntypedAtomic(_) => AtomicType::UntypedAtomic,
            AtomicValue::AnyUri(_) => AtomicType::AnyUri,
            AtomicValue::Boolean(_) => AtomicType::Boolean,
            AtomicValue::Integer(_) => AtomicType::Integer,
            AtomicValue::Decimal(_) => AtomicType::Decimal,
            AtomicValue::Double(_) => AtomicType::Double,
            AtomicValue::Date(_) => AtomicType::Date,
            AtomicValue::DateTime(_) => AtomicType::DateTime,
            AtomicValue::Time(_) => AtomicType::Time,
            AtomicValue::Duration(_) => AtomicType::Duration,
            AtomicValue::DayTimeDuration(_) => AtomicType::DayTimeDuration,
            AtomicValue::YearMonthDuration(_) => AtomicType::YearMonthDuration,
        }
    }

    pub fn string(value: impl Into<String>) -> Self {
        AtomicValue::String(value.into())
    }

    pub fn to_string_value(&self) -> String {
        match self {
            AtomicValue::String(s) | AtomicValue::UntypedAtomic(s) | AtomicValue::AnyUri(s) => {
                s.clone()
            }
            AtomicValue::Boolean(b) => if *b { "true" } else { "false" }.to_string(),
            AtomicValue::Integer(i) => i.to_string(),
            AtomicValue::Decimal(d) => d.to_string(),
            AtomicValue::Double(d) => format_double(*d),
            AtomicValue::Date(d) => d.to_string(),
            AtomicValue::DateTime(d) => d.to_string(),
            AtomicValue::Time(t) => t.to_string(),
            AtomicValue::Duration(d) => d.to_string(),
            AtomicValue::DayTimeDuration(d) => {
                let mut out = String::new();
                let _ = d.write_day_time(&mut out);
                out
            }
            AtomicValue::YearMonthDuration(d) => {
                let mut out = String::new();
                let _ = d.write_year_month(&mut out);
                out
            }
        }
    }

    /// Parses schema-typed text into the atomic value the evaluator works with.
    pub fn from_lexical(data_type: DataType, text: &str) -> Result<Self, MetapathError> {
        data_type
            .validate(text)
            .map_err(|_| MetapathError::invalid_cast(text, data_type.name()))?;
        let invalid = || MetapathError::invalid_cast(text, data_type.name());
        let trimmed = text.trim();
        let value = match data_type {
            DataType::Boolean => AtomicValue::Boolean(matches!(trimmed, "true" | "1")),
            DataType::Integer | DataType::NonNegativeInteger | DataType::PositiveInteger => {
                AtomicValue::Integer(parse_integer(trimmed).ok_or_else(invalid)?)
            }
            DataType::Decimal => AtomicValue::Decimal(parse_decimal(trimmed).ok_or_else(invalid)?),
            DataType::Date | DataType::DateWithTimezone => {
                AtomicValue::Date(Date::parse(trimmed).ok_or_else(invalid)?)
            }
            DataType::DateTime | DataType::DateTimeWithTimezone => {
                AtomicValue::DateTime(DateTime::parse(trimmed).ok_or_else(invalid)?)
            }
            DataType::DayTimeDuration => {
                AtomicValue::DayTimeDuration(Duration::parse_day_time(trimmed).ok_or_else(invalid)?)
            }
            DataType::YearMonthDuration => AtomicValue::YearMonthDuration(
                Duration::parse_year_month(trimmed).ok_or_else(invalid)?,
            ),
            DataType::Uri | DataType::UriReference => AtomicValue::AnyUri(trimmed.to_string()),
            _ => AtomicValue::String(text.to_string()),
        };
        Ok(value)
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            AtomicValue::Integer(_) | AtomicValue::Decimal(_) | AtomicValue::Double(_)
        )
    }

    pub fn is_string_like(&self) -> bool {
        matches!(
            self,
            AtomicValue::String(_) | AtomicValue::UntypedAtomic(_) | AtomicValue::AnyUri(_)
        )
    }

    pub fn is_duration(&self) -> bool {
        matches!(
            self,
            AtomicValue::Duration(_)
                | AtomicValue::DayTimeDuration(_)
                | AtomicValue::YearMonthDuration(_)
        )
    }

    pub fn to_double(&self) -> Option<f64> {
        match self {
            AtomicValue::Double(d) => Some(*d),
            AtomicValue::Integer(i) => Some(*i as f64),
            AtomicValue::Decimal(d) => d.to_f64(),
            _ => None,
        }
    }

    pub fn to_decimal(&self) -> Option<Decimal> {
        match self {
            AtomicValue::Integer(i) => Some(Decimal::from(*i)),
            AtomicValue::Decimal(d) => Some(*d),
            AtomicValue::Double(d) => Decimal::from_f64(*d),
            _ => None,
        }
    }

    pub fn to_integer(&self) -> Option<i64> {
        match self {
            AtomicValue::Integer(i) => Some(*i),
            AtomicValue::Decimal(d) => d.trunc().to_i64(),
            AtomicValue::Double(d) if d.is_finite() => Some(d.trunc() as i64),
            _ => None,
        }
    }

    pub fn effective_boolean_value(&self) -> Result<bool, MetapathError> {
        match self {
            AtomicValue::Boolean(b) => Ok(*b),
            AtomicValue::String(s) | AtomicValue::UntypedAtomic(s) | AtomicValue::AnyUri(s) => {
                Ok(!s.is_empty())
            }
            AtomicValue::Integer(i) => Ok(*i != 0),
            AtomicValue::Decimal(d) => Ok(!d.is_zero()),
            AtomicValue::Double(d) => Ok(*d != 0.0 && !d.is_nan()),
            other => Err(MetapathError::function(
                "boolean",
                format!(
                    "Effective boolean value is not defined for type '{}'",
                    other.type_name()
                ),
            )),
        }
    }

    pub fn is_instance_of(&self, ty: AtomicType) -> bool {
        match ty {
            AtomicType::AnyAtomic => true,
            AtomicType::Numeric => self.is_numeric(),
            AtomicType::Decimal => {
                matches!(self, AtomicValue::Integer(_) | AtomicValue::Decimal(_))
            }
            AtomicType::Duration => self.is_duration(),
            AtomicType::Data(dt) => {
                let base = AtomicValue::from_lexical(dt, &self.to_string_value());
                base.is_ok_and(|b| b.atomic_type() == self.atomic_type())
            }
            other => self.atomic_type() == other,
        }
    }

    /// Casts this value to the target type following the XPath casting table.
    pub fn cast_to(&self, target: AtomicType) -> Result<AtomicValue, MetapathError> {
        let fail = || MetapathError::invalid_cast(self.to_string_value(), target.name());
        if target.is_abstract() {
            return Err(fail());
        }
        if self.atomic_type() == target {
            return Ok(self.clone());
        }
        let text = self.to_string_value();
        let value = match target {
            AtomicType::String => AtomicValue::String(text),
            AtomicType::UntypedAtomic => AtomicValue::UntypedAtomic(text),
            AtomicType::AnyUri if self.is_string_like() => AtomicValue::AnyUri(text.trim().to_string()),
            AtomicType::Boolean => AtomicValue::Boolean(match self {
                AtomicValue::Integer(_) | AtomicValue::Decimal(_) | AtomicValue::Double(_) => {
                    self.effective_boolean_value()?
                }
                _ if self.is_string_like() => match text.trim() {
                    "true" | "1" => true,
                    "false" | "0" => false,
                    _ => return Err(fail()),
                },
                _ => return Err(fail()),
            }),
            AtomicType::Integer => AtomicValue::Integer(match self {
                AtomicValue::Boolean(b) => *b as i64,
                AtomicValue::Decimal(_) | AtomicValue::Double(_) => {
                    self.to_integer().ok_or_else(fail)?
                }
                _ if self.is_string_like() => parse_integer(text.trim()).ok_or_else(fail)?,
                _ => return Err(fail()),
            }),
            AtomicType::Decimal => AtomicValue::Decimal(match self {
                AtomicValue::Boolean(b) => Decimal::from(*b as i64),
                AtomicValue::Integer(_) | AtomicValue::Double(_) => {
                    self.to_decimal().ok_or_else(fail)?
                }
                _ if self.is_string_like() => parse_decimal(text.trim()).ok_or_else(fail)?,
                _ => return Err(fail()),
            }),
            AtomicType::Double => AtomicValue::Double(match self {
                AtomicValue::Boolean(b) => *b as i64 as f64,
                AtomicValue::Integer(_) | AtomicValue::Decimal(_) => {
                    self.to_double().ok_or_else(fail)?
                }
                _ if self.is_string_like() => parse_double(text.trim()).ok_or_else(fail)?,
                _ => return Err(fail()),
            }),
            AtomicType::Date => AtomicValue::Date(match self {
                AtomicValue::DateTime(dt) => dt.date(),
                _ if self.is_string_like() => Date::parse(&text).ok_or_else(fail)?,
                _ => return Err(fail()),
            }),
            AtomicType::DateTime => AtomicValue::DateTime(match self {
                AtomicValue::Date(d) => d.to_date_time(),
                _ if self.is_string_like() => DateTime::parse(&text).ok_or_else(fail)?,
                _ => return Err(fail()),
            }),
            AtomicType::Time => AtomicValue::Time(match self {
                AtomicValue::DateTime(dt) => dt.time(),
                _ if self.is_string_like() => Time::parse(&text).ok_or_else(fail)?,
                _ => return Err(fail()),
            }),
            AtomicType::Duration => AtomicValue::Duration(match self {
                AtomicValue::DayTimeDuration(d) | AtomicValue::YearMonthDuration(d) => *d,
                _ if self.is_string_like() => Duration::parse(&text).ok_or_else(fail)?,
                _ => return Err(fail()),
            }),
            AtomicType::DayTimeDuration => AtomicValue::DayTimeDuration(match self {
                AtomicValue::Duration(d) | AtomicValue::YearMonthDuration(d) => {
                    Duration::day_time(d.seconds)
                }
                _ if self.is_string_like() => Duration::parse_day_time(&text).ok_or_else(fail)?,
                _ => return Err(fail()),
            }),
            AtomicType::YearMonthDuration => AtomicValue::YearMonthDuration(match self {
                AtomicValue::Duration(d) | AtomicValue::DayTimeDuration(d) => {
                    Duration::year_month(d.months)
                }
                _ if self.is_string_like() => {
                    Duration::parse_year_month(&text).ok_or_else(fail)?
                }
                _ => return Err(fail()),
            }),
            AtomicType::Data(dt) => AtomicValue::from_lexical(dt, &text)?,
            _ => return Err(fail()),
        };
        Ok(value)
    }

    pub fn is_castable_to(&self, target: AtomicType) -> bool {
        self.cast_to(target).is_ok()
    }
}

pub(crate) fn parse_integer(s: &str) -> Option<i64> {
    s.strip_prefix('+').unwrap_or(s).parse().ok()
}

pub(crate) fn parse_decimal(s: &str) -> Option<Decimal> {
    if s.contains(['e', 'E']) {
        return None;
    }
    s.strip_prefix('+').unwrap_or(s).parse().ok()
}

pub(crate) fn parse_double(s: &str) -> Option<f64> {
    match s {
        "INF" | "+INF" => Some(f64::INFINITY),
        "-INF" => Some(f64::NEG_INFINITY),
        "NaN" => Some(f64::NAN),
        "inf" | "infinity" | "nan" | "+inf" | "-inf" => None,
        _ => s.parse().ok(),
    }
}

/// The canonical lexical form of a double. Magnitudes from `1e-6` up to but excluding
/// `1e6` are written in decimal notation, anything else as a mantissa with at least one
/// fractional digit and an exponent, e.g. `1.0E100`.
pub(crate) fn format_double(d: f64) -> String {
    if d.is_nan() {
        "NaN".to_string()
    } else if d.is_infinite() {
        if d > 0.0 { "INF" } else { "-INF" }.to_string()
    } else if d == 0.0 {
        if d.is_sign_negative() { "-0" } else { "0" }.to_string()
    } else if (1e-6..1e6).contains(&d.abs()) {
        d.to_string()
    } else {
        let scientific = format!("{:E}", d);
        match scientific.split_once('E') {
            Some((mantissa, exponent)) if !mantissa.contains('.') => {
                format!("{}.0E{}", mantissa, exponent)
            }
            _ => scientific,
        }
    }
}

impl PartialEq for AtomicValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (AtomicValue::String(a), AtomicValue::String(b))
            | (AtomicValue::UntypedAtomic(a), AtomicValue::UntypedAtomic(b))
            | (AtomicValue::AnyUri(a), AtomicValue::AnyUri(b)) => a == b,
            (AtomicValue::Boolean(a), AtomicValue::Boolean(b)) => a == b,
            (AtomicValue::Integer(a), AtomicValue::Integer(b)) => a == b,
            (AtomicValue::Decimal(a), AtomicValue::Decimal(b)) => a == b,
            (AtomicValue::Double(a), AtomicValue::Double(b)) => {
                a == b || (a.is_nan() && b.is_nan())
            }
            (AtomicValue::Date(a), AtomicValue::Date(b)) => a == b,
            (AtomicValue::DateTime(a), AtomicValue::DateTime(b)) => a == b,
            (AtomicValue::Time(a), AtomicValue::Time(b)) => a == b,
            (AtomicValue::Duration(a), AtomicValue::Duration(b))
            | (AtomicValue::DayTimeDuration(a), AtomicValue::DayTimeDuration(b))
            | (AtomicValue::YearMonthDuration(a), AtomicValue::YearMonthDuration(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for AtomicValue {}

impl Hash for AtomicValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            AtomicValue::String(s) | AtomicValue::UntypedAtomic(s) | AtomicValue::AnyUri(s) => {
                s.hash(state)
            }
            AtomicValue::Boolean(b) => b.hash(state),
            AtomicValue::Integer(i) => i.hash(state),
            AtomicValue::Decimal(d) => d.hash(state),
            AtomicValue::Double(d) => {
                // 0.0 and -0.0 compare equal
                let bits = if *d == 0.0 { 0 } else { d.to_bits() };
                bits.hash(state)
            }
            AtomicValue::Date(d) => d.hash(state),
            AtomicValue::DateTime(d) => d.hash(state),
            AtomicValue::Time(t) => t.hash(state),
            AtomicValue::Duration(d)
            | AtomicValue::DayTimeDuration(d)
            | AtomicValue::YearMonthDuration(d) => d.hash(state),
        }
    }
}

impl fmt::Display for AtomicValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_string_value())
    }
}

impl From<String> for AtomicValue {
    fn from(s: String) -> Self {
        AtomicValue::String(s)
    }
}

impl From<&str> for AtomicValue {
    fn from(s: &str) -> Self {
        AtomicValue::String(s.to_string())
    }
}

impl From<bool> for AtomicValue {
    fn from(b: bool) -> Self {
        AtomicValue::Boolean(b)
    }
}

impl From<i64> for AtomicValue {
    fn from(i: i64) -> Self {
        AtomicValue::Integer(i)
    }
}

impl From<Decimal> for AtomicValue {
    fn from(d: Decimal) -> Self {
        AtomicValue::Decimal(d)
    }
}

impl From<f64> for AtomicValue {
    fn from(d: f64) -> Self {
        AtomicValue::Double(d)
    }
}
