use super::atomic::AtomicValue;
use super::temporal::Timezone;
use rust_decimal::Decimal;
use std::fmt;
use std::hash::{Hash, Hasher};

/// A map key: the original atomic value plus the identity used for lookups.
///
/// Which equality applies depends on the key's datatype:
///
/// - string, untyped and URI values compare by string value
/// - integers and decimals compare numerically, ignoring trailing fractional zeros
/// - dates, date-times and times compare by instant and by whether a timezone is present
/// - everything else compares by strict atomic equality
#[derive(Debug, Clone)]
pub struct MapKey {
    value: AtomicValue,
    identity: KeyIdentity,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum KeyIdentity {
    String(String),
    Decimal(Decimal),
    Temporal {
        family: TemporalFamily,
        instant: Decimal,
        has_timezone: bool,
    },
    Opaque(AtomicValue),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum TemporalFamily {
    Date,
    DateTime,
    Time,
}

impl MapKey {
    pub fn new(value: AtomicValue) -> Self {
        let identity = match &value {
            AtomicValue::String(s) | AtomicValue::UntypedAtomic(s) | AtomicValue::AnyUri(s) => {
                KeyIdentity::String(s.clone())
            }
            AtomicValue::Integer(i) => KeyIdentity::Decimal(Decimal::from(*i)),
            AtomicValue::Decimal(d) => KeyIdentity::Decimal(d.normalize()),
            AtomicValue::Date(d) => KeyIdentity::Temporal {
                family: TemporalFamily::Date,
                instant: d.instant(Timezone::UTC),
                has_timezone: d.timezone.is_some(),
            },
            AtomicValue::DateTime(d) => KeyIdentity::Temporal {
                family: TemporalFamily::DateTime,
                instant: d.instant(Timezone::UTC).normalize(),
                has_timezone: d.timezone.is_some(),
            },
            AtomicValue::Time(t) => KeyIdentity::Temporal {
                family: TemporalFamily::Time,
                instant: t.instant(Timezone::UTC).normalize(),
                has_timezone: t.timezone.is_some(),
            },
            other => KeyIdentity::Opaque(other.clone()),
        };
        Self { value, identity }
    }

    /// The atomic value this key was created from.
    pub fn key(&self) -> &AtomicValue {
        &self.value
    }

    pub fn into_key(self) -> AtomicValue {
        self.value
    }
}

impl PartialEq for MapKey {
    fn eq(&self, other: &Self) -> bool {
        self.identity == other.identity
    }
}

impl Eq for MapKey {}

impl Hash for MapKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.identity.hash(state);
    }
}

impl From<AtomicValue> for MapKey {
    fn from(value: AtomicValue) -> Self {
        MapKey::new(value)
    }
}

impl From<&str> for MapKey {
    fn from(value: &str) -> Self {
        MapKey::new(AtomicValue::string(value))
    }
}

impl fmt::Display for MapKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::temporal::DateTime;
    use std::str::FromStr;

    fn decimal(s: &str) -> AtomicValue {
        AtomicValue::Decimal(Decimal::from_str(s).unwrap())
    }

    #[test]
    fn test_decimal_keys_ignore_trailing_zeros() {
        assert_eq!(MapKey::new(decimal("1.0")), MapKey::new(decimal("1.00")));
        assert_eq!(MapKey::new(decimal("1.0")), MapKey::new(AtomicValue::Integer(1)));
    }

    #[test]
    fn test_string_keys_compare_text() {
        assert_ne!(MapKey::from("1.0"), MapKey::from("1.00"));
        assert_eq!(
            MapKey::from("a"),
            MapKey::new(AtomicValue::UntypedAtomic("a".into()))
        );
        assert_ne!(MapKey::from("1"), MapKey::new(AtomicValue::Integer(1)));
    }

    #[test]
    fn test_temporal_keys_need_matching_timezone_presence() {
        let utc = DateTime::parse("2020-01-01T00:00:00Z").unwrap();
        let offset = DateTime::parse("2020-01-01T02:00:00+02:00").unwrap();
        let local = DateTime::parse("2020-01-01T00:00:00").unwrap();
        assert_eq!(
            MapKey::new(AtomicValue::DateTime(utc)),
            MapKey::new(AtomicValue::DateTime(offset))
        );
        assert_ne!(
            MapKey::new(AtomicValue::DateTime(utc)),
            MapKey::new(AtomicValue::DateTime(local))
        );
    }

    #[test]
    fn test_opaque_keys() {
        assert_eq!(
            MapKey::new(AtomicValue::Boolean(true)),
            MapKey::new(AtomicValue::Boolean(true))
        );
        assert_ne!(
            MapKey::new(AtomicValue::Double(1.0)),
            MapKey::new(AtomicValue::Integer(1))
        );
    }
}
