//! Comparison, arithmetic and node-set operators.
//!
//! Value comparisons (`eq`, `lt`, ...) compare exactly one atomic value on each side;
//! untyped values compare as strings. General comparisons (`=`, `<`, ...) are
//! existential over both atomized sequences and cast untyped operands towards the type
//! of the other operand first.

use crate::ast::BinaryOperator;
use crate::error::{MetapathError, TypeErrorCode};
use crate::types::{AtomicType, AtomicValue, DateTime, Duration, Item, Sequence, Time, Timezone};
use itertools::Itertools;
use metaschema_mdm::NodeItem;
use rust_decimal::Decimal;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use std::cmp::Ordering;
use std::collections::HashSet;

pub fn evaluate_binary<N: NodeItem>(
    op: BinaryOperator,
    left: Sequence<N>,
    right: Sequence<N>,
    timezone: Timezone,
) -> Result<Sequence<N>, MetapathError> {
    match op {
        BinaryOperator::Or => Ok(Sequence::from_bool(
            left.effective_boolean_value()? || right.effective_boolean_value()?,
        )),
        BinaryOperator::And => Ok(Sequence::from_bool(
            left.effective_boolean_value()? && right.effective_boolean_value()?,
        )),
        BinaryOperator::Equals
        | BinaryOperator::NotEquals
        | BinaryOperator::LessThan
        | BinaryOperator::LessThanOrEqual
        | BinaryOperator::GreaterThan
        | BinaryOperator::GreaterThanOrEqual => {
            let result = general_compare(op, &left.atomize()?, &right.atomize()?, timezone)?;
            Ok(Sequence::from_bool(result))
        }
        BinaryOperator::ValueEq
        | BinaryOperator::ValueNe
        | BinaryOperator::ValueLt
        | BinaryOperator::ValueLe
        | BinaryOperator::ValueGt
        | BinaryOperator::ValueGe => {
            let (Some(a), Some(b)) = (left.atomize_optional()?, right.atomize_optional()?) else {
                return Ok(Sequence::empty());
            };
            Ok(Sequence::from_bool(value_compare(op, &a, &b, timezone)?))
        }
        BinaryOperator::Plus
        | BinaryOperator::Minus
        | BinaryOperator::Multiply
        | BinaryOperator::Divide
        | BinaryOperator::IntegerDivide
        | BinaryOperator::Modulo => {
            let (Some(a), Some(b)) = (left.atomize_optional()?, right.atomize_optional()?) else {
                return Ok(Sequence::empty());
            };
            Ok(Sequence::from_atomic(arithmetic(op, &a, &b, timezone)?))
        }
        BinaryOperator::Union | BinaryOperator::Intersect | BinaryOperator::Except => {
            node_set_operation(op, &left, &right)
        }
    }
}

// ---------------------------------------------------------------------------
// Comparison
// ---------------------------------------------------------------------------

fn incomparable(a: &AtomicValue, b: &AtomicValue) -> MetapathError {
    MetapathError::type_error(format!(
        "Values of type '{}' and '{}' are not comparable",
        a.type_name(),
        b.type_name()
    ))
}

fn string_of(value: &AtomicValue) -> Option<&str> {
    match value {
        AtomicValue::String(s) | AtomicValue::UntypedAtomic(s) | AtomicValue::AnyUri(s) => {
            Some(s)
        }
        _ => None,
    }
}

pub(crate) fn duration_of(value: &AtomicValue) -> Option<Duration> {
    match value {
        AtomicValue::Duration(d) | AtomicValue::DayTimeDuration(d) | AtomicValue::YearMonthDuration(d) => {
            Some(*d)
        }
        _ => None,
    }
}

fn compare_numeric(a: &AtomicValue, b: &AtomicValue) -> Option<Ordering> {
    match (a, b) {
        (AtomicValue::Integer(x), AtomicValue::Integer(y)) => Some(x.cmp(y)),
        (AtomicValue::Double(_), _) | (_, AtomicValue::Double(_)) => {
            a.to_double()?.partial_cmp(&b.to_double()?)
        }
        _ => Some(a.to_decimal()?.cmp(&b.to_decimal()?)),
    }
}

/// Orders two atomic values. `Ok(None)` means the values are of comparable types but
/// unordered (NaN, or durations mixing months and seconds).
pub fn compare_atomic(
    a: &AtomicValue,
    b: &AtomicValue,
    timezone: Timezone,
) -> Result<Option<Ordering>, MetapathError> {
    if a.is_numeric() && b.is_numeric() {
        return Ok(compare_numeric(a, b));
    }
    if let (Some(x), Some(y)) = (string_of(a), string_of(b)) {
        return Ok(Some(x.cmp(y)));
    }
    if let (Some(x), Some(y)) = (duration_of(a), duration_of(b)) {
        return Ok(x.compare(&y));
    }
    let ord = match (a, b) {
        (AtomicValue::Boolean(x), AtomicValue::Boolean(y)) => x.cmp(y),
        (AtomicValue::Date(x), AtomicValue::Date(y)) => x.instant(timezone).cmp(&y.instant(timezone)),
        (AtomicValue::DateTime(x), AtomicValue::DateTime(y)) => {
            x.instant(timezone).cmp(&y.instant(timezone))
        }
        (AtomicValue::Time(x), AtomicValue::Time(y)) => x.instant(timezone).cmp(&y.instant(timezone)),
        _ => return Err(incomparable(a, b)),
    };
    Ok(Some(ord))
}

fn ordering_satisfies(op: BinaryOperator, ord: Option<Ordering>) -> bool {
    match op {
        BinaryOperator::ValueEq | BinaryOperator::Equals => ord == Some(Ordering::Equal),
        BinaryOperator::ValueNe | BinaryOperator::NotEquals => ord != Some(Ordering::Equal),
        BinaryOperator::ValueLt | BinaryOperator::LessThan => ord == Some(Ordering::Less),
        BinaryOperator::ValueLe | BinaryOperator::LessThanOrEqual => {
            matches!(ord, Some(Ordering::Less | Ordering::Equal))
        }
        BinaryOperator::ValueGt | BinaryOperator::GreaterThan => ord == Some(Ordering::Greater),
        BinaryOperator::ValueGe | BinaryOperator::GreaterThanOrEqual => {
            matches!(ord, Some(Ordering::Greater | Ordering::Equal))
        }
        _ => false,
    }
}

/// Compares one value with another using a value-comparison operator.
pub fn value_compare(
    op: BinaryOperator,
    a: &AtomicValue,
    b: &AtomicValue,
    timezone: Timezone,
) -> Result<bool, MetapathError> {
    let ord = compare_atomic(a, b, timezone)?;
    Ok(ordering_satisfies(op, ord))
}

/// Casts an untyped operand of a general comparison towards the other operand's type:
/// to double against a number, to string against a string, and to the other type
/// otherwise.
fn promote_untyped(value: &AtomicValue, other: &AtomicValue) -> Result<AtomicValue, MetapathError> {
    let AtomicValue::UntypedAtomic(text) = value else {
        return Ok(value.clone());
    };
    if other.is_numeric() {
        value.cast_to(AtomicType::Double)
    } else if string_of(other).is_some() {
        Ok(AtomicValue::String(text.clone()))
    } else {
        value.cast_to(other.atomic_type())
    }
}

/// True if any pair drawn from the two sides satisfies the comparison.
pub fn general_compare(
    op: BinaryOperator,
    left: &[AtomicValue],
    right: &[AtomicValue],
    timezone: Timezone,
) -> Result<bool, MetapathError> {
    for a in left {
        for b in right {
            let x = promote_untyped(a, b)?;
            let y = promote_untyped(b, a)?;
            if ordering_satisfies(op, compare_atomic(&x, &y, timezone)?) {
                return Ok(true);
            }
        }
    }
    Ok(false)
}

/// Equality used by `fn:deep-equal`, `fn:distinct-values` and `fn:index-of`:
/// numbers compare across types, NaN equals NaN, and values of incomparable types are
/// simply unequal.
pub fn atomic_deep_equal(a: &AtomicValue, b: &AtomicValue) -> bool {
    if let (AtomicValue::Double(x), AtomicValue::Double(y)) = (a, b)
        && x.is_nan()
        && y.is_nan()
    {
        return true;
    }
    if let (Some(x), Some(y)) = (duration_of(a), duration_of(b)) {
        return x == y;
    }
    matches!(compare_atomic(a, b, Timezone::UTC), Ok(Some(Ordering::Equal)))
}

// ---------------------------------------------------------------------------
// Arithmetic
// ---------------------------------------------------------------------------

fn numeric_operand(value: &AtomicValue) -> Result<AtomicValue, MetapathError> {
    if string_of(value).is_some() {
        value.cast_to(AtomicType::Double)
    } else {
        Ok(value.clone())
    }
}

fn overflow() -> MetapathError {
    MetapathError::numeric_overflow("Numeric overflow")
}

fn date_time_overflow(a: &AtomicValue, b: &AtomicValue) -> MetapathError {
    MetapathError::date_time_overflow(format!(
        "Adding '{}' and '{}' leaves the supported range of dates",
        a.to_string_value(),
        b.to_string_value()
    ))
}

fn duration_overflow(a: &AtomicValue, b: &AtomicValue) -> MetapathError {
    MetapathError::duration_overflow(format!(
        "Combining '{}' and '{}' leaves the supported range of durations",
        a.to_string_value(),
        b.to_string_value()
    ))
}

fn unsupported(op: BinaryOperator, a: &AtomicValue, b: &AtomicValue) -> MetapathError {
    MetapathError::type_error(format!(
        "Operator '{}' is not defined for '{}' and '{}'",
        op,
        a.type_name(),
        b.type_name()
    ))
}

/// Applies an arithmetic operator to two atomic values.
pub fn arithmetic(
    op: BinaryOperator,
    a: &AtomicValue,
    b: &AtomicValue,
    timezone: Timezone,
) -> Result<AtomicValue, MetapathError> {
    let a = numeric_operand(a)?;
    let b = numeric_operand(b)?;
    if a.is_numeric() && b.is_numeric() {
        return numeric_arithmetic(op, &a, &b);
    }
    temporal_arithmetic(op, &a, &b, timezone)
}

fn numeric_arithmetic(
    op: BinaryOperator,
    a: &AtomicValue,
    b: &AtomicValue,
) -> Result<AtomicValue, MetapathError> {
    match (a, b) {
        (AtomicValue::Double(_), _) | (_, AtomicValue::Double(_)) => {
            let x = a.to_double().unwrap_or(f64::NAN);
            let y = b.to_double().unwrap_or(f64::NAN);
            double_arithmetic(op, x, y)
        }
        (AtomicValue::Integer(x), AtomicValue::Integer(y)) => integer_arithmetic(op, *x, *y),
        _ => {
            let x = a.to_decimal().ok_or_else(overflow)?;
            let y = b.to_decimal().ok_or_else(overflow)?;
            decimal_arithmetic(op, x, y)
        }
    }
}

fn double_arithmetic(op: BinaryOperator, x: f64, y: f64) -> Result<AtomicValue, MetapathError> {
    let value = match op {
        BinaryOperator::Plus => x + y,
        BinaryOperator::Minus => x - y,
        BinaryOperator::Multiply => x * y,
        BinaryOperator::Divide => x / y,
        BinaryOperator::Modulo => x % y,
        BinaryOperator::IntegerDivide => {
            if y == 0.0 {
                return Err(MetapathError::DivisionByZero);
            }
            let quotient = (x / y).trunc();
            if !quotient.is_finite() {
                return Err(MetapathError::numeric_overflow(format!(
                    "Integer division of '{}' by '{}' is not a finite number",
                    x, y
                )));
            }
            return quotient.to_i64().map(AtomicValue::Integer).ok_or_else(overflow);
        }
        other => {
            return Err(MetapathError::type_error(format!("'{}' is not an arithmetic operator", other)));
        }
    };
    Ok(AtomicValue::Double(value))
}

fn integer_arithmetic(op: BinaryOperator, x: i64, y: i64) -> Result<AtomicValue, MetapathError> {
    let checked = match op {
        BinaryOperator::Plus => x.checked_add(y),
        BinaryOperator::Minus => x.checked_sub(y),
        BinaryOperator::Multiply => x.checked_mul(y),
        BinaryOperator::Divide => {
            return decimal_arithmetic(op, Decimal::from(x), Decimal::from(y));
        }
        BinaryOperator::IntegerDivide | BinaryOperator::Modulo if y == 0 => {
            return Err(MetapathError::DivisionByZero);
        }
        BinaryOperator::IntegerDivide => x.checked_div(y),
        // i64::MIN mod -1 is 0, which `wrapping_rem` yields
        BinaryOperator::Modulo => Some(x.wrapping_rem(y)),
        other => {
            return Err(MetapathError::type_error(format!("'{}' is not an arithmetic operator", other)));
        }
    };
    checked.map(AtomicValue::Integer).ok_or_else(|| {
        MetapathError::numeric_overflow(format!(
            "Integer result of '{} {} {}' is out of range",
            x, op, y
        ))
    })
}

fn decimal_arithmetic(op: BinaryOperator, x: Decimal, y: Decimal) -> Result<AtomicValue, MetapathError> {
    if y.is_zero()
        && matches!(
            op,
            BinaryOperator::Divide | BinaryOperator::IntegerDivide | BinaryOperator::Modulo
        )
    {
        return Err(MetapathError::DivisionByZero);
    }
    let value = match op {
        BinaryOperator::Plus => x.checked_add(y),
        BinaryOperator::Minus => x.checked_sub(y),
        BinaryOperator::Multiply => x.checked_mul(y),
        BinaryOperator::Divide => x.checked_div(y).map(|d| d.normalize()),
        BinaryOperator::Modulo => x.checked_rem(y),
        BinaryOperator::IntegerDivide => {
            let quotient = x.checked_div(y).ok_or_else(overflow)?;
            return quotient
                .trunc()
                .to_i64()
                .map(AtomicValue::Integer)
                .ok_or_else(overflow);
        }
        _ => None,
    };
    value.map(AtomicValue::Decimal).ok_or_else(overflow)
}

/// Rebuilds a duration result with the same subtype as `template`.
fn same_duration_type(template: &AtomicValue, value: Duration) -> AtomicValue {
    match template {
        AtomicValue::YearMonthDuration(_) => AtomicValue::YearMonthDuration(value),
        AtomicValue::DayTimeDuration(_) => AtomicValue::DayTimeDuration(value),
        _ => AtomicValue::Duration(value),
    }
}

fn scale_duration(
    template: &AtomicValue,
    duration: Duration,
    factor: f64,
) -> Result<AtomicValue, MetapathError> {
    if !factor.is_finite() {
        return Err(MetapathError::duration_overflow("Cannot scale a duration by a non-finite number"));
    }
    let scaled = match template {
        AtomicValue::YearMonthDuration(_) => {
            Duration::year_month((duration.months as f64 * factor).round() as i64)
        }
        _ => {
            let factor = Decimal::from_f64(factor).ok_or_else(overflow)?;
            let seconds = duration.seconds.checked_mul(factor).ok_or_else(overflow)?;
            Duration {
                months: (duration.months as f64 * factor.to_f64().unwrap_or_default()).round() as i64,
                seconds: seconds.round_dp(3),
            }
        }
    };
    Ok(same_duration_type(template, scaled))
}

fn time_on_reference_day(time: &Time) -> DateTime {
    DateTime {
        year: 1972,
        month: 1,
        day: 1,
        hour: time.hour,
        minute: time.minute,
        second: time.second,
        timezone: time.timezone,
    }
}

fn temporal_arithmetic(
    op: BinaryOperator,
    a: &AtomicValue,
    b: &AtomicValue,
    timezone: Timezone,
) -> Result<AtomicValue, MetapathError> {
    let signed = |d: Duration| match op {
        BinaryOperator::Minus => Some(d.negate()),
        BinaryOperator::Plus => Some(d),
        _ => None,
    };
    let between = |x: Decimal, y: Decimal| AtomicValue::DayTimeDuration(Duration::day_time(x - y));

    let result = match (a, b) {
        (AtomicValue::DateTime(dt), d) if duration_of(d).is_some() && !matches!(d, AtomicValue::Duration(_)) => {
            let delta = duration_of(d).and_then(signed).ok_or_else(|| unsupported(op, a, b))?;
            AtomicValue::DateTime(dt.plus(&delta).ok_or_else(|| date_time_overflow(a, b))?)
        }
        (AtomicValue::Date(date), d) if duration_of(d).is_some() && !matches!(d, AtomicValue::Duration(_)) => {
            let delta = duration_of(d).and_then(signed).ok_or_else(|| unsupported(op, a, b))?;
            let moved = date.to_date_time().plus(&delta).ok_or_else(|| date_time_overflow(a, b))?;
            AtomicValue::Date(moved.date())
        }
        (AtomicValue::Time(time), AtomicValue::DayTimeDuration(d)) => {
            let delta = signed(*d).ok_or_else(|| unsupported(op, a, b))?;
            let moved = time_on_reference_day(time)
                .plus(&delta)
                .ok_or_else(|| date_time_overflow(a, b))?;
            AtomicValue::Time(moved.time())
        }
        (AtomicValue::YearMonthDuration(_) | AtomicValue::DayTimeDuration(_), AtomicValue::DateTime(_) | AtomicValue::Date(_))
            if op == BinaryOperator::Plus =>
        {
            return temporal_arithmetic(op, b, a, timezone);
        }
        (AtomicValue::DateTime(x), AtomicValue::DateTime(y)) if op == BinaryOperator::Minus => {
            between(x.instant(timezone), y.instant(timezone))
        }
        (AtomicValue::Date(x), AtomicValue::Date(y)) if op == BinaryOperator::Minus => {
            between(x.instant(timezone), y.instant(timezone))
        }
        (AtomicValue::Time(x), AtomicValue::Time(y)) if op == BinaryOperator::Minus => {
            between(
                time_on_reference_day(x).instant(timezone),
                time_on_reference_day(y).instant(timezone),
            )
        }
        (AtomicValue::YearMonthDuration(x), AtomicValue::YearMonthDuration(y))
        | (AtomicValue::DayTimeDuration(x), AtomicValue::DayTimeDuration(y)) => match op {
            BinaryOperator::Plus => {
                same_duration_type(a, x.plus(y).ok_or_else(|| duration_overflow(a, b))?)
            }
            BinaryOperator::Minus => {
                same_duration_type(a, x.plus(&y.negate()).ok_or_else(|| duration_overflow(a, b))?)
            }
            BinaryOperator::Divide => {
                let (num, den) = if x.months != 0 || y.months != 0 {
                    (Decimal::from(x.months), Decimal::from(y.months))
                } else {
                    (x.seconds, y.seconds)
                };
                if den.is_zero() {
                    return Err(MetapathError::DivisionByZero);
                }
                AtomicValue::Decimal(num.checked_div(den).ok_or_else(overflow)?.normalize())
            }
            _ => return Err(unsupported(op, a, b)),
        },
        (d, n) if duration_of(d).is_some() && n.is_numeric() => {
            let duration = duration_of(d).ok_or_else(|| unsupported(op, a, b))?;
            let factor = n.to_double().ok_or_else(|| unsupported(op, a, b))?;
            match op {
                BinaryOperator::Multiply => scale_duration(d, duration, factor)?,
                BinaryOperator::Divide if factor == 0.0 => return Err(MetapathError::DivisionByZero),
                BinaryOperator::Divide => scale_duration(d, duration, 1.0 / factor)?,
                _ => return Err(unsupported(op, a, b)),
            }
        }
        (n, d) if n.is_numeric() && duration_of(d).is_some() && op == BinaryOperator::Multiply => {
            return temporal_arithmetic(op, b, a, timezone);
        }
        _ => return Err(unsupported(op, a, b)),
    };
    Ok(result)
}

/// Unary minus.
pub fn negate(value: &AtomicValue) -> Result<AtomicValue, MetapathError> {
    let value = numeric_operand(value)?;
    Ok(match &value {
        AtomicValue::Integer(i) => AtomicValue::Integer(
            i.checked_neg()
                .ok_or_else(|| MetapathError::numeric_overflow(format!("Negating '{}' is out of range", i)))?,
        ),
        AtomicValue::Decimal(d) => AtomicValue::Decimal(-*d),
        AtomicValue::Double(d) => AtomicValue::Double(-*d),
        other => match duration_of(other) {
            Some(d) => same_duration_type(other, d.negate()),
            None => {
                return Err(MetapathError::type_error(format!(
                    "Unary minus is not defined for '{}'",
                    other.type_name()
                )));
            }
        },
    })
}

/// Unary plus: checks the operand is numeric and returns it.
pub fn identity(value: &AtomicValue) -> Result<AtomicValue, MetapathError> {
    let value = numeric_operand(value)?;
    if value.is_numeric() || value.is_duration() {
        Ok(value)
    } else {
        Err(MetapathError::type_error(format!(
            "Unary plus is not defined for '{}'",
            value.type_name()
        )))
    }
}

// ---------------------------------------------------------------------------
// Node sets
// ---------------------------------------------------------------------------

fn nodes_of<N: NodeItem>(op: BinaryOperator, seq: &Sequence<N>) -> Result<Vec<N>, MetapathError> {
    seq.items()?
        .iter()
        .map(|item| match item {
            Item::Node(n) => Ok(n.clone()),
            other => Err(MetapathError::typed(
                TypeErrorCode::InvalidType,
                format!("Operator '{}' requires nodes, found '{}'", op, other.type_name()),
            )),
        })
        .collect()
}

/// `union`, `intersect` and `except`. The result is in document order without
/// duplicates.
pub fn node_set_operation<N: NodeItem>(
    op: BinaryOperator,
    left: &Sequence<N>,
    right: &Sequence<N>,
) -> Result<Sequence<N>, MetapathError> {
    let left = nodes_of(op, left)?;
    let right = nodes_of(op, right)?;
    let nodes: Vec<N> = match op {
        BinaryOperator::Union => left.into_iter().chain(right).collect(),
        BinaryOperator::Intersect => {
            let keep: HashSet<&N> = right.iter().collect();
            left.iter().filter(|n| keep.contains(n)).cloned().collect()
        }
        BinaryOperator::Except => {
            let drop: HashSet<&N> = right.iter().collect();
            left.iter().filter(|n| !drop.contains(n)).cloned().collect()
        }
        other => {
            return Err(MetapathError::type_error(format!("'{}' is not a node-set operator", other)));
        }
    };
    Ok(Sequence::from_nodes(nodes.into_iter().sorted().dedup().collect()))
}
