use super::check_arity;
use crate::engine::EvaluationContext;
use crate::error::MetapathError;
use crate::types::{AtomicType, AtomicValue, Sequence, Timezone};
use metaschema_mdm::NodeItem;

pub fn fn_current_datetime<N: NodeItem>(
    args: Vec<Sequence<N>>,
    ctx: &EvaluationContext<'_, N>,
) -> Result<Sequence<N>, MetapathError> {
    check_arity("current-dateTime", &args, 0, 0)?;
    Ok(Sequence::from_atomic(AtomicValue::DateTime(
        ctx.dynamic.current_date_time(),
    )))
}

pub fn fn_current_date<N: NodeItem>(
    args: Vec<Sequence<N>>,
    ctx: &EvaluationContext<'_, N>,
) -> Result<Sequence<N>, MetapathError> {
    check_arity("current-date", &args, 0, 0)?;
    Ok(Sequence::from_atomic(AtomicValue::Date(
        ctx.dynamic.current_date_time().date(),
    )))
}

pub fn fn_current_time<N: NodeItem>(
    args: Vec<Sequence<N>>,
    ctx: &EvaluationContext<'_, N>,
) -> Result<Sequence<N>, MetapathError> {
    check_arity("current-time", &args, 0, 0)?;
    Ok(Sequence::from_atomic(AtomicValue::Time(
        ctx.dynamic.current_date_time().time(),
    )))
}

pub fn fn_implicit_timezone<N: NodeItem>(
    args: Vec<Sequence<N>>,
    ctx: &EvaluationContext<'_, N>,
) -> Result<Sequence<N>, MetapathError> {
    check_arity("implicit-timezone", &args, 0, 0)?;
    Ok(Sequence::from_atomic(AtomicValue::DayTimeDuration(
        ctx.dynamic.implicit_timezone().to_duration(),
    )))
}

/// Casts untyped input to `expected`; any other value must already be an instance of it.
fn coerce(function: &str, value: AtomicValue, expected: AtomicType) -> Result<AtomicValue, MetapathError> {
    match value {
        v @ AtomicValue::UntypedAtomic(_) => v.cast_to(expected),
        v if v.is_instance_of(expected) => Ok(v),
        other => Err(MetapathError::type_error(format!(
            "Function '{}' expected {}, found '{}'",
            function,
            expected.name(),
            other.type_name()
        ))),
    }
}

/// Extracts one calendar component from an optional value of the given type.
fn component<N: NodeItem>(
    function: &str,
    mut args: Vec<Sequence<N>>,
    expected: AtomicType,
    extract: impl Fn(&AtomicValue) -> Option<i64>,
) -> Result<Sequence<N>, MetapathError> {
    check_arity(function, &args, 1, 1)?;
    let Some(value) = args.remove(0).atomize_optional()? else {
        return Ok(Sequence::empty());
    };
    let value = coerce(function, value, expected)?;
    Ok(extract(&value)
        .map(Sequence::from_integer)
        .unwrap_or_default())
}

fn date_component<N: NodeItem>(
    function: &str,
    args: Vec<Sequence<N>>,
    extract: impl Fn(&crate::types::Date) -> i64,
) -> Result<Sequence<N>, MetapathError> {
    component(function, args, AtomicType::Date, |v| match v {
        AtomicValue::Date(d) => Some(extract(d)),
        _ => None,
    })
}

fn datetime_component<N: NodeItem>(
    function: &str,
    args: Vec<Sequence<N>>,
    extract: impl Fn(&crate::types::DateTime) -> i64,
) -> Result<Sequence<N>, MetapathError> {
    component(function, args, AtomicType::DateTime, |v| match v {
        AtomicValue::DateTime(dt) => Some(extract(dt)),
        _ => None,
    })
}

pub fn fn_year_from_date<N: NodeItem>(args: Vec<Sequence<N>>) -> Result<Sequence<N>, MetapathError> {
    date_component("year-from-date", args, |d| d.year as i64)
}

pub fn fn_month_from_date<N: NodeItem>(args: Vec<Sequence<N>>) -> Result<Sequence<N>, MetapathError> {
    date_component("month-from-date", args, |d| d.month as i64)
}

pub fn fn_day_from_date<N: NodeItem>(args: Vec<Sequence<N>>) -> Result<Sequence<N>, MetapathError> {
    date_component("day-from-date", args, |d| d.day as i64)
}

pub fn fn_year_from_datetime<N: NodeItem>(args: Vec<Sequence<N>>) -> Result<Sequence<N>, MetapathError> {
    datetime_component("year-from-dateTime", args, |dt| dt.year as i64)
}

pub fn fn_month_from_datetime<N: NodeItem>(
    args: Vec<Sequence<N>>,
) -> Result<Sequence<N>, MetapathError> {
    datetime_component("month-from-dateTime", args, |dt| dt.month as i64)
}

pub fn fn_day_from_datetime<N: NodeItem>(args: Vec<Sequence<N>>) -> Result<Sequence<N>, MetapathError> {
    datetime_component("day-from-dateTime", args, |dt| dt.day as i64)
}

/// Shared body of the `adjust-*-to-timezone` functions.
///
/// With one argument the implicit timezone is the target; an empty second argument
/// removes the timezone instead.
fn adjust_to_timezone<N: NodeItem>(
    function: &str,
    mut args: Vec<Sequence<N>>,
    ctx: &EvaluationContext<'_, N>,
    expected: AtomicType,
) -> Result<Sequence<N>, MetapathError> {
    check_arity(function, &args, 1, 2)?;
    let implicit = ctx.dynamic.implicit_timezone();
    let timezone = match args.get(1) {
        None => Some(implicit),
        Some(seq) => seq
            .atomize_optional()?
            .map(|value| timezone_arg(function, value))
            .transpose()?,
    };
    let Some(value) = args.remove(0).atomize_optional()? else {
        return Ok(Sequence::empty());
    };
    let adjusted = match coerce(function, value, expected)? {
        AtomicValue::DateTime(dt) => dt
            .adjust_to_timezone(timezone, implicit)
            .map(AtomicValue::DateTime),
        AtomicValue::Date(d) => d.adjust_to_timezone(timezone, implicit).map(AtomicValue::Date),
        AtomicValue::Time(t) => t.adjust_to_timezone(timezone, implicit).map(AtomicValue::Time),
        other => {
            return Err(MetapathError::type_error(format!(
                "Function '{}' cannot adjust a value of type '{}'",
                function,
                other.type_name()
            )));
        }
    };
    adjusted.map(Sequence::from_atomic).ok_or_else(|| {
        MetapathError::date_time_overflow(format!(
            "Function '{}' produced a value outside the supported range",
            function
        ))
    })
}

fn timezone_arg(function: &str, value: AtomicValue) -> Result<Timezone, MetapathError> {
    let duration = match coerce(function, value, AtomicType::DayTimeDuration)? {
        AtomicValue::DayTimeDuration(d) => d,
        other => {
            return Err(MetapathError::type_error(format!(
                "Function '{}' expected a dayTimeDuration timezone, found '{}'",
                function,
                other.type_name()
            )));
        }
    };
    Timezone::from_duration(&duration)
        .ok_or_else(|| MetapathError::invalid_timezone(format!("Invalid timezone '{}'", duration)))
}

pub fn fn_adjust_datetime_to_timezone<N: NodeItem>(
    args: Vec<Sequence<N>>,
    ctx: &EvaluationContext<'_, N>,
) -> Result<Sequence<N>, MetapathError> {
    adjust_to_timezone("adjust-dateTime-to-timezone", args, ctx, AtomicType::DateTime)
}

pub fn fn_adjust_date_to_timezone<N: NodeItem>(
    args: Vec<Sequence<N>>,
    ctx: &EvaluationContext<'_, N>,
) -> Result<Sequence<N>, MetapathError> {
    adjust_to_timezone("adjust-date-to-timezone", args, ctx, AtomicType::Date)
}

pub fn fn_adjust_time_to_timezone<N: NodeItem>(
    args: Vec<Sequence<N>>,
    ctx: &EvaluationContext<'_, N>,
) -> Result<Sequence<N>, MetapathError> {
    adjust_to_timezone("adjust-time-to-timezone", args, ctx, AtomicType::Time)
}
