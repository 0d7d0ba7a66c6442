use super::{arg_or_context, check_arity, double_arg, integer_arg};
use crate::engine::EvaluationContext;
use crate::error::MetapathError;
use crate::types::{AtomicType, AtomicValue, Sequence};
use metaschema_mdm::NodeItem;
use rust_decimal::{Decimal, RoundingStrategy};

/// The numeric argument of a rounding function; untyped text is read as a double.
fn numeric_operand<N: NodeItem>(
    function: &str,
    seq: &Sequence<N>,
) -> Result<Option<AtomicValue>, MetapathError> {
    match seq.atomize_optional()? {
        None => Ok(None),
        Some(v @ AtomicValue::UntypedAtomic(_)) => Ok(Some(v.cast_to(AtomicType::Double)?)),
        Some(v) if v.is_numeric() => Ok(Some(v)),
        Some(other) => Err(MetapathError::type_error(format!(
            "Function '{}' expected a numeric argument, found '{}'",
            function,
            other.type_name()
        ))),
    }
}

/// Applies one operation per numeric type, keeping the argument's type.
fn map_numeric<N: NodeItem>(
    function: &str,
    mut args: Vec<Sequence<N>>,
    on_integer: impl Fn(i64) -> Option<i64>,
    on_decimal: impl Fn(Decimal) -> Decimal,
    on_double: impl Fn(f64) -> f64,
) -> Result<Sequence<N>, MetapathError> {
    check_arity(function, &args, 1, 1)?;
    let Some(value) = numeric_operand(function, &args.remove(0))? else {
        return Ok(Sequence::empty());
    };
    let result = match value {
        AtomicValue::Integer(i) => match on_integer(i) {
            Some(r) => AtomicValue::Integer(r),
            None => return Err(MetapathError::numeric_overflow("Numeric overflow")),
        },
        AtomicValue::Decimal(d) => AtomicValue::Decimal(on_decimal(d)),
        AtomicValue::Double(d) => AtomicValue::Double(on_double(d)),
        other => other,
    };
    Ok(Sequence::from_atomic(result))
}

pub fn fn_number<N: NodeItem>(
    args: Vec<Sequence<N>>,
    ctx: &EvaluationContext<'_, N>,
) -> Result<Sequence<N>, MetapathError> {
    check_arity("number", &args, 0, 1)?;
    let seq = arg_or_context(args, ctx)?;
    let value = seq
        .atomize_optional()?
        .and_then(|v| v.cast_to(AtomicType::Double).ok())
        .and_then(|v| v.to_double())
        .unwrap_or(f64::NAN);
    Ok(Sequence::from_atomic(AtomicValue::Double(value)))
}

pub fn fn_abs<N: NodeItem>(args: Vec<Sequence<N>>) -> Result<Sequence<N>, MetapathError> {
    map_numeric("abs", args, i64::checked_abs, |d| d.abs(), f64::abs)
}

pub fn fn_ceiling<N: NodeItem>(args: Vec<Sequence<N>>) -> Result<Sequence<N>, MetapathError> {
    map_numeric("ceiling", args, Some, |d| d.ceil(), f64::ceil)
}

pub fn fn_floor<N: NodeItem>(args: Vec<Sequence<N>>) -> Result<Sequence<N>, MetapathError> {
    map_numeric("floor", args, Some, |d| d.floor(), f64::floor)
}

/// Rounds half towards positive infinity, optionally at a number of decimal places.
pub fn fn_round<N: NodeItem>(mut args: Vec<Sequence<N>>) -> Result<Sequence<N>, MetapathError> {
    check_arity("round", &args, 1, 2)?;
    let precision = if args.len() == 2 {
        integer_arg("round", &args.remove(1))?
    } else {
        0
    };
    let half_up = |d: Decimal| {
        let strategy = if d.is_sign_negative() {
            RoundingStrategy::MidpointTowardZero
        } else {
            RoundingStrategy::MidpointAwayFromZero
        };
        if precision >= 0 {
            d.round_dp_with_strategy(precision.min(28) as u32, strategy)
        } else {
            let factor = Decimal::from(10i64.saturating_pow(precision.unsigned_abs().min(18) as u32));
            (d / factor).round_dp_with_strategy(0, strategy).saturating_mul(factor)
        }
    };
    let scale = 10f64.powi(precision.clamp(-300, 300) as i32);
    map_numeric(
        "round",
        args,
        |i| {
            if precision >= 0 {
                return Some(i);
            }
            half_up(Decimal::from(i)).try_into().ok()
        },
        &half_up,
        |d| {
            if !d.is_finite() {
                d
            } else {
                (d * scale + 0.5).floor() / scale
            }
        },
    )
}

fn math_unary<N: NodeItem>(
    function: &str,
    mut args: Vec<Sequence<N>>,
    op: impl Fn(f64) -> f64,
) -> Result<Sequence<N>, MetapathError> {
    check_arity(function, &args, 1, 1)?;
    let seq = args.remove(0);
    if seq.is_empty()? {
        return Ok(Sequence::empty());
    }
    let value = double_arg(function, &seq)?;
    Ok(Sequence::from_atomic(AtomicValue::Double(op(value))))
}

pub fn math_pi<N: NodeItem>(args: Vec<Sequence<N>>) -> Result<Sequence<N>, MetapathError> {
    check_arity("pi", &args, 0, 0)?;
    Ok(Sequence::from_atomic(AtomicValue::Double(std::f64::consts::PI)))
}

pub fn math_sqrt<N: NodeItem>(args: Vec<Sequence<N>>) -> Result<Sequence<N>, MetapathError> {
    math_unary("sqrt", args, f64::sqrt)
}

pub fn math_exp<N: NodeItem>(args: Vec<Sequence<N>>) -> Result<Sequence<N>, MetapathError> {
    math_unary("exp", args, f64::exp)
}

pub fn math_log<N: NodeItem>(args: Vec<Sequence<N>>) -> Result<Sequence<N>, MetapathError> {
    math_unary("log", args, f64::ln)
}

pub fn math_log10<N: NodeItem>(args: Vec<Sequence<N>>) -> Result<Sequence<N>, MetapathError> {
    math_unary("log10", args, f64::log10)
}

pub fn math_pow<N: NodeItem>(mut args: Vec<Sequence<N>>) -> Result<Sequence<N>, MetapathError> {
    check_arity("pow", &args, 2, 2)?;
    let exponent = double_arg("pow", &args.remove(1))?;
    let base = args.remove(0);
    if base.is_empty()? {
        return Ok(Sequence::empty());
    }
    let base = double_arg("pow", &base)?;
    Ok(Sequence::from_atomic(AtomicValue::Double(base.powf(exponent))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use metaschema_mdm::NodeRef;
    use std::str::FromStr;

    fn dec(s: &str) -> Sequence<NodeRef> {
        Sequence::from_atomic(AtomicValue::Decimal(Decimal::from_str(s).unwrap()))
    }

    fn dbl(d: f64) -> Sequence<NodeRef> {
        Sequence::from_atomic(AtomicValue::Double(d))
    }

    #[test]
    fn test_abs_keeps_type() {
        assert_eq!(fn_abs(vec![Sequence::<NodeRef>::from_integer(-3)]).unwrap(), Sequence::from_integer(3));
        assert_eq!(fn_abs(vec![dec("-1.5")]).unwrap(), dec("1.5"));
        assert!(fn_abs(vec![Sequence::<NodeRef>::from_integer(i64::MIN)]).is_err());
        assert!(fn_abs::<NodeRef>(vec![Sequence::empty()]).unwrap().is_empty().unwrap());
    }

    #[test]
    fn test_ceiling_floor() {
        assert_eq!(fn_ceiling(vec![dec("10.5")]).unwrap(), dec("11"));
        assert_eq!(fn_floor(vec![dec("-10.5")]).unwrap(), dec("-11"));
        assert_eq!(fn_floor(vec![dbl(2.7)]).unwrap(), dbl(2.0));
    }

    #[test]
    fn test_round_half_up() {
        assert_eq!(fn_round(vec![dec("2.5")]).unwrap(), dec("3"));
        assert_eq!(fn_round(vec![dec("-2.5")]).unwrap(), dec("-2"));
        assert_eq!(fn_round(vec![dbl(2.4999)]).unwrap(), dbl(2.0));
        assert_eq!(fn_round(vec![dec("1.125"), Sequence::from_integer(2)]).unwrap(), dec("1.13"));
        assert_eq!(
            fn_round(vec![Sequence::<NodeRef>::from_integer(8452), Sequence::from_integer(-2)]).unwrap(),
            Sequence::from_integer(8500)
        );
    }

    #[test]
    fn test_number_of_text() {
        let dynamic = crate::context::DynamicContext::new();
        let ctx = EvaluationContext::new(None, &dynamic);
        assert_eq!(fn_number(vec![Sequence::from_string("12")], &ctx).unwrap(), dbl(12.0));
        let nan = fn_number(vec![Sequence::from_string("x")], &ctx).unwrap();
        assert!(nan.atomize().unwrap()[0].to_double().unwrap().is_nan());
    }

    #[test]
    fn test_math() {
        assert_eq!(math_sqrt(vec![Sequence::from_integer(16)]).unwrap(), dbl(4.0));
        assert_eq!(math_pow(vec![Sequence::from_integer(2), Sequence::from_integer(10)]).unwrap(), dbl(1024.0));
        assert_eq!(math_log10(vec![Sequence::from_integer(1000)]).unwrap(), dbl(3.0));
    }
}
