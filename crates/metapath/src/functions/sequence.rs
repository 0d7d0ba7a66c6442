use super::{arg_or_context, check_arity, double_arg, integer_arg};
use crate::ast::BinaryOperator;
use crate::engine::EvaluationContext;
use crate::error::{CardinalityCode, MetapathError};
use crate::operators::{arithmetic, atomic_deep_equal, compare_atomic};
use crate::types::{AtomicType, AtomicValue, Sequence};
use metaschema_mdm::NodeItem;
use std::cmp::Ordering;

pub fn fn_count<N: NodeItem>(mut args: Vec<Sequence<N>>) -> Result<Sequence<N>, MetapathError> {
    check_arity("count", &args, 1, 1)?;
    let seq = args.remove(0);
    Ok(Sequence::from_integer(seq.len()? as i64))
}

pub fn fn_empty<N: NodeItem>(mut args: Vec<Sequence<N>>) -> Result<Sequence<N>, MetapathError> {
    check_arity("empty", &args, 1, 1)?;
    let seq = args.remove(0);
    Ok(Sequence::from_bool(seq.is_empty()?))
}

pub fn fn_exists<N: NodeItem>(mut args: Vec<Sequence<N>>) -> Result<Sequence<N>, MetapathError> {
    check_arity("exists", &args, 1, 1)?;
    let seq = args.remove(0);
    Ok(Sequence::from_bool(!seq.is_empty()?))
}

pub fn fn_head<N: NodeItem>(mut args: Vec<Sequence<N>>) -> Result<Sequence<N>, MetapathError> {
    check_arity("head", &args, 1, 1)?;
    let seq = args.remove(0);
    match seq.first_item(false)? {
        Some(item) => Ok(Sequence::of(item)),
        None => Ok(Sequence::empty()),
    }
}

pub fn fn_tail<N: NodeItem>(mut args: Vec<Sequence<N>>) -> Result<Sequence<N>, MetapathError> {
    check_arity("tail", &args, 1, 1)?;
    let seq = args.remove(0);
    Ok(Sequence::from_items(seq.into_items()?.into_iter().skip(1).collect()))
}

pub fn fn_reverse<N: NodeItem>(mut args: Vec<Sequence<N>>) -> Result<Sequence<N>, MetapathError> {
    check_arity("reverse", &args, 1, 1)?;
    let mut items = args.remove(0).into_items()?;
    items.reverse();
    Ok(Sequence::from_items(items))
}

fn round_half_up(value: f64) -> f64 {
    (value + 0.5).floor()
}

/// Items at positions `p` with `round(start) <= p < round(start) + round(length)`.
pub fn fn_subsequence<N: NodeItem>(mut args: Vec<Sequence<N>>) -> Result<Sequence<N>, MetapathError> {
    check_arity("subsequence", &args, 2, 3)?;
    let length = if args.len() == 3 {
        Some(double_arg("subsequence", &args.remove(2))?)
    } else {
        None
    };
    let start = round_half_up(double_arg("subsequence", &args.remove(1))?);
    let end = length.map_or(f64::INFINITY, |l| start + round_half_up(l));
    let items = args.remove(0).into_items()?;
    Ok(Sequence::from_items(
        items
            .into_iter()
            .enumerate()
            .filter(|(i, _)| {
                let position = (*i + 1) as f64;
                position >= start && position < end
            })
            .map(|(_, item)| item)
            .collect(),
    ))
}

pub fn fn_distinct_values<N: NodeItem>(
    mut args: Vec<Sequence<N>>,
) -> Result<Sequence<N>, MetapathError> {
    check_arity("distinct-values", &args, 1, 1)?;
    let values = args.remove(0).atomize()?;
    let mut distinct: Vec<AtomicValue> = Vec::new();
    for value in values {
        if !distinct.iter().any(|seen| atomic_deep_equal(seen, &value)) {
            distinct.push(value);
        }
    }
    Ok(Sequence::from_atomics(distinct))
}

pub fn fn_index_of<N: NodeItem>(
    mut args: Vec<Sequence<N>>,
    ctx: &EvaluationContext<'_, N>,
) -> Result<Sequence<N>, MetapathError> {
    check_arity("index-of", &args, 2, 2)?;
    let Some(search) = args.remove(1).atomize_optional()? else {
        return Err(MetapathError::Cardinality {
            expected: CardinalityCode::ExactlyOne,
            actual: 0,
        });
    };
    let timezone = ctx.dynamic.implicit_timezone();
    let positions = args
        .remove(0)
        .atomize()?
        .iter()
        .enumerate()
        .filter(|(_, value)| {
            matches!(compare_atomic(value, &search, timezone), Ok(Some(Ordering::Equal)))
        })
        .map(|(i, _)| AtomicValue::Integer(i as i64 + 1))
        .collect::<Vec<_>>();
    Ok(Sequence::from_atomics(positions))
}

pub fn fn_insert_before<N: NodeItem>(
    mut args: Vec<Sequence<N>>,
) -> Result<Sequence<N>, MetapathError> {
    check_arity("insert-before", &args, 3, 3)?;
    let inserts = args.remove(2).into_items()?;
    let position = integer_arg("insert-before", &args.remove(1))?;
    let mut items = args.remove(0).into_items()?;
    let index = (position.max(1) as usize - 1).min(items.len());
    items.splice(index..index, inserts);
    Ok(Sequence::from_items(items))
}

pub fn fn_remove<N: NodeItem>(mut args: Vec<Sequence<N>>) -> Result<Sequence<N>, MetapathError> {
    check_arity("remove", &args, 2, 2)?;
    let position = integer_arg("remove", &args.remove(1))?;
    let mut items = args.remove(0).into_items()?;
    if position >= 1 && (position as usize) <= items.len() {
        items.remove(position as usize - 1);
    }
    Ok(Sequence::from_items(items))
}

pub fn fn_deep_equal<N: NodeItem>(mut args: Vec<Sequence<N>>) -> Result<Sequence<N>, MetapathError> {
    check_arity("deep-equal", &args, 2, 2)?;
    let right = args.remove(1);
    let left = args.remove(0);
    Ok(Sequence::from_bool(left.deep_equals(&right)))
}

fn cardinality<N: NodeItem>(
    function: &str,
    mut args: Vec<Sequence<N>>,
    expected: CardinalityCode,
) -> Result<Sequence<N>, MetapathError> {
    check_arity(function, &args, 1, 1)?;
    let seq = args.remove(0);
    let actual = seq.len()?;
    let ok = match expected {
        CardinalityCode::ZeroOrOne => actual <= 1,
        CardinalityCode::OneOrMore => actual >= 1,
        CardinalityCode::ExactlyOne => actual == 1,
    };
    if !ok {
        return Err(MetapathError::Cardinality { expected, actual });
    }
    Ok(seq)
}

pub fn fn_exactly_one<N: NodeItem>(args: Vec<Sequence<N>>) -> Result<Sequence<N>, MetapathError> {
    cardinality("exactly-one", args, CardinalityCode::ExactlyOne)
}

pub fn fn_zero_or_one<N: NodeItem>(args: Vec<Sequence<N>>) -> Result<Sequence<N>, MetapathError> {
    cardinality("zero-or-one", args, CardinalityCode::ZeroOrOne)
}

pub fn fn_one_or_more<N: NodeItem>(args: Vec<Sequence<N>>) -> Result<Sequence<N>, MetapathError> {
    cardinality("one-or-more", args, CardinalityCode::OneOrMore)
}

pub fn fn_data<N: NodeItem>(
    args: Vec<Sequence<N>>,
    ctx: &EvaluationContext<'_, N>,
) -> Result<Sequence<N>, MetapathError> {
    check_arity("data", &args, 0, 1)?;
    let seq = arg_or_context(args, ctx)?;
    Ok(Sequence::from_atomics(seq.atomize()?))
}

/// Atomizes for aggregation: untyped values count as doubles.
fn aggregate_values<N: NodeItem>(seq: &Sequence<N>) -> Result<Vec<AtomicValue>, MetapathError> {
    seq.atomize()?
        .into_iter()
        .map(|v| match v {
            AtomicValue::UntypedAtomic(_) => v.cast_to(AtomicType::Double),
            other => Ok(other),
        })
        .collect()
}

pub fn fn_sum<N: NodeItem>(
    mut args: Vec<Sequence<N>>,
    ctx: &EvaluationContext<'_, N>,
) -> Result<Sequence<N>, MetapathError> {
    check_arity("sum", &args, 1, 2)?;
    let zero = if args.len() == 2 {
        args.remove(1)
    } else {
        Sequence::from_integer(0)
    };
    let mut values = aggregate_values(&args.remove(0))?.into_iter();
    let Some(first) = values.next() else {
        return Ok(zero);
    };
    let timezone = ctx.dynamic.implicit_timezone();
    let mut total = first;
    for value in values {
        total = arithmetic(BinaryOperator::Plus, &total, &value, timezone)?;
    }
    Ok(Sequence::from_atomic(total))
}

pub fn fn_avg<N: NodeItem>(
    mut args: Vec<Sequence<N>>,
    ctx: &EvaluationContext<'_, N>,
) -> Result<Sequence<N>, MetapathError> {
    check_arity("avg", &args, 1, 1)?;
    let values = aggregate_values(&args.remove(0))?;
    let count = values.len() as i64;
    let mut iter = values.into_iter();
    let Some(first) = iter.next() else {
        return Ok(Sequence::empty());
    };
    let timezone = ctx.dynamic.implicit_timezone();
    let mut total = first;
    for value in iter {
        total = arithmetic(BinaryOperator::Plus, &total, &value, timezone)?;
    }
    let avg = arithmetic(
        BinaryOperator::Divide,
        &total,
        &AtomicValue::Integer(count),
        timezone,
    )?;
    Ok(Sequence::from_atomic(avg))
}

fn extreme<N: NodeItem>(
    function: &str,
    mut args: Vec<Sequence<N>>,
    ctx: &EvaluationContext<'_, N>,
    keep: Ordering,
) -> Result<Sequence<N>, MetapathError> {
    check_arity(function, &args, 1, 1)?;
    let timezone = ctx.dynamic.implicit_timezone();
    let mut best: Option<AtomicValue> = None;
    for value in aggregate_values(&args.remove(0))? {
        if matches!(value, AtomicValue::Double(d) if d.is_nan()) {
            return Ok(Sequence::from_atomic(AtomicValue::Double(f64::NAN)));
        }
        best = Some(match best {
            None => value,
            Some(current) => match compare_atomic(&value, &current, timezone)? {
                Some(ord) if ord == keep => value,
                _ => current,
            },
        });
    }
    Ok(best.map(Sequence::from_atomic).unwrap_or_default())
}

pub fn fn_min<N: NodeItem>(
    args: Vec<Sequence<N>>,
    ctx: &EvaluationContext<'_, N>,
) -> Result<Sequence<N>, MetapathError> {
    extreme("min", args, ctx, Ordering::Less)
}

pub fn fn_max<N: NodeItem>(
    args: Vec<Sequence<N>>,
    ctx: &EvaluationContext<'_, N>,
) -> Result<Sequence<N>, MetapathError> {
    extreme("max", args, ctx, Ordering::Greater)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::DynamicContext;
    use metaschema_mdm::NodeRef;

    fn ints(values: &[i64]) -> Sequence<NodeRef> {
        Sequence::from_atomics(values.iter().map(|i| AtomicValue::Integer(*i)))
    }

    #[test]
    fn test_count_and_exists() {
        assert_eq!(fn_count(vec![ints(&[1, 2, 3])]).unwrap(), Sequence::from_integer(3));
        assert_eq!(fn_exists(vec![ints(&[])]).unwrap(), Sequence::from_bool(false));
        assert_eq!(fn_empty(vec![ints(&[])]).unwrap(), Sequence::from_bool(true));
    }

    #[test]
    fn test_subsequence_rounds_positions() {
        let result = fn_subsequence(vec![
            ints(&[1, 2, 3, 4, 5]),
            Sequence::from_atomic(AtomicValue::Double(1.5)),
            Sequence::from_integer(2),
        ])
        .unwrap();
        assert_eq!(result, ints(&[2, 3]));
        let result = fn_subsequence(vec![ints(&[1, 2, 3]), Sequence::from_integer(2)]).unwrap();
        assert_eq!(result, ints(&[2, 3]));
    }

    #[test]
    fn test_distinct_values_promotes_numbers() {
        let seq = Sequence::from_atomics([
            AtomicValue::Integer(1),
            AtomicValue::Decimal(rust_decimal::Decimal::ONE),
            AtomicValue::string("1"),
        ]);
        let result = fn_distinct_values::<NodeRef>(vec![seq]).unwrap();
        assert_eq!(result.len().unwrap(), 2);
    }

    #[test]
    fn test_insert_and_remove() {
        let result = fn_insert_before(vec![ints(&[1, 3]), Sequence::from_integer(2), ints(&[2])]).unwrap();
        assert_eq!(result, ints(&[1, 2, 3]));
        let result = fn_insert_before(vec![ints(&[1]), Sequence::from_integer(9), ints(&[2])]).unwrap();
        assert_eq!(result, ints(&[1, 2]));
        let result = fn_remove(vec![ints(&[1, 2, 3]), Sequence::from_integer(2)]).unwrap();
        assert_eq!(result, ints(&[1, 3]));
        let result = fn_remove(vec![ints(&[1]), Sequence::from_integer(0)]).unwrap();
        assert_eq!(result, ints(&[1]));
    }

    #[test]
    fn test_cardinality_functions() {
        assert!(fn_exactly_one(vec![ints(&[1, 2])]).is_err());
        assert!(fn_one_or_more(vec![ints(&[])]).is_err());
        let err = fn_zero_or_one(vec![ints(&[1, 2])]).unwrap_err();
        assert_eq!(err.code(), "FORG0003");
    }

    #[test]
    fn test_aggregates() {
        let dynamic = DynamicContext::new();
        let ctx = EvaluationContext::new(None, &dynamic);
        assert_eq!(fn_sum(vec![ints(&[1, 2, 3])], &ctx).unwrap(), Sequence::from_integer(6));
        assert_eq!(fn_sum(vec![ints(&[])], &ctx).unwrap(), Sequence::from_integer(0));
        assert_eq!(fn_max(vec![ints(&[3, 9, 2])], &ctx).unwrap(), Sequence::from_integer(9));
        assert_eq!(fn_min(vec![ints(&[3, 9, 2])], &ctx).unwrap(), Sequence::from_integer(2));
        assert!(fn_avg(vec![ints(&[])], &ctx).unwrap().is_empty().unwrap());
        let avg = fn_avg(vec![ints(&[1, 2])], &ctx).unwrap();
        assert_eq!(avg.atomize().unwrap()[0].to_string_value(), "1.5");
    }

    #[test]
    fn test_index_of() {
        let dynamic = DynamicContext::new();
        let ctx = EvaluationContext::new(None, &dynamic);
        let result = fn_index_of(vec![ints(&[5, 1, 5]), Sequence::from_integer(5)], &ctx).unwrap();
        assert_eq!(result, ints(&[1, 3]));
    }
}
