//! Higher-order functions: functions that take function items as arguments.

use super::{call_item, check_arity, function_arg, integer_arg, is_known, string_arg};
use crate::context::library_prefix;
use crate::engine::{EvaluationContext, Variables};
use crate::error::MetapathError;
use crate::types::{AtomicValue, FunctionItem, Item, Sequence};
use metaschema_mdm::NodeItem;

pub fn fn_for_each<N: NodeItem>(
    mut args: Vec<Sequence<N>>,
    ctx: &EvaluationContext<'_, N>,
    local_vars: &Variables<N>,
) -> Result<Sequence<N>, MetapathError> {
    check_arity("for-each", &args, 2, 2)?;
    let action = function_arg("for-each", &args.remove(1))?;
    let mut results = Vec::new();
    for item in args.remove(0).into_items()? {
        let result = call_item(&action, vec![Sequence::of(item)], ctx, local_vars)?;
        results.push(result);
    }
    Sequence::concat(results)
}

/// Keeps the items for which the predicate returns `true`; any other result is a type
/// error.
pub fn fn_filter<N: NodeItem>(
    mut args: Vec<Sequence<N>>,
    ctx: &EvaluationContext<'_, N>,
    local_vars: &Variables<N>,
) -> Result<Sequence<N>, MetapathError> {
    check_arity("filter", &args, 2, 2)?;
    let predicate = function_arg("filter", &args.remove(1))?;
    let mut kept = Vec::new();
    for item in args.remove(0).into_items()? {
        let verdict = call_item(&predicate, vec![Sequence::of(item.clone())], ctx, local_vars)?;
        match verdict.first_item(true)? {
            Some(Item::Atomic(AtomicValue::Boolean(true))) => kept.push(item),
            Some(Item::Atomic(AtomicValue::Boolean(false))) => {}
            _ => {
                return Err(MetapathError::type_error(format!(
                    "The filter predicate must return a single boolean, got '{}'",
                    verdict.to_signature()
                )));
            }
        }
    }
    Ok(Sequence::from_items(kept))
}

pub fn fn_fold_left<N: NodeItem>(
    mut args: Vec<Sequence<N>>,
    ctx: &EvaluationContext<'_, N>,
    local_vars: &Variables<N>,
) -> Result<Sequence<N>, MetapathError> {
    check_arity("fold-left", &args, 3, 3)?;
    let action = function_arg("fold-left", &args.remove(2))?;
    let mut accumulator = args.remove(1);
    for item in args.remove(0).into_items()? {
        accumulator = call_item(
            &action,
            vec![accumulator.reusable()?, Sequence::of(item)],
            ctx,
            local_vars,
        )?;
    }
    Ok(accumulator)
}

pub fn fn_fold_right<N: NodeItem>(
    mut args: Vec<Sequence<N>>,
    ctx: &EvaluationContext<'_, N>,
    local_vars: &Variables<N>,
) -> Result<Sequence<N>, MetapathError> {
    check_arity("fold-right", &args, 3, 3)?;
    let action = function_arg("fold-right", &args.remove(2))?;
    let mut accumulator = args.remove(1);
    for item in args.remove(0).into_items()?.into_iter().rev() {
        accumulator = call_item(
            &action,
            vec![Sequence::of(item), accumulator.reusable()?],
            ctx,
            local_vars,
        )?;
    }
    Ok(accumulator)
}

pub fn fn_function_arity<N: NodeItem>(mut args: Vec<Sequence<N>>) -> Result<Sequence<N>, MetapathError> {
    check_arity("function-arity", &args, 1, 1)?;
    let arity = match function_arg("function-arity", &args.remove(0))? {
        Item::Function(func) => func.arity(),
        // maps and arrays are functions of one key
        _ => 1,
    };
    Ok(Sequence::from_integer(arity as i64))
}

/// The library function named by `$name` with the given arity, or the empty sequence if
/// there is none.
///
/// The name is given lexically: `Q{uri}local`, `prefix:local` resolved against the
/// static context, or an unprefixed name in the default function namespace.
pub fn fn_function_lookup<N: NodeItem>(
    args: Vec<Sequence<N>>,
    ctx: &EvaluationContext<'_, N>,
) -> Result<Sequence<N>, MetapathError> {
    check_arity("function-lookup", &args, 2, 2)?;
    let name = string_arg(&args[0])?;
    let arity = integer_arg("function-lookup", &args[1])?;
    let static_context = ctx.dynamic.static_context();
    let (namespace, local) = if let Some(rest) = name.strip_prefix("Q{") {
        match rest.split_once('}') {
            Some((uri, local)) => (Some(uri), local),
            None => return Ok(Sequence::empty()),
        }
    } else if let Some((prefix, local)) = name.split_once(':') {
        (static_context.lookup_namespace(prefix), local)
    } else {
        (Some(static_context.default_function_namespace()), name.as_str())
    };
    let Some(prefix) = namespace.and_then(library_prefix) else {
        return Ok(Sequence::empty());
    };
    match usize::try_from(arity) {
        Ok(arity) if is_known(prefix, local, arity) => Ok(Sequence::of(Item::Function(
            FunctionItem::named(prefix, local, arity),
        ))),
        _ => Ok(Sequence::empty()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::DynamicContext;
    use crate::types::FunctionItem;
    use metaschema_mdm::NodeRef;

    fn ints(values: &[i64]) -> Sequence<NodeRef> {
        Sequence::from_atomics(values.iter().map(|v| AtomicValue::Integer(*v)))
    }

    fn named(local: &str, arity: usize) -> Sequence<NodeRef> {
        Sequence::of(Item::Function(FunctionItem::named("fn", local, arity)))
    }

    #[test]
    fn test_for_each_with_named_function() {
        let dynamic = DynamicContext::new();
        let ctx = EvaluationContext::new(None, &dynamic);
        let vars = Variables::new();
        let result = fn_for_each(vec![ints(&[-1, 2, -3]), named("abs", 1)], &ctx, &vars).unwrap();
        assert_eq!(result, ints(&[1, 2, 3]));
    }

    #[test]
    fn test_filter_requires_boolean() {
        let dynamic = DynamicContext::new();
        let ctx = EvaluationContext::new(None, &dynamic);
        let vars = Variables::new();
        let kept = fn_filter(
            vec![Sequence::from_atomics([true.into(), false.into()]), named("boolean", 1)],
            &ctx,
            &vars,
        )
        .unwrap();
        assert_eq!(kept, Sequence::from_bool(true));
        assert!(fn_filter(vec![ints(&[1]), named("abs", 1)], &ctx, &vars).is_err());
    }

    #[test]
    fn test_folds_with_concat() {
        let dynamic = DynamicContext::new();
        let ctx = EvaluationContext::new(None, &dynamic);
        let vars = Variables::new();
        let left = fn_fold_left(
            vec![ints(&[1, 2, 3]), Sequence::from_string(""), named("concat", 2)],
            &ctx,
            &vars,
        )
        .unwrap();
        assert_eq!(left, Sequence::from_string("123"));
        let right = fn_fold_right(
            vec![ints(&[1, 2, 3]), Sequence::from_string(""), named("concat", 2)],
            &ctx,
            &vars,
        )
        .unwrap();
        assert_eq!(right, Sequence::from_string("123"));
    }

    #[test]
    fn test_function_lookup() {
        let dynamic = DynamicContext::new();
        let ctx = EvaluationContext::new(None, &dynamic);
        let vars = Variables::new();
        let lookup = |name: &str, arity: i64| {
            fn_function_lookup::<NodeRef>(vec![Sequence::from_string(name), Sequence::from_integer(arity)], &ctx)
                .unwrap()
        };
        assert_eq!(lookup("abs", 1), named("abs", 1));
        assert_eq!(lookup("fn:abs", 1), named("abs", 1));
        let size = lookup("Q{http://csrc.nist.gov/ns/metaschema/metapath-functions/array}size", 1);
        assert_eq!(size.to_signature(), "(function{array:size#1})");
        assert!(lookup("abs", 2).is_empty().unwrap());
        assert!(lookup("nope:abs", 1).is_empty().unwrap());
        assert!(lookup("abs", -1).is_empty().unwrap());

        let abs = lookup("abs", 1);
        let result = fn_for_each(vec![ints(&[-4]), abs], &ctx, &vars).unwrap();
        assert_eq!(result, ints(&[4]));
    }

    #[test]
    fn test_function_arity() {
        assert_eq!(fn_function_arity(vec![named("substring", 3)]).unwrap(), Sequence::from_integer(3));
    }
}
