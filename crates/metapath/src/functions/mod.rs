mod array;
mod boolean;
mod datetime;
mod diagnostics;
pub mod hof;
mod map;
mod node;
mod numeric;
mod regex;
mod sequence;
mod string;
mod uri;

use metaschema_mdm::NodeItem;

use crate::engine::{EvaluationContext, Variables, evaluate, matches_sequence_type};
use crate::error::MetapathError;
use crate::lookup;
use crate::types::{AtomicType, AtomicValue, FunctionItem, Item, Sequence};

/// Arity bounds of every library function, keyed by canonical prefix and local name.
/// `None` as the upper bound means the function is variadic.
const SIGNATURES: &[(&str, &str, usize, Option<usize>)] = &[
    ("fn", "true", 0, Some(0)),
    ("fn", "false", 0, Some(0)),
    ("fn", "not", 1, Some(1)),
    ("fn", "boolean", 1, Some(1)),
    ("fn", "count", 1, Some(1)),
    ("fn", "empty", 1, Some(1)),
    ("fn", "exists", 1, Some(1)),
    ("fn", "head", 1, Some(1)),
    ("fn", "tail", 1, Some(1)),
    ("fn", "reverse", 1, Some(1)),
    ("fn", "subsequence", 2, Some(3)),
    ("fn", "distinct-values", 1, Some(1)),
    ("fn", "index-of", 2, Some(2)),
    ("fn", "insert-before", 3, Some(3)),
    ("fn", "remove", 2, Some(2)),
    ("fn", "deep-equal", 2, Some(2)),
    ("fn", "exactly-one", 1, Some(1)),
    ("fn", "zero-or-one", 1, Some(1)),
    ("fn", "one-or-more", 1, Some(1)),
    ("fn", "data", 0, Some(1)),
    ("fn", "sum", 1, Some(2)),
    ("fn", "avg", 1, Some(1)),
    ("fn", "min", 1, Some(1)),
    ("fn", "max", 1, Some(1)),
    ("fn", "string", 0, Some(1)),
    ("fn", "concat", 2, None),
    ("fn", "string-join", 1, Some(2)),
    ("fn", "string-length", 0, Some(1)),
    ("fn", "substring", 2, Some(3)),
    ("fn", "substring-before", 2, Some(2)),
    ("fn", "substring-after", 2, Some(2)),
    ("fn", "contains", 2, Some(2)),
    ("fn", "starts-with", 2, Some(2)),
    ("fn", "ends-with", 2, Some(2)),
    ("fn", "upper-case", 1, Some(1)),
    ("fn", "lower-case", 1, Some(1)),
    ("fn", "normalize-space", 0, Some(1)),
    ("fn", "translate", 3, Some(3)),
    ("fn", "compare", 2, Some(2)),
    ("fn", "matches", 2, Some(3)),
    ("fn", "replace", 3, Some(4)),
    ("fn", "tokenize", 1, Some(3)),
    ("fn", "number", 0, Some(1)),
    ("fn", "abs", 1, Some(1)),
    ("fn", "ceiling", 1, Some(1)),
    ("fn", "floor", 1, Some(1)),
    ("fn", "round", 1, Some(2)),
    ("fn", "name", 0, Some(1)),
    ("fn", "local-name", 0, Some(1)),
    ("fn", "root", 0, Some(1)),
    ("fn", "path", 0, Some(1)),
    ("fn", "base-uri", 0, Some(1)),
    ("fn", "document-uri", 0, Some(1)),
    ("fn", "namespace-uri", 0, Some(1)),
    ("fn", "static-base-uri", 0, Some(0)),
    ("fn", "resolve-uri", 1, Some(2)),
    ("fn", "innermost", 1, Some(1)),
    ("fn", "outermost", 1, Some(1)),
    ("fn", "has-children", 0, Some(1)),
    ("fn", "position", 0, Some(0)),
    ("fn", "last", 0, Some(0)),
    ("fn", "current-dateTime", 0, Some(0)),
    ("fn", "current-date", 0, Some(0)),
    ("fn", "current-time", 0, Some(0)),
    ("fn", "implicit-timezone", 0, Some(0)),
    ("fn", "year-from-date", 1, Some(1)),
    ("fn", "month-from-date", 1, Some(1)),
    ("fn", "day-from-date", 1, Some(1)),
    ("fn", "year-from-dateTime", 1, Some(1)),
    ("fn", "month-from-dateTime", 1, Some(1)),
    ("fn", "day-from-dateTime", 1, Some(1)),
    ("fn", "adjust-dateTime-to-timezone", 1, Some(2)),
    ("fn", "adjust-date-to-timezone", 1, Some(2)),
    ("fn", "adjust-time-to-timezone", 1, Some(2)),
    ("fn", "error", 0, Some(3)),
    ("fn", "trace", 1, Some(2)),
    ("fn", "for-each", 2, Some(2)),
    ("fn", "filter", 2, Some(2)),
    ("fn", "fold-left", 3, Some(3)),
    ("fn", "fold-right", 3, Some(3)),
    ("fn", "function-arity", 1, Some(1)),
    ("fn", "function-lookup", 2, Some(2)),
    ("map", "size", 1, Some(1)),
    ("map", "keys", 1, Some(1)),
    ("map", "contains", 2, Some(2)),
    ("map", "get", 2, Some(2)),
    ("map", "put", 3, Some(3)),
    ("map", "remove", 2, Some(2)),
    ("map", "entry", 2, Some(2)),
    ("map", "merge", 1, Some(2)),
    ("map", "find", 2, Some(2)),
    ("map", "for-each", 2, Some(2)),
    ("array", "size", 1, Some(1)),
    ("array", "get", 2, Some(2)),
    ("array", "put", 3, Some(3)),
    ("array", "append", 2, Some(2)),
    ("array", "head", 1, Some(1)),
    ("array", "tail", 1, Some(1)),
    ("array", "reverse", 1, Some(1)),
    ("array", "join", 1, Some(1)),
    ("array", "subarray", 2, Some(3)),
    ("array", "flatten", 1, Some(1)),
    ("array", "insert-before", 3, Some(3)),
    ("array", "remove", 2, Some(2)),
    ("math", "pi", 0, Some(0)),
    ("math", "sqrt", 1, Some(1)),
    ("math", "pow", 2, Some(2)),
    ("math", "exp", 1, Some(1)),
    ("math", "log", 1, Some(1)),
    ("math", "log10", 1, Some(1)),
    ("mp", "recurse-depth", 1, Some(2)),
];

/// The arity bounds of a library function, or `None` if no such function exists.
pub fn signature(prefix: &str, local: &str) -> Option<(usize, Option<usize>)> {
    SIGNATURES
        .iter()
        .find(|(p, l, _, _)| *p == prefix && *l == local)
        .map(|(_, _, min, max)| (*min, *max))
}

/// Whether `prefix:local#arity` names a library function.
pub fn is_known(prefix: &str, local: &str, arity: usize) -> bool {
    signature(prefix, local).is_some_and(|(min, max)| arity >= min && max.is_none_or(|m| arity <= m))
}

pub fn call_function<N: NodeItem>(
    prefix: &str,
    local: &str,
    args: Vec<Sequence<N>>,
    ctx: &EvaluationContext<'_, N>,
    local_vars: &Variables<N>,
) -> Result<Sequence<N>, MetapathError> {
    match (prefix, local) {
        ("fn", "true") => boolean::fn_true(args),
        ("fn", "false") => boolean::fn_false(args),
        ("fn", "not") => boolean::fn_not(args),
        ("fn", "boolean") => boolean::fn_boolean(args),

        ("fn", "count") => sequence::fn_count(args),
        ("fn", "empty") => sequence::fn_empty(args),
        ("fn", "exists") => sequence::fn_exists(args),
        ("fn", "head") => sequence::fn_head(args),
        ("fn", "tail") => sequence::fn_tail(args),
        ("fn", "reverse") => sequence::fn_reverse(args),
        ("fn", "subsequence") => sequence::fn_subsequence(args),
        ("fn", "distinct-values") => sequence::fn_distinct_values(args),
        ("fn", "index-of") => sequence::fn_index_of(args, ctx),
        ("fn", "insert-before") => sequence::fn_insert_before(args),
        ("fn", "remove") => sequence::fn_remove(args),
        ("fn", "deep-equal") => sequence::fn_deep_equal(args),
        ("fn", "exactly-one") => sequence::fn_exactly_one(args),
        ("fn", "zero-or-one") => sequence::fn_zero_or_one(args),
        ("fn", "one-or-more") => sequence::fn_one_or_more(args),
        ("fn", "data") => sequence::fn_data(args, ctx),
        ("fn", "sum") => sequence::fn_sum(args, ctx),
        ("fn", "avg") => sequence::fn_avg(args, ctx),
        ("fn", "min") => sequence::fn_min(args, ctx),
        ("fn", "max") => sequence::fn_max(args, ctx),

        ("fn", "string") => string::fn_string(args, ctx),
        ("fn", "concat") => string::fn_concat(args),
        ("fn", "string-join") => string::fn_string_join(args),
        ("fn", "string-length") => string::fn_string_length(args, ctx),
        ("fn", "substring") => string::fn_substring(args),
        ("fn", "substring-before") => string::fn_substring_before(args),
        ("fn", "substring-after") => string::fn_substring_after(args),
        ("fn", "contains") => string::fn_contains(args),
        ("fn", "starts-with") => string::fn_starts_with(args),
        ("fn", "ends-with") => string::fn_ends_with(args),
        ("fn", "upper-case") => string::fn_upper_case(args),
        ("fn", "lower-case") => string::fn_lower_case(args),
        ("fn", "normalize-space") => string::fn_normalize_space(args, ctx),
        ("fn", "translate") => string::fn_translate(args),
        ("fn", "compare") => string::fn_compare(args),

        ("fn", "matches") => regex::fn_matches(args),
        ("fn", "replace") => regex::fn_replace(args),
        ("fn", "tokenize") => regex::fn_tokenize(args),

        ("fn", "number") => numeric::fn_number(args, ctx),
        ("fn", "abs") => numeric::fn_abs(args),
        ("fn", "ceiling") => numeric::fn_ceiling(args),
        ("fn", "floor") => numeric::fn_floor(args),
        ("fn", "round") => numeric::fn_round(args),
        ("math", "pi") => numeric::math_pi(args),
        ("math", "sqrt") => numeric::math_sqrt(args),
        ("math", "pow") => numeric::math_pow(args),
        ("math", "exp") => numeric::math_exp(args),
        ("math", "log") => numeric::math_log(args),
        ("math", "log10") => numeric::math_log10(args),

        ("fn", "name") => node::fn_name(args, ctx),
        ("fn", "local-name") => node::fn_local_name(args, ctx),
        ("fn", "root") => node::fn_root(args, ctx),
        ("fn", "path") => node::fn_path(args, ctx),
        ("fn", "base-uri") => node::fn_base_uri(args, ctx),
        ("fn", "document-uri") => node::fn_document_uri(args, ctx),
        ("fn", "namespace-uri") => node::fn_namespace_uri(args, ctx),
        ("fn", "innermost") => node::fn_innermost(args),
        ("fn", "outermost") => node::fn_outermost(args),
        ("mp", "recurse-depth") => node::mp_recurse_depth(args, ctx),

        ("fn", "static-base-uri") => uri::fn_static_base_uri(args, ctx),
        ("fn", "resolve-uri") => uri::fn_resolve_uri(args, ctx),
        ("fn", "has-children") => node::fn_has_children(args, ctx),
        ("fn", "position") => node::fn_position(args, ctx),
        ("fn", "last") => node::fn_last(args, ctx),

        ("fn", "current-dateTime") => datetime::fn_current_datetime(args, ctx),
        ("fn", "current-date") => datetime::fn_current_date(args, ctx),
        ("fn", "current-time") => datetime::fn_current_time(args, ctx),
        ("fn", "implicit-timezone") => datetime::fn_implicit_timezone(args, ctx),
        ("fn", "year-from-date") => datetime::fn_year_from_date(args),
        ("fn", "month-from-date") => datetime::fn_month_from_date(args),
        ("fn", "day-from-date") => datetime::fn_day_from_date(args),
        ("fn", "year-from-dateTime") => datetime::fn_year_from_datetime(args),
        ("fn", "month-from-dateTime") => datetime::fn_month_from_datetime(args),
        ("fn", "day-from-dateTime") => datetime::fn_day_from_datetime(args),
        ("fn", "adjust-dateTime-to-timezone") => datetime::fn_adjust_datetime_to_timezone(args, ctx),
        ("fn", "adjust-date-to-timezone") => datetime::fn_adjust_date_to_timezone(args, ctx),
        ("fn", "adjust-time-to-timezone") => datetime::fn_adjust_time_to_timezone(args, ctx),

        ("fn", "error") => diagnostics::fn_error(args),
        ("fn", "trace") => diagnostics::fn_trace(args),

        ("fn", "for-each") => hof::fn_for_each(args, ctx, local_vars),
        ("fn", "filter") => hof::fn_filter(args, ctx, local_vars),
        ("fn", "fold-left") => hof::fn_fold_left(args, ctx, local_vars),
        ("fn", "fold-right") => hof::fn_fold_right(args, ctx, local_vars),
        ("fn", "function-arity") => hof::fn_function_arity(args),
        ("fn", "function-lookup") => hof::fn_function_lookup(args, ctx),

        ("map", "size") => map::map_size(args),
        ("map", "keys") => map::map_keys(args),
        ("map", "contains") => map::map_contains(args),
        ("map", "get") => map::map_get(args),
        ("map", "put") => map::map_put(args),
        ("map", "remove") => map::map_remove(args),
        ("map", "entry") => map::map_entry(args),
        ("map", "merge") => map::map_merge(args),
        ("map", "find") => map::map_find(args),
        ("map", "for-each") => map::map_for_each(args, ctx, local_vars),

        ("array", "size") => array::array_size(args),
        ("array", "get") => array::array_get(args),
        ("array", "put") => array::array_put(args),
        ("array", "append") => array::array_append(args),
        ("array", "head") => array::array_head(args),
        ("array", "tail") => array::array_tail(args),
        ("array", "reverse") => array::array_reverse(args),
        ("array", "join") => array::array_join(args),
        ("array", "subarray") => array::array_subarray(args),
        ("array", "flatten") => array::array_flatten(args),
        ("array", "insert-before") => array::array_insert_before(args),
        ("array", "remove") => array::array_remove(args),

        _ => Err(MetapathError::function(
            format!("{}:{}", prefix, local),
            "Unknown function",
        )),
    }
}

/// Calls a function item with fully supplied arguments.
pub fn call_function_item<N: NodeItem>(
    func: &FunctionItem<N>,
    args: Vec<Sequence<N>>,
    ctx: &EvaluationContext<'_, N>,
    local_vars: &Variables<N>,
) -> Result<Sequence<N>, MetapathError> {
    if args.len() != func.arity() {
        return Err(MetapathError::type_error(format!(
            "Function '{}' expects {} arguments, got {}",
            func.to_signature(),
            func.arity(),
            args.len()
        )));
    }
    match func {
        FunctionItem::Named { prefix, local, .. } => {
            call_function(prefix, local, args, ctx, local_vars)
        }
        FunctionItem::Inline {
            params,
            body,
            captured,
        } => {
            let mut new_vars = local_vars.clone();
            for (name, val) in captured.iter() {
                new_vars.insert(name.clone(), val.clone());
            }
            for (param, arg) in params.iter().zip(args) {
                if let Some(declared) = &param.type_decl
                    && !matches_sequence_type(&arg, declared)?
                {
                    return Err(MetapathError::type_error(format!(
                        "Argument '{}' for parameter '${}' does not match its declared type",
                        arg.to_signature(),
                        param.name
                    )));
                }
                new_vars.insert(param.name.clone(), arg);
            }
            evaluate(body, &ctx.without_focus(), &new_vars)
        }
        FunctionItem::Partial { base, bound } => {
            let mut full_args = Vec::with_capacity(bound.len());
            let mut arg_iter = args.into_iter();
            for slot in bound {
                match slot {
                    Some(v) => full_args.push(v.clone()),
                    None => {
                        if let Some(a) = arg_iter.next() {
                            full_args.push(a);
                        }
                    }
                }
            }
            call_function_item(base, full_args, ctx, local_vars)
        }
    }
}

/// Calls any callable item: a function, or a map or array used as a function of one key.
pub fn call_item<N: NodeItem>(
    callee: &Item<N>,
    mut args: Vec<Sequence<N>>,
    ctx: &EvaluationContext<'_, N>,
    local_vars: &Variables<N>,
) -> Result<Sequence<N>, MetapathError> {
    match callee {
        Item::Function(func) => call_function_item(func, args, ctx, local_vars),
        Item::Map(_) | Item::Array(_) => {
            if args.len() != 1 {
                return Err(MetapathError::type_error(format!(
                    "Maps and arrays take exactly one argument, got {}",
                    args.len()
                )));
            }
            lookup::call_collection(callee, &args.remove(0))
        }
        other => Err(MetapathError::type_error(format!(
            "Items of type '{}' cannot be called",
            other.type_name()
        ))),
    }
}

/// Checks the number of arguments a library function received.
pub(crate) fn check_arity<T>(
    function: &str,
    args: &[T],
    min: usize,
    max: usize,
) -> Result<(), MetapathError> {
    if args.len() < min || args.len() > max {
        let expected = match (min, max) {
            (1, 1) => "Expected 1 argument".to_string(),
            (a, b) if a == b => format!("Expected {} arguments", a),
            (a, b) => format!("Expected {} to {} arguments", a, b),
        };
        return Err(MetapathError::function(function, expected));
    }
    Ok(())
}

/// The argument if one was given, else the focus as a singleton sequence.
pub(crate) fn arg_or_context<N: NodeItem>(
    mut args: Vec<Sequence<N>>,
    ctx: &EvaluationContext<'_, N>,
) -> Result<Sequence<N>, MetapathError> {
    if args.is_empty() {
        Ok(Sequence::of(ctx.context_item()?.clone()))
    } else {
        Ok(args.remove(0))
    }
}

/// The string value of an optional argument; the empty sequence gives `""`.
pub(crate) fn string_arg<N: NodeItem>(seq: &Sequence<N>) -> Result<String, MetapathError> {
    Ok(seq
        .atomize_optional()?
        .map(|v| v.to_string_value())
        .unwrap_or_default())
}

pub(crate) fn optional_string_arg<N: NodeItem>(
    seq: &Sequence<N>,
) -> Result<Option<String>, MetapathError> {
    Ok(seq.atomize_optional()?.map(|v| v.to_string_value()))
}

/// A required numeric argument, cast from untyped text if needed.
pub(crate) fn double_arg<N: NodeItem>(function: &str, seq: &Sequence<N>) -> Result<f64, MetapathError> {
    seq.atomize_optional()?
        .map(|v| v.cast_to(AtomicType::Double))
        .transpose()?
        .and_then(|v| v.to_double())
        .ok_or_else(|| MetapathError::function(function, "Expected a numeric argument"))
}

pub(crate) fn integer_arg<N: NodeItem>(function: &str, seq: &Sequence<N>) -> Result<i64, MetapathError> {
    match seq.atomize_optional()? {
        Some(AtomicValue::Integer(i)) => Ok(i),
        Some(v @ AtomicValue::UntypedAtomic(_)) => v
            .cast_to(AtomicType::Integer)?
            .to_integer()
            .ok_or_else(|| MetapathError::function(function, "Expected an integer argument")),
        Some(other) => Err(MetapathError::type_error(format!(
            "Function '{}' expected an integer argument, found '{}'",
            function,
            other.type_name()
        ))),
        None => Err(MetapathError::function(function, "Expected an integer argument")),
    }
}

/// Exactly one callable item: a function, map or array.
pub(crate) fn function_arg<N: NodeItem>(
    function: &str,
    seq: &Sequence<N>,
) -> Result<Item<N>, MetapathError> {
    match seq.exactly_one()? {
        item @ (Item::Function(_) | Item::Map(_) | Item::Array(_)) => Ok(item),
        other => Err(MetapathError::type_error(format!(
            "Function '{}' expected a function item, found '{}'",
            function,
            other.type_name()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_lookup() {
        assert_eq!(signature("fn", "count"), Some((1, Some(1))));
        assert_eq!(signature("fn", "concat"), Some((2, None)));
        assert_eq!(signature("fn", "no-such-function"), None);
        assert!(is_known("fn", "concat", 5));
        assert!(!is_known("fn", "count", 2));
        assert!(is_known("array", "get", 2));
        assert!(!is_known("array", "count", 1));
        assert!(is_known("mp", "recurse-depth", 1));
        assert!(is_known("fn", "adjust-dateTime-to-timezone", 2));
        assert!(!is_known("fn", "static-base-uri", 1));
    }

    #[test]
    fn test_check_arity_messages() {
        let err = check_arity("count", &[0u8; 2], 1, 1).unwrap_err();
        assert_eq!(err.to_string(), "Function 'count' error: Expected 1 argument");
        let err = check_arity("substring", &[0u8; 1], 2, 3).unwrap_err();
        assert_eq!(err.to_string(), "Function 'substring' error: Expected 2 to 3 arguments");
        assert!(check_arity("substring", &[0u8; 3], 2, 3).is_ok());
    }
}
