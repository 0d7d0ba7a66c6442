//! The `?` lookup operator and calling maps and arrays as functions.

use metaschema_mdm::NodeItem;

use crate::ast::{Expression, LookupKey};
use crate::engine::{EvaluationContext, Variables, evaluate};
use crate::error::MetapathError;
use crate::types::{ArrayItem, AtomicValue, Item, MapItem, Sequence};

/// Applies `key` to one lookup target, returning the selected values in order.
///
/// Results are collected eagerly so that an out-of-range array position fails the
/// lookup itself rather than a later read of the result.
pub fn lookup<N: NodeItem>(
    target: &Item<N>,
    key: &LookupKey,
    ctx: &EvaluationContext<'_, N>,
    local_vars: &Variables<N>,
) -> Result<Vec<Sequence<N>>, MetapathError> {
    match target {
        Item::Array(array) => lookup_array(array, key, ctx, local_vars),
        Item::Map(map) => lookup_map(map, key, ctx, local_vars),
        other => Err(MetapathError::type_error(format!(
            "Lookup requires a map or array, found '{}'",
            other.type_name()
        ))),
    }
}

fn evaluate_keys<N: NodeItem>(
    expr: &Expression,
    ctx: &EvaluationContext<'_, N>,
    local_vars: &Variables<N>,
) -> Result<Vec<AtomicValue>, MetapathError> {
    evaluate(expr, ctx, local_vars)?.atomize()
}

fn array_position(key: &AtomicValue) -> Result<i64, MetapathError> {
    match key {
        AtomicValue::Integer(i) => Ok(*i),
        AtomicValue::UntypedAtomic(_) | AtomicValue::Decimal(_) | AtomicValue::Double(_) => key
            .to_integer()
            .filter(|i| key.to_double() == Some(*i as f64))
            .ok_or_else(|| {
                MetapathError::type_error(format!(
                    "Array positions must be integers, found '{}'",
                    key.to_string_value()
                ))
            }),
        other => Err(MetapathError::type_error(format!(
            "Array positions must be integers, found '{}'",
            other.type_name()
        ))),
    }
}

fn lookup_array<N: NodeItem>(
    array: &ArrayItem<N>,
    key: &LookupKey,
    ctx: &EvaluationContext<'_, N>,
    local_vars: &Variables<N>,
) -> Result<Vec<Sequence<N>>, MetapathError> {
    match key {
        LookupKey::Wildcard => Ok(array.members().to_vec()),
        LookupKey::Integer(i) => Ok(vec![array.lookup(*i)?.clone()]),
        LookupKey::NCName(name) => Err(MetapathError::type_error(format!(
            "Array lookups require an integer position, found the name '{}'",
            name
        ))),
        LookupKey::Parenthesized(expr) => evaluate_keys(expr, ctx, local_vars)?
            .iter()
            .map(|k| Ok(array.lookup(array_position(k)?)?.clone()))
            .collect(),
    }
}

fn lookup_map<N: NodeItem>(
    map: &MapItem<N>,
    key: &LookupKey,
    ctx: &EvaluationContext<'_, N>,
    local_vars: &Variables<N>,
) -> Result<Vec<Sequence<N>>, MetapathError> {
    let keys = match key {
        LookupKey::Wildcard => return Ok(map.values().cloned().collect()),
        LookupKey::NCName(name) => vec![AtomicValue::string(name.as_str())],
        LookupKey::Integer(i) => vec![AtomicValue::Integer(*i)],
        LookupKey::Parenthesized(expr) => evaluate_keys(expr, ctx, local_vars)?,
    };
    Ok(keys.iter().filter_map(|k| map.get(k).cloned()).collect())
}

/// Calls a map or array as a function of one argument: `$map($key)` or `$array($pos)`.
///
/// An absent key or position yields the empty sequence.
pub fn call_collection<N: NodeItem>(
    collection: &Item<N>,
    argument: &Sequence<N>,
) -> Result<Sequence<N>, MetapathError> {
    let Some(key) = argument.atomize_optional()? else {
        return Err(MetapathError::type_error(
            "Calling a map or array requires exactly one key",
        ));
    };
    match collection {
        Item::Map(map) => Ok(map.get(&key).cloned().unwrap_or_default()),
        Item::Array(array) => Ok(array.get(array_position(&key)?).cloned().unwrap_or_default()),
        other => Err(MetapathError::type_error(format!(
            "Items of type '{}' cannot be called",
            other.type_name()
        ))),
    }
}
