use super::{call_item, check_arity, function_arg};
use crate::engine::{EvaluationContext, Variables};
use crate::error::{CardinalityCode, MetapathError};
use crate::types::{ArrayItem, AtomicValue, DuplicatePolicy, Item, MapItem, MapKey, Sequence};
use metaschema_mdm::NodeItem;

fn map_arg<N: NodeItem>(function: &str, seq: &Sequence<N>) -> Result<MapItem<N>, MetapathError> {
    match seq.exactly_one()? {
        Item::Map(map) => Ok(map),
        other => Err(MetapathError::type_error(format!(
            "Function 'map:{}' expected a map, found '{}'",
            function,
            other.type_name()
        ))),
    }
}

fn key_arg<N: NodeItem>(seq: &Sequence<N>) -> Result<AtomicValue, MetapathError> {
    let mut keys = seq.atomize()?;
    if keys.len() != 1 {
        return Err(MetapathError::Cardinality {
            expected: CardinalityCode::ExactlyOne,
            actual: keys.len(),
        });
    }
    Ok(keys.remove(0))
}

pub fn map_size<N: NodeItem>(args: Vec<Sequence<N>>) -> Result<Sequence<N>, MetapathError> {
    check_arity("map:size", &args, 1, 1)?;
    Ok(Sequence::from_integer(map_arg("size", &args[0])?.len() as i64))
}

pub fn map_keys<N: NodeItem>(args: Vec<Sequence<N>>) -> Result<Sequence<N>, MetapathError> {
    check_arity("map:keys", &args, 1, 1)?;
    let map = map_arg("keys", &args[0])?;
    Ok(Sequence::from_atomics(map.keys().cloned().collect::<Vec<_>>()))
}

pub fn map_contains<N: NodeItem>(args: Vec<Sequence<N>>) -> Result<Sequence<N>, MetapathError> {
    check_arity("map:contains", &args, 2, 2)?;
    let map = map_arg("contains", &args[0])?;
    Ok(Sequence::from_bool(map.contains(&key_arg(&args[1])?)))
}

pub fn map_get<N: NodeItem>(args: Vec<Sequence<N>>) -> Result<Sequence<N>, MetapathError> {
    check_arity("map:get", &args, 2, 2)?;
    let map = map_arg("get", &args[0])?;
    Ok(map.get(&key_arg(&args[1])?).cloned().unwrap_or_default())
}

pub fn map_put<N: NodeItem>(mut args: Vec<Sequence<N>>) -> Result<Sequence<N>, MetapathError> {
    check_arity("map:put", &args, 3, 3)?;
    let value = args.remove(2).reusable()?;
    let key = key_arg(&args[1])?;
    let map = map_arg("put", &args[0])?;
    Ok(Sequence::of(Item::Map(map.put(key, value))))
}

pub fn map_remove<N: NodeItem>(args: Vec<Sequence<N>>) -> Result<Sequence<N>, MetapathError> {
    check_arity("map:remove", &args, 2, 2)?;
    let map = map_arg("remove", &args[0])?;
    let keys = args[1].atomize()?;
    Ok(Sequence::of(Item::Map(map.remove(&keys))))
}

pub fn map_entry<N: NodeItem>(mut args: Vec<Sequence<N>>) -> Result<Sequence<N>, MetapathError> {
    check_arity("map:entry", &args, 2, 2)?;
    let value = args.remove(1).reusable()?;
    let key = key_arg(&args[0])?;
    Ok(Sequence::of(Item::Map(MapItem::from_entries([(key, value)]))))
}

/// Merges maps left to right. The `duplicates` option selects how a key present in more
/// than one map is handled and defaults to `use-first`.
pub fn map_merge<N: NodeItem>(args: Vec<Sequence<N>>) -> Result<Sequence<N>, MetapathError> {
    check_arity("map:merge", &args, 1, 2)?;
    let policy = match args.get(1) {
        None => DuplicatePolicy::default(),
        Some(options) => {
            let options = map_arg("merge", options)?;
            let name = options
                .get(&AtomicValue::string("duplicates"))
                .map(|v| v.atomize_optional())
                .transpose()?
                .flatten()
                .map(|v| v.to_string_value());
            match name.as_deref() {
                None => DuplicatePolicy::default(),
                Some(name) => DuplicatePolicy::from_name(name).ok_or_else(|| {
                    MetapathError::function("map:merge", format!("Unsupported duplicates policy '{}'", name))
                })?,
            }
        }
    };
    let maps = args[0]
        .items()?
        .iter()
        .map(|item| match item {
            Item::Map(map) => Ok(map.clone()),
            other => Err(MetapathError::type_error(format!(
                "Function 'map:merge' expected maps, found '{}'",
                other.type_name()
            ))),
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Sequence::of(Item::Map(MapItem::merge(&maps, policy)?)))
}

/// Every value stored under `key` in any map reachable from the input, searching inside
/// map values and array members. The values are returned as the members of an array.
pub fn map_find<N: NodeItem>(args: Vec<Sequence<N>>) -> Result<Sequence<N>, MetapathError> {
    check_arity("map:find", &args, 2, 2)?;
    let key = MapKey::new(key_arg(&args[1])?);
    let mut found = Vec::new();
    for item in args[0].items()? {
        find_in(item, &key, &mut found)?;
    }
    Ok(Sequence::of(Item::Array(ArrayItem::new(found))))
}

fn find_in<N: NodeItem>(item: &Item<N>, key: &MapKey, found: &mut Vec<Sequence<N>>) -> Result<(), MetapathError> {
    match item {
        Item::Map(map) => {
            for (entry_key, value) in map.entries() {
                if entry_key == key {
                    found.push(value.clone());
                }
                for nested in value.items()? {
                    find_in(nested, key, found)?;
                }
            }
        }
        Item::Array(array) => {
            for member in array.members() {
                for nested in member.items()? {
                    find_in(nested, key, found)?;
                }
            }
        }
        _ => {}
    }
    Ok(())
}

/// Calls `action` with each key and value, concatenating the results in entry order.
pub fn map_for_each<N: NodeItem>(
    mut args: Vec<Sequence<N>>,
    ctx: &EvaluationContext<'_, N>,
    local_vars: &Variables<N>,
) -> Result<Sequence<N>, MetapathError> {
    check_arity("map:for-each", &args, 2, 2)?;
    let action = function_arg("map:for-each", &args.remove(1))?;
    let map = map_arg("for-each", &args[0])?;
    let mut results = Vec::with_capacity(map.len());
    for (key, value) in map.entries() {
        let args = vec![Sequence::from_atomic(key.key().clone()), value.clone()];
        results.push(call_item(&action, args, ctx, local_vars)?);
    }
    Sequence::concat(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::DynamicContext;
    use crate::types::FunctionItem;
    use metaschema_mdm::NodeRef;

    fn map(entries: &[(&str, i64)]) -> Sequence<NodeRef> {
        Sequence::of(Item::Map(MapItem::from_entries(
            entries
                .iter()
                .map(|(k, v)| (AtomicValue::string(*k), Sequence::from_integer(*v))),
        )))
    }

    fn key(k: &str) -> Sequence<NodeRef> {
        Sequence::from_string(k)
    }

    #[test]
    fn test_get_put_remove() {
        let m = map(&[("a", 1), ("b", 2)]);
        assert_eq!(map_get(vec![m.clone(), key("b")]).unwrap(), Sequence::from_integer(2));
        assert!(map_get(vec![m.clone(), key("z")]).unwrap().is_empty().unwrap());
        let put = map_put(vec![m.clone(), key("c"), Sequence::from_integer(3)]).unwrap();
        assert_eq!(map_size(vec![put]).unwrap(), Sequence::from_integer(3));
        let removed = map_remove(vec![m, key("a")]).unwrap();
        assert_eq!(map_contains(vec![removed, key("a")]).unwrap(), Sequence::from_bool(false));
    }

    #[test]
    fn test_keys_keep_insertion_order() {
        let keys = map_keys(vec![map(&[("z", 1), ("a", 2)])]).unwrap();
        let keys: Vec<String> = keys.atomize().unwrap().iter().map(AtomicValue::to_string_value).collect();
        assert_eq!(keys, vec!["z", "a"]);
    }

    #[test]
    fn test_merge_duplicates_policy() {
        let maps = Sequence::concat([map(&[("a", 1)]), map(&[("a", 2)])]).unwrap();
        let first = map_merge(vec![maps.clone()]).unwrap();
        assert_eq!(map_get(vec![first, key("a")]).unwrap(), Sequence::from_integer(1));

        let options = Sequence::of(Item::Map(MapItem::from_entries([(
            AtomicValue::string("duplicates"),
            Sequence::from_string("use-last"),
        )])));
        let last = map_merge(vec![maps.clone(), options]).unwrap();
        assert_eq!(map_get(vec![last, key("a")]).unwrap(), Sequence::from_integer(2));

        let reject = options_with("reject");
        let err = map_merge(vec![maps.clone(), reject]).unwrap_err();
        assert_eq!(err.code(), "FOJS0003");
        assert_eq!(err.to_string(), "Map error [FOJS0003]: duplicate key 'a' in map:merge");

        let combined = map_merge(vec![maps.clone(), options_with("combine")]).unwrap();
        assert_eq!(
            map_get(vec![combined, key("a")]).unwrap(),
            Sequence::from_atomics([AtomicValue::Integer(1), AtomicValue::Integer(2)])
        );

        let any = map_merge(vec![maps.clone(), options_with("use-any")]).unwrap();
        assert_eq!(map_get(vec![any, key("a")]).unwrap(), Sequence::from_integer(1));

        let err = map_merge(vec![maps, options_with("use-most")]).unwrap_err();
        assert_eq!(err.code(), "FORG0006");
    }

    fn options_with(policy: &str) -> Sequence<NodeRef> {
        Sequence::of(Item::Map(MapItem::from_entries([(
            AtomicValue::string("duplicates"),
            Sequence::from_string(policy),
        )])))
    }

    #[test]
    fn test_find_searches_nested_maps_and_arrays() {
        let inner = map(&[("id", 2)]);
        let nested = Sequence::of(Item::Map(MapItem::from_entries([
            (AtomicValue::string("id"), Sequence::from_integer(1)),
            (
                AtomicValue::string("children"),
                Sequence::of(Item::Array(ArrayItem::new(vec![inner, map(&[("other", 3)])]))),
            ),
        ])));
        let found = map_find(vec![nested, key("id")]).unwrap();
        assert_eq!(found.to_signature(), "([integer{1},integer{2}])");

        let none = map_find(vec![Sequence::<NodeRef>::from_integer(5), key("id")]).unwrap();
        assert_eq!(none.to_signature(), "([])");
    }

    #[test]
    fn test_for_each_calls_action_per_entry() {
        let dynamic = DynamicContext::new();
        let ctx = EvaluationContext::new(None, &dynamic);
        let vars = Variables::new();
        let concat = Sequence::of(Item::Function(FunctionItem::named("fn", "concat", 2)));
        let result = map_for_each(vec![map(&[("a", 1), ("b", 2)]), concat], &ctx, &vars).unwrap();
        assert_eq!(result, Sequence::from_atomics([AtomicValue::string("a1"), AtomicValue::string("b2")]));
    }

    #[test]
    fn test_entry_and_non_map_argument() {
        let entry = map_entry(vec![key("k"), Sequence::from_integer(5)]).unwrap();
        assert_eq!(map_get(vec![entry, key("k")]).unwrap(), Sequence::from_integer(5));
        assert!(map_size(vec![Sequence::<NodeRef>::from_integer(1)]).is_err());
    }
}
