use super::{check_arity, integer_arg};
use crate::error::MetapathError;
use crate::types::{ArrayItem, Item, Sequence};
use metaschema_mdm::NodeItem;

fn array_arg<N: NodeItem>(function: &str, seq: &Sequence<N>) -> Result<ArrayItem<N>, MetapathError> {
    match seq.exactly_one()? {
        Item::Array(array) => Ok(array),
        other => Err(MetapathError::type_error(format!(
            "Function 'array:{}' expected an array, found '{}'",
            function,
            other.type_name()
        ))),
    }
}

fn array_result<N: NodeItem>(array: ArrayItem<N>) -> Result<Sequence<N>, MetapathError> {
    Ok(Sequence::of(Item::Array(array)))
}

pub fn array_size<N: NodeItem>(args: Vec<Sequence<N>>) -> Result<Sequence<N>, MetapathError> {
    check_arity("array:size", &args, 1, 1)?;
    Ok(Sequence::from_integer(array_arg("size", &args[0])?.len() as i64))
}

pub fn array_get<N: NodeItem>(args: Vec<Sequence<N>>) -> Result<Sequence<N>, MetapathError> {
    check_arity("array:get", &args, 2, 2)?;
    let array = array_arg("get", &args[0])?;
    let position = integer_arg("array:get", &args[1])?;
    array.lookup(position).cloned()
}

pub fn array_put<N: NodeItem>(mut args: Vec<Sequence<N>>) -> Result<Sequence<N>, MetapathError> {
    check_arity("array:put", &args, 3, 3)?;
    let member = args.remove(2).reusable()?;
    let position = integer_arg("array:put", &args[1])?;
    array_result(array_arg("put", &args[0])?.put(position, member)?)
}

pub fn array_append<N: NodeItem>(mut args: Vec<Sequence<N>>) -> Result<Sequence<N>, MetapathError> {
    check_arity("array:append", &args, 2, 2)?;
    let member = args.remove(1).reusable()?;
    array_result(array_arg("append", &args[0])?.append(member))
}

pub fn array_head<N: NodeItem>(args: Vec<Sequence<N>>) -> Result<Sequence<N>, MetapathError> {
    check_arity("array:head", &args, 1, 1)?;
    array_arg("head", &args[0])?.head().cloned()
}

pub fn array_tail<N: NodeItem>(args: Vec<Sequence<N>>) -> Result<Sequence<N>, MetapathError> {
    check_arity("array:tail", &args, 1, 1)?;
    array_result(array_arg("tail", &args[0])?.tail()?)
}

pub fn array_reverse<N: NodeItem>(args: Vec<Sequence<N>>) -> Result<Sequence<N>, MetapathError> {
    check_arity("array:reverse", &args, 1, 1)?;
    array_result(array_arg("reverse", &args[0])?.reverse())
}

/// Concatenates the members of a sequence of arrays.
pub fn array_join<N: NodeItem>(args: Vec<Sequence<N>>) -> Result<Sequence<N>, MetapathError> {
    check_arity("array:join", &args, 1, 1)?;
    let arrays = args[0]
        .items()?
        .iter()
        .map(|item| match item {
            Item::Array(array) => Ok(array.clone()),
            other => Err(MetapathError::type_error(format!(
                "Function 'array:join' expected arrays, found '{}'",
                other.type_name()
            ))),
        })
        .collect::<Result<Vec<_>, _>>()?;
    array_result(ArrayItem::join(&arrays))
}

pub fn array_subarray<N: NodeItem>(mut args: Vec<Sequence<N>>) -> Result<Sequence<N>, MetapathError> {
    check_arity("array:subarray", &args, 2, 3)?;
    let length = if args.len() == 3 {
        Some(integer_arg("array:subarray", &args.remove(2))?)
    } else {
        None
    };
    let start = integer_arg("array:subarray", &args[1])?;
    array_result(array_arg("subarray", &args[0])?.subarray(start, length)?)
}

/// Replaces every array in the input, at any depth, by its members.
pub fn array_flatten<N: NodeItem>(args: Vec<Sequence<N>>) -> Result<Sequence<N>, MetapathError> {
    check_arity("array:flatten", &args, 1, 1)?;
    let mut items = Vec::new();
    for item in args[0].items()? {
        flatten_into(item, &mut items)?;
    }
    Ok(Sequence::from_items(items))
}

fn flatten_into<N: NodeItem>(item: &Item<N>, out: &mut Vec<Item<N>>) -> Result<(), MetapathError> {
    match item {
        Item::Array(array) => {
            for member in array.members() {
                for nested in member.items()? {
                    flatten_into(nested, out)?;
                }
            }
        }
        other => out.push(other.clone()),
    }
    Ok(())
}

pub fn array_insert_before<N: NodeItem>(
    mut args: Vec<Sequence<N>>,
) -> Result<Sequence<N>, MetapathError> {
    check_arity("array:insert-before", &args, 3, 3)?;
    let member = args.remove(2).reusable()?;
    let position = integer_arg("array:insert-before", &args[1])?;
    array_result(array_arg("insert-before", &args[0])?.insert_before(position, member)?)
}

pub fn array_remove<N: NodeItem>(args: Vec<Sequence<N>>) -> Result<Sequence<N>, MetapathError> {
    check_arity("array:remove", &args, 2, 2)?;
    let array = array_arg("remove", &args[0])?;
    let positions = args[1]
        .atomize()?
        .iter()
        .map(|v| {
            v.to_integer().ok_or_else(|| {
                MetapathError::type_error(format!(
                    "Function 'array:remove' expected integer positions, found '{}'",
                    v.type_name()
                ))
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    array_result(array.remove(&positions)?)
}
