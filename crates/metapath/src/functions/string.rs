use super::{arg_or_context, check_arity, double_arg, optional_string_arg, string_arg};
use crate::engine::EvaluationContext;
use crate::error::MetapathError;
use crate::types::{AtomicValue, Sequence};
use itertools::Itertools;
use metaschema_mdm::NodeItem;

pub fn fn_string<N: NodeItem>(
    args: Vec<Sequence<N>>,
    ctx: &EvaluationContext<'_, N>,
) -> Result<Sequence<N>, MetapathError> {
    check_arity("string", &args, 0, 1)?;
    let seq = arg_or_context(args, ctx)?;
    let value = match seq.first_item(true)? {
        Some(item) => item.string_value()?,
        None => String::new(),
    };
    Ok(Sequence::from_string(value))
}

pub fn fn_concat<N: NodeItem>(args: Vec<Sequence<N>>) -> Result<Sequence<N>, MetapathError> {
    if args.len() < 2 {
        return Err(MetapathError::function("concat", "Expected at least 2 arguments"));
    }
    let mut result = String::new();
    for arg in &args {
        result.push_str(&string_arg(arg)?);
    }
    Ok(Sequence::from_string(result))
}

pub fn fn_string_join<N: NodeItem>(mut args: Vec<Sequence<N>>) -> Result<Sequence<N>, MetapathError> {
    check_arity("string-join", &args, 1, 2)?;
    let separator = if args.len() == 2 {
        string_arg(&args.remove(1))?
    } else {
        String::new()
    };
    let joined = args
        .remove(0)
        .atomize()?
        .iter()
        .map(AtomicValue::to_string_value)
        .join(&separator);
    Ok(Sequence::from_string(joined))
}

pub fn fn_string_length<N: NodeItem>(
    args: Vec<Sequence<N>>,
    ctx: &EvaluationContext<'_, N>,
) -> Result<Sequence<N>, MetapathError> {
    check_arity("string-length", &args, 0, 1)?;
    let seq = arg_or_context(args, ctx)?;
    let value = match seq.first_item(true)? {
        Some(item) => item.string_value()?,
        None => String::new(),
    };
    Ok(Sequence::from_integer(value.chars().count() as i64))
}

/// Characters at 1-based positions `p` with `round(start) <= p < round(start) + round(length)`.
pub fn fn_substring<N: NodeItem>(mut args: Vec<Sequence<N>>) -> Result<Sequence<N>, MetapathError> {
    check_arity("substring", &args, 2, 3)?;
    let length = if args.len() == 3 {
        Some(double_arg("substring", &args.remove(2))?)
    } else {
        None
    };
    let start = double_arg("substring", &args.remove(1))?;
    let value = string_arg(&args.remove(0))?;

    let round = |v: f64| (v + 0.5).floor();
    let first = round(start);
    let end = length.map_or(f64::INFINITY, |l| first + round(l));
    let result: String = value
        .chars()
        .enumerate()
        .filter(|(i, _)| {
            let position = (*i + 1) as f64;
            position >= first && position < end
        })
        .map(|(_, c)| c)
        .collect();
    Ok(Sequence::from_string(result))
}

fn two_strings<N: NodeItem>(
    function: &str,
    mut args: Vec<Sequence<N>>,
) -> Result<(String, String), MetapathError> {
    check_arity(function, &args, 2, 2)?;
    let second = string_arg(&args.remove(1))?;
    let first = string_arg(&args.remove(0))?;
    Ok((first, second))
}

pub fn fn_substring_before<N: NodeItem>(args: Vec<Sequence<N>>) -> Result<Sequence<N>, MetapathError> {
    let (value, search) = two_strings("substring-before", args)?;
    let result = value
        .find(&search)
        .map(|i| value[..i].to_string())
        .unwrap_or_default();
    Ok(Sequence::from_string(result))
}

pub fn fn_substring_after<N: NodeItem>(args: Vec<Sequence<N>>) -> Result<Sequence<N>, MetapathError> {
    let (value, search) = two_strings("substring-after", args)?;
    let result = value
        .find(&search)
        .map(|i| value[i + search.len()..].to_string())
        .unwrap_or_default();
    Ok(Sequence::from_string(result))
}

pub fn fn_contains<N: NodeItem>(args: Vec<Sequence<N>>) -> Result<Sequence<N>, MetapathError> {
    let (value, search) = two_strings("contains", args)?;
    Ok(Sequence::from_bool(value.contains(&search)))
}

pub fn fn_starts_with<N: NodeItem>(args: Vec<Sequence<N>>) -> Result<Sequence<N>, MetapathError> {
    let (value, prefix) = two_strings("starts-with", args)?;
    Ok(Sequence::from_bool(value.starts_with(&prefix)))
}

pub fn fn_ends_with<N: NodeItem>(args: Vec<Sequence<N>>) -> Result<Sequence<N>, MetapathError> {
    let (value, suffix) = two_strings("ends-with", args)?;
    Ok(Sequence::from_bool(value.ends_with(&suffix)))
}

pub fn fn_upper_case<N: NodeItem>(mut args: Vec<Sequence<N>>) -> Result<Sequence<N>, MetapathError> {
    check_arity("upper-case", &args, 1, 1)?;
    Ok(Sequence::from_string(string_arg(&args.remove(0))?.to_uppercase()))
}

pub fn fn_lower_case<N: NodeItem>(mut args: Vec<Sequence<N>>) -> Result<Sequence<N>, MetapathError> {
    check_arity("lower-case", &args, 1, 1)?;
    Ok(Sequence::from_string(string_arg(&args.remove(0))?.to_lowercase()))
}

pub fn fn_normalize_space<N: NodeItem>(
    args: Vec<Sequence<N>>,
    ctx: &EvaluationContext<'_, N>,
) -> Result<Sequence<N>, MetapathError> {
    check_arity("normalize-space", &args, 0, 1)?;
    let seq = arg_or_context(args, ctx)?;
    let value = match seq.first_item(true)? {
        Some(item) => item.string_value()?,
        None => String::new(),
    };
    Ok(Sequence::from_string(value.split_whitespace().join(" ")))
}

pub fn fn_translate<N: NodeItem>(mut args: Vec<Sequence<N>>) -> Result<Sequence<N>, MetapathError> {
    check_arity("translate", &args, 3, 3)?;
    let to: Vec<char> = string_arg(&args.remove(2))?.chars().collect();
    let from: Vec<char> = string_arg(&args.remove(1))?.chars().collect();
    let value = string_arg(&args.remove(0))?;
    let result: String = value
        .chars()
        .filter_map(|c| match from.iter().position(|f| *f == c) {
            Some(i) => to.get(i).copied(),
            None => Some(c),
        })
        .collect();
    Ok(Sequence::from_string(result))
}

/// Codepoint comparison: `-1`, `0` or `1`, or the empty sequence if either side is empty.
pub fn fn_compare<N: NodeItem>(mut args: Vec<Sequence<N>>) -> Result<Sequence<N>, MetapathError> {
    check_arity("compare", &args, 2, 2)?;
    let right = optional_string_arg(&args.remove(1))?;
    let left = optional_string_arg(&args.remove(0))?;
    match (left, right) {
        (Some(l), Some(r)) => Ok(Sequence::from_integer(l.cmp(&r) as i64)),
        _ => Ok(Sequence::empty()),
    }
}
