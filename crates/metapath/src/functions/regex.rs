use super::{check_arity, string_arg};
use crate::error::MetapathError;
use crate::types::{AtomicValue, Sequence};
use ::regex::{Regex, RegexBuilder};
use metaschema_mdm::NodeItem;

/// Compiles a pattern with the `s`, `m`, `i` and `x` flags.
pub(crate) fn compile_regex(function: &str, pattern: &str, flags: &str) -> Result<Regex, MetapathError> {
    let mut builder = RegexBuilder::new(pattern);
    for flag in flags.chars() {
        match flag {
            's' => builder.dot_matches_new_line(true),
            'm' => builder.multi_line(true),
            'i' => builder.case_insensitive(true),
            'x' => builder.ignore_whitespace(true),
            other => {
                return Err(MetapathError::function(
                    function,
                    format!("Invalid regular expression flag '{}'", other),
                ));
            }
        };
    }
    builder.build().map_err(|e| {
        MetapathError::function(function, format!("Invalid regular expression '{}': {}", pattern, e))
    })
}

fn flags_arg<N: NodeItem>(args: &mut Vec<Sequence<N>>, index: usize) -> Result<String, MetapathError> {
    if args.len() > index {
        string_arg(&args.remove(index))
    } else {
        Ok(String::new())
    }
}

pub fn fn_matches<N: NodeItem>(mut args: Vec<Sequence<N>>) -> Result<Sequence<N>, MetapathError> {
    check_arity("matches", &args, 2, 3)?;
    let flags = flags_arg(&mut args, 2)?;
    let pattern = string_arg(&args.remove(1))?;
    let input = string_arg(&args.remove(0))?;
    let re = compile_regex("matches", &pattern, &flags)?;
    Ok(Sequence::from_bool(re.is_match(&input)))
}

/// Rewrites a replacement string's `$N` group references and `\$`/`\\` escapes into the
/// form the regex crate expects.
fn convert_replacement(replacement: &str) -> Result<String, MetapathError> {
    let mut out = String::with_capacity(replacement.len());
    let mut chars = replacement.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some('$') => out.push_str("$$"),
                Some('\\') => out.push('\\'),
                _ => {
                    return Err(MetapathError::function(
                        "replace",
                        format!("Invalid replacement string '{}'", replacement),
                    ));
                }
            },
            '$' => {
                let mut digits = String::new();
                while let Some(&d) = chars.peek().filter(|d| d.is_ascii_digit()) {
                    digits.push(d);
                    chars.next();
                }
                if digits.is_empty() {
                    return Err(MetapathError::function(
                        "replace",
                        format!("Invalid replacement string '{}'", replacement),
                    ));
                }
                out.push_str(&format!("${{{}}}", digits));
            }
            other => out.push(other),
        }
    }
    Ok(out)
}

pub fn fn_replace<N: NodeItem>(mut args: Vec<Sequence<N>>) -> Result<Sequence<N>, MetapathError> {
    check_arity("replace", &args, 3, 4)?;
    let flags = flags_arg(&mut args, 3)?;
    let replacement = string_arg(&args.remove(2))?;
    let pattern = string_arg(&args.remove(1))?;
    let input = string_arg(&args.remove(0))?;
    let re = compile_regex("replace", &pattern, &flags)?;
    if re.is_match("") {
        return Err(MetapathError::function(
            "replace",
            format!("The pattern '{}' matches a zero-length string", pattern),
        ));
    }
    let replacement = convert_replacement(&replacement)?;
    Ok(Sequence::from_string(
        re.replace_all(&input, replacement.as_str()).into_owned(),
    ))
}

/// Splits on a pattern, or on whitespace runs after trimming when no pattern is given.
pub fn fn_tokenize<N: NodeItem>(mut args: Vec<Sequence<N>>) -> Result<Sequence<N>, MetapathError> {
    check_arity("tokenize", &args, 1, 3)?;
    if args.len() == 1 {
        let input = string_arg(&args.remove(0))?;
        return Ok(Sequence::from_atomics(
            input.split_whitespace().map(AtomicValue::string),
        ));
    }
    let flags = flags_arg(&mut args, 2)?;
    let pattern = string_arg(&args.remove(1))?;
    let input = string_arg(&args.remove(0))?;
    if input.is_empty() {
        return Ok(Sequence::empty());
    }
    let re = compile_regex("tokenize", &pattern, &flags)?;
    if re.is_match("") {
        return Err(MetapathError::function(
            "tokenize",
            format!("The pattern '{}' matches a zero-length string", pattern),
        ));
    }
    Ok(Sequence::from_atomics(re.split(&input).map(AtomicValue::string)))
}
