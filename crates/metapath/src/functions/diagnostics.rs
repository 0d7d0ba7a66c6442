use super::{check_arity, optional_string_arg, string_arg};
use crate::error::MetapathError;
use crate::types::Sequence;
use log::debug;
use metaschema_mdm::NodeItem;

const DEFAULT_ERROR_CODE: &str = "FOER0000";

/// Raises an error with an optional code and description; never returns a value.
pub fn fn_error<N: NodeItem>(args: Vec<Sequence<N>>) -> Result<Sequence<N>, MetapathError> {
    check_arity("error", &args, 0, 3)?;
    let code = match args.first() {
        Some(seq) => optional_string_arg(seq)?,
        None => None,
    };
    let code = code
        .map(|c| c.rsplit(':').next().unwrap_or(&c).to_string())
        .unwrap_or_else(|| DEFAULT_ERROR_CODE.to_string());
    let message = match args.get(1) {
        Some(seq) => string_arg(seq)?,
        None => "Error raised by fn:error".to_string(),
    };
    Err(MetapathError::Raised { code, message })
}

/// Logs the value at debug level and returns it unchanged.
pub fn fn_trace<N: NodeItem>(mut args: Vec<Sequence<N>>) -> Result<Sequence<N>, MetapathError> {
    check_arity("trace", &args, 1, 2)?;
    let label = if args.len() == 2 {
        string_arg(&args.remove(1))?
    } else {
        String::new()
    };
    let value = args.remove(0).reusable()?;
    debug!("trace {}: {}", label, value.to_signature());
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use metaschema_mdm::NodeRef;

    #[test]
    fn test_error_codes() {
        let err = fn_error::<NodeRef>(vec![]).unwrap_err();
        assert_eq!(err.code(), "FOER0000");
        let err = fn_error::<NodeRef>(vec![
            Sequence::from_string("err:CUST0001"),
            Sequence::from_string("custom failure"),
        ])
        .unwrap_err();
        assert_eq!(err.code(), "CUST0001");
        assert!(err.to_string().contains("custom failure"));
    }

    #[test]
    fn test_trace_returns_input() {
        let input = Sequence::<NodeRef>::from_integer(7);
        assert_eq!(fn_trace(vec![input.clone(), Sequence::from_string("x")]).unwrap(), input);
    }
}
