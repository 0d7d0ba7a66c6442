use super::check_arity;
use crate::error::MetapathError;
use crate::types::Sequence;
use metaschema_mdm::NodeItem;

pub fn fn_true<N: NodeItem>(args: Vec<Sequence<N>>) -> Result<Sequence<N>, MetapathError> {
    check_arity("true", &args, 0, 0)?;
    Ok(Sequence::from_bool(true))
}

pub fn fn_false<N: NodeItem>(args: Vec<Sequence<N>>) -> Result<Sequence<N>, MetapathError> {
    check_arity("false", &args, 0, 0)?;
    Ok(Sequence::from_bool(false))
}

pub fn fn_not<N: NodeItem>(mut args: Vec<Sequence<N>>) -> Result<Sequence<N>, MetapathError> {
    check_arity("not", &args, 1, 1)?;
    let val = args.remove(0);
    Ok(Sequence::from_bool(!val.effective_boolean_value()?))
}

pub fn fn_boolean<N: NodeItem>(mut args: Vec<Sequence<N>>) -> Result<Sequence<N>, MetapathError> {
    check_arity("boolean", &args, 1, 1)?;
    let val = args.remove(0);
    Ok(Sequence::from_bool(val.effective_boolean_value()?))
}
