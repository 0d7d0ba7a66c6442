//! URI functions. Reference resolution follows RFC 3986 via the `url` crate.

use super::{check_arity, optional_string_arg};
use crate::engine::EvaluationContext;
use crate::error::{MetapathError, UriErrorCode};
use crate::types::{AtomicValue, Sequence};
use metaschema_mdm::NodeItem;
use url::Url;

pub fn fn_static_base_uri<N: NodeItem>(
    args: Vec<Sequence<N>>,
    ctx: &EvaluationContext<'_, N>,
) -> Result<Sequence<N>, MetapathError> {
    check_arity("static-base-uri", &args, 0, 0)?;
    Ok(ctx
        .dynamic
        .static_context()
        .base_uri()
        .map(|uri| Sequence::from_atomic(AtomicValue::AnyUri(uri.to_string())))
        .unwrap_or_default())
}

/// Resolves a relative reference against `$base`, or against the static base URI when
/// called with one argument. An absolute reference is returned unchanged.
pub fn fn_resolve_uri<N: NodeItem>(
    args: Vec<Sequence<N>>,
    ctx: &EvaluationContext<'_, N>,
) -> Result<Sequence<N>, MetapathError> {
    check_arity("resolve-uri", &args, 1, 2)?;
    let Some(relative) = optional_string_arg(&args[0])? else {
        return Ok(Sequence::empty());
    };
    let base = match args.get(1) {
        Some(base) => Some(optional_string_arg(base)?.ok_or_else(|| {
            MetapathError::uri(UriErrorCode::InvalidArgument, "Invalid argument to fn:resolve-uri()")
        })?),
        None => ctx.dynamic.static_context().base_uri().map(str::to_string),
    };
    let resolved = resolve(&relative, base.as_deref())?;
    Ok(Sequence::from_atomic(AtomicValue::AnyUri(resolved)))
}

fn resolve(relative: &str, base: Option<&str>) -> Result<String, MetapathError> {
    if Url::parse(relative).is_ok() {
        return Ok(relative.to_string());
    }
    let base = base.ok_or_else(|| {
        MetapathError::uri(
            UriErrorCode::BaseUriNotDefined,
            "The base-uri is not defined in the static context",
        )
    })?;
    let base = Url::parse(base).map_err(|err| {
        MetapathError::uri(
            UriErrorCode::InvalidArgument,
            format!("Invalid base URI '{}': {}", base, err),
        )
    })?;
    let resolved = base.join(relative).map_err(|err| {
        MetapathError::uri(
            UriErrorCode::InvalidArgument,
            format!("Cannot resolve '{}' against '{}': {}", relative, base, err),
        )
    })?;
    Ok(resolved.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{DynamicContext, StaticContext};
    use metaschema_mdm::NodeRef;

    fn uri(value: &str) -> Sequence<NodeRef> {
        Sequence::from_atomic(AtomicValue::AnyUri(value.to_string()))
    }

    #[test]
    fn test_resolve_against_explicit_base() {
        let dynamic = DynamicContext::new();
        let ctx = EvaluationContext::new(None, &dynamic);
        let resolved = fn_resolve_uri(
            vec![
                Sequence::from_string("../profiles/p.xml"),
                Sequence::from_string("http://example.com/docs/catalog.xml"),
            ],
            &ctx,
        )
        .unwrap();
        assert_eq!(resolved, uri("http://example.com/profiles/p.xml"));

        let absolute = fn_resolve_uri(
            vec![Sequence::from_string("urn:example:x"), Sequence::from_string("http://a/")],
            &ctx,
        )
        .unwrap();
        assert_eq!(absolute, uri("urn:example:x"));
        assert!(fn_resolve_uri(vec![Sequence::empty()], &ctx).unwrap().is_empty().unwrap());
    }

    #[test]
    fn test_resolve_against_static_base() {
        let dynamic = DynamicContext::<NodeRef>::new()
            .with_static_context(StaticContext::new().with_base_uri("http://example.com/a/b.xml"));
        let ctx = EvaluationContext::new(None, &dynamic);
        assert_eq!(fn_static_base_uri(vec![], &ctx).unwrap(), uri("http://example.com/a/b.xml"));
        let resolved = fn_resolve_uri(vec![Sequence::from_string("c.xml")], &ctx).unwrap();
        assert_eq!(resolved, uri("http://example.com/a/c.xml"));
    }

    #[test]
    fn test_resolve_errors() {
        let dynamic = DynamicContext::new();
        let ctx = EvaluationContext::new(None, &dynamic);
        assert!(fn_static_base_uri::<NodeRef>(vec![], &ctx).unwrap().is_empty().unwrap());
        let err = fn_resolve_uri::<NodeRef>(vec![Sequence::from_string("c.xml")], &ctx).unwrap_err();
        assert!(err.is_uri_error(UriErrorCode::BaseUriNotDefined));
        let err = fn_resolve_uri::<NodeRef>(
            vec![Sequence::from_string("c.xml"), Sequence::from_string("not a uri")],
            &ctx,
        )
        .unwrap_err();
        assert_eq!(err.code(), "FORG0002");
        let err = fn_resolve_uri::<NodeRef>(vec![Sequence::from_string("c.xml"), Sequence::empty()], &ctx)
            .unwrap_err();
        assert!(err.is_uri_error(UriErrorCode::InvalidArgument));
    }
}
