//! Static and dynamic evaluation contexts.

use crate::types::{DateTime, Sequence, Timezone};
use indexmap::IndexMap;
use metaschema_mdm::NodeItem;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

pub const NS_METAPATH: &str = "http://csrc.nist.gov/ns/metaschema/metapath";
pub const NS_XML_SCHEMA: &str = "http://www.w3.org/2001/XMLSchema";
pub const NS_METAPATH_FUNCTIONS: &str = "http://csrc.nist.gov/ns/metaschema/metapath-functions";
pub const NS_METAPATH_FUNCTIONS_MATH: &str =
    "http://csrc.nist.gov/ns/metaschema/metapath-functions/math";
pub const NS_METAPATH_FUNCTIONS_ARRAY: &str =
    "http://csrc.nist.gov/ns/metaschema/metapath-functions/array";
pub const NS_METAPATH_FUNCTIONS_MAP: &str =
    "http://csrc.nist.gov/ns/metaschema/metapath-functions/map";
pub const NS_METAPATH_FUNCTIONS_EXTENDED: &str =
    "http://csrc.nist.gov/ns/metaschema/metapath-functions/extended";

/// The library prefix a function namespace maps to, if it is one of the built-in ones.
pub fn library_prefix(namespace: &str) -> Option<&'static str> {
    match namespace {
        NS_METAPATH_FUNCTIONS => Some("fn"),
        NS_METAPATH_FUNCTIONS_MATH => Some("math"),
        NS_METAPATH_FUNCTIONS_ARRAY => Some("array"),
        NS_METAPATH_FUNCTIONS_MAP => Some("map"),
        NS_METAPATH_FUNCTIONS_EXTENDED => Some("mp"),
        _ => None,
    }
}

/// Compile-time environment: namespace bindings, base URI and the namespaces that
/// unprefixed names resolve against.
///
/// Flag names never pick up a default namespace. Model item names resolve against
/// `default_model_namespace`, function names against `default_function_namespace`.
#[derive(Debug, Clone)]
pub struct StaticContext {
    namespaces: IndexMap<String, String>,
    base_uri: Option<String>,
    default_model_namespace: Option<String>,
    default_function_namespace: String,
}

impl Default for StaticContext {
    fn default() -> Self {
        let mut namespaces = IndexMap::new();
        for (prefix, uri) in [
            ("meta", NS_METAPATH),
            ("xs", NS_XML_SCHEMA),
            ("fn", NS_METAPATH_FUNCTIONS),
            ("math", NS_METAPATH_FUNCTIONS_MATH),
            ("array", NS_METAPATH_FUNCTIONS_ARRAY),
            ("map", NS_METAPATH_FUNCTIONS_MAP),
            ("mp", NS_METAPATH_FUNCTIONS_EXTENDED),
        ] {
            namespaces.insert(prefix.to_string(), uri.to_string());
        }
        Self {
            namespaces,
            base_uri: None,
            default_model_namespace: None,
            default_function_namespace: NS_METAPATH_FUNCTIONS.to_string(),
        }
    }
}

impl StaticContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `prefix` to `uri`, replacing an earlier binding of the same prefix.
    pub fn with_namespace(mut self, prefix: impl Into<String>, uri: impl Into<String>) -> Self {
        self.namespaces.insert(prefix.into(), uri.into());
        self
    }

    pub fn with_base_uri(mut self, base_uri: impl Into<String>) -> Self {
        self.base_uri = Some(base_uri.into());
        self
    }

    pub fn with_default_model_namespace(mut self, uri: impl Into<String>) -> Self {
        self.default_model_namespace = Some(uri.into());
        self
    }

    pub fn with_default_function_namespace(mut self, uri: impl Into<String>) -> Self {
        self.default_function_namespace = uri.into();
        self
    }

    pub fn lookup_namespace(&self, prefix: &str) -> Option<&str> {
        self.namespaces.get(prefix).map(String::as_str)
    }

    pub fn namespaces(&self) -> impl Iterator<Item = (&str, &str)> {
        self.namespaces.iter().map(|(p, u)| (p.as_str(), u.as_str()))
    }

    pub fn base_uri(&self) -> Option<&str> {
        self.base_uri.as_deref()
    }

    pub fn default_model_namespace(&self) -> Option<&str> {
        self.default_model_namespace.as_deref()
    }

    pub fn default_function_namespace(&self) -> &str {
        &self.default_function_namespace
    }
}

/// Run-time environment shared by every evaluation of one compiled expression.
///
/// The current instant is read once at construction, so `fn:current-dateTime()` returns
/// the same value for the whole lifetime of the context.
///
/// The static context it carries supplies the base URI and namespace bindings to functions
/// that resolve names or paths at run time, such as `fn:resolve-uri` and
/// `mp:recurse-depth`.
#[derive(Debug, Clone)]
pub struct DynamicContext<N> {
    variables: HashMap<String, Sequence<N>>,
    implicit_timezone: Timezone,
    current_date_time: DateTime,
    static_context: Arc<StaticContext>,
}

impl<N: NodeItem> Default for DynamicContext<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<N: NodeItem> DynamicContext<N> {
    pub fn new() -> Self {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| Decimal::from(d.as_secs()) + Decimal::new(d.subsec_millis() as i64, 3))
            .unwrap_or_default();
        Self {
            variables: HashMap::new(),
            implicit_timezone: Timezone::UTC,
            current_date_time: DateTime::from_instant(now, Some(Timezone::UTC))
                .unwrap_or(DateTime::EPOCH),
            static_context: Arc::new(StaticContext::default()),
        }
    }

    pub fn with_static_context(mut self, static_context: StaticContext) -> Self {
        self.static_context = Arc::new(static_context);
        self
    }

    pub fn with_variable(mut self, name: impl Into<String>, value: Sequence<N>) -> Self {
        self.variables.insert(name.into(), value);
        self
    }

    pub fn with_implicit_timezone(mut self, timezone: Timezone) -> Self {
        self.implicit_timezone = timezone;
        self
    }

    /// Fixes the value returned by `fn:current-dateTime()`.
    pub fn with_current_date_time(mut self, value: DateTime) -> Self {
        self.current_date_time = value;
        self
    }

    pub fn set_variable(&mut self, name: impl Into<String>, value: Sequence<N>) {
        self.variables.insert(name.into(), value);
    }

    pub fn variable(&self, name: &str) -> Option<&Sequence<N>> {
        self.variables.get(name)
    }

    pub fn variables(&self) -> &HashMap<String, Sequence<N>> {
        &self.variables
    }

    pub fn implicit_timezone(&self) -> Timezone {
        self.implicit_timezone
    }

    pub fn current_date_time(&self) -> DateTime {
        self.current_date_time
    }

    pub fn static_context(&self) -> &StaticContext {
        &self.static_context
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use metaschema_mdm::NodeRef;

    #[test]
    fn test_default_namespaces() {
        let ctx = StaticContext::default();
        assert_eq!(ctx.lookup_namespace("fn"), Some(NS_METAPATH_FUNCTIONS));
        assert_eq!(ctx.lookup_namespace("meta"), Some(NS_METAPATH));
        assert_eq!(ctx.lookup_namespace("oscal"), None);
        assert_eq!(ctx.default_function_namespace(), NS_METAPATH_FUNCTIONS);
        assert_eq!(ctx.default_model_namespace(), None);
    }

    #[test]
    fn test_with_namespace_overrides() {
        let ctx = StaticContext::new()
            .with_namespace("o", "http://example.com/ns/oscal")
            .with_base_uri("file:/catalog.xml");
        assert_eq!(ctx.lookup_namespace("o"), Some("http://example.com/ns/oscal"));
        assert_eq!(ctx.base_uri(), Some("file:/catalog.xml"));
    }

    #[test]
    fn test_library_prefix() {
        assert_eq!(library_prefix(NS_METAPATH_FUNCTIONS_MAP), Some("map"));
        assert_eq!(library_prefix(NS_METAPATH_FUNCTIONS_EXTENDED), Some("mp"));
        assert_eq!(library_prefix(NS_METAPATH), None);
    }

    #[test]
    fn test_dynamic_context_carries_static_context() {
        let ctx: DynamicContext<NodeRef> = DynamicContext::new();
        assert_eq!(ctx.static_context().base_uri(), None);
        let ctx = ctx.with_static_context(StaticContext::new().with_base_uri("file:/a/b.xml"));
        assert_eq!(ctx.static_context().base_uri(), Some("file:/a/b.xml"));
        assert_eq!(ctx.static_context().lookup_namespace("mp"), Some(NS_METAPATH_FUNCTIONS_EXTENDED));
    }

    #[test]
    fn test_current_date_time_is_fixed() {
        let ctx: DynamicContext<NodeRef> = DynamicContext::new();
        assert_eq!(ctx.current_date_time(), ctx.current_date_time());
        let fixed = DateTime::parse("2024-01-02T03:04:05Z").unwrap();
        let ctx = ctx.with_current_date_time(fixed);
        assert_eq!(ctx.current_date_time(), fixed);
    }
}
