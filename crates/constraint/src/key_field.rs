use crate::error::ConstraintError;
use metaschema_mdm::NodeItem;
use metaschema_metapath::{DynamicContext, Item, LazyExpression, MetapathError, StaticContext};
use regex::Regex;
use std::fmt;

/// A composite key: one component per key field, `None` where the field selected nothing.
pub type Key = Vec<Option<String>>;

/// Renders a key for messages, absent components as empty strings.
pub fn key_to_string(key: &[Option<String>]) -> String {
    key.iter()
        .map(|component| component.as_deref().unwrap_or(""))
        .collect::<Vec<_>>()
        .join(",")
}

/// One component of an index, unique or index-has-key key.
///
/// The target is evaluated against the keyed node; its single atomized value, if any,
/// is optionally narrowed by a pattern.
pub struct KeyField {
    target: LazyExpression,
    pattern: Option<Regex>,
    remarks: Option<String>,
}

impl fmt::Debug for KeyField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyField")
            .field("target", &self.target.text())
            .field("pattern", &self.pattern.as_ref().map(Regex::as_str))
            .finish()
    }
}

impl KeyField {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: LazyExpression::new(target, StaticContext::default()),
            pattern: None,
            remarks: None,
        }
    }

    /// Keeps only the part of the value matched by `pattern`: the first capture group
    /// when the pattern has one, otherwise the whole match.
    pub fn with_pattern(mut self, pattern: &str) -> Result<Self, ConstraintError> {
        let regex = Regex::new(pattern).map_err(|e| ConstraintError::invalid_pattern(pattern, &e))?;
        self.pattern = Some(regex);
        Ok(self)
    }

    pub fn with_remarks(mut self, remarks: impl Into<String>) -> Self {
        self.remarks = Some(remarks.into());
        self
    }

    pub(crate) fn with_static_context(self, static_context: &StaticContext) -> Self {
        Self {
            target: LazyExpression::new(self.target.text(), static_context.clone()),
            ..self
        }
    }

    pub fn target(&self) -> &str {
        self.target.text()
    }

    pub fn pattern(&self) -> Option<&str> {
        self.pattern.as_ref().map(Regex::as_str)
    }

    pub fn remarks(&self) -> Option<&str> {
        self.remarks.as_deref()
    }

    pub fn evaluate<N: NodeItem>(
        &self,
        node: &N,
        dynamic: &DynamicContext<N>,
    ) -> Result<Option<String>, MetapathError> {
        let value = self
            .target
            .evaluate(Some(Item::Node(node.clone())), dynamic)?
            .atomize_optional()?;
        Ok(value.map(|v| self.narrow(v.to_string_value())))
    }

    fn narrow(&self, value: String) -> String {
        let Some(pattern) = &self.pattern else {
            return value;
        };
        let narrowed = pattern
            .captures(&value)
            .and_then(|captures| captures.get(1).or_else(|| captures.get(0)))
            .map(|m| m.as_str().to_string());
        narrowed.unwrap_or(value)
    }
}

/// Computes the key of `node` from `fields`, in field order.
pub fn compute_key<N: NodeItem>(
    fields: &[KeyField],
    node: &N,
    dynamic: &DynamicContext<N>,
) -> Result<Key, MetapathError> {
    fields.iter().map(|field| field.evaluate(node, dynamic)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use metaschema_mdm::{DataType, Definition, DocumentBuilder, NodeRef};
    use std::sync::Arc;

    fn party() -> NodeRef {
        let builder = DocumentBuilder::new(None::<String>);
        let party = builder
            .new_assembly(builder.root(), Arc::new(Definition::assembly("party")))
            .unwrap();
        builder
            .new_flag(party, Arc::new(Definition::flag("uuid", DataType::String)), "urn:party:42")
            .unwrap();
        builder
            .new_field(party, Arc::new(Definition::field("name", DataType::String)), "ACME")
            .unwrap();
        builder.build().unwrap().node(party).unwrap()
    }

    #[test]
    fn test_composite_key() {
        let node = party();
        let dynamic = DynamicContext::new();
        let fields = vec![KeyField::new("@uuid"), KeyField::new("name"), KeyField::new("@missing")];
        let key = compute_key(&fields, &node, &dynamic).unwrap();
        assert_eq!(
            key,
            vec![Some("urn:party:42".to_string()), Some("ACME".to_string()), None]
        );
        assert_eq!(key_to_string(&key), "urn:party:42,ACME,");
    }

    #[test]
    fn test_pattern_narrowing() {
        let node = party();
        let dynamic = DynamicContext::new();
        let group = KeyField::new("@uuid").with_pattern(r"party:(\d+)").unwrap();
        assert_eq!(group.evaluate(&node, &dynamic).unwrap(), Some("42".to_string()));
        let whole = KeyField::new("@uuid").with_pattern(r"\d+").unwrap();
        assert_eq!(whole.evaluate(&node, &dynamic).unwrap(), Some("42".to_string()));
        let miss = KeyField::new("@uuid").with_pattern("^x").unwrap();
        assert_eq!(
            miss.evaluate(&node, &dynamic).unwrap(),
            Some("urn:party:42".to_string())
        );
    }

    #[test]
    fn test_multiple_values_is_an_error() {
        let node = party();
        let field = KeyField::new("(@uuid, name)");
        assert!(matches!(
            field.evaluate(&node, &DynamicContext::new()),
            Err(MetapathError::Cardinality { .. })
        ));
        assert!(KeyField::new(".").with_pattern("(").is_err());
    }
}
