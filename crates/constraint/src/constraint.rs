//! Constraint descriptors.
//!
//! Every constraint shares an identity (id, formal name), a [`Level`], a target
//! expression selecting the nodes it applies to (`.` unless set) and an optional message
//! template. What is checked on each target is described by a [`ConstraintKind`].

use crate::error::ConstraintError;
use crate::key_field::KeyField;
use crate::level::Level;
use crate::message::MessageTemplate;
use indexmap::IndexMap;
use metaschema_mdm::{DataType, NodeItem, NodeKind};
use metaschema_metapath::{
    DynamicContext, ExpressionCache, Item, LazyExpression, MetapathError, StaticContext,
};
use regex::Regex;
use std::fmt;
use std::sync::Arc;

/// How far an allowed-values enumeration may be extended by other constraints reaching
/// the same node. Ordered from least to most restrictive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Extensible {
    #[default]
    External,
    Model,
    None,
}

impl fmt::Display for Extensible {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Extensible::External => "external",
            Extensible::Model => "model",
            Extensible::None => "none",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllowedValue {
    pub value: String,
    pub description: Option<String>,
}

impl AllowedValue {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// An enumeration of permitted values. Other values are rejected unless `allow_other`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AllowedValues {
    values: IndexMap<String, AllowedValue>,
    allow_other: bool,
    extensible: Extensible,
}

impl AllowedValues {
    pub fn of<S: Into<String>>(values: impl IntoIterator<Item = S>) -> Self {
        values
            .into_iter()
            .fold(Self::default(), |acc, v| acc.with_value(AllowedValue::new(v)))
    }

    pub fn with_value(mut self, value: AllowedValue) -> Self {
        self.values.insert(value.value.clone(), value);
        self
    }

    pub fn with_allow_other(mut self, allow_other: bool) -> Self {
        self.allow_other = allow_other;
        self
    }

    pub fn with_extensible(mut self, extensible: Extensible) -> Self {
        self.extensible = extensible;
        self
    }

    pub fn get(&self, value: &str) -> Option<&AllowedValue> {
        self.values.get(value)
    }

    pub fn values(&self) -> impl Iterator<Item = &AllowedValue> {
        self.values.values()
    }

    pub fn allow_other(&self) -> bool {
        self.allow_other
    }

    pub fn extensible(&self) -> Extensible {
        self.extensible
    }
}

/// A lexical check: the value must fully match `pattern` and/or be valid for `data_type`.
#[derive(Debug, Clone)]
pub struct Matches {
    pattern: Option<(String, Regex)>,
    data_type: Option<DataType>,
}

impl Matches {
    pub fn pattern(&self) -> Option<&str> {
        self.pattern.as_ref().map(|(text, _)| text.as_str())
    }

    pub fn data_type(&self) -> Option<DataType> {
        self.data_type
    }

    pub fn is_match(&self, value: &str) -> bool {
        self.pattern
            .as_ref()
            .is_none_or(|(_, regex)| regex.is_match(value))
    }
}

#[derive(Debug)]
pub enum ConstraintKind {
    AllowedValues(AllowedValues),
    Matches(Matches),
    Cardinality {
        min_occurs: Option<u32>,
        max_occurs: Option<u32>,
    },
    Expect {
        test: LazyExpression,
    },
    Index {
        name: String,
        key_fields: Vec<KeyField>,
    },
    Unique {
        key_fields: Vec<KeyField>,
    },
    IndexHasKey {
        name: String,
        key_fields: Vec<KeyField>,
    },
}

impl ConstraintKind {
    pub fn name(&self) -> &'static str {
        match self {
            ConstraintKind::AllowedValues(_) => "allowed-values",
            ConstraintKind::Matches(_) => "matches",
            ConstraintKind::Cardinality { .. } => "has-cardinality",
            ConstraintKind::Expect { .. } => "expect",
            ConstraintKind::Index { .. } => "index",
            ConstraintKind::Unique { .. } => "unique",
            ConstraintKind::IndexHasKey { .. } => "index-has-key",
        }
    }

    /// Position in the fixed evaluation order applied to each node.
    pub(crate) fn phase(&self) -> u8 {
        match self {
            ConstraintKind::Expect { .. } => 0,
            ConstraintKind::AllowedValues(_) => 1,
            ConstraintKind::IndexHasKey { .. } => 2,
            ConstraintKind::Matches(_) => 3,
            ConstraintKind::Cardinality { .. } => 4,
            ConstraintKind::Index { .. } => 5,
            ConstraintKind::Unique { .. } => 6,
        }
    }

    /// Cardinality, index and unique constraints only apply to assemblies.
    pub fn applies_to(&self, kind: NodeKind) -> bool {
        match self {
            ConstraintKind::Cardinality { .. }
            | ConstraintKind::Index { .. }
            | ConstraintKind::Unique { .. } => kind == NodeKind::Assembly,
            _ => true,
        }
    }

    fn key_fields_mut(&mut self) -> Option<&mut Vec<KeyField>> {
        match self {
            ConstraintKind::Index { key_fields, .. }
            | ConstraintKind::Unique { key_fields }
            | ConstraintKind::IndexHasKey { key_fields, .. } => Some(key_fields),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub struct Constraint {
    id: Option<String>,
    formal_name: Option<String>,
    level: Level,
    target: LazyExpression,
    message: Option<MessageTemplate>,
    remarks: Option<String>,
    kind: ConstraintKind,
}

impl Constraint {
    fn new(kind: ConstraintKind) -> Self {
        Self {
            id: None,
            formal_name: None,
            level: Level::default(),
            target: LazyExpression::new(".", StaticContext::default()),
            message: None,
            remarks: None,
            kind,
        }
    }

    pub fn allowed_values(values: AllowedValues) -> Self {
        Self::new(ConstraintKind::AllowedValues(values))
    }

    /// A pattern (matched against the whole value), a datatype, or both.
    pub fn matches(pattern: Option<&str>, data_type: Option<DataType>) -> Result<Self, ConstraintError> {
        if pattern.is_none() && data_type.is_none() {
            return Err(ConstraintError::invalid_constraint(
                "a matches constraint needs a pattern or a datatype",
            ));
        }
        let pattern = pattern
            .map(|text| {
                Regex::new(&format!("^(?:{})$", text))
                    .map(|regex| (text.to_string(), regex))
                    .map_err(|e| ConstraintError::invalid_pattern(text, &e))
            })
            .transpose()?;
        Ok(Self::new(ConstraintKind::Matches(Matches { pattern, data_type })))
    }

    pub fn cardinality(min_occurs: Option<u32>, max_occurs: Option<u32>) -> Result<Self, ConstraintError> {
        match (min_occurs, max_occurs) {
            (None, None) => Err(ConstraintError::invalid_constraint(
                "a cardinality constraint needs a minimum or a maximum",
            )),
            (Some(min), Some(max)) if min > max => Err(ConstraintError::invalid_constraint(format!(
                "minimum occurrence {} exceeds maximum {}",
                min, max
            ))),
            _ => Ok(Self::new(ConstraintKind::Cardinality {
                min_occurs,
                max_occurs,
            })),
        }
    }

    pub fn expect(test: impl Into<String>) -> Self {
        Self::new(ConstraintKind::Expect {
            test: LazyExpression::new(test, StaticContext::default()),
        })
    }

    pub fn index(name: impl Into<String>, key_fields: Vec<KeyField>) -> Result<Self, ConstraintError> {
        let key_fields = require_key_fields("index", key_fields)?;
        Ok(Self::new(ConstraintKind::Index {
            name: name.into(),
            key_fields,
        }))
    }

    pub fn unique(key_fields: Vec<KeyField>) -> Result<Self, ConstraintError> {
        let key_fields = require_key_fields("unique", key_fields)?;
        Ok(Self::new(ConstraintKind::Unique { key_fields }))
    }

    pub fn index_has_key(
        name: impl Into<String>,
        key_fields: Vec<KeyField>,
    ) -> Result<Self, ConstraintError> {
        let key_fields = require_key_fields("index-has-key", key_fields)?;
        Ok(Self::new(ConstraintKind::IndexHasKey {
            name: name.into(),
            key_fields,
        }))
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_formal_name(mut self, formal_name: impl Into<String>) -> Self {
        self.formal_name = Some(formal_name.into());
        self
    }

    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = LazyExpression::new(target, StaticContext::default());
        self
    }

    pub fn with_message(mut self, template: &str) -> Result<Self, ConstraintError> {
        self.message = Some(MessageTemplate::parse(template)?);
        Ok(self)
    }

    pub fn with_remarks(mut self, remarks: impl Into<String>) -> Self {
        self.remarks = Some(remarks.into());
        self
    }

    /// Resolves the target, test and key-field expressions against `static_context`
    /// instead of the default context. Nothing has been compiled yet at this point.
    pub fn with_static_context(mut self, static_context: &StaticContext) -> Self {
        self.target = LazyExpression::new(self.target.text(), static_context.clone());
        if let ConstraintKind::Expect { test } = &mut self.kind {
            *test = LazyExpression::new(test.text(), static_context.clone());
        }
        if let Some(fields) = self.kind.key_fields_mut() {
            let rebound = std::mem::take(fields)
                .into_iter()
                .map(|field| field.with_static_context(static_context))
                .collect();
            *fields = rebound;
        }
        self
    }

    /// Compiles message expressions through a shared cache.
    pub fn with_message_cache(mut self, cache: &Arc<ExpressionCache>) -> Self {
        self.message = self.message.map(|m| m.with_cache(Arc::clone(cache)));
        self
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn formal_name(&self) -> Option<&str> {
        self.formal_name.as_deref()
    }

    pub fn level(&self) -> Level {
        self.level
    }

    pub fn target(&self) -> &str {
        self.target.text()
    }

    pub fn message(&self) -> Option<&MessageTemplate> {
        self.message.as_ref()
    }

    pub fn remarks(&self) -> Option<&str> {
        self.remarks.as_deref()
    }

    pub fn kind(&self) -> &ConstraintKind {
        &self.kind
    }

    /// Evaluates the target against `node`. Nodes without a computable value match
    /// nothing; the target must select nodes only.
    pub fn match_targets<N: NodeItem>(
        &self,
        node: &N,
        dynamic: &DynamicContext<N>,
    ) -> Result<Vec<N>, MetapathError> {
        if !has_computable_value(node) {
            return Ok(Vec::new());
        }
        self.target
            .evaluate(Some(Item::Node(node.clone())), dynamic)?
            .into_items()?
            .into_iter()
            .map(|item| match item {
                Item::Node(target) => Ok(target),
                other => Err(MetapathError::type_error(format!(
                    "The target '{}' of {} selected the non-node item '{}'",
                    self.target(),
                    self,
                    other.to_signature()
                ))),
            })
            .collect()
    }

    /// The configured message rendered against `node`, or `None` when the constraint has
    /// no message template.
    pub fn generate_message<N: NodeItem>(
        &self,
        node: &N,
        dynamic: &DynamicContext<N>,
    ) -> Result<Option<String>, ConstraintError> {
        self.message
            .as_ref()
            .map(|template| template.render(node, dynamic))
            .transpose()
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.id {
            Some(id) => write!(f, "{} constraint '{}'", self.kind.name(), id),
            None => write!(f, "{} constraint", self.kind.name()),
        }
    }
}

fn require_key_fields(kind: &str, key_fields: Vec<KeyField>) -> Result<Vec<KeyField>, ConstraintError> {
    if key_fields.is_empty() {
        Err(ConstraintError::invalid_constraint(format!(
            "an {} constraint needs at least one key field",
            kind
        )))
    } else {
        Ok(key_fields)
    }
}

/// Assemblies always have a value for constraint purposes; flags and fields only when
/// one is present.
pub fn has_computable_value<N: NodeItem>(node: &N) -> bool {
    matches!(node.kind(), NodeKind::Assembly | NodeKind::Document) || node.has_value()
}

#[cfg(test)]
mod tests {
    use super::*;
    use metaschema_mdm::{Definition, DocumentBuilder, NodeRef};

    fn catalog() -> NodeRef {
        let builder = DocumentBuilder::new(None::<String>);
        let catalog = builder
            .new_assembly(builder.root(), Arc::new(Definition::assembly("catalog")))
            .unwrap();
        let control = Arc::new(Definition::assembly("control"));
        for _ in 0..3 {
            builder.new_assembly(catalog, Arc::clone(&control)).unwrap();
        }
        builder.build().unwrap().node(catalog).unwrap()
    }

    #[test]
    fn test_constructor_invariants() {
        assert!(Constraint::matches(None, None).is_err());
        assert!(Constraint::matches(Some("[a-z]+"), None).is_ok());
        assert!(Constraint::matches(None, Some(DataType::Integer)).is_ok());
        assert!(Constraint::matches(Some("("), None).is_err());
        assert!(Constraint::cardinality(None, None).is_err());
        assert!(Constraint::cardinality(Some(3), Some(1)).is_err());
        assert!(Constraint::cardinality(None, Some(1)).is_ok());
        assert!(Constraint::unique(vec![]).is_err());
    }

    #[test]
    fn test_defaults() {
        let constraint = Constraint::expect("true()");
        assert_eq!(constraint.target(), ".");
        assert_eq!(constraint.level(), Level::Error);
        assert_eq!(constraint.to_string(), "expect constraint");
        let constraint = constraint.with_id("c1");
        assert_eq!(constraint.to_string(), "expect constraint 'c1'");
    }

    #[test]
    fn test_pattern_matches_whole_value() {
        let constraint = Constraint::matches(Some("[a-z]+"), None).unwrap();
        let ConstraintKind::Matches(matches) = constraint.kind() else {
            panic!("expected a matches constraint");
        };
        assert!(matches.is_match("abc"));
        assert!(!matches.is_match("abc1"));
        assert_eq!(matches.pattern(), Some("[a-z]+"));
    }

    #[test]
    fn test_match_targets() {
        let node = catalog();
        let dynamic = DynamicContext::new();
        let constraint = Constraint::cardinality(Some(1), None).unwrap().with_target("control");
        assert_eq!(constraint.match_targets(&node, &dynamic).unwrap().len(), 3);
        let bad = Constraint::expect("true()").with_target("1");
        assert!(bad.match_targets(&node, &dynamic).is_err());
    }

    #[test]
    fn test_static_context_rebinding() {
        let context = StaticContext::default().with_namespace("o", "urn:oscal");
        let constraint = Constraint::expect("true()")
            .with_target("o:control")
            .with_static_context(&context);
        let node = catalog();
        // bound prefix compiles; the namespaced name test simply matches nothing here
        assert!(constraint.match_targets(&node, &DynamicContext::new()).unwrap().is_empty());
        let unbound = Constraint::expect("true()").with_target("o:control");
        assert!(unbound.match_targets(&node, &DynamicContext::new()).is_err());
    }

    #[test]
    fn test_allowed_values() {
        let values = AllowedValues::of(["a", "b"])
            .with_value(AllowedValue::new("c").with_description("third"))
            .with_extensible(Extensible::None);
        assert!(values.get("a").is_some());
        assert_eq!(values.get("c").and_then(|v| v.description.as_deref()), Some("third"));
        assert!(values.get("d").is_none());
        assert!(!values.allow_other());
        assert!(Extensible::External < Extensible::Model && Extensible::Model < Extensible::None);
    }
}
