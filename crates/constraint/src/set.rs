use crate::constraint::Constraint;
use indexmap::IndexMap;
use metaschema_mdm::QName;
use metaschema_metapath::{ExpressionCache, LazyExpression, StaticContext};
use std::sync::Arc;

/// A variable bound for the constraints of one definition, evaluated against each node
/// of that definition before its constraints run.
#[derive(Debug)]
pub struct Let {
    name: String,
    value: LazyExpression,
}

impl Let {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &LazyExpression {
        &self.value
    }
}

/// The `let` bindings and constraints declared on one definition, in declaration order.
#[derive(Debug, Default)]
pub struct DefinitionConstraints {
    lets: Vec<Let>,
    constraints: Vec<Arc<Constraint>>,
}

impl DefinitionConstraints {
    pub fn lets(&self) -> &[Let] {
        &self.lets
    }

    pub fn constraints(&self) -> &[Arc<Constraint>] {
        &self.constraints
    }
}

/// Constraints grouped by the name of the definition they are declared on.
///
/// Every expression added to the set resolves prefixes against the set's static
/// context, and message templates share one expression cache.
#[derive(Debug)]
pub struct ConstraintSet {
    static_context: StaticContext,
    message_cache: Arc<ExpressionCache>,
    definitions: IndexMap<QName, DefinitionConstraints>,
}

impl Default for ConstraintSet {
    fn default() -> Self {
        Self::new(StaticContext::default())
    }
}

impl ConstraintSet {
    pub fn new(static_context: StaticContext) -> Self {
        Self {
            message_cache: Arc::new(ExpressionCache::new(static_context.clone())),
            static_context,
            definitions: IndexMap::new(),
        }
    }

    pub fn static_context(&self) -> &StaticContext {
        &self.static_context
    }

    /// Declares `constraint` on the definition named `definition`.
    pub fn add(&mut self, definition: impl Into<QName>, constraint: Constraint) -> Arc<Constraint> {
        let constraint = Arc::new(
            constraint
                .with_static_context(&self.static_context)
                .with_message_cache(&self.message_cache),
        );
        self.definitions
            .entry(definition.into())
            .or_default()
            .constraints
            .push(Arc::clone(&constraint));
        constraint
    }

    /// Builder form of [`ConstraintSet::add`].
    pub fn with(mut self, definition: impl Into<QName>, constraint: Constraint) -> Self {
        self.add(definition, constraint);
        self
    }

    /// Binds `$name` to `expression` for the constraints of `definition`. Bindings are
    /// evaluated in the order they are added, each seeing the ones before it.
    pub fn add_let(
        &mut self,
        definition: impl Into<QName>,
        name: impl Into<String>,
        expression: impl Into<String>,
    ) {
        let binding = Let {
            name: name.into(),
            value: LazyExpression::new(expression, self.static_context.clone()),
        };
        self.definitions
            .entry(definition.into())
            .or_default()
            .lets
            .push(binding);
    }

    pub fn for_definition(&self, name: &QName) -> Option<&DefinitionConstraints> {
        self.definitions.get(name)
    }

    pub fn definitions(&self) -> impl Iterator<Item = (&QName, &DefinitionConstraints)> {
        self.definitions.iter()
    }

    pub fn len(&self) -> usize {
        self.definitions.values().map(|d| d.constraints.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key_field::KeyField;

    #[test]
    fn test_grouping_by_definition() {
        let mut set = ConstraintSet::default();
        set.add("control", Constraint::expect("@id"));
        set.add("control", Constraint::cardinality(Some(1), None).unwrap().with_target("part"));
        set.add_let("control", "parts", "count(part)");
        set.add("catalog", Constraint::unique(vec![KeyField::new("@id")]).unwrap().with_target("control"));
        assert_eq!(set.len(), 3);
        let control = set.for_definition(&QName::local("control")).unwrap();
        assert_eq!(control.constraints().len(), 2);
        assert_eq!(control.lets()[0].name(), "parts");
        assert!(set.for_definition(&QName::local("group")).is_none());
    }

    #[test]
    fn test_expressions_use_set_context() {
        let context = StaticContext::default().with_namespace("o", "urn:oscal");
        let mut set = ConstraintSet::new(context);
        let constraint = set.add("catalog", Constraint::expect("true()").with_target("o:control"));
        assert!(constraint.message().is_none());
        assert_eq!(constraint.target(), "o:control");
        set.add_let("catalog", "first", "o:control[1]");
        let binding = &set.for_definition(&QName::local("catalog")).unwrap().lets()[0];
        assert!(binding.value().compiled().is_ok());
    }
}
