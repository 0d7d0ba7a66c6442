//! Depth-first constraint validation of a node tree.
//!
//! Each node is checked against the constraints declared on its definition, in a fixed
//! order: expect, allowed-values, index-has-key and matches for every node, then
//! has-cardinality, index and unique for assemblies. Allowed-values are decided once the
//! target's subtree has been visited, because constraints declared on descendants may
//! still reach it. Index-has-key references are only resolved by
//! [`Validator::finalize_validation`], so a reference may precede its index in document
//! order.

use crate::config::ValidationConfig;
use crate::constraint::{Constraint, ConstraintKind, Extensible, Matches, has_computable_value};
use crate::error::ConstraintError;
use crate::handler::{FindingCollector, ValidationHandler};
use crate::index::Index;
use crate::key_field::{KeyField, compute_key};
use crate::set::{ConstraintSet, DefinitionConstraints, Let};
use indexmap::IndexMap;
use indexmap::map::Entry;
use log::{debug, trace, warn};
use metaschema_mdm::{NodeItem, NodeKind};
use metaschema_metapath::{DynamicContext, Item, LazyExpression, MetapathError};
use std::collections::HashMap;
use std::sync::Arc;

/// Allowed-values constraints reaching one target, and the combined verdict rules.
#[derive(Debug)]
struct ValueStatus<N> {
    value: String,
    constraints: Vec<(Arc<Constraint>, N)>,
    allow_other: bool,
    extensible: Extensible,
}

impl<N: NodeItem> ValueStatus<N> {
    fn new(value: String) -> Self {
        Self {
            value,
            constraints: Vec::new(),
            allow_other: true,
            extensible: Extensible::External,
        }
    }

    fn register(&mut self, constraint: &Arc<Constraint>, node: &N, target: &N) -> Result<(), ConstraintError> {
        let ConstraintKind::AllowedValues(values) = constraint.kind() else {
            return Ok(());
        };
        self.constraints.push((Arc::clone(constraint), node.clone()));
        self.allow_other &= values.allow_other();
        let extensible = values.extensible();
        if extensible > self.extensible {
            self.extensible = extensible;
        } else if extensible == Extensible::None && self.extensible == Extensible::None {
            return Err(ConstraintError::AllowedValuesConflict(format!(
                "Multiple constraints have extensibility scope=none at path '{}'",
                target.metapath()
            )));
        } else if extensible < self.extensible {
            // a later enumeration may not widen what an earlier one already closed
            return Err(ConstraintError::AllowedValuesConflict(format!(
                "An allowed values constraint with an extensibility scope '{}' exceeds the allowed scope '{}' at path '{}'",
                extensible,
                self.extensible,
                target.metapath()
            )));
        }
        Ok(())
    }
}

/// An index-has-key evaluation waiting for every index to be built.
#[derive(Debug)]
struct KeyRef<N> {
    constraint: Arc<Constraint>,
    node: N,
    targets: Vec<N>,
    dynamic: DynamicContext<N>,
}

pub struct Validator<'s, N: NodeItem, H = FindingCollector<N>> {
    set: &'s ConstraintSet,
    config: ValidationConfig,
    handler: H,
    value_status: IndexMap<N, ValueStatus<N>>,
    indexes: HashMap<String, Arc<Index<N>>>,
    key_refs: IndexMap<String, Vec<KeyRef<N>>>,
}

impl<'s, N: NodeItem> Validator<'s, N, FindingCollector<N>> {
    /// A validator recording findings in a [`FindingCollector`].
    pub fn new(set: &'s ConstraintSet, config: ValidationConfig) -> Self {
        let handler = FindingCollector::from_config(&config);
        Self::with_handler(set, config, handler)
    }
}

impl<'s, N: NodeItem, H: ValidationHandler<N>> Validator<'s, N, H> {
    pub fn with_handler(set: &'s ConstraintSet, config: ValidationConfig, handler: H) -> Self {
        Self {
            set,
            config,
            handler,
            value_status: IndexMap::new(),
            indexes: HashMap::new(),
            key_refs: IndexMap::new(),
        }
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// The index built under `name` so far.
    pub fn index(&self, name: &str) -> Option<Arc<Index<N>>> {
        self.indexes.get(name).cloned()
    }

    /// Validates `node` and everything below it.
    pub fn validate(&mut self, node: &N, dynamic: &DynamicContext<N>) -> Result<(), ConstraintError> {
        self.visit(node, dynamic)
    }

    /// Resolves the recorded index-has-key references against the indexes built during
    /// traversal, and decides allowed-values for targets that were never visited.
    pub fn finalize_validation(&mut self) -> Result<(), ConstraintError> {
        let pending: Vec<N> = self.value_status.keys().cloned().collect();
        for target in pending {
            self.check_allowed_values(&target)?;
        }

        for (name, refs) in std::mem::take(&mut self.key_refs) {
            let index = self.indexes.get(&name).cloned();
            for key_ref in refs {
                for target in &key_ref.targets {
                    let outcome = self.resolve_key_ref(&key_ref, target, &name, index.as_deref());
                    self.recover(&key_ref.constraint, target, outcome)?;
                }
            }
        }
        Ok(())
    }

    /// Finalizes the run and hands back the handler.
    pub fn finish(mut self) -> Result<H, ConstraintError> {
        self.finalize_validation()?;
        Ok(self.handler)
    }

    fn visit(&mut self, node: &N, dynamic: &DynamicContext<N>) -> Result<(), ConstraintError> {
        trace!("validating {} {}", node.kind(), node.metapath());
        let set = self.set;
        let declared = node.definition().and_then(|d| set.for_definition(d.name()));

        let mut scoped = None;
        if let Some(declared) = declared {
            match bind_lets(declared.lets(), node, dynamic) {
                Ok(context) => {
                    let context = scoped.insert(context);
                    self.validate_node(node, declared, context)?;
                }
                Err(err) => {
                    for constraint in declared.constraints() {
                        self.recover(constraint, node, Err(err.clone()))?;
                    }
                }
            }
        }
        let effective = scoped.as_ref().unwrap_or(dynamic);

        if node.kind() != NodeKind::Flag {
            for child in node.children() {
                self.visit(&child, effective)?;
            }
        }
        if matches!(node.kind(), NodeKind::Flag | NodeKind::Field) {
            self.check_allowed_values(node)?;
        }
        Ok(())
    }

    fn validate_node(
        &mut self,
        node: &N,
        declared: &DefinitionConstraints,
        dynamic: &DynamicContext<N>,
    ) -> Result<(), ConstraintError> {
        let mut constraints: Vec<&Arc<Constraint>> = declared
            .constraints()
            .iter()
            .filter(|c| {
                let applies = c.kind().applies_to(node.kind());
                if !applies {
                    debug!("skipping {} on {} node {}", c, node.kind(), node.metapath());
                }
                applies
            })
            .collect();
        constraints.sort_by_key(|c| c.kind().phase());

        for constraint in constraints {
            let outcome = self.apply(constraint, node, dynamic);
            self.recover(constraint, node, outcome)?;
        }
        Ok(())
    }

    fn apply(
        &mut self,
        constraint: &Arc<Constraint>,
        node: &N,
        dynamic: &DynamicContext<N>,
    ) -> Result<(), ConstraintError> {
        let targets = constraint.match_targets(node, dynamic)?;
        match constraint.kind() {
            ConstraintKind::Expect { test } => self.validate_expect(constraint, test, node, &targets, dynamic),
            ConstraintKind::AllowedValues(_) => {
                for target in targets.iter().filter(|t| has_computable_value(*t)) {
                    let outcome = self.register_value(constraint, node, target);
                    self.recover(constraint, target, outcome)?;
                }
                Ok(())
            }
            ConstraintKind::IndexHasKey { name, .. } => {
                self.key_refs.entry(name.clone()).or_default().push(KeyRef {
                    constraint: Arc::clone(constraint),
                    node: node.clone(),
                    targets,
                    dynamic: dynamic.clone(),
                });
                Ok(())
            }
            ConstraintKind::Matches(matches) => self.validate_matches(constraint, matches, node, &targets, dynamic),
            ConstraintKind::Cardinality {
                min_occurs,
                max_occurs,
            } => {
                let count = targets.len();
                let mut violated = false;
                if let Some(min) = min_occurs
                    && count < *min as usize
                {
                    self.handler
                        .handle_cardinality_minimum_violation(constraint, node, &targets, dynamic)?;
                    violated = true;
                }
                if let Some(max) = max_occurs
                    && count > *max as usize
                {
                    self.handler
                        .handle_cardinality_maximum_violation(constraint, node, &targets, dynamic)?;
                    violated = true;
                }
                if violated { Ok(()) } else { self.pass(constraint, node, node) }
            }
            ConstraintKind::Index { name, key_fields } => {
                if self.indexes.contains_key(name) {
                    return self.handler.handle_index_duplicate_violation(constraint, node);
                }
                let index = Arc::new(Index::new(name.clone()));
                self.indexes.insert(name.clone(), Arc::clone(&index));
                self.register_keys(constraint, key_fields, &index, false, node, &targets, dynamic)
            }
            ConstraintKind::Unique { key_fields } => {
                let index = Index::new(format!("unique:{}", constraint.id().unwrap_or(constraint.target())));
                self.register_keys(constraint, key_fields, &index, true, node, &targets, dynamic)
            }
        }
    }

    fn validate_expect(
        &mut self,
        constraint: &Arc<Constraint>,
        test: &LazyExpression,
        node: &N,
        targets: &[N],
        dynamic: &DynamicContext<N>,
    ) -> Result<(), ConstraintError> {
        for target in targets.iter().filter(|t| has_computable_value(*t)) {
            let outcome = match test.evaluate_boolean(Some(Item::Node(target.clone())), dynamic) {
                Ok(true) => self.pass(constraint, node, target),
                Ok(false) => self
                    .handler
                    .handle_expect_violation(constraint, node, target, test.text(), dynamic),
                Err(err) => Err(err.into()),
            };
            self.recover(constraint, target, outcome)?;
        }
        Ok(())
    }

    fn validate_matches(
        &mut self,
        constraint: &Arc<Constraint>,
        matches: &Matches,
        node: &N,
        targets: &[N],
        dynamic: &DynamicContext<N>,
    ) -> Result<(), ConstraintError> {
        for target in targets.iter().filter(|t| has_computable_value(*t)) {
            let value = atomized_string(target)?;
            let mut valid = true;
            if let Some(pattern) = matches.pattern()
                && !matches.is_match(&value)
            {
                self.handler
                    .handle_match_pattern_violation(constraint, node, target, &value, pattern, dynamic)?;
                valid = false;
            }
            if let Some(data_type) = matches.data_type()
                && let Err(cause) = data_type.validate(&value)
            {
                self.handler.handle_match_datatype_violation(
                    constraint, node, target, &value, data_type, &cause, dynamic,
                )?;
                valid = false;
            }
            if valid {
                self.pass(constraint, node, target)?;
            }
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn register_keys(
        &mut self,
        constraint: &Arc<Constraint>,
        key_fields: &[KeyField],
        index: &Index<N>,
        unique: bool,
        node: &N,
        targets: &[N],
        dynamic: &DynamicContext<N>,
    ) -> Result<(), ConstraintError> {
        for target in targets.iter().filter(|t| has_computable_value(*t)) {
            let key = match compute_key(key_fields, target, dynamic) {
                Ok(key) => key,
                Err(cause) => {
                    self.handler.handle_key_match_error(constraint, node, target, &cause)?;
                    continue;
                }
            };
            match index.put(key, target.clone())? {
                None => self.pass(constraint, node, target)?,
                Some(existing) if unique => self
                    .handler
                    .handle_unique_key_violation(constraint, node, &existing, target, dynamic)?,
                Some(existing) => self
                    .handler
                    .handle_index_duplicate_key_violation(constraint, node, &existing, target, dynamic)?,
            }
        }
        Ok(())
    }

    fn register_value(&mut self, constraint: &Arc<Constraint>, node: &N, target: &N) -> Result<(), ConstraintError> {
        let status = match self.value_status.entry(target.clone()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(ValueStatus::new(atomized_string(target)?)),
        };
        status.register(constraint, node, target)
    }

    fn check_allowed_values(&mut self, target: &N) -> Result<(), ConstraintError> {
        let Some(status) = self.value_status.shift_remove(target) else {
            return Ok(());
        };
        let mut matched = false;
        let mut failed = Vec::new();
        for (constraint, node) in &status.constraints {
            let ConstraintKind::AllowedValues(values) = constraint.kind() else {
                continue;
            };
            if values.get(&status.value).is_some() {
                matched = true;
                self.pass(constraint, node, target)?;
            } else if values.extensible() == Extensible::None {
                // nothing else can satisfy a closed enumeration
                failed = vec![Arc::clone(constraint)];
                matched = false;
                break;
            } else {
                failed.push(Arc::clone(constraint));
            }
        }
        if !matched && !status.allow_other {
            self.handler
                .handle_allowed_values_violation(&failed, target, &status.value)?;
        }
        Ok(())
    }

    fn resolve_key_ref(
        &mut self,
        key_ref: &KeyRef<N>,
        target: &N,
        name: &str,
        index: Option<&Index<N>>,
    ) -> Result<(), ConstraintError> {
        let ConstraintKind::IndexHasKey { key_fields, .. } = key_ref.constraint.kind() else {
            return Ok(());
        };
        let constraint = &key_ref.constraint;
        let key = match compute_key(key_fields, target, &key_ref.dynamic) {
            Ok(key) => key,
            Err(cause) => {
                return self
                    .handler
                    .handle_key_match_error(constraint, &key_ref.node, target, &cause);
            }
        };
        let Some(index) = index else {
            let message = format!("Key reference to undefined index with name '{}'", name);
            return self
                .handler
                .handle_missing_index_violation(constraint, &key_ref.node, target, &message);
        };
        match index.get(&key)? {
            Some(_) => self.pass(constraint, &key_ref.node, target),
            None => self
                .handler
                .handle_index_miss(constraint, &key_ref.node, target, &key, &key_ref.dynamic),
        }
    }

    fn pass(&mut self, constraint: &Arc<Constraint>, node: &N, target: &N) -> Result<(), ConstraintError> {
        if self.config.generate_pass_findings {
            self.handler.handle_pass(constraint, node, target)
        } else {
            Ok(())
        }
    }

    /// Turns an evaluation failure into an error finding, or into a run-stopping error
    /// when so configured. Usage errors always stop the run.
    fn recover(
        &mut self,
        constraint: &Arc<Constraint>,
        node: &N,
        outcome: Result<(), ConstraintError>,
    ) -> Result<(), ConstraintError> {
        let err = match outcome {
            Ok(()) => return Ok(()),
            Err(err) if err.is_recoverable() => err,
            Err(err) => return Err(err),
        };
        let message = error_message(constraint, node, &err);
        if self.config.fail_on_evaluation_error {
            return Err(ConstraintError::Evaluation {
                message,
                cause: Box::new(err),
            });
        }
        warn!("{}", message);
        self.handler.handle_error(constraint, node, &message, &err)
    }
}

fn bind_lets<N: NodeItem>(
    lets: &[Let],
    node: &N,
    dynamic: &DynamicContext<N>,
) -> Result<DynamicContext<N>, ConstraintError> {
    let mut scoped = dynamic.clone();
    for binding in lets {
        let value = binding
            .value()
            .evaluate(Some(Item::Node(node.clone())), &scoped)?
            .reusable()?;
        scoped.set_variable(binding.name(), value);
    }
    Ok(scoped)
}

fn atomized_string<N: NodeItem>(node: &N) -> Result<String, MetapathError> {
    Ok(Item::Node(node.clone())
        .atomize()?
        .first()
        .map(|v| v.to_string_value())
        .unwrap_or_default())
}

fn error_message<N: NodeItem>(constraint: &Constraint, node: &N, err: &ConstraintError) -> String {
    let id = constraint
        .id()
        .map(|id| format!(" with id '{}'", id))
        .unwrap_or_default();
    format!(
        "A {} constraint{} targeting the metapath '{}', matching the item at path '{}', resulted in an unexpected error. The error was: {}",
        constraint.kind().name(),
        id,
        constraint.target(),
        node.metapath(),
        err
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraint::AllowedValues;
    use crate::finding::{FindingKind, ValidationResult};
    use crate::level::Level;
    use metaschema_mdm::{DataType, Definition, DocumentBuilder, NodeId, NodeRef};

    struct Tree {
        builder: DocumentBuilder,
    }

    impl Tree {
        fn new() -> (Self, NodeId) {
            let builder = DocumentBuilder::new(Some("file:/catalog.json"));
            let catalog = builder
                .new_assembly(builder.root(), Arc::new(Definition::assembly("catalog")))
                .unwrap();
            (Self { builder }, catalog)
        }

        fn assembly(&self, parent: NodeId, name: &str, flags: &[(&str, &str)]) -> NodeId {
            let id = self
                .builder
                .new_assembly(parent, Arc::new(Definition::assembly(name)))
                .unwrap();
            for (flag, value) in flags {
                self.builder
                    .new_flag(id, Arc::new(Definition::flag(*flag, DataType::String)), *value)
                    .unwrap();
            }
            id
        }

        fn field(&self, parent: NodeId, name: &str, value: &str) -> NodeId {
            self.builder
                .new_field(parent, Arc::new(Definition::field(name, DataType::String)), value)
                .unwrap()
        }

        fn root(self) -> NodeRef {
            self.builder.build().unwrap().root()
        }
    }

    fn run(set: &ConstraintSet, root: &NodeRef, config: ValidationConfig) -> ValidationResult<NodeRef> {
        let mut validator = Validator::new(set, config);
        validator.validate(root, &DynamicContext::new()).unwrap();
        validator.finish().unwrap().into_result()
    }

    fn messages(result: &ValidationResult<NodeRef>) -> Vec<String> {
        result
            .findings()
            .iter()
            .filter_map(|f| f.message().map(str::to_string))
            .collect()
    }

    fn catalog_with_controls(count: usize) -> NodeRef {
        let (tree, catalog) = Tree::new();
        for i in 0..count {
            tree.assembly(catalog, "control", &[("id", &format!("c{}", i))]);
        }
        tree.root()
    }

    #[test]
    fn test_cardinality_bounds_are_inclusive() {
        let set = ConstraintSet::default().with(
            "catalog",
            Constraint::cardinality(Some(1), Some(3)).unwrap().with_target("control"),
        );
        for count in 1..=3 {
            let result = run(&set, &catalog_with_controls(count), ValidationConfig::default());
            assert!(result.is_passing(), "{} controls should pass", count);
            assert!(result.findings().is_empty());
        }
        let below = run(&set, &catalog_with_controls(0), ValidationConfig::default());
        assert!(!below.is_passing());
        assert_eq!(
            messages(&below),
            vec!["The cardinality '0' is below the required minimum '1' for items matching 'control'."]
        );
        let above = run(&set, &catalog_with_controls(4), ValidationConfig::default());
        assert!(!above.is_passing());
        assert_eq!(above.findings()[0].subjects().len(), 4);
        assert!(messages(&above)[0].starts_with("The cardinality '4' is greater than the required maximum '3' at: "));
    }

    #[test]
    fn test_index_and_key_references() {
        let (tree, catalog) = Tree::new();
        // the reference precedes the index in document order
        tree.assembly(catalog, "ref", &[("id", "a"), ("class", "b")]);
        tree.assembly(catalog, "ref", &[("id", "a"), ("class", "z")]);
        tree.assembly(catalog, "control", &[("id", "a"), ("class", "b")]);
        tree.assembly(catalog, "control", &[("id", "a"), ("class", "c")]);
        let root = tree.root();

        let keys = || vec![KeyField::new("@id"), KeyField::new("@class")];
        let set = ConstraintSet::default()
            .with(
                "catalog",
                Constraint::index("idx", keys()).unwrap().with_target("control"),
            )
            .with(
                "catalog",
                Constraint::index_has_key("idx", keys())
                    .unwrap()
                    .with_id("ref-key")
                    .with_target("ref"),
            );
        let result = run(&set, &root, ValidationConfig::default());
        let messages = messages(&result);
        assert_eq!(messages.len(), 1);
        assert!(messages[0].starts_with("Key reference [a,z] not found in index 'idx'"));
        assert_eq!(result.findings()[0].identifier(), Some("ref-key"));
    }

    #[test]
    fn test_duplicate_key_is_reported() {
        let (tree, catalog) = Tree::new();
        tree.assembly(catalog, "control", &[("id", "a"), ("class", "b")]);
        tree.assembly(catalog, "control", &[("id", "a"), ("class", "b")]);
        let root = tree.root();
        let set = ConstraintSet::default().with(
            "catalog",
            Constraint::index("idx", vec![KeyField::new("@id"), KeyField::new("@class")])
                .unwrap()
                .with_target("control"),
        );
        let mut validator = Validator::new(&set, ValidationConfig::default());
        validator.validate(&root, &DynamicContext::new()).unwrap();
        let index = validator.index("idx").unwrap();
        assert_eq!(index.len(), 1);
        let result = validator.finish().unwrap().into_result();
        let finding = &result.findings()[0];
        assert_eq!(
            finding.message().unwrap(),
            "Index 'idx' has duplicate key for items at paths '/catalog[1]/control[1]' and '/catalog[1]/control[2]'"
        );
        assert_eq!(finding.subjects()[0].metapath(), "/catalog[1]/control[1]");
    }

    #[test]
    fn test_duplicate_index_name_and_undefined_index() {
        let root = catalog_with_controls(1);
        let set = ConstraintSet::default()
            .with("catalog", Constraint::index("idx", vec![KeyField::new("@id")]).unwrap().with_target("control"))
            .with("catalog", Constraint::index("idx", vec![KeyField::new("@id")]).unwrap().with_target("control"))
            .with(
                "catalog",
                Constraint::index_has_key("nowhere", vec![KeyField::new("@id")])
                    .unwrap()
                    .with_target("control"),
            );
        let result = run(&set, &root, ValidationConfig::default());
        assert_eq!(result.highest_severity(), Level::Critical);
        let messages = messages(&result);
        assert_eq!(messages[0], "Duplicate index named 'idx' found at path '/catalog[1]'");
        assert_eq!(
            messages[1],
            "Key reference to undefined index with name 'nowhere' for constraint '?' for item at path '/catalog[1]/control[1]'"
        );
    }

    #[test]
    fn test_unique() {
        let (tree, catalog) = Tree::new();
        for id in ["a", "b", "a"] {
            tree.assembly(catalog, "control", &[("id", id)]);
        }
        let root = tree.root();
        let set = ConstraintSet::default().with(
            "catalog",
            Constraint::unique(vec![KeyField::new("@id")]).unwrap().with_target("control"),
        );
        let result = run(&set, &root, ValidationConfig::default());
        assert_eq!(
            messages(&result),
            vec!["Unique constraint violation at paths '/catalog[1]/control[1]' and '/catalog[1]/control[3]'"]
        );
    }

    #[test]
    fn test_allowed_values() {
        let (tree, catalog) = Tree::new();
        tree.field(catalog, "status", "draft");
        tree.field(catalog, "status", "final");
        let root = tree.root();
        let set = ConstraintSet::default().with(
            "status",
            Constraint::allowed_values(AllowedValues::of(["final", "withdrawn"])),
        );
        let result = run(&set, &root, ValidationConfig::default());
        assert_eq!(
            messages(&result),
            vec!["Value 'draft' doesn't match one of 'final or withdrawn' at path '/catalog[1]/status[1]'"]
        );

        let open = ConstraintSet::default().with(
            "status",
            Constraint::allowed_values(AllowedValues::of(["final"]).with_allow_other(true)),
        );
        assert!(run(&open, &root, ValidationConfig::default()).findings().is_empty());
    }

    #[test]
    fn test_allowed_values_from_ancestor_and_descendant() {
        let (tree, catalog) = Tree::new();
        tree.field(catalog, "status", "draft");
        let root = tree.root();
        // declared on the catalog and on the field itself; either enumeration may match
        let set = ConstraintSet::default()
            .with(
                "catalog",
                Constraint::allowed_values(AllowedValues::of(["draft"])).with_target("status"),
            )
            .with("status", Constraint::allowed_values(AllowedValues::of(["final"])));
        let result = run(
            &set,
            &root,
            ValidationConfig {
                generate_pass_findings: true,
                ..ValidationConfig::default()
            },
        );
        assert!(result.is_passing());
        assert_eq!(result.findings().len(), 1);
        assert_eq!(result.findings()[0].kind(), FindingKind::Pass);
    }

    #[test]
    fn test_closed_enumerations_conflict() {
        let (tree, catalog) = Tree::new();
        tree.field(catalog, "status", "final");
        let root = tree.root();
        let closed = || AllowedValues::of(["final"]).with_extensible(Extensible::None);
        let set = ConstraintSet::default()
            .with("catalog", Constraint::allowed_values(closed()).with_target("status"))
            .with("status", Constraint::allowed_values(closed()));
        let result = run(&set, &root, ValidationConfig::default());
        let errors: Vec<_> = result
            .findings()
            .iter()
            .filter(|f| matches!(f.cause(), Some(ConstraintError::AllowedValuesConflict(_))))
            .collect();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message().unwrap().contains("Multiple constraints have extensibility scope=none"));
    }

    #[test]
    fn test_wider_scope_after_model_scope_conflicts() {
        let (tree, catalog) = Tree::new();
        tree.field(catalog, "status", "final");
        let root = tree.root();
        // the catalog registers first, so the field's own external enumeration widens it
        let set = ConstraintSet::default()
            .with(
                "catalog",
                Constraint::allowed_values(AllowedValues::of(["final"]).with_extensible(Extensible::Model))
                    .with_target("status"),
            )
            .with("status", Constraint::allowed_values(AllowedValues::of(["draft"])));
        let result = run(&set, &root, ValidationConfig::default());
        let errors: Vec<_> = result
            .findings()
            .iter()
            .filter(|f| matches!(f.cause(), Some(ConstraintError::AllowedValuesConflict(_))))
            .collect();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message().unwrap().ends_with(
            "An allowed values constraint with an extensibility scope 'external' exceeds the allowed scope 'model' \
             at path '/catalog[1]/status[1]'"
        ));

        // narrowing in the same order is accepted
        let narrowing = ConstraintSet::default()
            .with(
                "catalog",
                Constraint::allowed_values(AllowedValues::of(["final"])).with_target("status"),
            )
            .with(
                "status",
                Constraint::allowed_values(AllowedValues::of(["draft"]).with_extensible(Extensible::Model)),
            );
        let result = run(&narrowing, &root, ValidationConfig::default());
        assert!(result.is_passing());
    }

    #[test]
    fn test_matches() {
        let (tree, catalog) = Tree::new();
        tree.field(catalog, "version", "1.0");
        tree.field(catalog, "version", "v2");
        let root = tree.root();
        let set = ConstraintSet::default()
            .with("version", Constraint::matches(Some(r"\d+\.\d+"), None).unwrap())
            .with("version", Constraint::matches(None, Some(DataType::Decimal)).unwrap());
        let result = run(&set, &root, ValidationConfig::default());
        assert_eq!(
            messages(&result),
            vec![
                "Value 'v2' did not match the pattern '\\d+\\.\\d+' at path '/catalog[1]/version[2]'",
                "Value 'v2' did not conform to the data type 'decimal' at path '/catalog[1]/version[2]'",
            ]
        );
        assert!(matches!(result.findings()[1].cause(), Some(ConstraintError::Model(_))));
    }

    #[test]
    fn test_expect_with_let_bindings() {
        let (tree, catalog) = Tree::new();
        tree.assembly(catalog, "control", &[("id", "c1")]);
        tree.field(catalog, "limit", "1");
        let root = tree.root();
        let mut set = ConstraintSet::default();
        set.add_let("catalog", "controls", "count(control)");
        set.add_let("catalog", "limit", "xs:integer(limit)");
        set.add("catalog", Constraint::expect("$controls le $limit").with_id("within-limit"));
        set.add(
            "catalog",
            Constraint::expect("$controls gt $limit")
                .with_message("{$controls} controls exceed {$limit}")
                .unwrap(),
        );
        let result = run(&set, &root, ValidationConfig::default());
        assert_eq!(messages(&result), vec!["1 controls exceed 1"]);
    }

    #[test]
    fn test_evaluation_errors_become_findings() {
        let root = catalog_with_controls(2);
        let set = ConstraintSet::default()
            .with("catalog", Constraint::expect("1 +").with_id("broken"))
            .with("control", Constraint::expect("xs:integer(@id) gt 0"))
            .with("catalog", Constraint::cardinality(Some(5), None).unwrap().with_target("control"));
        let result = run(&set, &root, ValidationConfig::default());
        let messages = messages(&result);
        // the broken constraint, one cast failure per control, and the sibling cardinality
        assert_eq!(messages.len(), 4);
        assert!(messages[0].starts_with(
            "A expect constraint with id 'broken' targeting the metapath '.', matching the item at path '/catalog[1]', resulted in an unexpected error."
        ));
        assert!(messages.iter().any(|m| m.starts_with("The cardinality '2' is below")));
        assert!(result.findings().iter().all(|f| f.severity() == Level::Error));
    }

    #[test]
    fn test_fail_on_evaluation_error() {
        let root = catalog_with_controls(1);
        let set = ConstraintSet::default().with("catalog", Constraint::expect("1 +"));
        let mut validator = Validator::new(
            &set,
            ValidationConfig {
                fail_on_evaluation_error: true,
                ..ValidationConfig::default()
            },
        );
        let err = validator.validate(&root, &DynamicContext::new()).unwrap_err();
        match err {
            ConstraintError::Evaluation { cause, .. } => assert!(matches!(
                *cause,
                ConstraintError::Metapath(MetapathError::Syntax { .. })
            )),
            other => panic!("expected an evaluation error, got {:?}", other),
        }
    }

    #[test]
    fn test_pass_findings() {
        let root = catalog_with_controls(2);
        let set = ConstraintSet::default().with("control", Constraint::expect("@id"));
        assert!(run(&set, &root, ValidationConfig::default()).findings().is_empty());
        let result = run(
            &set,
            &root,
            ValidationConfig {
                generate_pass_findings: true,
                ..ValidationConfig::default()
            },
        );
        assert_eq!(result.findings().len(), 2);
        assert!(result.findings().iter().all(|f| f.kind() == FindingKind::Pass));
        assert_eq!(result.highest_severity(), Level::None);
    }
}
