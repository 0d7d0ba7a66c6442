//! Receivers of constraint outcomes.
//!
//! The validator decides *what* happened; a [`ValidationHandler`] decides how it is
//! recorded. [`FindingCollector`] turns every outcome into a [`Finding`], using the
//! constraint's message template when it has one and a default message otherwise.

use crate::config::ValidationConfig;
use crate::constraint::{Constraint, ConstraintKind};
use crate::error::ConstraintError;
use crate::finding::{Finding, FindingKind, ValidationResult};
use crate::key_field::key_to_string;
use crate::level::Level;
use itertools::Itertools;
use metaschema_mdm::{DataType, MdmError, NodeItem};
use metaschema_metapath::{DynamicContext, MetapathError};
use std::sync::Arc;

type HandlerResult = Result<(), ConstraintError>;

pub trait ValidationHandler<N: NodeItem> {
    fn handle_cardinality_minimum_violation(
        &mut self,
        constraint: &Arc<Constraint>,
        node: &N,
        targets: &[N],
        dynamic: &DynamicContext<N>,
    ) -> HandlerResult;

    fn handle_cardinality_maximum_violation(
        &mut self,
        constraint: &Arc<Constraint>,
        node: &N,
        targets: &[N],
        dynamic: &DynamicContext<N>,
    ) -> HandlerResult;

    fn handle_index_duplicate_key_violation(
        &mut self,
        constraint: &Arc<Constraint>,
        node: &N,
        existing: &N,
        target: &N,
        dynamic: &DynamicContext<N>,
    ) -> HandlerResult;

    fn handle_unique_key_violation(
        &mut self,
        constraint: &Arc<Constraint>,
        node: &N,
        existing: &N,
        target: &N,
        dynamic: &DynamicContext<N>,
    ) -> HandlerResult;

    /// A key field could not be evaluated for `target`.
    fn handle_key_match_error(
        &mut self,
        constraint: &Arc<Constraint>,
        node: &N,
        target: &N,
        cause: &MetapathError,
    ) -> HandlerResult;

    fn handle_match_pattern_violation(
        &mut self,
        constraint: &Arc<Constraint>,
        node: &N,
        target: &N,
        value: &str,
        pattern: &str,
        dynamic: &DynamicContext<N>,
    ) -> HandlerResult;

    #[allow(clippy::too_many_arguments)]
    fn handle_match_datatype_violation(
        &mut self,
        constraint: &Arc<Constraint>,
        node: &N,
        target: &N,
        value: &str,
        data_type: DataType,
        cause: &MdmError,
        dynamic: &DynamicContext<N>,
    ) -> HandlerResult;

    fn handle_expect_violation(
        &mut self,
        constraint: &Arc<Constraint>,
        node: &N,
        target: &N,
        test: &str,
        dynamic: &DynamicContext<N>,
    ) -> HandlerResult;

    /// `value` of `target` is allowed by none of `failed`.
    fn handle_allowed_values_violation(
        &mut self,
        failed: &[Arc<Constraint>],
        target: &N,
        value: &str,
    ) -> HandlerResult;

    /// A second index constraint declared an index name already in use.
    fn handle_index_duplicate_violation(&mut self, constraint: &Arc<Constraint>, node: &N) -> HandlerResult;

    fn handle_index_miss(
        &mut self,
        constraint: &Arc<Constraint>,
        node: &N,
        target: &N,
        key: &[Option<String>],
        dynamic: &DynamicContext<N>,
    ) -> HandlerResult;

    /// An index-has-key constraint referenced an index no constraint built.
    fn handle_missing_index_violation(
        &mut self,
        constraint: &Arc<Constraint>,
        node: &N,
        target: &N,
        message: &str,
    ) -> HandlerResult;

    /// `constraint` could not be evaluated against `node`.
    fn handle_error(
        &mut self,
        constraint: &Arc<Constraint>,
        node: &N,
        message: &str,
        cause: &ConstraintError,
    ) -> HandlerResult;

    fn handle_pass(&mut self, constraint: &Arc<Constraint>, node: &N, target: &N) -> HandlerResult;
}

/// Collects every outcome as a [`Finding`].
#[derive(Debug)]
pub struct FindingCollector<N> {
    findings: Vec<Finding<N>>,
    max_message_length: Option<usize>,
}

impl<N: NodeItem> Default for FindingCollector<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<N: NodeItem> FindingCollector<N> {
    pub fn new() -> Self {
        Self {
            findings: Vec::new(),
            max_message_length: None,
        }
    }

    pub fn from_config(config: &ValidationConfig) -> Self {
        Self {
            findings: Vec::new(),
            max_message_length: config.max_message_length,
        }
    }

    pub fn findings(&self) -> &[Finding<N>] {
        &self.findings
    }

    pub fn into_result(self) -> ValidationResult<N> {
        ValidationResult::new(self.findings)
    }

    fn add(&mut self, mut finding: Finding<N>) -> HandlerResult {
        if let Some(max) = self.max_message_length {
            finding.truncate_message(max);
        }
        self.findings.push(finding);
        Ok(())
    }

    /// The constraint's own message when it has a template, `default` otherwise.
    fn message(
        constraint: &Constraint,
        target: &N,
        dynamic: &DynamicContext<N>,
        default: impl FnOnce() -> String,
    ) -> Result<String, ConstraintError> {
        Ok(constraint
            .generate_message(target, dynamic)?
            .unwrap_or_else(default))
    }

    fn violation(constraint: &Arc<Constraint>, node: &N, target: &N) -> Finding<N> {
        Finding::new(
            vec![Arc::clone(constraint)],
            constraint.level(),
            node.clone(),
            target.clone(),
        )
    }
}

fn quoted_paths<N: NodeItem>(nodes: &[N]) -> String {
    oxford_join(nodes.iter().map(|n| format!("'{}'", n.metapath())), "and")
}

/// `a`, `a and b`, `a, b, and c`.
fn oxford_join(items: impl Iterator<Item = String>, conjunction: &str) -> String {
    let items: Vec<String> = items.collect();
    match items.as_slice() {
        [] => String::new(),
        [one] => one.clone(),
        [first, second] => format!("{} {} {}", first, conjunction, second),
        [init @ .., last] => format!("{}, {} {}", init.join(", "), conjunction, last),
    }
}

fn cardinality_bounds(constraint: &Constraint) -> (Option<u32>, Option<u32>) {
    match constraint.kind() {
        ConstraintKind::Cardinality {
            min_occurs,
            max_occurs,
        } => (*min_occurs, *max_occurs),
        _ => (None, None),
    }
}

fn index_name(constraint: &Constraint) -> &str {
    match constraint.kind() {
        ConstraintKind::Index { name, .. } | ConstraintKind::IndexHasKey { name, .. } => name,
        _ => "",
    }
}

impl<N: NodeItem> ValidationHandler<N> for FindingCollector<N> {
    fn handle_cardinality_minimum_violation(
        &mut self,
        constraint: &Arc<Constraint>,
        node: &N,
        targets: &[N],
        dynamic: &DynamicContext<N>,
    ) -> HandlerResult {
        let message = Self::message(constraint, node, dynamic, || {
            format!(
                "The cardinality '{}' is below the required minimum '{}' for items matching '{}'.",
                targets.len(),
                cardinality_bounds(constraint).0.unwrap_or_default(),
                constraint.target()
            )
        })?;
        self.add(
            Self::violation(constraint, node, node)
                .with_subjects(targets.to_vec())
                .with_message(message),
        )
    }

    fn handle_cardinality_maximum_violation(
        &mut self,
        constraint: &Arc<Constraint>,
        node: &N,
        targets: &[N],
        dynamic: &DynamicContext<N>,
    ) -> HandlerResult {
        let message = Self::message(constraint, node, dynamic, || {
            format!(
                "The cardinality '{}' is greater than the required maximum '{}' at: {}.",
                targets.len(),
                cardinality_bounds(constraint).1.unwrap_or_default(),
                quoted_paths(targets)
            )
        })?;
        self.add(
            Self::violation(constraint, node, node)
                .with_subjects(targets.to_vec())
                .with_message(message),
        )
    }

    fn handle_index_duplicate_key_violation(
        &mut self,
        constraint: &Arc<Constraint>,
        node: &N,
        existing: &N,
        target: &N,
        dynamic: &DynamicContext<N>,
    ) -> HandlerResult {
        let message = Self::message(constraint, target, dynamic, || {
            format!(
                "Index '{}' has duplicate key for items at paths '{}' and '{}'",
                index_name(constraint),
                existing.metapath(),
                target.metapath()
            )
        })?;
        self.add(
            Self::violation(constraint, node, target)
                .with_subjects(vec![existing.clone()])
                .with_message(message),
        )
    }

    fn handle_unique_key_violation(
        &mut self,
        constraint: &Arc<Constraint>,
        node: &N,
        existing: &N,
        target: &N,
        dynamic: &DynamicContext<N>,
    ) -> HandlerResult {
        let message = Self::message(constraint, target, dynamic, || {
            format!(
                "Unique constraint violation at paths '{}' and '{}'",
                existing.metapath(),
                target.metapath()
            )
        })?;
        self.add(
            Self::violation(constraint, node, target)
                .with_subjects(vec![existing.clone()])
                .with_message(message),
        )
    }

    fn handle_key_match_error(
        &mut self,
        constraint: &Arc<Constraint>,
        node: &N,
        target: &N,
        cause: &MetapathError,
    ) -> HandlerResult {
        self.add(
            Self::violation(constraint, node, target)
                .with_message(cause.to_string())
                .with_cause(cause.clone().into()),
        )
    }

    fn handle_match_pattern_violation(
        &mut self,
        constraint: &Arc<Constraint>,
        node: &N,
        target: &N,
        value: &str,
        pattern: &str,
        dynamic: &DynamicContext<N>,
    ) -> HandlerResult {
        let message = Self::message(constraint, target, dynamic, || {
            format!(
                "Value '{}' did not match the pattern '{}' at path '{}'",
                value,
                pattern,
                target.metapath()
            )
        })?;
        self.add(Self::violation(constraint, node, target).with_message(message))
    }

    fn handle_match_datatype_violation(
        &mut self,
        constraint: &Arc<Constraint>,
        node: &N,
        target: &N,
        value: &str,
        data_type: DataType,
        cause: &MdmError,
        dynamic: &DynamicContext<N>,
    ) -> HandlerResult {
        let message = Self::message(constraint, target, dynamic, || {
            format!(
                "Value '{}' did not conform to the data type '{}' at path '{}'",
                value,
                data_type.name(),
                target.metapath()
            )
        })?;
        self.add(
            Self::violation(constraint, node, target)
                .with_message(message)
                .with_cause(cause.clone().into()),
        )
    }

    fn handle_expect_violation(
        &mut self,
        constraint: &Arc<Constraint>,
        node: &N,
        target: &N,
        test: &str,
        dynamic: &DynamicContext<N>,
    ) -> HandlerResult {
        let message = Self::message(constraint, target, dynamic, || {
            format!(
                "Expect constraint '{}' did not match the data at path '{}'",
                test,
                target.metapath()
            )
        })?;
        self.add(Self::violation(constraint, node, target).with_message(message))
    }

    fn handle_allowed_values_violation(
        &mut self,
        failed: &[Arc<Constraint>],
        target: &N,
        value: &str,
    ) -> HandlerResult {
        let severity = failed
            .iter()
            .map(|c| c.level())
            .max()
            .unwrap_or(Level::None);
        let allowed = failed
            .iter()
            .filter_map(|c| match c.kind() {
                ConstraintKind::AllowedValues(values) => Some(values),
                _ => None,
            })
            .flat_map(|values| values.values().map(|v| v.value.clone()))
            .sorted()
            .dedup();
        let message = format!(
            "Value '{}' doesn't match one of '{}' at path '{}'",
            value,
            oxford_join(allowed, "or"),
            target.metapath()
        );
        self.add(
            Finding::new(failed.to_vec(), severity, target.clone(), target.clone()).with_message(message),
        )
    }

    fn handle_index_duplicate_violation(&mut self, constraint: &Arc<Constraint>, node: &N) -> HandlerResult {
        let message = format!(
            "Duplicate index named '{}' found at path '{}'",
            index_name(constraint),
            node.metapath()
        );
        self.add(
            Finding::new(vec![Arc::clone(constraint)], Level::Critical, node.clone(), node.clone())
                .with_kind(FindingKind::Fail)
                .with_message(message),
        )
    }

    fn handle_index_miss(
        &mut self,
        constraint: &Arc<Constraint>,
        node: &N,
        target: &N,
        key: &[Option<String>],
        dynamic: &DynamicContext<N>,
    ) -> HandlerResult {
        let message = Self::message(constraint, target, dynamic, || {
            format!(
                "Key reference [{}] not found in index '{}' for item at path '{}'",
                key_to_string(key),
                index_name(constraint),
                target.metapath()
            )
        })?;
        self.add(Self::violation(constraint, node, target).with_message(message))
    }

    fn handle_missing_index_violation(
        &mut self,
        constraint: &Arc<Constraint>,
        node: &N,
        target: &N,
        message: &str,
    ) -> HandlerResult {
        let message = format!(
            "{} for constraint '{}' for item at path '{}'",
            message,
            constraint.id().unwrap_or("?"),
            target.metapath()
        );
        self.add(Self::violation(constraint, node, target).with_message(message))
    }

    fn handle_error(
        &mut self,
        constraint: &Arc<Constraint>,
        node: &N,
        message: &str,
        cause: &ConstraintError,
    ) -> HandlerResult {
        self.add(
            Finding::new(vec![Arc::clone(constraint)], Level::Error, node.clone(), node.clone())
                .with_message(message)
                .with_cause(cause.clone()),
        )
    }

    fn handle_pass(&mut self, constraint: &Arc<Constraint>, node: &N, target: &N) -> HandlerResult {
        self.add(
            Finding::new(vec![Arc::clone(constraint)], Level::None, node.clone(), target.clone())
                .with_kind(FindingKind::Pass),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraint::AllowedValues;
    use metaschema_mdm::{Definition, DocumentBuilder, NodeRef};

    fn field() -> NodeRef {
        let builder = DocumentBuilder::new(None::<String>);
        let root = builder
            .new_assembly(builder.root(), Arc::new(Definition::assembly("catalog")))
            .unwrap();
        let field = builder
            .new_field(root, Arc::new(Definition::field("status", DataType::Token)), "draft")
            .unwrap();
        builder.build().unwrap().node(field).unwrap()
    }

    #[test]
    fn test_oxford_join() {
        fn join(items: &[&str], conjunction: &str) -> String {
            oxford_join(items.iter().map(|s| s.to_string()), conjunction)
        }
        assert_eq!(join(&[], "or"), "");
        assert_eq!(join(&["a"], "or"), "a");
        assert_eq!(join(&["a", "b"], "or"), "a or b");
        assert_eq!(join(&["a", "b", "c"], "or"), "a, b, or c");
    }

    #[test]
    fn test_allowed_values_message() {
        let target = field();
        let first = Arc::new(Constraint::allowed_values(AllowedValues::of(["final", "active"])));
        let second = Arc::new(
            Constraint::allowed_values(AllowedValues::of(["active", "withdrawn"]))
                .with_level(Level::Critical),
        );
        let mut collector = FindingCollector::new();
        collector
            .handle_allowed_values_violation(&[first, second], &target, "draft")
            .unwrap();
        let finding = &collector.findings()[0];
        assert_eq!(finding.severity(), Level::Critical);
        assert_eq!(finding.constraints().len(), 2);
        assert_eq!(
            finding.message().unwrap(),
            format!(
                "Value 'draft' doesn't match one of 'active, final, or withdrawn' at path '{}'",
                target.metapath()
            )
        );
    }

    #[test]
    fn test_template_overrides_default_message() {
        let target = field();
        let dynamic = DynamicContext::new();
        let constraint = Arc::new(
            Constraint::expect(". = 'final'")
                .with_message("status is {.}")
                .unwrap(),
        );
        let mut collector = FindingCollector::new();
        collector
            .handle_expect_violation(&constraint, &target, &target, ". = 'final'", &dynamic)
            .unwrap();
        assert_eq!(collector.findings()[0].message(), Some("status is draft"));

        let plain = Arc::new(Constraint::expect(". = 'final'"));
        collector
            .handle_expect_violation(&plain, &target, &target, ". = 'final'", &dynamic)
            .unwrap();
        assert_eq!(
            collector.findings()[1].message().unwrap(),
            format!(
                "Expect constraint '. = 'final'' did not match the data at path '{}'",
                target.metapath()
            )
        );
    }

    #[test]
    fn test_duplicate_index_is_critical() {
        let target = field();
        let parent = target.parent().unwrap();
        let constraint = Arc::new(
            Constraint::index("parties", vec![crate::key_field::KeyField::new("@uuid")]).unwrap(),
        );
        let mut collector = FindingCollector::new();
        collector
            .handle_index_duplicate_violation(&constraint, &parent)
            .unwrap();
        let result = collector.into_result();
        assert_eq!(result.highest_severity(), Level::Critical);
        assert!(!result.is_passing());
    }

    #[test]
    fn test_max_message_length() {
        let target = field();
        let config = ValidationConfig {
            max_message_length: Some(10),
            ..ValidationConfig::default()
        };
        let mut collector = FindingCollector::from_config(&config);
        let constraint = Arc::new(Constraint::expect("false()"));
        collector
            .handle_error(&constraint, &target, "a very long error message", &ConstraintError::usage("x"))
            .unwrap();
        assert_eq!(collector.findings()[0].message(), Some("a very lon..."));
    }
}
