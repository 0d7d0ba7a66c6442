use crate::constraint::Constraint;
use crate::error::ConstraintError;
use crate::level::Level;
use metaschema_mdm::{Location, NodeItem};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FindingKind {
    Pass,
    Fail,
    Informational,
}

impl FindingKind {
    /// The kind a violation at `level` is reported as.
    pub fn for_level(level: Level) -> Self {
        match level {
            Level::Critical | Level::Error => FindingKind::Fail,
            Level::Warning => FindingKind::Pass,
            Level::Informational | Level::Debug | Level::None => FindingKind::Informational,
        }
    }
}

/// The outcome of evaluating one or more constraints against one target node.
#[derive(Debug, Clone)]
pub struct Finding<N> {
    constraints: Vec<Arc<Constraint>>,
    kind: FindingKind,
    severity: Level,
    node: N,
    target: N,
    subjects: Vec<N>,
    message: Option<String>,
    cause: Option<ConstraintError>,
}

impl<N: NodeItem> Finding<N> {
    /// A finding whose kind follows the severity.
    pub fn new(constraints: Vec<Arc<Constraint>>, severity: Level, node: N, target: N) -> Self {
        Self {
            constraints,
            kind: FindingKind::for_level(severity),
            severity,
            node,
            target,
            subjects: Vec::new(),
            message: None,
            cause: None,
        }
    }

    pub fn with_kind(mut self, kind: FindingKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_subjects(mut self, subjects: Vec<N>) -> Self {
        self.subjects = subjects;
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_cause(mut self, cause: ConstraintError) -> Self {
        self.cause = Some(cause);
        self
    }

    pub fn constraints(&self) -> &[Arc<Constraint>] {
        &self.constraints
    }

    /// The constraint id, when the finding comes from exactly one constraint that has one.
    pub fn identifier(&self) -> Option<&str> {
        match self.constraints.as_slice() {
            [constraint] => constraint.id(),
            _ => None,
        }
    }

    pub fn kind(&self) -> FindingKind {
        self.kind
    }

    pub fn severity(&self) -> Level {
        self.severity
    }

    /// The node whose definition declares the constraint.
    pub fn node(&self) -> &N {
        &self.node
    }

    /// The node the finding is about.
    pub fn target(&self) -> &N {
        &self.target
    }

    pub fn subjects(&self) -> &[N] {
        &self.subjects
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn cause(&self) -> Option<&ConstraintError> {
        self.cause.as_ref()
    }

    pub fn path(&self) -> String {
        self.target.metapath()
    }

    /// Source location of the target, falling back to its parent.
    pub fn location(&self) -> Option<Location> {
        self.target
            .location()
            .or_else(|| self.target.parent().and_then(|p| p.location()))
    }

    pub(crate) fn truncate_message(&mut self, max: usize) {
        if let Some(message) = &mut self.message
            && message.chars().count() > max
        {
            let cut: String = message.chars().take(max).collect();
            *message = format!("{}...", cut);
        }
    }
}

/// Every finding of one validation run.
#[derive(Debug, Clone)]
pub struct ValidationResult<N> {
    findings: Vec<Finding<N>>,
    highest_severity: Level,
}

impl<N> Default for ValidationResult<N> {
    fn default() -> Self {
        Self {
            findings: Vec::new(),
            highest_severity: Level::None,
        }
    }
}

impl<N: NodeItem> ValidationResult<N> {
    pub fn new(findings: Vec<Finding<N>>) -> Self {
        let highest_severity = findings
            .iter()
            .map(Finding::severity)
            .max()
            .unwrap_or(Level::None);
        Self {
            findings,
            highest_severity,
        }
    }

    pub fn findings(&self) -> &[Finding<N>] {
        &self.findings
    }

    pub fn into_findings(self) -> Vec<Finding<N>> {
        self.findings
    }

    pub fn highest_severity(&self) -> Level {
        self.highest_severity
    }

    /// True when nothing at `Error` or above was found.
    pub fn is_passing(&self) -> bool {
        !self.highest_severity.is_failure()
    }

    pub fn failures(&self) -> impl Iterator<Item = &Finding<N>> {
        self.findings.iter().filter(|f| f.kind() == FindingKind::Fail)
    }
}
