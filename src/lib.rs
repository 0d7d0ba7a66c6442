//! Metapath evaluation and constraint validation for schema-described documents.
//!
//! This crate ties the workspace together:
//!
//! - [`mdm`]: the node-item tree (definitions, datatypes, documents)
//! - [`metapath`]: the expression compiler and evaluator
//! - [`constraint`]: constraint sets, validation and findings

pub use metaschema_constraint as constraint;
pub use metaschema_mdm as mdm;
pub use metaschema_metapath as metapath;

pub use metaschema_constraint::{
    Constraint, ConstraintError, ConstraintSet, Finding, KeyField, Level, ValidationConfig,
    ValidationResult, Validator,
};
pub use metaschema_mdm::{Document, DocumentBuilder, MdmError, NodeItem, NodeRef, QName};
pub use metaschema_metapath::{
    DynamicContext, Item, MetapathError, MetapathExpression, Sequence, StaticContext,
};

use log::debug;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("Model error: {0}")]
    Model(#[from] MdmError),

    #[error("Metapath error: {0}")]
    Metapath(#[from] MetapathError),

    #[error("Constraint error: {0}")]
    Constraint(#[from] ConstraintError),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Compiles `expression` against the default static context and evaluates it with the
/// root of `document` as the context item.
pub fn evaluate(document: &Document, expression: &str) -> Result<Sequence<NodeRef>> {
    let compiled = MetapathExpression::parse(expression)?;
    Ok(compiled.evaluate_node(&document.root(), &DynamicContext::new())?)
}

/// Validates a whole document against `set`.
pub fn validate_document(
    document: &Document,
    set: &ConstraintSet,
    config: ValidationConfig,
) -> Result<ValidationResult<NodeRef>> {
    let result = metaschema_constraint::validate(set, &document.root(), &DynamicContext::new(), config)?;
    debug!(
        "validated {} nodes: {} findings, highest severity {}",
        document.len(),
        result.findings().len(),
        result.highest_severity()
    );
    Ok(result)
}
