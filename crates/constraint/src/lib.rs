//! Constraint validation for schema-described documents.
//!
//! Constraints are declared per definition in a [`ConstraintSet`]. A [`Validator`] walks
//! a node tree, evaluates each node's constraints with the Metapath engine and reports
//! every outcome to a [`ValidationHandler`]. Violations never abort the walk: they are
//! collected, by default as [`Finding`]s in a [`ValidationResult`].
//!
//! # Example
//!
//! ```ignore
//! use metaschema_constraint::{Constraint, ConstraintSet, KeyField, ValidationConfig};
//!
//! let set = ConstraintSet::default()
//!     .with("catalog", Constraint::unique(vec![KeyField::new("@id")])?.with_target("control"));
//! let result = metaschema_constraint::validate(&set, &document.root(), &DynamicContext::new(), ValidationConfig::default())?;
//! assert!(result.is_passing());
//! ```

pub mod config;
pub mod constraint;
pub mod error;
pub mod finding;
pub mod handler;
pub mod index;
pub mod key_field;
pub mod level;
pub mod message;
pub mod set;
pub mod validator;

pub use config::ValidationConfig;
pub use constraint::{AllowedValue, AllowedValues, Constraint, ConstraintKind, Extensible, Matches};
pub use error::ConstraintError;
pub use finding::{Finding, FindingKind, ValidationResult};
pub use handler::{FindingCollector, ValidationHandler};
pub use index::Index;
pub use key_field::{Key, KeyField};
pub use level::Level;
pub use message::MessageTemplate;
pub use set::{ConstraintSet, DefinitionConstraints, Let};
pub use validator::Validator;

use metaschema_mdm::NodeItem;
use metaschema_metapath::DynamicContext;

/// Validates `node` and its subtree against `set`, collecting every finding.
pub fn validate<N: NodeItem>(
    set: &ConstraintSet,
    node: &N,
    dynamic: &DynamicContext<N>,
    config: ValidationConfig,
) -> Result<ValidationResult<N>, ConstraintError> {
    let mut validator = Validator::new(set, config);
    validator.validate(node, dynamic)?;
    Ok(validator.finish()?.into_result())
}
