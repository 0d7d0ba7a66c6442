use metaschema_mdm::MdmError;
use metaschema_metapath::MetapathError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConstraintError {
    #[error(transparent)]
    Metapath(#[from] MetapathError),

    #[error(transparent)]
    Model(#[from] MdmError),

    #[error("Invalid constraint: {0}")]
    InvalidConstraint(String),

    #[error("Invalid pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    #[error("Invalid message template '{template}': {message}")]
    InvalidTemplate { template: String, message: String },

    /// Allowed-values constraints reaching one node disagree on extensibility.
    #[error("{0}")]
    AllowedValuesConflict(String),

    /// A constraint could not be evaluated and the run was configured to stop.
    #[error("{message}")]
    Evaluation {
        message: String,
        #[source]
        cause: Box<ConstraintError>,
    },

    #[error("Usage error: {0}")]
    Usage(String),
}

impl ConstraintError {
    pub fn invalid_constraint(message: impl Into<String>) -> Self {
        Self::InvalidConstraint(message.into())
    }

    pub fn invalid_pattern(pattern: &str, err: &regex::Error) -> Self {
        Self::InvalidPattern {
            pattern: pattern.to_string(),
            message: err.to_string(),
        }
    }

    pub fn invalid_template(template: &str, message: impl Into<String>) -> Self {
        Self::InvalidTemplate {
            template: template.to_string(),
            message: message.into(),
        }
    }

    pub fn usage(message: impl Into<String>) -> Self {
        Self::Usage(message.into())
    }

    /// Errors raised while evaluating one constraint against one node. These are
    /// reported as findings; everything else aborts the run.
    pub fn is_recoverable(&self) -> bool {
        match self {
            ConstraintError::Metapath(err) => !matches!(err, MetapathError::Usage(_)),
            ConstraintError::Model(_)
            | ConstraintError::InvalidTemplate { .. }
            | ConstraintError::AllowedValuesConflict(_) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metapath_errors_are_transparent() {
        let err: ConstraintError = MetapathError::dynamic_error("boom").into();
        assert_eq!(err.to_string(), MetapathError::dynamic_error("boom").to_string());
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_usage_errors_abort() {
        assert!(!ConstraintError::usage("index lock poisoned").is_recoverable());
        let err: ConstraintError = MetapathError::usage("stream consumed").into();
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_invalid_pattern_message() {
        let regex_err = regex::Regex::new("(").unwrap_err();
        let err = ConstraintError::invalid_pattern("(", &regex_err);
        assert!(err.to_string().starts_with("Invalid pattern '('"));
    }
}
