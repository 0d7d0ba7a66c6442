use crate::node::NodeKind;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MdmError {
    #[error("Value '{value}' is not a valid '{data_type}'")]
    InvalidValue { value: String, data_type: String },

    #[error("Node {0} does not exist in this document")]
    UnknownNode(usize),

    #[error("A {child} cannot be added to a {parent} node")]
    InvalidParent { parent: NodeKind, child: NodeKind },

    #[error("Definition '{name}' cannot be used to create a {requested} node")]
    DefinitionKind { name: String, requested: NodeKind },

    #[error("Flag '{0}' is already set on this node")]
    DuplicateFlag(String),

    #[error("The document already has a root assembly")]
    DuplicateRoot,

    #[error("Document tree lock was poisoned")]
    Poisoned,
}

impl MdmError {
    pub fn invalid_value(value: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self::InvalidValue {
            value: value.into(),
            data_type: data_type.into(),
        }
    }
}
