use crate::datatype::DataType;
use crate::node::NodeKind;
use crate::qname::QName;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelKind {
    Assembly,
    Field,
    Flag,
}

impl ModelKind {
    pub fn node_kind(&self) -> NodeKind {
        match self {
            ModelKind::Assembly => NodeKind::Assembly,
            ModelKind::Field => NodeKind::Field,
            ModelKind::Flag => NodeKind::Flag,
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ModelKind::Assembly => "assembly",
            ModelKind::Field => "field",
            ModelKind::Flag => "flag",
        })
    }
}

/// The part of a definition/instance pair the evaluator and constraint layer rely on.
///
/// Occurrence bounds describe the instance that places the definition in its parent's
/// model. `max_occurs` of `None` means unbounded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Definition {
    name: QName,
    kind: ModelKind,
    data_type: Option<DataType>,
    min_occurs: u32,
    max_occurs: Option<u32>,
}

impl Definition {
    pub fn assembly(name: impl Into<QName>) -> Self {
        Self {
            name: name.into(),
            kind: ModelKind::Assembly,
            data_type: None,
            min_occurs: 0,
            max_occurs: Some(1),
        }
    }

    pub fn field(name: impl Into<QName>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            kind: ModelKind::Field,
            data_type: Some(data_type),
            min_occurs: 0,
            max_occurs: Some(1),
        }
    }

    pub fn flag(name: impl Into<QName>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            kind: ModelKind::Flag,
            data_type: Some(data_type),
            min_occurs: 0,
            max_occurs: Some(1),
        }
    }

    pub fn with_occurs(mut self, min_occurs: u32, max_occurs: Option<u32>) -> Self {
        self.min_occurs = min_occurs;
        self.max_occurs = max_occurs;
        self
    }

    pub fn name(&self) -> &QName {
        &self.name
    }

    pub fn kind(&self) -> ModelKind {
        self.kind
    }

    pub fn data_type(&self) -> Option<DataType> {
        self.data_type
    }

    pub fn min_occurs(&self) -> u32 {
        self.min_occurs
    }

    pub fn max_occurs(&self) -> Option<u32> {
        self.max_occurs
    }

    pub fn is_required(&self) -> bool {
        self.min_occurs > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructors() {
        let field = Definition::field("title", DataType::String).with_occurs(1, None);
        assert_eq!(field.kind(), ModelKind::Field);
        assert_eq!(field.data_type(), Some(DataType::String));
        assert!(field.is_required());
        assert_eq!(field.max_occurs(), None);

        let assembly = Definition::assembly("catalog");
        assert_eq!(assembly.data_type(), None);
        assert_eq!(assembly.kind().node_kind(), NodeKind::Assembly);
    }
}
