use super::{ArrayItem, AtomicValue, FunctionItem, MapItem, Sequence};
use crate::error::{MetapathError, TypeErrorCode};
use crate::operators;
use metaschema_mdm::{DataType, NodeItem, NodeKind};
use std::fmt;
use std::hash::{Hash, Hasher};

/// One value in the type system. A sequence is never an item.
#[derive(Debug, Clone)]
pub enum Item<N> {
    Atomic(AtomicValue),
    Node(N),
    Function(FunctionItem<N>),
    Array(ArrayItem<N>),
    Map(MapItem<N>),
}

impl<N: NodeItem> Item<N> {
    pub fn as_node(&self) -> Option<&N> {
        match self {
            Item::Node(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_atomic(&self) -> Option<&AtomicValue> {
        match self {
            Item::Atomic(a) => Some(a),
            _ => None,
        }
    }

    pub fn is_node(&self) -> bool {
        matches!(self, Item::Node(_))
    }

    pub fn type_name(&self) -> String {
        match self {
            Item::Atomic(a) => a.type_name().to_string(),
            Item::Node(n) => match n.kind() {
                NodeKind::Document => "document-node()".to_string(),
                NodeKind::Assembly => "assembly()".to_string(),
                NodeKind::Field => "field()".to_string(),
                NodeKind::Flag => "flag()".to_string(),
            },
            Item::Function(_) => "function(*)".to_string(),
            Item::Array(_) => "array(*)".to_string(),
            Item::Map(_) => "map(*)".to_string(),
        }
    }

    /// Projects this item onto its atomic values.
    ///
    /// Atomic items atomize to themselves, leaf nodes to their typed value and arrays to
    /// the atomized members. Documents, assemblies, maps and function items have no
    /// typed value.
    pub fn atomize(&self) -> Result<Vec<AtomicValue>, MetapathError> {
        match self {
            Item::Atomic(a) => Ok(vec![a.clone()]),
            Item::Node(n) => atomize_node(n).map(|a| vec![a]),
            Item::Array(array) => {
                let mut out = Vec::new();
                for member in array.members() {
                    out.extend(member.atomize()?);
                }
                Ok(out)
            }
            Item::Map(_) | Item::Function(_) => Err(MetapathError::typed(
                TypeErrorCode::CannotAtomizeFunction,
                format!("Items of type '{}' cannot be atomized", self.type_name()),
            )),
        }
    }

    pub fn deep_equals(&self, other: &Item<N>) -> bool {
        match (self, other) {
            (Item::Atomic(a), Item::Atomic(b)) => operators::atomic_deep_equal(a, b),
            (Item::Node(a), Item::Node(b)) => a == b,
            (Item::Function(a), Item::Function(b)) => a == b,
            (Item::Array(a), Item::Array(b)) => a.deep_equals(b),
            (Item::Map(a), Item::Map(b)) => a.deep_equals(b),
            _ => false,
        }
    }

    pub fn to_signature(&self) -> String {
        match self {
            Item::Atomic(a) => format!("{}{{{}}}", a.type_name(), a.to_string_value()),
            Item::Node(n) => format!("{}{{{}}}", n.kind(), n.metapath()),
            Item::Function(f) => f.to_signature(),
            Item::Array(a) => a.to_signature(),
            Item::Map(m) => m.to_signature(),
        }
    }

    pub fn to_sequence(&self) -> Sequence<N> {
        Sequence::of(self.clone())
    }

    /// The string value used by `fn:string` and string concatenation.
    pub fn string_value(&self) -> Result<String, MetapathError> {
        match self {
            Item::Atomic(a) => Ok(a.to_string_value()),
            Item::Node(n) => Ok(n.value().unwrap_or_default().to_string()),
            _ => Err(MetapathError::typed(
                TypeErrorCode::CannotAtomizeFunction,
                format!("Items of type '{}' have no string value", self.type_name()),
            )),
        }
    }
}

pub(crate) fn atomize_node<N: NodeItem>(node: &N) -> Result<AtomicValue, MetapathError> {
    let no_value = || {
        MetapathError::typed(
            TypeErrorCode::NodeHasNoTypedValue,
            format!("The node '{}' has no typed value", node.metapath()),
        )
    };
    match node.kind() {
        NodeKind::Document | NodeKind::Assembly => Err(no_value()),
        NodeKind::Field | NodeKind::Flag => {
            let text = node.value().ok_or_else(no_value)?;
            AtomicValue::from_lexical(node.data_type().unwrap_or(DataType::String), text)
        }
    }
}

impl<N: NodeItem> PartialEq for Item<N> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Item::Atomic(a), Item::Atomic(b)) => a == b,
            (Item::Node(a), Item::Node(b)) => a == b,
            (Item::Function(a), Item::Function(b)) => a == b,
            (Item::Array(a), Item::Array(b)) => a == b,
            (Item::Map(a), Item::Map(b)) => a == b,
            _ => false,
        }
    }
}

impl<N: NodeItem> Eq for Item<N> {}

impl<N: NodeItem> Hash for Item<N> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Item::Atomic(a) => a.hash(state),
            Item::Node(n) => n.hash(state),
            Item::Function(f) => f.hash(state),
            Item::Array(a) => a.len().hash(state),
            Item::Map(m) => m.len().hash(state),
        }
    }
}

impl<N: NodeItem> fmt::Display for Item<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_signature())
    }
}

impl<N> From<AtomicValue> for Item<N> {
    fn from(value: AtomicValue) -> Self {
        Item::Atomic(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use metaschema_mdm::{Definition, DocumentBuilder, NodeRef};
    use rust_decimal::Decimal;
    use std::sync::Arc;

    fn sample() -> (NodeRef, NodeRef, NodeRef) {
        let builder = DocumentBuilder::new(Some("file:/doc.xml"));
        let root = builder
            .new_assembly(builder.root(), Arc::new(Definition::assembly("catalog")))
            .unwrap();
        let flag = builder
            .new_flag(root, Arc::new(Definition::flag("count", DataType::Integer)), "7")
            .unwrap();
        let doc = builder.build().unwrap();
        let catalog = doc.node(root).unwrap();
        let count = doc.node(flag).unwrap();
        (doc.root(), catalog, count)
    }

    #[test]
    fn test_atomize_leaf_node_uses_datatype() {
        let (_, _, count) = sample();
        let item = Item::Node(count);
        assert_eq!(item.atomize().unwrap(), vec![AtomicValue::Integer(7)]);
    }

    #[test]
    fn test_atomize_assembly_fails() {
        let (document, catalog, _) = sample();
        for node in [document, catalog] {
            let err = Item::Node(node).atomize().unwrap_err();
            assert!(err.is_type_error(TypeErrorCode::NodeHasNoTypedValue));
        }
    }

    #[test]
    fn test_atomize_is_idempotent_for_atomics() {
        let item: Item<NodeRef> = Item::Atomic(AtomicValue::string("x"));
        let once = item.atomize().unwrap();
        let twice = Item::<NodeRef>::Atomic(once[0].clone()).atomize().unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_atomic_deep_equals_promotes_numbers() {
        let a: Item<NodeRef> = Item::Atomic(AtomicValue::Integer(1));
        let b: Item<NodeRef> = Item::Atomic(AtomicValue::Decimal(Decimal::ONE));
        assert!(a.deep_equals(&b));
        assert_ne!(a, b);
    }

    #[test]
    fn test_signatures() {
        let (_, _, count) = sample();
        assert_eq!(Item::Node(count).to_signature(), "flag{/catalog[1]/@count}");
        let s: Item<NodeRef> = Item::Atomic(AtomicValue::string("a"));
        assert_eq!(s.to_signature(), "string{a}");
    }
}
