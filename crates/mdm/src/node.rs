//! The node-item contract.

use crate::datatype::DataType;
use crate::definition::Definition;
use crate::qname::QName;
use std::fmt;
use std::hash::Hash;

/// The kind of a node item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Document,
    Assembly,
    Field,
    Flag,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            NodeKind::Document => "document",
            NodeKind::Assembly => "assembly",
            NodeKind::Field => "field",
            NodeKind::Flag => "flag",
        })
    }
}

/// Source position of a node, for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Location {
    pub line: u32,
    pub column: u32,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// The universal contract for a node in a schema-described document tree.
///
/// The path-language evaluator and the constraint validator are written exclusively
/// against this trait. Implementations must be cheap to clone, compare by identity, and
/// order by document position.
pub trait NodeItem:
    fmt::Debug + Clone + PartialEq + Eq + Hash + PartialOrd + Ord + Send + Sync + 'static
{
    fn kind(&self) -> NodeKind;

    /// The qualified name. `None` only for the document node.
    fn name(&self) -> Option<&QName>;

    /// The definition this node is an instance of. `None` for the document node.
    fn definition(&self) -> Option<&Definition>;

    /// The lexical value of a flag or field. Assemblies and documents have none.
    fn value(&self) -> Option<&str>;

    /// The parent node. `None` for the root of a tree.
    fn parent(&self) -> Option<Self>;

    fn flags(&self) -> Vec<Self>;

    fn flag_by_name(&self, name: &QName) -> Option<Self>;

    /// Model children (fields and assemblies) grouped by name, in bucket order.
    fn model_items(&self) -> Vec<Self>;

    fn model_items_by_name(&self, name: &QName) -> Vec<Self>;

    fn location(&self) -> Option<Location>;

    fn base_uri(&self) -> Option<&str>;

    fn data_type(&self) -> Option<DataType> {
        self.definition().and_then(Definition::data_type)
    }

    fn has_value(&self) -> bool {
        self.value().is_some()
    }

    /// Flags followed by model items.
    fn children(&self) -> Vec<Self> {
        let mut children = self.flags();
        children.extend(self.model_items());
        children
    }

    fn root(&self) -> Self {
        let mut current = self.clone();
        while let Some(parent) = current.parent() {
            current = parent;
        }
        current
    }

    /// A path expression that selects exactly this node from the root, for example
    /// `/catalog[1]/group[2]/@id`.
    fn metapath(&self) -> String {
        let mut segments = Vec::new();
        let mut current = Some(self.clone());
        while let Some(node) = current {
            let parent = node.parent();
            match (node.kind(), node.name()) {
                (NodeKind::Document, _) | (_, None) => {}
                (NodeKind::Flag, Some(name)) => segments.push(format!("@{}", name)),
                (_, Some(name)) => {
                    let position = parent
                        .as_ref()
                        .map(|p| {
                            p.model_items_by_name(name)
                                .iter()
                                .position(|sibling| *sibling == node)
                                .map_or(1, |i| i + 1)
                        })
                        .unwrap_or(1);
                    segments.push(format!("{}[{}]", name, position));
                }
            }
            current = parent;
        }
        if segments.is_empty() {
            return "/".to_string();
        }
        segments.reverse();
        format!("/{}", segments.join("/"))
    }
}
