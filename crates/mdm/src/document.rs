//! Arena-backed document trees.
//!
//! A [`DocumentBuilder`] accepts nodes from any number of threads; [`DocumentBuilder::build`]
//! freezes the arena into an immutable [`Document`] and assigns document order.

use crate::definition::{Definition, ModelKind};
use crate::error::MdmError;
use crate::node::{Location, NodeItem, NodeKind};
use crate::qname::QName;
use indexmap::IndexMap;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, RwLock};

/// Index of a node in its document's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(&self) -> usize {
        self.0
    }
}

#[derive(Debug)]
struct NodeData {
    kind: NodeKind,
    definition: Option<Arc<Definition>>,
    value: Option<String>,
    parent: Option<NodeId>,
    flags: IndexMap<QName, NodeId>,
    model: IndexMap<QName, Vec<NodeId>>,
    location: Option<Location>,
    order: usize,
}

impl NodeData {
    fn new(
        kind: NodeKind,
        definition: Option<Arc<Definition>>,
        value: Option<String>,
        parent: Option<NodeId>,
    ) -> Self {
        Self {
            kind,
            definition,
            value,
            parent,
            flags: IndexMap::new(),
            model: IndexMap::new(),
            location: None,
            order: 0,
        }
    }
}

/// Incrementally constructs a document tree.
///
/// All `new_*` methods take `&self`, so distinct children may be inserted from several
/// threads at once. Children sharing a qualified name keep the order in which they were
/// inserted.
pub struct DocumentBuilder {
    base_uri: Option<String>,
    nodes: RwLock<Vec<NodeData>>,
}

impl fmt::Debug for DocumentBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentBuilder")
            .field("base_uri", &self.base_uri)
            .field("nodes", &self.nodes.read().map(|n| n.len()).unwrap_or(0))
            .finish()
    }
}

impl DocumentBuilder {
    /// Starts a document rooted at a document node.
    pub fn new(base_uri: Option<impl Into<String>>) -> Self {
        Self {
            base_uri: base_uri.map(Into::into),
            nodes: RwLock::new(vec![NodeData::new(NodeKind::Document, None, None, None)]),
        }
    }

    /// Starts a detached tree rooted at an assembly with no document node above it.
    pub fn detached(
        definition: Arc<Definition>,
        base_uri: Option<impl Into<String>>,
    ) -> Result<Self, MdmError> {
        if definition.kind() != ModelKind::Assembly {
            return Err(MdmError::DefinitionKind {
                name: definition.name().to_string(),
                requested: NodeKind::Assembly,
            });
        }
        Ok(Self {
            base_uri: base_uri.map(Into::into),
            nodes: RwLock::new(vec![NodeData::new(
                NodeKind::Assembly,
                Some(definition),
                None,
                None,
            )]),
        })
    }

    /// The tree's root: the document node, or the assembly of a detached tree.
    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn new_assembly(
        &self,
        parent: NodeId,
        definition: Arc<Definition>,
    ) -> Result<NodeId, MdmError> {
        self.insert_model_item(parent, definition, NodeKind::Assembly, None)
    }

    pub fn new_field(
        &self,
        parent: NodeId,
        definition: Arc<Definition>,
        value: impl Into<String>,
    ) -> Result<NodeId, MdmError> {
        self.insert_model_item(parent, definition, NodeKind::Field, Some(value.into()))
    }

    pub fn new_flag(
        &self,
        parent: NodeId,
        definition: Arc<Definition>,
        value: impl Into<String>,
    ) -> Result<NodeId, MdmError> {
        check_definition(&definition, NodeKind::Flag)?;
        let value = value.into();
        validate_value(&definition, &value)?;

        let mut nodes = self.nodes.write().map_err(|_| MdmError::Poisoned)?;
        let parent_kind = nodes
            .get(parent.0)
            .ok_or(MdmError::UnknownNode(parent.0))?
            .kind;
        if !matches!(parent_kind, NodeKind::Assembly | NodeKind::Field) {
            return Err(MdmError::InvalidParent {
                parent: parent_kind,
                child: NodeKind::Flag,
            });
        }
        let name = definition.name().clone();
        if nodes[parent.0].flags.contains_key(&name) {
            return Err(MdmError::DuplicateFlag(name.to_string()));
        }

        let id = NodeId(nodes.len());
        nodes.push(NodeData::new(
            NodeKind::Flag,
            Some(definition),
            Some(value),
            Some(parent),
        ));
        nodes[parent.0].flags.insert(name, id);
        Ok(id)
    }

    pub fn set_location(&self, node: NodeId, location: Location) -> Result<(), MdmError> {
        let mut nodes = self.nodes.write().map_err(|_| MdmError::Poisoned)?;
        let data = nodes.get_mut(node.0).ok_or(MdmError::UnknownNode(node.0))?;
        data.location = Some(location);
        Ok(())
    }

    fn insert_model_item(
        &self,
        parent: NodeId,
        definition: Arc<Definition>,
        kind: NodeKind,
        value: Option<String>,
    ) -> Result<NodeId, MdmError> {
        check_definition(&definition, kind)?;
        if let Some(value) = &value {
            validate_value(&definition, value)?;
        }

        let mut nodes = self.nodes.write().map_err(|_| MdmError::Poisoned)?;
        let parent_data = nodes.get(parent.0).ok_or(MdmError::UnknownNode(parent.0))?;
        match parent_data.kind {
            NodeKind::Assembly => {}
            NodeKind::Document if kind == NodeKind::Assembly => {
                if !parent_data.model.is_empty() {
                    return Err(MdmError::DuplicateRoot);
                }
            }
            other => {
                return Err(MdmError::InvalidParent {
                    parent: other,
                    child: kind,
                });
            }
        }

        let name = definition.name().clone();
        let id = NodeId(nodes.len());
        nodes.push(NodeData::new(kind, Some(definition), value, Some(parent)));
        nodes[parent.0].model.entry(name).or_default().push(id);
        Ok(id)
    }

    /// Freezes the tree and assigns document order: a node, then its flags, then its
    /// model items bucket by bucket.
    pub fn build(self) -> Result<Document, MdmError> {
        let mut nodes = self.nodes.into_inner().map_err(|_| MdmError::Poisoned)?;

        let mut order = 0;
        let mut stack = vec![NodeId(0)];
        while let Some(id) = stack.pop() {
            nodes[id.0].order = order;
            order += 1;
            let data = &nodes[id.0];
            let children: Vec<NodeId> = data
                .flags
                .values()
                .copied()
                .chain(data.model.values().flatten().copied())
                .collect();
            stack.extend(children.into_iter().rev());
        }
        log::debug!("Built document with {} nodes", nodes.len());

        Ok(Document {
            data: Arc::new(DocumentData {
                base_uri: self.base_uri,
                nodes,
            }),
        })
    }
}

fn check_definition(definition: &Definition, requested: NodeKind) -> Result<(), MdmError> {
    if definition.kind().node_kind() == requested {
        Ok(())
    } else {
        Err(MdmError::DefinitionKind {
            name: definition.name().to_string(),
            requested,
        })
    }
}

fn validate_value(definition: &Definition, value: &str) -> Result<(), MdmError> {
    match definition.data_type() {
        Some(data_type) => data_type.validate(value),
        None => Ok(()),
    }
}

#[derive(Debug)]
struct DocumentData {
    base_uri: Option<String>,
    nodes: Vec<NodeData>,
}

/// An immutable document tree.
#[derive(Debug, Clone)]
pub struct Document {
    data: Arc<DocumentData>,
}

impl Document {
    pub fn root(&self) -> NodeRef {
        NodeRef {
            doc: Arc::clone(&self.data),
            id: NodeId(0),
        }
    }

    pub fn node(&self, id: NodeId) -> Option<NodeRef> {
        (id.0 < self.data.nodes.len()).then(|| NodeRef {
            doc: Arc::clone(&self.data),
            id,
        })
    }

    pub fn len(&self) -> usize {
        self.data.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.nodes.is_empty()
    }

    pub fn base_uri(&self) -> Option<&str> {
        self.data.base_uri.as_deref()
    }
}

/// A handle to one node of a [`Document`].
#[derive(Clone)]
pub struct NodeRef {
    doc: Arc<DocumentData>,
    id: NodeId,
}

impl NodeRef {
    pub fn id(&self) -> NodeId {
        self.id
    }

    fn data(&self) -> &NodeData {
        &self.doc.nodes[self.id.0]
    }

    fn at(&self, id: NodeId) -> NodeRef {
        NodeRef {
            doc: Arc::clone(&self.doc),
            id,
        }
    }

    fn doc_key(&self) -> usize {
        Arc::as_ptr(&self.doc) as usize
    }
}

impl fmt::Debug for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeRef")
            .field("kind", &self.data().kind)
            .field("path", &self.metapath())
            .finish()
    }
}

impl PartialEq for NodeRef {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.doc, &other.doc) && self.id == other.id
    }
}

impl Eq for NodeRef {}

impl Hash for NodeRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.doc_key().hash(state);
        self.id.hash(state);
    }
}

impl PartialOrd for NodeRef {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Document order within one document; documents order by identity.
impl Ord for NodeRef {
    fn cmp(&self, other: &Self) -> Ordering {
        self.doc_key()
            .cmp(&other.doc_key())
            .then_with(|| self.data().order.cmp(&other.data().order))
    }
}

impl NodeItem for NodeRef {
    fn kind(&self) -> NodeKind {
        self.data().kind
    }

    fn name(&self) -> Option<&QName> {
        self.data().definition.as_deref().map(Definition::name)
    }

    fn definition(&self) -> Option<&Definition> {
        self.data().definition.as_deref()
    }

    fn value(&self) -> Option<&str> {
        self.data().value.as_deref()
    }

    fn parent(&self) -> Option<Self> {
        self.data().parent.map(|id| self.at(id))
    }

    fn flags(&self) -> Vec<Self> {
        self.data().flags.values().map(|id| self.at(*id)).collect()
    }

    fn flag_by_name(&self, name: &QName) -> Option<Self> {
        self.data().flags.get(name).map(|id| self.at(*id))
    }

    fn model_items(&self) -> Vec<Self> {
        self.data()
            .model
            .values()
            .flatten()
            .map(|id| self.at(*id))
            .collect()
    }

    fn model_items_by_name(&self, name: &QName) -> Vec<Self> {
        self.data()
            .model
            .get(name)
            .map(|ids| ids.iter().map(|id| self.at(*id)).collect())
            .unwrap_or_default()
    }

    fn location(&self) -> Option<Location> {
        self.data().location
    }

    fn base_uri(&self) -> Option<&str> {
        self.doc.base_uri.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datatype::DataType;

    struct Defs {
        catalog: Arc<Definition>,
        group: Arc<Definition>,
        title: Arc<Definition>,
        id: Arc<Definition>,
    }

    fn defs() -> Defs {
        Defs {
            catalog: Arc::new(Definition::assembly("catalog")),
            group: Arc::new(Definition::assembly("group").with_occurs(0, None)),
            title: Arc::new(Definition::field("title", DataType::String)),
            id: Arc::new(Definition::flag("id", DataType::Token)),
        }
    }

    fn sample() -> Document {
        let d = defs();
        let builder = DocumentBuilder::new(Some("file:///catalog.xml"));
        let catalog = builder.new_assembly(builder.root(), d.catalog.clone()).unwrap();
        builder.new_flag(catalog, d.id.clone(), "cat").unwrap();
        builder.new_field(catalog, d.title.clone(), "Catalog").unwrap();
        let g1 = builder.new_assembly(catalog, d.group.clone()).unwrap();
        builder.new_flag(g1, d.id.clone(), "g1").unwrap();
        let g2 = builder.new_assembly(catalog, d.group.clone()).unwrap();
        builder.new_flag(g2, d.id.clone(), "g2").unwrap();
        builder.build().unwrap()
    }

    #[test]
    fn test_navigation() {
        let doc = sample();
        let root = doc.root();
        assert_eq!(root.kind(), NodeKind::Document);
        assert!(root.name().is_none());

        let catalog = &root.model_items()[0];
        assert_eq!(catalog.name().unwrap().local_name(), "catalog");
        assert_eq!(catalog.flag_by_name(&"id".into()).unwrap().value(), Some("cat"));
        assert_eq!(catalog.model_items_by_name(&"group".into()).len(), 2);
        assert_eq!(catalog.parent().unwrap(), root);
        assert_eq!(catalog.base_uri(), Some("file:///catalog.xml"));
    }

    #[test]
    fn test_metapath() {
        let doc = sample();
        let catalog = doc.root().model_items()[0].clone();
        let g2 = catalog.model_items_by_name(&"group".into())[1].clone();
        assert_eq!(g2.metapath(), "/catalog[1]/group[2]");
        let flag = g2.flag_by_name(&"id".into()).unwrap();
        assert_eq!(flag.metapath(), "/catalog[1]/group[2]/@id");
        assert_eq!(doc.root().metapath(), "/");
    }

    #[test]
    fn test_document_order() {
        let doc = sample();
        let catalog = doc.root().model_items()[0].clone();
        let mut nodes = catalog.children();
        nodes.reverse();
        nodes.sort();
        let names: Vec<String> = nodes
            .iter()
            .map(|n| n.name().unwrap().local_name().to_string())
            .collect();
        assert_eq!(names, vec!["id", "title", "group", "group"]);
        assert!(doc.root() < catalog);
    }

    #[test]
    fn test_rejects_invalid_values_and_parents() {
        let d = defs();
        let builder = DocumentBuilder::new(None::<String>);
        let catalog = builder.new_assembly(builder.root(), d.catalog.clone()).unwrap();
        assert!(matches!(
            builder.new_field(catalog, d.title.clone(), " bad "),
            Err(MdmError::InvalidValue { .. })
        ));
        assert!(matches!(
            builder.new_assembly(builder.root(), d.catalog.clone()),
            Err(MdmError::DuplicateRoot)
        ));
        let flag = builder.new_flag(catalog, d.id.clone(), "x").unwrap();
        assert!(matches!(
            builder.new_field(flag, d.title.clone(), "t"),
            Err(MdmError::InvalidParent { .. })
        ));
        assert!(matches!(
            builder.new_flag(catalog, d.id.clone(), "y"),
            Err(MdmError::DuplicateFlag(_))
        ));
        assert!(matches!(
            builder.new_field(catalog, d.group.clone(), "t"),
            Err(MdmError::DefinitionKind { .. })
        ));
    }

    #[test]
    fn test_concurrent_insertion() {
        let d = defs();
        let builder = DocumentBuilder::new(None::<String>);
        let catalog = builder.new_assembly(builder.root(), d.catalog.clone()).unwrap();

        std::thread::scope(|scope| {
            for t in 0..4 {
                let builder = &builder;
                let group = d.group.clone();
                let id = d.id.clone();
                scope.spawn(move || {
                    for i in 0..25 {
                        let g = builder.new_assembly(catalog, group.clone()).unwrap();
                        builder.new_flag(g, id.clone(), format!("t{}-{}", t, i)).unwrap();
                    }
                });
            }
        });

        let doc = builder.build().unwrap();
        let catalog = doc.root().model_items()[0].clone();
        let groups = catalog.model_items_by_name(&"group".into());
        assert_eq!(groups.len(), 100);
        for t in 0..4 {
            let prefix = format!("t{}-", t);
            let seen: Vec<usize> = groups
                .iter()
                .filter_map(|g| g.flag_by_name(&"id".into()))
                .filter_map(|f| f.value().and_then(|v| v.strip_prefix(&prefix)).map(str::to_string))
                .map(|n| n.parse().unwrap())
                .collect();
            assert_eq!(seen, (0..25).collect::<Vec<_>>());
        }
    }

    #[test]
    fn test_detached_tree() {
        let d = defs();
        let builder = DocumentBuilder::detached(d.group.clone(), None::<String>).unwrap();
        builder.new_flag(builder.root(), d.id.clone(), "solo").unwrap();
        let doc = builder.build().unwrap();
        let root = doc.root();
        assert_eq!(root.kind(), NodeKind::Assembly);
        assert!(root.parent().is_none());
        assert_eq!(root.metapath(), "/group[1]");
        assert!(DocumentBuilder::detached(d.title.clone(), None::<String>).is_err());
    }
}
