use crate::error::ConstraintError;
use crate::key_field::Key;
use indexmap::IndexMap;
use metaschema_mdm::NodeItem;
use std::sync::Mutex;

/// Nodes keyed by their composite key.
///
/// `put` and `get` are serialized, so constraints racing to register the same key see
/// one consistent winner: the first writer keeps the entry and every later writer is
/// handed the node already registered.
#[derive(Debug)]
pub struct Index<N> {
    name: String,
    entries: Mutex<IndexMap<Key, N>>,
}

impl<N: NodeItem> Index<N> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: Mutex::new(IndexMap::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Registers `node` under `key`. Returns the node that already holds the key, in which
    /// case the index is left unchanged. A key whose components are all absent is never
    /// registered.
    pub fn put(&self, key: Key, node: N) -> Result<Option<N>, ConstraintError> {
        if key.iter().all(Option::is_none) {
            return Ok(None);
        }
        let mut entries = self.lock()?;
        match entries.get(&key) {
            Some(existing) => Ok(Some(existing.clone())),
            None => {
                entries.insert(key, node);
                Ok(None)
            }
        }
    }

    pub fn get(&self, key: &[Option<String>]) -> Result<Option<N>, ConstraintError> {
        Ok(self.lock()?.get(key).cloned())
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, IndexMap<Key, N>>, ConstraintError> {
        self.entries
            .lock()
            .map_err(|_| ConstraintError::usage(format!("index '{}' lock poisoned", self.name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use metaschema_mdm::{DataType, Definition, DocumentBuilder, NodeRef};
    use std::sync::Arc;
    use std::thread;

    fn nodes(count: usize) -> Vec<NodeRef> {
        let builder = DocumentBuilder::new(None::<String>);
        let root = builder
            .new_assembly(builder.root(), Arc::new(Definition::assembly("catalog")))
            .unwrap();
        let def = Arc::new(Definition::field("item", DataType::String));
        let ids: Vec<_> = (0..count)
            .map(|i| builder.new_field(root, Arc::clone(&def), format!("v{}", i)).unwrap())
            .collect();
        let doc = builder.build().unwrap();
        ids.into_iter().map(|id| doc.node(id).unwrap()).collect()
    }

    fn key(parts: &[&str]) -> Key {
        parts.iter().map(|p| Some(p.to_string())).collect()
    }

    #[test]
    fn test_first_writer_wins() {
        let nodes = nodes(2);
        let index = Index::new("idx");
        assert_eq!(index.put(key(&["a", "b"]), nodes[0].clone()).unwrap(), None);
        assert_eq!(
            index.put(key(&["a", "b"]), nodes[1].clone()).unwrap(),
            Some(nodes[0].clone())
        );
        assert_eq!(index.get(&key(&["a", "b"])).unwrap(), Some(nodes[0].clone()));
        assert_eq!(index.get(&key(&["a"])).unwrap(), None);
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_absent_keys_are_not_registered() {
        let nodes = nodes(2);
        let index = Index::new("idx");
        assert_eq!(index.put(vec![None, None], nodes[0].clone()).unwrap(), None);
        assert_eq!(index.put(vec![None, None], nodes[1].clone()).unwrap(), None);
        assert!(index.is_empty());
        // a partially absent key is still a key
        index.put(vec![Some("a".into()), None], nodes[0].clone()).unwrap();
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_concurrent_put_has_one_winner() {
        let nodes = nodes(8);
        let index = Arc::new(Index::new("idx"));
        let handles: Vec<_> = nodes
            .into_iter()
            .map(|node| {
                let index = Arc::clone(&index);
                thread::spawn(move || index.put(key(&["same"]), node).unwrap())
            })
            .collect();
        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(Option::is_none)
            .count();
        assert_eq!(winners, 1);
        assert_eq!(index.len(), 1);
    }
}
