//! Document-wide identity index
//!
//! Maps id attribute values to the attached elements that carry them.
//! The index is rebuilt when a document is parsed and updated in place
//! by every mutation that attaches, detaches or renames an element, so a
//! lookup always reflects the current tree.

use std::collections::HashMap;

use log::trace;

use crate::documents::NodeId;

/// Identity index: id value to carrying elements, in insertion order
#[derive(Debug, Clone, Default)]
pub struct IdentityIndex {
    ids: HashMap<String, Vec<NodeId>>,
}

impl IdentityIndex {
    /// Create an empty index
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `node` carries `id`
    pub fn insert(&mut self, id: &str, node: NodeId) {
        let nodes = self.ids.entry(id.to_string()).or_default();
        if !nodes.contains(&node) {
            nodes.push(node);
            trace!(id = id, node = node.to_string(); "Identity indexed");
        }
    }

    /// Forget that `node` carries `id`
    pub fn remove(&mut self, id: &str, node: NodeId) {
        if let Some(nodes) = self.ids.get_mut(id) {
            nodes.retain(|n| *n != node);
            if nodes.is_empty() {
                self.ids.remove(id);
            }
            trace!(id = id, node = node.to_string(); "Identity unindexed");
        }
    }

    /// Elements carrying `id`; duplicates keep document insertion order
    pub fn lookup(&self, id: &str) -> &[NodeId] {
        self.ids.get(id).map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// Check if any element carries `id`
    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains_key(id)
    }

    /// Number of distinct ids
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Check if the index is empty
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Ids carried by more than one element, sorted
    pub fn duplicates(&self) -> Vec<&str> {
        let mut found: Vec<&str> = self
            .ids
            .iter()
            .filter(|(_, nodes)| nodes.len() > 1)
            .map(|(id, _)| id.as_str())
            .collect();
        found.sort_unstable();
        found
    }

    /// Drop every entry
    pub fn clear(&mut self) {
        self.ids.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::documents::Document;
    use crate::namespaces::QName;

    #[test]
    fn test_insert_lookup_remove() {
        let mut doc = Document::new();
        let a = doc.create_element(QName::local("a"));
        let b = doc.create_element(QName::local("b"));

        let mut index = IdentityIndex::new();
        index.insert("Task_1", a);
        index.insert("Task_1", a);
        assert_eq!(index.lookup("Task_1"), &[a]);

        index.insert("Task_1", b);
        assert_eq!(index.lookup("Task_1"), &[a, b]);
        assert_eq!(index.duplicates(), vec!["Task_1"]);

        index.remove("Task_1", a);
        assert_eq!(index.lookup("Task_1"), &[b]);
        index.remove("Task_1", b);
        assert!(!index.contains("Task_1"));
        assert!(index.lookup("Task_1").is_empty());
        assert!(index.is_empty());
    }
}
