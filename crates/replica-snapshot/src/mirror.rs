//! Bidirectional identity index between live nodes and serialized ids.

use std::collections::HashMap;
use std::hash::Hash;

use crate::types::{SerializedNode, UNKNOWN_NODE};

/// Identity map between host nodes and their serialized descriptors.
///
/// Two maps are kept: id to node, and node to the node's serialized meta
/// (stored without children). For every id in the first map, the meta of
/// its node carries that id. The mirror holds no tree structure; callers
/// that need descendants supply them.
///
/// Capture and replay each own a separate `Mirror`.
#[derive(Debug, Clone)]
pub struct Mirror<N> {
    id_node_map: HashMap<i64, N>,
    node_meta_map: HashMap<N, SerializedNode>,
}

impl<N> Default for Mirror<N> {
    fn default() -> Self {
        Self {
            id_node_map: HashMap::new(),
            node_meta_map: HashMap::new(),
        }
    }
}

impl<N: Copy + Eq + Hash> Mirror<N> {
    /// An empty mirror.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The id recorded for `node`, or [`UNKNOWN_NODE`].
    #[must_use]
    pub fn get_id(&self, node: N) -> i64 {
        self.node_meta_map
            .get(&node)
            .map_or(UNKNOWN_NODE, |meta| meta.id)
    }

    /// The node bound to `id`.
    #[must_use]
    pub fn get_node(&self, id: i64) -> Option<N> {
        self.id_node_map.get(&id).copied()
    }

    /// Every bound id, in ascending order.
    #[must_use]
    pub fn get_ids(&self) -> Vec<i64> {
        let mut ids: Vec<i64> = self.id_node_map.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// The serialized meta recorded for `node`.
    #[must_use]
    pub fn get_meta(&self, node: N) -> Option<&SerializedNode> {
        self.node_meta_map.get(&node)
    }

    /// Whether `id` is bound to a node.
    #[must_use]
    pub fn has(&self, id: i64) -> bool {
        self.id_node_map.contains_key(&id)
    }

    /// Whether `node` has meta recorded.
    #[must_use]
    pub fn has_node(&self, node: N) -> bool {
        self.node_meta_map.contains_key(&node)
    }

    /// Register `node` under `meta.id`, in both directions.
    pub fn add(&mut self, node: N, meta: &SerializedNode) {
        let _ = self.id_node_map.insert(meta.id, node);
        let _ = self.node_meta_map.insert(node, meta.shallow());
    }

    /// Rebind `id` to `node`. The meta recorded for the previous node moves
    /// with the id so the map invariant holds.
    pub fn replace(&mut self, id: i64, node: N) {
        if let Some(old) = self.id_node_map.insert(id, node)
            && old != node
            && let Some(meta) = self.node_meta_map.remove(&old)
        {
            let _ = self.node_meta_map.insert(node, meta);
        }
    }

    /// Unbind `node` and, through `children`, its descendants from the id
    /// map. Meta entries stay so a later capture can still find them.
    pub fn remove_node_from_map<F>(&mut self, node: N, children: &F)
    where
        F: Fn(N) -> Vec<N>,
    {
        let id = self.get_id(node);
        let _ = self.id_node_map.remove(&id);
        for child in children(node) {
            self.remove_node_from_map(child, children);
        }
    }

    /// Drop the meta for a node that no longer exists.
    pub fn forget_node(&mut self, node: N) {
        if let Some(meta) = self.node_meta_map.remove(&node)
            && self.id_node_map.get(&meta.id) == Some(&node)
        {
            let _ = self.id_node_map.remove(&meta.id);
        }
    }

    /// Clear both maps.
    pub fn reset(&mut self) {
        self.id_node_map.clear();
        self.node_meta_map.clear();
    }

    /// Number of bound ids.
    #[must_use]
    pub fn len(&self) -> usize {
        self.id_node_map.len()
    }

    /// Whether no id is bound.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.id_node_map.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ElementNode, NodeData};

    fn element(id: i64) -> SerializedNode {
        SerializedNode {
            id,
            root_id: None,
            data: NodeData::Element(ElementNode {
                tag_name: "div".to_string(),
                ..ElementNode::default()
            }),
        }
    }

    #[test]
    fn test_unknown_lookups() {
        let mirror: Mirror<u32> = Mirror::new();
        assert_eq!(mirror.get_id(7), UNKNOWN_NODE);
        assert_eq!(mirror.get_node(1), None);
        assert!(mirror.get_meta(7).is_none());
    }

    #[test]
    fn test_add_binds_both_directions() {
        let mut mirror = Mirror::new();
        mirror.add(10u32, &element(1));
        assert_eq!(mirror.get_id(10), 1);
        assert_eq!(mirror.get_node(1), Some(10));
        assert!(mirror.has(1));
        assert!(mirror.has_node(10));
    }

    #[test]
    fn test_replace_moves_meta() {
        let mut mirror = Mirror::new();
        mirror.add(10u32, &element(1));
        mirror.replace(1, 20);
        assert_eq!(mirror.get_node(1), Some(20));
        assert_eq!(mirror.get_id(20), 1);
        assert!(!mirror.has_node(10));
    }

    #[test]
    fn test_remove_keeps_meta() {
        let mut mirror = Mirror::new();
        mirror.add(10u32, &element(1));
        mirror.add(11u32, &element(2));
        mirror.remove_node_from_map(10, &|n| if n == 10 { vec![11] } else { vec![] });
        assert!(mirror.get_ids().is_empty());
        assert_eq!(mirror.get_id(11), 2);
    }

    #[test]
    fn test_forget_and_reset() {
        let mut mirror = Mirror::new();
        mirror.add(10u32, &element(1));
        mirror.add(11u32, &element(2));
        mirror.forget_node(10);
        assert_eq!(mirror.get_ids(), vec![2]);
        mirror.reset();
        assert!(mirror.is_empty());
        assert!(!mirror.has_node(11));
    }
}
