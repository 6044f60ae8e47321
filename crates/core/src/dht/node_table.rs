use crate::identity::RouterId;
use hiddenmesh_common::TimeMs;
use std::collections::HashMap;

/// A peer known to the DHT
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeEntry {
    pub router_id: RouterId,
    pub added_at: TimeMs,
}

/// Peers we can hand DHT traffic to, searched by XOR closeness
///
/// Only routers with a live, verified session are kept here; the router
/// removes an entry as soon as its session closes.
#[derive(Debug)]
pub struct NodeTable {
    /// Our router ID
    local_id: RouterId,

    nodes: HashMap<RouterId, NodeEntry>,
}

impl NodeTable {
    pub fn new(local_id: RouterId) -> Self {
        Self {
            local_id,
            nodes: HashMap::new(),
        }
    }

    pub fn local_id(&self) -> RouterId {
        self.local_id
    }

    /// Add a peer, returning false if it was already known or is ourselves
    pub fn insert(&mut self, router_id: RouterId, now: TimeMs) -> bool {
        if router_id == self.local_id || self.nodes.contains_key(&router_id) {
            return false;
        }
        self.nodes.insert(
            router_id,
            NodeEntry {
                router_id,
                added_at: now,
            },
        );
        true
    }

    pub fn remove(&mut self, router_id: &RouterId) -> Option<NodeEntry> {
        self.nodes.remove(router_id)
    }

    pub fn contains(&self, router_id: &RouterId) -> bool {
        self.nodes.contains_key(router_id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Get the `count` closest nodes to a target, skipping `exclude`
    pub fn closest_nodes(&self, target: &RouterId, count: usize, exclude: &[RouterId]) -> Vec<RouterId> {
        let mut all_nodes: Vec<RouterId> = self
            .nodes
            .keys()
            .filter(|id| !exclude.contains(*id))
            .copied()
            .collect();

        // Sort by distance to target
        all_nodes.sort_by_key(|id| id.distance(target));

        all_nodes.truncate(count);
        all_nodes
    }

    /// The closest node that is strictly closer to `target` than we are
    pub fn closer_than_us(&self, target: &RouterId, exclude: &[RouterId]) -> Option<RouterId> {
        let ours = self.local_id.distance(target);
        self.closest_nodes(target, 1, exclude)
            .into_iter()
            .find(|id| id.distance(target) < ours)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(byte: u8) -> RouterId {
        RouterId::from_bytes([byte; 32])
    }

    #[test]
    fn test_insert_rejects_self_and_duplicates() {
        let mut table = NodeTable::new(id(0));
        assert!(!table.insert(id(0), 1));
        assert!(table.insert(id(1), 1));
        assert!(!table.insert(id(1), 2));
        assert_eq!(table.len(), 1);
        assert!(table.remove(&id(1)).is_some());
        assert!(table.is_empty());
    }

    #[test]
    fn test_closest_nodes_sorted_and_filtered() {
        let mut table = NodeTable::new(id(0));
        for b in [0x10, 0x20, 0x30, 0x80] {
            table.insert(id(b), 0);
        }

        let target = id(0x21);
        let closest = table.closest_nodes(&target, 2, &[]);
        assert_eq!(closest, vec![id(0x20), id(0x30)]);

        let closest = table.closest_nodes(&target, 2, &[id(0x20)]);
        assert_eq!(closest, vec![id(0x30), id(0x10)]);
    }

    #[test]
    fn test_closer_than_us() {
        let mut table = NodeTable::new(id(0x20));
        table.insert(id(0x80), 0);
        // 0x80 is farther from 0x21 than we are
        assert_eq!(table.closer_than_us(&id(0x21), &[]), None);

        table.insert(id(0x21), 0);
        assert_eq!(table.closer_than_us(&id(0x21), &[]), Some(id(0x21)));
        assert_eq!(table.closer_than_us(&id(0x21), &[id(0x21)]), None);
    }
}
