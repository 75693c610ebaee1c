// Tree Cache: the latest full snapshot per root, replaced wholesale.
//
// Snapshots are immutable once stored (`Arc<Node>`); the only in-place edits
// are field patches on the flat layer list (lock state). Every fetch takes a
// generation ticket and a response older than what is already stored is
// discarded.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;

use strata_common::types::{LayerSummary, Node, RootKey};

/// Issued before a fetch starts; presented when its response is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct FetchTicket(u64);

#[derive(Debug, Clone)]
pub struct CachedTree {
    pub tree: Arc<Node>,
    pub layers: Arc<Vec<LayerSummary>>,
    pub generation: u64,
    pub fetched_at: DateTime<Utc>,
    /// Set when a mutation or structural event has outdated the snapshot and
    /// the follow-up reload has not landed yet.
    pub stale: bool,
}

#[derive(Debug, Default)]
pub struct TreeCache {
    entries: HashMap<RootKey, CachedTree>,
    next_generation: u64,
}

impl TreeCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin_fetch(&mut self) -> FetchTicket {
        self.next_generation += 1;
        FetchTicket(self.next_generation)
    }

    /// Store a fetched snapshot. Returns `false` (and keeps the current entry)
    /// when a newer fetch has already been stored for this root.
    pub fn store(
        &mut self,
        root: &RootKey,
        ticket: FetchTicket,
        tree: Node,
        layers: Vec<LayerSummary>,
    ) -> bool {
        if let Some(current) = self.entries.get(root) {
            if current.generation > ticket.0 {
                debug!(
                    root = %root,
                    generation = ticket.0,
                    current = current.generation,
                    "discarding stale tree response"
                );
                return false;
            }
        }
        debug!(
            root = %root,
            generation = ticket.0,
            nodes = tree.subtree_len(),
            "tree snapshot stored"
        );
        self.entries.insert(
            root.clone(),
            CachedTree {
                tree: Arc::new(tree),
                layers: Arc::new(layers),
                generation: ticket.0,
                fetched_at: Utc::now(),
                stale: false,
            },
        );
        true
    }

    pub fn get(&self, root: &RootKey) -> Option<&CachedTree> {
        self.entries.get(root)
    }

    pub fn tree(&self, root: &RootKey) -> Option<Arc<Node>> {
        self.entries.get(root).map(|entry| Arc::clone(&entry.tree))
    }

    pub fn layers(&self, root: &RootKey) -> Option<Arc<Vec<LayerSummary>>> {
        self.entries.get(root).map(|entry| Arc::clone(&entry.layers))
    }

    /// Mark a snapshot outdated. It stays readable until replaced.
    pub fn invalidate(&mut self, root: &RootKey) {
        if let Some(entry) = self.entries.get_mut(root) {
            entry.stale = true;
        }
    }

    pub fn is_stale(&self, root: &RootKey) -> bool {
        self.entries.get(root).is_some_and(|entry| entry.stale)
    }

    pub fn evict(&mut self, root: &RootKey) -> Option<CachedTree> {
        self.entries.remove(root)
    }

    /// Patch the lock state of a listed layer. Returns whether it was loaded.
    pub fn patch_layer_lock(
        &mut self,
        root: &RootKey,
        layer_id: &str,
        locked: bool,
        locked_by: Option<String>,
    ) -> bool {
        let Some(entry) = self.entries.get_mut(root) else {
            return false;
        };
        let layers = Arc::make_mut(&mut entry.layers);
        match layers.iter_mut().find(|layer| layer.id == layer_id) {
            Some(layer) => {
                layer.locked = locked;
                layer.locked_by = if locked { locked_by } else { None };
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn root() -> RootKey {
        RootKey::Workspace("w1".into())
    }

    fn tree(name: &str) -> Node {
        Node::root("root").with_children(vec![Node::layer("L1", name)])
    }

    fn layer(id: &str) -> LayerSummary {
        LayerSummary {
            id: id.into(),
            name: id.to_lowercase(),
            label: String::new(),
            locked: false,
            locked_by: None,
        }
    }

    #[test]
    fn newer_ticket_replaces_snapshot() {
        let mut cache = TreeCache::new();
        let first = cache.begin_fetch();
        let second = cache.begin_fetch();
        assert!(cache.store(&root(), first, tree("old"), vec![]));
        assert!(cache.store(&root(), second, tree("new"), vec![]));
        assert_eq!(cache.tree(&root()).unwrap().children[0].name, "new");
    }

    #[test]
    fn late_response_from_older_fetch_is_discarded() {
        let mut cache = TreeCache::new();
        let first = cache.begin_fetch();
        let second = cache.begin_fetch();
        assert!(cache.store(&root(), second, tree("fresh"), vec![]));
        assert!(!cache.store(&root(), first, tree("stale"), vec![]));
        assert_eq!(cache.tree(&root()).unwrap().children[0].name, "fresh");
    }

    #[test]
    fn tickets_are_per_cache_not_per_root() {
        let mut cache = TreeCache::new();
        let other = RootKey::Context("c1".into());
        let a = cache.begin_fetch();
        let b = cache.begin_fetch();
        assert!(cache.store(&other, b, tree("ctx"), vec![]));
        assert!(cache.store(&root(), a, tree("ws"), vec![]));
    }

    #[test]
    fn invalidated_snapshot_stays_readable() {
        let mut cache = TreeCache::new();
        let ticket = cache.begin_fetch();
        cache.store(&root(), ticket, tree("work"), vec![]);
        cache.invalidate(&root());
        assert!(cache.is_stale(&root()));
        assert_eq!(cache.tree(&root()).unwrap().children[0].name, "work");

        let ticket = cache.begin_fetch();
        cache.store(&root(), ticket, tree("work"), vec![]);
        assert!(!cache.is_stale(&root()));
    }

    #[test]
    fn lock_patch_does_not_touch_held_snapshots() {
        let mut cache = TreeCache::new();
        let ticket = cache.begin_fetch();
        cache.store(&root(), ticket, tree("work"), vec![layer("L1")]);
        let held = cache.layers(&root()).unwrap();

        assert!(cache.patch_layer_lock(&root(), "L1", true, Some("ana".into())));
        assert!(!held[0].locked);
        let patched = cache.layers(&root()).unwrap();
        assert!(patched[0].locked);
        assert_eq!(patched[0].locked_by.as_deref(), Some("ana"));

        assert!(!cache.patch_layer_lock(&root(), "missing", true, None));
    }
}
