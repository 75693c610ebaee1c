// In-process authority implementing `TreeApi`.
//
// Holds trees, layer metadata and document placements behind a mutex and
// applies the same rules a server would. Backs the test suites and records
// every call it receives so tests can assert on remote traffic.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

use strata_common::path::{is_within, normalize_path, parent, resolve, segments, walk, ROOT_PATH};
use strata_common::protocol::rest::{
    DocumentQuery, DocumentTransferRequest, InsertRequest, LayerSetRequest, RemoveRequest,
    RenameLayerRequest, TransferRequest,
};
use strata_common::types::{
    DocumentId, DocumentPage, DocumentRef, LayerSummary, Node, NodeId, RootKey,
};

use super::TreeApi;
use crate::error::ClientError;

const LOCK_OWNER: &str = "memory";

#[derive(Debug, Default)]
pub struct MemoryTreeApi {
    state: Mutex<Authority>,
}

#[derive(Debug, Default)]
struct Authority {
    trees: HashMap<RootKey, Node>,
    locks: HashMap<NodeId, String>,
    documents: BTreeMap<DocumentId, StoredDocument>,
    placements: HashMap<NodeId, BTreeSet<DocumentId>>,
    next_node: u64,
    calls: Vec<String>,
    failures: HashMap<String, VecDeque<ClientError>>,
}

#[derive(Debug, Clone)]
struct StoredDocument {
    document: DocumentRef,
    tags: BTreeSet<String>,
}

impl MemoryTreeApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tree(self, root: RootKey, tree: Node) -> Self {
        self.set_tree(root, tree);
        self
    }

    /// Replace a tree wholesale, as another client's edits would.
    pub fn set_tree(&self, root: RootKey, tree: Node) {
        self.lock().trees.insert(root, tree);
    }

    pub fn tree(&self, root: &RootKey) -> Option<Node> {
        self.lock().trees.get(root).cloned()
    }

    /// Place a document under the layer at `path`, tagged with `tags`.
    pub fn add_document<I, S>(
        &self,
        root: &RootKey,
        path: &str,
        document: DocumentRef,
        tags: I,
    ) -> Result<(), ClientError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut state = self.lock();
        let layer_id = state.layer_id_at(root, path)?;
        state.placements.entry(layer_id).or_default().insert(document.id);
        let tags = tags.into_iter().map(Into::into).collect();
        state.documents.insert(document.id, StoredDocument { document, tags });
        Ok(())
    }

    /// Current server-side copy of a document.
    pub fn document(&self, id: DocumentId) -> Option<DocumentRef> {
        self.lock().documents.get(&id).map(|stored| stored.document.clone())
    }

    /// Documents placed directly on a layer.
    pub fn placements(&self, layer_id: &str) -> Vec<DocumentId> {
        let state = self.lock();
        state.placements.get(layer_id).map(|ids| ids.iter().copied().collect()).unwrap_or_default()
    }

    /// Make the next call to `operation` fail with `error`. Queued failures
    /// are consumed in order.
    pub fn fail_next(&self, operation: &str, error: ClientError) {
        self.lock().failures.entry(operation.to_string()).or_default().push_back(error);
    }

    /// Names of every operation received so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    pub fn call_count(&self, operation: &str) -> usize {
        self.lock().calls.iter().filter(|call| *call == operation).count()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    fn lock(&self) -> MutexGuard<'_, Authority> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Record the call, honour any queued failure, then run `apply`.
    fn call<T>(
        &self,
        operation: &str,
        apply: impl FnOnce(&mut Authority) -> Result<T, ClientError>,
    ) -> Result<T, ClientError> {
        let mut state = self.lock();
        state.calls.push(operation.to_string());
        if let Some(error) = state.failures.get_mut(operation).and_then(VecDeque::pop_front) {
            return Err(error);
        }
        apply(&mut *state)
    }
}

// ── Authority rules ────────────────────────────────────────────────

impl Authority {
    fn tree(&self, root: &RootKey) -> Result<&Node, ClientError> {
        self.trees.get(root).ok_or_else(|| ClientError::NotFound(format!("unknown root {root}")))
    }

    fn tree_mut(&mut self, root: &RootKey) -> Result<&mut Node, ClientError> {
        self.trees
            .get_mut(root)
            .ok_or_else(|| ClientError::NotFound(format!("unknown root {root}")))
    }

    fn layer_id_at(&self, root: &RootKey, path: &str) -> Result<NodeId, ClientError> {
        resolve(self.tree(root)?, path)
            .map(|node| node.id.clone())
            .ok_or_else(|| ClientError::not_found_path(path))
    }

    fn fresh_id(&mut self) -> NodeId {
        self.next_node += 1;
        format!("n{}", self.next_node)
    }

    fn summaries(&self, root: &RootKey) -> Result<Vec<LayerSummary>, ClientError> {
        let mut seen = BTreeSet::new();
        let mut layers = Vec::new();
        for (_, node) in walk(self.tree(root)?) {
            if node.is_root() || !seen.insert(node.id.clone()) {
                continue;
            }
            layers.push(self.summary(node));
        }
        Ok(layers)
    }

    fn summary(&self, node: &Node) -> LayerSummary {
        let locked_by = self.locks.get(&node.id).cloned();
        LayerSummary {
            id: node.id.clone(),
            name: node.name.clone(),
            label: node.label.clone(),
            locked: locked_by.is_some(),
            locked_by,
        }
    }

    fn summary_by_id(&self, root: &RootKey, layer_id: &str) -> Result<LayerSummary, ClientError> {
        self.summaries(root)?
            .into_iter()
            .find(|layer| layer.id == layer_id)
            .ok_or_else(|| ClientError::NotFound(format!("no layer with id `{layer_id}`")))
    }

    fn query(&self, root: &RootKey, query: &DocumentQuery) -> Result<DocumentPage, ClientError> {
        let layer_id = self.layer_id_at(root, &query.path)?;
        let wanted: Vec<&String> = query.features.iter().chain(&query.filters).collect();
        let matching: Vec<&StoredDocument> = self
            .placements
            .get(&layer_id)
            .into_iter()
            .flatten()
            .filter_map(|id| self.documents.get(id))
            .filter(|stored| wanted.iter().all(|tag| stored.tags.contains(*tag)))
            .collect();

        let page_size = query.page_size.max(1) as usize;
        let skip = (query.page.max(1) as usize - 1) * page_size;
        Ok(DocumentPage {
            total_count: matching.len() as u64,
            documents: matching
                .into_iter()
                .skip(skip)
                .take(page_size)
                .map(|stored| stored.document.clone())
                .collect(),
        })
    }

    fn insert(&mut self, root: &RootKey, request: &InsertRequest) -> Result<(), ClientError> {
        let path = normalize_path(&request.path)?;
        let parts: Vec<String> = segments(&path)?.into_iter().map(str::to_string).collect();
        let Some((leaf, ancestors)) = parts.split_last() else {
            return Err(ClientError::Conflict("the root already exists".into()));
        };

        let mut created = Vec::new();
        for _ in 0..=ancestors.len() {
            created.push(self.fresh_id());
        }
        let tree = self.tree_mut(root)?;
        let mut current = tree;
        for (depth, name) in ancestors.iter().enumerate() {
            if current.child(name).is_none() {
                if !request.auto_create {
                    let missing = format!("/{}", parts[..=depth].join("/"));
                    return Err(ClientError::NotFound(format!(
                        "ancestor `{missing}` does not exist"
                    )));
                }
                current.children.push(Node::layer(created[depth].clone(), name.clone()));
            }
            current = current
                .children
                .iter_mut()
                .find(|child| child.name == *name)
                .ok_or_else(|| ClientError::not_found_path(&path))?;
        }
        if current.child(leaf).is_some() {
            return Err(ClientError::Conflict(format!("`{path}` already exists")));
        }
        current.children.push(Node::layer(created[ancestors.len()].clone(), leaf.clone()));
        Ok(())
    }

    fn remove(&mut self, root: &RootKey, request: &RemoveRequest) -> Result<(), ClientError> {
        let path = normalize_path(&request.path)?;
        let parent_path = parent(&path)
            .ok_or_else(|| ClientError::Conflict("the root cannot be removed".into()))?;
        let tree = self.tree_mut(root)?;
        let node = resolve(tree, &path).ok_or_else(|| ClientError::not_found_path(&path))?;
        if node.has_children() && !request.recursive {
            return Err(ClientError::Conflict(format!("`{path}` has children")));
        }
        let name = node.name.clone();
        let parent_node = node_at_mut(tree, &parent_path)
            .ok_or_else(|| ClientError::not_found_path(&parent_path))?;
        parent_node.children.retain(|child| child.name != name);
        Ok(())
    }

    fn transfer(
        &mut self,
        root: &RootKey,
        request: &TransferRequest,
        keep_source: bool,
    ) -> Result<(), ClientError> {
        let from = normalize_path(&request.from)?;
        let to = normalize_path(&request.to)?;
        if from == ROOT_PATH {
            return Err(ClientError::Conflict("the root cannot be moved or copied".into()));
        }
        if is_within(&to, &from) {
            return Err(ClientError::InvalidOperation(format!(
                "`{to}` lies inside `{from}`"
            )));
        }

        let tree = self.tree(root)?;
        let source = resolve(tree, &from).ok_or_else(|| ClientError::not_found_path(&from))?;
        let destination = resolve(tree, &to).ok_or_else(|| ClientError::not_found_path(&to))?;
        if destination.child(&source.name).is_some() {
            return Err(ClientError::Conflict(format!(
                "`{to}` already has a layer named `{}`",
                source.name
            )));
        }
        if source.has_children() && !request.recursive && !keep_source {
            return Err(ClientError::Conflict(format!("`{from}` has children")));
        }

        let mut moved = source.clone();
        if keep_source {
            if !request.recursive {
                moved.children.clear();
            }
            self.reassign_ids(&mut moved);
        } else {
            let parent_path = parent(&from).unwrap_or_else(|| ROOT_PATH.to_string());
            let tree = self.tree_mut(root)?;
            if let Some(parent_node) = node_at_mut(tree, &parent_path) {
                parent_node.children.retain(|child| child.name != moved.name);
            }
        }

        let tree = self.tree_mut(root)?;
        let destination =
            node_at_mut(tree, &to).ok_or_else(|| ClientError::not_found_path(&to))?;
        destination.children.push(moved);
        Ok(())
    }

    fn reassign_ids(&mut self, node: &mut Node) {
        let old = std::mem::replace(&mut node.id, self.fresh_id());
        if let Some(placed) = self.placements.get(&old).cloned() {
            self.placements.insert(node.id.clone(), placed);
        }
        for child in &mut node.children {
            self.reassign_ids(child);
        }
    }

    fn rename(
        &mut self,
        root: &RootKey,
        request: &RenameLayerRequest,
    ) -> Result<LayerSummary, ClientError> {
        let name = request.name.trim();
        if name.is_empty() || name.contains('/') {
            return Err(ClientError::InvalidOperation(format!(
                "`{}` is not a layer name",
                request.name
            )));
        }
        let tree = self.tree_mut(root)?;
        if tree.id == request.layer_id {
            return Err(ClientError::InvalidOperation("the root cannot be renamed".into()));
        }
        if rename_occurrences(tree, &request.layer_id, name)? == 0 {
            return Err(ClientError::NotFound(format!("no layer with id `{}`", request.layer_id)));
        }
        self.summary_by_id(root, &request.layer_id)
    }

    fn combine(
        &mut self,
        root: &RootKey,
        layer_id: &str,
        request: &LayerSetRequest,
        merge: bool,
    ) -> Result<(), ClientError> {
        self.summary_by_id(root, layer_id)?;
        let mut incoming = BTreeSet::new();
        for target in &request.targets {
            self.summary_by_id(root, target)?;
            incoming.extend(self.placements.get(target).into_iter().flatten().copied());
        }
        let placed = self.placements.entry(layer_id.to_string()).or_default();
        if merge {
            placed.extend(incoming);
        } else {
            placed.retain(|id| !incoming.contains(id));
        }
        Ok(())
    }

    fn set_lock(
        &mut self,
        root: &RootKey,
        layer_id: &str,
        locked: bool,
    ) -> Result<LayerSummary, ClientError> {
        self.summary_by_id(root, layer_id)?;
        match (locked, self.locks.contains_key(layer_id)) {
            (true, true) => {
                return Err(ClientError::Conflict(format!("layer `{layer_id}` is already locked")))
            }
            (true, false) => {
                self.locks.insert(layer_id.to_string(), LOCK_OWNER.to_string());
            }
            (false, _) => {
                self.locks.remove(layer_id);
            }
        }
        self.summary_by_id(root, layer_id)
    }

    fn delete_layer(&mut self, root: &RootKey, layer_id: &str) -> Result<(), ClientError> {
        let tree = self.tree_mut(root)?;
        if tree.id == layer_id {
            return Err(ClientError::Conflict("the root cannot be deleted".into()));
        }
        if !prune(tree, layer_id) {
            return Err(ClientError::NotFound(format!("no layer with id `{layer_id}`")));
        }
        self.placements.remove(layer_id);
        self.locks.remove(layer_id);
        Ok(())
    }

    fn transfer_documents(
        &mut self,
        root: &RootKey,
        request: &DocumentTransferRequest,
        keep_source: bool,
    ) -> Result<(), ClientError> {
        let from = self.layer_id_at(root, &request.from)?;
        let to = self.layer_id_at(root, &request.to)?;
        let source = self.placements.get(&from).cloned().unwrap_or_default();
        if let Some(missing) = request.ids.iter().find(|id| !source.contains(*id)) {
            return Err(ClientError::NotFound(format!(
                "document {missing} is not under `{}`",
                request.from
            )));
        }
        let same_layer = from == to;
        self.placements.entry(to).or_default().extend(request.ids.iter().copied());
        if !keep_source && !same_layer {
            if let Some(placed) = self.placements.get_mut(&from) {
                placed.retain(|id| !request.ids.contains(id));
            }
        }
        Ok(())
    }
}

fn node_at_mut<'a>(tree: &'a mut Node, path: &str) -> Option<&'a mut Node> {
    let parts = segments(path).ok()?;
    let mut current = tree;
    for part in parts {
        current = current.children.iter_mut().find(|child| child.name == part)?;
    }
    Some(current)
}

/// Rename every position of `id`. Fails before touching anything if any
/// position would collide with a sibling.
fn rename_occurrences(tree: &mut Node, id: &str, name: &str) -> Result<usize, ClientError> {
    fn collides(node: &Node, id: &str, name: &str) -> bool {
        let holds = node.children.iter().any(|child| child.id == id);
        (holds && node.children.iter().any(|child| child.id != id && child.name == name))
            || node.children.iter().any(|child| collides(child, id, name))
    }
    fn apply(node: &mut Node, id: &str, name: &str) -> usize {
        let mut count = 0;
        for child in &mut node.children {
            if child.id == id {
                if child.label == child.name {
                    child.label = name.to_string();
                }
                child.name = name.to_string();
                count += 1;
            }
            count += apply(child, id, name);
        }
        count
    }

    if collides(tree, id, name) {
        return Err(ClientError::Conflict(format!("a sibling is already named `{name}`")));
    }
    Ok(apply(tree, id, name))
}

/// Drop every position of `id`. Returns whether anything was removed.
fn prune(node: &mut Node, id: &str) -> bool {
    let before = node.children.len();
    node.children.retain(|child| child.id != id);
    let mut removed = node.children.len() != before;
    for child in &mut node.children {
        removed |= prune(child, id);
    }
    removed
}

impl TreeApi for MemoryTreeApi {
    async fn fetch_tree(&self, root: &RootKey) -> Result<Node, ClientError> {
        self.call("fetch_tree", |state| state.tree(root).cloned())
    }

    async fn fetch_layers(&self, root: &RootKey) -> Result<Vec<LayerSummary>, ClientError> {
        self.call("fetch_layers", |state| state.summaries(root))
    }

    async fn fetch_documents(
        &self,
        root: &RootKey,
        query: &DocumentQuery,
    ) -> Result<DocumentPage, ClientError> {
        self.call("fetch_documents", |state| state.query(root, query))
    }

    async fn insert(&self, root: &RootKey, request: &InsertRequest) -> Result<(), ClientError> {
        self.call("insert", |state| state.insert(root, request))
    }

    async fn remove(&self, root: &RootKey, request: &RemoveRequest) -> Result<(), ClientError> {
        self.call("remove", |state| state.remove(root, request))
    }

    async fn move_node(
        &self,
        root: &RootKey,
        request: &TransferRequest,
    ) -> Result<(), ClientError> {
        self.call("move_node", |state| state.transfer(root, request, false))
    }

    async fn copy_node(
        &self,
        root: &RootKey,
        request: &TransferRequest,
    ) -> Result<(), ClientError> {
        self.call("copy_node", |state| state.transfer(root, request, true))
    }

    async fn rename_layer(
        &self,
        root: &RootKey,
        request: &RenameLayerRequest,
    ) -> Result<LayerSummary, ClientError> {
        self.call("rename_layer", |state| state.rename(root, request))
    }

    async fn merge_layers(
        &self,
        root: &RootKey,
        layer_id: &str,
        request: &LayerSetRequest,
    ) -> Result<(), ClientError> {
        self.call("merge_layers", |state| state.combine(root, layer_id, request, true))
    }

    async fn subtract_layers(
        &self,
        root: &RootKey,
        layer_id: &str,
        request: &LayerSetRequest,
    ) -> Result<(), ClientError> {
        self.call("subtract_layers", |state| state.combine(root, layer_id, request, false))
    }

    async fn lock_layer(
        &self,
        root: &RootKey,
        layer_id: &str,
    ) -> Result<LayerSummary, ClientError> {
        self.call("lock_layer", |state| state.set_lock(root, layer_id, true))
    }

    async fn unlock_layer(
        &self,
        root: &RootKey,
        layer_id: &str,
    ) -> Result<LayerSummary, ClientError> {
        self.call("unlock_layer", |state| state.set_lock(root, layer_id, false))
    }

    async fn delete_layer(&self, root: &RootKey, layer_id: &str) -> Result<(), ClientError> {
        self.call("delete_layer", |state| state.delete_layer(root, layer_id))
    }

    async fn copy_documents(
        &self,
        root: &RootKey,
        request: &DocumentTransferRequest,
    ) -> Result<(), ClientError> {
        self.call("copy_documents", |state| state.transfer_documents(root, request, true))
    }

    async fn move_documents(
        &self,
        root: &RootKey,
        request: &DocumentTransferRequest,
    ) -> Result<(), ClientError> {
        self.call("move_documents", |state| state.transfer_documents(root, request, false))
    }
}
