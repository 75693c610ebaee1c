// Tree Operation Client: user intents turned into remote calls.
//
// Every operation runs its local preconditions first, makes exactly one
// remote call, and on success invalidates the cache and reloads the tree,
// layers and documents. Nothing is applied optimistically, so a failed call
// leaves local state as it was. A failed reload after a successful call is
// reported as `RefreshFailed` with the last good snapshot still cached.

use tracing::{info, warn};

use strata_common::path::{is_within, normalize_path, resolve, segments, ROOT_PATH};
use strata_common::protocol::rest::{
    DocumentTransferRequest, InsertRequest, LayerSetRequest, RemoveRequest, RenameLayerRequest,
    TransferRequest,
};
use strata_common::types::{DocumentId, LayerSummary, NodeId};

use crate::api::{target_list, TreeApi};
use crate::clipboard::{ClipOperation, ClipboardEntry};
use crate::error::ClientError;
use crate::replica::{Replica, Selection};

impl<A: TreeApi> Replica<A> {
    // ── Tree structure ─────────────────────────────────────────────

    /// Create a layer at `path`. Missing ancestors are created only with
    /// `auto_create`.
    pub async fn insert(&mut self, path: &str, auto_create: bool) -> Result<(), ClientError> {
        let path = normalize_path(path)?;
        if path == ROOT_PATH {
            return Err(ClientError::InvalidOperation("the root already exists".into()));
        }
        info!(op = "insert", path = %path, auto_create, "tree operation");
        let request = InsertRequest { path, auto_create };
        self.api.insert(&self.root, &request).await?;
        self.after_mutation("insert").await
    }

    /// Remove the layer at `path`. A layer with children needs `recursive`.
    pub async fn remove(&mut self, path: &str, recursive: bool) -> Result<(), ClientError> {
        let path = normalize_path(path)?;
        if path == ROOT_PATH {
            return Err(ClientError::Conflict("the root cannot be removed".into()));
        }
        info!(op = "remove", path = %path, recursive, "tree operation");
        let request = RemoveRequest { path, recursive };
        self.api.remove(&self.root, &request).await?;
        self.after_mutation("remove").await
    }

    /// Move the layer at `from` under the layer at `to`. Ids are kept, so a
    /// selection inside the moved subtree follows it.
    pub async fn move_node(
        &mut self,
        from: &str,
        to: &str,
        recursive: bool,
    ) -> Result<(), ClientError> {
        let request = transfer_request(from, to, recursive)?;
        info!(op = "move", from = %request.from, to = %request.to, recursive, "tree operation");
        self.api.move_node(&self.root, &request).await?;
        self.after_mutation("move").await
    }

    /// Copy the layer at `from` under the layer at `to`. Without `recursive`
    /// only the layer itself is copied.
    pub async fn copy_node(
        &mut self,
        from: &str,
        to: &str,
        recursive: bool,
    ) -> Result<(), ClientError> {
        let request = transfer_request(from, to, recursive)?;
        info!(op = "copy", from = %request.from, to = %request.to, recursive, "tree operation");
        self.api.copy_node(&self.root, &request).await?;
        self.after_mutation("copy").await
    }

    /// Rename the layer at `from_path`. The path is resolved to an id first
    /// and the rename acts on the id. The selection is remapped from the
    /// response before the follow-up reload.
    pub async fn rename(
        &mut self,
        from_path: &str,
        new_name: &str,
    ) -> Result<LayerSummary, ClientError> {
        let path = normalize_path(from_path)?;
        if path == ROOT_PATH {
            return Err(ClientError::InvalidOperation("the root cannot be renamed".into()));
        }
        let name = new_name.trim();
        if name.is_empty() || name.contains('/') {
            return Err(ClientError::InvalidOperation(format!(
                "`{new_name}` is not a layer name"
            )));
        }

        let layer_id = self.layer_id_at(&path).await?;
        info!(
            op = "rename",
            path = %path,
            layer_id = %layer_id,
            new_name = name,
            "tree operation"
        );
        let request = RenameLayerRequest { layer_id, name: name.to_string() };
        let renamed = self.api.rename_layer(&self.root, &request).await?;
        self.remap_renamed(&renamed.id, &renamed.name);
        self.after_mutation("rename").await?;
        Ok(renamed)
    }

    /// Merge the document associations of `targets` into `layer_id`.
    pub async fn merge(&mut self, layer_id: &str, targets: &[NodeId]) -> Result<(), ClientError> {
        let request = layer_set_request(layer_id, targets)?;
        info!(op = "merge", layer_id, targets = %target_list(targets), "tree operation");
        self.api.merge_layers(&self.root, layer_id, &request).await?;
        self.after_mutation("merge").await
    }

    /// Subtract the document associations of `targets` from `layer_id`.
    pub async fn subtract(
        &mut self,
        layer_id: &str,
        targets: &[NodeId],
    ) -> Result<(), ClientError> {
        let request = layer_set_request(layer_id, targets)?;
        info!(op = "subtract", layer_id, targets = %target_list(targets), "tree operation");
        self.api.subtract_layers(&self.root, layer_id, &request).await?;
        self.after_mutation("subtract").await
    }

    // ── Layer admin ────────────────────────────────────────────────

    pub async fn lock_layer(&mut self, path: &str) -> Result<LayerSummary, ClientError> {
        let layer_id = self.non_root_layer_id(path, "locked").await?;
        info!(op = "lock", layer_id = %layer_id, "tree operation");
        let summary = self.api.lock_layer(&self.root, &layer_id).await?;
        self.after_mutation("lock").await?;
        Ok(summary)
    }

    pub async fn unlock_layer(&mut self, path: &str) -> Result<LayerSummary, ClientError> {
        let layer_id = self.non_root_layer_id(path, "unlocked").await?;
        info!(op = "unlock", layer_id = %layer_id, "tree operation");
        let summary = self.api.unlock_layer(&self.root, &layer_id).await?;
        self.after_mutation("unlock").await?;
        Ok(summary)
    }

    /// Delete the layer at `path` by id, which removes it from every
    /// position it is shared at.
    pub async fn delete_layer(&mut self, path: &str) -> Result<(), ClientError> {
        let layer_id = self.non_root_layer_id(path, "deleted").await?;
        info!(op = "delete", layer_id = %layer_id, "tree operation");
        self.api.delete_layer(&self.root, &layer_id).await?;
        self.after_mutation("delete").await
    }

    // ── Clipboard ──────────────────────────────────────────────────

    /// Put documents from the selected path on the clipboard for copying.
    pub fn copy_documents(&self, ids: Vec<DocumentId>) {
        self.clipboard.copy(self.root.clone(), self.selection.path.clone(), ids);
    }

    /// Put documents from the selected path on the clipboard for moving.
    pub fn cut_documents(&self, ids: Vec<DocumentId>) {
        self.clipboard.cut(self.root.clone(), self.selection.path.clone(), ids);
    }

    /// Paste the clipboard under `target_path`: a server-side document copy
    /// for `copy`, a move for `cut`. A cut is cleared once pasted.
    pub async fn paste(&mut self, target_path: &str) -> Result<ClipboardEntry, ClientError> {
        let entry = self
            .clipboard
            .peek()
            .ok_or_else(|| ClientError::InvalidOperation("the clipboard is empty".into()))?;
        if entry.source_root != self.root {
            return Err(ClientError::InvalidOperation(format!(
                "clipboard holds documents from {}, not {}",
                entry.source_root, self.root
            )));
        }
        let target = normalize_path(target_path)?;
        if target == entry.source_path {
            return Err(ClientError::InvalidOperation(format!(
                "documents are already under `{target}`"
            )));
        }

        let request = DocumentTransferRequest {
            ids: entry.document_ids.clone(),
            from: entry.source_path.clone(),
            to: target,
        };
        info!(
            op = "paste",
            operation = ?entry.operation,
            count = request.ids.len(),
            from = %request.from,
            to = %request.to,
            "clipboard paste"
        );
        match entry.operation {
            ClipOperation::Copy => self.api.copy_documents(&self.root, &request).await?,
            ClipOperation::Cut => self.api.move_documents(&self.root, &request).await?,
        }
        self.clipboard.settle(&entry);
        self.refresh_documents()
            .await
            .map_err(|error| ClientError::RefreshFailed(Box::new(error)))?;
        Ok(entry)
    }

    // ── Helpers ────────────────────────────────────────────────────

    /// Mandatory reload after a successful mutation.
    async fn after_mutation(&mut self, op: &str) -> Result<(), ClientError> {
        self.cache.invalidate(&self.root);
        let refreshed = match self.reload().await {
            Ok(()) => self.refresh_documents().await,
            Err(error) => Err(error),
        };
        refreshed.map_err(|error| {
            warn!(op, error = %error, "refresh after tree operation failed");
            ClientError::RefreshFailed(Box::new(error))
        })
    }

    async fn layer_id_at(&mut self, path: &str) -> Result<NodeId, ClientError> {
        let tree = self.ensure_loaded().await?;
        resolve(&tree, path)
            .map(|node| node.id.clone())
            .ok_or_else(|| ClientError::not_found_path(path))
    }

    async fn non_root_layer_id(&mut self, path: &str, action: &str) -> Result<NodeId, ClientError> {
        let path = normalize_path(path)?;
        if path == ROOT_PATH {
            return Err(ClientError::Conflict(format!("the root cannot be {action}")));
        }
        self.layer_id_at(&path).await
    }

    /// Rewrite the selected path wherever its id chain passes through the
    /// renamed layer.
    fn remap_renamed(&mut self, layer_id: &str, name: &str) {
        let Ok(parts) = segments(&self.selection.path) else {
            return;
        };
        let mut parts: Vec<String> = parts.into_iter().map(str::to_string).collect();
        let mut changed = false;
        // chain[0] is the root; chain[i] owns segment i - 1.
        for (index, id) in self.selection.chain.iter().enumerate().skip(1) {
            if id == layer_id {
                if let Some(part) = parts.get_mut(index - 1) {
                    changed |= *part != name;
                    *part = name.to_string();
                }
            }
        }
        if changed {
            let path = format!("/{}", parts.join("/"));
            info!(from = %self.selection.path, to = %path, "selection follows rename");
            let chain = self.selection.chain.clone();
            self.set_selection(Selection { path, chain });
        }
    }
}

fn transfer_request(from: &str, to: &str, recursive: bool) -> Result<TransferRequest, ClientError> {
    let from = normalize_path(from)?;
    let to = normalize_path(to)?;
    if from == ROOT_PATH {
        return Err(ClientError::Conflict("the root cannot be moved or copied".into()));
    }
    if is_within(&to, &from) {
        return Err(ClientError::InvalidOperation(format!("`{to}` lies inside `{from}`")));
    }
    Ok(TransferRequest { from, to, recursive })
}

fn layer_set_request(layer_id: &str, targets: &[NodeId]) -> Result<LayerSetRequest, ClientError> {
    if targets.is_empty() {
        return Err(ClientError::InvalidOperation("no target layers given".into()));
    }
    if targets.iter().any(|target| target == layer_id) {
        return Err(ClientError::InvalidOperation(format!(
            "layer `{layer_id}` cannot target itself"
        )));
    }
    Ok(LayerSetRequest { targets: targets.to_vec() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::MemoryTreeApi;
    use crate::config::ClientConfig;
    use strata_common::path::resolve;
    use strata_common::types::{DocumentRef, Node, RootKey};

    fn root() -> RootKey {
        RootKey::Workspace("w1".into())
    }

    fn replica(tree: Node) -> Replica<MemoryTreeApi> {
        Replica::new(MemoryTreeApi::new().with_tree(root(), tree), root(), &ClientConfig::default())
    }

    fn work_tree() -> Node {
        Node::root("root").with_children(vec![Node::layer("L1", "work")
            .with_children(vec![Node::layer("L2", "2024")])])
    }

    #[tokio::test]
    async fn rename_root_fails_without_remote_call() {
        let mut replica = replica(work_tree());
        let error = replica.rename("/", "anything").await.unwrap_err();
        assert!(matches!(error, ClientError::InvalidOperation(_)));
        assert!(replica.api().calls().is_empty());
    }

    #[tokio::test]
    async fn rename_with_bad_name_fails_locally() {
        let mut replica = replica(work_tree());
        replica.load().await.unwrap();
        replica.api().clear_calls();
        for name in ["", "  ", "a/b"] {
            let error = replica.rename("/work", name).await.unwrap_err();
            assert!(matches!(error, ClientError::InvalidOperation(_)));
        }
        assert!(replica.api().calls().is_empty());
    }

    #[tokio::test]
    async fn rename_unknown_path_is_not_found() {
        let mut replica = replica(work_tree());
        replica.load().await.unwrap();
        let error = replica.rename("/nope", "x").await.unwrap_err();
        assert!(matches!(error, ClientError::NotFound(_)));
        assert_eq!(replica.api().call_count("rename_layer"), 0);
    }

    #[tokio::test]
    async fn every_success_reloads_tree_and_layers() {
        let mut replica = replica(work_tree());
        replica.load().await.unwrap();
        replica.api().clear_calls();

        replica.insert("/home", false).await.unwrap();
        let calls = replica.api().calls();
        assert_eq!(calls[0], "insert");
        assert!(calls.contains(&"fetch_tree".to_string()));
        assert!(calls.contains(&"fetch_layers".to_string()));
        assert!(resolve(&replica.tree().unwrap(), "/home").is_some());
        assert!(!replica.cache().is_stale(replica.root()));
    }

    #[tokio::test]
    async fn failed_call_does_not_reload() {
        let mut replica = replica(work_tree());
        replica.load().await.unwrap();
        replica.api().clear_calls();

        let error = replica.insert("/a/b", false).await.unwrap_err();
        assert!(matches!(error, ClientError::NotFound(_)));
        assert_eq!(replica.api().calls(), vec!["insert"]);
    }

    #[tokio::test]
    async fn failed_reload_is_reported_but_mutation_stands() {
        let mut replica = replica(work_tree());
        replica.load().await.unwrap();
        replica.api().fail_next("fetch_layers", ClientError::Network("timeout".into()));

        let error = replica.insert("/home", false).await.unwrap_err();
        assert!(matches!(error, ClientError::RefreshFailed(_)));
        assert!(resolve(&replica.tree().unwrap(), "/home").is_none());
        assert!(replica.cache().is_stale(replica.root()));
        assert!(replica.api().tree(&root()).unwrap().child("home").is_some());
    }

    #[tokio::test]
    async fn move_into_own_subtree_is_rejected_locally() {
        let mut replica = replica(work_tree());
        let error = replica.move_node("/work", "/work/2024", true).await.unwrap_err();
        assert!(matches!(error, ClientError::InvalidOperation(_)));
        assert!(replica.api().calls().is_empty());
    }

    #[tokio::test]
    async fn moving_the_selection_keeps_it_on_the_node() {
        let tree = Node::root("root").with_children(vec![
            Node::layer("L1", "work").with_children(vec![Node::layer("L2", "2024")]),
            Node::layer("L3", "archive"),
        ]);
        let mut replica = replica(tree);
        replica.load().await.unwrap();
        replica.navigate("/work/2024").await.unwrap();

        replica.move_node("/work/2024", "/archive", true).await.unwrap();
        assert_eq!(replica.selected_path(), "/archive/2024");
    }

    #[tokio::test]
    async fn merge_and_subtract_validate_targets() {
        let mut replica = replica(work_tree());
        let error = replica.merge("L1", &[]).await.unwrap_err();
        assert!(matches!(error, ClientError::InvalidOperation(_)));
        let error = replica.subtract("L1", &["L1".to_string()]).await.unwrap_err();
        assert!(matches!(error, ClientError::InvalidOperation(_)));
        assert!(replica.api().calls().is_empty());
    }

    #[tokio::test]
    async fn merge_then_subtract_changes_listed_documents() {
        let mut replica = replica(work_tree());
        replica.api().add_document(&root(), "/work/2024", DocumentRef::new(5, "a"), ["x"]).unwrap();
        replica.load().await.unwrap();
        replica.navigate("/work").await.unwrap();
        assert_eq!(replica.documents().unwrap().total_count, 0);

        replica.merge("L1", &["L2".to_string()]).await.unwrap();
        assert_eq!(replica.documents().unwrap().total_count, 1);

        replica.subtract("L1", &["L2".to_string()]).await.unwrap();
        assert_eq!(replica.documents().unwrap().total_count, 0);
    }

    #[tokio::test]
    async fn lock_and_unlock_reflect_in_layer_list() {
        let mut replica = replica(work_tree());
        replica.load().await.unwrap();

        let summary = replica.lock_layer("/work").await.unwrap();
        assert!(summary.locked);
        assert!(replica.layers().unwrap().iter().any(|layer| layer.id == "L1" && layer.locked));

        let error = replica.lock_layer("/work").await.unwrap_err();
        assert!(matches!(error, ClientError::Conflict(_)));

        replica.unlock_layer("/work").await.unwrap();
        assert!(replica.layers().unwrap().iter().all(|layer| !layer.locked));
    }

    #[tokio::test]
    async fn delete_layer_removes_it_and_root_is_refused() {
        let mut replica = replica(work_tree());
        replica.load().await.unwrap();
        replica.delete_layer("/work/2024").await.unwrap();
        assert!(resolve(&replica.tree().unwrap(), "/work/2024").is_none());

        let error = replica.delete_layer("/").await.unwrap_err();
        assert!(matches!(error, ClientError::Conflict(_)));
    }

    #[tokio::test]
    async fn paste_with_empty_clipboard_makes_no_call() {
        let mut replica = replica(work_tree());
        let error = replica.paste("/work").await.unwrap_err();
        assert!(matches!(error, ClientError::InvalidOperation(_)));
        assert!(replica.api().calls().is_empty());
    }

    #[tokio::test]
    async fn cut_paste_moves_documents_and_clears_clipboard() {
        let mut replica = replica(work_tree());
        replica.api().add_document(&root(), "/work", DocumentRef::new(1, "a"), ["x"]).unwrap();
        replica.load().await.unwrap();
        replica.navigate("/work").await.unwrap();

        replica.cut_documents(vec![1]);
        replica.paste("/work/2024").await.unwrap();
        assert!(replica.clipboard().is_empty());
        assert_eq!(replica.api().placements("L2"), vec![1]);
        assert!(replica.api().placements("L1").is_empty());
    }

    #[tokio::test]
    async fn copy_paste_keeps_clipboard_for_repeats() {
        let tree = Node::root("root").with_children(vec![
            Node::layer("L1", "work"),
            Node::layer("L2", "a"),
            Node::layer("L3", "b"),
        ]);
        let mut replica = replica(tree);
        replica.api().add_document(&root(), "/work", DocumentRef::new(1, "a"), ["x"]).unwrap();
        replica.load().await.unwrap();
        replica.navigate("/work").await.unwrap();

        replica.copy_documents(vec![1]);
        replica.paste("/a").await.unwrap();
        replica.paste("/b").await.unwrap();
        assert!(!replica.clipboard().is_empty());
        assert_eq!(replica.api().placements("L1"), vec![1]);
        assert_eq!(replica.api().placements("L3"), vec![1]);
    }

    #[tokio::test]
    async fn paste_across_roots_is_rejected() {
        let mut replica = replica(work_tree());
        replica.clipboard().copy(RootKey::Context("c1".into()), "/work", vec![1]);
        let error = replica.paste("/work").await.unwrap_err();
        assert!(matches!(error, ClientError::InvalidOperation(_)));
        assert!(replica.api().calls().is_empty());
    }
}
