// Replica: the active view over one server-owned tree.
//
// Owns the tree cache, the selection, the document pager, the event
// reconciler and the address history for a single root. Navigation updates
// state first and then records the derived address; an external address
// (deep link, back/forward) is applied to state without being recorded.
//
// Tree mutations live in `ops`; this file covers loading, navigation and
// push-event application.

use std::sync::Arc;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use strata_common::address::{from_address, to_address, Location};
use strata_common::path::{
    canonical_path, normalize_path, path_for_chain, resolve_chain, ROOT_PATH,
};
use strata_common::protocol::live::{EntityKind, EventFrame, PushEvent};
use strata_common::types::{
    DocumentId, DocumentPage, DocumentRef, FilterState, LayerSummary, Node, NodeId, RootKey,
};

use crate::api::TreeApi;
use crate::cache::TreeCache;
use crate::clipboard::Clipboard;
use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::navigator::Navigator;
use crate::pager::DocumentPager;
use crate::reconcile::{Disposition, EventReconciler, Notice};

/// The selected path together with the ids it walked through, root first.
/// The ids are what survive renames and moves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub path: String,
    pub chain: Vec<NodeId>,
}

impl Selection {
    fn root() -> Self {
        Self { path: ROOT_PATH.to_string(), chain: Vec::new() }
    }

    fn resolved(tree: &Node, path: &str) -> Option<Self> {
        let chain = resolve_chain(tree, path)?;
        Some(Self {
            path: path.to_string(),
            chain: chain.iter().map(|node| node.id.clone()).collect(),
        })
    }
}

pub struct Replica<A: TreeApi> {
    pub(crate) api: A,
    pub(crate) root: RootKey,
    pub(crate) cache: TreeCache,
    pub(crate) selection: Selection,
    pub(crate) pager: DocumentPager,
    pub(crate) clipboard: Clipboard,
    pub(crate) reconciler: EventReconciler,
    pub(crate) navigator: Navigator,
}

impl<A: TreeApi> Replica<A> {
    pub fn new(api: A, root: RootKey, config: &ClientConfig) -> Self {
        Self {
            api,
            root,
            cache: TreeCache::new(),
            selection: Selection::root(),
            pager: DocumentPager::new(config.paging.page_size()),
            clipboard: Clipboard::new(),
            reconciler: EventReconciler::from_config(&config.sync),
            navigator: Navigator::new(),
        }
    }

    /// Share a clipboard with other views.
    pub fn with_clipboard(mut self, clipboard: Clipboard) -> Self {
        self.clipboard = clipboard;
        self
    }

    // ── Accessors ──────────────────────────────────────────────────

    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn root(&self) -> &RootKey {
        &self.root
    }

    pub fn tree(&self) -> Option<Arc<Node>> {
        self.cache.tree(&self.root)
    }

    pub fn layers(&self) -> Option<Arc<Vec<LayerSummary>>> {
        self.cache.layers(&self.root)
    }

    pub fn cache(&self) -> &TreeCache {
        &self.cache
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn selected_path(&self) -> &str {
        &self.selection.path
    }

    pub fn filters(&self) -> &FilterState {
        self.pager.filters()
    }

    pub fn pager(&self) -> &DocumentPager {
        &self.pager
    }

    pub fn documents(&self) -> Option<&DocumentPage> {
        self.pager.results()
    }

    pub fn clipboard(&self) -> &Clipboard {
        &self.clipboard
    }

    pub fn navigator(&self) -> &Navigator {
        &self.navigator
    }

    // ── Loading ────────────────────────────────────────────────────

    /// Fetch the tree, layers and the first document page, and record the
    /// starting address.
    pub async fn load(&mut self) -> Result<(), ClientError> {
        self.reload().await?;
        self.refresh_documents().await?;
        self.record_address();
        Ok(())
    }

    /// Replace the snapshot with a fresh tree and layer list. On failure the
    /// last good snapshot stays cached.
    pub async fn reload(&mut self) -> Result<(), ClientError> {
        let ticket = self.cache.begin_fetch();
        debug!(root = %self.root, "reloading tree");
        let (tree, layers) = tokio::try_join!(
            self.api.fetch_tree(&self.root),
            self.api.fetch_layers(&self.root)
        )?;
        if self.cache.store(&self.root, ticket, tree, layers) {
            self.reselect();
        }
        Ok(())
    }

    pub(crate) async fn ensure_loaded(&mut self) -> Result<Arc<Node>, ClientError> {
        if let Some(tree) = self.tree() {
            return Ok(tree);
        }
        self.reload().await?;
        self.tree().ok_or_else(|| ClientError::NotFound(format!("no tree for {}", self.root)))
    }

    /// Re-run the current document query.
    pub async fn refresh_documents(&mut self) -> Result<(), ClientError> {
        let (ticket, query) = self.pager.begin_query();
        let page = self.api.fetch_documents(&self.root, &query).await?;
        debug!(
            path = %query.path,
            page = query.page,
            returned = page.documents.len(),
            total = page.total_count,
            "documents fetched"
        );
        self.pager.accept(ticket, page);
        Ok(())
    }

    /// Keep the selection on the same node after a snapshot replace: follow
    /// the id chain, then the node's canonical path, then the nearest
    /// surviving ancestor.
    fn reselect(&mut self) {
        let Some(tree) = self.tree() else {
            return;
        };
        let chain = &self.selection.chain;
        let followed = path_for_chain(&tree, chain)
            .or_else(|| chain.last().and_then(|id| canonical_path(&tree, id)))
            .or_else(|| {
                (1..chain.len()).rev().find_map(|len| path_for_chain(&tree, &chain[..len]))
            })
            .unwrap_or_else(|| ROOT_PATH.to_string());

        let Some(selection) = Selection::resolved(&tree, &followed) else {
            return;
        };
        if selection.path != self.selection.path {
            info!(from = %self.selection.path, to = %selection.path, "selection moved");
            self.set_selection(selection);
        } else {
            self.selection = selection;
        }
    }

    /// Point the selection (and the document scope) at a new path.
    pub(crate) fn set_selection(&mut self, selection: Selection) {
        // Selections are built from resolved, normalized paths.
        if let Err(error) = self.pager.set_path(&selection.path) {
            warn!(path = %selection.path, error = %error, "selection path rejected by pager");
        }
        self.selection = selection;
        self.record_address();
    }

    // ── Navigation ─────────────────────────────────────────────────

    /// Select a path in the current snapshot and query its documents.
    pub async fn navigate(&mut self, path: &str) -> Result<(), ClientError> {
        let path = normalize_path(path)?;
        let tree = self.ensure_loaded().await?;
        let selection =
            Selection::resolved(&tree, &path).ok_or_else(|| ClientError::not_found_path(&path))?;
        self.set_selection(selection);
        self.refresh_documents().await
    }

    pub async fn toggle_feature(&mut self, feature: &str) -> Result<bool, ClientError> {
        let active = self.pager.toggle_feature(feature);
        self.record_address();
        self.refresh_documents().await?;
        Ok(active)
    }

    pub async fn toggle_filter(&mut self, filter: &str) -> Result<bool, ClientError> {
        let active = self.pager.toggle_filter(filter);
        self.record_address();
        self.refresh_documents().await?;
        Ok(active)
    }

    pub async fn set_filters(&mut self, filters: FilterState) -> Result<(), ClientError> {
        if self.pager.set_filters(filters) {
            self.record_address();
            self.refresh_documents().await?;
        }
        Ok(())
    }

    pub async fn set_page(&mut self, page: u32) -> Result<(), ClientError> {
        self.pager.set_page(page);
        self.refresh_documents().await
    }

    pub async fn next_page(&mut self) -> Result<bool, ClientError> {
        if !self.pager.next_page() {
            return Ok(false);
        }
        self.refresh_documents().await?;
        Ok(true)
    }

    pub async fn previous_page(&mut self) -> Result<bool, ClientError> {
        if !self.pager.previous_page() {
            return Ok(false);
        }
        self.refresh_documents().await?;
        Ok(true)
    }

    // ── Address ────────────────────────────────────────────────────

    /// Address derived from the current state.
    pub fn address(&self) -> String {
        to_address(&self.root, &self.selection.path, self.pager.filters())
    }

    pub fn location(&self) -> Location {
        Location::new(self.root.clone(), self.selection.path.clone(), self.pager.filters().clone())
    }

    fn record_address(&mut self) {
        let address = self.address();
        if self.navigator.record(address) {
            debug!(address = ?self.navigator.current(), "address pushed");
        }
    }

    /// Open a deep link: derive state from it, then record it.
    pub async fn open_address(&mut self, address: &str) -> Result<(), ClientError> {
        let location = from_address(address)
            .map_err(|error| ClientError::InvalidOperation(error.to_string()))?;
        self.apply_location(location).await?;
        self.record_address();
        Ok(())
    }

    /// Step back in history. Returns false at the oldest entry.
    pub async fn back(&mut self) -> Result<bool, ClientError> {
        let Some(address) = self.navigator.back().map(str::to_string) else {
            return Ok(false);
        };
        if let Err(error) = self.apply_address(&address).await {
            self.navigator.forward();
            return Err(error);
        }
        Ok(true)
    }

    /// Step forward in history. Returns false at the newest entry.
    pub async fn forward(&mut self) -> Result<bool, ClientError> {
        let Some(address) = self.navigator.forward().map(str::to_string) else {
            return Ok(false);
        };
        if let Err(error) = self.apply_address(&address).await {
            self.navigator.back();
            return Err(error);
        }
        Ok(true)
    }

    async fn apply_address(&mut self, address: &str) -> Result<(), ClientError> {
        let location = from_address(address)
            .map_err(|error| ClientError::InvalidOperation(error.to_string()))?;
        self.apply_location(location).await
    }

    /// Derive state from a location without touching history. Nothing is
    /// changed unless the path resolves. Another root is fetched aside and
    /// only swapped in once its tree holds the path.
    async fn apply_location(&mut self, location: Location) -> Result<(), ClientError> {
        let Location { root, path, filters } = location;
        let selection = if root == self.root {
            let tree = self.ensure_loaded().await?;
            Selection::resolved(&tree, &path)
                .ok_or_else(|| ClientError::not_found_path(&path))?
        } else {
            let ticket = self.cache.begin_fetch();
            debug!(root = %root, "fetching tree for another root");
            let (tree, layers) =
                tokio::try_join!(self.api.fetch_tree(&root), self.api.fetch_layers(&root))?;
            let selection = Selection::resolved(&tree, &path)
                .ok_or_else(|| ClientError::not_found_path(&path))?;
            info!(from = %self.root, to = %root, "switching root");
            self.cache.store(&root, ticket, tree, layers);
            self.root = root;
            self.pager.set_page(1);
            selection
        };
        self.pager.set_path(&selection.path)?;
        self.pager.set_filters(filters);
        self.selection = selection;
        self.refresh_documents().await
    }

    // ── Push events ────────────────────────────────────────────────

    /// Feed one push frame through the reconciler. Structural changes reload
    /// immediately; field changes are held and applied by `apply_ready`.
    pub async fn handle_frame(&mut self, frame: &EventFrame) -> Result<Vec<Notice>, ClientError> {
        self.handle_frame_at(frame, Instant::now()).await
    }

    pub async fn handle_frame_at(
        &mut self,
        frame: &EventFrame,
        now: Instant,
    ) -> Result<Vec<Notice>, ClientError> {
        let event = match self.reconciler.ingest_at(frame, now) {
            Disposition::Reload(event) => event,
            Disposition::Dropped(_) | Disposition::Deferred | Disposition::Coalesced => {
                return Ok(Vec::new());
            }
        };
        self.apply_structural(&event).await?;
        Ok(self.reconciler.notice_for_at(&event, now).into_iter().collect())
    }

    async fn apply_structural(&mut self, event: &PushEvent) -> Result<(), ClientError> {
        let (PushEvent::EntityCreated(entity)
        | PushEvent::EntityUpdated(entity)
        | PushEvent::EntityDeleted(entity)) = event
        else {
            return Ok(());
        };
        if let (RootKey::Context(current), Some(context)) = (&self.root, &entity.context_id) {
            if current != context {
                debug!(event = event.name(), context = %context, "event for another context");
                return Ok(());
            }
        }
        if entity.entity == EntityKind::Document {
            info!(event = event.name(), id = %entity.id, "document set changed, re-querying");
            return self.refresh_documents().await;
        }
        info!(event = event.name(), id = %entity.id, "tree changed remotely, reloading");
        self.cache.invalidate(&self.root);
        self.reload().await?;
        self.refresh_documents().await
    }

    /// Apply every held field event whose window has elapsed.
    pub fn apply_ready(&mut self) -> Vec<Notice> {
        self.apply_ready_at(Instant::now())
    }

    pub fn apply_ready_at(&mut self, now: Instant) -> Vec<Notice> {
        let mut notices = Vec::new();
        for event in self.reconciler.drain_ready_at(now) {
            let applied = self.apply_field(&event);
            debug!(event = event.name(), key = %event.key(), applied, "field event reconciled");
            notices.extend(self.reconciler.notice_for_at(&event, now));
        }
        notices
    }

    /// When the next held field event becomes ready.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.reconciler.next_deadline()
    }

    /// Patch a loaded entity in place. Returns whether anything was loaded
    /// to patch.
    fn apply_field(&mut self, event: &PushEvent) -> bool {
        match event {
            PushEvent::EntityUpdated(update) if update.entity == EntityKind::Document => {
                let (Some(id), Some(changes)) = (update.id.as_document_id(), &update.changes)
                else {
                    return false;
                };
                self.patch_document(id, |doc| doc.apply_changes(changes))
            }
            PushEvent::StatusChanged(change) => self
                .patch_document(change.id, |doc| doc.status = Some(change.status.clone())),
            PushEvent::UrlChanged(change) => {
                self.patch_document(change.id, |doc| doc.url = change.url.clone())
            }
            PushEvent::LockChanged(change) => match change.entity {
                EntityKind::Layer => self.cache.patch_layer_lock(
                    &self.root,
                    &change.id.to_string(),
                    change.locked,
                    change.locked_by.clone(),
                ),
                EntityKind::Document => match change.id.as_document_id() {
                    Some(id) => self.patch_document(id, |doc| {
                        doc.locked = change.locked;
                        doc.locked_by =
                            if change.locked { change.locked_by.clone() } else { None };
                    }),
                    None => false,
                },
                EntityKind::Context => false,
            },
            PushEvent::AclUpdated(change) => {
                let mut applied = false;
                for id in &change.ids {
                    applied |= self.patch_document(*id, |doc| doc.acl = change.acl.clone());
                }
                applied
            }
            PushEvent::AclRevoked(change) => {
                let Some(page) = self.pager.results_mut() else {
                    return false;
                };
                let before = page.documents.len();
                page.documents.retain(|doc| !change.ids.contains(&doc.id));
                let removed = (before - page.documents.len()) as u64;
                page.total_count = page.total_count.saturating_sub(removed);
                removed > 0
            }
            PushEvent::EntityCreated(_) | PushEvent::EntityUpdated(_) | PushEvent::EntityDeleted(_) => {
                false
            }
        }
    }

    fn patch_document(&mut self, id: DocumentId, patch: impl FnOnce(&mut DocumentRef)) -> bool {
        match self.pager.results_mut().and_then(|page| page.document_mut(id)) {
            Some(document) => {
                patch(document);
                true
            }
            None => false,
        }
    }
}
