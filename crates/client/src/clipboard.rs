// Clipboard: local-only intent carried from a copy/cut to a later paste.
//
// Nothing here talks to the server. Clones share one slot, so every view that
// holds a handle sees the same clipboard.

use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;

use strata_common::types::{DocumentId, RootKey};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClipOperation {
    Copy,
    Cut,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClipboardEntry {
    pub document_ids: Vec<DocumentId>,
    pub operation: ClipOperation,
    pub source_root: RootKey,
    pub source_path: String,
}

#[derive(Debug, Clone, Default)]
pub struct Clipboard {
    slot: Arc<Mutex<Option<ClipboardEntry>>>,
}

impl Clipboard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn copy(&self, root: RootKey, source_path: impl Into<String>, ids: Vec<DocumentId>) {
        self.set(ClipOperation::Copy, root, source_path.into(), ids);
    }

    pub fn cut(&self, root: RootKey, source_path: impl Into<String>, ids: Vec<DocumentId>) {
        self.set(ClipOperation::Cut, root, source_path.into(), ids);
    }

    /// Current entry, if any. Entries never expire; they are replaced by the
    /// next copy/cut or cleared by a successful cut paste.
    pub fn peek(&self) -> Option<ClipboardEntry> {
        self.lock().clone()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_none()
    }

    pub fn clear(&self) {
        *self.lock() = None;
    }

    /// Consume `entry` after a successful paste. A cut is cleared only if the
    /// slot still holds that same entry; copies stay for repeated pastes.
    pub(crate) fn settle(&self, entry: &ClipboardEntry) {
        if entry.operation != ClipOperation::Cut {
            return;
        }
        let mut slot = self.lock();
        if slot.as_ref() == Some(entry) {
            *slot = None;
        }
    }

    fn set(
        &self,
        operation: ClipOperation,
        source_root: RootKey,
        source_path: String,
        ids: Vec<DocumentId>,
    ) {
        let mut document_ids = Vec::with_capacity(ids.len());
        for id in ids {
            if !document_ids.contains(&id) {
                document_ids.push(id);
            }
        }
        *self.lock() = Some(ClipboardEntry { document_ids, operation, source_root, source_path });
    }

    fn lock(&self) -> MutexGuard<'_, Option<ClipboardEntry>> {
        self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
