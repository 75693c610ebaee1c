// User-facing notices derived from applied push events.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

use strata_common::protocol::live::{EntityKind, PushEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeLevel {
    Info,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub title: String,
    pub description: String,
    pub level: NoticeLevel,
}

impl Notice {
    pub fn info(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self { title: title.into(), description: description.into(), level: NoticeLevel::Info }
    }

    pub fn warning(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self { title: title.into(), description: description.into(), level: NoticeLevel::Warning }
    }

    /// Coalescing key.
    pub fn key(&self) -> String {
        format!("{}:{}", self.title, self.description)
    }

    /// Notice for an applied event.
    pub fn for_event(event: &PushEvent) -> Self {
        match event {
            PushEvent::EntityCreated(e) => {
                Self::info(format!("{} created", entity_title(e.entity)), e.id.to_string())
            }
            PushEvent::EntityUpdated(e) => {
                let title = match e.operation.as_deref() {
                    Some(operation) => format!("{} {operation}", entity_title(e.entity)),
                    None => format!("{} updated", entity_title(e.entity)),
                };
                Self::info(title, e.id.to_string())
            }
            PushEvent::EntityDeleted(e) => {
                Self::info(format!("{} deleted", entity_title(e.entity)), e.id.to_string())
            }
            PushEvent::StatusChanged(e) => {
                Self::info("Status changed", format!("document {} is {}", e.id, e.status))
            }
            PushEvent::UrlChanged(e) => Self::info("Link updated", format!("document {}", e.id)),
            PushEvent::LockChanged(e) => {
                let title = format!(
                    "{} {}",
                    entity_title(e.entity),
                    if e.locked { "locked" } else { "unlocked" }
                );
                let description = match &e.locked_by {
                    Some(owner) if e.locked => format!("{} by {owner}", e.id),
                    _ => e.id.to_string(),
                };
                Self::info(title, description)
            }
            PushEvent::AclUpdated(e) => {
                Self::info("Sharing updated", document_count(e.ids.len()))
            }
            PushEvent::AclRevoked(e) => Self::warning("Access revoked", document_count(e.ids.len())),
        }
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.title, self.description)
    }
}

fn entity_title(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::Layer => "Layer",
        EntityKind::Document => "Document",
        EntityKind::Context => "Context",
    }
}

fn document_count(count: usize) -> String {
    if count == 1 {
        "1 document".to_string()
    } else {
        format!("{count} documents")
    }
}

/// Shows the first notice per key and suppresses identical ones until the
/// window has passed since it was shown.
pub struct NoticeDebouncer {
    window: Duration,
    shown: HashMap<String, Instant>,
}

impl NoticeDebouncer {
    pub fn new(window: Duration) -> Self {
        Self { window, shown: HashMap::new() }
    }

    pub fn admit_at(&mut self, notice: Notice, now: Instant) -> Option<Notice> {
        let window = self.window;
        self.shown.retain(|_, shown_at| now.duration_since(*shown_at) < window);
        let key = notice.key();
        if self.shown.contains_key(&key) {
            tracing::debug!(key = %key, "coalescing notice");
            return None;
        }
        self.shown.insert(key, now);
        Some(notice)
    }

    pub fn tracked(&self) -> usize {
        self.shown.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_common::protocol::live::{AclRevoked, EntityEvent, EntityId, LockChanged};

    #[test]
    fn identical_notices_within_window_show_once() {
        let mut debouncer = NoticeDebouncer::new(Duration::from_millis(500));
        let now = Instant::now();
        let notice = Notice::info("Layer created", "L1");

        assert!(debouncer.admit_at(notice.clone(), now).is_some());
        assert!(debouncer.admit_at(notice.clone(), now + Duration::from_millis(499)).is_none());
        assert!(debouncer.admit_at(notice, now + Duration::from_millis(500)).is_some());
    }

    #[test]
    fn different_descriptions_are_not_coalesced() {
        let mut debouncer = NoticeDebouncer::new(Duration::from_millis(500));
        let now = Instant::now();
        assert!(debouncer.admit_at(Notice::info("Layer created", "L1"), now).is_some());
        assert!(debouncer.admit_at(Notice::info("Layer created", "L2"), now).is_some());
        assert_eq!(debouncer.tracked(), 2);
    }

    #[test]
    fn notice_text_for_events() {
        let created = PushEvent::EntityCreated(EntityEvent {
            entity: EntityKind::Layer,
            id: EntityId::Text("L9".into()),
            context_id: None,
            operation: None,
            changes: None,
        });
        assert_eq!(Notice::for_event(&created).key(), "Layer created:L9");

        let lock = PushEvent::LockChanged(LockChanged {
            entity: EntityKind::Document,
            id: EntityId::Number(4),
            locked: true,
            locked_by: Some("ana".into()),
        });
        assert_eq!(Notice::for_event(&lock).to_string(), "Document locked: 4 by ana");

        let revoked = PushEvent::AclRevoked(AclRevoked { ids: vec![1, 2], principal: None });
        let notice = Notice::for_event(&revoked);
        assert_eq!(notice.level, NoticeLevel::Warning);
        assert_eq!(notice.description, "2 documents");
    }
}
