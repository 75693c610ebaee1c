// Event Reconciler: validates, dedups and classifies push events.
//
// Pipeline per frame:
// 1. Decode and validate the payload; malformed or unknown frames are logged
//    and dropped.
// 2. Key the event (name + identifying ids + operation).
// 3. Structural events are admitted once per dedup window and returned for an
//    immediate reload. Field events are held for the window so repeats
//    coalesce, then released through `drain_ready`.
// 4. Notices for applied events pass through a separate debounce keyed by
//    `title:description`.
//
// Nothing here touches replica state; the replica applies what comes out.

pub mod dedup;
pub mod notice;

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

use strata_common::protocol::live::{EventError, EventFrame, PushEvent};

use crate::config::SyncConfig;

pub use dedup::{DedupWindow, Held};
pub use notice::{Notice, NoticeDebouncer, NoticeLevel};

/// Why an incoming frame was not applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropReason {
    Unknown(String),
    Malformed(String),
    Duplicate(String),
}

/// Outcome of ingesting one frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Disposition {
    Dropped(DropReason),
    /// Structural change; reload now.
    Reload(PushEvent),
    /// Field change held for the dedup window.
    Deferred,
    /// Field change merged into an event already held.
    Coalesced,
}

pub struct EventReconciler {
    dedup: DedupWindow,
    notices: NoticeDebouncer,
}

impl EventReconciler {
    pub fn new(dedup_window: Duration, notice_window: Duration) -> Self {
        Self { dedup: DedupWindow::new(dedup_window), notices: NoticeDebouncer::new(notice_window) }
    }

    pub fn from_config(config: &SyncConfig) -> Self {
        Self::new(config.dedup_window(), config.notify_debounce())
    }

    pub fn ingest(&mut self, frame: &EventFrame) -> Disposition {
        self.ingest_at(frame, Instant::now())
    }

    pub fn ingest_at(&mut self, frame: &EventFrame, now: Instant) -> Disposition {
        let event = match PushEvent::parse(frame) {
            Ok(event) => event,
            Err(EventError::Unknown(name)) => {
                debug!(event = %name, "dropping unknown push event");
                return Disposition::Dropped(DropReason::Unknown(name));
            }
            Err(error) => {
                warn!(event = %frame.event, reason = %error, "dropping malformed push event");
                return Disposition::Dropped(DropReason::Malformed(error.to_string()));
            }
        };

        let key = event.key();
        if event.is_structural() {
            if !self.dedup.admit(&key, now) {
                debug!(event = %frame.event, key = %key, "dropping duplicate push event");
                return Disposition::Dropped(DropReason::Duplicate(key));
            }
            return Disposition::Reload(event);
        }

        match self.dedup.hold(key, event, now) {
            Held::Started => Disposition::Deferred,
            Held::Merged => {
                debug!(event = %frame.event, "coalescing repeated push event");
                Disposition::Coalesced
            }
        }
    }

    /// Field events whose dedup window has elapsed.
    pub fn drain_ready(&mut self) -> Vec<PushEvent> {
        self.drain_ready_at(Instant::now())
    }

    pub fn drain_ready_at(&mut self, now: Instant) -> Vec<PushEvent> {
        self.dedup.drain_ready_at(now)
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.dedup.next_deadline()
    }

    pub fn pending_count(&self) -> usize {
        self.dedup.pending_count()
    }

    pub fn dedup_window(&self) -> Duration {
        self.dedup.window()
    }

    /// Notice for an applied event, unless an identical one was shown within
    /// the debounce window.
    pub fn notice_for(&mut self, event: &PushEvent) -> Option<Notice> {
        self.notice_for_at(event, Instant::now())
    }

    pub fn notice_for_at(&mut self, event: &PushEvent, now: Instant) -> Option<Notice> {
        self.notices.admit_at(Notice::for_event(event), now)
    }
}

impl Default for EventReconciler {
    fn default() -> Self {
        Self::from_config(&SyncConfig::default())
    }
}
