// Dedup window for push events.
//
// Keys seen within the window are duplicates. Field events are held until
// their window elapses so repeats coalesce into one application with the
// latest payload (partial document updates merge their changes); the timer
// is not extended by repeats.

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;

use strata_common::protocol::live::PushEvent;

/// Tracks pending field events with the instant they become ready.
struct PendingEvent {
    event: PushEvent,
    due: Instant,
    merged: u32,
}

/// What `hold` did with an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Held {
    /// First sighting; a new window started.
    Started,
    /// Folded into an already pending event.
    Merged,
}

pub struct DedupWindow {
    window: Duration,
    seen: HashMap<String, Instant>,
    pending: HashMap<String, PendingEvent>,
}

impl DedupWindow {
    pub fn new(window: Duration) -> Self {
        Self { window, seen: HashMap::new(), pending: HashMap::new() }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Record `key` unless it was seen within the window. Returns whether
    /// the key is fresh.
    pub fn admit(&mut self, key: &str, now: Instant) -> bool {
        self.evict(now);
        if self.seen.contains_key(key) {
            return false;
        }
        self.seen.insert(key.to_string(), now);
        true
    }

    /// Hold a field event until its window elapses. A repeat within the
    /// window is folded into the held payload (see [`PushEvent::absorb`]).
    pub fn hold(&mut self, key: String, event: PushEvent, now: Instant) -> Held {
        if let Some(pending) = self.pending.get_mut(&key) {
            pending.event.absorb(event);
            pending.merged += 1;
            return Held::Merged;
        }
        self.evict(now);
        self.seen.insert(key.clone(), now);
        self.pending.insert(key, PendingEvent { event, due: now + self.window, merged: 0 });
        Held::Started
    }

    /// Drain held events whose window has elapsed, oldest first.
    pub fn drain_ready_at(&mut self, now: Instant) -> Vec<PushEvent> {
        let mut ready = Vec::new();
        self.pending.retain(|key, pending| {
            if now >= pending.due {
                tracing::trace!(key = %key, merged = pending.merged, "held event ready");
                ready.push((pending.due, pending.event.clone()));
                false // remove from pending
            } else {
                true // keep pending
            }
        });
        ready.sort_by_key(|(due, _)| *due);
        ready.into_iter().map(|(_, event)| event).collect()
    }

    /// Number of events still waiting in the window.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn seen_count(&self) -> usize {
        self.seen.len()
    }

    /// When the next held event becomes ready, or None if nothing is held.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.values().map(|pending| pending.due).min()
    }

    /// Forget keys older than the window. Held keys stay until drained.
    fn evict(&mut self, now: Instant) {
        let window = self.window;
        let pending = &self.pending;
        self.seen.retain(|key, seen_at| {
            now.duration_since(*seen_at) < window || pending.contains_key(key)
        });
    }
}
