// Push-event boundary: topics, client frames, server frames and typed event
// payloads.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::types::DocumentId;

// ── Topics ─────────────────────────────────────────────────────────

const CONTEXT_TOPIC: &str = "context";

/// Subscription channel: every context, or one context by id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Topic {
    AllContexts,
    Context(String),
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AllContexts => f.write_str(CONTEXT_TOPIC),
            Self::Context(id) => write!(f, "{CONTEXT_TOPIC}:{id}"),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown topic `{0}`")]
pub struct TopicError(pub String);

impl FromStr for Topic {
    type Err = TopicError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.split_once(':') {
            None if value == CONTEXT_TOPIC => Ok(Self::AllContexts),
            Some((CONTEXT_TOPIC, id)) if !id.is_empty() => Ok(Self::Context(id.to_string())),
            _ => Err(TopicError(value.to_string())),
        }
    }
}

// ── Frames ─────────────────────────────────────────────────────────

/// Client -> Server control frames.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    Subscribe { channel: String },
    Unsubscribe { channel: String },
}

impl ClientFrame {
    pub fn subscribe(topic: &Topic) -> Self {
        Self::Subscribe { channel: topic.to_string() }
    }

    pub fn unsubscribe(topic: &Topic) -> Self {
        Self::Unsubscribe { channel: topic.to_string() }
    }
}

/// Server -> Client named event with an untyped payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventFrame {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

impl EventFrame {
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self { event: event.into(), data }
    }
}

// ── Event names ────────────────────────────────────────────────────

pub const ENTITY_CREATED: &str = "entity-created";
pub const ENTITY_UPDATED: &str = "entity-updated";
pub const ENTITY_DELETED: &str = "entity-deleted";
pub const URL_CHANGED: &str = "url-changed";
pub const LOCK_CHANGED: &str = "lock-changed";
pub const ACL_UPDATED: &str = "acl-updated";
pub const ACL_REVOKED: &str = "acl-revoked";
pub const STATUS_CHANGED: &str = "status-changed";

/// All event names the reconciler understands.
pub const KNOWN_EVENTS: &[&str] = &[
    ENTITY_CREATED,
    ENTITY_UPDATED,
    ENTITY_DELETED,
    URL_CHANGED,
    LOCK_CHANGED,
    ACL_UPDATED,
    ACL_REVOKED,
    STATUS_CHANGED,
];

// ── Typed payloads ─────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Layer,
    Document,
    Context,
}

impl EntityKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Layer => "layer",
            Self::Document => "document",
            Self::Context => "context",
        }
    }
}

/// Layer and context ids are strings, document ids are numbers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(untagged)]
pub enum EntityId {
    Number(u64),
    Text(String),
}

impl EntityId {
    pub fn as_document_id(&self) -> Option<DocumentId> {
        match self {
            Self::Number(id) => Some(*id),
            Self::Text(text) => text.parse().ok(),
        }
    }

    fn is_blank(&self) -> bool {
        matches!(self, Self::Text(text) if text.trim().is_empty())
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(id) => write!(f, "{id}"),
            Self::Text(text) => f.write_str(text),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EntityEvent {
    pub entity: EntityKind,
    pub id: EntityId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_id: Option<String>,
    /// Optional operation discriminator, e.g. `move` or `rename`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub changes: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatusChanged {
    pub id: DocumentId,
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UrlChanged {
    pub id: DocumentId,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LockChanged {
    #[serde(default = "default_lock_entity")]
    pub entity: EntityKind,
    pub id: EntityId,
    pub locked: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locked_by: Option<String>,
}

fn default_lock_entity() -> EntityKind {
    EntityKind::Document
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AclUpdated {
    pub ids: Vec<DocumentId>,
    #[serde(default)]
    pub acl: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AclRevoked {
    pub ids: Vec<DocumentId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub principal: Option<String>,
}

/// A validated push event.
#[derive(Debug, Clone, PartialEq)]
pub enum PushEvent {
    EntityCreated(EntityEvent),
    EntityUpdated(EntityEvent),
    EntityDeleted(EntityEvent),
    StatusChanged(StatusChanged),
    UrlChanged(UrlChanged),
    LockChanged(LockChanged),
    AclUpdated(AclUpdated),
    AclRevoked(AclRevoked),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EventError {
    #[error("unknown event `{0}`")]
    Unknown(String),

    #[error("malformed `{event}` payload: {reason}")]
    Malformed { event: String, reason: String },
}

impl PushEvent {
    /// Decode and validate a frame. Payloads missing their identifying
    /// fields are rejected.
    pub fn parse(frame: &EventFrame) -> Result<Self, EventError> {
        let event = match frame.event.as_str() {
            ENTITY_CREATED => Self::EntityCreated(decode(frame)?),
            ENTITY_UPDATED => Self::EntityUpdated(decode(frame)?),
            ENTITY_DELETED => Self::EntityDeleted(decode(frame)?),
            STATUS_CHANGED => Self::StatusChanged(decode(frame)?),
            URL_CHANGED => Self::UrlChanged(decode(frame)?),
            LOCK_CHANGED => Self::LockChanged(decode(frame)?),
            ACL_UPDATED => Self::AclUpdated(decode(frame)?),
            ACL_REVOKED => Self::AclRevoked(decode(frame)?),
            other => return Err(EventError::Unknown(other.to_string())),
        };
        event.validate(&frame.event)?;
        Ok(event)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::EntityCreated(_) => ENTITY_CREATED,
            Self::EntityUpdated(_) => ENTITY_UPDATED,
            Self::EntityDeleted(_) => ENTITY_DELETED,
            Self::StatusChanged(_) => STATUS_CHANGED,
            Self::UrlChanged(_) => URL_CHANGED,
            Self::LockChanged(_) => LOCK_CHANGED,
            Self::AclUpdated(_) => ACL_UPDATED,
            Self::AclRevoked(_) => ACL_REVOKED,
        }
    }

    /// Dedup key: event name, identifying ids and the operation discriminator
    /// when present. Id lists are sorted so order-insensitive duplicates
    /// collapse to the same key.
    pub fn key(&self) -> String {
        let name = self.name();
        match self {
            Self::EntityCreated(e) | Self::EntityUpdated(e) | Self::EntityDeleted(e) => {
                let mut key = format!("{name}:{}:{}", e.entity.as_str(), e.id);
                if let Some(operation) = &e.operation {
                    key.push(':');
                    key.push_str(operation);
                }
                key
            }
            Self::StatusChanged(e) => format!("{name}:{}", e.id),
            Self::UrlChanged(e) => format!("{name}:{}", e.id),
            Self::LockChanged(e) => format!("{name}:{}:{}", e.entity.as_str(), e.id),
            Self::AclUpdated(e) => format!("{name}:{}", joined_ids(&e.ids)),
            Self::AclRevoked(e) => format!("{name}:{}", joined_ids(&e.ids)),
        }
    }

    /// Whether applying this event changes tree topology (or the set of
    /// listed documents) and therefore calls for a reload rather than a
    /// field patch.
    pub fn is_structural(&self) -> bool {
        match self {
            Self::EntityCreated(_) | Self::EntityDeleted(_) => true,
            Self::EntityUpdated(e) => e.entity != EntityKind::Document,
            _ => false,
        }
    }

    /// Fold a later repeat of the same key into this event. Partial
    /// `changes` maps on entity updates merge, later keys winning; any other
    /// payload is replaced by the later one.
    pub fn absorb(&mut self, later: PushEvent) {
        match (self, later) {
            (Self::EntityUpdated(held), Self::EntityUpdated(mut later)) => {
                if let Some(mut changes) = held.changes.take() {
                    changes.extend(later.changes.take().unwrap_or_default());
                    later.changes = Some(changes);
                }
                *held = later;
            }
            (held, later) => *held = later,
        }
    }

    fn validate(&self, event: &str) -> Result<(), EventError> {
        let malformed = |reason: &str| EventError::Malformed {
            event: event.to_string(),
            reason: reason.to_string(),
        };
        match self {
            Self::EntityCreated(e) | Self::EntityUpdated(e) | Self::EntityDeleted(e) => {
                if e.id.is_blank() {
                    return Err(malformed("entity id is empty"));
                }
            }
            Self::LockChanged(e) => {
                if e.id.is_blank() {
                    return Err(malformed("entity id is empty"));
                }
            }
            Self::AclUpdated(AclUpdated { ids, .. }) | Self::AclRevoked(AclRevoked { ids, .. }) => {
                if ids.is_empty() {
                    return Err(malformed("ids list is empty"));
                }
            }
            Self::StatusChanged(_) | Self::UrlChanged(_) => {}
        }
        Ok(())
    }
}

fn decode<T: serde::de::DeserializeOwned>(frame: &EventFrame) -> Result<T, EventError> {
    serde_json::from_value(frame.data.clone()).map_err(|error| EventError::Malformed {
        event: frame.event.clone(),
        reason: error.to_string(),
    })
}

fn joined_ids(ids: &[DocumentId]) -> String {
    let mut sorted = ids.to_vec();
    sorted.sort_unstable();
    sorted.dedup();
    sorted.iter().map(u64::to_string).collect::<Vec<_>>().join(",")
}
