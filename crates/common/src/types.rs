// Core domain types shared across all Strata crates.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Opaque server-assigned layer identifier. The only stable handle on a node.
pub type NodeId = String;

/// Numeric server-assigned document identifier.
pub type DocumentId = u64;

/// The addressable root a tree snapshot belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum RootKey {
    Workspace(String),
    Context(String),
}

impl RootKey {
    pub fn kind(&self) -> RootKind {
        match self {
            Self::Workspace(_) => RootKind::Workspace,
            Self::Context(_) => RootKind::Context,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Self::Workspace(id) | Self::Context(id) => id,
        }
    }

    pub fn new(kind: RootKind, id: impl Into<String>) -> Self {
        match kind {
            RootKind::Workspace => Self::Workspace(id.into()),
            RootKind::Context => Self::Context(id.into()),
        }
    }
}

impl fmt::Display for RootKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind().as_str(), self.id())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RootKeyError {
    #[error("root key must look like `workspace:<id>` or `context:<id>`, got `{0}`")]
    Malformed(String),

    #[error("unknown root kind `{0}`")]
    UnknownKind(String),
}

impl FromStr for RootKey {
    type Err = RootKeyError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let (kind, id) =
            value.split_once(':').ok_or_else(|| RootKeyError::Malformed(value.to_string()))?;
        if id.is_empty() {
            return Err(RootKeyError::Malformed(value.to_string()));
        }
        let kind = RootKind::from_name(kind).ok_or_else(|| RootKeyError::UnknownKind(kind.into()))?;
        Ok(Self::new(kind, id))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RootKind {
    Workspace,
    Context,
}

impl RootKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Workspace => "workspace",
            Self::Context => "context",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "workspace" => Some(Self::Workspace),
            "context" => Some(Self::Context),
            _ => None,
        }
    }
}

/// Node classification as reported by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    Root,
    Layer,
    Context,
    #[serde(other)]
    Other,
}

/// One layer in a tree snapshot, with its full subtree.
///
/// `name` is only unique among siblings. The same `id` may appear at more
/// than one position when the server exposes a shared layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Node {
    pub id: NodeId,
    pub name: String,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default)]
    pub children: Vec<Node>,
}

impl Node {
    pub fn root(id: impl Into<String>) -> Self {
        Self::new(id, "", NodeType::Root)
    }

    pub fn layer(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(id, name, NodeType::Layer)
    }

    pub fn new(id: impl Into<String>, name: impl Into<String>, node_type: NodeType) -> Self {
        let name = name.into();
        Self {
            id: id.into(),
            label: name.clone(),
            name,
            node_type,
            description: String::new(),
            color: None,
            children: Vec::new(),
        }
    }

    pub fn with_children(mut self, children: Vec<Node>) -> Self {
        self.children = children;
        self
    }

    pub fn is_root(&self) -> bool {
        self.node_type == NodeType::Root
    }

    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }

    /// Direct child by segment name.
    pub fn child(&self, name: &str) -> Option<&Node> {
        self.children.iter().find(|child| child.name == name)
    }

    /// Number of nodes in this subtree, including `self`.
    pub fn subtree_len(&self) -> usize {
        1 + self.children.iter().map(Node::subtree_len).sum::<usize>()
    }
}

/// Flat layer entry returned by the layer list endpoint and by layer admin
/// calls such as rename.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LayerSummary {
    pub id: NodeId,
    pub name: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub locked: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locked_by: Option<String>,
}

/// A document as listed under a path. Association to layers and tags is
/// server-owned; the client only keeps what the last query returned.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocumentRef {
    pub id: DocumentId,
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default)]
    pub locked: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locked_by: Option<String>,
    #[serde(default)]
    pub acl: Vec<String>,
    /// Remaining server-owned fields, kept verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl DocumentRef {
    pub fn new(id: DocumentId, title: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            status: None,
            url: None,
            locked: false,
            locked_by: None,
            acl: Vec::new(),
            extra: Map::new(),
        }
    }

    /// Apply a partial update from an `entity-updated` event. Known fields are
    /// typed; everything else lands in `extra`.
    pub fn apply_changes(&mut self, changes: &Map<String, Value>) {
        for (key, value) in changes {
            match key.as_str() {
                "id" => {}
                "title" => {
                    if let Some(title) = value.as_str() {
                        self.title = title.to_string();
                    }
                }
                "status" => self.status = value.as_str().map(str::to_string),
                "url" => self.url = value.as_str().map(str::to_string),
                "locked" => self.locked = value.as_bool().unwrap_or(false),
                "locked_by" => self.locked_by = value.as_str().map(str::to_string),
                "acl" => {
                    self.acl = value
                        .as_array()
                        .map(|items| {
                            items.iter().filter_map(|v| v.as_str().map(str::to_string)).collect()
                        })
                        .unwrap_or_default();
                }
                _ => {
                    self.extra.insert(key.clone(), value.clone());
                }
            }
        }
    }
}

/// One page of a filtered document query.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DocumentPage {
    #[serde(default)]
    pub documents: Vec<DocumentRef>,
    #[serde(default)]
    pub total_count: u64,
}

impl DocumentPage {
    pub fn document_mut(&mut self, id: DocumentId) -> Option<&mut DocumentRef> {
        self.documents.iter_mut().find(|doc| doc.id == id)
    }
}

/// Active tag filters. Both lists behave as insertion-ordered sets.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct FilterState {
    #[serde(default)]
    pub features: Vec<String>,
    #[serde(default)]
    pub filters: Vec<String>,
}

impl FilterState {
    pub fn new<F, X>(features: F, filters: X) -> Self
    where
        F: IntoIterator,
        F::Item: Into<String>,
        X: IntoIterator,
        X::Item: Into<String>,
    {
        let mut state = Self::default();
        for feature in features {
            insert_unique(&mut state.features, feature.into());
        }
        for filter in filters {
            insert_unique(&mut state.filters, filter.into());
        }
        state
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty() && self.filters.is_empty()
    }

    /// Add the feature if absent, remove it if present. Returns whether it is
    /// now active.
    pub fn toggle_feature(&mut self, feature: &str) -> bool {
        toggle(&mut self.features, feature)
    }

    pub fn toggle_filter(&mut self, filter: &str) -> bool {
        toggle(&mut self.filters, filter)
    }

    pub fn clear(&mut self) {
        self.features.clear();
        self.filters.clear();
    }
}

fn insert_unique(set: &mut Vec<String>, value: String) {
    if !set.contains(&value) {
        set.push(value);
    }
}

fn toggle(set: &mut Vec<String>, value: &str) -> bool {
    if let Some(index) = set.iter().position(|item| item == value) {
        set.remove(index);
        false
    } else {
        set.push(value.to_string());
        true
    }
}
