// REST boundary: payload envelope, request bodies and route table.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{DocumentId, NodeId, RootKey, RootKind};

/// Every successful response wraps its payload in `data`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Envelope<T> {
    pub data: T,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
}

impl<T> Envelope<T> {
    pub fn new(data: T) -> Self {
        Self { data, meta: None }
    }

    pub fn into_data(self) -> T {
        self.data
    }
}

/// Error body returned alongside non-success statuses.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorEnvelope {
    pub error: ErrorBody,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

// ── Request bodies ─────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InsertRequest {
    pub path: String,
    pub auto_create: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RemoveRequest {
    pub path: String,
    pub recursive: bool,
}

/// Body for both tree move and tree copy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TransferRequest {
    pub from: String,
    pub to: String,
    pub recursive: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RenameLayerRequest {
    pub layer_id: NodeId,
    pub name: String,
}

/// Body for merge and subtract.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LayerSetRequest {
    pub targets: Vec<NodeId>,
}

/// Body for document copy/move (clipboard paste).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DocumentTransferRequest {
    pub ids: Vec<DocumentId>,
    pub from: String,
    pub to: String,
}

/// Filtered, paginated document query scoped to a path. `page` is 1-based.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DocumentQuery {
    pub path: String,
    pub features: Vec<String>,
    pub filters: Vec<String>,
    pub page: u32,
    pub page_size: u32,
}

impl DocumentQuery {
    /// Query-string pairs. Filters repeat in order; the server sees them
    /// exactly as the client holds them.
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![("path", self.path.clone())];
        pairs.extend(self.features.iter().map(|f| ("feature", f.clone())));
        pairs.extend(self.filters.iter().map(|f| ("filter", f.clone())));
        pairs.push(("page", self.page.to_string()));
        pairs.push(("page_size", self.page_size.to_string()));
        pairs
    }
}

// ── Routes ─────────────────────────────────────────────────────────

/// Every endpoint the client consumes, as (method, template).
pub const ENDPOINTS: &[(&str, &str)] = &[
    ("GET", "/v1/{root}/tree"),
    ("GET", "/v1/{root}/layers"),
    ("GET", "/v1/{root}/documents"),
    ("POST", "/v1/{root}/tree/nodes"),
    ("DELETE", "/v1/{root}/tree/nodes"),
    ("POST", "/v1/{root}/tree/move"),
    ("POST", "/v1/{root}/tree/copy"),
    ("POST", "/v1/{root}/layers/rename"),
    ("POST", "/v1/{root}/layers/{layer_id}/merge"),
    ("POST", "/v1/{root}/layers/{layer_id}/subtract"),
    ("POST", "/v1/{root}/layers/{layer_id}/lock"),
    ("POST", "/v1/{root}/layers/{layer_id}/unlock"),
    ("DELETE", "/v1/{root}/layers/{layer_id}"),
    ("POST", "/v1/{root}/documents/copy"),
    ("POST", "/v1/{root}/documents/move"),
];

/// Path segments (unencoded) for the root prefix, e.g. `["v1", "workspaces", "w1"]`.
pub fn root_segments(root: &RootKey) -> [&str; 3] {
    let collection = match root.kind() {
        RootKind::Workspace => "workspaces",
        RootKind::Context => "contexts",
    };
    ["v1", collection, root.id()]
}

/// Segments for an endpoint below the root prefix.
pub fn route<'a>(root: &'a RootKey, tail: &[&'a str]) -> Vec<&'a str> {
    let mut segments = root_segments(root).to_vec();
    segments.extend_from_slice(tail);
    segments
}
