// REST boundary consumed by the replica.
//
// `TreeApi` abstracts the remote authority so the replica can be driven by the
// reqwest client in production and by an in-process authority in tests.

pub mod http;
#[cfg(any(test, feature = "test-util"))]
pub mod memory;

use std::future::Future;

use strata_common::protocol::rest::{
    DocumentQuery, DocumentTransferRequest, InsertRequest, LayerSetRequest, RemoveRequest,
    RenameLayerRequest, TransferRequest,
};
use strata_common::types::{DocumentPage, LayerSummary, Node, NodeId, RootKey};

use crate::error::ClientError;

pub use http::HttpTreeApi;
#[cfg(any(test, feature = "test-util"))]
pub use memory::MemoryTreeApi;

/// Remote operations on one server-owned tree. Every call is independently
/// fallible and none is retried.
pub trait TreeApi {
    /// Full tree snapshot for a root.
    fn fetch_tree(&self, root: &RootKey)
        -> impl Future<Output = Result<Node, ClientError>> + Send;

    /// Flat layer list for a root.
    fn fetch_layers(
        &self,
        root: &RootKey,
    ) -> impl Future<Output = Result<Vec<LayerSummary>, ClientError>> + Send;

    /// One page of documents visible under a path with filters applied.
    fn fetch_documents(
        &self,
        root: &RootKey,
        query: &DocumentQuery,
    ) -> impl Future<Output = Result<DocumentPage, ClientError>> + Send;

    fn insert(
        &self,
        root: &RootKey,
        request: &InsertRequest,
    ) -> impl Future<Output = Result<(), ClientError>> + Send;

    fn remove(
        &self,
        root: &RootKey,
        request: &RemoveRequest,
    ) -> impl Future<Output = Result<(), ClientError>> + Send;

    fn move_node(
        &self,
        root: &RootKey,
        request: &TransferRequest,
    ) -> impl Future<Output = Result<(), ClientError>> + Send;

    fn copy_node(
        &self,
        root: &RootKey,
        request: &TransferRequest,
    ) -> impl Future<Output = Result<(), ClientError>> + Send;

    /// Rename acts on the layer id. The response carries the renamed layer.
    fn rename_layer(
        &self,
        root: &RootKey,
        request: &RenameLayerRequest,
    ) -> impl Future<Output = Result<LayerSummary, ClientError>> + Send;

    fn merge_layers(
        &self,
        root: &RootKey,
        layer_id: &str,
        request: &LayerSetRequest,
    ) -> impl Future<Output = Result<(), ClientError>> + Send;

    fn subtract_layers(
        &self,
        root: &RootKey,
        layer_id: &str,
        request: &LayerSetRequest,
    ) -> impl Future<Output = Result<(), ClientError>> + Send;

    fn lock_layer(
        &self,
        root: &RootKey,
        layer_id: &str,
    ) -> impl Future<Output = Result<LayerSummary, ClientError>> + Send;

    fn unlock_layer(
        &self,
        root: &RootKey,
        layer_id: &str,
    ) -> impl Future<Output = Result<LayerSummary, ClientError>> + Send;

    fn delete_layer(
        &self,
        root: &RootKey,
        layer_id: &str,
    ) -> impl Future<Output = Result<(), ClientError>> + Send;

    fn copy_documents(
        &self,
        root: &RootKey,
        request: &DocumentTransferRequest,
    ) -> impl Future<Output = Result<(), ClientError>> + Send;

    fn move_documents(
        &self,
        root: &RootKey,
        request: &DocumentTransferRequest,
    ) -> impl Future<Output = Result<(), ClientError>> + Send;
}

/// Layer ids carried by a merge/subtract request, for logging.
pub(crate) fn target_list(targets: &[NodeId]) -> String {
    targets.join(",")
}
