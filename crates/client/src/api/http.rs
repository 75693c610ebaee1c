// reqwest implementation of the REST boundary.
//
// Every request carries the session's bearer token and a fresh
// `x-request-id`. Success bodies are `{ "data": ... }` envelopes; error bodies
// are `{ "error": { "code", "message" } }` and map onto `ClientError` by
// status.

use std::time::Duration;

use reqwest::{Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use strata_common::protocol::rest::{
    route, DocumentQuery, DocumentTransferRequest, Envelope, ErrorEnvelope, InsertRequest,
    LayerSetRequest, RemoveRequest, RenameLayerRequest, TransferRequest,
};
use strata_common::types::{DocumentPage, LayerSummary, Node, RootKey};

use super::TreeApi;
use crate::error::ClientError;
use crate::session::{Session, SessionHandle};

const REQUEST_ID_HEADER: &str = "x-request-id";

#[derive(Debug, Clone)]
pub struct HttpTreeApi {
    http: reqwest::Client,
    session: SessionHandle,
}

impl HttpTreeApi {
    pub fn new(session: SessionHandle, timeout: Duration) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("strata/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { http, session })
    }

    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    /// Swap the credential or endpoint. In-flight requests keep the session
    /// they started with.
    pub fn set_session(&self, session: Session) {
        self.session.replace(session);
    }

    fn request(
        &self,
        method: Method,
        root: &RootKey,
        tail: &[&str],
    ) -> Result<RequestBuilder, ClientError> {
        let session = self.session.current();
        let mut url = session.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| {
                ClientError::InvalidOperation(format!(
                    "base url `{}` cannot carry a path",
                    session.base_url
                ))
            })?
            .pop_if_empty()
            .extend(route(root, tail));

        let request_id = Uuid::new_v4();
        debug!(method = method.as_str(), url = %url, %request_id, "rest request");
        Ok(self
            .http
            .request(method, url)
            .bearer_auth(&session.token)
            .header(REQUEST_ID_HEADER, request_id.to_string()))
    }

    async fn get<T: DeserializeOwned>(
        &self,
        root: &RootKey,
        tail: &[&str],
    ) -> Result<T, ClientError> {
        let response = self.request(Method::GET, root, tail)?.send().await?;
        decode(response).await
    }

    async fn send_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        method: Method,
        root: &RootKey,
        tail: &[&str],
        body: &B,
    ) -> Result<T, ClientError> {
        let response = self.request(method, root, tail)?.json(body).send().await?;
        decode(response).await
    }

    /// For calls whose success body carries nothing the client reads.
    async fn send_unit<B: Serialize + ?Sized>(
        &self,
        method: Method,
        root: &RootKey,
        tail: &[&str],
        body: Option<&B>,
    ) -> Result<(), ClientError> {
        let mut request = self.request(method, root, tail)?;
        if let Some(body) = body {
            request = request.json(body);
        }
        check_status(request.send().await?).await.map(drop)
    }
}

async fn check_status(response: Response) -> Result<Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let message = match serde_json::from_str::<ErrorEnvelope>(&body) {
        Ok(envelope) => envelope.error.message,
        Err(_) if body.trim().is_empty() => {
            status.canonical_reason().unwrap_or("request failed").to_string()
        }
        Err(_) => body,
    };
    Err(ClientError::from_status(status.as_u16(), message))
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ClientError> {
    let bytes = check_status(response).await?.bytes().await?;
    serde_json::from_slice::<Envelope<T>>(&bytes)
        .map(Envelope::into_data)
        .map_err(|error| ClientError::Decode(error.to_string()))
}

impl TreeApi for HttpTreeApi {
    async fn fetch_tree(&self, root: &RootKey) -> Result<Node, ClientError> {
        self.get(root, &["tree"]).await
    }

    async fn fetch_layers(&self, root: &RootKey) -> Result<Vec<LayerSummary>, ClientError> {
        self.get(root, &["layers"]).await
    }

    async fn fetch_documents(
        &self,
        root: &RootKey,
        query: &DocumentQuery,
    ) -> Result<DocumentPage, ClientError> {
        let response = self
            .request(Method::GET, root, &["documents"])?
            .query(&query.query_pairs())
            .send()
            .await?;
        decode(response).await
    }

    async fn insert(&self, root: &RootKey, request: &InsertRequest) -> Result<(), ClientError> {
        self.send_unit(Method::POST, root, &["tree", "nodes"], Some(request)).await
    }

    async fn remove(&self, root: &RootKey, request: &RemoveRequest) -> Result<(), ClientError> {
        self.send_unit(Method::DELETE, root, &["tree", "nodes"], Some(request)).await
    }

    async fn move_node(
        &self,
        root: &RootKey,
        request: &TransferRequest,
    ) -> Result<(), ClientError> {
        self.send_unit(Method::POST, root, &["tree", "move"], Some(request)).await
    }

    async fn copy_node(
        &self,
        root: &RootKey,
        request: &TransferRequest,
    ) -> Result<(), ClientError> {
        self.send_unit(Method::POST, root, &["tree", "copy"], Some(request)).await
    }

    async fn rename_layer(
        &self,
        root: &RootKey,
        request: &RenameLayerRequest,
    ) -> Result<LayerSummary, ClientError> {
        self.send_json(Method::POST, root, &["layers", "rename"], request).await
    }

    async fn merge_layers(
        &self,
        root: &RootKey,
        layer_id: &str,
        request: &LayerSetRequest,
    ) -> Result<(), ClientError> {
        self.send_unit(Method::POST, root, &["layers", layer_id, "merge"], Some(request)).await
    }

    async fn subtract_layers(
        &self,
        root: &RootKey,
        layer_id: &str,
        request: &LayerSetRequest,
    ) -> Result<(), ClientError> {
        self.send_unit(Method::POST, root, &["layers", layer_id, "subtract"], Some(request)).await
    }

    async fn lock_layer(
        &self,
        root: &RootKey,
        layer_id: &str,
    ) -> Result<LayerSummary, ClientError> {
        let response =
            self.request(Method::POST, root, &["layers", layer_id, "lock"])?.send().await?;
        decode(response).await
    }

    async fn unlock_layer(
        &self,
        root: &RootKey,
        layer_id: &str,
    ) -> Result<LayerSummary, ClientError> {
        let response =
            self.request(Method::POST, root, &["layers", layer_id, "unlock"])?.send().await?;
        decode(response).await
    }

    async fn delete_layer(&self, root: &RootKey, layer_id: &str) -> Result<(), ClientError> {
        self.send_unit::<()>(Method::DELETE, root, &["layers", layer_id], None).await
    }

    async fn copy_documents(
        &self,
        root: &RootKey,
        request: &DocumentTransferRequest,
    ) -> Result<(), ClientError> {
        self.send_unit(Method::POST, root, &["documents", "copy"], Some(request)).await
    }

    async fn move_documents(
        &self,
        root: &RootKey,
        request: &DocumentTransferRequest,
    ) -> Result<(), ClientError> {
        self.send_unit(Method::POST, root, &["documents", "move"], Some(request)).await
    }
}
