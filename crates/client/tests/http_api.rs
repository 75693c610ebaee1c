// HttpTreeApi against a local axum server that fronts the in-memory
// authority, so the replica runs over real HTTP.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, RawQuery, Request, State};
use axum::http::header::AUTHORIZATION;
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;

use strata_client::api::TreeApi;
use strata_client::{
    ClientConfig, ClientError, ErrorKind, HttpTreeApi, MemoryTreeApi, Replica, Session,
    SessionHandle,
};
use strata_common::path::resolve;
use strata_common::protocol::rest::{
    DocumentQuery, Envelope, ErrorBody, ErrorEnvelope, InsertRequest, RemoveRequest,
    RenameLayerRequest,
};
use strata_common::types::{DocumentRef, Node, RootKey};

const TOKEN: &str = "secret";

#[derive(Clone)]
struct Server {
    authority: Arc<MemoryTreeApi>,
    request_ids: Arc<Mutex<Vec<String>>>,
}

fn workspace(id: String) -> RootKey {
    RootKey::Workspace(id)
}

fn reply<T: Serialize>(result: Result<T, ClientError>) -> Response {
    match result {
        Ok(data) => Json(Envelope::new(data)).into_response(),
        Err(error) => {
            let (status, code) = match error.kind() {
                ErrorKind::NotFound => (StatusCode::NOT_FOUND, "NOT_FOUND"),
                ErrorKind::Conflict => (StatusCode::CONFLICT, "CONFLICT"),
                ErrorKind::InvalidOperation => (StatusCode::UNPROCESSABLE_ENTITY, "INVALID"),
                ErrorKind::Unauthorized => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
                _ => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL"),
            };
            let body = ErrorEnvelope {
                error: ErrorBody { code: code.into(), message: error.to_string() },
            };
            (status, Json(body)).into_response()
        }
    }
}

async fn require_token(State(server): State<Server>, request: Request, next: Next) -> Response {
    if let Some(id) = request.headers().get("x-request-id").and_then(|v| v.to_str().ok()) {
        server.request_ids.lock().unwrap().push(id.to_string());
    }
    let expected = format!("Bearer {TOKEN}");
    let authorized = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value == expected);
    if !authorized {
        return reply::<()>(Err(ClientError::Unauthorized("bad token".into())));
    }
    next.run(request).await
}

async fn tree(State(server): State<Server>, Path(id): Path<String>) -> Response {
    reply(server.authority.fetch_tree(&workspace(id)).await)
}

async fn layers(State(server): State<Server>, Path(id): Path<String>) -> Response {
    reply(server.authority.fetch_layers(&workspace(id)).await)
}

async fn documents(
    State(server): State<Server>,
    Path(id): Path<String>,
    RawQuery(raw): RawQuery,
) -> Response {
    let mut query = DocumentQuery {
        path: "/".into(),
        features: vec![],
        filters: vec![],
        page: 1,
        page_size: 50,
    };
    let raw = raw.unwrap_or_default();
    for (key, value) in url::form_urlencoded::parse(raw.as_bytes()) {
        match &*key {
            "path" => query.path = value.into_owned(),
            "feature" => query.features.push(value.into_owned()),
            "filter" => query.filters.push(value.into_owned()),
            "page" => query.page = value.parse().unwrap_or(1),
            "page_size" => query.page_size = value.parse().unwrap_or(50),
            _ => {}
        }
    }
    reply(server.authority.fetch_documents(&workspace(id), &query).await)
}

async fn insert(
    State(server): State<Server>,
    Path(id): Path<String>,
    Json(request): Json<InsertRequest>,
) -> Response {
    reply(server.authority.insert(&workspace(id), &request).await)
}

async fn remove(
    State(server): State<Server>,
    Path(id): Path<String>,
    Json(request): Json<RemoveRequest>,
) -> Response {
    reply(server.authority.remove(&workspace(id), &request).await)
}

async fn rename(
    State(server): State<Server>,
    Path(id): Path<String>,
    Json(request): Json<RenameLayerRequest>,
) -> Response {
    reply(server.authority.rename_layer(&workspace(id), &request).await)
}

async fn lock(
    State(server): State<Server>,
    Path((id, layer_id)): Path<(String, String)>,
) -> Response {
    reply(server.authority.lock_layer(&workspace(id), &layer_id).await)
}

async fn serve(authority: MemoryTreeApi) -> (SocketAddr, Server) {
    let server = Server {
        authority: Arc::new(authority),
        request_ids: Arc::new(Mutex::new(Vec::new())),
    };
    let app = Router::new()
        .route("/v1/workspaces/{id}/tree", get(tree))
        .route("/v1/workspaces/{id}/layers", get(layers))
        .route("/v1/workspaces/{id}/documents", get(documents))
        .route("/v1/workspaces/{id}/tree/nodes", post(insert).delete(remove))
        .route("/v1/workspaces/{id}/layers/rename", post(rename))
        .route("/v1/workspaces/{id}/layers/{layer_id}/lock", post(lock))
        .layer(middleware::from_fn_with_state(server.clone(), require_token))
        .with_state(server.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, server)
}

fn client(addr: SocketAddr, token: &str) -> HttpTreeApi {
    let session = Session::new(&format!("http://{addr}"), token).unwrap();
    HttpTreeApi::new(SessionHandle::new(session), Duration::from_secs(5)).unwrap()
}

fn root() -> RootKey {
    RootKey::Workspace("w1".into())
}

fn seeded() -> MemoryTreeApi {
    let tree = Node::root("root").with_children(vec![
        Node::layer("L1", "work").with_children(vec![Node::layer("L2", "2023")])
    ]);
    let authority = MemoryTreeApi::new().with_tree(root(), tree);
    authority.add_document(&root(), "/work", DocumentRef::new(1, "plan"), ["pdf"]).unwrap();
    authority.add_document(&root(), "/work", DocumentRef::new(2, "notes"), ["txt"]).unwrap();
    authority
}

#[tokio::test]
async fn replica_loads_and_filters_over_http() {
    let (addr, _server) = serve(seeded()).await;
    let mut replica = Replica::new(client(addr, TOKEN), root(), &ClientConfig::default());

    replica.load().await.unwrap();
    assert!(resolve(&replica.tree().unwrap(), "/work/2023").is_some());
    assert_eq!(replica.layers().unwrap().len(), 2);

    replica.navigate("/work").await.unwrap();
    assert_eq!(replica.documents().unwrap().total_count, 2);

    replica.toggle_feature("pdf").await.unwrap();
    let page = replica.documents().unwrap();
    assert_eq!(page.total_count, 1);
    assert_eq!(page.documents[0].title, "plan");
}

#[tokio::test]
async fn mutations_round_trip_and_map_error_statuses() {
    let (addr, _server) = serve(seeded()).await;
    let mut replica = Replica::new(client(addr, TOKEN), root(), &ClientConfig::default());
    replica.load().await.unwrap();

    replica.insert("/work/2024", false).await.unwrap();
    assert!(resolve(&replica.tree().unwrap(), "/work/2024").is_some());

    let error = replica.remove("/work", false).await.unwrap_err();
    assert!(matches!(error, ClientError::Conflict(_)), "{error:?}");

    let error = replica.insert("/home/2024", false).await.unwrap_err();
    assert!(matches!(error, ClientError::NotFound(_)), "{error:?}");

    replica.navigate("/work/2024").await.unwrap();
    let renamed = replica.rename("/work/2024", "this-year").await.unwrap();
    assert_eq!(renamed.name, "this-year");
    assert_eq!(replica.selected_path(), "/work/this-year");
}

#[tokio::test]
async fn lock_returns_the_updated_summary() {
    let (addr, _server) = serve(seeded()).await;
    let api = client(addr, TOKEN);
    let summary = api.lock_layer(&root(), "L1").await.unwrap();
    assert_eq!(summary.id, "L1");
    assert!(summary.locked);

    let error = api.lock_layer(&root(), "L1").await.unwrap_err();
    assert!(matches!(error, ClientError::Conflict(_)));
}

#[tokio::test]
async fn wrong_token_is_unauthorized() {
    let (addr, _server) = serve(seeded()).await;
    let error = client(addr, "nope").fetch_tree(&root()).await.unwrap_err();
    assert!(matches!(error, ClientError::Unauthorized(_)), "{error:?}");
}

#[tokio::test]
async fn every_request_carries_a_fresh_request_id() {
    let (addr, server) = serve(seeded()).await;
    let api = client(addr, TOKEN);
    api.fetch_tree(&root()).await.unwrap();
    api.fetch_layers(&root()).await.unwrap();

    let ids = server.request_ids.lock().unwrap().clone();
    assert_eq!(ids.len(), 2);
    assert_ne!(ids[0], ids[1]);
    assert!(ids.iter().all(|id| uuid::Uuid::parse_str(id).is_ok()));
}

#[tokio::test]
async fn unreachable_server_is_a_network_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    let error = client(addr, TOKEN).fetch_tree(&root()).await.unwrap_err();
    assert_eq!(error.kind(), ErrorKind::Network);
}
