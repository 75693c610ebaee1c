// End-to-end replica scenarios against the in-process authority.

use std::time::Duration;

use serde_json::json;
use tokio::time::Instant;

use strata_client::api::TreeApi;
use strata_client::{ClientConfig, ClientError, MemoryTreeApi, Replica};
use strata_common::address::{from_address, to_address};
use strata_common::path::{canonical_path, resolve, walk};
use strata_common::protocol::live::EventFrame;
use strata_common::protocol::rest::DocumentQuery;
use strata_common::types::{DocumentPage, DocumentRef, FilterState, Node, RootKey};

fn root() -> RootKey {
    RootKey::Workspace("w1".into())
}

fn replica_with(tree: Node) -> Replica<MemoryTreeApi> {
    let api = MemoryTreeApi::new().with_tree(root(), tree);
    Replica::new(api, root(), &ClientConfig::default())
}

fn work_only() -> Node {
    Node::root("root").with_children(vec![Node::layer("L1", "work")])
}

fn a_b() -> Node {
    Node::root("root")
        .with_children(vec![Node::layer("A", "a").with_children(vec![Node::layer("B", "b")])])
}

#[tokio::test]
async fn every_loaded_node_round_trips_through_its_canonical_path() {
    let mut replica = replica_with(a_b());
    replica.insert("/x/y/z", true).await.unwrap();
    let tree = replica.tree().unwrap();
    for (_, node) in walk(&tree) {
        let path = canonical_path(&tree, &node.id).unwrap();
        assert_eq!(resolve(&tree, &path).unwrap().id, node.id);
    }
}

#[tokio::test]
async fn insert_with_auto_create_then_query_empty_layer() {
    let mut replica = replica_with(work_only());
    replica.load().await.unwrap();

    replica.insert("/work/2024", true).await.unwrap();
    assert!(resolve(&replica.tree().unwrap(), "/work/2024").is_some());

    let query = DocumentQuery {
        path: "/work/2024".into(),
        features: vec![],
        filters: vec![],
        page: 1,
        page_size: 50,
    };
    let page = replica.api().fetch_documents(&root(), &query).await.unwrap();
    assert_eq!(page, DocumentPage { documents: vec![], total_count: 0 });

    replica.navigate("/work/2024").await.unwrap();
    assert_eq!(replica.documents(), Some(&DocumentPage::default()));
}

#[tokio::test]
async fn insert_without_auto_create_needs_the_ancestor() {
    let mut replica = replica_with(work_only());
    replica.load().await.unwrap();
    let error = replica.insert("/home/2024", false).await.unwrap_err();
    assert!(matches!(error, ClientError::NotFound(_)));
}

#[tokio::test]
async fn remove_non_empty_needs_recursive() {
    let tree = Node::root("root").with_children(vec![
        Node::layer("L1", "work").with_children(vec![Node::layer("L2", "2024")])
    ]);
    let mut replica = replica_with(tree);
    replica.load().await.unwrap();

    let error = replica.remove("/work", false).await.unwrap_err();
    assert!(matches!(error, ClientError::Conflict(_)));
    assert!(resolve(&replica.tree().unwrap(), "/work").is_some());

    replica.remove("/work", true).await.unwrap();
    assert!(resolve(&replica.tree().unwrap(), "/work").is_none());
}

#[tokio::test]
async fn move_and_copy_need_a_resolvable_source() {
    let mut replica = replica_with(work_only());
    replica.load().await.unwrap();
    let error = replica.move_node("/missing", "/work", true).await.unwrap_err();
    assert!(matches!(error, ClientError::NotFound(_)));
    let error = replica.copy_node("/missing", "/work", true).await.unwrap_err();
    assert!(matches!(error, ClientError::NotFound(_)));
}

#[tokio::test]
async fn rename_root_is_rejected_without_any_call() {
    let mut replica = replica_with(work_only());
    let error = replica.rename("/", "top").await.unwrap_err();
    assert!(matches!(error, ClientError::InvalidOperation(_)));
    assert!(replica.api().calls().is_empty());
}

#[tokio::test]
async fn selection_follows_rename_before_any_refetch() {
    let mut replica = replica_with(a_b());
    replica.load().await.unwrap();
    replica.navigate("/a/b").await.unwrap();

    // The follow-up reload fails, so only the rename response can have
    // moved the selection.
    replica.api().fail_next("fetch_tree", ClientError::Network("offline".into()));
    let error = replica.rename("/a/b", "c").await.unwrap_err();
    assert!(matches!(error, ClientError::RefreshFailed(_)));

    assert_eq!(replica.selected_path(), "/a/c");
    assert_eq!(from_address(&replica.address()).unwrap().path, "/a/c");
    assert_eq!(replica.pager().path(), "/a/c");
}

#[tokio::test]
async fn selection_under_renamed_ancestor_is_rewritten() {
    let mut replica = replica_with(a_b());
    replica.load().await.unwrap();
    replica.navigate("/a/b").await.unwrap();

    let renamed = replica.rename("/a", "alpha").await.unwrap();
    assert_eq!(renamed.name, "alpha");
    assert_eq!(replica.selected_path(), "/alpha/b");
    assert!(resolve(&replica.tree().unwrap(), "/alpha/b").is_some());
}

#[tokio::test]
async fn path_or_filter_change_resets_page() {
    let tree = Node::root("root")
        .with_children(vec![Node::layer("L1", "work"), Node::layer("L2", "home")]);
    let api = MemoryTreeApi::new().with_tree(root(), tree);
    for id in 1..=30 {
        let doc = DocumentRef::new(id, format!("doc {id}"));
        api.add_document(&root(), "/work", doc, ["pdf"]).unwrap();
    }
    let mut config = ClientConfig::default();
    config.paging.page_size = 10;
    let mut replica = Replica::new(api, root(), &config);
    replica.load().await.unwrap();
    replica.navigate("/work").await.unwrap();

    replica.set_page(3).await.unwrap();
    assert_eq!(replica.pager().page(), 3);
    assert_eq!(replica.documents().unwrap().documents[0].id, 21);

    replica.toggle_feature("pdf").await.unwrap();
    assert_eq!(replica.pager().page(), 1);

    replica.set_page(2).await.unwrap();
    replica.navigate("/home").await.unwrap();
    assert_eq!(replica.pager().page(), 1);
}

#[tokio::test]
async fn address_restores_path_and_filters() {
    let tree = Node::root("root").with_children(vec![Node::layer("L1", "work")]);
    let mut replica = replica_with(tree);
    replica.load().await.unwrap();
    replica.navigate("/work").await.unwrap();
    replica.toggle_feature("pdf").await.unwrap();
    replica.toggle_filter("urgent").await.unwrap();
    let address = replica.address();

    let location = from_address(&address).unwrap();
    assert_eq!(location.path, "/work");
    assert_eq!(location.filters, FilterState::new(["pdf"], ["urgent"]));

    let mut other = replica_with(Node::root("root").with_children(vec![Node::layer("L1", "work")]));
    other.open_address(&address).await.unwrap();
    assert_eq!(other.address(), address);
}

fn other_root() -> RootKey {
    RootKey::Workspace("w2".into())
}

fn two_roots() -> Replica<MemoryTreeApi> {
    let other = Node::root("root2").with_children(vec![Node::layer("X", "x")]);
    let api = MemoryTreeApi::new().with_tree(root(), work_only()).with_tree(other_root(), other);
    Replica::new(api, root(), &ClientConfig::default())
}

#[tokio::test]
async fn deep_link_to_another_root_records_one_entry_and_back_returns() {
    let mut replica = two_roots();
    replica.load().await.unwrap();
    replica.navigate("/work").await.unwrap();
    let start = replica.address();

    let target = to_address(&other_root(), "/x", &FilterState::default());
    replica.open_address(&target).await.unwrap();
    assert_eq!(replica.root(), &other_root());
    assert_eq!(replica.selected_path(), "/x");
    assert_eq!(replica.address(), target);

    let home = to_address(&root(), "/", &FilterState::default());
    assert_eq!(replica.navigator().entries(), [home, start.clone(), target.clone()]);

    assert!(replica.back().await.unwrap());
    assert_eq!(replica.root(), &root());
    assert_eq!(replica.selected_path(), "/work");
    assert_eq!(replica.address(), start);

    assert!(replica.forward().await.unwrap());
    assert_eq!(replica.address(), target);
    assert_eq!(replica.navigator().len(), 3);
}

#[tokio::test]
async fn unresolvable_address_on_another_root_changes_nothing() {
    let mut replica = two_roots();
    replica.load().await.unwrap();
    replica.navigate("/work").await.unwrap();
    let start = replica.address();

    let missing = to_address(&other_root(), "/missing", &FilterState::default());
    let error = replica.open_address(&missing).await.unwrap_err();
    assert!(matches!(error, ClientError::NotFound(_)), "{error:?}");

    assert_eq!(replica.root(), &root());
    assert_eq!(replica.selected_path(), "/work");
    assert_eq!(replica.address(), start);
    assert_eq!(replica.pager().path(), "/work");
    assert!(resolve(&replica.tree().unwrap(), "/work").is_some());
    assert_eq!(replica.navigator().len(), 2);
}

#[tokio::test]
async fn unresolvable_address_on_the_same_root_changes_nothing() {
    let mut replica = two_roots();
    replica.load().await.unwrap();
    replica.navigate("/work").await.unwrap();
    let start = replica.address();

    let missing = to_address(&root(), "/gone", &FilterState::new(["pdf"], ["urgent"]));
    assert!(replica.open_address(&missing).await.is_err());
    assert_eq!(replica.address(), start);
    assert_eq!(replica.navigator().len(), 2);
}

#[tokio::test]
async fn duplicate_status_events_apply_once_with_latest_payload() {
    let tree = Node::root("root").with_children(vec![Node::layer("L1", "work")]);
    let mut replica = replica_with(tree);
    replica.api().add_document(&root(), "/work", DocumentRef::new(42, "report"), ["pdf"]).unwrap();
    replica.load().await.unwrap();
    replica.navigate("/work").await.unwrap();

    let now = Instant::now();
    let first = EventFrame::new("status-changed", json!({ "id": 42, "status": "queued" }));
    let second = EventFrame::new("status-changed", json!({ "id": 42, "status": "indexed" }));
    replica.handle_frame_at(&first, now).await.unwrap();
    replica.handle_frame_at(&second, now + Duration::from_millis(600)).await.unwrap();

    let notices = replica.apply_ready_at(now + Duration::from_millis(1000));
    assert_eq!(notices.len(), 1);
    let doc = &replica.documents().unwrap().documents[0];
    assert_eq!(doc.status.as_deref(), Some("indexed"));

    // Nothing else is held.
    assert!(replica.apply_ready_at(now + Duration::from_secs(5)).is_empty());
}

#[tokio::test]
async fn partial_document_updates_in_one_window_all_apply() {
    let tree = Node::root("root").with_children(vec![Node::layer("L1", "work")]);
    let mut replica = replica_with(tree);
    replica.api().add_document(&root(), "/work", DocumentRef::new(9, "old"), ["pdf"]).unwrap();
    replica.load().await.unwrap();
    replica.navigate("/work").await.unwrap();

    let update = |changes: serde_json::Value| {
        EventFrame::new(
            "entity-updated",
            json!({ "entity": "document", "id": 9, "changes": changes }),
        )
    };
    let now = Instant::now();
    replica.handle_frame_at(&update(json!({ "title": "new" })), now).await.unwrap();
    let later = now + Duration::from_millis(100);
    replica.handle_frame_at(&update(json!({ "status": "done" })), later).await.unwrap();

    replica.apply_ready_at(now + Duration::from_millis(1000));
    let doc = &replica.documents().unwrap().documents[0];
    assert_eq!(doc.title, "new");
    assert_eq!(doc.status.as_deref(), Some("done"));
}

#[tokio::test]
async fn identical_structural_events_reload_once() {
    let mut replica = replica_with(work_only());
    replica.load().await.unwrap();
    replica.api().clear_calls();

    let frame = EventFrame::new("entity-created", json!({ "entity": "layer", "id": "L7" }));
    let now = Instant::now();
    let first = replica.handle_frame_at(&frame, now).await.unwrap();
    let second = replica.handle_frame_at(&frame, now + Duration::from_millis(100)).await.unwrap();

    assert_eq!(first.len(), 1);
    assert!(second.is_empty());
    assert_eq!(replica.api().call_count("fetch_tree"), 1);
}

#[tokio::test]
async fn malformed_events_are_dropped_quietly() {
    let mut replica = replica_with(work_only());
    replica.load().await.unwrap();
    replica.api().clear_calls();

    let frames = [
        EventFrame::new("entity-deleted", json!({ "entity": "layer" })),
        EventFrame::new("acl-revoked", json!({ "ids": [] })),
        EventFrame::new("mystery", json!({ "id": 1 })),
    ];
    for frame in &frames {
        assert!(replica.handle_frame(frame).await.unwrap().is_empty());
    }
    assert!(replica.api().calls().is_empty());
}
