use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures_util::future::join_all;
use tally::todos::TodosResponse;
use tally::{Request, Router, TodoStore, app, health};

fn request(method: &str, uri: &str) -> Request {
    let req = http::Request::builder()
        .method(method)
        .uri(uri)
        .header("host", "localhost:8080")
        .body(Bytes::new())
        .unwrap();
    Request::from_http(req, "127.0.0.1:50000".parse().unwrap())
}

fn router(store: TodoStore) -> Router {
    app(Arc::new(store), Duration::from_secs(25))
}

// --- todos ---

#[tokio::test]
async fn list_todos_returns_the_configured_entries() {
    let store: TodoStore = [(1, "one"), (2, "two")].into_iter().collect();
    let response = router(store).handle(request("GET", "/todos")).await;

    assert_eq!(response.status_code(), 200);
    let body: TodosResponse = serde_json::from_slice(response.body()).unwrap();
    assert_eq!(
        body.todos,
        Some(BTreeMap::from([(1, "one".to_owned()), (2, "two".to_owned())]))
    );
    assert_eq!(body.message, None);
    assert_eq!(body.error, None);
}

#[tokio::test]
async fn list_todos_on_empty_store_is_404_with_message() {
    let response = router(TodoStore::new()).handle(request("GET", "/todos")).await;

    assert_eq!(response.status_code(), 404);
    let body: TodosResponse = serde_json::from_slice(response.body()).unwrap();
    assert!(body.message.is_some_and(|m| !m.is_empty()));
    assert_eq!(body.todos, None);
}

#[tokio::test]
async fn store_is_not_reseeded_between_requests() {
    let store = Arc::new(TodoStore::new());
    let app = app(Arc::clone(&store), Duration::from_secs(25));

    assert_eq!(app.handle(request("GET", "/todos")).await.status_code(), 404);
    store.insert(7, "added later").await;

    let response = app.handle(request("GET", "/todos")).await;
    let body: TodosResponse = serde_json::from_slice(response.body()).unwrap();
    assert_eq!(body.todos, Some(BTreeMap::from([(7, "added later".to_owned())])));
}

#[tokio::test]
async fn add_is_registered_but_not_implemented() {
    let app = router(TodoStore::new());

    assert_eq!(app.handle(request("POST", "/add")).await.status_code(), 404);

    let wrong_method = app.handle(request("GET", "/add")).await;
    assert_eq!(wrong_method.status_code(), 405);
    assert_eq!(wrong_method.header("allow"), Some("POST"));
}

// --- ping ---

#[tokio::test]
async fn ping_answers_under_concurrent_load() {
    let app = router(TodoStore::new());

    let responses = join_all((0..200).map(|_| app.handle(request("GET", "/ping")))).await;

    assert!(responses.iter().all(|r| r.status_code() == 200));
    assert!(responses.iter().all(|r| r.body() == health::PING_BODY.as_bytes()));
}

// --- pipeline ---

#[tokio::test]
async fn unknown_route_is_404_and_still_gets_cors_headers() {
    let req = http::Request::builder()
        .uri("/nope")
        .header("origin", "https://app.example.com")
        .body(Bytes::new())
        .unwrap();
    let response = router(TodoStore::new())
        .handle(Request::from_http(req, "127.0.0.1:50000".parse().unwrap()))
        .await;

    assert_eq!(response.status_code(), 404);
    assert_eq!(response.header("access-control-allow-origin"), Some("https://app.example.com"));
}

#[tokio::test]
async fn preflight_to_a_get_route_is_answered_by_cors() {
    let req = http::Request::builder()
        .method("OPTIONS")
        .uri("/todos")
        .header("origin", "https://app.example.com")
        .header("access-control-request-method", "GET")
        .header("access-control-request-headers", "x-request-id, x-forwarded-for")
        .body(Bytes::new())
        .unwrap();
    let response = router(TodoStore::new())
        .handle(Request::from_http(req, "127.0.0.1:50000".parse().unwrap()))
        .await;

    assert_eq!(response.status_code(), 200);
    assert_eq!(response.header("access-control-allow-methods"), Some("GET"));
    assert_eq!(
        response.header("access-control-allow-headers"),
        Some("x-request-id, x-forwarded-for")
    );
}
