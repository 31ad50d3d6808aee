//! The todo collection and its routes.
//!
//! The store is created and seeded once at startup and injected into the
//! handlers that need it. Reads take a snapshot under a read lock; writes go
//! through [`TodoStore::insert`] and [`TodoStore::remove`] only.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::handler::Handler;
use crate::request::Request;
use crate::response::{IntoResponse, Json, Response};
use crate::status::Status;

pub type TodoId = i64;

/// Body of `GET /todos`. Absent fields are omitted from the JSON.
#[derive(Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct TodosResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub todos: Option<BTreeMap<TodoId, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// In-memory todo collection shared by the handlers.
#[derive(Debug, Default)]
pub struct TodoStore {
    todos: RwLock<BTreeMap<TodoId, String>>,
}

impl TodoStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a todo, returning the previous text.
    pub async fn insert(&self, id: TodoId, text: impl Into<String>) -> Option<String> {
        self.todos.write().await.insert(id, text.into())
    }

    pub async fn remove(&self, id: TodoId) -> Option<String> {
        self.todos.write().await.remove(&id)
    }

    /// A point-in-time copy of the collection.
    pub async fn snapshot(&self) -> BTreeMap<TodoId, String> {
        self.todos.read().await.clone()
    }
}

impl<S: Into<String>> FromIterator<(TodoId, S)> for TodoStore {
    fn from_iter<I: IntoIterator<Item = (TodoId, S)>>(iter: I) -> Self {
        let todos = iter.into_iter().map(|(id, text)| (id, text.into())).collect();
        Self { todos: RwLock::new(todos) }
    }
}

/// `GET /todos` — the whole collection; `404` with a message when it is empty.
pub fn list(store: Arc<TodoStore>) -> impl Handler {
    move |_req: Request| {
        let store = Arc::clone(&store);
        async move { render(store.snapshot().await) }
    }
}

fn render(todos: BTreeMap<TodoId, String>) -> Response {
    if todos.is_empty() {
        let body = TodosResponse {
            message: Some("no todos in memory".to_owned()),
            ..TodosResponse::default()
        };
        return Json(Status::NotFound, body).into_response();
    }

    let body = TodosResponse {
        todos: Some(todos),
        ..TodosResponse::default()
    };
    Json(Status::Ok, body).into_response()
}

/// `POST /add` — registered so the route exists, but adding is not offered
/// over HTTP yet.
pub async fn add(_req: Request) -> Status {
    Status::NotFound
}
