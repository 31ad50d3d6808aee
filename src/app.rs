//! Application router: routes plus the standard middleware stack.

use std::sync::Arc;
use std::time::Duration;

use crate::health;
use crate::middleware::{AccessLog, Cors, CorsPolicy, Recover, Timeout};
use crate::router::Router;
use crate::todos::{self, TodoStore};

/// Builds the service router.
///
/// Layers run outermost first: access log, CORS, panic recovery, timeout.
/// The access log therefore sees every request, including preflights and
/// requests whose handler panicked or timed out.
pub fn app(store: Arc<TodoStore>, request_timeout: Duration) -> Router {
    Router::new()
        .layer(AccessLog)
        .layer(Cors::new(CorsPolicy::default()))
        .layer(Recover)
        .layer(Timeout::new(request_timeout))
        .post("/add", todos::add)
        .get("/todos", todos::list(store))
        .get("/ping", health::ping)
}
