//! # tally
//!
//! A small todo HTTP service and the request pipeline around it.
//!
//! The routes are trivial. The interesting part is what every request passes
//! through on its way to them, and how the process starts and stops:
//!
//! - **Correlation** — a request id (the caller's `X-Request-Id`, or a fresh
//!   UUID) and a best-effort client IP from `True-Client-IP`, `X-Real-IP`
//!   or the leftmost `X-Forwarded-For` entry
//! - **Access log** — one structured line in, one line out with the elapsed
//!   time, joined by request id
//! - **CORS** — preflights answered at the edge, response headers added
//! - **Panic recovery** — a panicking handler costs one `500`, not a connection
//! - **Timeout** — a deadline with cooperative cancellation and a `504`
//! - **Graceful shutdown** — stop accepting, drain in-flight requests within
//!   a grace period, stop
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use tally::{Server, TodoStore, app, shutdown_signal};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), tally::Error> {
//!     let store: TodoStore = [(1, "write docs"), (2, "ship it")].into_iter().collect();
//!     let router = app(Arc::new(store), Duration::from_secs(25));
//!
//!     let server = Server::bind(([0, 0, 0, 0], 8080).into()).listen(router).await?;
//!     shutdown_signal().await;
//!     server.shutdown().await
//! }
//! ```

mod app;
mod context;
mod error;
mod handler;
mod method;
mod request;
mod response;
mod router;
mod server;
mod status;

pub mod config;
pub mod correlation;
pub mod health;
pub mod middleware;
pub mod todos;

pub use app::app;
pub use config::Config;
pub use context::{Cancellation, RequestContext};
pub use error::Error;
pub use handler::{BoxFuture, Handler};
pub use method::Method;
pub use request::Request;
pub use response::{IntoResponse, Json, Response, ResponseBuilder};
pub use router::Router;
pub use server::{Listening, Server, State, shutdown_signal};
pub use status::Status;
pub use todos::TodoStore;
