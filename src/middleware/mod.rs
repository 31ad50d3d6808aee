//! Middleware layer.
//!
//! Middleware wraps the rest of the chain and is the place for cross-cutting
//! concerns. Each layer receives the [`Request`] (which carries its
//! [`RequestContext`](crate::RequestContext)) and a [`Next`] cursor; it can
//! answer directly, or call [`Next::run`] and work on the response on the way
//! back out.
//!
//! Built-in layers, in the order the application stacks them:
//!
//! | Layer | Job |
//! |---|---|
//! | [`AccessLog`] | entry and exit log lines keyed by request id |
//! | [`Cors`] | preflight answers and CORS response headers |
//! | [`Recover`] | turns a handler panic into a `500` |
//! | [`Timeout`] | bounds the handler, answers `504` on expiry |

mod access_log;
mod cors;
mod recover;
mod timeout;

use std::sync::Arc;

pub use access_log::AccessLog;
pub use cors::{AllowedOrigins, Cors, CorsPolicy};
pub use recover::Recover;
pub use timeout::Timeout;

use crate::handler::{BoxFuture, BoxedHandler};
use crate::request::Request;

/// A layer in the request pipeline.
///
/// ```rust
/// use tally::middleware::{Middleware, Next};
/// use tally::{BoxFuture, Request};
///
/// struct PassThrough;
///
/// impl Middleware for PassThrough {
///     fn handle(&self, req: Request, next: Next) -> BoxFuture {
///         Box::pin(async move { next.run(req).await })
///     }
/// }
/// ```
pub trait Middleware: Send + Sync + 'static {
    fn handle(&self, req: Request, next: Next) -> BoxFuture;
}

pub(crate) type BoxedMiddleware = Arc<dyn Middleware>;

/// Cursor into the remaining chain for one request.
///
/// Consumed by [`run`](Next::run), so a layer can hand the request on at
/// most once.
pub struct Next {
    chain: Arc<Vec<BoxedMiddleware>>,
    index: usize,
    endpoint: BoxedHandler,
}

impl Next {
    pub(crate) fn new(chain: Arc<Vec<BoxedMiddleware>>, endpoint: BoxedHandler) -> Self {
        Self { chain, index: 0, endpoint }
    }

    /// Runs the next layer, or the route handler once the layers are exhausted.
    pub fn run(mut self, req: Request) -> BoxFuture {
        match self.chain.get(self.index).cloned() {
            Some(layer) => {
                self.index += 1;
                layer.handle(req, self)
            }
            None => self.endpoint.call(req),
        }
    }
}
