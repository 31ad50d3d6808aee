//! Request deadline.

use std::time::Duration;

use tracing::warn;

use crate::context::Cancellation;
use crate::handler::BoxFuture;
use crate::middleware::{Middleware, Next};
use crate::request::Request;
use crate::response::Response;
use crate::status::Status;

/// Bounds everything below this layer by a fixed deadline.
///
/// The rest of the chain runs on its own task with a fresh
/// [`Cancellation`] installed on the request. If the deadline passes first,
/// the caller gets `504 Gateway Timeout`, the cancellation fires, and the
/// task is left to notice and finish on its own; its response is discarded.
/// Cancellation also fires when the request completes or is abandoned, so
/// background work spawned by a handler can key off it.
pub struct Timeout {
    duration: Duration,
}

impl Timeout {
    pub const DEFAULT: Duration = Duration::from_secs(25);

    pub fn new(duration: Duration) -> Self {
        Self { duration }
    }
}

impl Default for Timeout {
    fn default() -> Self { Self::new(Self::DEFAULT) }
}

impl Middleware for Timeout {
    fn handle(&self, req: Request, next: Next) -> BoxFuture {
        let duration = self.duration;
        let cancellation = Cancellation::new();
        let request_id = req.context().request_id().to_owned();
        let req = req.with_cancellation(cancellation.clone());

        Box::pin(async move {
            let _cancel = cancellation.cancel_on_drop();
            let mut task = tokio::spawn(next.run(req));

            match tokio::time::timeout(duration, &mut task).await {
                Ok(Ok(response)) => response,
                // Re-raise so the recovery layer above sees the handler's panic.
                Ok(Err(e)) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
                Ok(Err(e)) => {
                    warn!(request_id = %request_id, error = %e, "handler task cancelled");
                    Response::status(Status::InternalServerError)
                }
                Err(_) => {
                    cancellation.cancel();
                    warn!(request_id = %request_id, timeout = ?duration, "request timed out");
                    Response::builder()
                        .status(Status::GatewayTimeout)
                        .text("request timed out")
                }
            }
        })
    }
}
