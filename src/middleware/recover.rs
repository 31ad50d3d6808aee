//! Panic recovery.

use std::any::Any;
use std::panic::AssertUnwindSafe;

use futures_util::FutureExt;
use tracing::error;

use crate::handler::BoxFuture;
use crate::middleware::{Middleware, Next};
use crate::request::Request;
use crate::response::Response;
use crate::status::Status;

/// Converts a panic anywhere below this layer into a `500 Internal Server Error`.
///
/// Without it a panicking handler takes down its connection task and the
/// client sees a reset instead of a response. The request's other layers, the
/// connection and the accept loop keep running either way.
pub struct Recover;

impl Middleware for Recover {
    fn handle(&self, req: Request, next: Next) -> BoxFuture {
        let request_id = req.context().request_id().to_owned();
        Box::pin(async move {
            match AssertUnwindSafe(next.run(req)).catch_unwind().await {
                Ok(response) => response,
                Err(panic) => {
                    error!(
                        request_id = %request_id,
                        panic = panic_message(panic.as_ref()),
                        "handler panicked"
                    );
                    Response::status(Status::InternalServerError)
                }
            }
        })
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "non-string panic payload"
    }
}
