//! Liveness probe.
//!
//! | Path | Question |
//! |---|---|
//! | `/ping` | Is the process alive and able to answer HTTP? |
//!
//! The handler has no dependencies, so it answers the same way under any
//! load as long as the accept loop and runtime are healthy.

use crate::{Request, Response};

/// Body returned by [`ping`].
pub const PING_BODY: &str = "devaaa";

/// Always `200 OK` with [`PING_BODY`] as plain text.
pub async fn ping(_req: Request) -> Response {
    Response::text(PING_BODY)
}
