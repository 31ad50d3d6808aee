//! HTTP status codes as a typed enum.
//!
//! Use [`Status`] anywhere a status code is accepted: `Response::status()`,
//! `Response::builder().status()`, or as a bare handler return value.
//!
//! ```rust
//! use tally::{Response, Status};
//!
//! Response::builder()
//!     .status(Status::NotFound)
//!     .json(br#"{"message":"no todos in memory"}"#.to_vec());
//!
//! async fn add(_req: tally::Request) -> Status {
//!     Status::NotFound
//! }
//! ```

/// The status codes the service produces.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Status {
    // ── 2xx Success ───────────────────────────────────────────────────────────
    Ok,                  // 200

    // ── 4xx Client errors ─────────────────────────────────────────────────────
    BadRequest,          // 400
    NotFound,            // 404
    MethodNotAllowed,    // 405
    RequestTimeout,      // 408
    PayloadTooLarge,     // 413

    // ── 5xx Server errors ─────────────────────────────────────────────────────
    InternalServerError, // 500
    GatewayTimeout,      // 504
}

impl From<Status> for u16 {
    fn from(s: Status) -> u16 {
        match s {
            Status::Ok                  => 200,
            Status::BadRequest          => 400,
            Status::NotFound            => 404,
            Status::MethodNotAllowed    => 405,
            Status::RequestTimeout      => 408,
            Status::PayloadTooLarge     => 413,
            Status::InternalServerError => 500,
            Status::GatewayTimeout      => 504,
        }
    }
}
