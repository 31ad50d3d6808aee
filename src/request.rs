//! Incoming HTTP request type.

use std::collections::HashMap;
use std::net::SocketAddr;

use bytes::Bytes;

use crate::context::{Cancellation, RequestContext};

/// An incoming HTTP request with its body fully read.
///
/// Carries the request's [`RequestContext`] and [`Cancellation`] explicitly,
/// so every middleware and the handler see the same correlation data.
pub struct Request {
    pub(crate) parts: http::request::Parts,
    pub(crate) body: Bytes,
    pub(crate) params: HashMap<String, String>,
    pub(crate) context: RequestContext,
    pub(crate) cancellation: Cancellation,
}

impl Request {
    /// Wraps a buffered request and resolves its context.
    ///
    /// This is the pipeline entry point: the server calls it once per
    /// request, tests call it to drive a [`Router`](crate::Router) directly.
    pub fn from_http(req: http::Request<Bytes>, remote_addr: SocketAddr) -> Self {
        let (parts, body) = req.into_parts();
        let context = RequestContext::resolve(&parts, remote_addr);
        Self {
            parts,
            body,
            params: HashMap::new(),
            context,
            cancellation: Cancellation::default(),
        }
    }

    pub fn method(&self) -> &http::Method { &self.parts.method }
    pub fn path(&self) -> &str { self.parts.uri.path() }
    pub fn uri(&self) -> &http::Uri { &self.parts.uri }
    pub fn headers(&self) -> &http::HeaderMap { &self.parts.headers }
    pub fn body(&self) -> &[u8] { &self.body }
    pub fn context(&self) -> &RequestContext { &self.context }
    pub fn cancellation(&self) -> &Cancellation { &self.cancellation }

    /// Case-insensitive header lookup. Non-UTF-8 values read as absent.
    pub fn header(&self, name: impl http::header::AsHeaderName) -> Option<&str> {
        self.parts.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns a named path parameter.
    ///
    /// For a route `/todos/{id}`, `req.param("id")` on `/todos/42` returns `Some("42")`.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    pub(crate) fn with_cancellation(mut self, cancellation: Cancellation) -> Self {
        self.cancellation = cancellation;
        self
    }
}
