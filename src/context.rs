//! Per-request context and cooperative cancellation.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::watch;

use crate::correlation;

/// Everything the pipeline knows about a request, resolved once at entry.
///
/// Owned by the [`Request`](crate::Request) it describes and dropped with it.
/// Nothing in here changes after construction.
#[derive(Clone, Debug)]
pub struct RequestContext {
    request_id: String,
    client_ip: String,
    scheme: &'static str,
    protocol: &'static str,
    method: http::Method,
    host: String,
    uri: http::Uri,
    user_agent: String,
    remote_addr: SocketAddr,
    started_at: Instant,
}

impl RequestContext {
    /// Builds the context from request metadata and the peer address.
    ///
    /// The request id and client IP come from the correlation resolver. The
    /// service never terminates TLS itself, so the scheme is `http` unless
    /// the request line carried an absolute `https` URI.
    pub fn resolve(parts: &http::request::Parts, remote_addr: SocketAddr) -> Self {
        let headers = &parts.headers;
        let host = parts
            .uri
            .authority()
            .map(|a| a.as_str().to_owned())
            .or_else(|| {
                headers
                    .get(http::header::HOST)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_owned)
            })
            .unwrap_or_default();

        Self {
            request_id: correlation::request_id(headers),
            client_ip: correlation::client_ip(headers),
            scheme: match parts.uri.scheme_str() {
                Some("https") => "https",
                _ => "http",
            },
            protocol: protocol_name(parts.version),
            method: parts.method.clone(),
            host,
            uri: parts.uri.clone(),
            user_agent: headers
                .get(http::header::USER_AGENT)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_owned(),
            remote_addr,
            started_at: Instant::now(),
        }
    }

    pub fn request_id(&self) -> &str { &self.request_id }
    pub fn client_ip(&self) -> &str { &self.client_ip }
    pub fn scheme(&self) -> &str { self.scheme }
    pub fn protocol(&self) -> &str { self.protocol }
    pub fn method(&self) -> &http::Method { &self.method }
    pub fn host(&self) -> &str { &self.host }
    pub fn uri(&self) -> &http::Uri { &self.uri }
    pub fn user_agent(&self) -> &str { &self.user_agent }
    pub fn remote_addr(&self) -> SocketAddr { self.remote_addr }
    pub fn started_at(&self) -> Instant { self.started_at }

    /// `scheme://host/path?query`, as the client addressed it.
    pub fn full_uri(&self) -> String {
        let path = self.uri.path_and_query().map_or("/", |pq| pq.as_str());
        format!("{}://{}{}", self.scheme, self.host, path)
    }
}

fn protocol_name(version: http::Version) -> &'static str {
    match version {
        http::Version::HTTP_09 => "HTTP/0.9",
        http::Version::HTTP_10 => "HTTP/1.0",
        http::Version::HTTP_11 => "HTTP/1.1",
        http::Version::HTTP_2 => "HTTP/2.0",
        http::Version::HTTP_3 => "HTTP/3.0",
        _ => "HTTP/?",
    }
}

// ── Cancellation ──────────────────────────────────────────────────────────────

/// Advisory cancellation flag shared between a handler and the middleware
/// that bounds it.
///
/// Cancelling never interrupts the handler. Handlers doing slow work should
/// race it against [`cancelled`](Cancellation::cancelled) or poll
/// [`is_cancelled`](Cancellation::is_cancelled) between steps.
#[derive(Clone, Debug)]
pub struct Cancellation {
    tx: Arc<watch::Sender<bool>>,
}

impl Cancellation {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once [`cancel`](Cancellation::cancel) has been called on any clone.
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so this only returns once the flag is set.
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }

    /// Returns a guard that cancels when dropped.
    pub(crate) fn cancel_on_drop(&self) -> CancelOnDrop {
        CancelOnDrop(self.clone())
    }
}

impl Default for Cancellation {
    fn default() -> Self { Self::new() }
}

pub(crate) struct CancelOnDrop(Cancellation);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.cancel();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn parts(builder: http::request::Builder) -> http::request::Parts {
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn resolves_fields_from_headers_and_peer() {
        let parts = parts(
            http::Request::builder()
                .method("GET")
                .uri("/todos?limit=2")
                .header("host", "api.local:8080")
                .header("user-agent", "curl/8.0")
                .header("x-request-id", "abc")
                .header("x-real-ip", "10.0.0.7"),
        );
        let ctx = RequestContext::resolve(&parts, "127.0.0.1:5000".parse().unwrap());

        assert_eq!(ctx.request_id(), "abc");
        assert_eq!(ctx.client_ip(), "10.0.0.7");
        assert_eq!(ctx.scheme(), "http");
        assert_eq!(ctx.protocol(), "HTTP/1.1");
        assert_eq!(ctx.user_agent(), "curl/8.0");
        assert_eq!(ctx.full_uri(), "http://api.local:8080/todos?limit=2");
    }

    #[test]
    fn absolute_https_uri_sets_scheme_and_host() {
        let parts = parts(http::Request::builder().uri("https://example.com/ping"));
        let ctx = RequestContext::resolve(&parts, "127.0.0.1:5000".parse().unwrap());

        assert_eq!(ctx.scheme(), "https");
        assert_eq!(ctx.host(), "example.com");
        assert_eq!(ctx.full_uri(), "https://example.com/ping");
    }

    #[tokio::test]
    async fn cancellation_is_visible_to_every_clone() {
        let token = Cancellation::new();
        let observer = token.clone();
        let waiter = tokio::spawn(async move { observer.cancelled().await });

        assert!(!token.is_cancelled());
        drop(token.cancel_on_drop());

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter woke")
            .unwrap();
        assert!(token.is_cancelled());
    }
}
