//! Structured access logging.

use std::time::Instant;

use tracing::info;

use crate::handler::BoxFuture;
use crate::middleware::{Middleware, Next};
use crate::request::Request;

/// Logs one line when a request enters the pipeline and one when it leaves.
///
/// The entry line carries everything known about the caller, once. The exit
/// line carries only the request id, the elapsed time and the status, so the
/// pair is joined by `request_id`. The exit line comes from a drop guard that
/// is armed before the request is handed on: it is written on normal return,
/// during unwinding, and when hyper drops the request future because the
/// client went away.
pub struct AccessLog;

impl Middleware for AccessLog {
    fn handle(&self, req: Request, next: Next) -> BoxFuture {
        let ctx = req.context();
        info!(
            http_scheme = ctx.scheme(),
            http_proto = ctx.protocol(),
            http_method = %ctx.method(),
            remote_addr = %ctx.remote_addr(),
            request_id = ctx.request_id(),
            user_agent = ctx.user_agent(),
            real_ip = ctx.client_ip(),
            uri = %ctx.full_uri(),
            "new http request"
        );

        let mut completion = Completion {
            request_id: ctx.request_id().to_owned(),
            started_at: ctx.started_at(),
            status: None,
        };

        Box::pin(async move {
            let response = next.run(req).await;
            completion.status = Some(response.status_code());
            response
        })
    }
}

struct Completion {
    request_id: String,
    started_at: Instant,
    status: Option<u16>,
}

impl Drop for Completion {
    fn drop(&mut self) {
        info!(
            request_id = %self.request_id,
            elapsed = ?self.started_at.elapsed(),
            status = self.status,
            "http request processed"
        );
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::fmt;
    use std::sync::{Arc, Mutex};

    use bytes::Bytes;
    use tracing::field::{Field, Visit};
    use tracing::{Event, Subscriber};
    use tracing_subscriber::layer::{Context, SubscriberExt};
    use tracing_subscriber::Layer;

    use super::*;
    use crate::middleware::Recover;
    use crate::{Response, Router};

    /// Every field of an event, `message` included, rendered as a string.
    type Line = BTreeMap<String, String>;

    #[derive(Clone, Default)]
    struct Capture(Arc<Mutex<Vec<Line>>>);

    #[derive(Default)]
    struct Fields(Line);

    impl Visit for Fields {
        fn record_str(&mut self, field: &Field, value: &str) {
            self.0.insert(field.name().to_owned(), value.to_owned());
        }

        fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
            self.0.insert(field.name().to_owned(), format!("{value:?}"));
        }
    }

    impl<S: Subscriber> Layer<S> for Capture {
        fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
            let mut fields = Fields::default();
            event.record(&mut fields);
            self.0.lock().unwrap().push(fields.0);
        }
    }

    impl Capture {
        fn access_lines(&self) -> Vec<Line> {
            self.0.lock().unwrap().iter()
                .filter(|line| {
                    matches!(
                        line.get("message").map(String::as_str),
                        Some("new http request" | "http request processed")
                    )
                })
                .cloned()
                .collect()
        }
    }

    fn field<'a>(line: &'a Line, name: &str) -> Option<&'a str> {
        line.get(name).map(String::as_str)
    }

    fn request(path: &str, request_id: &str) -> Request {
        let req = http::Request::builder()
            .uri(path)
            .header("host", "api.local:8080")
            .header("user-agent", "curl/8.0")
            .header("x-request-id", request_id)
            .header("x-real-ip", "10.0.0.7")
            .body(Bytes::new())
            .unwrap();
        Request::from_http(req, "127.0.0.1:40000".parse().unwrap())
    }

    #[tokio::test]
    async fn writes_entry_then_exit_keyed_by_request_id() {
        let capture = Capture::default();
        let _guard = tracing::subscriber::set_default(
            tracing_subscriber::registry().with(capture.clone()),
        );

        let router = Router::new()
            .layer(AccessLog)
            .get("/ping", |_req: Request| async { Response::text("pong") });
        let response = router.handle(request("/ping?v=1", "req-1")).await;
        assert_eq!(response.body(), b"pong");

        let lines = capture.access_lines();
        assert_eq!(lines.len(), 2);
        let (entry, exit) = (&lines[0], &lines[1]);

        assert_eq!(field(entry, "message"), Some("new http request"));
        assert_eq!(
            entry.keys().map(String::as_str).collect::<Vec<_>>(),
            [
                "http_method", "http_proto", "http_scheme", "message", "real_ip",
                "remote_addr", "request_id", "uri", "user_agent",
            ]
        );
        assert_eq!(field(entry, "http_scheme"), Some("http"));
        assert_eq!(field(entry, "http_proto"), Some("HTTP/1.1"));
        assert_eq!(field(entry, "http_method"), Some("GET"));
        assert_eq!(field(entry, "remote_addr"), Some("127.0.0.1:40000"));
        assert_eq!(field(entry, "request_id"), Some("req-1"));
        assert_eq!(field(entry, "user_agent"), Some("curl/8.0"));
        assert_eq!(field(entry, "real_ip"), Some("10.0.0.7"));
        assert_eq!(field(entry, "uri"), Some("http://api.local:8080/ping?v=1"));

        assert_eq!(field(exit, "message"), Some("http request processed"));
        assert_eq!(
            exit.keys().map(String::as_str).collect::<Vec<_>>(),
            ["elapsed", "message", "request_id", "status"]
        );
        assert_eq!(field(exit, "request_id"), Some("req-1"));
        assert_eq!(field(exit, "status"), Some("200"));
    }

    #[tokio::test]
    async fn exit_line_is_written_when_the_handler_panics() {
        let capture = Capture::default();
        let _guard = tracing::subscriber::set_default(
            tracing_subscriber::registry().with(capture.clone()),
        );

        let router = Router::new()
            .layer(AccessLog)
            .layer(Recover)
            .get("/boom", |_req: Request| async {
                if true {
                    panic!("handler exploded");
                }
                Response::text("unreachable")
            });
        let response = router.handle(request("/boom", "req-2")).await;

        assert_eq!(response.status_code(), 500);
        let lines = capture.access_lines();
        assert_eq!(lines.len(), 2);
        assert_eq!(field(&lines[1], "message"), Some("http request processed"));
        assert_eq!(field(&lines[1], "request_id"), Some("req-2"));
        assert_eq!(field(&lines[1], "status"), Some("500"));
    }

    #[tokio::test]
    async fn exit_line_is_written_when_the_request_is_dropped() {
        let capture = Capture::default();
        let _guard = tracing::subscriber::set_default(
            tracing_subscriber::registry().with(capture.clone()),
        );

        let router = Router::new()
            .layer(AccessLog)
            .get("/hang", |_req: Request| async {
                std::future::pending::<()>().await;
                Response::text("never")
            });

        let abandoned = tokio::time::timeout(
            std::time::Duration::from_millis(20),
            router.handle(request("/hang", "req-3")),
        )
        .await;

        assert!(abandoned.is_err());
        let lines = capture.access_lines();
        assert_eq!(lines.len(), 2);
        // No response was produced, so there is no status to report.
        assert!(lines[1].contains_key("elapsed"));
        assert_eq!(field(&lines[1], "status"), None);
    }
}
