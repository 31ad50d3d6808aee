//! Radix-tree request router and middleware composition.
//!
//! One tree per HTTP method, exact paths, O(path-length) lookup. Every
//! request, matched or not, runs through the same middleware chain, so
//! 404s and 405s are logged and CORS preflights work on any path.

use std::collections::HashMap;
use std::sync::Arc;

use matchit::Router as MatchitRouter;

use crate::handler::{BoxedHandler, Handler};
use crate::method::Method;
use crate::middleware::{BoxedMiddleware, Middleware, Next};
use crate::request::Request;
use crate::response::Response;
use crate::status::Status;

/// The application router.
///
/// Build it once at startup and pass it to [`Server::listen`](crate::Server::listen).
/// Every builder method returns `self` so registrations chain naturally.
///
/// ```rust
/// use tally::{Request, Response, Router};
/// use tally::middleware::{AccessLog, Recover};
///
/// async fn ping(_: Request) -> Response { Response::text("pong") }
///
/// let app = Router::new()
///     .layer(AccessLog)
///     .layer(Recover)
///     .get("/ping", ping);
/// ```
pub struct Router {
    routes: HashMap<Method, MatchitRouter<BoxedHandler>>,
    middleware: Arc<Vec<BoxedMiddleware>>,
    not_found: BoxedHandler,
}

impl Router {
    pub fn new() -> Self {
        Self {
            routes: HashMap::new(),
            middleware: Arc::new(Vec::new()),
            not_found: not_found.into_boxed_handler(),
        }
    }

    /// Register a handler for a method + path pair.
    pub fn on(mut self, method: Method, path: &str, handler: impl Handler) -> Self {
        self.routes
            .entry(method)
            .or_default()
            .insert(path, handler.into_boxed_handler())
            .unwrap_or_else(|e| panic!("invalid route `{path}`: {e}"));
        self
    }

    pub fn get(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::Get, path, handler)
    }

    pub fn post(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::Post, path, handler)
    }

    /// Append a middleware layer. The first layer added is the outermost:
    /// it sees the request first and the response last.
    pub fn layer(mut self, middleware: impl Middleware) -> Self {
        Arc::make_mut(&mut self.middleware).push(Arc::new(middleware));
        self
    }

    /// Runs one request through the middleware chain and its endpoint.
    pub async fn handle(&self, mut req: Request) -> Response {
        let (endpoint, params) = self.resolve(req.method(), req.path());
        req.params = params;
        Next::new(Arc::clone(&self.middleware), endpoint).run(req).await
    }

    /// Runs a request through the middleware chain with an endpoint that
    /// answers `status`, whatever route it names.
    pub(crate) async fn reject(&self, req: Request, status: Status) -> Response {
        let endpoint = (move |_req: Request| async move { status }).into_boxed_handler();
        Next::new(Arc::clone(&self.middleware), endpoint).run(req).await
    }

    /// Picks the endpoint for a request: the matched handler, a `405` with
    /// an `Allow` list when only other methods match the path (or the method
    /// is not one we know), or `404`.
    fn resolve(
        &self,
        method: &http::Method,
        path: &str,
    ) -> (BoxedHandler, HashMap<String, String>) {
        let known = match Method::try_from(method) {
            Ok(method) => {
                if let Some(found) = self.lookup(method, path) {
                    return found;
                }
                true
            }
            Err(_) => false,
        };

        let mut allowed: Vec<&'static str> = self.routes.iter()
            .filter(|(m, tree)| m.as_str() != method.as_str() && tree.at(path).is_ok())
            .map(|(m, _)| m.as_str())
            .collect();

        if known && allowed.is_empty() {
            return (Arc::clone(&self.not_found), HashMap::new());
        }
        allowed.sort_unstable();
        (method_not_allowed(allowed.join(", ")), HashMap::new())
    }

    fn lookup(
        &self,
        method: Method,
        path: &str,
    ) -> Option<(BoxedHandler, HashMap<String, String>)> {
        let tree = self.routes.get(&method)?;
        let matched = tree.at(path).ok()?;
        let handler = Arc::clone(matched.value);
        let params = matched.params.iter()
            .map(|(k, v)| (k.to_owned(), v.to_owned()))
            .collect();
        Some((handler, params))
    }
}

impl Default for Router {
    fn default() -> Self { Self::new() }
}

async fn not_found(_req: Request) -> Status {
    Status::NotFound
}

fn method_not_allowed(allow: String) -> BoxedHandler {
    let handler = move |_req: Request| {
        let allow = allow.clone();
        async move {
            Response::builder()
                .status(Status::MethodNotAllowed)
                .header("allow", &allow)
                .no_body()
        }
    };
    handler.into_boxed_handler()
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use bytes::Bytes;

    use super::*;
    use crate::handler::BoxFuture;

    fn request(method: &str, path: &str) -> Request {
        let req = http::Request::builder()
            .method(method)
            .uri(path)
            .body(Bytes::new())
            .unwrap();
        Request::from_http(req, "127.0.0.1:40000".parse().unwrap())
    }

    async fn hello(_req: Request) -> Response {
        Response::text("hello")
    }

    #[tokio::test]
    async fn exact_path_dispatches_to_handler() {
        let router = Router::new().get("/hello", hello);
        let response = router.handle(request("GET", "/hello")).await;
        assert_eq!(response.status_code(), 200);
        assert_eq!(response.body(), b"hello");
    }

    #[tokio::test]
    async fn unknown_path_is_404() {
        let router = Router::new().get("/hello", hello);
        let response = router.handle(request("GET", "/hello/world")).await;
        assert_eq!(response.status_code(), 404);
    }

    #[tokio::test]
    async fn other_method_on_known_path_is_405_with_allow() {
        let router = Router::new()
            .get("/hello", hello)
            .post("/hello", hello);
        let response = router.handle(request("DELETE", "/hello")).await;
        assert_eq!(response.status_code(), 405);
        assert_eq!(response.header("allow"), Some("GET, POST"));
    }

    #[tokio::test]
    async fn unknown_method_token_is_405() {
        let router = Router::new().get("/hello", hello);
        let response = router.handle(request("BREW", "/elsewhere")).await;
        assert_eq!(response.status_code(), 405);
        assert_eq!(response.header("allow"), Some(""));
    }

    #[tokio::test]
    async fn path_params_reach_the_handler() {
        let router = Router::new().get("/todos/{id}", |req: Request| async move {
            Response::text(req.param("id").unwrap_or_default().to_owned())
        });
        let response = router.handle(request("GET", "/todos/42")).await;
        assert_eq!(response.body(), b"42");
    }

    struct Record(&'static str, Arc<Mutex<Vec<&'static str>>>);

    impl Middleware for Record {
        fn handle(&self, req: Request, next: Next) -> BoxFuture {
            let (name, log) = (self.0, Arc::clone(&self.1));
            Box::pin(async move {
                log.lock().unwrap().push(name);
                let response = next.run(req).await;
                log.lock().unwrap().push(name);
                response
            })
        }
    }

    #[tokio::test]
    async fn first_layer_is_outermost_and_wraps_fallbacks() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let router = Router::new()
            .layer(Record("outer", Arc::clone(&log)))
            .layer(Record("inner", Arc::clone(&log)))
            .get("/hello", hello);

        let response = router.handle(request("GET", "/missing")).await;
        assert_eq!(response.status_code(), 404);
        assert_eq!(*log.lock().unwrap(), ["outer", "inner", "inner", "outer"]);
    }
}
