//! Cross-origin resource sharing.
//!
//! Preflights (`OPTIONS` carrying `Access-Control-Request-Method`) are
//! answered here and never reach the router's handlers. Everything else is
//! handed on and decorated on the way back.

use std::time::Duration;

use http::HeaderName;
use http::header::{
    ACCESS_CONTROL_ALLOW_CREDENTIALS, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
    ACCESS_CONTROL_ALLOW_ORIGIN, ACCESS_CONTROL_EXPOSE_HEADERS, ACCESS_CONTROL_MAX_AGE,
    ACCESS_CONTROL_REQUEST_HEADERS, ACCESS_CONTROL_REQUEST_METHOD, ORIGIN, VARY,
};
use tracing::debug;

use crate::handler::BoxFuture;
use crate::method::Method;
use crate::middleware::{Middleware, Next};
use crate::request::Request;
use crate::response::Response;
use crate::status::Status;

/// Which origins may make cross-origin requests.
#[derive(Clone, Debug)]
pub enum AllowedOrigins {
    Any,
    /// Exact origins, compared case-insensitively (`https://app.example.com`).
    List(Vec<String>),
}

/// CORS configuration.
#[derive(Clone, Debug)]
pub struct CorsPolicy {
    pub allowed_origins: AllowedOrigins,
    pub allowed_methods: Vec<Method>,
    /// Request headers a preflight may ask for. `Origin` is always allowed.
    pub allowed_headers: Vec<String>,
    pub exposed_headers: Vec<String>,
    pub allow_credentials: bool,
    pub max_age: Option<Duration>,
}

impl Default for CorsPolicy {
    /// Any origin, `GET`/`POST`/`OPTIONS`, the correlation and IP-forwarding
    /// headers, credentials allowed.
    fn default() -> Self {
        Self {
            allowed_origins: AllowedOrigins::Any,
            allowed_methods: vec![Method::Get, Method::Post, Method::Options],
            allowed_headers: vec![
                "Authorization".to_owned(),
                "Content-Type".to_owned(),
                "X-Request-Id".to_owned(),
                "X-Forwarded-For".to_owned(),
                "True-Client-IP".to_owned(),
                "X-Real-IP".to_owned(),
            ],
            exposed_headers: Vec::new(),
            allow_credentials: true,
            max_age: None,
        }
    }
}

impl CorsPolicy {
    fn origin_allowed(&self, origin: &str) -> bool {
        match &self.allowed_origins {
            AllowedOrigins::Any => true,
            AllowedOrigins::List(list) => list.iter().any(|o| o.eq_ignore_ascii_case(origin)),
        }
    }

    /// `OPTIONS` is always allowed: it is how preflights arrive.
    fn method_allowed(&self, method: &str) -> bool {
        method.eq_ignore_ascii_case("OPTIONS")
            || self.allowed_methods.iter().any(|m| m.as_str().eq_ignore_ascii_case(method))
    }

    fn headers_allowed(&self, requested: &str) -> bool {
        requested
            .split(',')
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .all(|h| {
                h.eq_ignore_ascii_case(ORIGIN.as_str())
                    || self.allowed_headers.iter().any(|a| a.eq_ignore_ascii_case(h))
            })
    }

    /// The `Access-Control-Allow-Origin` value for an allowed origin.
    ///
    /// Browsers refuse `*` on credentialed requests, so with credentials on
    /// the caller's origin is reflected instead.
    fn allow_origin_value<'a>(&self, origin: &'a str) -> &'a str {
        match self.allowed_origins {
            AllowedOrigins::Any if !self.allow_credentials => "*",
            _ => origin,
        }
    }
}

/// CORS middleware enforcing a [`CorsPolicy`].
pub struct Cors {
    policy: CorsPolicy,
}

impl Cors {
    pub fn new(policy: CorsPolicy) -> Self {
        Self { policy }
    }

    fn preflight(&self, req: &Request) -> Response {
        let mut response = Response::builder().status(Status::Ok).no_body();
        response.append_header(VARY, "Origin");
        response.append_header(VARY, "Access-Control-Request-Method");
        response.append_header(VARY, "Access-Control-Request-Headers");

        let Some(origin) = req.header(ORIGIN).filter(|o| !o.is_empty()) else {
            debug!(request_id = req.context().request_id(), "preflight aborted: empty origin");
            return response;
        };
        if !self.policy.origin_allowed(origin) {
            debug!(request_id = req.context().request_id(), origin, "preflight aborted: origin not allowed");
            return response;
        }
        let method = req.header(ACCESS_CONTROL_REQUEST_METHOD).unwrap_or_default();
        if !self.policy.method_allowed(method) {
            debug!(request_id = req.context().request_id(), method, "preflight aborted: method not allowed");
            return response;
        }
        let requested_headers = req.header(ACCESS_CONTROL_REQUEST_HEADERS).unwrap_or_default();
        if !self.policy.headers_allowed(requested_headers) {
            debug!(
                request_id = req.context().request_id(),
                headers = requested_headers,
                "preflight aborted: headers not allowed"
            );
            return response;
        }

        response.set_header(ACCESS_CONTROL_ALLOW_ORIGIN, self.policy.allow_origin_value(origin));
        response.set_header(ACCESS_CONTROL_ALLOW_METHODS, method.to_ascii_uppercase());
        if !requested_headers.trim().is_empty() {
            response.set_header(ACCESS_CONTROL_ALLOW_HEADERS, requested_headers);
        }
        if self.policy.allow_credentials {
            response.set_header(ACCESS_CONTROL_ALLOW_CREDENTIALS, "true");
        }
        if let Some(max_age) = self.policy.max_age {
            response.set_header(ACCESS_CONTROL_MAX_AGE, max_age.as_secs().to_string());
        }
        response
    }

    /// Headers for a non-preflight request, or `None` when the request is
    /// not cross-origin or not allowed.
    fn actual_headers(&self, req: &Request) -> Option<Vec<(HeaderName, String)>> {
        let origin = req.header(ORIGIN).filter(|o| !o.is_empty())?;
        if !self.policy.origin_allowed(origin) || !self.policy.method_allowed(req.method().as_str()) {
            debug!(request_id = req.context().request_id(), origin, "cross-origin request not allowed");
            return None;
        }

        let mut headers = vec![(ACCESS_CONTROL_ALLOW_ORIGIN, self.policy.allow_origin_value(origin).to_owned())];
        if !self.policy.exposed_headers.is_empty() {
            headers.push((ACCESS_CONTROL_EXPOSE_HEADERS, self.policy.exposed_headers.join(", ")));
        }
        if self.policy.allow_credentials {
            headers.push((ACCESS_CONTROL_ALLOW_CREDENTIALS, "true".to_owned()));
        }
        Some(headers)
    }
}

impl Default for Cors {
    fn default() -> Self { Self::new(CorsPolicy::default()) }
}

impl Middleware for Cors {
    fn handle(&self, req: Request, next: Next) -> BoxFuture {
        // An empty request method makes it an ordinary OPTIONS request.
        let is_preflight = *req.method() == http::Method::OPTIONS
            && req.header(ACCESS_CONTROL_REQUEST_METHOD).is_some_and(|m| !m.is_empty());
        if is_preflight {
            let response = self.preflight(&req);
            return Box::pin(async move { response });
        }

        let headers = self.actual_headers(&req);
        Box::pin(async move {
            let mut response = next.run(req).await;
            response.append_header(VARY, "Origin");
            for (name, value) in headers.into_iter().flatten() {
                response.set_header(name, value);
            }
            response
        })
    }
}
