//! Request correlation: request ids and client IP resolution.
//!
//! Both lookups are best-effort. A request is never rejected because its id
//! could not be generated or its client IP could not be determined; the
//! value is simply empty.

use std::net::IpAddr;

use http::{HeaderMap, HeaderValue};
use uuid::Uuid;

pub const REQUEST_ID: &str = "x-request-id";
pub const TRUE_CLIENT_IP: &str = "true-client-ip";
pub const REAL_IP: &str = "x-real-ip";
pub const FORWARDED_FOR: &str = "x-forwarded-for";

/// Returns the caller's `X-Request-Id` verbatim, or a fresh v4 UUID.
///
/// An empty or non-UTF-8 header counts as absent. If the random source fails
/// the result is an empty string.
pub fn request_id(headers: &HeaderMap) -> String {
    if let Some(id) = header_str(headers, REQUEST_ID) {
        return id.to_owned();
    }

    match std::panic::catch_unwind(Uuid::new_v4) {
        Ok(id) => id.to_string(),
        Err(_) => {
            tracing::error!("failed to generate request id");
            String::new()
        }
    }
}

/// Resolves the client IP from proxy headers.
///
/// The first non-empty header in priority order wins: `True-Client-IP`,
/// `X-Real-IP`, then the leftmost `X-Forwarded-For` entry. Later hops in
/// `X-Forwarded-For` are appended by intermediaries and are not trusted.
/// The winner must be a well-formed IP address, otherwise the result is
/// empty; lower-priority headers are not consulted as a fallback.
pub fn client_ip(headers: &HeaderMap) -> String {
    let Some((name, value)) = [TRUE_CLIENT_IP, REAL_IP, FORWARDED_FOR]
        .into_iter()
        .find_map(|name| present(headers, name).map(|value| (name, value)))
    else {
        return String::new();
    };

    // A present but non-UTF-8 value still wins, and resolves to empty.
    let Ok(value) = value.to_str() else {
        return String::new();
    };
    let candidate = if name == FORWARDED_FOR {
        value.split_once(',').map_or(value, |(first, _)| first)
    } else {
        value
    };

    let candidate = candidate.trim();
    match candidate.parse::<IpAddr>() {
        Ok(_) => candidate.to_owned(),
        Err(_) => String::new(),
    }
}

fn present<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a HeaderValue> {
    headers.get(name).filter(|v| !v.is_empty())
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
}
