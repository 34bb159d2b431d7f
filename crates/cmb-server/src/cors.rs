//! CORS policy for the MCP client-facing routes (spec §6.3).
//!
//! Extension pages served from `chrome-extension://` or `moz-extension://`
//! origins, and a local agent talking to `http://127.0.0.1`, are the only
//! expected callers; requests with no `Origin` header (non-browser
//! clients) are allowed through unconditionally.

use axum::http::{HeaderName, HeaderValue, Method};
use tower_http::cors::{AllowOrigin, CorsLayer};

const ALLOWED_SCHEMES: [&str; 2] = ["chrome-extension://", "moz-extension://"];
const ALLOWED_PREFIX: &str = "http://127.0.0.1";

fn origin_is_allowed(origin: &HeaderValue) -> bool {
    let Ok(origin) = origin.to_str() else {
        return false;
    };
    ALLOWED_SCHEMES.iter().any(|scheme| origin.starts_with(scheme)) || origin.starts_with(ALLOWED_PREFIX)
}

/// Build the CORS layer applied to the MCP-facing router.
///
/// `allow_credentials` rules out wildcard `Any` for origins and headers
/// (tower-http enforces this at layer-construction time), so headers are
/// named explicitly rather than left open.
#[must_use]
pub fn bridge_cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(|origin, _| origin_is_allowed(origin)))
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            HeaderName::from_static("content-type"),
            HeaderName::from_static("mcp-session-id"),
            HeaderName::from_static("x-instance-id"),
        ])
        .allow_credentials(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_chrome_extension_origin() {
        assert!(origin_is_allowed(&HeaderValue::from_static(
            "chrome-extension://abcdefg"
        )));
    }

    #[test]
    fn allows_firefox_extension_origin() {
        assert!(origin_is_allowed(&HeaderValue::from_static(
            "moz-extension://abcdefg"
        )));
    }

    #[test]
    fn allows_localhost_prefix() {
        assert!(origin_is_allowed(&HeaderValue::from_static(
            "http://127.0.0.1:9222"
        )));
    }

    #[test]
    fn rejects_unrelated_origin() {
        assert!(!origin_is_allowed(&HeaderValue::from_static(
            "https://evil.example.com"
        )));
    }
}
