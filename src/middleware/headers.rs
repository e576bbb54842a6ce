//! Identity extraction from request headers.
//!
//! Upstream MCP clients disagree on header names, so each identifier is looked
//! up through an ordered list and the first non-empty value wins. `HeaderMap`
//! lookups are case-insensitive.

use http::HeaderMap;

use crate::tracer::TraceParent;

/// Session id headers, highest priority first.
pub const SESSION_HEADERS: [&str; 5] = [
    "mcp-session-id",
    "x-mcp-session-id",
    "x-session-id",
    "session-id",
    "x-client-session-id",
];

/// User id headers, highest priority first.
pub const USER_HEADERS: [&str; 3] = ["x-user-id", "x-github-user", "x-microsoft-user"];

/// W3C trace context header.
pub const TRACEPARENT_HEADER: &str = "traceparent";

/// Session and user ids carried by a request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestIdentity {
    pub session_id: Option<String>,
    pub user_id: Option<String>,
}

impl RequestIdentity {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        Self {
            session_id: pick_session_id(headers),
            user_id: pick_user_id(headers),
        }
    }

    /// Whether either id is present.
    pub fn is_present(&self) -> bool {
        self.session_id.is_some() || self.user_id.is_some()
    }
}

/// First non-empty session id header.
pub fn pick_session_id(headers: &HeaderMap) -> Option<String> {
    first_header(headers, &SESSION_HEADERS)
}

/// First non-empty user id header.
pub fn pick_user_id(headers: &HeaderMap) -> Option<String> {
    first_header(headers, &USER_HEADERS)
}

/// Parsed `traceparent`, if present and well-formed.
pub fn pick_trace_parent(headers: &HeaderMap) -> Option<TraceParent> {
    headers
        .get(TRACEPARENT_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(TraceParent::parse)
}

fn first_header(headers: &HeaderMap, names: &[&str]) -> Option<String> {
    names.iter().find_map(|name| {
        headers
            .get(*name)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.append(*name, HeaderValue::from_static(value));
        }
        map
    }

    #[test]
    fn test_session_priority_order() {
        let map = headers(&[("x-session-id", "B"), ("mcp-session-id", "A")]);
        assert_eq!(pick_session_id(&map).as_deref(), Some("A"));

        let map = headers(&[("x-client-session-id", "E"), ("session-id", "D")]);
        assert_eq!(pick_session_id(&map).as_deref(), Some("D"));
    }

    #[test]
    fn test_each_session_header_is_recognised() {
        for name in SESSION_HEADERS {
            let mut map = HeaderMap::new();
            map.insert(name, HeaderValue::from_static("sess"));
            assert_eq!(pick_session_id(&map).as_deref(), Some("sess"), "{name}");
        }
    }

    #[test]
    fn test_header_names_are_case_insensitive() {
        let mut map = HeaderMap::new();
        map.insert(
            http::HeaderName::from_bytes(b"X-MCP-Session-Id").unwrap(),
            HeaderValue::from_static("mixed"),
        );
        assert_eq!(pick_session_id(&map).as_deref(), Some("mixed"));
    }

    #[test]
    fn test_empty_value_falls_through() {
        let map = headers(&[("mcp-session-id", ""), ("x-session-id", "B")]);
        assert_eq!(pick_session_id(&map).as_deref(), Some("B"));
    }

    #[test]
    fn test_non_ascii_value_is_skipped() {
        let mut map = HeaderMap::new();
        map.insert(
            "mcp-session-id",
            HeaderValue::from_bytes(&[0xe2, 0x98, 0x83]).unwrap(),
        );
        map.insert("x-session-id", HeaderValue::from_static("fallback"));
        assert_eq!(pick_session_id(&map).as_deref(), Some("fallback"));
    }

    #[test]
    fn test_user_priority_order() {
        let map = headers(&[("x-microsoft-user", "ms"), ("x-github-user", "gh")]);
        assert_eq!(pick_user_id(&map).as_deref(), Some("gh"));

        let map = headers(&[("x-github-user", "gh"), ("x-user-id", "u-1")]);
        assert_eq!(pick_user_id(&map).as_deref(), Some("u-1"));
    }

    #[test]
    fn test_identity_absent() {
        let identity = RequestIdentity::from_headers(&HeaderMap::new());
        assert_eq!(identity, RequestIdentity::default());
        assert!(!identity.is_present());
    }

    #[test]
    fn test_identity_user_only() {
        let identity = RequestIdentity::from_headers(&headers(&[("x-user-id", "u-1")]));
        assert!(identity.is_present());
        assert!(identity.session_id.is_none());
    }

    #[test]
    fn test_trace_parent() {
        let map = headers(&[(
            "traceparent",
            "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01",
        )]);
        assert_eq!(
            pick_trace_parent(&map).map(|tp| tp.trace_id).as_deref(),
            Some("4bf92f3577b34da6a3ce929d0e0e4736")
        );
        assert!(pick_trace_parent(&headers(&[("traceparent", "bogus")])).is_none());
    }
}
