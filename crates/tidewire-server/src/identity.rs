//! User identity resolution at upgrade time.
//!
//! Authentication happens upstream (a gateway or reverse proxy). The hub
//! trusts whatever user id it is handed and only refuses upgrades that carry
//! none.

use tidewire_core::UserId;
use tokio_tungstenite::tungstenite::handshake::server::Request;

/// Default header carrying the authenticated user id.
pub const DEFAULT_IDENTITY_HEADER: &str = "x-user-id";

/// Query parameter consulted when the header is absent.
pub const IDENTITY_QUERY_PARAM: &str = "user";

/// Extracts the already-authenticated user from an upgrade request.
pub trait IdentityResolver: Send + Sync + 'static {
    /// The user the request belongs to, or `None` to reject the upgrade.
    fn resolve(&self, request: &Request) -> Option<UserId>;
}

/// Reads the user id from a header, falling back to `?user=`.
#[derive(Debug, Clone)]
pub struct HeaderIdentity {
    header: String,
}

impl Default for HeaderIdentity {
    fn default() -> Self {
        Self::new(DEFAULT_IDENTITY_HEADER)
    }
}

impl HeaderIdentity {
    /// Resolve from `header` (case-insensitive).
    pub fn new(header: impl Into<String>) -> Self {
        Self { header: header.into() }
    }

    /// Header name consulted first.
    pub fn header(&self) -> &str {
        &self.header
    }
}

impl IdentityResolver for HeaderIdentity {
    fn resolve(&self, request: &Request) -> Option<UserId> {
        let from_header = request
            .headers()
            .get(self.header.as_str())
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty());

        from_header
            .or_else(|| query_param(request.uri().query()?, IDENTITY_QUERY_PARAM))
            .map(UserId::from)
    }
}

/// First non-empty value of `name` in a raw query string. No percent-decoding.
fn query_param<'a>(query: &'a str, name: &str) -> Option<&'a str> {
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, value)| *key == name && !value.is_empty())
        .map(|(_, value)| value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(uri: &str, header: Option<(&str, &str)>) -> Request {
        let mut builder = Request::builder().uri(uri);
        if let Some((name, value)) = header {
            builder = builder.header(name, value);
        }
        builder.body(()).unwrap()
    }

    #[test]
    fn header_wins() {
        let resolver = HeaderIdentity::default();
        let req = request("/?user=bob", Some(("X-User-Id", "alice")));
        assert_eq!(resolver.resolve(&req), Some(UserId::from("alice")));
    }

    #[test]
    fn query_fallback() {
        let resolver = HeaderIdentity::default();
        let req = request("/ws?token=x&user=bob", None);
        assert_eq!(resolver.resolve(&req), Some(UserId::from("bob")));
    }

    #[test]
    fn blank_identity_is_rejected() {
        let resolver = HeaderIdentity::default();
        assert_eq!(resolver.resolve(&request("/", Some(("x-user-id", "  ")))), None);
        assert_eq!(resolver.resolve(&request("/?user=", None)), None);
        assert_eq!(resolver.resolve(&request("/", None)), None);
    }

    #[test]
    fn custom_header() {
        let resolver = HeaderIdentity::new("x-forwarded-user");
        assert_eq!(resolver.header(), "x-forwarded-user");

        let req = request("/", Some(("x-forwarded-user", "carol")));
        assert_eq!(resolver.resolve(&req), Some(UserId::from("carol")));
        assert_eq!(resolver.resolve(&request("/", Some(("x-user-id", "carol")))), None);
    }
}
