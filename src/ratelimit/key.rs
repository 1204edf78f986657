//! Request key generation and endpoint normalization.

/// Strip the query component and any trailing slashes from an endpoint.
///
/// `/api/simulate`, `/api/simulate/` and `/api/simulate?x=1` all normalize to
/// `/api/simulate`. The root path stays `/`. Applying this twice gives the
/// same result as applying it once.
pub fn normalize_endpoint(endpoint: &str) -> String {
    let path = endpoint.split('?').next().unwrap_or_default();
    let trimmed = path.trim_end_matches('/');

    if trimmed.is_empty() && path.starts_with('/') {
        "/".to_string()
    } else {
        trimmed.to_string()
    }
}

/// A key that uniquely identifies one rate limited subject.
///
/// The key is composed of the normalized endpoint and the opaque identity
/// token supplied by the authentication layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestKey {
    /// Normalized endpoint path
    endpoint: String,
    /// Caller identity token
    identity: String,
}

impl RequestKey {
    /// Create a new request key, normalizing the endpoint.
    pub fn new(endpoint: &str, identity: &str) -> Self {
        Self {
            endpoint: normalize_endpoint(endpoint),
            identity: identity.to_string(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Compose the storage key under a namespace.
    ///
    /// Format: `"<namespace>-<endpoint>-<identity>"`.
    pub fn namespaced(&self, namespace: &str) -> String {
        format!("{}-{}-{}", namespace, self.endpoint, self.identity)
    }
}

impl std::fmt::Display for RequestKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.endpoint, self.identity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_strips_query_and_trailing_slash() {
        assert_eq!(normalize_endpoint("/api/simulate"), "/api/simulate");
        assert_eq!(normalize_endpoint("/api/simulate/"), "/api/simulate");
        assert_eq!(normalize_endpoint("/api/simulate?x=1"), "/api/simulate");
        assert_eq!(normalize_endpoint("/api/simulate/?x=1&y=2"), "/api/simulate");
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let inputs = [
            "/a",
            "/a/",
            "/a?x=1",
            "/a//",
            "/a/?",
            "/",
            "//",
            "",
            "?only=query",
            "/a/b/c/?q=/x/",
        ];

        for input in inputs {
            let once = normalize_endpoint(input);
            assert_eq!(normalize_endpoint(&once), once, "input {:?}", input);
        }

        assert_eq!(normalize_endpoint("/a/"), normalize_endpoint("/a"));
        assert_eq!(normalize_endpoint("/a?x=1"), normalize_endpoint("/a"));
    }

    #[test]
    fn test_normalize_root() {
        assert_eq!(normalize_endpoint("/"), "/");
        assert_eq!(normalize_endpoint("/?x=1"), "/");
        assert_eq!(normalize_endpoint(""), "");
    }

    #[test]
    fn test_request_key_collapses_variants() {
        let a = RequestKey::new("/api/simulate", "token");
        let b = RequestKey::new("/api/simulate/", "token");
        let c = RequestKey::new("/api/simulate?x=1", "token");

        assert_eq!(a, b);
        assert_eq!(b, c);
        assert_eq!(a.endpoint(), "/api/simulate");
        assert_eq!(a.identity(), "token");
    }

    #[test]
    fn test_namespaced_key() {
        let key = RequestKey::new("/api/simulate/", "sample.bearer.token.123");
        assert_eq!(
            key.namespaced("user-limit"),
            "user-limit-/api/simulate-sample.bearer.token.123"
        );
        assert_eq!(
            key.namespaced("user-request"),
            "user-request-/api/simulate-sample.bearer.token.123"
        );
    }

    #[test]
    fn test_different_identities_differ() {
        let a = RequestKey::new("/api/simulate", "alice");
        let b = RequestKey::new("/api/simulate", "bob");
        assert_ne!(a, b);
        assert_eq!(a.to_string(), "/api/simulate:alice");
    }
}
