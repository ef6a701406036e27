//! Double-submit XSRF protection
//!
//! A browser attaches the session cookie to cross-site requests on its own,
//! so a cookie-delivered user token is only accepted together with a header
//! repeating the token id. The id is readable by same-site scripts through
//! the XSRF cookie. Tokens sent in a header or query parameter are never
//! attached automatically and skip the check.

use crate::claims::Claims;
use crate::config::SessionConfig;
use crate::error::{TokenError, TokenResult};
use crate::transport::TokenSource;
use http::{HeaderMap, Method};

/// XSRF check for cookie-delivered sessions.
#[derive(Debug, Clone)]
pub struct XsrfGuard {
    disabled: bool,
    header_key: String,
    ignore_methods: Vec<String>,
}

impl XsrfGuard {
    /// Build the guard from configuration.
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            disabled: config.disable_xsrf,
            header_key: config.xsrf_header_key.clone(),
            ignore_methods: config.xsrf_ignore_methods.clone(),
        }
    }

    /// Check if `method` is exempt from the XSRF check.
    pub fn is_exempt(&self, method: &Method) -> bool {
        self.ignore_methods
            .iter()
            .any(|m| m.eq_ignore_ascii_case(method.as_str()))
    }

    /// Verify the XSRF header of a request.
    ///
    /// Passes when the guard is disabled, the method is exempt, the token did
    /// not come from the cookie or the claims carry no user. Otherwise the
    /// XSRF header must equal the claim id.
    pub fn check(
        &self,
        method: &Method,
        headers: &HeaderMap,
        claims: &Claims,
        source: TokenSource,
    ) -> TokenResult<()> {
        if self.disabled || self.is_exempt(method) {
            return Ok(());
        }
        if !source.is_cookie() || claims.user.is_none() {
            return Ok(());
        }

        let supplied = headers
            .get(self.header_key.as_str())
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default();
        let expected = claims.id();
        if expected.is_empty() || supplied != expected {
            return Err(TokenError::XsrfMismatch);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::claims::User;
    use http::HeaderValue;

    fn user_claims() -> Claims {
        Claims {
            jti: Some("random-id".to_string()),
            ..Default::default()
        }
        .with_user(User::new("id1", "name1"))
    }

    fn xsrf_header(value: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("x-xsrf-token", HeaderValue::from_static(value));
        headers
    }

    #[test]
    fn test_cookie_requires_matching_header() {
        let guard = XsrfGuard::new(&SessionConfig::default());
        let claims = user_claims();

        assert!(guard
            .check(&Method::POST, &xsrf_header("random-id"), &claims, TokenSource::Cookie)
            .is_ok());
        assert!(matches!(
            guard.check(&Method::POST, &xsrf_header("other"), &claims, TokenSource::Cookie),
            Err(TokenError::XsrfMismatch)
        ));
        assert!(matches!(
            guard.check(&Method::GET, &HeaderMap::new(), &claims, TokenSource::Cookie),
            Err(TokenError::XsrfMismatch)
        ));
    }

    #[test]
    fn test_header_and_query_skip_check() {
        let guard = XsrfGuard::new(&SessionConfig::default());
        let claims = user_claims();

        for source in [TokenSource::Header, TokenSource::Query] {
            assert!(guard
                .check(&Method::POST, &HeaderMap::new(), &claims, source)
                .is_ok());
        }
    }

    #[test]
    fn test_claims_without_user_skip_check() {
        let guard = XsrfGuard::new(&SessionConfig::default());
        let claims = Claims::new().with_audience("site1");
        assert!(guard
            .check(&Method::POST, &HeaderMap::new(), &claims, TokenSource::Cookie)
            .is_ok());
    }

    #[test]
    fn test_empty_id_never_matches() {
        let guard = XsrfGuard::new(&SessionConfig::default());
        let mut claims = user_claims();
        claims.jti = None;
        assert!(matches!(
            guard.check(&Method::POST, &xsrf_header(""), &claims, TokenSource::Cookie),
            Err(TokenError::XsrfMismatch)
        ));
    }

    #[test]
    fn test_disabled_and_exempt_methods() {
        let disabled = XsrfGuard::new(&SessionConfig {
            disable_xsrf: true,
            ..Default::default()
        });
        assert!(disabled
            .check(&Method::POST, &HeaderMap::new(), &user_claims(), TokenSource::Cookie)
            .is_ok());

        let guard = XsrfGuard::new(&SessionConfig::default().with_xsrf_ignore_methods(["get"]));
        assert!(guard.is_exempt(&Method::GET));
        assert!(!guard.is_exempt(&Method::POST));
        assert!(guard
            .check(&Method::GET, &HeaderMap::new(), &user_claims(), TokenSource::Cookie)
            .is_ok());
        assert!(guard
            .check(&Method::PUT, &HeaderMap::new(), &user_claims(), TokenSource::Cookie)
            .is_err());
    }
}
