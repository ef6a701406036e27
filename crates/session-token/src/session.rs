//! Session issuance and verification
//!
//! [`SessionService`] is the entry point used by request handlers. It fills
//! in claim defaults, signs and writes sessions, and on the way back reads the
//! token from whichever channel carries it, verifies it and applies the
//! channel-dependent expiry and XSRF rules:
//!
//! - header or query delivery: expired tokens are accepted, leaving refresh
//!   to the client that holds the token
//! - cookie delivery: expired tokens are rejected, and user sessions must
//!   pass the double-submit XSRF check
//!
//! Rejections are reported through the returned error. The `debug!` event
//! emitted alongside is a diagnostic only and carries no token material.

use crate::claims::{new_token_id, Claims};
use crate::config::SessionConfig;
use crate::error::{TokenError, TokenResult};
use crate::hooks::Validator;
use crate::jwt::TokenCodec;
use crate::transport::{TokenSource, Transport};
use crate::xsrf::XsrfGuard;
use chrono::Utc;
use http::{HeaderMap, Method, Request, Uri};
use tracing::debug;

/// Stateless session service.
///
/// Cheap to share: wrap it in an `Arc` and use it from every request.
#[derive(Debug, Clone)]
pub struct SessionService {
    config: SessionConfig,
    codec: TokenCodec,
    transport: Transport,
    xsrf: XsrfGuard,
}

impl SessionService {
    /// Create a session service. Unset configuration fields get defaults.
    ///
    /// # Errors
    ///
    /// [`TokenError::Config`] if cookie or header names are unusable.
    pub fn new(config: SessionConfig) -> TokenResult<Self> {
        let config = config.with_defaults();
        let codec = TokenCodec::init(&config);
        let transport = Transport::new(&config)?;
        let xsrf = XsrfGuard::new(&config);

        Ok(Self {
            config,
            codec,
            transport,
            xsrf,
        })
    }

    /// Create with a single signing secret and default settings.
    pub fn with_secret(secret: impl Into<String>) -> TokenResult<Self> {
        Self::new(SessionConfig::with_secret(secret))
    }

    /// Get the configuration, defaults applied.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Get the token codec.
    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    /// Sign claims as given, without filling in defaults.
    pub fn sign(&self, claims: Claims) -> TokenResult<String> {
        self.codec.sign(claims)
    }

    /// Verify a token's signature and structure. Expiry is not checked.
    pub fn verify(&self, token: &str) -> TokenResult<Claims> {
        self.codec.verify(token)
    }

    /// Verify a token with the secret of `aud`, ignoring its own audience.
    pub fn verify_as(&self, token: &str, aud: &str) -> TokenResult<Claims> {
        self.codec.verify_as(token, aud)
    }

    /// Issue a session and write it to the response headers.
    ///
    /// Sets the issuer if empty, `iat` unless disabled, `exp` to now plus the
    /// token duration if unset and a fresh token id if missing. Returns the
    /// claims that were signed.
    ///
    /// # Errors
    ///
    /// [`TokenError::Config`] if the token duration overflows the expiry
    /// timestamp, plus any signing or cookie error.
    pub fn write_session(&self, headers: &mut HeaderMap, mut claims: Claims) -> TokenResult<Claims> {
        let now = Utc::now();

        if claims.exp.map_or(true, |exp| exp == 0) {
            let exp = now
                .checked_add_signed(self.config.token_duration)
                .ok_or_else(|| TokenError::Config("token duration out of range".to_string()))?;
            claims.exp = Some(exp.timestamp());
        }
        if claims.iss.as_deref().map_or(true, str::is_empty) {
            claims.iss = Some(self.config.issuer.clone());
        }
        if !self.config.disable_iat {
            claims.iat = Some(now.timestamp());
        }
        if claims.jti.as_deref().map_or(true, str::is_empty) {
            claims.jti = Some(new_token_id());
        }

        let (token, claims) = self.codec.sign_claims(claims)?;
        self.transport.write(headers, &token, &claims)?;
        Ok(claims)
    }

    /// Read and verify the session of a request.
    ///
    /// Returns the claims together with the raw token.
    pub fn read_session<B>(&self, request: &Request<B>) -> TokenResult<(Claims, String)> {
        self.read_session_parts(request.method(), request.uri(), request.headers())
    }

    /// Read and verify a session from request parts.
    pub fn read_session_parts(
        &self,
        method: &Method,
        uri: &Uri,
        headers: &HeaderMap,
    ) -> TokenResult<(Claims, String)> {
        let delivered = self.transport.read(uri, headers)?;
        let source = delivered.source;

        self.accept(method, headers, &delivered.token, source)
            .map(|claims| (claims, delivered.token))
            .map_err(|err| {
                debug!(source = %source, code = err.error_code(), "session rejected");
                err
            })
    }

    /// Overwrite the session cookies with expired, empty ones.
    pub fn clear_session(&self, headers: &mut HeaderMap) {
        self.transport.clear(headers);
    }

    /// Check if claims are expired. Claims without `exp` count as expired.
    pub fn is_expired(&self, claims: &Claims) -> bool {
        claims.is_expired()
    }

    /// Run a consumer validator on a verified token.
    pub fn check_with(
        &self,
        validator: &dyn Validator,
        token: &str,
        claims: &Claims,
    ) -> TokenResult<()> {
        if validator.validate(token, claims) {
            Ok(())
        } else {
            Err(TokenError::Rejected(format!(
                "validator rejected token {:?}",
                claims.id()
            )))
        }
    }

    fn accept(
        &self,
        method: &Method,
        headers: &HeaderMap,
        token: &str,
        source: TokenSource,
    ) -> TokenResult<Claims> {
        let mut claims = self.codec.verify(token)?;

        if let Some(user) = claims.user.as_mut() {
            if claims.aud.len() != 1 {
                return Err(TokenError::AudienceRejected(
                    "aud is not of size 1".to_string(),
                ));
            }
            user.audience = claims.aud[0].clone();
        }

        if source.is_cookie() && claims.is_expired() {
            return Err(TokenError::TokenExpired);
        }

        self.xsrf.check(method, headers, &claims, source)?;
        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::claims::{Handshake, User};
    use chrono::Duration;
    use cookie::Cookie;
    use http::header::{COOKIE, SET_COOKIE};
    use http::HeaderValue;
    use jsonwebtoken::{encode, EncodingKey, Header};

    fn service() -> SessionService {
        SessionService::with_secret("xyz 12345").unwrap()
    }

    fn user_claims() -> Claims {
        Claims::new()
            .with_audience("test_sys")
            .with_user(User::new("id1", "name1"))
    }

    fn cookie_request(token: &str, xsrf: Option<&str>) -> Request<()> {
        let mut builder = Request::post("/comments").header(COOKIE, format!("JWT={token}"));
        if let Some(xsrf) = xsrf {
            builder = builder.header("X-XSRF-TOKEN", xsrf);
        }
        builder.body(()).unwrap()
    }

    #[test]
    fn test_write_session_fills_defaults() {
        let service = service();
        let mut headers = HeaderMap::new();
        let before = Utc::now().timestamp();

        let claims = service.write_session(&mut headers, user_claims()).unwrap();

        assert_eq!(claims.iss.as_deref(), Some("session-token"));
        let exp = claims.exp.unwrap();
        assert!(exp >= before + 15 * 60 && exp <= Utc::now().timestamp() + 15 * 60);
        assert!(claims.iat.is_some());
        assert_eq!(headers.get_all(SET_COOKIE).iter().count(), 2);
    }

    #[test]
    fn test_write_session_keeps_explicit_values() {
        let service = SessionService::new(SessionConfig {
            disable_iat: true,
            ..SessionConfig::with_secret("xyz 12345")
        })
        .unwrap();
        let exp = Utc::now() + Duration::hours(2);
        let mut claims = user_claims().with_expiry(exp);
        claims.iss = Some("custom".to_string());
        claims.jti = None;

        let written = service.write_session(&mut HeaderMap::new(), claims).unwrap();
        assert_eq!(written.exp, Some(exp.timestamp()));
        assert_eq!(written.iss.as_deref(), Some("custom"));
        assert!(written.iat.is_none());
        assert!(!written.id().is_empty());
    }

    #[test]
    fn test_read_session_from_cookie_with_xsrf() {
        let service = service();
        let mut headers = HeaderMap::new();
        let written = service.write_session(&mut headers, user_claims()).unwrap();
        let token = Cookie::parse(
            headers.get(SET_COOKIE).unwrap().to_str().unwrap().to_string(),
        )
        .unwrap()
        .value()
        .to_string();

        let (claims, raw) = service
            .read_session(&cookie_request(&token, Some(written.id())))
            .unwrap();
        assert_eq!(raw, token);
        assert_eq!(claims.user.as_ref().unwrap().audience, "test_sys");

        assert!(matches!(
            service.read_session(&cookie_request(&token, None)),
            Err(TokenError::XsrfMismatch)
        ));
    }

    #[test]
    fn test_user_with_multiple_audiences_rejected() {
        let service = service();
        let mut claims = user_claims().with_expiry(Utc::now() + Duration::hours(1));
        claims.aud = vec!["a".to_string(), "b".to_string()];

        let mut headers = HeaderMap::new();
        assert!(matches!(
            service.write_session(&mut headers, claims.clone()),
            Err(TokenError::AudienceRejected(_))
        ));
        assert!(headers.is_empty());

        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(b"xyz 12345"),
        )
        .unwrap();

        let request = Request::get(format!("/?token={token}")).body(()).unwrap();
        assert!(matches!(
            service.read_session(&request),
            Err(TokenError::AudienceRejected(_))
        ));
    }

    #[test]
    fn test_token_duration_overflow_is_an_error() {
        let service = SessionService::new(
            SessionConfig::with_secret("xyz 12345").with_token_duration(Duration::days(365 * 280_000)),
        )
        .unwrap();
        let mut headers = HeaderMap::new();
        assert!(matches!(
            service.write_session(&mut headers, user_claims()),
            Err(TokenError::Config(_))
        ));
        assert!(headers.is_empty());
    }

    #[test]
    fn test_read_session_not_found() {
        let request = Request::get("/").body(()).unwrap();
        assert!(matches!(
            service().read_session(&request),
            Err(TokenError::TokenNotFound)
        ));
    }

    #[test]
    fn test_read_session_bad_token() {
        let request = Request::get("/")
            .header("X-JWT", "not.a.token")
            .body(())
            .unwrap();
        assert!(service().read_session(&request).is_err());
    }

    #[test]
    fn test_handshake_session_is_browser_session() {
        let service = service();
        let mut headers = HeaderMap::new();
        let claims = Claims::new().with_audience("test_sys").with_handshake(Handshake {
            state: "12345".to_string(),
            from: "from".to_string(),
            id: "provider1-id1".to_string(),
        });
        service.write_session(&mut headers, claims).unwrap();

        for value in headers.get_all(SET_COOKIE) {
            let cookie = Cookie::parse(value.to_str().unwrap().to_string()).unwrap();
            assert!(cookie.max_age().is_none());
        }
    }

    #[test]
    fn test_check_with_validator() {
        let service = service();
        let claims = user_claims();
        let allow = |_token: &str, claims: &Claims| claims.user.is_some();
        let deny = |_token: &str, _claims: &Claims| false;

        assert!(service.check_with(&allow, "t", &claims).is_ok());
        assert!(matches!(
            service.check_with(&deny, "t", &claims),
            Err(TokenError::Rejected(_))
        ));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = SessionConfig {
            xsrf_cookie_name: "bad name".to_string(),
            ..SessionConfig::with_secret("s")
        };
        assert!(matches!(
            SessionService::new(config),
            Err(TokenError::Config(_))
        ));
    }

    #[test]
    fn test_clear_session_without_existing_session() {
        let mut headers = HeaderMap::new();
        headers.insert("x-other", HeaderValue::from_static("1"));
        service().clear_session(&mut headers);

        let cookies: Vec<_> = headers
            .get_all(SET_COOKIE)
            .iter()
            .map(|v| Cookie::parse(v.to_str().unwrap().to_string()).unwrap())
            .collect();
        assert_eq!(cookies.len(), 2);
        assert!(cookies.iter().all(|c| c.value().is_empty()));
    }
}
