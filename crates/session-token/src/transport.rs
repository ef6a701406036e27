//! Token transport over HTTP
//!
//! Tokens arrive in a query parameter, a request header or the session
//! cookie, checked in that order. Issued tokens leave either as a response
//! header or as a pair of cookies: the `HttpOnly` session cookie holding the
//! token and a script-readable XSRF cookie holding the token id.

use crate::claims::Claims;
use crate::config::SessionConfig;
use crate::error::{TokenError, TokenResult};
use chrono::Duration;
use cookie::time::{self, OffsetDateTime};
use cookie::{Cookie, SameSite};
use http::header::{COOKIE, SET_COOKIE};
use http::{HeaderMap, HeaderName, HeaderValue, Uri};
use std::fmt;
use url::form_urlencoded;

/// Channel a token was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenSource {
    /// URL query parameter
    Query,
    /// Request header
    Header,
    /// Session cookie
    Cookie,
}

impl TokenSource {
    /// Check if the token came with the session cookie, the one channel a
    /// browser attaches on its own.
    pub fn is_cookie(self) -> bool {
        self == TokenSource::Cookie
    }

    /// Get the string representation.
    pub fn as_str(self) -> &'static str {
        match self {
            TokenSource::Query => "query",
            TokenSource::Header => "header",
            TokenSource::Cookie => "cookie",
        }
    }
}

impl fmt::Display for TokenSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw token together with the channel it was read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveredToken {
    /// Encoded token
    pub token: String,
    /// Delivery channel
    pub source: TokenSource,
}

/// Attributes shared by every cookie the transport sets.
#[derive(Debug, Clone)]
struct CookieAttrs {
    domain: String,
    secure: bool,
    same_site: Option<SameSite>,
}

impl CookieAttrs {
    fn build(
        &self,
        name: &str,
        value: &str,
        http_only: bool,
        max_age: Option<Duration>,
    ) -> Cookie<'static> {
        let mut builder = Cookie::build((name.to_string(), value.to_string()))
            .path("/")
            .http_only(http_only)
            .secure(self.secure);
        if !self.domain.is_empty() {
            builder = builder.domain(self.domain.clone());
        }
        if let Some(same_site) = self.same_site {
            builder = builder.same_site(same_site);
        }
        if let Some(max_age) = max_age {
            builder = builder.max_age(time::Duration::seconds(max_age.num_seconds()));
        }
        builder.build()
    }

    fn reset(&self, name: &str) -> TokenResult<HeaderValue> {
        let mut cookie = self.build(name, "", false, None);
        cookie.set_max_age(time::Duration::ZERO);
        cookie.set_expires(OffsetDateTime::UNIX_EPOCH);
        HeaderValue::from_str(&cookie.to_string())
            .map_err(|e| TokenError::Config(format!("invalid cookie {:?}: {}", name, e)))
    }
}

/// Reads and writes tokens on HTTP messages.
#[derive(Debug, Clone)]
pub struct Transport {
    jwt_cookie_name: String,
    jwt_header: HeaderName,
    xsrf_cookie_name: String,
    jwt_query: String,
    attrs: CookieAttrs,
    cookie_duration: Duration,
    send_jwt_header: bool,
    reset_cookies: [HeaderValue; 2],
}

impl Transport {
    /// Build the transport from configuration.
    ///
    /// # Errors
    ///
    /// [`TokenError::Config`] if a header or cookie name can't appear in an
    /// HTTP message.
    pub fn new(config: &SessionConfig) -> TokenResult<Self> {
        let jwt_header = HeaderName::from_bytes(config.jwt_header_key.as_bytes()).map_err(|e| {
            TokenError::Config(format!("invalid header {:?}: {}", config.jwt_header_key, e))
        })?;
        validate_cookie_name(&config.jwt_cookie_name)?;
        validate_cookie_name(&config.xsrf_cookie_name)?;

        let attrs = CookieAttrs {
            domain: config.jwt_cookie_domain.clone(),
            secure: config.secure_cookies,
            same_site: config.same_site,
        };
        let reset_cookies = [
            attrs.reset(&config.jwt_cookie_name)?,
            attrs.reset(&config.xsrf_cookie_name)?,
        ];

        Ok(Self {
            jwt_cookie_name: config.jwt_cookie_name.clone(),
            jwt_header,
            xsrf_cookie_name: config.xsrf_cookie_name.clone(),
            jwt_query: config.jwt_query.clone(),
            attrs,
            cookie_duration: config.cookie_duration,
            send_jwt_header: config.send_jwt_header,
            reset_cookies,
        })
    }

    /// Find the token in the query, then the header, then the cookie.
    ///
    /// Empty values count as absent.
    pub fn read(&self, uri: &Uri, headers: &HeaderMap) -> TokenResult<DeliveredToken> {
        let delivered = |token: String, source| DeliveredToken { token, source };

        if let Some(token) = self.from_query(uri) {
            return Ok(delivered(token, TokenSource::Query));
        }
        if let Some(token) = self.from_header(headers) {
            return Ok(delivered(token, TokenSource::Header));
        }
        if let Some(token) = self.from_cookie(headers) {
            return Ok(delivered(token, TokenSource::Cookie));
        }
        Err(TokenError::TokenNotFound)
    }

    /// Write an issued token to the response.
    ///
    /// In header mode only the token header is set. Otherwise the session and
    /// XSRF cookies are appended; both are browser-session cookies when the
    /// claims are session-only or carry a handshake. Nothing is written
    /// unless both cookies can be.
    ///
    /// # Errors
    ///
    /// [`TokenError::Internal`] if the token or the token id holds bytes not
    /// allowed in a cookie value.
    pub fn write(&self, headers: &mut HeaderMap, token: &str, claims: &Claims) -> TokenResult<()> {
        if self.send_jwt_header {
            let value = HeaderValue::from_str(token)
                .map_err(|e| TokenError::Internal(format!("Invalid token header value: {}", e)))?;
            headers.insert(self.jwt_header.clone(), value);
            return Ok(());
        }

        let max_age = if claims.session_only || claims.handshake.is_some() {
            None
        } else {
            Some(self.cookie_duration)
        };

        let jwt_cookie = self.set_cookie(&self.jwt_cookie_name, token, true, max_age)?;
        let xsrf_cookie = self.set_cookie(&self.xsrf_cookie_name, claims.id(), false, max_age)?;
        headers.append(SET_COOKIE, jwt_cookie);
        headers.append(SET_COOKIE, xsrf_cookie);
        Ok(())
    }

    /// Overwrite both cookies with empty, already-expired values.
    pub fn clear(&self, headers: &mut HeaderMap) {
        for value in &self.reset_cookies {
            headers.append(SET_COOKIE, value.clone());
        }
    }

    fn from_query(&self, uri: &Uri) -> Option<String> {
        let query = uri.query()?;
        form_urlencoded::parse(query.as_bytes())
            .find(|(key, _)| key == self.jwt_query.as_str())
            .map(|(_, value)| value.into_owned())
            .filter(|value| !value.is_empty())
    }

    fn from_header(&self, headers: &HeaderMap) -> Option<String> {
        headers
            .get(&self.jwt_header)
            .and_then(|value| value.to_str().ok())
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    }

    fn from_cookie(&self, headers: &HeaderMap) -> Option<String> {
        headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|value| Cookie::split_parse(value))
            .filter_map(Result::ok)
            .find(|cookie| cookie.name() == self.jwt_cookie_name)
            .map(|cookie| cookie.value().to_string())
            .filter(|value| !value.is_empty())
    }

    fn set_cookie(
        &self,
        name: &str,
        value: &str,
        http_only: bool,
        max_age: Option<Duration>,
    ) -> TokenResult<HeaderValue> {
        if !is_cookie_value(value) {
            return Err(TokenError::Internal(format!(
                "invalid value for cookie {:?}",
                name
            )));
        }
        let cookie = self.attrs.build(name, value, http_only, max_age);
        HeaderValue::from_str(&cookie.to_string())
            .map_err(|e| TokenError::Internal(format!("invalid cookie {:?}: {}", name, e)))
    }
}

fn validate_cookie_name(name: &str) -> TokenResult<()> {
    let valid = !name.is_empty()
        && name
            .bytes()
            .all(|b| b.is_ascii_graphic() && !b"()<>@,;:\\\"/[]?={}".contains(&b));
    if valid {
        Ok(())
    } else {
        Err(TokenError::Config(format!("invalid cookie name {:?}", name)))
    }
}

/// RFC 6265 cookie-octet: visible ASCII except `"`, `,`, `;` and `\`.
fn is_cookie_value(value: &str) -> bool {
    value
        .bytes()
        .all(|b| b.is_ascii_graphic() && !matches!(b, b'"' | b',' | b';' | b'\\'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::claims::Handshake;

    fn transport() -> Transport {
        Transport::new(&SessionConfig::default()).unwrap()
    }

    fn set_cookies(headers: &HeaderMap) -> Vec<Cookie<'static>> {
        headers
            .get_all(SET_COOKIE)
            .iter()
            .map(|v| Cookie::parse(v.to_str().unwrap().to_string()).unwrap())
            .collect()
    }

    fn with_cookie(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_read_precedence() {
        let transport = transport();
        let mut headers = with_cookie("JWT=from-cookie; other=1");
        headers.insert("x-jwt", HeaderValue::from_static("from-header"));
        let uri: Uri = "/api/v1/find?site=remark&token=from-query".parse().unwrap();

        let delivered = transport.read(&uri, &headers).unwrap();
        assert_eq!(delivered.token, "from-query");
        assert_eq!(delivered.source, TokenSource::Query);

        let uri: Uri = "/api/v1/find?site=remark".parse().unwrap();
        let delivered = transport.read(&uri, &headers).unwrap();
        assert_eq!(delivered.source, TokenSource::Header);

        headers.remove("X-JWT");
        let delivered = transport.read(&uri, &headers).unwrap();
        assert_eq!(delivered.token, "from-cookie");
        assert!(delivered.source.is_cookie());
    }

    #[test]
    fn test_read_not_found() {
        let transport = transport();
        let uri: Uri = "/?token=".parse().unwrap();
        let headers = with_cookie("JWT=; XSRF-TOKEN=abc");

        assert!(matches!(
            transport.read(&uri, &headers),
            Err(TokenError::TokenNotFound)
        ));
        assert!(matches!(
            transport.read(&Uri::from_static("/"), &HeaderMap::new()),
            Err(TokenError::TokenNotFound)
        ));
    }

    #[test]
    fn test_write_cookies() {
        let config = SessionConfig {
            secure_cookies: true,
            same_site: Some(SameSite::Strict),
            jwt_cookie_domain: "example.com".to_string(),
            ..Default::default()
        };
        let transport = Transport::new(&config).unwrap();
        let claims = Claims {
            jti: Some("xsrf-id".to_string()),
            ..Default::default()
        };

        let mut headers = HeaderMap::new();
        transport.write(&mut headers, "a.b.c", &claims).unwrap();
        let cookies = set_cookies(&headers);
        assert_eq!(cookies.len(), 2);

        let jwt = &cookies[0];
        assert_eq!(jwt.name(), "JWT");
        assert_eq!(jwt.value(), "a.b.c");
        assert_eq!(jwt.http_only(), Some(true));
        assert_eq!(jwt.path(), Some("/"));
        assert_eq!(jwt.domain(), Some("example.com"));
        assert_eq!(jwt.secure(), Some(true));
        assert_eq!(jwt.same_site(), Some(SameSite::Strict));
        assert_eq!(
            jwt.max_age(),
            Some(time::Duration::seconds(Duration::days(31).num_seconds()))
        );

        let xsrf = &cookies[1];
        assert_eq!(xsrf.name(), "XSRF-TOKEN");
        assert_eq!(xsrf.value(), "xsrf-id");
        assert_ne!(xsrf.http_only(), Some(true));
        assert_eq!(xsrf.max_age(), jwt.max_age());
        assert!(headers.get("X-JWT").is_none());
    }

    #[test]
    fn test_session_only_and_handshake_cookies() {
        let transport = transport();

        for claims in [
            Claims::new().session_only(true),
            Claims::new().with_handshake(Handshake {
                state: "s".to_string(),
                ..Default::default()
            }),
        ] {
            let mut headers = HeaderMap::new();
            transport.write(&mut headers, "a.b.c", &claims).unwrap();
            for cookie in set_cookies(&headers) {
                assert_eq!(cookie.max_age(), None, "{} must be a session cookie", cookie.name());
                assert_eq!(cookie.expires(), None);
            }
        }
    }

    #[test]
    fn test_write_header_mode() {
        let config = SessionConfig {
            send_jwt_header: true,
            ..Default::default()
        };
        let transport = Transport::new(&config).unwrap();

        let mut headers = HeaderMap::new();
        transport.write(&mut headers, "a.b.c", &Claims::new()).unwrap();
        assert_eq!(headers.get("X-JWT").unwrap(), "a.b.c");
        assert!(headers.get(SET_COOKIE).is_none());
    }

    #[test]
    fn test_clear() {
        let transport = transport();
        let mut headers = HeaderMap::new();
        transport.clear(&mut headers);

        let cookies = set_cookies(&headers);
        let names: Vec<_> = cookies.iter().map(|c| c.name().to_string()).collect();
        assert_eq!(names, vec!["JWT", "XSRF-TOKEN"]);
        for cookie in cookies {
            assert_eq!(cookie.value(), "");
            assert_eq!(cookie.path(), Some("/"));
            assert_eq!(cookie.max_age(), Some(time::Duration::ZERO));
            let expires = cookie.expires_datetime().unwrap();
            assert!(expires <= OffsetDateTime::UNIX_EPOCH);
        }
    }

    #[test]
    fn test_write_rejects_unsafe_token_id() {
        let transport = transport();

        for id in ["bad\nid", "x; Domain=evil.example; Max-Age=99999999", "a,b", "a b"] {
            let claims = Claims {
                jti: Some(id.to_string()),
                ..Default::default()
            };
            let mut headers = HeaderMap::new();
            assert!(matches!(
                transport.write(&mut headers, "a.b.c", &claims),
                Err(TokenError::Internal(_))
            ));
            assert!(headers.is_empty(), "partial write for {:?}", id);
        }
    }

    #[test]
    fn test_write_rejects_unsafe_token() {
        let transport = transport();
        let mut headers = HeaderMap::new();
        assert!(matches!(
            transport.write(&mut headers, "a.b; Domain=evil.example", &Claims::new()),
            Err(TokenError::Internal(_))
        ));
        assert!(headers.get(SET_COOKIE).is_none());
    }

    #[test]
    fn test_invalid_names_rejected() {
        let config = SessionConfig {
            jwt_header_key: "bad header".to_string(),
            ..Default::default()
        };
        assert!(matches!(Transport::new(&config), Err(TokenError::Config(_))));

        let config = SessionConfig {
            jwt_cookie_name: "bad;cookie".to_string(),
            ..Default::default()
        };
        assert!(matches!(Transport::new(&config), Err(TokenError::Config(_))));
    }
}
