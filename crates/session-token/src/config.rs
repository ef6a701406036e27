//! Session service configuration.
//!
//! A [`SessionConfig`] is built once at startup and shared read-only by every
//! request. Unset fields (empty names, zero durations) are replaced with the
//! defaults below when the service is created, see [`SessionConfig::with_defaults`].

use crate::hooks::{AudienceReader, ClaimsUpdater, SecretReader};
use crate::jwt::AudienceFormat;
use chrono::Duration;
use cookie::SameSite;
use std::sync::Arc;

/// Default session cookie name.
pub const DEFAULT_JWT_COOKIE_NAME: &str = "JWT";
/// Default session header name.
pub const DEFAULT_JWT_HEADER_KEY: &str = "X-JWT";
/// Default XSRF cookie name.
pub const DEFAULT_XSRF_COOKIE_NAME: &str = "XSRF-TOKEN";
/// Default XSRF header name.
pub const DEFAULT_XSRF_HEADER_KEY: &str = "X-XSRF-TOKEN";
/// Default query parameter carrying a token.
pub const DEFAULT_JWT_QUERY: &str = "token";
/// Default `iss` claim.
pub const DEFAULT_ISSUER: &str = "session-token";

/// Default token lifetime.
pub fn default_token_duration() -> Duration {
    Duration::minutes(15)
}

/// Default persistent cookie lifetime.
pub fn default_cookie_duration() -> Duration {
    Duration::days(31)
}

/// Configuration of the session service.
#[derive(Clone)]
pub struct SessionConfig {
    /// Source of signing secrets
    pub secret_reader: Option<Arc<dyn SecretReader>>,

    /// Allow-list of audiences, any audience allowed when unset
    pub audience_reader: Option<Arc<dyn AudienceReader>>,

    /// Hook run on claims before signing
    pub claims_updater: Option<Arc<dyn ClaimsUpdater>>,

    /// Set `Secure` on cookies
    pub secure_cookies: bool,

    /// Lifetime of a freshly issued token
    pub token_duration: Duration,

    /// Max-Age of persistent cookies
    pub cookie_duration: Duration,

    /// Skip the double-submit XSRF check
    pub disable_xsrf: bool,

    /// Don't set the `iat` claim
    pub disable_iat: bool,

    /// Session cookie name
    pub jwt_cookie_name: String,

    /// Cookie domain, empty for a host-only cookie
    pub jwt_cookie_domain: String,

    /// Header carrying the token
    pub jwt_header_key: String,

    /// XSRF cookie name
    pub xsrf_cookie_name: String,

    /// Header carrying the XSRF value
    pub xsrf_header_key: String,

    /// Methods exempt from the XSRF check
    pub xsrf_ignore_methods: Vec<String>,

    /// Query parameter carrying the token
    pub jwt_query: String,

    /// `iss` claim for issued tokens
    pub issuer: String,

    /// Use a distinct secret per audience; tokens are pre-parsed (unverified)
    /// to find which secret to check them with
    pub aud_secrets: bool,

    /// Send the token in a response header instead of cookies
    pub send_jwt_header: bool,

    /// `SameSite` cookie attribute, omitted when `None`
    pub same_site: Option<SameSite>,

    /// How a single audience is written into the token
    pub audience_format: AudienceFormat,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            secret_reader: None,
            audience_reader: None,
            claims_updater: None,
            secure_cookies: false,
            token_duration: default_token_duration(),
            cookie_duration: default_cookie_duration(),
            disable_xsrf: false,
            disable_iat: false,
            jwt_cookie_name: DEFAULT_JWT_COOKIE_NAME.to_string(),
            jwt_cookie_domain: String::new(),
            jwt_header_key: DEFAULT_JWT_HEADER_KEY.to_string(),
            xsrf_cookie_name: DEFAULT_XSRF_COOKIE_NAME.to_string(),
            xsrf_header_key: DEFAULT_XSRF_HEADER_KEY.to_string(),
            xsrf_ignore_methods: Vec::new(),
            jwt_query: DEFAULT_JWT_QUERY.to_string(),
            issuer: DEFAULT_ISSUER.to_string(),
            aud_secrets: false,
            send_jwt_header: false,
            same_site: None,
            audience_format: AudienceFormat::default(),
        }
    }
}

impl std::fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionConfig")
            .field("secret_reader", &self.secret_reader.as_ref().map(|_| "[REDACTED]"))
            .field("audience_reader", &self.audience_reader.is_some())
            .field("claims_updater", &self.claims_updater.is_some())
            .field("secure_cookies", &self.secure_cookies)
            .field("token_duration", &self.token_duration)
            .field("cookie_duration", &self.cookie_duration)
            .field("disable_xsrf", &self.disable_xsrf)
            .field("disable_iat", &self.disable_iat)
            .field("jwt_cookie_name", &self.jwt_cookie_name)
            .field("jwt_cookie_domain", &self.jwt_cookie_domain)
            .field("jwt_header_key", &self.jwt_header_key)
            .field("xsrf_cookie_name", &self.xsrf_cookie_name)
            .field("xsrf_header_key", &self.xsrf_header_key)
            .field("xsrf_ignore_methods", &self.xsrf_ignore_methods)
            .field("jwt_query", &self.jwt_query)
            .field("issuer", &self.issuer)
            .field("aud_secrets", &self.aud_secrets)
            .field("send_jwt_header", &self.send_jwt_header)
            .field("same_site", &self.same_site)
            .field("audience_format", &self.audience_format)
            .finish()
    }
}

impl SessionConfig {
    /// Create a configuration with a single signing secret.
    pub fn with_secret(secret: impl Into<String>) -> Self {
        Self::default().with_secret_reader(crate::hooks::StaticSecret::new(secret))
    }

    /// Load scalar settings from environment variables.
    ///
    /// Hooks are not configurable from the environment; set them with the
    /// `with_*` methods afterwards.
    ///
    /// Environment variables:
    /// - `SESSION_JWT_COOKIE_NAME`: session cookie name (default: JWT)
    /// - `SESSION_JWT_COOKIE_DOMAIN`: cookie domain (default: host-only)
    /// - `SESSION_JWT_HEADER_KEY`: token header (default: X-JWT)
    /// - `SESSION_XSRF_COOKIE_NAME`: XSRF cookie name (default: XSRF-TOKEN)
    /// - `SESSION_XSRF_HEADER_KEY`: XSRF header (default: X-XSRF-TOKEN)
    /// - `SESSION_XSRF_IGNORE_METHODS`: comma-separated exempt methods
    /// - `SESSION_JWT_QUERY`: token query parameter (default: token)
    /// - `SESSION_ISSUER`: `iss` claim (default: session-token)
    /// - `SESSION_TOKEN_DURATION_SECS`: token lifetime (default: 900)
    /// - `SESSION_COOKIE_DURATION_SECS`: cookie lifetime (default: 2678400)
    /// - `SESSION_SECURE_COOKIES`, `SESSION_DISABLE_XSRF`, `SESSION_DISABLE_IAT`,
    ///   `SESSION_SEND_JWT_HEADER`, `SESSION_AUD_SECRETS`: flags (default: false)
    /// - `SESSION_SAME_SITE`: `strict`, `lax` or `none` (default: unset)
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load scalar settings through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let default = Self::default();
        let string = |key: &str, default: String| lookup(key).unwrap_or(default);
        let flag = |key: &str| {
            lookup(key)
                .map(|s| matches!(s.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(false)
        };
        let seconds = |key: &str, default: Duration| {
            lookup(key)
                .and_then(|s| s.trim().parse::<i64>().ok())
                .map(Duration::seconds)
                .unwrap_or(default)
        };

        Self {
            secure_cookies: flag("SESSION_SECURE_COOKIES"),
            token_duration: seconds("SESSION_TOKEN_DURATION_SECS", default.token_duration),
            cookie_duration: seconds("SESSION_COOKIE_DURATION_SECS", default.cookie_duration),
            disable_xsrf: flag("SESSION_DISABLE_XSRF"),
            disable_iat: flag("SESSION_DISABLE_IAT"),
            jwt_cookie_name: string("SESSION_JWT_COOKIE_NAME", default.jwt_cookie_name),
            jwt_cookie_domain: string("SESSION_JWT_COOKIE_DOMAIN", default.jwt_cookie_domain),
            jwt_header_key: string("SESSION_JWT_HEADER_KEY", default.jwt_header_key),
            xsrf_cookie_name: string("SESSION_XSRF_COOKIE_NAME", default.xsrf_cookie_name),
            xsrf_header_key: string("SESSION_XSRF_HEADER_KEY", default.xsrf_header_key),
            xsrf_ignore_methods: lookup("SESSION_XSRF_IGNORE_METHODS")
                .map(|s| {
                    s.split(',')
                        .map(str::trim)
                        .filter(|m| !m.is_empty())
                        .map(str::to_ascii_uppercase)
                        .collect()
                })
                .unwrap_or_default(),
            jwt_query: string("SESSION_JWT_QUERY", default.jwt_query),
            issuer: string("SESSION_ISSUER", default.issuer),
            aud_secrets: flag("SESSION_AUD_SECRETS"),
            send_jwt_header: flag("SESSION_SEND_JWT_HEADER"),
            same_site: lookup("SESSION_SAME_SITE").and_then(|s| parse_same_site(&s)),
            ..default
        }
    }

    /// Replace unset names and zero durations with defaults.
    pub fn with_defaults(mut self) -> Self {
        fn set_default(field: &mut String, default: &str) {
            if field.is_empty() {
                *field = default.to_string();
            }
        }

        set_default(&mut self.jwt_cookie_name, DEFAULT_JWT_COOKIE_NAME);
        set_default(&mut self.jwt_header_key, DEFAULT_JWT_HEADER_KEY);
        set_default(&mut self.xsrf_cookie_name, DEFAULT_XSRF_COOKIE_NAME);
        set_default(&mut self.xsrf_header_key, DEFAULT_XSRF_HEADER_KEY);
        set_default(&mut self.jwt_query, DEFAULT_JWT_QUERY);
        set_default(&mut self.issuer, DEFAULT_ISSUER);

        if self.token_duration.is_zero() {
            self.token_duration = default_token_duration();
        }
        if self.cookie_duration.is_zero() {
            self.cookie_duration = default_cookie_duration();
        }
        self
    }

    /// Set the secret reader.
    pub fn with_secret_reader(mut self, reader: impl SecretReader + 'static) -> Self {
        self.secret_reader = Some(Arc::new(reader));
        self
    }

    /// Set the audience allow-list reader.
    pub fn with_audience_reader(mut self, reader: impl AudienceReader + 'static) -> Self {
        self.audience_reader = Some(Arc::new(reader));
        self
    }

    /// Set the claims updater.
    pub fn with_claims_updater(mut self, updater: impl ClaimsUpdater + 'static) -> Self {
        self.claims_updater = Some(Arc::new(updater));
        self
    }

    /// Set the token lifetime.
    pub fn with_token_duration(mut self, duration: Duration) -> Self {
        self.token_duration = duration;
        self
    }

    /// Set the persistent cookie lifetime.
    pub fn with_cookie_duration(mut self, duration: Duration) -> Self {
        self.cookie_duration = duration;
        self
    }

    /// Enable per-audience secrets.
    pub fn with_aud_secrets(mut self, enabled: bool) -> Self {
        self.aud_secrets = enabled;
        self
    }

    /// Set methods exempt from the XSRF check.
    pub fn with_xsrf_ignore_methods<I, S>(mut self, methods: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.xsrf_ignore_methods = methods.into_iter().map(Into::into).collect();
        self
    }
}

fn parse_same_site(value: &str) -> Option<SameSite> {
    match value.trim().to_ascii_lowercase().as_str() {
        "strict" => Some(SameSite::Strict),
        "lax" => Some(SameSite::Lax),
        "none" => Some(SameSite::None),
        _ => None,
    }
}
