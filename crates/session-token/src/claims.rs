//! Session claims
//!
//! This module defines the payload carried inside a signed session token:
//! the registered JWT fields plus the user profile, session flags and the
//! transient handshake record used while a login exchange is in flight.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

/// Claims stored in a session token.
///
/// Registered fields follow RFC 7519. The audience is single-valued: it names
/// the site (tenant) the token was issued for and selects the signing secret
/// when per-audience secrets are enabled.
///
/// # Example
///
/// ```rust
/// use session_token::{Claims, User};
///
/// let claims = Claims::new()
///     .with_audience("site1")
///     .with_user(User::new("dev_user", "Developer"));
///
/// assert_eq!(claims.audience(), Some("site1"));
/// assert!(claims.jti.is_some());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    // Standard JWT claims (RFC 7519)
    /// Subject
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,

    /// Issuer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,

    /// Audience (site id)
    #[serde(default, with = "audience", skip_serializing_if = "Vec::is_empty")]
    pub aud: Vec<String>,

    /// Expiration time (Unix timestamp)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,

    /// Not before (Unix timestamp)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nbf: Option<i64>,

    /// Issued at (Unix timestamp)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,

    /// JWT ID, also the value of the XSRF cookie
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,

    // Session claims
    /// Authenticated user
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<User>,

    /// Browser-session cookie instead of a persistent one
    #[serde(rename = "sess_only", default, skip_serializing_if = "is_false")]
    pub session_only: bool,

    /// Login handshake state
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handshake: Option<Handshake>,

    /// Always render an identicon instead of the user's avatar
    #[serde(rename = "no-ava", default, skip_serializing_if = "is_false")]
    pub no_avatar: bool,

    /// Provider that authenticated the user
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_provider: Option<AuthProvider>,
}

impl Claims {
    /// Create empty claims with a fresh token id.
    pub fn new() -> Self {
        Self {
            jti: Some(new_token_id()),
            ..Default::default()
        }
    }

    /// First (and normally only) audience.
    pub fn audience(&self) -> Option<&str> {
        self.aud.first().map(String::as_str)
    }

    /// Token id, empty if unset.
    pub fn id(&self) -> &str {
        self.jti.as_deref().unwrap_or_default()
    }

    /// Check if the token is expired.
    ///
    /// Claims without an expiration time are treated as expired. This departs
    /// on purpose from go-pkgz/auth, where such claims never expire.
    pub fn is_expired(&self) -> bool {
        match self.exp {
            Some(exp) => Utc::now().timestamp() >= exp,
            None => true,
        }
    }

    /// Get expiration as DateTime.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.exp.and_then(|exp| DateTime::from_timestamp(exp, 0))
    }

    /// Set the audience, replacing any existing value.
    pub fn with_audience(mut self, aud: impl Into<String>) -> Self {
        self.aud = vec![aud.into()];
        self
    }

    /// Set the subject.
    pub fn with_subject(mut self, sub: impl Into<String>) -> Self {
        self.sub = Some(sub.into());
        self
    }

    /// Set the authenticated user.
    pub fn with_user(mut self, user: User) -> Self {
        self.user = Some(user);
        self
    }

    /// Set an absolute expiration time.
    pub fn with_expiry(mut self, exp: DateTime<Utc>) -> Self {
        self.exp = Some(exp.timestamp());
        self
    }

    /// Mark the session as browser-session only.
    pub fn session_only(mut self, session_only: bool) -> Self {
        self.session_only = session_only;
        self
    }

    /// Attach login handshake state.
    pub fn with_handshake(mut self, handshake: Handshake) -> Self {
        self.handshake = Some(handshake);
        self
    }

    /// Record the provider that authenticated the user.
    pub fn with_auth_provider(mut self, name: impl Into<String>) -> Self {
        self.auth_provider = Some(AuthProvider { name: name.into() });
        self
    }

    /// Disable the avatar for this session.
    pub fn without_avatar(mut self) -> Self {
        self.no_avatar = true;
        self
    }
}

impl fmt::Display for Claims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string(self) {
            Ok(json) => f.write_str(&json),
            Err(_) => write!(f, "{:?} {:?}", self.jti, self.user),
        }
    }
}

/// User profile carried in the token.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// Display name
    #[serde(default)]
    pub name: String,

    /// Provider-prefixed user id
    #[serde(default)]
    pub id: String,

    /// Avatar URL
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub picture: String,

    /// Site the session belongs to, copied from the claim audience on read
    #[serde(rename = "aud", default, skip_serializing_if = "String::is_empty")]
    pub audience: String,

    /// Client IP at login
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub ip: String,

    /// Email address
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub email: String,

    /// Free-form attributes set by the host
    #[serde(rename = "attrs", default, skip_serializing_if = "HashMap::is_empty")]
    pub attributes: HashMap<String, serde_json::Value>,

    /// Role name
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub role: String,
}

impl User {
    /// Create a user with id and display name.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    /// Read a boolean attribute, `false` if absent or not a bool.
    pub fn bool_attr(&self, key: &str) -> bool {
        self.attributes
            .get(key)
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false)
    }

    /// Read a string attribute, empty if absent or not a string.
    pub fn str_attr(&self, key: &str) -> &str {
        self.attributes
            .get(key)
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default()
    }

    /// Set a boolean attribute.
    pub fn set_bool_attr(&mut self, key: impl Into<String>, value: bool) {
        self.attributes.insert(key.into(), serde_json::Value::Bool(value));
    }

    /// Set a string attribute.
    pub fn set_str_attr(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.attributes
            .insert(key.into(), serde_json::Value::String(value.into()));
    }

    /// Check the `admin` attribute.
    pub fn is_admin(&self) -> bool {
        self.bool_attr("admin")
    }
}

/// State carried through a multi-step login exchange.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Handshake {
    /// Anti-forgery state sent to the provider
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub state: String,

    /// URL to return to after login
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub from: String,

    /// Handshake id
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
}

/// Provider that created the token.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthProvider {
    /// Provider name
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
}

/// Generate a unique token id.
pub fn new_token_id() -> String {
    Uuid::now_v7().to_string()
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// Audience serialization: one audience is written as a plain string, more
/// than one as an array. Both forms are accepted on input.
pub(crate) mod audience {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    pub fn serialize<S: Serializer>(aud: &[String], serializer: S) -> Result<S::Ok, S::Error> {
        match aud {
            [single] => serializer.serialize_str(single),
            many => many.serialize(serializer),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
        Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
            None => Vec::new(),
            Some(OneOrMany::One(aud)) => vec![aud],
            Some(OneOrMany::Many(auds)) => auds,
        })
    }
}
