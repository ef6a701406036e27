//! Host-supplied hooks
//!
//! The session service delegates key lookup, the audience allow-list and
//! claims enrichment to the host application. Each hook is a single-method
//! trait; plain closures implement them through blanket impls, so
//! `|aud: &str| Ok("secret".to_string())` is a valid [`SecretReader`].

use crate::claims::Claims;
use crate::error::HookError;
use std::collections::HashMap;

/// Returns the signing secret for an audience.
///
/// In single-secret mode the audience argument carries no meaning and
/// implementations should ignore it.
pub trait SecretReader: Send + Sync {
    /// Get the secret for `aud`.
    fn get(&self, aud: &str) -> Result<String, HookError>;
}

impl<F> SecretReader for F
where
    F: Fn(&str) -> Result<String, HookError> + Send + Sync,
{
    fn get(&self, aud: &str) -> Result<String, HookError> {
        self(aud)
    }
}

/// Returns the list of audiences tokens may be issued for.
pub trait AudienceReader: Send + Sync {
    /// Get the allowed audiences. An empty list allows any audience.
    fn get(&self) -> Result<Vec<String>, HookError>;
}

impl<F> AudienceReader for F
where
    F: Fn() -> Result<Vec<String>, HookError> + Send + Sync,
{
    fn get(&self) -> Result<Vec<String>, HookError> {
        self()
    }
}

/// Adds extras to claims right before they are signed.
pub trait ClaimsUpdater: Send + Sync {
    /// Return the claims to sign.
    fn update(&self, claims: Claims) -> Claims;
}

impl<F> ClaimsUpdater for F
where
    F: Fn(Claims) -> Claims + Send + Sync,
{
    fn update(&self, claims: Claims) -> Claims {
        self(claims)
    }
}

/// Accepts or rejects a verified token with host-defined rules.
///
/// Not consulted automatically; call it after a successful read, e.g. through
/// [`SessionService::check_with`](crate::SessionService::check_with).
pub trait Validator: Send + Sync {
    /// `true` to accept the token.
    fn validate(&self, token: &str, claims: &Claims) -> bool;
}

impl<F> Validator for F
where
    F: Fn(&str, &Claims) -> bool + Send + Sync,
{
    fn validate(&self, token: &str, claims: &Claims) -> bool {
        self(token, claims)
    }
}

/// One secret for every audience.
#[derive(Clone)]
pub struct StaticSecret(String);

impl StaticSecret {
    /// Create a reader returning `secret`.
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }
}

impl std::fmt::Debug for StaticSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("StaticSecret").field(&"[REDACTED]").finish()
    }
}

impl SecretReader for StaticSecret {
    fn get(&self, _aud: &str) -> Result<String, HookError> {
        Ok(self.0.clone())
    }
}

/// A distinct secret per audience. Unknown audiences fail.
#[derive(Clone, Default)]
pub struct AudienceSecrets {
    secrets: HashMap<String, String>,
}

impl AudienceSecrets {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a secret for `aud`.
    pub fn with(mut self, aud: impl Into<String>, secret: impl Into<String>) -> Self {
        self.secrets.insert(aud.into(), secret.into());
        self
    }
}

impl std::fmt::Debug for AudienceSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudienceSecrets")
            .field("audiences", &self.secrets.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl SecretReader for AudienceSecrets {
    fn get(&self, aud: &str) -> Result<String, HookError> {
        self.secrets
            .get(aud)
            .cloned()
            .ok_or_else(|| format!("no secret for audience {aud:?}").into())
    }
}

/// Fixed allow-list of audiences.
#[derive(Debug, Clone, Default)]
pub struct StaticAudiences(Vec<String>);

impl StaticAudiences {
    /// Create an allow-list.
    pub fn new<I, S>(audiences: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(audiences.into_iter().map(Into::into).collect())
    }
}

impl AudienceReader for StaticAudiences {
    fn get(&self) -> Result<Vec<String>, HookError> {
        Ok(self.0.clone())
    }
}
