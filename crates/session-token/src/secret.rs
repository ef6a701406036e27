//! Secret selection and audience allow-list
//!
//! Tokens are signed either with one secret shared by every site or with a
//! secret chosen by the token audience. In the per-audience mode the secret
//! for an incoming token can only be found by reading its audience before the
//! signature is checked. That read yields an [`UntrustedAudience`], which is
//! good for nothing except picking the key the real verification runs with.
//!
//! The `trace!` event naming the unverified audience is a diagnostic only;
//! errors are returned, never logged.

use crate::claims::{audience, Claims};
use crate::error::{TokenError, TokenResult};
use crate::hooks::{AudienceReader, SecretReader};
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Arc;

/// Audience passed to the secret reader when verifying in single-secret mode.
pub const SINGLE_SECRET_AUDIENCE: &str = "ignore";

/// How signing secrets are selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretMode {
    /// One secret for all audiences
    Single,
    /// Secret looked up by the token audience
    PerAudience,
}

/// Audience read from a token whose signature has not been verified.
///
/// The value is deliberately opaque: it can be handed to
/// [`AudienceSecretResolver`] to pick a key and nothing else.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UntrustedAudience(String);

#[derive(Deserialize)]
struct AudienceOnly {
    #[serde(default, with = "audience")]
    aud: Vec<String>,
}

impl UntrustedAudience {
    /// Pre-parse `token` and extract its first audience without checking the
    /// signature or any other claim.
    pub fn peek(token: &str) -> TokenResult<Self> {
        let mut validation = Validation::default();
        validation.insecure_disable_signature_validation();
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.required_spec_claims = HashSet::new();

        let data = decode::<AudienceOnly>(token, &DecodingKey::from_secret(&[]), &validation)
            .map_err(|e| TokenError::Malformed(format!("can't pre-parse token: {e}")))?;

        match data.claims.aud.into_iter().next() {
            Some(aud) if !aud.trim().is_empty() => Ok(Self(aud)),
            _ => Err(TokenError::AudienceRejected("empty aud".to_string())),
        }
    }
}

/// Resolves the signing/verification secret for a token.
#[derive(Clone)]
pub struct AudienceSecretResolver {
    reader: Option<Arc<dyn SecretReader>>,
    mode: SecretMode,
}

impl std::fmt::Debug for AudienceSecretResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudienceSecretResolver")
            .field("reader", &self.reader.as_ref().map(|_| "[REDACTED]"))
            .field("mode", &self.mode)
            .finish()
    }
}

impl AudienceSecretResolver {
    /// Create a resolver over `reader`.
    pub fn new(reader: Option<Arc<dyn SecretReader>>, mode: SecretMode) -> Self {
        Self { reader, mode }
    }

    /// Secret selection mode.
    pub fn mode(&self) -> SecretMode {
        self.mode
    }

    /// Fail unless a secret reader is configured.
    pub fn ensure_configured(&self) -> TokenResult<&dyn SecretReader> {
        self.reader
            .as_deref()
            .ok_or_else(|| TokenError::Config("secret reader not defined".to_string()))
    }

    /// Secret used to sign claims for `aud`.
    pub fn for_signing(&self, aud: &str) -> TokenResult<String> {
        self.lookup(aud)
    }

    /// Secret used to verify `token`.
    ///
    /// In per-audience mode this pre-parses the token; the result is only as
    /// trustworthy as the verification that follows.
    pub fn for_token(&self, token: &str) -> TokenResult<String> {
        match self.mode {
            SecretMode::Single => self.lookup(SINGLE_SECRET_AUDIENCE),
            SecretMode::PerAudience => {
                let untrusted = UntrustedAudience::peek(token)?;
                tracing::trace!(aud = %untrusted.0, "selecting secret from unverified audience");
                self.for_untrusted(&untrusted)
            }
        }
    }

    /// Secret for an audience taken from an unverified token.
    pub fn for_untrusted(&self, aud: &UntrustedAudience) -> TokenResult<String> {
        self.lookup(&aud.0)
    }

    /// Secret for an explicitly chosen audience, regardless of mode.
    pub fn for_audience(&self, aud: &str) -> TokenResult<String> {
        self.lookup(aud)
    }

    fn lookup(&self, aud: &str) -> TokenResult<String> {
        let secret = self
            .ensure_configured()?
            .get(aud)
            .map_err(|e| TokenError::SecretResolution(e.to_string()))?;
        if secret.is_empty() {
            return Err(TokenError::SecretResolution(format!(
                "empty secret for audience {aud:?}"
            )));
        }
        Ok(secret)
    }
}

/// Check the claim audience against the allow-list.
///
/// The claim must carry a non-empty audience. When a reader is configured and
/// returns a non-empty list, the audience must match one entry ignoring case.
pub fn check_audience(claims: &Claims, reader: Option<&dyn AudienceReader>) -> TokenResult<()> {
    let aud = match claims.audience() {
        Some(aud) if !aud.trim().is_empty() => aud,
        _ => return Err(TokenError::AudienceRejected("no audience provided".to_string())),
    };

    let Some(reader) = reader else {
        return Ok(());
    };

    let allowed = reader
        .get()
        .map_err(|e| TokenError::AudienceRejected(format!("failed to get auds: {e}")))?;
    if allowed.is_empty() || allowed.iter().any(|a| a.eq_ignore_ascii_case(aud)) {
        return Ok(());
    }
    Err(TokenError::AudienceRejected(format!("aud {aud:?} not allowed")))
}
