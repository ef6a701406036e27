//! JWT signing and verification
//!
//! This module signs session claims with HS256 and verifies incoming tokens
//! with any HMAC algorithm. Verification checks the signature, the
//! not-before and issued-at claims and the audience allow-list. It never
//! rejects a token for being expired; the session layer decides that per
//! delivery channel.

use crate::claims::Claims;
use crate::config::SessionConfig;
use crate::error::{TokenError, TokenResult};
use crate::hooks::{AudienceReader, ClaimsUpdater};
use crate::secret::{check_audience, AudienceSecretResolver, SecretMode};
use chrono::Utc;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use std::collections::HashSet;
use std::sync::Arc;

/// Algorithm used for issued tokens.
pub const SIGNING_ALGORITHM: Algorithm = Algorithm::HS256;

/// Algorithms accepted on verification.
pub const ACCEPTED_ALGORITHMS: [Algorithm; 3] = [Algorithm::HS256, Algorithm::HS384, Algorithm::HS512];

/// How a single audience is written into the token payload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AudienceFormat {
    /// `"aud": "site1"`
    #[default]
    String,
    /// `"aud": ["site1"]`
    Array,
}

/// Token codec: signs claims and verifies tokens with the resolved secret.
#[derive(Clone)]
pub struct TokenCodec {
    audience_format: AudienceFormat,
    resolver: AudienceSecretResolver,
    audience_reader: Option<Arc<dyn AudienceReader>>,
    claims_updater: Option<Arc<dyn ClaimsUpdater>>,
}

impl std::fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCodec")
            .field("audience_format", &self.audience_format)
            .field("resolver", &self.resolver)
            .field("audience_reader", &self.audience_reader.is_some())
            .field("claims_updater", &self.claims_updater.is_some())
            .finish()
    }
}

impl TokenCodec {
    /// Initialize the codec from the service configuration.
    ///
    /// This is where the audience wire format is fixed. The codec is
    /// immutable afterwards, so every token signed by it uses the same format.
    pub fn init(config: &SessionConfig) -> Self {
        let mode = if config.aud_secrets {
            SecretMode::PerAudience
        } else {
            SecretMode::Single
        };

        Self {
            audience_format: config.audience_format,
            resolver: AudienceSecretResolver::new(config.secret_reader.clone(), mode),
            audience_reader: config.audience_reader.clone(),
            claims_updater: config.claims_updater.clone(),
        }
    }

    /// Audience wire format in use.
    pub fn audience_format(&self) -> AudienceFormat {
        self.audience_format
    }

    /// Secret resolver in use.
    pub fn resolver(&self) -> &AudienceSecretResolver {
        &self.resolver
    }

    /// Sign claims.
    ///
    /// # Errors
    ///
    /// - [`TokenError::Config`] if no secret reader is configured
    /// - [`TokenError::AudienceRejected`] if the audience is missing or not
    ///   allowed, or if claims with a user carry more than one audience
    /// - [`TokenError::SecretResolution`] if the secret can't be read
    pub fn sign(&self, claims: Claims) -> TokenResult<String> {
        self.sign_claims(claims).map(|(token, _)| token)
    }

    /// Sign claims and return them as they were encoded, after the claims
    /// updater ran.
    pub fn sign_claims(&self, claims: Claims) -> TokenResult<(String, Claims)> {
        let claims = match &self.claims_updater {
            Some(updater) => updater.update(claims),
            None => claims,
        };

        self.resolver.ensure_configured()?;
        if claims.user.is_some() && claims.aud.len() != 1 {
            return Err(TokenError::AudienceRejected(
                "aud is not of size 1".to_string(),
            ));
        }
        check_audience(&claims, self.audience_reader.as_deref())?;

        let aud = claims.audience().unwrap_or_default();
        let secret = self.resolver.for_signing(aud)?;
        let token = self.encode(&claims, &secret)?;
        Ok((token, claims))
    }

    /// Verify a token and decode its claims.
    ///
    /// Expired tokens are accepted here.
    ///
    /// # Errors
    ///
    /// - [`TokenError::InvalidSignature`] on signature mismatch or a non-HMAC algorithm
    /// - [`TokenError::Malformed`] if the token can't be decoded, is not yet
    ///   valid or was issued in the future
    /// - [`TokenError::AudienceRejected`] if the audience is not allowed
    pub fn verify(&self, token: &str) -> TokenResult<Claims> {
        let secret = self.resolver.for_token(token)?;
        self.verify_with_secret(token, &secret)
    }

    /// Verify a token with the secret of an explicitly chosen audience,
    /// skipping the audience pre-parse.
    pub fn verify_as(&self, token: &str, aud: &str) -> TokenResult<Claims> {
        let secret = self.resolver.for_audience(aud)?;
        self.verify_with_secret(token, &secret)
    }

    fn encode(&self, claims: &Claims, secret: &str) -> TokenResult<String> {
        let mut payload = serde_json::to_value(claims)
            .map_err(|e| TokenError::Internal(format!("Claims serialization failed: {}", e)))?;
        if self.audience_format == AudienceFormat::Array && !claims.aud.is_empty() {
            payload["aud"] = serde_json::json!(claims.aud);
        }

        let header = Header::new(SIGNING_ALGORITHM);
        encode(&header, &payload, &EncodingKey::from_secret(secret.as_bytes()))
            .map_err(|e| TokenError::Internal(format!("Token encoding failed: {}", e)))
    }

    fn verify_with_secret(&self, token: &str, secret: &str) -> TokenResult<Claims> {
        let mut validation = Validation::new(SIGNING_ALGORITHM);
        validation.algorithms = ACCEPTED_ALGORITHMS.to_vec();
        validation.validate_exp = false;
        validation.validate_nbf = true;
        validation.validate_aud = false;
        validation.leeway = 0;
        validation.required_spec_claims = HashSet::new();

        let claims = decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation)
            .map_err(|e| match e.kind() {
                ErrorKind::InvalidSignature => {
                    TokenError::InvalidSignature("Signature mismatch".to_string())
                }
                ErrorKind::InvalidAlgorithm
                | ErrorKind::InvalidAlgorithmName
                | ErrorKind::MissingAlgorithm => {
                    TokenError::InvalidSignature(format!("Unexpected signing method: {}", e))
                }
                ErrorKind::ImmatureSignature => {
                    TokenError::Malformed("Token is not valid yet".to_string())
                }
                ErrorKind::InvalidToken => TokenError::Malformed("Malformed token".to_string()),
                _ => TokenError::Malformed(e.to_string()),
            })?
            .claims;

        if claims.iat.is_some_and(|iat| iat > Utc::now().timestamp()) {
            return Err(TokenError::Malformed("Token used before issued".to_string()));
        }

        check_audience(&claims, self.audience_reader.as_deref())?;
        Ok(claims)
    }
}
