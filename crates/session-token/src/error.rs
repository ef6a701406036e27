//! Error types for session token operations
//!
//! Every failure of issuance, transport or verification is reported as a
//! [`TokenError`]. The crate never retries and never falls back to another
//! channel or secret, so each variant is terminal for the current attempt.

use thiserror::Error;

/// Error returned by hooks supplied by the host application.
pub type HookError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Session token error types.
#[derive(Debug, Error)]
pub enum TokenError {
    /// The service is missing a required collaborator or has an unusable setting
    #[error("Configuration error: {0}")]
    Config(String),

    /// The secret reader failed to produce a key
    #[error("Can't get secret: {0}")]
    SecretResolution(String),

    /// The token audience is missing or not in the allow-list
    #[error("Audience rejected: {0}")]
    AudienceRejected(String),

    /// Signature does not match or the signing algorithm is not accepted
    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    /// Token can't be decoded or its structural claims are invalid
    #[error("Malformed token: {0}")]
    Malformed(String),

    /// Cookie-delivered token without a matching XSRF header
    #[error("XSRF mismatch")]
    XsrfMismatch,

    /// Token has expired
    #[error("Token has expired")]
    TokenExpired,

    /// No token in query, header or cookie
    #[error("Token not found")]
    TokenNotFound,

    /// A consumer validator vetoed the token
    #[error("Token rejected: {0}")]
    Rejected(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type for session token operations.
pub type TokenResult<T> = Result<T, TokenError>;

impl TokenError {
    /// Check if this error points at a server-side problem rather than a bad
    /// or missing credential.
    pub fn is_server_error(&self) -> bool {
        matches!(
            self,
            TokenError::Config(_) | TokenError::SecretResolution(_) | TokenError::Internal(_)
        )
    }

    /// Get HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            TokenError::TokenExpired
            | TokenError::TokenNotFound
            | TokenError::InvalidSignature(_)
            | TokenError::Malformed(_)
            | TokenError::AudienceRejected(_) => 401,

            TokenError::XsrfMismatch | TokenError::Rejected(_) => 403,

            TokenError::Config(_) | TokenError::SecretResolution(_) | TokenError::Internal(_) => {
                500
            }
        }
    }

    /// Get error code for API responses.
    pub fn error_code(&self) -> &'static str {
        match self {
            TokenError::Config(_) => "CONFIG_ERROR",
            TokenError::SecretResolution(_) => "SECRET_RESOLUTION_ERROR",
            TokenError::AudienceRejected(_) => "AUDIENCE_REJECTED",
            TokenError::InvalidSignature(_) => "INVALID_SIGNATURE",
            TokenError::Malformed(_) => "MALFORMED_TOKEN",
            TokenError::XsrfMismatch => "XSRF_MISMATCH",
            TokenError::TokenExpired => "TOKEN_EXPIRED",
            TokenError::TokenNotFound => "TOKEN_NOT_FOUND",
            TokenError::Rejected(_) => "TOKEN_REJECTED",
            TokenError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(TokenError::TokenExpired.status_code(), 401);
        assert_eq!(TokenError::TokenNotFound.status_code(), 401);
        assert_eq!(TokenError::XsrfMismatch.status_code(), 403);
        assert_eq!(TokenError::Config("no secret".into()).status_code(), 500);
    }

    #[test]
    fn test_server_errors() {
        assert!(TokenError::SecretResolution("down".into()).is_server_error());
        assert!(!TokenError::InvalidSignature("bad".into()).is_server_error());
        assert!(!TokenError::XsrfMismatch.is_server_error());
    }

    #[test]
    fn test_error_codes_are_distinct() {
        let errors = [
            TokenError::Config(String::new()),
            TokenError::SecretResolution(String::new()),
            TokenError::AudienceRejected(String::new()),
            TokenError::InvalidSignature(String::new()),
            TokenError::Malformed(String::new()),
            TokenError::XsrfMismatch,
            TokenError::TokenExpired,
            TokenError::TokenNotFound,
            TokenError::Rejected(String::new()),
            TokenError::Internal(String::new()),
        ];
        let mut codes: Vec<_> = errors.iter().map(TokenError::error_code).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }
}
