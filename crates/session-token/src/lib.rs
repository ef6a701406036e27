//! # Session Token
//!
//! Stateless sessions for the comment service. The signed token is the only
//! session state: nothing is stored server-side.
//!
//! ## Overview
//!
//! The session-token crate handles:
//! - **Claims**: session payload with user profile, handshake and flags
//! - **Signing**: HS256 tokens, verified with HMAC algorithms only
//! - **Secrets**: one shared secret, or one per site (audience)
//! - **Transport**: tokens read from query, header or cookie and written as a
//!   cookie pair or a response header
//! - **XSRF**: double-submit check for cookie-delivered sessions
//!
//! ## Usage
//!
//! ```rust,no_run
//! use session_token::{Claims, SessionService, User};
//! use http::{HeaderMap, Request};
//!
//! let service = SessionService::with_secret("your-secret-key").unwrap();
//!
//! // Issue a session cookie pair
//! let mut headers = HeaderMap::new();
//! let claims = Claims::new()
//!     .with_audience("site1")
//!     .with_user(User::new("github_1234", "Developer"));
//! let claims = service.write_session(&mut headers, claims).unwrap();
//!
//! // Later, read it back from a request
//! let request = Request::get("/api/v1/user")
//!     .header("Cookie", "JWT=...")
//!     .header("X-XSRF-TOKEN", claims.id())
//!     .body(())
//!     .unwrap();
//! let (claims, _token) = service.read_session(&request).unwrap();
//! ```
//!
//! ### Per-site secrets
//!
//! ```rust,no_run
//! use session_token::{AudienceSecrets, SessionConfig, SessionService};
//!
//! let config = SessionConfig::default()
//!     .with_secret_reader(
//!         AudienceSecrets::new()
//!             .with("site1", "secret-one")
//!             .with("site2", "secret-two"),
//!     )
//!     .with_aud_secrets(true);
//! let service = SessionService::new(config).unwrap();
//! ```
//!
//! ## Expiry
//!
//! [`SessionService::verify`] never rejects an expired token. When reading a
//! session, tokens from the cookie must be unexpired, while tokens from the
//! header or query parameter are returned even if expired.

pub mod claims;
pub mod config;
pub mod error;
pub mod hooks;
pub mod jwt;
pub mod secret;
pub mod session;
pub mod transport;
pub mod xsrf;

// Re-export main types
pub use claims::{AuthProvider, Claims, Handshake, User};
pub use config::SessionConfig;
pub use error::{HookError, TokenError, TokenResult};
pub use hooks::{
    AudienceReader, AudienceSecrets, ClaimsUpdater, SecretReader, StaticAudiences, StaticSecret,
    Validator,
};
pub use jwt::{AudienceFormat, TokenCodec};
pub use secret::{AudienceSecretResolver, SecretMode, UntrustedAudience};
pub use session::SessionService;
pub use transport::{DeliveredToken, TokenSource, Transport};
pub use xsrf::XsrfGuard;
