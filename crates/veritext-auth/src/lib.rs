#![warn(missing_docs)]
//! # veritext-auth
//!
//! ## Purpose
//! Implements authentication primitives and session lifecycle handling for
//! `veritext`.
//!
//! ## Responsibilities
//! - Validate service endpoint policy (HTTPS outside loopback, `/api/login`).
//! - Execute login requests through an injectable async transport.
//! - Model safe session transitions used to gate authenticated API calls.
//!
//! ## Data flow
//! CLI collects an account email -> [`AuthClient::login`] sends the request
//! through [`AuthTransport`] -> receives [`SessionToken`] ->
//! [`AuthStateMachine`] updates runtime state.
//!
//! ## Ownership and lifetimes
//! Token/session values are owned (`String`) to decouple transport and
//! runtime state machine lifetimes.
//!
//! ## Error model
//! Endpoint policy violations and transport failures are surfaced as
//! [`AuthError`], allowing callers to either prompt re-login or block
//! uploads.
//!
//! ## Security and privacy notes
//! This crate does not log emails or token values. The login response
//! carries no expiry field, so the client applies a configured TTL and
//! treats the token as stale afterwards.
//!
//! ## Example
//! ```rust
//! use veritext_auth::{AuthStateMachine, AuthState};
//!
//! let machine = AuthStateMachine::new();
//! assert!(matches!(machine.state(), AuthState::Unauthenticated));
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// Required login path suffix.
pub const REQUIRED_LOGIN_PATH: &str = "/api/login";

/// Client-side session lifetime applied to fresh tokens, in seconds.
///
/// Matches the service's default access-token TTL; the login response does
/// not echo it.
pub const DEFAULT_SESSION_TTL_SECONDS: u64 = 30 * 60;

/// User-provided account identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Registered account email.
    pub email: String,
}

/// Login request payload forwarded to the auth transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginRequest {
    /// Account email for lookup.
    pub email: String,
}

/// Account profile echoed by the login endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    /// Server-side account identifier.
    pub id: String,
    /// Display name, when the account has one.
    #[serde(default)]
    pub name: Option<String>,
    /// Registered email.
    pub email: String,
    /// Project names owned by the account.
    #[serde(default)]
    pub projects: Vec<String>,
}

/// Login response payload returned by the auth transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginResponse {
    /// Bearer token for protected API calls.
    pub token: String,
    /// Authenticated account profile.
    pub user: UserProfile,
}

/// Session token with absolute client-side expiry timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionToken {
    /// Bearer token used by downstream APIs.
    pub access_token: String,
    /// Account identifier propagated into logs-safe status lines.
    pub user_id: String,
    /// Absolute epoch milliseconds when the client stops trusting the token.
    pub expires_at_ms: u64,
}

impl SessionToken {
    /// Returns `true` when the token has expired at `now_ms`.
    pub fn is_expired(&self, now_ms: u64) -> bool {
        now_ms >= self.expires_at_ms
    }
}

/// Runtime authentication state used by upload gate logic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState {
    /// No valid session exists.
    Unauthenticated,
    /// Session is currently valid.
    Authenticated(SessionToken),
    /// Session expired; re-login is required.
    ReauthRequired,
}

/// Auth state machine with explicit legal transitions.
#[derive(Debug, Clone)]
pub struct AuthStateMachine {
    state: AuthState,
}

impl AuthStateMachine {
    /// Creates a new state machine in `Unauthenticated` state.
    pub fn new() -> Self {
        Self {
            state: AuthState::Unauthenticated,
        }
    }

    /// Returns current auth state snapshot.
    pub fn state(&self) -> &AuthState {
        &self.state
    }

    /// Applies login success transition.
    pub fn on_login_success(&mut self, token: SessionToken) {
        self.state = AuthState::Authenticated(token);
    }

    /// Re-evaluates state based on token expiry.
    pub fn on_tick(&mut self, now_ms: u64) {
        if let AuthState::Authenticated(token) = &self.state
            && token.is_expired(now_ms)
        {
            self.state = AuthState::ReauthRequired;
        }
    }

    /// Explicit logout transition.
    pub fn logout(&mut self) {
        self.state = AuthState::Unauthenticated;
    }

    /// Returns `true` when authenticated API calls are allowed.
    pub fn can_authorize(&self, now_ms: u64) -> bool {
        matches!(
            &self.state,
            AuthState::Authenticated(token) if !token.is_expired(now_ms)
        )
    }

    /// Returns the current bearer token when one is valid.
    pub fn bearer_token(&self, now_ms: u64) -> Option<&str> {
        match &self.state {
            AuthState::Authenticated(token) if !token.is_expired(now_ms) => {
                Some(token.access_token.as_str())
            }
            _ => None,
        }
    }
}

impl Default for AuthStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

/// Abstract transport used by the auth client.
#[async_trait]
pub trait AuthTransport: Send + Sync {
    /// Sends one login request to the auth backend.
    async fn login(
        &self,
        endpoint: &str,
        request: &LoginRequest,
    ) -> Result<LoginResponse, AuthError>;
}

/// HTTP transport implementation backed by `reqwest`.
#[derive(Debug, Clone, Default)]
pub struct HttpAuthTransport {
    http: reqwest::Client,
}

impl HttpAuthTransport {
    /// Creates a transport over a fresh HTTP client.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AuthTransport for HttpAuthTransport {
    async fn login(
        &self,
        endpoint: &str,
        request: &LoginRequest,
    ) -> Result<LoginResponse, AuthError> {
        let response = self
            .http
            .post(endpoint)
            .json(request)
            .send()
            .await
            .map_err(|error| AuthError::Transport(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AuthError::Denied {
                status: status.as_u16(),
            });
        }

        response
            .json::<LoginResponse>()
            .await
            .map_err(|error| AuthError::InvalidResponse(error.to_string()))
    }
}

/// Auth client that validates endpoint policy and executes the login flow.
#[derive(Clone)]
pub struct AuthClient {
    endpoint: String,
    session_ttl_seconds: u64,
    transport: Arc<dyn AuthTransport>,
}

impl AuthClient {
    /// Creates a validated auth client.
    ///
    /// # Errors
    /// Returns [`AuthError::InvalidEndpoint`] when the URL is not HTTPS on a
    /// non-loopback host or does not end with `/api/login`.
    pub fn new(
        endpoint: impl Into<String>,
        transport: Arc<dyn AuthTransport>,
    ) -> Result<Self, AuthError> {
        let endpoint = endpoint.into();
        validate_login_endpoint(&endpoint)?;
        Ok(Self {
            endpoint,
            session_ttl_seconds: DEFAULT_SESSION_TTL_SECONDS,
            transport,
        })
    }

    /// Overrides the client-side session TTL.
    pub fn with_session_ttl_seconds(mut self, ttl_seconds: u64) -> Self {
        self.session_ttl_seconds = ttl_seconds;
        self
    }

    /// Executes login and converts the server response into a session token.
    ///
    /// # Errors
    /// Returns [`AuthError::EmptyCredential`] for a blank email and
    /// propagates transport errors as-is for caller retry/prompt behavior.
    pub async fn login(
        &self,
        credentials: &Credentials,
        now_ms: u64,
    ) -> Result<SessionToken, AuthError> {
        let email = credentials.email.trim();
        if email.is_empty() {
            return Err(AuthError::EmptyCredential);
        }
        if !email.contains('@') {
            return Err(AuthError::InvalidEmail);
        }

        let response = self
            .transport
            .login(
                &self.endpoint,
                &LoginRequest {
                    email: email.to_string(),
                },
            )
            .await?;

        if response.token.trim().is_empty() || response.user.id.trim().is_empty() {
            return Err(AuthError::InvalidResponse(
                "response missing token or user id".to_string(),
            ));
        }

        let expires_at_ms =
            now_ms.saturating_add(self.session_ttl_seconds.saturating_mul(1000));

        Ok(SessionToken {
            access_token: response.token,
            user_id: response.user.id,
            expires_at_ms,
        })
    }

    /// Returns the configured login endpoint.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

/// Returns `true` when `url` points at a loopback host.
pub fn is_loopback_host(url: &Url) -> bool {
    matches!(url.host_str(), Some("localhost" | "127.0.0.1" | "::1"))
}

/// Validates transport security policy for any service endpoint.
///
/// HTTPS/WSS is required except for loopback hosts, which keeps local
/// development deployments reachable without weakening remote transport.
///
/// # Errors
/// Returns [`AuthError::InvalidEndpoint`] for plaintext schemes on
/// non-loopback hosts or unparseable URLs.
pub fn validate_endpoint_security(endpoint: &str) -> Result<Url, AuthError> {
    let parsed = Url::parse(endpoint)
        .map_err(|error| AuthError::InvalidEndpoint(format!("invalid url: {error}")))?;

    let secure = matches!(parsed.scheme(), "https" | "wss");
    if !secure && !is_loopback_host(&parsed) {
        return Err(AuthError::InvalidEndpoint(
            "plaintext transport is only allowed for loopback hosts".to_string(),
        ));
    }

    Ok(parsed)
}

/// Validates login endpoint constraints.
///
/// # Errors
/// Returns [`AuthError::InvalidEndpoint`] on security policy violations or
/// path mismatch.
pub fn validate_login_endpoint(endpoint: &str) -> Result<(), AuthError> {
    let parsed = validate_endpoint_security(endpoint)?;

    if !parsed.path().ends_with(REQUIRED_LOGIN_PATH) {
        return Err(AuthError::InvalidEndpoint(format!(
            "login endpoint path must end with {REQUIRED_LOGIN_PATH}"
        )));
    }

    Ok(())
}

/// Errors produced by auth client/state logic.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Endpoint violates security or contract requirements.
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),
    /// Email is missing/blank.
    #[error("account email must be non-empty")]
    EmptyCredential,
    /// Email is not a plausible address.
    #[error("account email is not a valid address")]
    InvalidEmail,
    /// Transport failure from the auth backend.
    #[error("auth transport failure: {0}")]
    Transport(String),
    /// Backend rejected the login.
    #[error("login rejected with status {status}")]
    Denied {
        /// HTTP status code returned by the backend.
        status: u16,
    },
    /// Response payload violated auth contract expectations.
    #[error("invalid auth response: {0}")]
    InvalidResponse(String),
}
