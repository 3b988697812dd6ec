//! Integration tests for the auth session lifecycle.

use std::sync::Arc;

use async_trait::async_trait;
use veritext_auth::{
    AuthClient, AuthError, AuthState, AuthStateMachine, AuthTransport, Credentials, LoginRequest,
    LoginResponse, UserProfile,
};

#[derive(Debug, Default)]
struct MockAuthTransport;

#[async_trait]
impl AuthTransport for MockAuthTransport {
    async fn login(
        &self,
        _endpoint: &str,
        request: &LoginRequest,
    ) -> Result<LoginResponse, AuthError> {
        if request.email.starts_with("denied") {
            return Err(AuthError::Denied { status: 404 });
        }

        Ok(LoginResponse {
            token: format!("jwt-for-{}", request.email),
            user: UserProfile {
                id: "user-7".to_string(),
                name: Some("Test Account".to_string()),
                email: request.email.clone(),
                projects: vec!["thesis".to_string()],
            },
        })
    }
}

fn client() -> AuthClient {
    AuthClient::new(
        "http://localhost:5000/api/login",
        Arc::new(MockAuthTransport),
    )
    .expect("auth client should build")
    .with_session_ttl_seconds(60)
}

#[tokio::test]
async fn auth_state_machine_tests_login_yields_gated_session() {
    let token = client()
        .login(
            &Credentials {
                email: "student@example.test".to_string(),
            },
            1_000,
        )
        .await
        .expect("login should succeed");

    assert_eq!(token.expires_at_ms, 61_000);

    let mut machine = AuthStateMachine::new();
    assert!(!machine.can_authorize(1_000));

    machine.on_login_success(token);
    assert!(machine.can_authorize(60_999));
    assert!(!machine.can_authorize(61_000));

    machine.on_tick(61_000);
    assert!(matches!(machine.state(), AuthState::ReauthRequired));
}

#[tokio::test]
async fn auth_state_machine_tests_rejected_login_leaves_machine_unauthenticated() {
    let error = client()
        .login(
            &Credentials {
                email: "denied@example.test".to_string(),
            },
            0,
        )
        .await
        .expect_err("denied login must fail");
    assert!(matches!(error, AuthError::Denied { status: 404 }));

    let machine = AuthStateMachine::new();
    assert!(matches!(machine.state(), AuthState::Unauthenticated));
}

#[tokio::test]
async fn auth_state_machine_tests_blank_and_malformed_emails_never_reach_transport() {
    let client = client();

    assert!(matches!(
        client.login(&Credentials { email: "  ".to_string() }, 0).await,
        Err(AuthError::EmptyCredential)
    ));
    assert!(matches!(
        client
            .login(
                &Credentials {
                    email: "not-an-address".to_string(),
                },
                0,
            )
            .await,
        Err(AuthError::InvalidEmail)
    ));
}

#[test]
fn auth_state_machine_tests_logout_is_explicit() {
    let mut machine = AuthStateMachine::new();
    machine.on_login_success(veritext_auth::SessionToken {
        access_token: "jwt".to_string(),
        user_id: "user-7".to_string(),
        expires_at_ms: u64::MAX,
    });

    machine.logout();
    assert!(matches!(machine.state(), AuthState::Unauthenticated));
}
