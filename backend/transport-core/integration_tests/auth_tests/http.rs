use transport_core::DEPLOYMENTS_API_PATH;
use transport_core::auth::{AuthApi, AuthCodeGrant, AuthJwt, HttpAuthApi};
use transport_core::error::AuthError;

use common::RedactedToken;

use serde_json::json;
use tokio::net::TcpListener;
use url::Url;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const DEPLOYMENT_ID: &str = "dep-1";

fn api_for(server: &MockServer) -> HttpAuthApi {
    let base = Url::parse(&format!("{}{DEPLOYMENTS_API_PATH}", server.uri())).unwrap();
    HttpAuthApi::new(base, DEPLOYMENT_ID).unwrap()
}

fn endpoint(name: &str) -> String {
    format!("{DEPLOYMENTS_API_PATH}{name}")
}

fn grant(code_verifier: Option<&str>) -> AuthCodeGrant {
    AuthCodeGrant {
        auth_code: RedactedToken::new("auth-code"),
        redirect_uri: "https://example.test/callback".to_string(),
        code_verifier: code_verifier.map(RedactedToken::new),
    }
}

/// **VALUE**: Verifies the token exchange request shape and response mapping.
///
/// **WHY THIS MATTERS**: The exchange is the only way into an authenticated
/// session. A wrong path or body key means every sign-in fails with a 400.
///
/// **BUG THIS CATCHES**: Would catch if:
/// - The endpoint is joined onto the base URL incorrectly
/// - `deploymentId` or the `oauth` keys are misspelled
/// - The refresh token is dropped from the response
#[tokio::test]
async fn given_valid_code_when_exchanged_then_returns_jwt_pair() {
    // GIVEN: A server expecting the exact exchange body
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(endpoint("token/oauthcodegrantjwtexchange")))
        .and(body_json(json!({
            "deploymentId": DEPLOYMENT_ID,
            "oauth": {
                "code": "auth-code",
                "redirectUri": "https://example.test/callback",
            },
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jwt": "jwt-value",
            "refreshToken": "refresh-value",
        })))
        .expect(1)
        .mount(&server)
        .await;

    // WHEN: Exchanging the code
    let result = api_for(&server).fetch_auth_jwt(grant(None)).await;

    // THEN: Both tokens come back
    assert_eq!(
        result.unwrap(),
        AuthJwt::new("jwt-value", Some("refresh-value".to_string()))
    );
}

#[tokio::test]
async fn given_pkce_verifier_when_exchanged_then_verifier_is_sent() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(endpoint("token/oauthcodegrantjwtexchange")))
        .and(body_json(json!({
            "deploymentId": DEPLOYMENT_ID,
            "oauth": {
                "code": "auth-code",
                "redirectUri": "https://example.test/callback",
                "codeVerifier": "verifier",
            },
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"jwt": "jwt-value"})))
        .expect(1)
        .mount(&server)
        .await;

    let jwt = api_for(&server)
        .fetch_auth_jwt(grant(Some("verifier")))
        .await
        .unwrap();

    assert_eq!(jwt, AuthJwt::new("jwt-value", None));
    assert!(!jwt.can_refresh());
}

/// **VALUE**: A rejected exchange keeps its HTTP status.
///
/// **BUG THIS CATCHES**: Would catch non-2xx responses being parsed as JSON
/// and reported as decode errors, hiding the real status from logs.
#[tokio::test]
async fn given_rejected_code_when_exchanged_then_response_error_with_status() {
    // GIVEN: A server rejecting the code
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(endpoint("token/oauthcodegrantjwtexchange")))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid_grant"))
        .mount(&server)
        .await;

    // WHEN: Exchanging
    let error = api_for(&server)
        .fetch_auth_jwt(grant(None))
        .await
        .unwrap_err();

    // THEN: Response error carrying 401 and the body
    assert_eq!(error.status_code(), Some(401));
    assert_eq!(error.error_category(), "client_error");
    assert!(error.to_string().contains("invalid_grant"));
}

#[tokio::test]
async fn given_malformed_body_when_exchanged_then_decode_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(endpoint("token/oauthcodegrantjwtexchange")))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let error = api_for(&server)
        .fetch_auth_jwt(grant(None))
        .await
        .unwrap_err();

    assert!(matches!(error, AuthError::Decode { .. }), "got {error:?}");
}

#[tokio::test]
async fn given_refresh_token_when_refreshed_then_returns_new_jwt() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(endpoint("token/refresh")))
        .and(body_json(json!({"refreshToken": "refresh-value"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"jwt": "new-jwt"})))
        .expect(1)
        .mount(&server)
        .await;

    let jwt = api_for(&server)
        .refresh_auth_token(RedactedToken::new("refresh-value"))
        .await
        .unwrap();

    assert_eq!(jwt.expose(), "new-jwt");
}

#[tokio::test]
async fn given_jwt_when_logged_out_then_revoke_sent_with_bearer_token() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path(endpoint("token/revoke")))
        .and(header("authorization", "Bearer jwt-value"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let result = api_for(&server)
        .logout(RedactedToken::new("jwt-value"))
        .await;

    assert!(result.is_ok(), "got {result:?}");
}

/// **VALUE**: An unreachable auth server is a network error, not a response.
#[tokio::test]
async fn given_unreachable_server_when_refreshed_then_connection_error() {
    // GIVEN: A port nothing listens on
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    let base = Url::parse(&format!("http://127.0.0.1:{port}{DEPLOYMENTS_API_PATH}")).unwrap();
    let api = HttpAuthApi::new(base, DEPLOYMENT_ID).unwrap();

    // WHEN: Refreshing
    let error = api
        .refresh_auth_token(RedactedToken::new("refresh-value"))
        .await
        .unwrap_err();

    // THEN: Connection category, no status
    assert_eq!(error.error_category(), "connection");
    assert_eq!(error.status_code(), None);
}
