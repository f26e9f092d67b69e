use crate::RedactedToken;

/// **VALUE**: Verifies that a token never appears in Debug or Display output.
///
/// **WHY THIS MATTERS**: The auth sub-flow logs `AuthJwt` values and events are
/// printed by hosts. A leaked JWT in a log file is a credential leak.
///
/// **BUG THIS CATCHES**: Would catch someone replacing the manual Debug impl
/// with `#[derive(Debug)]`.
#[test]
fn given_token_when_formatted_then_value_is_redacted() {
    // GIVEN: A token with a recognisable value
    let token = RedactedToken::new("eyJhbGciOiJIUzI1NiJ9.secret");

    // WHEN: Formatting with Debug and Display
    let debug = format!("{token:?}");
    let display = format!("{token}");

    // THEN: Neither contains the secret, Debug still reports the length
    assert!(!debug.contains("secret"));
    assert!(!display.contains("secret"));
    assert!(debug.contains("27 chars"));
}

/// **VALUE**: Verifies that serde serialization is refused.
///
/// **BUG THIS CATCHES**: Would catch a `#[derive(Serialize)]` sneaking in, which
/// would let a token be written into config files or JSON logs.
#[test]
fn given_token_when_serialized_then_returns_error() {
    // GIVEN: A token
    let token = RedactedToken::new("refresh-token");

    // WHEN: Serializing through serde_json
    let result = serde_json::to_string(&token);

    // THEN: Serialization fails with a pointer to expose()
    let err = result.expect_err("serialization must fail");
    assert!(err.to_string().contains("expose()"));
}

#[test]
fn given_two_tokens_when_compared_then_equality_follows_value() {
    assert_eq!(RedactedToken::new("a"), RedactedToken::new("a"));
    assert_ne!(RedactedToken::new("a"), RedactedToken::new("b"));
    assert_eq!(RedactedToken::new("abc").expose(), "abc");
}
