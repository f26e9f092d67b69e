use crate::auth::AuthJwt;
use crate::error::AuthError;

use common::RedactedToken;

use std::future::Future;

/// OAuth authorization-code grant handed to the token exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthCodeGrant {
    pub auth_code: RedactedToken,
    pub redirect_uri: String,
    pub code_verifier: Option<RedactedToken>,
}

/// Request executor behind the auth sub-flow.
pub trait AuthApi: Send + Sync + 'static {
    /// Exchange an authorization code for a JWT pair.
    fn fetch_auth_jwt(
        &self,
        grant: AuthCodeGrant,
    ) -> impl Future<Output = Result<AuthJwt, AuthError>> + Send;

    /// Revoke `jwt` server-side.
    fn logout(&self, jwt: RedactedToken) -> impl Future<Output = Result<(), AuthError>> + Send;

    /// Mint a new JWT from a refresh token.
    fn refresh_auth_token(
        &self,
        refresh_token: RedactedToken,
    ) -> impl Future<Output = Result<RedactedToken, AuthError>> + Send;
}
