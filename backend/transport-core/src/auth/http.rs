use crate::auth::AuthJwt;
use crate::auth::api::{AuthApi, AuthCodeGrant};
use crate::error::AuthError;

use common::RedactedToken;

use std::time::Duration;

use log::{debug, info};
use reqwest::Client;
use serde::Deserialize;
use url::Url;

const DEFAULT_TIMEOUT_DURATION: Duration = Duration::from_secs(30);
const TOKEN_EXCHANGE_ENDPOINT: &str = "token/oauthcodegrantjwtexchange";
const TOKEN_REFRESH_ENDPOINT: &str = "token/refresh";
const TOKEN_REVOKE_ENDPOINT: &str = "token/revoke";

const OP_FETCH_JWT: &str = "token exchange";
const OP_REFRESH: &str = "token refresh";
const OP_LOGOUT: &str = "logout";

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct JwtExchangeResponse {
    jwt: String,
    #[serde(default)]
    refresh_token: Option<String>,
}

#[derive(Deserialize)]
struct RefreshResponse {
    jwt: String,
}

/// [`AuthApi`] over the web-deployments REST API.
#[derive(Clone)]
pub struct HttpAuthApi {
    base_url: Url,
    deployment_id: String,
    client: Client,
}

impl HttpAuthApi {
    /// `base_url` is the deployments root, e.g. `https://api.<domain>/api/v2/webdeployments/`.
    pub fn new(base_url: Url, deployment_id: impl Into<String>) -> Result<Self, AuthError> {
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT_DURATION)
            .build()
            .map_err(|e| AuthError::from_reqwest("client setup", &e))?;

        Ok(Self {
            base_url,
            deployment_id: deployment_id.into(),
            client,
        })
    }

    async fn check_status(
        operation: &'static str,
        response: reqwest::Response,
    ) -> Result<reqwest::Response, AuthError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(AuthError::from_http_response(
            operation,
            status.as_u16(),
            body,
        ))
    }
}

impl AuthApi for HttpAuthApi {
    async fn fetch_auth_jwt(&self, grant: AuthCodeGrant) -> Result<AuthJwt, AuthError> {
        let url = self.base_url.join(TOKEN_EXCHANGE_ENDPOINT)?;

        let mut oauth = serde_json::json!({
            "code": grant.auth_code.expose(),
            "redirectUri": grant.redirect_uri,
        });
        if let Some(verifier) = &grant.code_verifier {
            oauth["codeVerifier"] = serde_json::Value::from(verifier.expose());
        }
        let body = serde_json::json!({
            "deploymentId": self.deployment_id,
            "oauth": oauth,
        });

        debug!("POST {url} ({OP_FETCH_JWT})");
        let response = self
            .client
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(|e| AuthError::from_reqwest(OP_FETCH_JWT, &e))?;
        let response = Self::check_status(OP_FETCH_JWT, response).await?;

        let exchanged: JwtExchangeResponse = response
            .json()
            .await
            .map_err(|e| AuthError::from_reqwest(OP_FETCH_JWT, &e))?;

        info!("Token exchange succeeded");
        Ok(AuthJwt {
            jwt: RedactedToken::new(exchanged.jwt),
            refresh_token: exchanged.refresh_token.map(RedactedToken::new),
        })
    }

    async fn logout(&self, jwt: RedactedToken) -> Result<(), AuthError> {
        let url = self.base_url.join(TOKEN_REVOKE_ENDPOINT)?;

        debug!("DELETE {url} ({OP_LOGOUT})");
        let response = self
            .client
            .delete(url)
            .bearer_auth(jwt.expose())
            .send()
            .await
            .map_err(|e| AuthError::from_reqwest(OP_LOGOUT, &e))?;
        Self::check_status(OP_LOGOUT, response).await?;

        Ok(())
    }

    async fn refresh_auth_token(
        &self,
        refresh_token: RedactedToken,
    ) -> Result<RedactedToken, AuthError> {
        let url = self.base_url.join(TOKEN_REFRESH_ENDPOINT)?;
        let body = serde_json::json!({ "refreshToken": refresh_token.expose() });

        debug!("POST {url} ({OP_REFRESH})");
        let response = self
            .client
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(|e| AuthError::from_reqwest(OP_REFRESH, &e))?;
        let response = Self::check_status(OP_REFRESH, response).await?;

        let refreshed: RefreshResponse = response
            .json()
            .await
            .map_err(|e| AuthError::from_reqwest(OP_REFRESH, &e))?;

        Ok(RedactedToken::new(refreshed.jwt))
    }
}
