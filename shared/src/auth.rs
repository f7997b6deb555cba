//! Refresh-token to access-token exchange.

use std::fmt;

use serde::Deserialize;
use thiserror::Error;

use crate::{
    api_client::{build_http_client, join_url},
    config::FeedConfig,
};

/// Endpoint that trades a refresh token for a short-lived access token.
pub const ACCESS_TOKEN_PATH: &str = "/integration/v1/createAPIAccessToken/";

/// Short-lived API access token. Never printed in full.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    /// Wrap a raw token value.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Raw token value, for the request header.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(***)")
    }
}

/// Why no access token could be obtained. Always fatal for the run.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The token endpoint could not be reached.
    #[error("failed to call token endpoint: {0}")]
    Transport(#[from] reqwest::Error),
    /// The token endpoint answered with a non-success status.
    #[error("token endpoint returned http {status}: {body}")]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Response body, lossily decoded.
        body: String,
    },
    /// The response carried no usable `api_access_token`.
    #[error("token endpoint response has no api_access_token")]
    MissingToken,
}

#[derive(Debug, Deserialize)]
struct AccessTokenResponse {
    #[serde(default)]
    api_access_token: Option<String>,
}

/// Exchange the configured refresh token for an access token.
pub async fn create_access_token(config: &FeedConfig) -> Result<AccessToken, AuthError> {
    let client = build_http_client(config).build()?;
    let url = join_url(&config.base_url, ACCESS_TOKEN_PATH);
    let user_id = config.user_id.to_string();

    let response = client
        .post(url)
        .form(&[("refresh_token", config.refresh_token.as_str()), ("user_id", user_id.as_str())])
        .send()
        .await?;
    let status = response.status();
    let body = response.bytes().await?;
    if !status.is_success() {
        return Err(AuthError::Rejected {
            status: status.as_u16(),
            body: String::from_utf8_lossy(&body).into_owned(),
        });
    }

    let parsed: AccessTokenResponse =
        serde_json::from_slice(&body).map_err(|_| AuthError::MissingToken)?;
    let token = parsed
        .api_access_token
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .ok_or(AuthError::MissingToken)?;

    tracing::info!("api access token created for user {}", config.user_id);
    Ok(AccessToken::new(token))
}
