//! OAuth provider integration
//!
//! The provider owns the whole authorization-code exchange. The rest of
//! the crate only sees `authorize_url` and `complete_authorization`,
//! folded into an [`AuthResult`] by [`on_provider_result`].

use axum::async_trait;
use reqwest::header::{ACCEPT, USER_AGENT};
use serde::Deserialize;
use thiserror::Error;
use url::Url;

use super::principal::Principal;
use crate::config::GitHubOAuthConfig;
use crate::error::AppError;

/// Failure modes of a provider exchange
///
/// None of these reach the browser; they are logged and turned into a
/// redirect to the login page.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The user or the provider refused authorization
    #[error("authorization denied: {0}")]
    Denied(String),

    /// Callback query string could not be parsed
    #[error("malformed callback: {0}")]
    MalformedCallback(String),

    /// Callback `state` did not match the one issued
    #[error("state mismatch")]
    StateMismatch,

    /// Callback arrived without an authorization code
    #[error("missing authorization code")]
    MissingCode,

    /// Token endpoint rejected the code
    #[error("token exchange failed: {0}")]
    Exchange(String),

    /// Profile could not be fetched or parsed
    #[error("profile unavailable: {0}")]
    Profile(String),

    /// Transport error talking to the provider
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Raw result of a completed exchange
#[derive(Debug, Clone)]
pub struct ProviderExchange {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub profile: Principal,
}

/// Outcome of a login attempt, consumed once
#[derive(Debug, Clone, PartialEq)]
pub enum AuthResult {
    Success(Principal),
    Failure(String),
}

impl AuthResult {
    /// Fold a provider exchange into an auth result
    pub fn from_exchange(result: Result<ProviderExchange, ProviderError>) -> Self {
        match result {
            Ok(exchange) => on_provider_result(
                &exchange.access_token,
                exchange.refresh_token.as_deref(),
                exchange.profile,
            ),
            Err(error) => AuthResult::Failure(error.to_string()),
        }
    }
}

/// Callback adapter: accept the profile as the principal
///
/// Tokens are received and dropped. They are never stored or used for
/// further API calls.
pub fn on_provider_result(
    _access_token: &str,
    _refresh_token: Option<&str>,
    profile: Principal,
) -> AuthResult {
    AuthResult::Success(profile)
}

/// Capability interface to an external OAuth provider
#[async_trait]
pub trait OAuthProvider: Send + Sync {
    /// Provider name used in logs
    fn name(&self) -> &'static str;

    /// URL the browser is sent to in order to begin authorization
    fn authorize_url(&self, state: &str) -> Url;

    /// Exchange an authorization code for tokens and a profile
    async fn complete_authorization(&self, code: &str)
    -> Result<ProviderExchange, ProviderError>;
}

/// GitHub OAuth app
pub struct GitHubProvider {
    client_id: String,
    client_secret: String,
    callback_url: String,
    scope: String,
    authorize_url: Url,
    token_url: Url,
    user_api_url: Url,
    http: reqwest::Client,
}

/// GitHub token response
///
/// GitHub answers 200 with `error` set when the code is bad.
#[derive(Debug, Deserialize)]
struct GitHubTokenResponse {
    access_token: Option<String>,
    refresh_token: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

impl GitHubProvider {
    /// Create a provider from configuration
    ///
    /// # Errors
    /// Returns `AppError::Config` if any endpoint URL is invalid.
    pub fn new(config: &GitHubOAuthConfig, http: reqwest::Client) -> Result<Self, AppError> {
        let parse = |name: &str, value: &str| {
            Url::parse(value).map_err(|e| AppError::Config(format!("github.{name}: {e}")))
        };

        Ok(Self {
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            callback_url: config.callback_url.clone(),
            scope: config.scope.clone(),
            authorize_url: parse("authorize_url", &config.authorize_url)?,
            token_url: parse("token_url", &config.token_url)?,
            user_api_url: parse("user_api_url", &config.user_api_url)?,
            http,
        })
    }

    async fn exchange_code(&self, code: &str) -> Result<GitHubTokenResponse, ProviderError> {
        let response = self
            .http
            .post(self.token_url.clone())
            .header(ACCEPT, "application/json")
            .form(&[
                ("grant_type", "authorization_code"),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("code", code),
                ("redirect_uri", self.callback_url.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Exchange(format!(
                "token endpoint returned {status}"
            )));
        }

        Ok(response.json().await?)
    }

    async fn fetch_profile(&self, access_token: &str) -> Result<Principal, ProviderError> {
        let response = self
            .http
            .get(self.user_api_url.clone())
            .bearer_auth(access_token)
            .header(ACCEPT, "application/vnd.github+json")
            .header(USER_AGENT, concat!("github-login/", env!("CARGO_PKG_VERSION")))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Profile(format!(
                "user endpoint returned {status}"
            )));
        }

        Principal::from_github_user(response.json().await?)
    }
}

#[async_trait]
impl OAuthProvider for GitHubProvider {
    fn name(&self) -> &'static str {
        "github"
    }

    fn authorize_url(&self, state: &str) -> Url {
        let mut url = self.authorize_url.clone();
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.client_id)
            .append_pair("redirect_uri", &self.callback_url)
            .append_pair("scope", &self.scope)
            .append_pair("state", state);
        url
    }

    async fn complete_authorization(
        &self,
        code: &str,
    ) -> Result<ProviderExchange, ProviderError> {
        let token = self.exchange_code(code).await?;

        if let Some(error) = token.error {
            return Err(ProviderError::Exchange(
                token.error_description.unwrap_or(error),
            ));
        }

        let access_token = token
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ProviderError::Exchange("no access_token in response".to_string()))?;

        let profile = self.fetch_profile(&access_token).await?;

        Ok(ProviderExchange {
            access_token,
            refresh_token: token.refresh_token,
            profile,
        })
    }
}
