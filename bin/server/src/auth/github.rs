//! GitHub sign-in through OAuth 2.0 and the REST API.
//!
//! GitHub does not issue ID tokens, so after the code exchange the profile
//! is read from `/user` and the address from `/user/emails`.

use async_trait::async_trait;
use crewboard_core::Result;
use crewboard_identity::{AuthPayload, ProviderKind};
use oauth2::basic::BasicClient;
use oauth2::{
    AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, PkceCodeChallenge,
    PkceCodeVerifier, RedirectUrl, RequestTokenError, Scope, TokenResponse, TokenUrl,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::client::{
    AuthProviderClient, AuthorizationState, ProviderError, ProviderSetupError, transport_error,
};
use crate::config::ProviderConfig;

const GITHUB_AUTHORIZE_URL: &str = "https://github.com/login/oauth/authorize";
const GITHUB_TOKEN_URL: &str = "https://github.com/login/oauth/access_token";
const GITHUB_USER_API_URL: &str = "https://api.github.com/user";
const GITHUB_EMAILS_API_URL: &str = "https://api.github.com/user/emails";
const GITHUB_API_VERSION: &str = "2022-11-28";

const DEFAULT_SCOPES: &[&str] = &["user:email"];

/// Profile returned by `GET /user`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitHubUser {
    pub id: i64,
    pub login: String,
    pub name: Option<String>,
    /// Public profile email, if the user set one.
    pub email: Option<String>,
    pub avatar_url: Option<String>,
}

/// One entry from `GET /user/emails`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitHubEmail {
    pub email: String,
    pub primary: bool,
    pub verified: bool,
}

/// Picks the address to report: the primary verified one, then any
/// verified one. The public profile email is used only when the email
/// list came back empty; unverified entries never yield an address.
#[must_use]
pub fn select_email(user: &GitHubUser, emails: &[GitHubEmail]) -> Option<String> {
    if emails.is_empty() {
        return user.email.clone();
    }
    emails
        .iter()
        .find(|e| e.primary && e.verified)
        .or_else(|| emails.iter().find(|e| e.verified))
        .map(|e| e.email.clone())
}

/// Builds the payload handed to reconciliation.
#[must_use]
pub fn payload_for(user: GitHubUser, emails: &[GitHubEmail]) -> AuthPayload {
    let email = select_email(&user, emails);
    let raw_info = json!(user);
    AuthPayload::new(ProviderKind::GitHub.as_str(), user.id.to_string())
        .with_email(email)
        .with_name(user.name)
        .with_image(user.avatar_url)
        .with_extra(Some(json!({ "raw_info": raw_info })))
}

/// GitHub OAuth client.
#[derive(Clone)]
pub struct GitHubClient {
    client_id: ClientId,
    client_secret: ClientSecret,
    auth_url: AuthUrl,
    token_url: TokenUrl,
    redirect_url: RedirectUrl,
    scopes: Vec<String>,
    http_client: reqwest::Client,
}

impl GitHubClient {
    /// Creates a client from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if a URL is invalid or the HTTP client cannot be
    /// built.
    pub fn new(config: &ProviderConfig) -> Result<Self, ProviderSetupError> {
        let invalid = |what: &str, e: oauth2::url::ParseError| ProviderSetupError::Configuration {
            details: format!("invalid {what} URL: {e}"),
        };
        let auth_url = AuthUrl::new(GITHUB_AUTHORIZE_URL.to_string())
            .map_err(|e| invalid("authorization", e))?;
        let token_url =
            TokenUrl::new(GITHUB_TOKEN_URL.to_string()).map_err(|e| invalid("token", e))?;
        let redirect_url =
            RedirectUrl::new(config.redirect_uri.clone()).map_err(|e| invalid("redirect", e))?;

        let http_client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .user_agent(concat!("crewboard/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ProviderSetupError::Configuration {
                details: format!("failed to create HTTP client: {e}"),
            })?;

        Ok(Self {
            client_id: ClientId::new(config.client_id.clone()),
            client_secret: ClientSecret::new(config.client_secret.clone()),
            auth_url,
            token_url,
            redirect_url,
            scopes: config.scopes_or(DEFAULT_SCOPES),
            http_client,
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        access_token: &str,
    ) -> std::result::Result<T, ProviderError> {
        let response = self
            .http_client
            .get(url)
            .header("Accept", "application/vnd.github+json")
            .header("Authorization", format!("Bearer {access_token}"))
            .header("X-GitHub-Api-Version", GITHUB_API_VERSION)
            .send()
            .await
            .map_err(|e| transport_error("GitHubApi", &e))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(ProviderError::invalid_credentials(
                "GitHubApi",
                format!("{url} rejected the access token"),
            ));
        }
        if !status.is_success() {
            return Err(ProviderError::service_unavailable(
                "GitHubApi",
                format!("{url} returned {status}"),
            ));
        }

        response
            .json()
            .await
            .map_err(|e| ProviderError::invalid_credentials("GitHubApi", e.to_string()))
    }
}

#[async_trait]
impl AuthProviderClient for GitHubClient {
    fn kind(&self) -> ProviderKind {
        ProviderKind::GitHub
    }

    fn authorization_url(&self) -> (String, AuthorizationState) {
        let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();

        let client = BasicClient::new(self.client_id.clone())
            .set_auth_uri(self.auth_url.clone())
            .set_redirect_uri(self.redirect_url.clone());

        let mut auth_request = client
            .authorize_url(CsrfToken::new_random)
            .set_pkce_challenge(pkce_challenge);

        for scope in &self.scopes {
            auth_request = auth_request.add_scope(Scope::new(scope.clone()));
        }

        let (auth_url, csrf_token) = auth_request.url();

        let state = AuthorizationState {
            csrf_token: csrf_token.secret().clone(),
            pkce_verifier: pkce_verifier.secret().clone(),
            nonce: None,
        };

        (auth_url.to_string(), state)
    }

    #[tracing::instrument(skip_all, name = "GitHubClient::fetch_payload")]
    async fn fetch_payload(
        &self,
        code: &str,
        state: &AuthorizationState,
    ) -> std::result::Result<AuthPayload, ProviderError> {
        let client = BasicClient::new(self.client_id.clone())
            .set_client_secret(self.client_secret.clone())
            .set_auth_uri(self.auth_url.clone())
            .set_token_uri(self.token_url.clone())
            .set_redirect_uri(self.redirect_url.clone());

        let token_response = client
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .set_pkce_verifier(PkceCodeVerifier::new(state.pkce_verifier.clone()))
            .request_async(&self.http_client)
            .await
            .map_err(|e| match e {
                RequestTokenError::ServerResponse(response) => {
                    ProviderError::invalid_credentials("TokenExchange", response.to_string())
                }
                RequestTokenError::Request(inner) => {
                    ProviderError::service_unavailable("TokenRequest", inner.to_string())
                }
                other => ProviderError::invalid_credentials("TokenExchange", other.to_string()),
            })?;
        let access_token = token_response.access_token().secret();

        let user: GitHubUser = self.get_json(GITHUB_USER_API_URL, access_token).await?;
        let emails: Vec<GitHubEmail> = self.get_json(GITHUB_EMAILS_API_URL, access_token).await?;
        tracing::debug!(github_id = user.id, emails = emails.len(), "fetched GitHub profile");

        Ok(payload_for(user, &emails))
    }
}
