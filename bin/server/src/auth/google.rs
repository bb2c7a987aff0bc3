//! Google sign-in through OpenID Connect.

use async_trait::async_trait;
use crewboard_core::Result;
use crewboard_identity::{AuthPayload, ProviderKind};
use openidconnect::core::{CoreAuthenticationFlow, CoreClient, CoreProviderMetadata};
use openidconnect::{
    AuthorizationCode, ClientId, ClientSecret, CsrfToken, IssuerUrl, Nonce, PkceCodeChallenge,
    PkceCodeVerifier, RedirectUrl, RequestTokenError, Scope, TokenResponse,
};
use serde_json::json;

use super::client::{AuthProviderClient, AuthorizationState, ProviderError, ProviderSetupError};
use crate::config::ProviderConfig;

/// Google's OpenID Connect issuer.
const GOOGLE_ISSUER: &str = "https://accounts.google.com";

const DEFAULT_SCOPES: &[&str] = &["email", "profile"];

/// Claims taken from a verified Google ID token.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GoogleIdentity {
    pub subject: String,
    pub email: Option<String>,
    pub email_verified: Option<bool>,
    pub name: Option<String>,
    pub picture: Option<String>,
}

impl GoogleIdentity {
    /// Builds the payload handed to reconciliation.
    ///
    /// The verification flag lands under `extra.raw_info` so the
    /// confirmation tracker can decide whether to trust the email.
    #[must_use]
    pub fn into_payload(self) -> AuthPayload {
        let raw_info = json!({
            "sub": self.subject,
            "email": self.email,
            "email_verified": self.email_verified,
            "name": self.name,
            "picture": self.picture,
        });
        AuthPayload::new(ProviderKind::Google.as_str(), self.subject)
            .with_email(self.email)
            .with_name(self.name)
            .with_image(self.picture)
            .with_extra(Some(json!({ "raw_info": raw_info })))
    }
}

/// Google OpenID Connect client.
pub struct GoogleClient {
    provider_metadata: CoreProviderMetadata,
    client_id: ClientId,
    client_secret: ClientSecret,
    redirect_url: RedirectUrl,
    scopes: Vec<String>,
    http_client: reqwest::Client,
}

impl GoogleClient {
    /// Creates a client by discovering the provider metadata.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or discovery fails.
    pub async fn discover(config: &ProviderConfig) -> Result<Self, ProviderSetupError> {
        let issuer = config.issuer_url.as_deref().unwrap_or(GOOGLE_ISSUER);
        let issuer_url =
            IssuerUrl::new(issuer.to_string()).map_err(|e| ProviderSetupError::Configuration {
                details: format!("invalid issuer URL: {e}"),
            })?;

        let http_client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| ProviderSetupError::Configuration {
                details: format!("failed to create HTTP client: {e}"),
            })?;

        let provider_metadata = CoreProviderMetadata::discover_async(issuer_url, &http_client)
            .await
            .map_err(|e| ProviderSetupError::Discovery {
                details: format!("failed to discover {issuer}: {e}"),
            })?;

        let redirect_url = RedirectUrl::new(config.redirect_uri.clone()).map_err(|e| {
            ProviderSetupError::Configuration {
                details: format!("invalid redirect URI: {e}"),
            }
        })?;

        Ok(Self {
            provider_metadata,
            client_id: ClientId::new(config.client_id.clone()),
            client_secret: ClientSecret::new(config.client_secret.clone()),
            redirect_url,
            scopes: config.scopes_or(DEFAULT_SCOPES),
            http_client,
        })
    }
}

#[async_trait]
impl AuthProviderClient for GoogleClient {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Google
    }

    fn authorization_url(&self) -> (String, AuthorizationState) {
        let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();

        let client = CoreClient::from_provider_metadata(
            self.provider_metadata.clone(),
            self.client_id.clone(),
            Some(self.client_secret.clone()),
        )
        .set_redirect_uri(self.redirect_url.clone());

        let mut auth_request = client
            .authorize_url(
                CoreAuthenticationFlow::AuthorizationCode,
                CsrfToken::new_random,
                Nonce::new_random,
            )
            .set_pkce_challenge(pkce_challenge);

        for scope in &self.scopes {
            auth_request = auth_request.add_scope(Scope::new(scope.clone()));
        }

        let (auth_url, csrf_token, nonce) = auth_request.url();

        let state = AuthorizationState {
            csrf_token: csrf_token.secret().clone(),
            pkce_verifier: pkce_verifier.secret().clone(),
            nonce: Some(nonce.secret().clone()),
        };

        (auth_url.to_string(), state)
    }

    #[tracing::instrument(skip_all, name = "GoogleClient::fetch_payload")]
    async fn fetch_payload(
        &self,
        code: &str,
        state: &AuthorizationState,
    ) -> std::result::Result<AuthPayload, ProviderError> {
        let client = CoreClient::from_provider_metadata(
            self.provider_metadata.clone(),
            self.client_id.clone(),
            Some(self.client_secret.clone()),
        )
        .set_redirect_uri(self.redirect_url.clone());

        let token_response = client
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .map_err(|e| ProviderError::service_unavailable("ConfigurationError", e.to_string()))?
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

        let id_token = token_response.id_token().ok_or_else(|| {
            ProviderError::invalid_credentials("TokenValidation", "no ID token in response")
        })?;

        let nonce = Nonce::new(state.nonce.clone().unwrap_or_default());
        let claims = id_token
            .claims(&client.id_token_verifier(), &nonce)
            .map_err(|e| ProviderError::invalid_credentials("TokenValidation", e.to_string()))?;

        let identity = GoogleIdentity {
            subject: claims.subject().to_string(),
            email: claims.email().map(|e| e.as_str().to_string()),
            email_verified: claims.email_verified(),
            name: claims
                .name()
                .and_then(|n| n.get(None))
                .map(|n| n.as_str().to_string()),
            picture: claims
                .picture()
                .and_then(|p| p.get(None))
                .map(|p| p.as_str().to_string()),
        };
        tracing::debug!(subject = %identity.subject, "verified Google ID token");

        Ok(identity.into_payload())
    }
}
