//! Turns a completed identity-provider callback into a sign-in decision.
//!
//! A callback moves from received, through reconciliation, to exactly one
//! terminal [`CallbackOutcome`]. The handler never fails: every branch ends
//! in a location to redirect to and a message for the user.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::account::Account;
use crate::confirmation::ConfirmationTracker;
use crate::credential::CredentialVerifier;
use crate::messages::{self, MessageCatalog, humanize};
use crate::payload::AuthPayload;
use crate::provider::ProviderKind;
use crate::reconcile::{IdentityReconciler, Reconciliation};
use crate::session::{Session, SessionIssuer};
use crate::store::AccountStore;

/// Where the handler sends the user after each outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CallbackRoutes {
    /// Destination after a successful sign-in.
    pub after_sign_in: String,
    /// Registration start and completion page.
    pub registration: String,
    /// Application home.
    pub home: String,
}

impl Default for CallbackRoutes {
    fn default() -> Self {
        Self {
            after_sign_in: "/".to_string(),
            registration: "/users/sign_up".to_string(),
            home: "/".to_string(),
        }
    }
}

/// One-shot message shown on the page after a redirect.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flash {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notice: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alert: Option<String>,
}

impl Flash {
    #[must_use]
    pub fn notice(message: impl Into<String>) -> Self {
        Self {
            notice: Some(message.into()),
            alert: None,
        }
    }

    #[must_use]
    pub fn alert(message: impl Into<String>) -> Self {
        Self {
            notice: None,
            alert: Some(message.into()),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.notice.is_none() && self.alert.is_none()
    }
}

/// Terminal state of a callback.
#[derive(Debug, Clone)]
pub enum CallbackOutcome {
    /// A session was issued for the account.
    Authenticated {
        account: Account,
        session: Session,
        location: String,
        notice: String,
    },
    /// The user must finish registration by hand. `pending` is the payload
    /// without provider metadata, to be held until the registration step.
    NeedsRegistration {
        pending: AuthPayload,
        location: String,
        alert: String,
    },
    /// Sign-in was refused.
    Rejected { location: String, alert: String },
}

impl CallbackOutcome {
    /// Where to redirect.
    #[must_use]
    pub fn location(&self) -> &str {
        match self {
            Self::Authenticated { location, .. }
            | Self::NeedsRegistration { location, .. }
            | Self::Rejected { location, .. } => location,
        }
    }

    /// The message to show after the redirect.
    #[must_use]
    pub fn flash(&self) -> Flash {
        match self {
            Self::Authenticated { notice, .. } => Flash::notice(notice.clone()),
            Self::NeedsRegistration { alert, .. } | Self::Rejected { alert, .. } => {
                Flash::alert(alert.clone())
            }
        }
    }
}

/// Exception reported alongside a provider failure, kept for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderException {
    pub class: String,
    pub message: String,
}

/// A failure reported by the provider or by the exchange with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderFailure {
    /// Machine token such as `access_denied` or `invalid_credentials`.
    pub error_type: String,
    /// Name of the provider strategy that failed, if known.
    pub strategy: Option<String>,
    pub exception: Option<ProviderException>,
}

impl ProviderFailure {
    #[must_use]
    pub fn new(error_type: impl Into<String>) -> Self {
        Self {
            error_type: error_type.into(),
            strategy: None,
            exception: None,
        }
    }

    #[must_use]
    pub fn with_strategy(mut self, strategy: impl Into<String>) -> Self {
        self.strategy = Some(strategy.into());
        self
    }

    #[must_use]
    pub fn with_exception(mut self, class: impl Into<String>, message: impl Into<String>) -> Self {
        self.exception = Some(ProviderException {
            class: class.into(),
            message: message.into(),
        });
        self
    }

    /// Provider name for user-facing text.
    fn kind(&self) -> String {
        match self.strategy.as_deref() {
            Some(strategy) => match strategy.parse::<ProviderKind>() {
                Ok(kind) => kind.display_name().to_string(),
                Err(_) => humanize(strategy),
            },
            None => "the provider".to_string(),
        }
    }
}

/// Drives reconciliation and sign-in for provider callbacks.
#[derive(Clone)]
pub struct CallbackHandler {
    reconciler: IdentityReconciler,
    accounts: Arc<dyn AccountStore>,
    sessions: Arc<dyn SessionIssuer>,
    confirmation: Arc<dyn ConfirmationTracker>,
    messages: MessageCatalog,
    routes: CallbackRoutes,
}

impl CallbackHandler {
    #[must_use]
    pub fn new(
        accounts: Arc<dyn AccountStore>,
        credentials: Arc<dyn CredentialVerifier>,
        confirmation: Arc<dyn ConfirmationTracker>,
        sessions: Arc<dyn SessionIssuer>,
    ) -> Self {
        Self {
            reconciler: IdentityReconciler::new(
                accounts.clone(),
                credentials,
                confirmation.clone(),
            ),
            accounts,
            sessions,
            confirmation,
            messages: MessageCatalog::default(),
            routes: CallbackRoutes::default(),
        }
    }

    #[must_use]
    pub fn with_messages(mut self, messages: MessageCatalog) -> Self {
        self.messages = messages;
        self
    }

    #[must_use]
    pub fn with_routes(mut self, routes: CallbackRoutes) -> Self {
        self.routes = routes;
        self
    }

    #[must_use]
    pub fn routes(&self) -> &CallbackRoutes {
        &self.routes
    }

    #[must_use]
    pub fn messages(&self) -> &MessageCatalog {
        &self.messages
    }

    /// Handles a callback that carried a payload.
    #[tracing::instrument(skip_all, fields(provider = %kind))]
    pub async fn handle_success(
        &self,
        kind: ProviderKind,
        payload: Option<&AuthPayload>,
        client_ip: Option<String>,
    ) -> CallbackOutcome {
        match self.reconciler.reconcile(payload).await {
            Reconciliation::Existing(account) | Reconciliation::Created(account) => {
                self.sign_in(kind, account, client_ip).await
            }
            Reconciliation::Unpersisted { errors, .. } => {
                tracing::info!(errors = errors.len(), "account needs manual registration");
                CallbackOutcome::NeedsRegistration {
                    pending: payload.map(AuthPayload::without_extra).unwrap_or_default(),
                    location: self.routes.registration.clone(),
                    alert: errors.join("\n"),
                }
            }
            Reconciliation::Invalid(reason) => {
                tracing::info!(%reason, "provider payload rejected");
                CallbackOutcome::Rejected {
                    location: self.routes.registration.clone(),
                    alert: self
                        .messages
                        .translate(messages::OAUTH_INVALID_CREDENTIALS, &[]),
                }
            }
        }
    }

    /// Handles a callback that reported a failure instead of a payload.
    pub fn handle_failure(&self, failure: &ProviderFailure) -> CallbackOutcome {
        if let Some(exception) = &failure.exception {
            tracing::error!(
                error_type = %failure.error_type,
                class = %exception.class,
                message = %exception.message,
                "identity provider failure"
            );
        } else {
            tracing::warn!(error_type = %failure.error_type, "identity provider failure");
        }

        let reason = self.messages.failure_reason(&failure.error_type);
        let kind = failure.kind();
        CallbackOutcome::Rejected {
            location: self.routes.home.clone(),
            alert: self.messages.translate(
                messages::OAUTH_FAILURE,
                &[("kind", &kind), ("reason", &reason)],
            ),
        }
    }

    async fn sign_in(
        &self,
        kind: ProviderKind,
        account: Account,
        client_ip: Option<String>,
    ) -> CallbackOutcome {
        let now = Utc::now();
        if !self.confirmation.may_sign_in(&account, now) {
            tracing::info!(account_id = %account.id(), "unconfirmed account refused sign-in");
            return CallbackOutcome::Rejected {
                location: self.routes.home.clone(),
                alert: self.messages.translate(messages::UNCONFIRMED, &[]),
            };
        }

        let session = match self.sessions.issue(&account, Some(kind)).await {
            Ok(session) => session,
            Err(e) => {
                tracing::error!(account_id = %account.id(), error = %e, "failed to issue session");
                return CallbackOutcome::Rejected {
                    location: self.routes.home.clone(),
                    alert: self.messages.translate(messages::SIGN_IN_UNAVAILABLE, &[]),
                };
            }
        };

        if let Err(e) = self
            .accounts
            .record_sign_in(account.id(), now, client_ip.clone())
            .await
        {
            tracing::warn!(account_id = %account.id(), error = %e, "failed to record sign-in");
        }

        let mut account = account;
        account.record_sign_in(now, client_ip);

        tracing::info!(account_id = %account.id(), "signed in through identity provider");
        CallbackOutcome::Authenticated {
            account,
            session,
            location: self.routes.after_sign_in.clone(),
            notice: self
                .messages
                .translate(messages::OAUTH_SUCCESS, &[("kind", kind.display_name())]),
        }
    }
}
