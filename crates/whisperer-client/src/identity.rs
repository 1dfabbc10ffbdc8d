//! External identity-provider integration.
//!
//! The identity provider runs its own sign-in flow and keeps its own token
//! cache. This module reconciles that state one way, provider to application:
//! when the provider reports a successful sign-in, the listener obtains an ID
//! token from it and exchanges that for an application token.
//!
//! # State machine
//!
//! ```text
//! Idle --LoginSuccess--> ExchangePending --ok--> Authenticated
//!                                        \--err--> Failed
//! ```
//!
//! Duplicate exchanges are suppressed by a persisted flag claimed atomically
//! with [`claim_flag`](crate::storage::claim_flag), so the guard also holds
//! across listener restarts that share storage. A flag older than
//! [`GUARD_FLAG_TTL`] is treated as abandoned and taken over.
//!
//! The provider client is passed in as an [`IdentityClient`] and events are
//! delivered on a single-consumer channel (see [`event_channel`]).

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};

use crate::ClientResult;
use crate::backend::AuthBackend;
use crate::error::ClientError;
use crate::navigation::{Route, home_route};
use crate::session::SessionStore;
use crate::storage::{GUARD_FLAG_TTL, PersistedStore, claim_flag, flag_held, keys};
use crate::types::{AuthSource, User};

/// Operations the application needs from the identity provider SDK.
#[async_trait]
pub trait IdentityClient: Send + Sync {
    /// Returns an ID token from the provider's cache. Fails with
    /// [`ClientError::InteractionRequired`] when the user must sign in again.
    async fn acquire_token_silent(&self) -> ClientResult<String>;

    /// Runs the provider's interactive sign-in and returns an ID token.
    async fn login_interactive(&self) -> ClientResult<String>;

    /// Forgets all cached provider accounts.
    async fn clear_cache(&self) -> ClientResult<()>;
}

/// Notifications emitted by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityEvent {
    LoginSuccess { account: String },
    LoginFailure { message: String },
    Logout,
}

/// Creates the channel feeding an [`IdentityListener`].
#[must_use]
pub fn event_channel() -> (
    mpsc::UnboundedSender<IdentityEvent>,
    mpsc::UnboundedReceiver<IdentityEvent>,
) {
    mpsc::unbounded_channel()
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ExchangeState {
    #[default]
    Idle,
    ExchangePending,
    Authenticated,
    Failed(String),
}

/// Why a sign-in notification did not start an exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    AlreadyAuthenticated,
    LoggingOut,
    ExchangeInProgress,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExchangeOutcome {
    Skipped(SkipReason),
    /// The application session now belongs to `user`; navigate to `redirect`.
    Authenticated { user: User, redirect: Route },
    /// The exchange finished after the session changed; its result was dropped.
    Superseded,
    Failed(String),
}

/// Releases the exchange flag when dropped.
struct ExchangeFlag<'a> {
    storage: &'a dyn PersistedStore,
}

impl<'a> ExchangeFlag<'a> {
    fn claim(storage: &'a dyn PersistedStore) -> ClientResult<Option<Self>> {
        if claim_flag(storage, keys::EXCHANGE_IN_PROGRESS, GUARD_FLAG_TTL)? {
            Ok(Some(Self { storage }))
        } else {
            Ok(None)
        }
    }
}

impl Drop for ExchangeFlag<'_> {
    fn drop(&mut self) {
        if let Err(err) = self.storage.remove(keys::EXCHANGE_IN_PROGRESS) {
            tracing::warn!(error = %err, "failed to release token exchange flag");
        }
    }
}

pub struct IdentityListener {
    identity: Arc<dyn IdentityClient>,
    backend: Arc<dyn AuthBackend>,
    session: Arc<SessionStore>,
    state: watch::Sender<ExchangeState>,
}

impl IdentityListener {
    pub fn new(
        identity: Arc<dyn IdentityClient>,
        backend: Arc<dyn AuthBackend>,
        session: Arc<SessionStore>,
    ) -> Self {
        let (state, _) = watch::channel(ExchangeState::Idle);
        Self {
            identity,
            backend,
            session,
            state,
        }
    }

    #[must_use]
    pub fn state(&self) -> ExchangeState {
        self.state.borrow().clone()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ExchangeState> {
        self.state.subscribe()
    }

    /// Consumes events until every sender is dropped.
    pub async fn run(&self, mut events: mpsc::UnboundedReceiver<IdentityEvent>) {
        while let Some(event) = events.recv().await {
            self.handle(event).await;
        }
        tracing::debug!("identity event channel closed");
    }

    /// Handles one provider event. Only sign-in notifications produce an
    /// outcome.
    pub async fn handle(&self, event: IdentityEvent) -> Option<ExchangeOutcome> {
        match event {
            IdentityEvent::LoginSuccess { account } => {
                tracing::debug!(%account, "identity provider sign-in");
                Some(self.on_login_success().await)
            }
            IdentityEvent::LoginFailure { message } => {
                tracing::warn!(%message, "identity provider sign-in failed");
                self.state.send_replace(ExchangeState::Failed(message));
                None
            }
            IdentityEvent::Logout => {
                let session = self.session.snapshot();
                if session.source() == Some(AuthSource::External)
                    && let Err(err) = self.session.logout()
                {
                    tracing::warn!(error = %err, "failed to clear session after provider logout");
                }
                self.state.send_replace(ExchangeState::Idle);
                None
            }
        }
    }

    fn logging_out(&self) -> bool {
        flag_held(self.session.storage().as_ref(), keys::LOGGING_OUT, GUARD_FLAG_TTL)
            .unwrap_or(false)
    }

    /// Exchanges the provider's ID token for an application session.
    pub async fn on_login_success(&self) -> ExchangeOutcome {
        if self.session.snapshot().is_authenticated() {
            return ExchangeOutcome::Skipped(SkipReason::AlreadyAuthenticated);
        }
        if self.logging_out() {
            return ExchangeOutcome::Skipped(SkipReason::LoggingOut);
        }

        let storage = self.session.storage().as_ref();
        let flag = match ExchangeFlag::claim(storage) {
            Ok(Some(flag)) => flag,
            Ok(None) => return ExchangeOutcome::Skipped(SkipReason::ExchangeInProgress),
            Err(err) => return self.fail(err),
        };

        self.state.send_replace(ExchangeState::ExchangePending);
        let outcome = match self.exchange().await {
            Ok(user) => {
                let redirect = home_route(&user);
                self.state.send_replace(ExchangeState::Authenticated);
                ExchangeOutcome::Authenticated { user, redirect }
            }
            Err(ExchangeError::Superseded) => {
                self.state.send_replace(ExchangeState::Idle);
                ExchangeOutcome::Superseded
            }
            Err(ExchangeError::Failed(err)) => self.fail(err),
        };
        drop(flag);
        outcome
    }

    async fn exchange(&self) -> Result<User, ExchangeError> {
        let id_token = match self.identity.acquire_token_silent().await {
            Ok(token) => token,
            Err(ClientError::InteractionRequired) => {
                tracing::debug!("silent token acquisition needs interaction");
                self.identity.login_interactive().await?
            }
            Err(err) => return Err(err.into()),
        };

        let grant = self.backend.exchange_external_token(&id_token).await?;

        if self.session.snapshot().is_authenticated() || self.logging_out() {
            tracing::debug!("session changed during token exchange; dropping result");
            return Err(ExchangeError::Superseded);
        }

        self.session
            .login_with_source(&grant.token, grant.user.clone(), AuthSource::External)?;
        Ok(grant.user)
    }

    fn fail(&self, err: ClientError) -> ExchangeOutcome {
        if self.logging_out() {
            tracing::debug!(error = %err, "token exchange failed during logout");
        } else {
            tracing::warn!(category = %err.category(), error = %err, "token exchange failed");
        }
        if let Err(clear_err) = self.session.discard_unconfirmed() {
            tracing::warn!(error = %clear_err, "failed to clear partial session");
        }
        let message = err.user_message();
        self.state.send_replace(ExchangeState::Failed(message.clone()));
        ExchangeOutcome::Failed(message)
    }
}

enum ExchangeError {
    Superseded,
    Failed(ClientError),
}

impl From<ClientError> for ExchangeError {
    fn from(err: ClientError) -> Self {
        Self::Failed(err)
    }
}
