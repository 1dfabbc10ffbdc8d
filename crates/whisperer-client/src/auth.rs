//! Credential sign-in, registration and sign-out.
//!
//! [`AuthFlow`] ties the backend, the session store and (optionally) the
//! identity provider together. Sign-in with an identity provider goes through
//! [`IdentityListener`](crate::identity::IdentityListener) instead.

use std::sync::Arc;

use crate::ClientResult;
use crate::backend::AuthBackend;
use crate::error::ClientError;
use crate::forms::{LoginForm, RegisterForm};
use crate::identity::IdentityClient;
use crate::navigation::{Route, post_login_target};
use crate::session::SessionStore;
use crate::storage::{keys, raise_flag};

pub struct AuthFlow {
    backend: Arc<dyn AuthBackend>,
    session: Arc<SessionStore>,
    identity: Option<Arc<dyn IdentityClient>>,
}

impl AuthFlow {
    pub fn new(backend: Arc<dyn AuthBackend>, session: Arc<SessionStore>) -> Self {
        Self {
            backend,
            session,
            identity: None,
        }
    }

    /// Also clears the provider's account cache on logout.
    #[must_use]
    pub fn with_identity(mut self, identity: Arc<dyn IdentityClient>) -> Self {
        self.identity = Some(identity);
        self
    }

    #[must_use]
    pub fn session(&self) -> &Arc<SessionStore> {
        &self.session
    }

    /// Signs in with email and password and returns where to go next.
    ///
    /// On failure the session is left signed out; use [`failure_message`] to
    /// render the error.
    pub async fn login_with_credentials(
        &self,
        form: &LoginForm,
        requested: Option<Route>,
    ) -> ClientResult<Route> {
        form.check()?;

        let grant = match self.backend.login(form).await {
            Ok(grant) => grant,
            Err(err) => {
                tracing::warn!(category = %err.category(), error = %err, "credential login failed");
                if let Err(clear_err) = self.session.discard_unconfirmed() {
                    tracing::warn!(error = %clear_err, "failed to clear partial session");
                }
                return Err(err);
            }
        };

        self.session.login(&grant.token, grant.user.clone())?;
        Ok(post_login_target(&grant.user, requested))
    }

    /// Creates an account and sends the user to the login page.
    pub async fn register(&self, form: &RegisterForm) -> ClientResult<Route> {
        form.check()?;
        self.backend.register(form).await?;
        tracing::info!("account registered");
        Ok(Route::Login)
    }

    /// Signs out everywhere it can. Only the local session clearing is
    /// required to succeed; backend and provider failures are logged.
    /// Any leftover token exchange claim is released as well.
    pub async fn logout(&self) -> ClientResult<()> {
        let storage = self.session.storage().clone();
        if let Err(err) = raise_flag(storage.as_ref(), keys::LOGGING_OUT) {
            tracing::warn!(error = %err, "failed to mark logout in progress");
        }

        let token = self.session.snapshot().token().map(str::to_string);
        if let Some(token) = token
            && let Err(err) = self.backend.logout(&token).await
        {
            tracing::debug!(error = %err, "backend logout failed");
        }

        if let Some(identity) = &self.identity
            && let Err(err) = identity.clear_cache().await
        {
            tracing::warn!(error = %err, "failed to clear identity provider cache");
        }

        let result = self.session.logout();
        for flag in [keys::EXCHANGE_IN_PROGRESS, keys::LOGGING_OUT] {
            if let Err(err) = storage.remove(flag) {
                tracing::warn!(error = %err, flag, "failed to release guard flag");
            }
        }
        result
    }
}

/// Text shown on the login page for a failed sign-in.
#[must_use]
pub fn failure_message(err: &ClientError) -> String {
    match err {
        ClientError::Unauthorized { message } | ClientError::Validation { message }
            if !message.is_empty() =>
        {
            message.clone()
        }
        ClientError::InvalidForm(fields) => fields.to_string(),
        ClientError::Network { .. } => "Could not connect to authentication service".to_string(),
        ClientError::Unauthorized { .. } | ClientError::Validation { .. } => {
            "Invalid email or password. Please try again.".to_string()
        }
        other => other.user_message(),
    }
}
