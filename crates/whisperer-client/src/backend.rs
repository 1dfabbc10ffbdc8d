//! Seams between the reconciliation logic and the REST backend.
//!
//! The session store, token validator, identity listener and usage meter only
//! see these traits. [`ApiClient`](crate::api::ApiClient) implements all of
//! them over HTTP; tests substitute in-process fakes.

use async_trait::async_trait;

use crate::ClientResult;
use crate::forms::{LoginForm, RegisterForm};
use crate::types::{AuthGrant, TokenUsageSnapshot, User};

/// Backend operations needed to establish and tear down a session.
#[async_trait]
pub trait AuthBackend: Send + Sync {
    /// Returns the user owning `token`. Fails with
    /// [`ClientError::Unauthorized`](crate::ClientError::Unauthorized) when the
    /// backend no longer accepts it.
    async fn current_user(&self, token: &str) -> ClientResult<User>;

    /// Exchanges email and password for an application token.
    async fn login(&self, form: &LoginForm) -> ClientResult<AuthGrant>;

    /// Creates a local account. The user still has to sign in afterwards.
    async fn register(&self, form: &RegisterForm) -> ClientResult<()>;

    /// Exchanges an identity-provider ID token for an application token.
    async fn exchange_external_token(&self, id_token: &str) -> ClientResult<AuthGrant>;

    /// Tells the backend the token is no longer in use.
    async fn logout(&self, token: &str) -> ClientResult<()>;
}

/// Source of token-usage snapshots for the signed-in user.
#[async_trait]
pub trait UsageBackend: Send + Sync {
    async fn token_usage(&self, token: &str) -> ClientResult<TokenUsageSnapshot>;
}
