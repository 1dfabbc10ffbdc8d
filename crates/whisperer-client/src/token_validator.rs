//! Persisted-token validation.
//!
//! A single outbound request decides whether a token is still accepted. Any
//! failure, including a transport error, counts as rejection: a network blip
//! forces a new login rather than risk showing a stale authenticated session.
//! There are no retries.

use std::sync::Arc;

use crate::backend::AuthBackend;
use crate::types::User;

/// Outcome of validating a persisted token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Validation {
    /// The backend accepted the token and reported its owner.
    Accepted(User),
    /// The token must not be used.
    Rejected,
}

impl Validation {
    #[must_use]
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted(_))
    }
}

#[derive(Clone)]
pub struct TokenValidator {
    backend: Arc<dyn AuthBackend>,
}

impl TokenValidator {
    pub fn new(backend: Arc<dyn AuthBackend>) -> Self {
        Self { backend }
    }

    /// Asks the backend whether `token` is currently accepted.
    pub async fn check(&self, token: &str) -> Validation {
        match self.backend.current_user(token).await {
            Ok(user) => {
                tracing::debug!(student_id = %user.student_id, "persisted token accepted");
                Validation::Accepted(user)
            }
            Err(err) => {
                tracing::warn!(category = %err.category(), error = %err, "persisted token rejected");
                Validation::Rejected
            }
        }
    }

    /// Boolean form of [`check`](Self::check).
    pub async fn validate(&self, token: &str) -> bool {
        self.check(token).await.is_accepted()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::ClientResult;
    use crate::error::ClientError;
    use crate::forms::{LoginForm, RegisterForm};
    use crate::types::{AuthGrant, RawUser};

    struct FakeBackend {
        answer: fn() -> ClientResult<User>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl AuthBackend for FakeBackend {
        async fn current_user(&self, _token: &str) -> ClientResult<User> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            (self.answer)()
        }
        async fn login(&self, _form: &LoginForm) -> ClientResult<AuthGrant> {
            unreachable!()
        }
        async fn register(&self, _form: &RegisterForm) -> ClientResult<()> {
            unreachable!()
        }
        async fn exchange_external_token(&self, _id_token: &str) -> ClientResult<AuthGrant> {
            unreachable!()
        }
        async fn logout(&self, _token: &str) -> ClientResult<()> {
            unreachable!()
        }
    }

    fn user() -> ClientResult<User> {
        User::try_from(RawUser {
            student_id: 3,
            email: "c@uni.example".into(),
            name: "C".into(),
        })
    }

    fn validator(answer: fn() -> ClientResult<User>) -> (TokenValidator, Arc<FakeBackend>) {
        let backend = Arc::new(FakeBackend {
            answer,
            calls: AtomicUsize::new(0),
        });
        (TokenValidator::new(backend.clone()), backend)
    }

    #[tokio::test]
    async fn test_accepted_token() {
        let (validator, _) = validator(user);
        assert!(validator.validate("t").await);
    }

    #[tokio::test]
    async fn test_unauthorized_is_rejected() {
        let (validator, _) = validator(|| Err(ClientError::unauthorized("expired")));
        assert_eq!(validator.check("t").await, Validation::Rejected);
    }

    #[tokio::test]
    async fn test_network_failure_is_rejected_without_retry() {
        let (validator, backend) = validator(|| Err(ClientError::network("refused")));
        assert!(!validator.validate("t").await);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }
}
