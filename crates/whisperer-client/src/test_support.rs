//! In-process fakes shared by unit tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::ClientResult;
use crate::backend::AuthBackend;
use crate::error::ClientError;
use crate::forms::{LoginForm, RegisterForm};
use crate::types::{AuthGrant, RawUser, User};

type Answer<T> = Box<dyn Fn() -> ClientResult<T> + Send + Sync>;

pub(crate) fn user(id: i64) -> User {
    User::try_from(RawUser {
        student_id: id,
        email: format!("student{id}@uni.example"),
        name: format!("Student {id}"),
    })
    .expect("valid test user")
}

pub(crate) fn grant(token: &str, id: i64) -> AuthGrant {
    AuthGrant {
        token: token.to_string(),
        user: user(id),
    }
}

pub(crate) struct FakeAuth {
    me: Answer<User>,
    login: Answer<AuthGrant>,
    exchange: Answer<AuthGrant>,
    gate: Option<Arc<Notify>>,
    exchange_delay: Duration,
    pub me_calls: AtomicUsize,
    pub login_calls: AtomicUsize,
    pub register_calls: AtomicUsize,
    pub exchange_calls: AtomicUsize,
    pub logout_calls: AtomicUsize,
}

impl FakeAuth {
    pub(crate) fn new() -> Self {
        Self {
            me: Box::new(|| Ok(user(2))),
            login: Box::new(|| Ok(grant("local-token", 2))),
            exchange: Box::new(|| Ok(grant("exchanged-token", 2))),
            gate: None,
            exchange_delay: Duration::ZERO,
            me_calls: AtomicUsize::new(0),
            login_calls: AtomicUsize::new(0),
            register_calls: AtomicUsize::new(0),
            exchange_calls: AtomicUsize::new(0),
            logout_calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn me(mut self, f: impl Fn() -> ClientResult<User> + Send + Sync + 'static) -> Self {
        self.me = Box::new(f);
        self
    }

    pub(crate) fn rejecting() -> Self {
        Self::new()
            .me(|| Err(ClientError::unauthorized("Token is invalid")))
            .login_with(|| Err(ClientError::unauthorized("Invalid email or password")))
            .exchange_with(|| Err(ClientError::unauthorized("Invalid token")))
    }

    pub(crate) fn login_with(
        mut self,
        f: impl Fn() -> ClientResult<AuthGrant> + Send + Sync + 'static,
    ) -> Self {
        self.login = Box::new(f);
        self
    }

    pub(crate) fn exchange_with(
        mut self,
        f: impl Fn() -> ClientResult<AuthGrant> + Send + Sync + 'static,
    ) -> Self {
        self.exchange = Box::new(f);
        self
    }

    /// Holds `current_user` until the returned handle is notified.
    pub(crate) fn gated(mut self) -> (Self, Arc<Notify>) {
        let gate = Arc::new(Notify::new());
        self.gate = Some(gate.clone());
        (self, gate)
    }

    pub(crate) fn exchange_delay(mut self, delay: Duration) -> Self {
        self.exchange_delay = delay;
        self
    }

    pub(crate) fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AuthBackend for FakeAuth {
    async fn current_user(&self, _token: &str) -> ClientResult<User> {
        self.me_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        (self.me)()
    }

    async fn login(&self, form: &LoginForm) -> ClientResult<AuthGrant> {
        form.check()?;
        self.login_calls.fetch_add(1, Ordering::SeqCst);
        (self.login)()
    }

    async fn register(&self, form: &RegisterForm) -> ClientResult<()> {
        form.check()?;
        self.register_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn exchange_external_token(&self, _id_token: &str) -> ClientResult<AuthGrant> {
        self.exchange_calls.fetch_add(1, Ordering::SeqCst);
        if !self.exchange_delay.is_zero() {
            tokio::time::sleep(self.exchange_delay).await;
        }
        (self.exchange)()
    }

    async fn logout(&self, _token: &str) -> ClientResult<()> {
        self.logout_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
