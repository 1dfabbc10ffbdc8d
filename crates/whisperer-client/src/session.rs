//! Session store.
//!
//! The store is the client's single belief about who is signed in. It is
//! seeded from [`PersistedStore`] when opened and published through a
//! [`tokio::sync::watch`] channel so that any number of consumers (route
//! guards, the usage meter, a UI) can observe it.
//!
//! # Reconciliation
//!
//! A persisted token is not trusted on its own. [`SessionStore::open`] puts
//! the session in the `loading` state and [`SessionStore::reconcile`] asks the
//! [`TokenValidator`] whether the backend still accepts it. Confirmation
//! adopts the persisted record; rejection or any error clears it.
//!
//! `login` and `logout` bump an epoch counter. A reconcile that was waiting on
//! the network when the epoch moved is stale and its outcome is dropped.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::watch;

use crate::ClientResult;
use crate::error::ClientError;
use crate::storage::{PersistedStore, keys};
use crate::token_validator::{TokenValidator, Validation};
use crate::types::{AuthSource, User};

/// Snapshot of the client's belief about the current user.
///
/// `token` and `user` are only ever set together, so
/// [`is_authenticated`](Self::is_authenticated) is exactly
/// `token.is_some() && user.is_some()`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    token: Option<String>,
    user: Option<User>,
    source: Option<AuthSource>,
    loading: bool,
}

impl Session {
    fn authenticated(token: String, user: User, source: AuthSource) -> Self {
        Self {
            token: Some(token),
            user: Some(user),
            source: Some(source),
            loading: false,
        }
    }

    fn loading() -> Self {
        Self {
            loading: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.token.is_some() && self.user.is_some()
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.loading
    }

    #[must_use]
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    #[must_use]
    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    #[must_use]
    pub fn source(&self) -> Option<AuthSource> {
        self.source
    }
}

/// Persisted auth record as read back from storage.
enum PersistedRecord {
    Empty,
    Complete {
        token: String,
        user: User,
        source: AuthSource,
    },
    Partial(&'static str),
}

pub struct SessionStore {
    storage: Arc<dyn PersistedStore>,
    state: watch::Sender<Session>,
    epoch: AtomicU64,
    write_lock: Mutex<()>,
}

impl SessionStore {
    /// Opens the store over `storage`. When a token is persisted the session
    /// starts in the loading state until [`reconcile`](Self::reconcile) runs.
    pub fn open(storage: Arc<dyn PersistedStore>) -> Self {
        let initial = match storage.get(keys::TOKEN) {
            Ok(Some(_)) => Session::loading(),
            Ok(None) => Session::default(),
            Err(err) => {
                tracing::warn!(error = %err, "could not read persisted session; starting signed out");
                Session::default()
            }
        };
        let (state, _) = watch::channel(initial);
        Self {
            storage,
            state,
            epoch: AtomicU64::new(0),
            write_lock: Mutex::new(()),
        }
    }

    /// Current session.
    #[must_use]
    pub fn snapshot(&self) -> Session {
        self.state.borrow().clone()
    }

    /// Receiver notified on every session change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.state.subscribe()
    }

    #[must_use]
    pub fn storage(&self) -> &Arc<dyn PersistedStore> {
        &self.storage
    }

    fn lock(&self) -> ClientResult<MutexGuard<'_, ()>> {
        self.write_lock
            .lock()
            .map_err(|_| ClientError::storage("session lock poisoned"))
    }

    /// Records a credential login.
    pub fn login(&self, token: &str, user: User) -> ClientResult<()> {
        self.login_with_source(token, user, AuthSource::Local)
    }

    /// Persists token and user and marks the session authenticated. No
    /// network round-trip is involved.
    pub fn login_with_source(&self, token: &str, user: User, source: AuthSource) -> ClientResult<()> {
        let _guard = self.lock()?;
        self.epoch.fetch_add(1, Ordering::SeqCst);

        if let Err(err) = self.persist(token, &user, source) {
            tracing::warn!(error = %err, "failed to persist session; staying signed out");
            self.clear_record();
            self.state.send_replace(Session::default());
            return Err(err);
        }

        tracing::info!(student_id = %user.student_id, source = source.as_str(), "signed in");
        self.state
            .send_replace(Session::authenticated(token.to_string(), user, source));
        Ok(())
    }

    /// Clears the persisted record and marks the session signed out. The
    /// in-memory session is cleared even when storage fails.
    pub fn logout(&self) -> ClientResult<()> {
        let _guard = self.lock()?;
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.state.send_replace(Session::default());
        tracing::info!("signed out");
        self.remove_record()
    }

    /// Drops a persisted record left behind by a failed sign-in attempt.
    /// Does nothing while a session is authenticated or while a persisted
    /// record is still waiting for [`reconcile`](Self::reconcile).
    pub fn discard_unconfirmed(&self) -> ClientResult<()> {
        let _guard = self.lock()?;
        let state = self.state.borrow();
        if state.is_authenticated() || state.is_loading() {
            return Ok(());
        }
        drop(state);
        self.remove_record()
    }

    /// Confirms a persisted token with the backend. See the module docs.
    pub async fn reconcile(&self, validator: &TokenValidator) -> Session {
        let epoch = self.epoch.load(Ordering::SeqCst);

        let (token, user, source) = match self.read_record() {
            Ok(PersistedRecord::Complete {
                token,
                user,
                source,
            }) => (token, user, source),
            Ok(PersistedRecord::Empty) => {
                return self.settle(epoch, |store| {
                    store.clear_record();
                    Session::default()
                });
            }
            Ok(PersistedRecord::Partial(reason)) => {
                tracing::warn!(reason, "discarding partial persisted session");
                return self.settle(epoch, |store| {
                    store.clear_record();
                    Session::default()
                });
            }
            Err(err) => {
                tracing::warn!(error = %err, "could not read persisted session");
                return self.settle(epoch, |store| {
                    store.clear_record();
                    Session::default()
                });
            }
        };

        self.state.send_if_modified(|s| {
            if s.loading {
                false
            } else {
                *s = Session::loading();
                true
            }
        });

        let outcome = validator.check(&token).await;

        self.settle(epoch, move |store| match outcome {
            Validation::Accepted(current) if current.student_id == user.student_id => {
                Session::authenticated(token, user, source)
            }
            Validation::Accepted(current) => {
                tracing::warn!(
                    persisted = %user.student_id,
                    current = %current.student_id,
                    "persisted user does not own the token; signing out"
                );
                store.clear_record();
                Session::default()
            }
            Validation::Rejected => {
                store.clear_record();
                Session::default()
            }
        })
    }

    /// Applies `f` unless a login or logout has happened since `epoch`.
    fn settle(&self, epoch: u64, f: impl FnOnce(&Self) -> Session) -> Session {
        let Ok(_guard) = self.lock() else {
            return self.snapshot();
        };
        if self.epoch.load(Ordering::SeqCst) != epoch {
            tracing::debug!("session changed during reconcile; ignoring stale result");
            return self.snapshot();
        }
        let next = f(self);
        self.state.send_replace(next.clone());
        next
    }

    fn read_record(&self) -> ClientResult<PersistedRecord> {
        let Some(token) = self.storage.get(keys::TOKEN)? else {
            return Ok(
                if self.storage.contains(keys::USER)? || self.storage.contains(keys::SOURCE)? {
                    PersistedRecord::Partial("user without token")
                } else {
                    PersistedRecord::Empty
                },
            );
        };
        let Some(raw_user) = self.storage.get(keys::USER)? else {
            return Ok(PersistedRecord::Partial("token without user"));
        };
        let Ok(user) = serde_json::from_str::<User>(&raw_user) else {
            return Ok(PersistedRecord::Partial("undecodable user"));
        };
        let source = self
            .storage
            .get(keys::SOURCE)?
            .and_then(|s| AuthSource::parse(&s))
            .unwrap_or(AuthSource::Local);
        Ok(PersistedRecord::Complete {
            token,
            user,
            source,
        })
    }

    fn persist(&self, token: &str, user: &User, source: AuthSource) -> ClientResult<()> {
        let user_json = serde_json::to_string(user)?;
        self.storage.set(keys::TOKEN, token)?;
        self.storage.set(keys::USER, &user_json)?;
        self.storage.set(keys::SOURCE, source.as_str())
    }

    fn remove_record(&self) -> ClientResult<()> {
        for key in keys::AUTH_RECORD {
            self.storage.remove(key)?;
        }
        Ok(())
    }

    fn clear_record(&self) {
        if let Err(err) = self.remove_record() {
            tracing::warn!(error = %err, "failed to clear persisted session");
        }
    }
}
