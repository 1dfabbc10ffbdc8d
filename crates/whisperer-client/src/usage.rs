//! Token usage meter.
//!
//! While a user is signed in the meter polls the quota endpoint on a fixed
//! period and publishes the latest [`TokenUsageSnapshot`] together with a
//! derived [`UsageStatus`]. Failures are soft: the last known snapshot stays
//! in place and the error is recorded next to it. Only the first fetch for a
//! user falls back to a zeroed snapshot, so consumers always have something to
//! render once loading is over.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior, interval_at};

use crate::backend::UsageBackend;
use crate::config::UsageConfig;
use crate::session::Session;
use crate::types::TokenUsageSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UsageStatus {
    Ok,
    Low,
    Exhausted,
}

impl UsageStatus {
    /// Classifies a usage percentage against the two thresholds.
    #[must_use]
    pub fn classify(percentage_used: f64, low_threshold: f64, exhausted_threshold: f64) -> Self {
        if percentage_used >= exhausted_threshold {
            Self::Exhausted
        } else if percentage_used >= low_threshold {
            Self::Low
        } else {
            Self::Ok
        }
    }
}

/// What the meter currently knows.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct UsageState {
    pub snapshot: Option<TokenUsageSnapshot>,
    pub status: Option<UsageStatus>,
    pub loading: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshKind {
    /// First fetch after a user appears. Failure yields a zeroed snapshot.
    Initial,
    /// Periodic poll.
    Scheduled,
    /// User-requested refresh, rate limited by `min_refresh_interval`.
    Manual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    Updated,
    Skipped,
    Failed,
}

struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn enter(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct UsageMeter {
    backend: Arc<dyn UsageBackend>,
    config: UsageConfig,
    state: watch::Sender<UsageState>,
    last_fetch: Mutex<Option<Instant>>,
    in_flight: AtomicBool,
}

impl UsageMeter {
    pub fn new(backend: Arc<dyn UsageBackend>, config: UsageConfig) -> Self {
        let (state, _) = watch::channel(UsageState::default());
        Self {
            backend,
            config,
            state,
            last_fetch: Mutex::new(None),
            in_flight: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn state(&self) -> UsageState {
        self.state.borrow().clone()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<UsageState> {
        self.state.subscribe()
    }

    #[must_use]
    pub fn status_for(&self, snapshot: &TokenUsageSnapshot) -> UsageStatus {
        UsageStatus::classify(
            snapshot.percentage_used,
            self.config.low_threshold,
            self.config.exhausted_threshold,
        )
    }

    /// Forgets everything; used when the user goes away.
    pub fn clear(&self) {
        if let Ok(mut last) = self.last_fetch.lock() {
            *last = None;
        }
        self.state.send_if_modified(|s| {
            if *s == UsageState::default() {
                false
            } else {
                *s = UsageState::default();
                true
            }
        });
    }

    fn rate_limited(&self, kind: RefreshKind, now: Instant) -> bool {
        let Ok(mut last) = self.last_fetch.lock() else {
            return false;
        };
        if kind == RefreshKind::Manual
            && let Some(prev) = *last
            && now.duration_since(prev) < self.config.min_refresh_interval
        {
            return true;
        }
        *last = Some(now);
        false
    }

    /// Fetches a fresh snapshot for the holder of `token`.
    pub async fn refresh(&self, token: &str, kind: RefreshKind) -> RefreshOutcome {
        let Some(_in_flight) = InFlight::enter(&self.in_flight) else {
            return RefreshOutcome::Skipped;
        };
        if self.rate_limited(kind, Instant::now()) {
            tracing::debug!("usage refresh skipped; too soon after the previous one");
            return RefreshOutcome::Skipped;
        }

        self.state.send_modify(|s| {
            s.loading = true;
            s.error = None;
        });

        match self.backend.token_usage(token).await {
            Ok(snapshot) => {
                let status = self.status_for(&snapshot);
                tracing::debug!(
                    usage = snapshot.usage,
                    limit = snapshot.limit,
                    percentage = snapshot.percentage_used,
                    ?status,
                    "token usage updated"
                );
                self.state.send_replace(UsageState {
                    snapshot: Some(snapshot),
                    status: Some(status),
                    loading: false,
                    error: None,
                });
                RefreshOutcome::Updated
            }
            Err(err) => {
                tracing::warn!(category = %err.category(), error = %err, "token usage fetch failed");
                let zeroed = TokenUsageSnapshot::zeroed();
                let status = self.status_for(&zeroed);
                self.state.send_modify(|s| {
                    if kind == RefreshKind::Initial || s.snapshot.is_none() {
                        s.snapshot = Some(zeroed);
                        s.status = Some(status);
                    }
                    s.loading = false;
                    s.error = Some(err.user_message());
                });
                RefreshOutcome::Failed
            }
        }
    }

    /// Follows the session and polls while a user is signed in. Returns when
    /// the session store is dropped.
    pub async fn run(&self, mut session: watch::Receiver<Session>) {
        loop {
            let current = session.borrow_and_update().clone();
            let (Some(token), Some(user)) = (current.token(), current.user()) else {
                self.clear();
                if session.changed().await.is_err() {
                    return;
                }
                continue;
            };
            let token = token.to_string();
            let student_id = user.student_id;

            self.clear();
            self.refresh(&token, RefreshKind::Initial).await;

            let period = self.config.poll_interval;
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.refresh(&token, RefreshKind::Scheduled).await;
                    }
                    changed = session.changed() => {
                        if changed.is_err() {
                            self.clear();
                            return;
                        }
                        let same_user = {
                            let next = session.borrow_and_update();
                            next.token() == Some(token.as_str())
                                && next.user().map(|u| u.student_id) == Some(student_id)
                        };
                        if !same_user {
                            break;
                        }
                    }
                }
            }
            tracing::debug!(%student_id, "session changed; restarting usage polling");
        }
    }
}
