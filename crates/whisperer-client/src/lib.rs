//! # whisperer-client
//!
//! Client-side session handling for the Student Whisperer API.
//!
//! This crate provides:
//! - A session store seeded from persisted storage and confirmed against the backend
//! - Token validation against `/api/me`
//! - External identity-provider token exchange
//! - Periodic token-usage metering with quota status
//! - A typed HTTP client for the REST API
//!
//! ## Modules
//!
//! - [`session`] - Session store and startup reconciliation
//! - [`storage`] - Persisted key/value records (memory and file backed)
//! - [`token_validator`] - Single-request token confirmation
//! - [`identity`] - Identity-provider event listener and token exchange
//! - [`usage`] - Token usage meter
//! - [`auth`] - Credential sign-in, registration and sign-out
//! - [`navigation`] - Route guards and post-login redirects
//! - [`api`] - REST client
//! - [`chat`] - In-memory conversation history
//! - [`config`] - Client configuration loading

pub mod api;
pub mod auth;
pub mod backend;
pub mod chat;
pub mod config;
pub mod error;
pub mod forms;
pub mod identity;
pub mod navigation;
pub mod session;
pub mod storage;
pub mod token_validator;
pub mod types;
pub mod usage;

#[cfg(test)]
mod test_support;

pub use api::ApiClient;
pub use auth::{AuthFlow, failure_message};
pub use backend::{AuthBackend, UsageBackend};
pub use chat::{ChatLog, ChatMessage, Conversation, MessageRole};
pub use config::{ClientConfig, UsageConfig, load_config};
pub use error::{ClientError, ErrorCategory, FieldErrors};
pub use forms::{LoginForm, RegisterForm};
pub use identity::{
    ExchangeOutcome, ExchangeState, IdentityClient, IdentityEvent, IdentityListener, SkipReason,
    event_channel,
};
pub use navigation::{Route, RouteDecision, guard, home_route, post_login_target};
pub use session::{Session, SessionStore};
pub use storage::{FileStore, MemoryStore, PersistedStore};
pub use token_validator::{TokenValidator, Validation};
pub use types::{
    AdminTokenUsage, AuthGrant, AuthSource, ReportMonth, Role, StudentCourses, StudentId,
    TokenLimit, TokenUsageSnapshot, User, UserTokenUsage,
};
pub use usage::{RefreshKind, RefreshOutcome, UsageMeter, UsageState, UsageStatus};

/// Result type used throughout the crate.
pub type ClientResult<T> = Result<T, ClientError>;
