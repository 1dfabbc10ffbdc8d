//! Client error types.
//!
//! Every fallible operation in this crate returns [`ClientError`]. The
//! variants follow the failure taxonomy of the backend conversation:
//! transport failures, authentication rejections (401), validation failures,
//! quota exhaustion (429) and everything else the server may answer with.

use std::collections::BTreeMap;
use std::fmt;

/// Errors that can occur while talking to the backend or the identity provider.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The request never produced an HTTP response.
    #[error("Network error: {message}")]
    Network {
        /// Description of the transport failure.
        message: String,
    },

    /// The backend rejected the credentials or token (HTTP 401).
    #[error("Unauthorized: {message}")]
    Unauthorized {
        /// Message returned by the backend.
        message: String,
    },

    /// The backend rejected the request payload (HTTP 400/422).
    #[error("Validation failed: {message}")]
    Validation {
        /// Message returned by the backend.
        message: String,
    },

    /// A form failed local validation before any request was made.
    #[error("Invalid form: {0}")]
    InvalidForm(FieldErrors),

    /// The monthly token budget is exhausted (HTTP 429).
    #[error("Quota exceeded: {message}")]
    QuotaExceeded {
        /// Message returned by the backend.
        message: String,
    },

    /// Any other non-success HTTP status.
    #[error("HTTP {status}: {message}")]
    Http {
        /// Response status code.
        status: u16,
        /// Message or body returned by the backend.
        message: String,
    },

    /// A response body could not be decoded.
    #[error("Decode error: {message}")]
    Decode {
        /// Description of the decoding failure.
        message: String,
    },

    /// The backend returned a user record that failed validation.
    #[error("Invalid user record: {message}")]
    InvalidUser {
        /// Which field was rejected and why.
        message: String,
    },

    /// Reading or writing the persisted auth record failed.
    #[error("Storage error: {message}")]
    Storage {
        /// Description of the storage failure.
        message: String,
    },

    /// The identity provider requires user interaction to issue a token.
    #[error("Identity provider requires interaction")]
    InteractionRequired,

    /// The identity provider failed to issue a token.
    #[error("Identity provider error: {message}")]
    IdentityProvider {
        /// Description of the provider failure.
        message: String,
    },

    /// Client configuration is invalid.
    #[error("Configuration error: {message}")]
    Configuration {
        /// Description of the configuration error.
        message: String,
    },
}

impl ClientError {
    /// Creates a new `Network` error.
    #[must_use]
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Creates a new `Unauthorized` error.
    #[must_use]
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized {
            message: message.into(),
        }
    }

    /// Creates a new `Validation` error.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Creates a new `QuotaExceeded` error.
    #[must_use]
    pub fn quota_exceeded(message: impl Into<String>) -> Self {
        Self::QuotaExceeded {
            message: message.into(),
        }
    }

    /// Creates a new `Http` error.
    #[must_use]
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self::Http {
            status,
            message: message.into(),
        }
    }

    /// Creates a new `Decode` error.
    #[must_use]
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidUser` error.
    #[must_use]
    pub fn invalid_user(message: impl Into<String>) -> Self {
        Self::InvalidUser {
            message: message.into(),
        }
    }

    /// Creates a new `Storage` error.
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Creates a new `IdentityProvider` error.
    #[must_use]
    pub fn identity_provider(message: impl Into<String>) -> Self {
        Self::IdentityProvider {
            message: message.into(),
        }
    }

    /// Creates a new `Configuration` error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Returns `true` if the backend refused the caller's identity.
    #[must_use]
    pub fn is_authentication_error(&self) -> bool {
        matches!(self, Self::Unauthorized { .. })
    }

    /// Returns the error category for logging purposes.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Network { .. } => ErrorCategory::Network,
            Self::Unauthorized { .. } => ErrorCategory::Authentication,
            Self::Validation { .. } | Self::InvalidForm(_) => ErrorCategory::Validation,
            Self::QuotaExceeded { .. } => ErrorCategory::Quota,
            Self::Http { .. } | Self::Decode { .. } | Self::InvalidUser { .. } => {
                ErrorCategory::Server
            }
            Self::Storage { .. } => ErrorCategory::Storage,
            Self::InteractionRequired | Self::IdentityProvider { .. } => ErrorCategory::Federation,
            Self::Configuration { .. } => ErrorCategory::Configuration,
        }
    }

    /// Message suitable for showing to the person at the keyboard.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Network { .. } => "Could not connect to the service".to_string(),
            Self::Unauthorized { .. } => "Authentication required. Please log in again.".to_string(),
            Self::Validation { message } | Self::QuotaExceeded { message } => message.clone(),
            Self::InvalidForm(fields) => fields.to_string(),
            Self::Http { status, .. } => format!("Request failed with status: {status}"),
            Self::Decode { .. } | Self::InvalidUser { .. } => {
                "The service returned an unexpected response".to_string()
            }
            Self::Storage { .. } => "Could not access the saved session".to_string(),
            Self::InteractionRequired => "Please sign in with your organisation account".to_string(),
            Self::IdentityProvider { message } => message.clone(),
            Self::Configuration { message } => message.clone(),
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::decode(err.to_string())
        } else if let Some(status) = err.status() {
            Self::http(status.as_u16(), err.to_string())
        } else {
            Self::network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        Self::decode(err.to_string())
    }
}

/// Per-field validation messages, ordered by field name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldErrors(BTreeMap<String, String>);

impl FieldErrors {
    /// Creates an empty set of field errors.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a message for `field`, keeping the first one reported.
    pub fn insert(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.entry(field.into()).or_insert_with(|| message.into());
    }

    /// Returns the message recorded for `field`.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|(k, v)| format!("{k}: {v}")).collect();
        f.write_str(&parts.join("; "))
    }
}

/// Categories of client errors for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Transport failures.
    Network,
    /// Credential or token rejection.
    Authentication,
    /// Request validation errors.
    Validation,
    /// Token budget exhaustion.
    Quota,
    /// Unexpected server responses.
    Server,
    /// Local persistence failures.
    Storage,
    /// External identity provider failures.
    Federation,
    /// Configuration errors.
    Configuration,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Network => write!(f, "network"),
            Self::Authentication => write!(f, "authentication"),
            Self::Validation => write!(f, "validation"),
            Self::Quota => write!(f, "quota"),
            Self::Server => write!(f, "server"),
            Self::Storage => write!(f, "storage"),
            Self::Federation => write!(f, "federation"),
            Self::Configuration => write!(f, "configuration"),
        }
    }
}
