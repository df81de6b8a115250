//! Error types shared by the session, lifecycle and provider adapter.

use std::fmt;

use thiserror::Error;

use crate::config::ConfigError;
use crate::ownership::FingerprintError;

/// Errors raised while talking to OpenStack or managing instances.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum OpenstackError {
    /// Raised when the identity service rejects the credentials.
    #[error("authentication against {endpoint} failed: {message}")]
    Authentication {
        /// Identity endpoint that was contacted.
        endpoint: String,
        /// Reason reported by the identity service.
        message: String,
    },
    /// Raised when a server id is not known to the provider.
    #[error("no such server running: {id}")]
    NotFound {
        /// Server identifier that was looked up.
        id: String,
    },
    /// Raised when a provider action did not succeed.
    #[error(transparent)]
    ActionFailed(#[from] ActionFailed),
    /// Wrapper for transport and decoding failures.
    #[error("provider error: {message}")]
    Provider {
        /// Message describing the failure.
        message: String,
    },
    /// Raised when the session configuration is incomplete.
    #[error("configuration error: {0}")]
    Config(String),
    /// Raised when the orchestrator identity is not known yet.
    #[error(transparent)]
    Fingerprint(#[from] FingerprintError),
}

impl OpenstackError {
    /// Builds an [`OpenstackError::ActionFailed`] with no secondary cause.
    #[must_use]
    pub fn action_failed(message: impl Into<String>) -> Self {
        Self::ActionFailed(ActionFailed::new(message))
    }

    /// Builds an [`OpenstackError::Provider`] from any displayable failure.
    #[must_use]
    pub fn provider(err: impl fmt::Display) -> Self {
        Self::Provider {
            message: err.to_string(),
        }
    }

    /// Attaches `secondary` as the teardown cause, keeping `self` primary.
    ///
    /// Errors that are not action failures are folded into one so both
    /// messages survive.
    #[must_use]
    pub fn with_teardown(self, secondary: Self) -> Self {
        match self {
            Self::ActionFailed(failure) => Self::ActionFailed(failure.with_teardown(secondary)),
            other => Self::ActionFailed(ActionFailed::new(other.to_string()).with_teardown(secondary)),
        }
    }

    /// Returns `true` for the action-failure kind.
    #[must_use]
    pub const fn is_action_failure(&self) -> bool {
        matches!(self, Self::ActionFailed(_))
    }
}

impl From<ConfigError> for OpenstackError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value.to_string())
    }
}

/// A provider action that did not succeed.
///
/// When cleaning up after the failure also failed, the cleanup error is kept
/// as [`ActionFailed::teardown`] and appended to the message. It is not
/// repeated through `source()`.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error("{}{}", .message, TeardownNote(.teardown.as_deref()))]
pub struct ActionFailed {
    message: String,
    teardown: Option<Box<OpenstackError>>,
}

impl ActionFailed {
    /// Creates a failure with a human readable message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            teardown: None,
        }
    }

    /// Attaches the error raised while rolling back.
    #[must_use]
    pub fn with_teardown(mut self, teardown: OpenstackError) -> Self {
        self.teardown = Some(Box::new(teardown));
        self
    }

    /// Primary failure message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Error raised by the compensating action, if it failed too.
    #[must_use]
    pub fn teardown(&self) -> Option<&OpenstackError> {
        self.teardown.as_deref()
    }
}

struct TeardownNote<'a>(Option<&'a OpenstackError>);

impl fmt::Display for TeardownNote<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0
            .map_or(Ok(()), |teardown| write!(f, " (teardown also failed: {teardown})"))
    }
}
