use serde::Serialize;

use crate::kernel::timeout::TimedOut;
use crate::kernel::traits::PublishError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Missing account, unusable settings
    Configuration,
    /// No usable credential, provider rejected the token
    Authentication,
    /// Denied by the subscription guard (not a fault)
    Subscription,
    /// Rate limits, 5xx, network, timeouts
    Transient,
}

impl ErrorKind {
    /// Whether a later cycle can expect a different result without anyone
    /// changing anything.
    pub fn should_retry(&self) -> bool {
        matches!(self, ErrorKind::Transient)
    }
}

/// Why an automated action did not complete.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ActionError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("authentication error: {0}")]
    Authentication(String),

    #[error("blocked by subscription: {0}")]
    Subscription(String),

    #[error("transient provider error: {0}")]
    Transient(String),
}

impl ActionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ActionError::Configuration(_) => ErrorKind::Configuration,
            ActionError::Authentication(_) => ErrorKind::Authentication,
            ActionError::Subscription(_) => ErrorKind::Subscription,
            ActionError::Transient(_) => ErrorKind::Transient,
        }
    }

    /// Classify a failed external call.
    ///
    /// Publisher adapters attach a [`PublishError`]; timeouts carry
    /// [`TimedOut`]. Anything unclassified is treated as transient.
    pub fn from_provider(err: &anyhow::Error) -> Self {
        if let Some(publish) = err.downcast_ref::<PublishError>() {
            return match publish {
                PublishError::Transient(msg) => ActionError::Transient(msg.clone()),
                p if p.is_auth_failure() => ActionError::Authentication(p.to_string()),
                p => ActionError::Configuration(p.to_string()),
            };
        }
        if let Some(timed_out) = err.downcast_ref::<TimedOut>() {
            return ActionError::Transient(timed_out.to_string());
        }
        ActionError::Transient(format!("{err:#}"))
    }
}
