//! Crate-wide error types.

use thiserror::Error;

/// Crate-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Failure to translate between the wire schema and the internal model.
///
/// Always names the offending field so that contract violations with the
/// host can be traced back to the payload that caused them.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MappingError {
    #[error("{entity}: missing required field `{field}`")]
    MissingField {
        entity: &'static str,
        field: &'static str,
    },

    #[error("{entity}: invalid value for field `{field}`: {reason}")]
    InvalidField {
        entity: &'static str,
        field: &'static str,
        reason: String,
    },
}

impl MappingError {
    pub fn missing(entity: &'static str, field: &'static str) -> Self {
        Self::MissingField { entity, field }
    }

    pub fn invalid(entity: &'static str, field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            entity,
            field,
            reason: reason.into(),
        }
    }

    /// Name of the field the error refers to.
    pub fn field(&self) -> &'static str {
        match self {
            Self::MissingField { field, .. } | Self::InvalidField { field, .. } => field,
        }
    }
}

/// Crate-wide error type.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Mapping error: {0}")]
    Mapping(#[from] MappingError),

    #[error("Fetch failed ({command}): {message}")]
    Fetch { command: String, message: String },

    #[error("Batch flush failed for profile {profile_id} ({} ids): {message}", failed.len())]
    BatchFlush {
        profile_id: String,
        failed: Vec<String>,
        message: String,
    },

    #[error("Push subscription unavailable: {0}")]
    Subscription(String),

    #[error("Host command {command} failed: {message}")]
    Host { command: String, message: String },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn host(command: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Host {
            command: command.into(),
            message: message.into(),
        }
    }

    pub fn fetch(command: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Fetch {
            command: command.into(),
            message: message.into(),
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Re-tags a raw host failure as a fetch failure. Other errors pass through.
    pub fn into_fetch(self) -> Self {
        match self {
            Self::Host { command, message } => Self::Fetch { command, message },
            other => other,
        }
    }

    /// Whether this error is a contract violation that must propagate
    /// instead of being recorded as UI state.
    pub fn is_contract_violation(&self) -> bool {
        matches!(self, Self::Mapping(_))
    }
}
