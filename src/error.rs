//! Error types for the dbt Cloud provider.

use thiserror::Error;

use crate::client::ClientError;
use crate::job_type::{TransitionError, UnknownJobCategory};
use crate::schema::Diagnostic;

/// Errors returned by provider operations.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The requested resource was not found.
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// A validation error occurred.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A single attribute holds a value that cannot be accepted.
    #[error("Invalid value for '{attribute}': {message}")]
    InvalidAttribute {
        /// Path of the offending attribute.
        attribute: String,
        /// What is wrong with it.
        message: String,
    },

    /// A configuration error occurred.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The requested resource type is unknown.
    #[error("Unknown resource type: {0}")]
    UnknownResource(String),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Resource already exists (create conflict).
    #[error("Resource already exists: {0}")]
    AlreadyExists(String),

    /// Permission denied (authentication/authorization failure).
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// dbt Cloud could not serve the request.
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    /// Operation not implemented.
    #[error("Unimplemented: {0}")]
    Unimplemented(String),

    /// dbt Cloud rejected the request.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl ProviderError {
    /// Get the error message as a string.
    pub fn message(&self) -> &str {
        match self {
            Self::NotFound(msg) => msg,
            Self::Validation(msg) => msg,
            Self::InvalidAttribute { message, .. } => message,
            Self::Configuration(msg) => msg,
            Self::UnknownResource(msg) => msg,
            Self::Serialization(_err) => "serialization error (see Debug output)",
            Self::AlreadyExists(msg) => msg,
            Self::PermissionDenied(msg) => msg,
            Self::Unavailable(msg) => msg,
            Self::Unimplemented(msg) => msg,
            Self::InvalidRequest(msg) => msg,
        }
    }

    /// Build an [`ProviderError::InvalidAttribute`].
    pub fn invalid_attribute(attribute: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidAttribute {
            attribute: attribute.into(),
            message: message.into(),
        }
    }

    /// The attribute path this error is about, if any.
    pub fn attribute(&self) -> Option<&str> {
        match self {
            Self::InvalidAttribute { attribute, .. } => Some(attribute),
            _ => None,
        }
    }

    /// Render the error as an error diagnostic.
    ///
    /// Attribute errors keep their path so the caller can point at the
    /// offending line of configuration.
    pub fn to_diagnostic(&self) -> Diagnostic {
        match self {
            Self::InvalidAttribute { attribute, message } => {
                Diagnostic::error(format!("Invalid value for attribute '{}'", attribute))
                    .with_detail(message.clone())
                    .with_attribute(attribute.clone())
            },
            other => Diagnostic::error(other.to_string()),
        }
    }
}

impl From<TransitionError> for ProviderError {
    fn from(err: TransitionError) -> Self {
        Self::invalid_attribute("job_type", err.to_string())
    }
}

impl From<UnknownJobCategory> for ProviderError {
    fn from(err: UnknownJobCategory) -> Self {
        Self::invalid_attribute("job_type", err.to_string())
    }
}

impl From<ClientError> for ProviderError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::NotFound(msg) => Self::NotFound(msg),
            ClientError::Unauthorized(msg) => Self::PermissionDenied(msg),
            ClientError::Conflict(msg) => Self::AlreadyExists(msg),
            ClientError::Api { status, message } if status >= 500 => {
                Self::Unavailable(format!("dbt Cloud returned {}: {}", status, message))
            },
            ClientError::Api { status, message } => {
                Self::InvalidRequest(format!("dbt Cloud returned {}: {}", status, message))
            },
            ClientError::Decode(err) => Self::Serialization(err),
        }
    }
}
