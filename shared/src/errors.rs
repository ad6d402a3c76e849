use thiserror::Error;

use crate::TransientCause;

/// Failure to obtain cross-account credentials from the token service.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CredentialError {
    #[error("Role assumption denied: {0}")]
    Denied(String),

    #[error("Local identity expired: {0}")]
    ExpiredIdentity(String),

    #[error("Token service throttled: {0}")]
    Throttled(String),

    #[error("Token service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Token service unreachable: {0}")]
    Network(String),

    #[error("Invalid token service response: {0}")]
    InvalidResponse(String),
}

impl CredentialError {
    /// Whether another attempt within the same invocation may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            CredentialError::Throttled(_)
                | CredentialError::ServiceUnavailable(_)
                | CredentialError::Network(_)
        )
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MigrationError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid event: {0}")]
    InvalidEvent(String),

    #[error("Credential error: {0}")]
    Credential(#[from] CredentialError),

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("User not found")]
    UserNotFound,

    #[error("User disabled")]
    UserDisabled,

    #[error("Transient failure: {0}")]
    TransientFailure(TransientCause),

    #[error("Source pool rejected the request: {0}")]
    UpstreamRejected(String),

    #[error("Invalid migration response: {0}")]
    InvalidResponse(String),
}

impl MigrationError {
    pub fn is_retryable(&self) -> bool {
        match self {
            MigrationError::TransientFailure(cause) => *cause != TransientCause::DeadlineExceeded,
            MigrationError::Credential(err) => err.is_transient(),
            _ => false,
        }
    }

    /// Short label for structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            MigrationError::Configuration(_) => "configuration_error",
            MigrationError::InvalidEvent(_) => "invalid_event",
            MigrationError::Credential(_) => "credential_error",
            MigrationError::InvalidCredentials => "invalid_credentials",
            MigrationError::UserNotFound => "user_not_found",
            MigrationError::UserDisabled => "user_disabled",
            MigrationError::TransientFailure(_) => "transient_failure",
            MigrationError::UpstreamRejected(_) => "upstream_rejected",
            MigrationError::InvalidResponse(_) => "invalid_response",
        }
    }

    /// Message surfaced to the invoking pool. Internal classification stays
    /// in the logs unless disabled users are explicitly reported.
    pub fn denial_message(&self, report_disabled_users: bool) -> &'static str {
        match self {
            MigrationError::UserDisabled if report_disabled_users => "User is disabled",
            _ => "User migration denied",
        }
    }
}

pub type MigrationResult<T> = Result<T, MigrationError>;
