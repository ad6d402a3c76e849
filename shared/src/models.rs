use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Which migration trigger the destination pool fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TriggerKind {
    Authentication,
    ForgotPassword,
}

impl TriggerKind {
    pub const AUTHENTICATION_SOURCE: &'static str = "UserMigration_Authentication";
    pub const FORGOT_PASSWORD_SOURCE: &'static str = "UserMigration_ForgotPassword";

    pub fn from_trigger_source(trigger_source: &str) -> Option<Self> {
        match trigger_source {
            Self::AUTHENTICATION_SOURCE => Some(TriggerKind::Authentication),
            Self::FORGOT_PASSWORD_SOURCE => Some(TriggerKind::ForgotPassword),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerKind::Authentication => "authentication",
            TriggerKind::ForgotPassword => "forgot_password",
        }
    }
}

impl fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A user-supplied password. Never printed, wiped on drop.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct Password(String);

impl Password {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Password(<redacted>)")
    }
}

/// Validated view of one migration invocation.
#[derive(Debug, Clone)]
pub struct MigrationEvent {
    pub username: String,
    /// Present only for [`TriggerKind::Authentication`].
    pub password: Option<Password>,
    pub trigger_kind: TriggerKind,
    pub pool_id: String,
    pub client_id: String,
}

/// Temporary credentials for the source account's migration role.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct DelegatedCredentials {
    access_key_id: String,
    secret_access_key: String,
    session_token: String,
    #[zeroize(skip)]
    expires_at: DateTime<Utc>,
}

impl DelegatedCredentials {
    pub fn new(
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
        session_token: impl Into<String>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            session_token: session_token.into(),
            expires_at,
        }
    }

    pub fn access_key_id(&self) -> &str {
        &self.access_key_id
    }

    pub fn secret_access_key(&self) -> &str {
        &self.secret_access_key
    }

    pub fn session_token(&self) -> &str {
        &self.session_token
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// True while `now < expires_at - safety_margin`.
    pub fn is_usable_at(&self, now: DateTime<Utc>, safety_margin: Duration) -> bool {
        (self.expires_at - now)
            .to_std()
            .map(|remaining| remaining > safety_margin)
            .unwrap_or(false)
    }
}

impl fmt::Debug for DelegatedCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DelegatedCredentials")
            .field("access_key_id", &"<redacted>")
            .field("secret_access_key", &"<redacted>")
            .field("session_token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Account state reported by the source pool for an authenticated user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceUserStatus {
    Confirmed,
    ForceChangePassword,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransientCause {
    Timeout,
    Throttled,
    ServiceUnavailable,
    Network,
    /// The source pool no longer accepts the assumed-role session.
    ExpiredCredentials,
    DeadlineExceeded,
}

impl fmt::Display for TransientCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            TransientCause::Timeout => "source pool timed out",
            TransientCause::Throttled => "source pool throttled the request",
            TransientCause::ServiceUnavailable => "source pool unavailable",
            TransientCause::Network => "network failure reaching source pool",
            TransientCause::ExpiredCredentials => "delegated credentials rejected as expired",
            TransientCause::DeadlineExceeded => "invocation deadline exceeded",
        };
        f.write_str(text)
    }
}

/// Result of delegated authentication against the source pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome {
    Authenticated {
        user_attributes: HashMap<String, String>,
        user_status: SourceUserStatus,
    },
    InvalidCredentials,
    UserNotFound,
    UserDisabled,
    TransientFailure { cause: TransientCause },
}

impl AuthOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            AuthOutcome::Authenticated { .. } => "authenticated",
            AuthOutcome::InvalidCredentials => "invalid_credentials",
            AuthOutcome::UserNotFound => "user_not_found",
            AuthOutcome::UserDisabled => "user_disabled",
            AuthOutcome::TransientFailure { .. } => "transient_failure",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FinalUserStatus {
    #[serde(rename = "CONFIRMED")]
    Confirmed,
    #[serde(rename = "RESET_REQUIRED")]
    ResetRequired,
}

impl FinalUserStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FinalUserStatus::Confirmed => "CONFIRMED",
            FinalUserStatus::ResetRequired => "RESET_REQUIRED",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageAction {
    #[serde(rename = "SUPPRESS")]
    Suppress,
}

impl MessageAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageAction::Suppress => "SUPPRESS",
        }
    }
}

/// The user record handed back to the destination pool.
///
/// Only [`crate::ResponseMapper`] can build one, and only from
/// [`AuthOutcome::Authenticated`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationResponse {
    user_attributes: HashMap<String, String>,
    final_user_status: FinalUserStatus,
    message_action: MessageAction,
}

impl MigrationResponse {
    pub(crate) fn new(
        user_attributes: HashMap<String, String>,
        final_user_status: FinalUserStatus,
    ) -> Self {
        Self {
            user_attributes,
            final_user_status,
            message_action: MessageAction::Suppress,
        }
    }

    pub fn user_attributes(&self) -> &HashMap<String, String> {
        &self.user_attributes
    }

    pub fn final_user_status(&self) -> FinalUserStatus {
        self.final_user_status
    }

    pub fn message_action(&self) -> MessageAction {
        self.message_action
    }
}
