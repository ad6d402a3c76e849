use std::sync::Arc;
use tracing::{info, warn};

use crate::{
    user_fingerprint, AuthOutcome, DelegatedCredentials, MigrationError, MigrationEvent, MigrationResult,
    PasswordAuthReply, ProviderError, ProviderErrorKind, SourcePool, SourceUser, SourceUserStatus,
    TransientCause, TriggerKind,
};

const NEW_PASSWORD_REQUIRED: &str = "NEW_PASSWORD_REQUIRED";

/// Authenticates users against the source pool and classifies every reply
/// into an [`AuthOutcome`].
///
/// This is the only place that knows the provider's error vocabulary.
/// `Err` is reserved for failures that point at a misconfiguration rather
/// than at the user or a transient hiccup.
pub struct DelegatedAuthenticator {
    source_pool: Arc<dyn SourcePool>,
}

impl DelegatedAuthenticator {
    pub fn new(source_pool: Arc<dyn SourcePool>) -> Self {
        Self { source_pool }
    }

    pub async fn authenticate(
        &self,
        event: &MigrationEvent,
        credentials: &DelegatedCredentials,
    ) -> MigrationResult<AuthOutcome> {
        match event.trigger_kind {
            TriggerKind::Authentication => self.authenticate_password(event, credentials).await,
            TriggerKind::ForgotPassword => self.lookup_user(event, credentials).await,
        }
    }

    async fn authenticate_password(
        &self,
        event: &MigrationEvent,
        credentials: &DelegatedCredentials,
    ) -> MigrationResult<AuthOutcome> {
        let password = event
            .password
            .as_ref()
            .filter(|password| !password.is_empty())
            .ok_or_else(|| MigrationError::InvalidEvent("password missing for authentication trigger".to_string()))?;

        let reply = match self
            .source_pool
            .initiate_password_auth(credentials, &event.username, password)
            .await
        {
            Ok(reply) => reply,
            Err(e) => return classify_error(&e),
        };

        let user_status = match reply {
            PasswordAuthReply::Completed => SourceUserStatus::Confirmed,
            PasswordAuthReply::Challenge(challenge) if challenge == NEW_PASSWORD_REQUIRED => {
                SourceUserStatus::ForceChangePassword
            }
            PasswordAuthReply::Challenge(challenge) => {
                warn!(
                    "Source pool answered user {} with unsupported challenge {}",
                    user_fingerprint(&event.username),
                    challenge
                );
                return Ok(AuthOutcome::InvalidCredentials);
            }
        };

        // Password verified; fetch the attributes to migrate.
        let user = match self.source_pool.get_user(credentials, &event.username).await {
            Ok(user) => user,
            Err(e) => return classify_error(&e),
        };
        if !user.enabled {
            return Ok(AuthOutcome::UserDisabled);
        }

        Ok(AuthOutcome::Authenticated {
            user_attributes: user.attributes,
            user_status,
        })
    }

    async fn lookup_user(
        &self,
        event: &MigrationEvent,
        credentials: &DelegatedCredentials,
    ) -> MigrationResult<AuthOutcome> {
        let user = match self.source_pool.get_user(credentials, &event.username).await {
            Ok(user) => user,
            Err(e) => return classify_error(&e),
        };

        info!(
            "Source lookup for user {}: enabled={}, status={:?}",
            user_fingerprint(&event.username),
            user.enabled,
            user.status
        );
        Ok(classify_lookup(user))
    }
}

/// Existence check for the forgot-password path. No password is verified.
fn classify_lookup(user: SourceUser) -> AuthOutcome {
    if !user.enabled {
        return AuthOutcome::UserDisabled;
    }

    let user_status = match user.status.as_deref() {
        Some("CONFIRMED") | Some("RESET_REQUIRED") | None => SourceUserStatus::Confirmed,
        Some("FORCE_CHANGE_PASSWORD") => SourceUserStatus::ForceChangePassword,
        Some("COMPROMISED") => return AuthOutcome::UserDisabled,
        // UNCONFIRMED, ARCHIVED, UNKNOWN, EXTERNAL_PROVIDER: nothing to migrate.
        Some(_) => return AuthOutcome::UserNotFound,
    };

    AuthOutcome::Authenticated {
        user_attributes: user.attributes,
        user_status,
    }
}

fn classify_error(error: &ProviderError) -> MigrationResult<AuthOutcome> {
    let transient = |cause| Ok(AuthOutcome::TransientFailure { cause });

    match error.kind {
        ProviderErrorKind::Timeout => return transient(TransientCause::Timeout),
        ProviderErrorKind::Dispatch | ProviderErrorKind::Response | ProviderErrorKind::Other => {
            return transient(TransientCause::Network)
        }
        ProviderErrorKind::Construction => {
            return Err(MigrationError::Configuration(format!("could not build source pool request: {}", error)))
        }
        ProviderErrorKind::Service => {}
    }

    let code = error.code.as_deref().unwrap_or_default();
    match code {
        "NotAuthorizedException" if error.message.to_ascii_lowercase().contains("disabled") => {
            Ok(AuthOutcome::UserDisabled)
        }
        "NotAuthorizedException"
        | "UserNotConfirmedException"
        | "PasswordResetRequiredException"
        | "InvalidPasswordException" => Ok(AuthOutcome::InvalidCredentials),
        "UserNotFoundException" => Ok(AuthOutcome::UserNotFound),
        "TooManyRequestsException" | "LimitExceededException" | "ThrottlingException" => {
            transient(TransientCause::Throttled)
        }
        "InternalErrorException" | "ServiceUnavailableException" | "InternalFailure" => {
            transient(TransientCause::ServiceUnavailable)
        }
        "ExpiredTokenException" | "UnrecognizedClientException" => {
            transient(TransientCause::ExpiredCredentials)
        }
        "ResourceNotFoundException"
        | "InvalidParameterException"
        | "InvalidUserPoolConfigurationException"
        | "AccessDeniedException" => Err(MigrationError::Configuration(format!(
            "source pool rejected the migration role or client: {}",
            error
        ))),
        _ if error.http_status.map_or(false, |status| status >= 500) => {
            transient(TransientCause::ServiceUnavailable)
        }
        _ => Err(MigrationError::UpstreamRejected(error.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn service(code: &str, message: &str) -> ProviderError {
        ProviderError::service(code, message, Some(400))
    }

    #[test]
    fn test_wrong_password_is_invalid_credentials() {
        let outcome = classify_error(&service("NotAuthorizedException", "Incorrect username or password.")).unwrap();
        assert_eq!(outcome, AuthOutcome::InvalidCredentials);
    }

    #[test]
    fn test_disabled_user_detected_from_not_authorized() {
        let outcome = classify_error(&service("NotAuthorizedException", "User is disabled.")).unwrap();
        assert_eq!(outcome, AuthOutcome::UserDisabled);
    }

    #[test]
    fn test_unknown_user() {
        let outcome = classify_error(&service("UserNotFoundException", "User does not exist.")).unwrap();
        assert_eq!(outcome, AuthOutcome::UserNotFound);
    }

    #[test]
    fn test_transient_classification() {
        let timeout = ProviderError::transport(ProviderErrorKind::Timeout, "timed out");
        assert_eq!(
            classify_error(&timeout).unwrap(),
            AuthOutcome::TransientFailure { cause: TransientCause::Timeout }
        );

        assert_eq!(
            classify_error(&service("TooManyRequestsException", "Rate exceeded")).unwrap(),
            AuthOutcome::TransientFailure { cause: TransientCause::Throttled }
        );

        let unknown_5xx = ProviderError::service("SomethingNew", "boom", Some(503));
        assert_eq!(
            classify_error(&unknown_5xx).unwrap(),
            AuthOutcome::TransientFailure { cause: TransientCause::ServiceUnavailable }
        );

        assert_eq!(
            classify_error(&service("ExpiredTokenException", "token expired")).unwrap(),
            AuthOutcome::TransientFailure { cause: TransientCause::ExpiredCredentials }
        );
    }

    #[test]
    fn test_misconfiguration_is_an_error() {
        let err = classify_error(&service("ResourceNotFoundException", "User pool client does not exist")).unwrap_err();
        assert!(matches!(err, MigrationError::Configuration(_)));

        let err = classify_error(&service("SomethingNew", "teapot")).unwrap_err();
        assert!(matches!(err, MigrationError::UpstreamRejected(_)));
    }

    #[test]
    fn test_lookup_statuses() {
        let user = |enabled: bool, status: &str| SourceUser {
            enabled,
            status: Some(status.to_string()),
            attributes: HashMap::new(),
        };

        assert!(matches!(
            classify_lookup(user(true, "CONFIRMED")),
            AuthOutcome::Authenticated { user_status: SourceUserStatus::Confirmed, .. }
        ));
        assert!(matches!(
            classify_lookup(user(true, "FORCE_CHANGE_PASSWORD")),
            AuthOutcome::Authenticated { user_status: SourceUserStatus::ForceChangePassword, .. }
        ));
        assert_eq!(classify_lookup(user(false, "CONFIRMED")), AuthOutcome::UserDisabled);
        assert_eq!(classify_lookup(user(true, "COMPROMISED")), AuthOutcome::UserDisabled);
        assert_eq!(classify_lookup(user(true, "UNCONFIRMED")), AuthOutcome::UserNotFound);
        assert_eq!(classify_lookup(user(true, "EXTERNAL_PROVIDER")), AuthOutcome::UserNotFound);
    }
}
