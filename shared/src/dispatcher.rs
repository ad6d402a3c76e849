use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::{
    user_fingerprint, AuthOutcome, CognitoMigrateUserEvent, CredentialBroker, CredentialProvider,
    DelegatedAuthenticator, MigrationConfig, MigrationError, MigrationEvent, MigrationResponse,
    MigrationResult, Password, ResponseMapper, RetryPolicy, SourcePool, TransientCause, TriggerKind,
};

/// Entry point for one migration trigger invocation.
///
/// Built once per execution context; the credential cache inside the broker
/// is the only state shared between invocations.
pub struct MigrationHandler {
    broker: CredentialBroker,
    authenticator: DelegatedAuthenticator,
    mapper: ResponseMapper,
    retry: RetryPolicy,
    report_disabled_users: bool,
}

impl MigrationHandler {
    pub fn new(
        config: &MigrationConfig,
        credential_provider: Arc<dyn CredentialProvider>,
        source_pool: Arc<dyn SourcePool>,
    ) -> Self {
        Self {
            broker: CredentialBroker::new(
                credential_provider,
                config.source_role_arn.clone(),
                config.role_session_name.clone(),
                config.credential_safety_margin,
            ),
            authenticator: DelegatedAuthenticator::new(source_pool),
            mapper: ResponseMapper::new(config.migrated_attributes.iter().cloned()),
            retry: RetryPolicy::new(config.max_attempts, config.retry_base_delay),
            report_disabled_users: config.report_disabled_users,
        }
    }

    pub fn report_disabled_users(&self) -> bool {
        self.report_disabled_users
    }

    /// Validate the raw Cognito event and run the migration for it.
    pub async fn dispatch(
        &self,
        raw: &CognitoMigrateUserEvent,
        deadline: Instant,
    ) -> MigrationResult<MigrationResponse> {
        let event = parse_event(raw).map_err(|e| {
            error!("Rejecting malformed migration event: {}", e);
            e
        })?;
        self.handle(&event, deadline).await
    }

    /// Run one migration, failing closed on every path but a verified user.
    pub async fn handle(&self, event: &MigrationEvent, deadline: Instant) -> MigrationResult<MigrationResponse> {
        let user_ref = user_fingerprint(&event.username);
        info!(
            "Migration requested - Trigger: {}, User: {}, Pool: {}, Client: {}",
            event.trigger_kind, user_ref, event.pool_id, event.client_id
        );

        let (result, attempts) = self.run_migration(event, deadline).await;

        match &result {
            Ok(response) => info!(
                trigger = %event.trigger_kind,
                user = %user_ref,
                outcome = "migrated",
                attempts,
                final_user_status = response.final_user_status().as_str(),
                "Migration succeeded"
            ),
            Err(e) => warn!(
                trigger = %event.trigger_kind,
                user = %user_ref,
                outcome = e.kind(),
                attempts,
                "Migration denied: {}",
                e
            ),
        }
        result
    }

    /// Returns the result with the number of attempts started, including one
    /// cut short by the deadline.
    async fn run_migration(&self, event: &MigrationEvent, deadline: Instant) -> (MigrationResult<MigrationResponse>, u32) {
        let attempts = AtomicU32::new(0);
        let outcome = tokio::time::timeout_at(deadline, self.authenticate_with_retry(event, deadline, &attempts)).await;

        let result = match outcome {
            Ok(outcome) => outcome.and_then(|outcome| self.mapper.map(event.trigger_kind, outcome)),
            Err(_) => Err(MigrationError::TransientFailure(TransientCause::DeadlineExceeded)),
        };
        (result, attempts.load(Ordering::SeqCst))
    }

    async fn authenticate_with_retry(
        &self,
        event: &MigrationEvent,
        deadline: Instant,
        attempts: &AtomicU32,
    ) -> MigrationResult<AuthOutcome> {
        let (result, _) = self
            .retry
            .run(deadline, |attempt| async move {
                attempts.store(attempt, Ordering::SeqCst);

                // Credentials are always re-checked before the delegated call.
                let credentials = self.broker.acquire().await?;
                let outcome = self.authenticator.authenticate(event, &credentials).await?;
                debug!("Attempt {} classified as {}", attempt, outcome.label());

                match outcome {
                    AuthOutcome::TransientFailure { cause } => {
                        if cause == TransientCause::ExpiredCredentials {
                            self.broker.invalidate(&credentials);
                        }
                        warn!("Attempt {} hit a transient failure: {}", attempt, cause);
                        Err(MigrationError::TransientFailure(cause))
                    }
                    other => Ok(other),
                }
            })
            .await;
        result
    }
}

/// Check the inbound event shape and build the validated [`MigrationEvent`].
pub fn parse_event(raw: &CognitoMigrateUserEvent) -> MigrationResult<MigrationEvent> {
    let trigger_source = raw
        .trigger_source
        .as_deref()
        .ok_or_else(|| MigrationError::InvalidEvent("triggerSource missing".to_string()))?;

    // An unknown trigger means the function is wired to the wrong hook.
    let trigger_kind = TriggerKind::from_trigger_source(trigger_source).ok_or_else(|| {
        MigrationError::Configuration(format!("unsupported trigger source: {}", trigger_source))
    })?;

    let username = required_field(raw.user_name.as_deref(), "userName")?;
    let pool_id = required_field(raw.user_pool_id.as_deref(), "userPoolId")?;
    let client_id = required_field(raw.caller_context.client_id.as_deref(), "callerContext.clientId")?;

    let password = match trigger_kind {
        TriggerKind::Authentication => {
            let password = raw
                .request
                .password
                .as_deref()
                .filter(|password| !password.is_empty())
                .ok_or_else(|| MigrationError::InvalidEvent("password missing for authentication trigger".to_string()))?;
            Some(Password::new(password))
        }
        // Existence check only; a password is never forwarded on this path.
        TriggerKind::ForgotPassword => None,
    };

    Ok(MigrationEvent {
        username,
        password,
        trigger_kind,
        pool_id,
        client_id,
    })
}

fn required_field(value: Option<&str>, name: &str) -> MigrationResult<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .ok_or_else(|| MigrationError::InvalidEvent(format!("{} missing", name)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        CredentialError, DelegatedCredentials, PasswordAuthReply, ProviderError, ProviderErrorKind, SourceUser,
    };
    use async_trait::async_trait;
    use chrono::Utc;
    use std::collections::HashMap;
    use std::time::Duration;

    struct StaticCredentials;

    #[async_trait]
    impl CredentialProvider for StaticCredentials {
        async fn assume_role(&self, _: &str, _: &str) -> Result<DelegatedCredentials, CredentialError> {
            Ok(DelegatedCredentials::new(
                "ASIA0",
                "secret",
                "token",
                Utc::now() + chrono::Duration::hours(1),
            ))
        }
    }

    /// Every call stalls, then times out.
    struct StallingPool {
        stall: Duration,
    }

    #[async_trait]
    impl SourcePool for StallingPool {
        async fn initiate_password_auth(
            &self,
            _: &DelegatedCredentials,
            _: &str,
            _: &Password,
        ) -> Result<PasswordAuthReply, ProviderError> {
            tokio::time::sleep(self.stall).await;
            Err(ProviderError::transport(ProviderErrorKind::Timeout, "request timed out"))
        }

        async fn get_user(&self, _: &DelegatedCredentials, _: &str) -> Result<SourceUser, ProviderError> {
            tokio::time::sleep(self.stall).await;
            Err(ProviderError::transport(ProviderErrorKind::Timeout, "request timed out"))
        }
    }

    fn stalling_handler(stall: Duration) -> MigrationHandler {
        let env: HashMap<String, String> = [
            ("SOURCE_USER_POOL_ID", "eu-west-1_Source"),
            ("SOURCE_APP_CLIENT_ID", "source-client"),
            ("SOURCE_REGION", "eu-west-1"),
            ("SOURCE_ROLE_ARN", "arn:aws:iam::111111111111:role/cognito_migration_users"),
            ("MAX_ATTEMPTS", "5"),
            ("RETRY_BASE_DELAY_MS", "0"),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        let config = MigrationConfig::from_map(&env).unwrap();
        MigrationHandler::new(&config, Arc::new(StaticCredentials), Arc::new(StallingPool { stall }))
    }

    fn auth_event() -> MigrationEvent {
        parse_event(&raw_event("UserMigration_Authentication", Some("correct"))).unwrap()
    }

    #[tokio::test]
    async fn test_deadline_counts_interrupted_attempt() {
        let handler = stalling_handler(Duration::from_millis(500));
        let deadline = Instant::now() + Duration::from_millis(50);

        let (result, attempts) = handler.run_migration(&auth_event(), deadline).await;

        assert_eq!(
            result.unwrap_err(),
            MigrationError::TransientFailure(TransientCause::DeadlineExceeded)
        );
        assert_eq!(attempts, 1);
    }

    #[tokio::test]
    async fn test_deadline_counts_retried_attempts() {
        let handler = stalling_handler(Duration::from_millis(30));
        let deadline = Instant::now() + Duration::from_millis(75);

        let (result, attempts) = handler.run_migration(&auth_event(), deadline).await;

        assert_eq!(
            result.unwrap_err(),
            MigrationError::TransientFailure(TransientCause::DeadlineExceeded)
        );
        assert!(attempts >= 2, "attempts = {}", attempts);
    }

    fn raw_event(trigger_source: &str, password: Option<&str>) -> CognitoMigrateUserEvent {
        let mut event = CognitoMigrateUserEvent {
            trigger_source: Some(trigger_source.to_string()),
            user_pool_id: Some("eu-west-1_Dest".to_string()),
            user_name: Some("alice".to_string()),
            ..Default::default()
        };
        event.caller_context.client_id = Some("dest-client".to_string());
        event.request.password = password.map(str::to_string);
        event
    }

    #[test]
    fn test_parse_authentication_event() {
        let event = parse_event(&raw_event("UserMigration_Authentication", Some("correct"))).unwrap();

        assert_eq!(event.trigger_kind, TriggerKind::Authentication);
        assert_eq!(event.username, "alice");
        assert_eq!(event.pool_id, "eu-west-1_Dest");
        assert_eq!(event.client_id, "dest-client");
        assert_eq!(event.password.as_ref().map(Password::expose), Some("correct"));
    }

    #[test]
    fn test_forgot_password_drops_password() {
        let event = parse_event(&raw_event("UserMigration_ForgotPassword", Some("ignored"))).unwrap();
        assert_eq!(event.trigger_kind, TriggerKind::ForgotPassword);
        assert!(event.password.is_none());
    }

    #[test]
    fn test_unknown_trigger_is_configuration_error() {
        let err = parse_event(&raw_event("PreSignUp_SignUp", Some("x"))).unwrap_err();
        assert!(matches!(err, MigrationError::Configuration(_)));
    }

    #[test]
    fn test_missing_fields_are_rejected() {
        let err = parse_event(&raw_event("UserMigration_Authentication", None)).unwrap_err();
        assert!(matches!(err, MigrationError::InvalidEvent(_)));

        let err = parse_event(&raw_event("UserMigration_Authentication", Some(""))).unwrap_err();
        assert!(matches!(err, MigrationError::InvalidEvent(_)));

        let mut event = raw_event("UserMigration_Authentication", Some("x"));
        event.user_name = Some("  ".to_string());
        assert!(matches!(parse_event(&event), Err(MigrationError::InvalidEvent(_))));

        let mut event = raw_event("UserMigration_Authentication", Some("x"));
        event.caller_context.client_id = None;
        assert!(matches!(parse_event(&event), Err(MigrationError::InvalidEvent(_))));
    }
}
