use std::collections::HashMap;
use std::time::Duration;

use crate::{MigrationError, MigrationResult};

pub const DEFAULT_ROLE_SESSION_NAME: &str = "cognito-user-migration";

pub const DEFAULT_MIGRATED_ATTRIBUTES: &[&str] = &[
    "email",
    "email_verified",
    "phone_number",
    "phone_number_verified",
    "name",
    "given_name",
    "family_name",
    "preferred_username",
    "locale",
    "zoneinfo",
];

/// Settings for the migration handler, read once at cold start.
///
/// The four `SOURCE_*` values come from the provisioning stack; everything
/// else has a default.
#[derive(Debug, Clone)]
pub struct MigrationConfig {
    pub source_user_pool_id: String,
    pub source_app_client_id: String,
    pub source_region: String,
    pub source_role_arn: String,
    pub role_session_name: String,
    pub credential_duration: Duration,
    pub credential_safety_margin: Duration,
    pub migrated_attributes: Vec<String>,
    pub report_disabled_users: bool,
    pub max_attempts: u32,
    pub retry_base_delay: Duration,
    pub deadline_buffer: Duration,
}

impl MigrationConfig {
    /// Create config from the Lambda environment variables set by CDK.
    pub fn from_env() -> MigrationResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_map(values: &HashMap<String, String>) -> MigrationResult<Self> {
        Self::from_lookup(|key| values.get(key).cloned())
    }

    pub fn from_lookup<F>(lookup: F) -> MigrationResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| -> MigrationResult<String> {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
                .ok_or_else(|| MigrationError::Configuration(format!("{} not set", key)))
        };

        let source_user_pool_id = required("SOURCE_USER_POOL_ID")?;
        let source_app_client_id = required("SOURCE_APP_CLIENT_ID")?;
        let source_region = required("SOURCE_REGION")?;
        let source_role_arn = required("SOURCE_ROLE_ARN")?;

        if !source_role_arn.starts_with("arn:") || !source_role_arn.contains(":role/") {
            return Err(MigrationError::Configuration(format!(
                "SOURCE_ROLE_ARN is not a role ARN: {}",
                source_role_arn
            )));
        }

        let role_session_name = lookup("ROLE_SESSION_NAME")
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_ROLE_SESSION_NAME.to_string());
        validate_session_name(&role_session_name)?;

        let credential_duration =
            Duration::from_secs(parse_bounded(&lookup, "CREDENTIAL_DURATION_SECS", 3600, 900, 43_200)?);
        let credential_safety_margin =
            Duration::from_secs(parse_bounded(&lookup, "CREDENTIAL_SAFETY_MARGIN_SECS", 300, 0, 3600)?);
        if credential_safety_margin >= credential_duration {
            return Err(MigrationError::Configuration(
                "CREDENTIAL_SAFETY_MARGIN_SECS must be shorter than CREDENTIAL_DURATION_SECS".to_string(),
            ));
        }

        let migrated_attributes = match lookup("MIGRATED_ATTRIBUTES") {
            Some(raw) if !raw.trim().is_empty() => raw
                .split(',')
                .map(|name| name.trim().to_string())
                .filter(|name| !name.is_empty())
                .collect::<Vec<_>>(),
            _ => DEFAULT_MIGRATED_ATTRIBUTES.iter().map(|name| name.to_string()).collect(),
        };
        if migrated_attributes.iter().any(|name| name == "sub") {
            return Err(MigrationError::Configuration(
                "MIGRATED_ATTRIBUTES must not contain 'sub'; the destination pool assigns its own".to_string(),
            ));
        }

        let report_disabled_users = match lookup("REPORT_DISABLED_USERS").as_deref().map(str::trim) {
            None | Some("") => false,
            Some(value) => parse_bool("REPORT_DISABLED_USERS", value)?,
        };

        let max_attempts = parse_bounded(&lookup, "MAX_ATTEMPTS", 3, 1, 5)? as u32;
        let retry_base_delay = Duration::from_millis(parse_bounded(&lookup, "RETRY_BASE_DELAY_MS", 100, 0, 2000)?);
        let deadline_buffer = Duration::from_millis(parse_bounded(&lookup, "DEADLINE_BUFFER_MS", 250, 0, 2000)?);

        Ok(Self {
            source_user_pool_id,
            source_app_client_id,
            source_region,
            source_role_arn,
            role_session_name,
            credential_duration,
            credential_safety_margin,
            migrated_attributes,
            report_disabled_users,
            max_attempts,
            retry_base_delay,
            deadline_buffer,
        })
    }
}

fn parse_bounded<F>(lookup: &F, key: &str, default: u64, min: u64, max: u64) -> MigrationResult<u64>
where
    F: Fn(&str) -> Option<String>,
{
    let value = match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw.trim().parse::<u64>().map_err(|e| {
            MigrationError::Configuration(format!("{} is not a number ({}): {}", key, raw, e))
        })?,
        _ => default,
    };

    if value < min || value > max {
        return Err(MigrationError::Configuration(format!(
            "{} must be between {} and {}, got {}",
            key, min, max, value
        )));
    }
    Ok(value)
}

fn parse_bool(key: &str, value: &str) -> MigrationResult<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(MigrationError::Configuration(format!("{} is not a boolean: {}", key, value))),
    }
}

// STS accepts 2-64 characters from [\w+=,.@-].
fn validate_session_name(name: &str) -> MigrationResult<()> {
    let valid_chars = name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || "_+=,.@-".contains(c));
    if name.len() < 2 || name.len() > 64 || !valid_chars {
        return Err(MigrationError::Configuration(format!(
            "ROLE_SESSION_NAME is not a valid STS session name: {}",
            name
        )));
    }
    Ok(())
}
