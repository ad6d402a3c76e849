use std::collections::{HashMap, HashSet};

use crate::{
    AuthOutcome, FinalUserStatus, MigrationError, MigrationResponse, MigrationResult, SourceUserStatus,
    TriggerKind,
};

// Cognito rejects custom attribute values beyond this length.
const MAX_ATTRIBUTE_VALUE_LEN: usize = 2048;

/// Turns a classified outcome into the record the destination pool creates,
/// or into the error that makes it deny the sign-in.
pub struct ResponseMapper {
    allowed_attributes: HashSet<String>,
}

impl ResponseMapper {
    pub fn new<I>(allowed_attributes: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        Self {
            allowed_attributes: allowed_attributes
                .into_iter()
                .filter(|name| name != "sub")
                .collect(),
        }
    }

    pub fn map(&self, trigger_kind: TriggerKind, outcome: AuthOutcome) -> MigrationResult<MigrationResponse> {
        let (source_attributes, user_status) = match outcome {
            AuthOutcome::Authenticated {
                user_attributes,
                user_status,
            } => (user_attributes, user_status),
            AuthOutcome::InvalidCredentials => return Err(MigrationError::InvalidCredentials),
            AuthOutcome::UserNotFound => return Err(MigrationError::UserNotFound),
            AuthOutcome::UserDisabled => return Err(MigrationError::UserDisabled),
            AuthOutcome::TransientFailure { cause } => return Err(MigrationError::TransientFailure(cause)),
        };

        let final_user_status = match (trigger_kind, user_status) {
            (TriggerKind::ForgotPassword, _) => FinalUserStatus::ResetRequired,
            (TriggerKind::Authentication, SourceUserStatus::ForceChangePassword) => FinalUserStatus::ResetRequired,
            (TriggerKind::Authentication, SourceUserStatus::Confirmed) => FinalUserStatus::Confirmed,
        };

        let user_attributes = self.filter_attributes(source_attributes);
        validate(&user_attributes, final_user_status)?;

        Ok(MigrationResponse::new(user_attributes, final_user_status))
    }

    fn filter_attributes(&self, source: HashMap<String, String>) -> HashMap<String, String> {
        source
            .into_iter()
            .filter(|(name, _)| self.allowed_attributes.contains(name))
            .collect()
    }
}

fn validate(attributes: &HashMap<String, String>, final_user_status: FinalUserStatus) -> MigrationResult<()> {
    for (name, value) in attributes {
        if value.is_empty() {
            return Err(MigrationError::InvalidResponse(format!("attribute {} is empty", name)));
        }
        if value.chars().count() > MAX_ATTRIBUTE_VALUE_LEN {
            return Err(MigrationError::InvalidResponse(format!(
                "attribute {} exceeds {} characters",
                name, MAX_ATTRIBUTE_VALUE_LEN
            )));
        }
    }

    // A reset code is only delivered to a verified address.
    if final_user_status == FinalUserStatus::ResetRequired
        && !has_verified(attributes, "email", "email_verified")
        && !has_verified(attributes, "phone_number", "phone_number_verified")
    {
        return Err(MigrationError::InvalidResponse(
            "password reset requires a verified email or phone_number".to_string(),
        ));
    }

    Ok(())
}

fn has_verified(attributes: &HashMap<String, String>, address: &str, flag: &str) -> bool {
    attributes.contains_key(address)
        && attributes
            .get(flag)
            .map_or(false, |verified| verified.eq_ignore_ascii_case("true"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TransientCause;

    fn mapper() -> ResponseMapper {
        ResponseMapper::new(vec![
            "email".to_string(),
            "email_verified".to_string(),
            "phone_number".to_string(),
            "phone_number_verified".to_string(),
        ])
    }

    fn authenticated(pairs: &[(&str, &str)], user_status: SourceUserStatus) -> AuthOutcome {
        AuthOutcome::Authenticated {
            user_attributes: pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
            user_status,
        }
    }

    #[test]
    fn test_only_allow_listed_attributes_are_copied() {
        let outcome = authenticated(
            &[
                ("email", "a@x.com"),
                ("email_verified", "true"),
                ("sub", "1234-abcd"),
                ("custom:internal_score", "42"),
            ],
            SourceUserStatus::Confirmed,
        );

        let response = mapper().map(TriggerKind::Authentication, outcome).unwrap();

        let mut keys: Vec<_> = response.user_attributes().keys().cloned().collect();
        keys.sort();
        assert_eq!(keys, vec!["email".to_string(), "email_verified".to_string()]);
        assert_eq!(response.final_user_status(), FinalUserStatus::Confirmed);
    }

    #[test]
    fn test_sub_is_never_allowed() {
        let mapper = ResponseMapper::new(vec!["email".to_string(), "sub".to_string()]);
        let outcome = authenticated(&[("email", "a@x.com"), ("sub", "1234")], SourceUserStatus::Confirmed);

        let response = mapper.map(TriggerKind::Authentication, outcome).unwrap();
        assert!(!response.user_attributes().contains_key("sub"));
    }

    #[test]
    fn test_every_other_outcome_is_rejected() {
        let rejections = vec![
            (AuthOutcome::InvalidCredentials, MigrationError::InvalidCredentials),
            (AuthOutcome::UserNotFound, MigrationError::UserNotFound),
            (AuthOutcome::UserDisabled, MigrationError::UserDisabled),
            (
                AuthOutcome::TransientFailure { cause: TransientCause::Timeout },
                MigrationError::TransientFailure(TransientCause::Timeout),
            ),
        ];

        for (outcome, expected) in rejections {
            for kind in [TriggerKind::Authentication, TriggerKind::ForgotPassword] {
                assert_eq!(mapper().map(kind, outcome.clone()).unwrap_err(), expected);
            }
        }
    }

    #[test]
    fn test_force_change_password_maps_to_reset_required() {
        let outcome = authenticated(
            &[("email", "a@x.com"), ("email_verified", "true")],
            SourceUserStatus::ForceChangePassword,
        );
        let response = mapper().map(TriggerKind::Authentication, outcome).unwrap();
        assert_eq!(response.final_user_status(), FinalUserStatus::ResetRequired);
    }

    #[test]
    fn test_reset_without_delivery_address_is_rejected() {
        let outcome = authenticated(&[("email_verified", "true")], SourceUserStatus::Confirmed);
        let err = mapper().map(TriggerKind::ForgotPassword, outcome).unwrap_err();
        assert!(matches!(err, MigrationError::InvalidResponse(_)));
    }

    #[test]
    fn test_reset_requires_verified_address() {
        let unverified = authenticated(
            &[("email", "a@x.com"), ("email_verified", "false"), ("phone_number", "+447700900123")],
            SourceUserStatus::Confirmed,
        );
        let err = mapper().map(TriggerKind::ForgotPassword, unverified).unwrap_err();
        assert!(matches!(err, MigrationError::InvalidResponse(_)));

        let verified_phone = authenticated(
            &[
                ("email", "a@x.com"),
                ("phone_number", "+447700900123"),
                ("phone_number_verified", "true"),
            ],
            SourceUserStatus::Confirmed,
        );
        let response = mapper().map(TriggerKind::ForgotPassword, verified_phone).unwrap();
        assert_eq!(response.final_user_status(), FinalUserStatus::ResetRequired);
    }

    #[test]
    fn test_oversized_attribute_is_rejected() {
        let long = "x".repeat(MAX_ATTRIBUTE_VALUE_LEN + 1);
        let outcome = authenticated(&[("email", long.as_str())], SourceUserStatus::Confirmed);
        assert!(mapper().map(TriggerKind::Authentication, outcome).is_err());
    }
}
