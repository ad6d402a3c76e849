use async_trait::async_trait;
use aws_sdk_sts::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_sts::operation::assume_role::AssumeRoleError;
use aws_sdk_sts::Client as StsClient;
use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::{CredentialError, CredentialProvider, DelegatedCredentials};

/// Assumes the source account's migration role through STS.
pub struct StsCredentialProvider {
    client: StsClient,
    duration: Duration,
}

impl StsCredentialProvider {
    pub fn new(client: StsClient, duration: Duration) -> Self {
        Self { client, duration }
    }
}

#[async_trait]
impl CredentialProvider for StsCredentialProvider {
    async fn assume_role(
        &self,
        role_arn: &str,
        session_name: &str,
    ) -> Result<DelegatedCredentials, CredentialError> {
        let output = self
            .client
            .assume_role()
            .role_arn(role_arn)
            .role_session_name(session_name)
            .duration_seconds(self.duration.as_secs().min(i32::MAX as u64) as i32)
            .send()
            .await
            .map_err(classify_assume_role_error)?;

        let credentials = output.credentials().ok_or_else(|| {
            CredentialError::InvalidResponse("AssumeRole response carried no credentials".to_string())
        })?;

        let expiration = credentials.expiration();
        let expires_at = DateTime::<Utc>::from_timestamp(expiration.secs(), expiration.subsec_nanos())
            .ok_or_else(|| {
                CredentialError::InvalidResponse(format!("Unrepresentable expiration: {:?}", expiration))
            })?;

        if let Some(assumed) = output.assumed_role_user() {
            tracing::info!("Assumed role as {}", assumed.arn());
        }

        Ok(DelegatedCredentials::new(
            credentials.access_key_id(),
            credentials.secret_access_key(),
            credentials.session_token(),
            expires_at,
        ))
    }
}

fn classify_assume_role_error<R>(err: SdkError<AssumeRoleError, R>) -> CredentialError
where
    R: std::fmt::Debug,
{
    let detail = DisplayErrorContext(&err).to_string();
    match &err {
        SdkError::ServiceError(service_err) => {
            let code = service_err.err().code().unwrap_or("UnknownServiceError");
            let message = service_err.err().message().unwrap_or("No error message provided");
            tracing::error!("STS AssumeRole failed - Error Code: {}, Message: {}", code, message);
            classify_service_code(code, message)
        }
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) | SdkError::ResponseError(_) => {
            tracing::error!("STS AssumeRole did not complete: {}", detail);
            CredentialError::Network(detail)
        }
        _ => {
            tracing::error!("STS AssumeRole could not be sent: {}", detail);
            CredentialError::InvalidResponse(detail)
        }
    }
}

fn classify_service_code(code: &str, message: &str) -> CredentialError {
    let detail = format!("{}: {}", code, message);
    match code {
        "AccessDenied" | "AccessDeniedException" | "RegionDisabledException"
        | "MalformedPolicyDocument" | "PackedPolicyTooLarge" | "ValidationError" => {
            CredentialError::Denied(detail)
        }
        "ExpiredToken" | "ExpiredTokenException" | "InvalidClientTokenId" | "UnrecognizedClientException" => {
            CredentialError::ExpiredIdentity(detail)
        }
        "Throttling" | "ThrottlingException" | "RequestLimitExceeded" => CredentialError::Throttled(detail),
        "InternalFailure" | "ServiceUnavailable" | "IDPCommunicationError" => {
            CredentialError::ServiceUnavailable(detail)
        }
        _ => CredentialError::Denied(detail),
    }
}
