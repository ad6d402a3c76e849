use async_trait::async_trait;
use aws_sdk_cognitoidentityprovider::config::http::HttpResponse;
use aws_sdk_cognitoidentityprovider::config::retry::RetryConfig;
use aws_sdk_cognitoidentityprovider::config::{
    BehaviorVersion, Credentials, Region, SharedCredentialsProvider,
};
use aws_sdk_cognitoidentityprovider::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_cognitoidentityprovider::types::AuthFlowType;
use aws_sdk_cognitoidentityprovider::Client as CognitoClient;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::SystemTime;

use crate::{
    DelegatedCredentials, Password, PasswordAuthReply, ProviderError, ProviderErrorKind, SourcePool,
    SourceUser,
};

/// The source Cognito user pool, reached with assumed-role credentials.
pub struct CognitoSourcePool {
    user_pool_id: String,
    app_client_id: String,
    region: String,
    // Client built for the most recent credential set, keyed by access key id.
    client: Mutex<Option<(String, CognitoClient)>>,
}

impl CognitoSourcePool {
    pub fn new(user_pool_id: String, app_client_id: String, region: String) -> Self {
        Self {
            user_pool_id,
            app_client_id,
            region,
            client: Mutex::new(None),
        }
    }

    fn client_for(&self, credentials: &DelegatedCredentials) -> CognitoClient {
        let mut cached = self.client.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some((key_id, client)) = cached.as_ref() {
            if key_id == credentials.access_key_id() {
                return client.clone();
            }
        }

        let provider = Credentials::new(
            credentials.access_key_id(),
            credentials.secret_access_key(),
            Some(credentials.session_token().to_string()),
            Some(SystemTime::from(credentials.expires_at())),
            "source-migration-role",
        );
        // Retries are owned by the handler's retry policy.
        let config = aws_sdk_cognitoidentityprovider::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(self.region.clone()))
            .credentials_provider(SharedCredentialsProvider::new(provider))
            .retry_config(RetryConfig::disabled())
            .build();
        let client = CognitoClient::from_conf(config);

        *cached = Some((credentials.access_key_id().to_string(), client.clone()));
        client
    }
}

#[async_trait]
impl SourcePool for CognitoSourcePool {
    async fn initiate_password_auth(
        &self,
        credentials: &DelegatedCredentials,
        username: &str,
        password: &Password,
    ) -> Result<PasswordAuthReply, ProviderError> {
        let client = self.client_for(credentials);

        let output = client
            .admin_initiate_auth()
            .user_pool_id(&self.user_pool_id)
            .client_id(&self.app_client_id)
            .auth_flow(AuthFlowType::AdminUserPasswordAuth)
            .auth_parameters("USERNAME", username)
            .auth_parameters("PASSWORD", password.expose())
            .send()
            .await
            .map_err(provider_error)?;

        if output.authentication_result().is_some() {
            return Ok(PasswordAuthReply::Completed);
        }

        match output.challenge_name() {
            Some(challenge) => Ok(PasswordAuthReply::Challenge(challenge.as_str().to_string())),
            None => Err(ProviderError::transport(
                ProviderErrorKind::Response,
                "AdminInitiateAuth returned neither tokens nor a challenge",
            )),
        }
    }

    async fn get_user(
        &self,
        credentials: &DelegatedCredentials,
        username: &str,
    ) -> Result<SourceUser, ProviderError> {
        let client = self.client_for(credentials);

        let output = client
            .admin_get_user()
            .user_pool_id(&self.user_pool_id)
            .username(username)
            .send()
            .await
            .map_err(provider_error)?;

        let attributes: HashMap<String, String> = output
            .user_attributes()
            .iter()
            .filter_map(|attr| attr.value().map(|value| (attr.name().to_string(), value.to_string())))
            .collect();

        Ok(SourceUser {
            enabled: output.enabled(),
            status: output.user_status().map(|status| status.as_str().to_string()),
            attributes,
        })
    }
}

fn provider_error<E>(err: SdkError<E, HttpResponse>) -> ProviderError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
{
    let detail = DisplayErrorContext(&err).to_string();
    match &err {
        SdkError::ServiceError(service_err) => {
            let code = service_err.err().code().unwrap_or("UnknownServiceError");
            let message = service_err.err().message().unwrap_or("No error message provided");
            let status = service_err.raw().status().as_u16();
            ProviderError::service(code, message, Some(status))
        }
        SdkError::TimeoutError(_) => ProviderError::transport(ProviderErrorKind::Timeout, detail),
        SdkError::DispatchFailure(_) => ProviderError::transport(ProviderErrorKind::Dispatch, detail),
        SdkError::ResponseError(_) => ProviderError::transport(ProviderErrorKind::Response, detail),
        SdkError::ConstructionFailure(_) => ProviderError::transport(ProviderErrorKind::Construction, detail),
        _ => ProviderError::transport(ProviderErrorKind::Other, detail),
    }
}
