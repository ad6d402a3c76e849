use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::{FinalUserStatus, MessageAction, MigrationResponse};

// Custom structs rather than aws_lambda_events so Cognito's nulls and
// missing fields reach validation instead of failing deserialization.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CognitoMigrateUserEvent {
    pub version: Option<String>,
    pub trigger_source: Option<String>,
    pub region: Option<String>,
    pub user_pool_id: Option<String>,
    pub user_name: Option<String>,
    #[serde(default)]
    pub caller_context: CallerContext,
    #[serde(default)]
    pub request: MigrateUserRequest,
    #[serde(default)]
    pub response: MigrateUserResponse,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallerContext {
    pub aws_sdk_version: Option<String>,
    pub client_id: Option<String>,
}

#[derive(Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrateUserRequest {
    pub password: Option<String>,
    pub validation_data: Option<HashMap<String, String>>,
    pub client_metadata: Option<HashMap<String, String>>,
}

impl fmt::Debug for MigrateUserRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MigrateUserRequest")
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("validation_data", &self.validation_data)
            .field("client_metadata", &self.client_metadata)
            .finish()
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrateUserResponse {
    pub user_attributes: Option<HashMap<String, String>>,
    pub final_user_status: Option<FinalUserStatus>,
    pub message_action: Option<MessageAction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub desired_delivery_mediums: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub force_alias_creation: Option<bool>,
}

impl CognitoMigrateUserEvent {
    /// Write a successful migration into the event returned to Cognito and
    /// drop the password so it is never echoed back.
    pub fn complete(&mut self, response: &MigrationResponse) {
        self.response.user_attributes = Some(response.user_attributes().clone());
        self.response.final_user_status = Some(response.final_user_status());
        self.response.message_action = Some(response.message_action());
        self.request.password = None;
    }
}
