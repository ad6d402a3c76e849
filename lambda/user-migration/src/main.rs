use anyhow::Context as _;
use aws_config::BehaviorVersion;
use aws_sdk_sts::config::retry::RetryConfig;
use lambda_runtime::{run, service_fn, Error, LambdaEvent};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use migration_shared::{
    current_timestamp_millis, remaining_budget, CognitoMigrateUserEvent, CognitoSourcePool, MigrationConfig,
    MigrationHandler, StsCredentialProvider,
};

struct Runtime {
    handler: MigrationHandler,
    deadline_buffer: Duration,
}

async fn function_handler(
    runtime: &Runtime,
    event: LambdaEvent<CognitoMigrateUserEvent>,
) -> Result<CognitoMigrateUserEvent, Error> {
    let (mut payload, context) = event.into_parts();

    info!(
        "Received migration event - Request ID: {}, Trigger source: {:?}",
        context.request_id, payload.trigger_source
    );

    let budget = remaining_budget(context.deadline, current_timestamp_millis(), runtime.deadline_buffer);
    let deadline = Instant::now() + budget;

    match runtime.handler.dispatch(&payload, deadline).await {
        Ok(response) => {
            payload.complete(&response);
            Ok(payload)
        }
        Err(e) => {
            error!("Failed to migrate user: {}", e);
            // Any error makes Cognito deny the sign-in and skip user creation.
            Err(e.denial_message(runtime.handler.report_disabled_users()).into())
        }
    }
}

async fn build_runtime() -> anyhow::Result<Runtime> {
    let config = MigrationConfig::from_env().context("Failed to load migration configuration")?;
    info!(
        "Migration configuration loaded - Source pool: {}, Region: {}, Role: {}, Attributes: {:?}",
        config.source_user_pool_id, config.source_region, config.source_role_arn, config.migrated_attributes
    );

    // The Lambda's own identity, used only to call sts:AssumeRole.
    let sdk_config = aws_config::load_defaults(BehaviorVersion::latest()).await;
    let sts_config = aws_sdk_sts::config::Builder::from(&sdk_config)
        .retry_config(RetryConfig::disabled())
        .build();
    let sts_client = aws_sdk_sts::Client::from_conf(sts_config);

    let credential_provider = Arc::new(StsCredentialProvider::new(sts_client, config.credential_duration));
    let source_pool = Arc::new(CognitoSourcePool::new(
        config.source_user_pool_id.clone(),
        config.source_app_client_id.clone(),
        config.source_region.clone(),
    ));

    Ok(Runtime {
        handler: MigrationHandler::new(&config, credential_provider, source_pool),
        deadline_buffer: config.deadline_buffer,
    })
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .without_time()
        .init();

    info!("Starting user-migration Lambda function");

    let runtime = build_runtime().await.map_err(|e| {
        error!("Cold start failed: {:#}", e);
        e
    })?;
    let runtime = &runtime;

    run(service_fn(move |event: LambdaEvent<CognitoMigrateUserEvent>| async move {
        function_handler(runtime, event).await
    }))
    .await
}
