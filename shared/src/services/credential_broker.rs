use async_trait::async_trait;
use chrono::Utc;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;

use crate::{CredentialError, DelegatedCredentials};

/// Source of cross-account credentials. Implemented over STS in production.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn assume_role(
        &self,
        role_arn: &str,
        session_name: &str,
    ) -> Result<DelegatedCredentials, CredentialError>;
}

type RefreshResult = Option<Result<Arc<DelegatedCredentials>, CredentialError>>;

enum CacheState {
    Empty,
    Ready(Arc<DelegatedCredentials>),
    Refreshing(watch::Receiver<RefreshResult>),
}

enum Step {
    Wait(watch::Receiver<RefreshResult>),
    Lead(watch::Sender<RefreshResult>),
}

/// Hands out credentials for the source role, caching them for the lifetime
/// of the execution context.
///
/// At most one refresh is in flight. Callers that find a refresh running
/// wait on its result; the mutex is only held to inspect or swap the state,
/// never across the network call.
pub struct CredentialBroker {
    provider: Arc<dyn CredentialProvider>,
    role_arn: String,
    session_name: String,
    safety_margin: Duration,
    state: Mutex<CacheState>,
}

impl CredentialBroker {
    pub fn new(
        provider: Arc<dyn CredentialProvider>,
        role_arn: String,
        session_name: String,
        safety_margin: Duration,
    ) -> Self {
        Self {
            provider,
            role_arn,
            session_name,
            safety_margin,
            state: Mutex::new(CacheState::Empty),
        }
    }

    pub async fn acquire(&self) -> Result<Arc<DelegatedCredentials>, CredentialError> {
        loop {
            let step = {
                let mut state = self.lock_state();
                match &*state {
                    CacheState::Ready(creds) if creds.is_usable_at(Utc::now(), self.safety_margin) => {
                        return Ok(Arc::clone(creds));
                    }
                    // A closed channel means the previous leader was cancelled.
                    CacheState::Refreshing(rx) if rx.has_changed().is_ok() => Step::Wait(rx.clone()),
                    _ => {
                        let (tx, rx) = watch::channel(None);
                        *state = CacheState::Refreshing(rx);
                        Step::Lead(tx)
                    }
                }
            };

            match step {
                Step::Wait(mut rx) => {
                    tracing::debug!("Waiting on in-flight credential refresh");
                    let published = match rx.wait_for(|result| result.is_some()).await {
                        Ok(result) => result.clone(),
                        Err(_) => continue,
                    };
                    if let Some(result) = published {
                        return result;
                    }
                }
                Step::Lead(tx) => return self.refresh(tx).await,
            }
        }
    }

    /// Drop `rejected` from the cache so the next `acquire` fetches a new set.
    ///
    /// A no-op when the cache already holds a different set, so callers that
    /// saw the same rejection late do not discard a fresh refresh.
    pub fn invalidate(&self, rejected: &Arc<DelegatedCredentials>) {
        let mut state = self.lock_state();
        match &*state {
            CacheState::Ready(cached) if Arc::ptr_eq(cached, rejected) => {
                tracing::info!("Invalidating cached credentials for role: {}", self.role_arn);
                *state = CacheState::Empty;
            }
            _ => tracing::debug!("Rejected credentials already replaced; keeping cache"),
        }
    }

    async fn refresh(
        &self,
        tx: watch::Sender<RefreshResult>,
    ) -> Result<Arc<DelegatedCredentials>, CredentialError> {
        tracing::info!(
            "Assuming role {} with session name {}",
            self.role_arn,
            self.session_name
        );

        let result = self
            .provider
            .assume_role(&self.role_arn, &self.session_name)
            .await
            .map(Arc::new);

        {
            let mut state = self.lock_state();
            *state = match &result {
                Ok(creds) => {
                    tracing::info!("Cached credentials valid until {}", creds.expires_at());
                    CacheState::Ready(Arc::clone(creds))
                }
                Err(e) => {
                    tracing::warn!("Credential refresh failed: {}", e);
                    CacheState::Empty
                }
            };
        }

        // No receivers just means nobody was waiting.
        let _ = tx.send(Some(result.clone()));
        result
    }

    fn lock_state(&self) -> MutexGuard<'_, CacheState> {
        // The state is replaced wholesale, so a poisoned lock still holds a
        // consistent value.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
