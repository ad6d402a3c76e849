use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;

use crate::{DelegatedCredentials, Password};

/// Admin operations the source role grants on the source pool.
#[async_trait]
pub trait SourcePool: Send + Sync {
    /// Admin-initiated username/password authentication.
    async fn initiate_password_auth(
        &self,
        credentials: &DelegatedCredentials,
        username: &str,
        password: &Password,
    ) -> Result<PasswordAuthReply, ProviderError>;

    /// Lookup by username; never sends a password.
    async fn get_user(
        &self,
        credentials: &DelegatedCredentials,
        username: &str,
    ) -> Result<SourceUser, ProviderError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PasswordAuthReply {
    /// Tokens were issued; no challenge outstanding.
    Completed,
    /// The pool answered with a challenge instead of tokens.
    Challenge(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceUser {
    pub enabled: bool,
    /// Raw provider status, e.g. `CONFIRMED` or `FORCE_CHANGE_PASSWORD`.
    pub status: Option<String>,
    pub attributes: HashMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    /// The service answered with an error code.
    Service,
    Timeout,
    Dispatch,
    Response,
    Construction,
    Other,
}

/// A failed source pool call, before classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderError {
    pub kind: ProviderErrorKind,
    pub code: Option<String>,
    pub message: String,
    pub http_status: Option<u16>,
}

impl ProviderError {
    pub fn service(code: impl Into<String>, message: impl Into<String>, http_status: Option<u16>) -> Self {
        Self {
            kind: ProviderErrorKind::Service,
            code: Some(code.into()),
            message: message.into(),
            http_status,
        }
    }

    pub fn transport(kind: ProviderErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            code: None,
            message: message.into(),
            http_status: None,
        }
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.code {
            Some(code) => write!(f, "{:?} error {}: {}", self.kind, code, self.message),
            None => write!(f, "{:?} error: {}", self.kind, self.message),
        }
    }
}
