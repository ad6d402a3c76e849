pub mod authenticator;
pub mod cognito_service;
pub mod credential_broker;
pub mod response_mapper;
pub mod retry;
pub mod source_pool;
pub mod sts_service;

pub use authenticator::*;
pub use cognito_service::*;
pub use credential_broker::*;
pub use response_mapper::*;
pub use retry::*;
pub use source_pool::*;
pub use sts_service::*;
