pub mod config;
pub mod dispatcher;
pub mod errors;
pub mod events;
pub mod models;
pub mod services;
pub mod utils;

pub use config::*;
pub use dispatcher::*;
pub use errors::*;
pub use events::*;
pub use models::*;
pub use services::*;
pub use utils::*;
