pub mod config;
pub mod database;
pub mod errors;

pub use config::{Config, MongoDbConfig};
pub use errors::{MongoServiceError, Result};
