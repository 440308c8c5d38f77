// MongoDB modules
pub mod client;
pub mod descriptor;
pub mod driver;
pub mod mongodb;
pub mod payload;
pub mod repositories;
pub mod retry;
pub mod service;

#[cfg(test)]
pub(crate) mod testing;

use derive_more::Display;

// Re-export commonly used types
pub use client::CollectionClient;
pub use descriptor::ConnectionDescriptor;
pub use driver::{DocumentDriver, DriverError, FindAndModify, UpdateMode, UpdateOutcome};
pub use mongodb::MongoDriver;
pub use payload::{LastUpdated, Payload};
pub use repositories::{CrudRepository, Identifiable, MongoManager};
pub use retry::RetryPolicy;
pub use service::MongoService;

/// A database/collection pair
#[derive(Debug, Display, Clone, PartialEq, Eq, Hash)]
#[display(fmt = "{}.{}", database, collection)]
pub struct Namespace {
    pub database: String,
    pub collection: String,
}

impl Namespace {
    pub fn new(database: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            collection: collection.into(),
        }
    }
}
