use async_trait::async_trait;
use bson::{Bson, Document};

use crate::database::driver::UpdateOutcome;
use crate::database::payload::Payload;
use crate::errors::Result;

/// Items that can be addressed by their `_id`
pub trait Identifiable {
    fn id(&self) -> Bson;
}

impl Identifiable for Document {
    fn id(&self) -> Bson {
        self.get("_id").cloned().unwrap_or(Bson::Null)
    }
}

/// CRUD operations over persistent storage
#[async_trait]
pub trait CrudRepository {
    /// Creates a new item and returns its identifier
    async fn create(&self, item: Payload) -> Result<Bson>;

    /// Extracts the items matching `criteria`
    async fn read(&self, criteria: Document, fields: Option<Document>) -> Result<Vec<Document>>;

    /// Updates the first item matching `criteria`
    async fn update(&self, item: Payload, criteria: Document) -> Result<UpdateOutcome>;

    /// Removes `item`; only its identifier needs to be set
    async fn delete(&self, item: &(dyn Identifiable + Sync)) -> Result<u64>;

    /// Creates the item if nothing matches `criteria`, updates it otherwise
    async fn upsert(&self, item: Payload, criteria: Document) -> Result<UpdateOutcome>;
}
