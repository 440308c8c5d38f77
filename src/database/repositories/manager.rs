use async_trait::async_trait;
use bson::{doc, Bson, Document};
use chrono::{DateTime, Utc};
use log::debug;
use std::sync::Arc;

use super::crud::{CrudRepository, Identifiable};
use crate::database::client::CollectionClient;
use crate::database::driver::{DocumentDriver, UpdateMode, UpdateOutcome};
use crate::database::mongodb::MongoDriver;
use crate::database::payload::{to_bson_date, to_bson_seconds, Payload, LAST_UPDATED_FIELD};
use crate::database::service::MongoService;
use crate::errors::{MongoServiceError, Result};

/// Manages data kept in one MongoDB collection
#[derive(Debug)]
pub struct MongoManager<D = MongoDriver> {
    client: CollectionClient<D>,
}

impl<D> Clone for MongoManager<D> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
        }
    }
}

impl<D: DocumentDriver> MongoManager<D> {
    pub fn new(
        service: Arc<MongoService<D>>,
        database: impl Into<String>,
        collection: impl Into<String>,
    ) -> Self {
        Self {
            client: CollectionClient::new(service, database, collection),
        }
    }

    pub async fn find_one(&self, criteria: Document) -> Result<Option<Document>> {
        self.client.find_one(criteria, None).await
    }

    /// Save `item` by replacing the document matching `criteria`, or inserting it
    ///
    /// `extra_dates` are stored as BSON dates next to the item's own fields.
    pub async fn upsert_with_dates(
        &self,
        item: Payload,
        criteria: Document,
        extra_dates: &[(&str, DateTime<Utc>)],
    ) -> Result<UpdateOutcome> {
        let document = item.into_document(extra_dates)?;
        self.client
            .update_document(criteria, document, UpdateMode::upsert())
            .await
    }

    /// Insert or update using only some fields of `item`
    ///
    /// `fields` are written on every call through `$set`; `fields_on_insert` only when
    /// the document is created, through `$setOnInsert`. Fields absent from `item` are
    /// skipped.
    pub async fn upsert_partial(
        &self,
        item: Payload,
        criteria: Document,
        extra_dates: &[(&str, DateTime<Utc>)],
        fields: &[&str],
        fields_on_insert: &[&str],
    ) -> Result<UpdateOutcome> {
        let update = partial_update(item, extra_dates, fields, fields_on_insert)?;
        self.client
            .update_document(criteria, update, UpdateMode::upsert())
            .await
    }

    /// Apply `item` to every document matching `criteria`
    pub async fn update_multiple(&self, item: Payload, criteria: Document) -> Result<UpdateOutcome> {
        let update = item.into_document(&[])?;
        self.client
            .update_document(criteria, update, UpdateMode::multiple())
            .await
    }

    pub async fn delete_multiple(&self, criteria: Document) -> Result<u64> {
        self.client.remove(criteria, false).await
    }

    pub async fn count(&self, criteria: Document) -> Result<u64> {
        self.client.count(criteria).await
    }

    pub async fn distinct(&self, key: &str, criteria: Document) -> Result<Vec<Bson>> {
        self.client.distinct(key, criteria).await
    }

    pub fn client(&self) -> &CollectionClient<D> {
        &self.client
    }

    pub fn service(&self) -> &Arc<MongoService<D>> {
        self.client.service()
    }

    pub fn set_service(&mut self, service: Arc<MongoService<D>>) -> &mut Self {
        self.client.set_service(service);
        self
    }

    pub fn database(&self) -> &str {
        self.client.database_name()
    }

    pub fn set_database(&mut self, database: impl Into<String>) -> &mut Self {
        self.client.set_database_name(database);
        self
    }

    pub fn collection(&self) -> &str {
        self.client.collection_name()
    }

    pub fn set_collection(&mut self, collection: impl Into<String>) -> &mut Self {
        self.client.set_collection_name(collection);
        self
    }
}

#[async_trait]
impl<D: DocumentDriver> CrudRepository for MongoManager<D> {
    async fn create(&self, item: Payload) -> Result<Bson> {
        let document = item.into_document(&[])?;
        self.client.insert_document(document).await
    }

    async fn read(&self, criteria: Document, fields: Option<Document>) -> Result<Vec<Document>> {
        self.client.find(criteria, fields).await
    }

    async fn update(&self, item: Payload, criteria: Document) -> Result<UpdateOutcome> {
        let update = item.into_document(&[])?;
        self.client
            .update_document(criteria, update, UpdateMode::single())
            .await
    }

    async fn delete(&self, item: &(dyn Identifiable + Sync)) -> Result<u64> {
        let id = item.id();
        if id == Bson::Null {
            return Err(MongoServiceError::payload("the item has no identifier to delete by"));
        }
        debug!("Deleting {} from {}", id, self.client.namespace());
        self.client.remove(doc! { "_id": id }, true).await
    }

    async fn upsert(&self, item: Payload, criteria: Document) -> Result<UpdateOutcome> {
        self.upsert_with_dates(item, criteria, &[]).await
    }
}

fn partial_update(
    item: Payload,
    extra_dates: &[(&str, DateTime<Utc>)],
    fields: &[&str],
    fields_on_insert: &[&str],
) -> Result<Document> {
    let last_updated = item.last_updated();
    let source = item.into_document(&[])?;

    let pick = |names: &[&str]| -> Document {
        names
            .iter()
            .filter_map(|name| match source.get(*name) {
                None | Some(Bson::Null) => None,
                Some(value) => Some((name.to_string(), value.clone())),
            })
            .collect()
    };

    let mut set = pick(fields);
    let set_on_insert = pick(fields_on_insert);

    if let Some(last_updated) = last_updated {
        set.insert(LAST_UPDATED_FIELD, to_bson_seconds(last_updated));
    }
    for (key, value) in extra_dates {
        set.insert(*key, to_bson_date(*value));
    }

    let mut update = Document::new();
    if !set.is_empty() {
        update.insert("$set", set);
    }
    if !set_on_insert.is_empty() {
        update.insert("$setOnInsert", set_on_insert);
    }
    if update.is_empty() {
        return Err(MongoServiceError::payload(
            "none of the requested fields are present in the item",
        ));
    }

    Ok(update)
}
