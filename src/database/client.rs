use bson::{Bson, Document};
use chrono::{DateTime, Utc};
use std::sync::Arc;

use super::driver::{is_operator_document, DocumentDriver, FindAndModify, UpdateMode, UpdateOutcome};
use super::mongodb::MongoDriver;
use super::payload::Payload;
use super::retry::Operation;
use super::service::MongoService;
use super::Namespace;
use crate::errors::{MongoServiceError, Result};

/// Driver-shaped access to one collection, with retries
///
/// Each method mirrors a driver call. Reads are retried as they are; writes reconnect
/// before each retry.
#[derive(Debug)]
pub struct CollectionClient<D = MongoDriver> {
    service: Arc<MongoService<D>>,
    namespace: Namespace,
}

impl<D> Clone for CollectionClient<D> {
    fn clone(&self) -> Self {
        Self {
            service: self.service.clone(),
            namespace: self.namespace.clone(),
        }
    }
}

impl<D: DocumentDriver> CollectionClient<D> {
    pub fn new(
        service: Arc<MongoService<D>>,
        database: impl Into<String>,
        collection: impl Into<String>,
    ) -> Self {
        Self {
            service,
            namespace: Namespace::new(database, collection),
        }
    }

    pub async fn find(&self, query: Document, fields: Option<Document>) -> Result<Vec<Document>> {
        let driver = self.service.driver();
        let namespace = &self.namespace;
        self.service.with_retries(namespace, Operation::Find, move || {
            driver.find(namespace, query.clone(), fields.clone())
        })
        .await
    }

    pub async fn find_one(&self, query: Document, fields: Option<Document>) -> Result<Option<Document>> {
        let driver = self.service.driver();
        let namespace = &self.namespace;
        self.service.with_retries(namespace, Operation::FindOne, move || {
            driver.find_one(namespace, query.clone(), fields.clone())
        })
        .await
    }

    /// Insert one item and return its `_id`
    ///
    /// A duplicate key surfaces as [`MongoServiceError::DuplicateKey`] without retrying.
    pub async fn insert(
        &self,
        item: impl Into<Payload>,
        extra_dates: &[(&str, DateTime<Utc>)],
    ) -> Result<Bson> {
        let document = item.into().into_document(extra_dates)?;
        self.insert_document(document).await
    }

    pub(crate) async fn insert_document(&self, document: Document) -> Result<Bson> {
        let driver = self.service.driver();
        let namespace = &self.namespace;
        self.service.with_retries(namespace, Operation::Insert, move || {
            driver.insert(namespace, document.clone())
        })
        .await
    }

    pub async fn update(
        &self,
        criteria: Document,
        item: impl Into<Payload>,
        mode: UpdateMode,
        extra_dates: &[(&str, DateTime<Utc>)],
    ) -> Result<UpdateOutcome> {
        let document = item.into().into_document(extra_dates)?;
        self.update_document(criteria, document, mode).await
    }

    pub(crate) async fn update_document(
        &self,
        criteria: Document,
        update: Document,
        mode: UpdateMode,
    ) -> Result<UpdateOutcome> {
        if mode.multiple && !is_operator_document(&update) {
            return Err(MongoServiceError::payload(
                "updating multiple documents requires update operators such as $set",
            ));
        }

        let operation = if mode.upsert {
            Operation::Upsert
        } else {
            Operation::Update
        };
        let driver = self.service.driver();
        let namespace = &self.namespace;
        self.service.with_retries(namespace, operation, move || {
            driver.update(namespace, criteria.clone(), update.clone(), mode)
        })
        .await
    }

    /// Remove matching documents and return how many went away
    pub async fn remove(&self, criteria: Document, just_one: bool) -> Result<u64> {
        let driver = self.service.driver();
        let namespace = &self.namespace;
        self.service.with_retries(namespace, Operation::Remove, move || {
            driver.remove(namespace, criteria.clone(), just_one)
        })
        .await
    }

    pub async fn count(&self, criteria: Document) -> Result<u64> {
        let driver = self.service.driver();
        let namespace = &self.namespace;
        self.service.with_retries(namespace, Operation::Count, move || {
            driver.count(namespace, criteria.clone())
        })
        .await
    }

    /// Distinct values of `key` among the documents matching `criteria`
    pub async fn distinct(&self, key: &str, criteria: Document) -> Result<Vec<Bson>> {
        let driver = self.service.driver();
        let namespace = &self.namespace;
        self.service.with_retries(namespace, Operation::Distinct, move || {
            driver.distinct(namespace, key, criteria.clone())
        })
        .await
    }

    /// Modify (or remove) one document and return it
    pub async fn find_and_modify(
        &self,
        query: Document,
        request: FindAndModify,
    ) -> Result<Option<Document>> {
        match (&request.update, request.remove) {
            (Some(_), true) => {
                return Err(MongoServiceError::payload(
                    "find and modify takes either an update or remove, not both",
                ))
            }
            (None, false) => {
                return Err(MongoServiceError::payload(
                    "find and modify needs an update document or remove",
                ))
            }
            _ => {}
        }

        let driver = self.service.driver();
        let namespace = &self.namespace;
        self.service.with_retries(namespace, Operation::FindAndModify, move || {
            driver.find_and_modify(namespace, query.clone(), request.clone())
        })
        .await
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    pub fn service(&self) -> &Arc<MongoService<D>> {
        &self.service
    }

    pub fn set_service(&mut self, service: Arc<MongoService<D>>) -> &mut Self {
        self.service = service;
        self
    }

    pub fn database_name(&self) -> &str {
        &self.namespace.database
    }

    pub fn set_database_name(&mut self, database: impl Into<String>) -> &mut Self {
        self.namespace.database = database.into();
        self
    }

    pub fn collection_name(&self) -> &str {
        &self.namespace.collection
    }

    pub fn set_collection_name(&mut self, collection: impl Into<String>) -> &mut Self {
        self.namespace.collection = collection.into();
        self
    }
}
