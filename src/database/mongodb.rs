use async_trait::async_trait;
use bson::{doc, Bson, Document};
use futures::TryStreamExt;
use log::{debug, error, info};
use mongodb::{
    options::{
        ClientOptions, FindOneAndDeleteOptions, FindOneAndReplaceOptions,
        FindOneAndUpdateOptions, FindOneOptions, FindOptions, ReplaceOptions, ReturnDocument,
        ServerApi, ServerApiVersion, UpdateOptions,
    },
    Client, Collection,
};
use std::time::Duration;
use tokio::sync::RwLock;

use super::descriptor::ConnectionDescriptor;
use super::driver::{is_operator_document, DocumentDriver, DriverError, FindAndModify, UpdateMode, UpdateOutcome};
use super::Namespace;

/// [`DocumentDriver`] backed by the official MongoDB driver
///
/// The client is created lazily by [`connect`](DocumentDriver::connect) from the stored
/// connection string and dropped again by [`close`](DocumentDriver::close).
#[derive(Debug)]
pub struct MongoDriver {
    uri: String,
    ping_database: String,
    connect_timeout: Option<Duration>,
    max_pool_size: Option<u32>,
    server_api: bool,
    client: RwLock<Option<Client>>,
}

impl MongoDriver {
    pub fn new(uri: impl Into<String>, ping_database: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            ping_database: ping_database.into(),
            connect_timeout: None,
            max_pool_size: None,
            server_api: false,
            client: RwLock::new(None),
        }
    }

    pub fn from_descriptor(descriptor: &ConnectionDescriptor) -> Self {
        let mut driver = Self::new(descriptor.uri(), descriptor.database());
        driver.connect_timeout = descriptor.connect_timeout();
        driver.max_pool_size = descriptor.max_pool_size();
        driver.server_api = descriptor.server_api();
        driver
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub async fn is_connected(&self) -> bool {
        self.client.read().await.is_some()
    }

    /// The live client handle, if connected
    pub async fn client(&self) -> Option<Client> {
        self.client.read().await.clone()
    }

    async fn collection(&self, namespace: &Namespace) -> Result<Collection<Document>, DriverError> {
        let guard = self.client.read().await;
        let client = guard.as_ref().ok_or(DriverError::NotConnected)?;
        Ok(client
            .database(&namespace.database)
            .collection::<Document>(&namespace.collection))
    }
}

#[async_trait]
impl DocumentDriver for MongoDriver {
    async fn connect(&self) -> Result<(), DriverError> {
        info!("Connecting to MongoDB database {}", self.ping_database);

        let mut client_options = ClientOptions::parse(&self.uri).await?;
        if self.connect_timeout.is_some() {
            client_options.connect_timeout = self.connect_timeout;
            client_options.server_selection_timeout = self.connect_timeout;
        }
        if self.max_pool_size.is_some() {
            client_options.max_pool_size = self.max_pool_size;
        }
        if self.server_api {
            let server_api = ServerApi::builder().version(ServerApiVersion::V1).build();
            client_options.server_api = Some(server_api);
        }

        let client = Client::with_options(client_options)?;

        // The driver connects lazily; ping so failures surface here
        if let Err(e) = client
            .database(&self.ping_database)
            .run_command(doc! { "ping": 1 })
            .await
        {
            error!("Failed to connect to MongoDB: {}", e);
            return Err(e.into());
        }

        info!(
            "Successfully connected to MongoDB database: {}",
            self.ping_database
        );
        *self.client.write().await = Some(client);
        Ok(())
    }

    async fn close(&self) {
        let client = self.client.write().await.take();
        if let Some(client) = client {
            debug!("Closing MongoDB client");
            client.shutdown().await;
        }
    }

    async fn find(
        &self,
        namespace: &Namespace,
        filter: Document,
        projection: Option<Document>,
    ) -> Result<Vec<Document>, DriverError> {
        let collection = self.collection(namespace).await?;
        let options = FindOptions::builder().projection(projection).build();
        let cursor = collection.find(filter).with_options(options).await?;
        let documents: Vec<Document> = cursor.try_collect().await?;
        Ok(documents)
    }

    async fn find_one(
        &self,
        namespace: &Namespace,
        filter: Document,
        projection: Option<Document>,
    ) -> Result<Option<Document>, DriverError> {
        let collection = self.collection(namespace).await?;
        let options = FindOneOptions::builder().projection(projection).build();
        Ok(collection.find_one(filter).with_options(options).await?)
    }

    async fn insert(&self, namespace: &Namespace, document: Document) -> Result<Bson, DriverError> {
        let collection = self.collection(namespace).await?;
        let result = collection.insert_one(document).await?;
        Ok(result.inserted_id)
    }

    async fn update(
        &self,
        namespace: &Namespace,
        filter: Document,
        update: Document,
        mode: UpdateMode,
    ) -> Result<UpdateOutcome, DriverError> {
        let collection = self.collection(namespace).await?;

        let result = if !is_operator_document(&update) {
            let options = ReplaceOptions::builder().upsert(mode.upsert).build();
            collection
                .replace_one(filter, update)
                .with_options(options)
                .await?
        } else {
            let options = UpdateOptions::builder().upsert(mode.upsert).build();
            if mode.multiple {
                collection
                    .update_many(filter, update)
                    .with_options(options)
                    .await?
            } else {
                collection
                    .update_one(filter, update)
                    .with_options(options)
                    .await?
            }
        };

        Ok(UpdateOutcome {
            matched: result.matched_count,
            modified: result.modified_count,
            upserted_id: result.upserted_id,
        })
    }

    async fn remove(
        &self,
        namespace: &Namespace,
        filter: Document,
        just_one: bool,
    ) -> Result<u64, DriverError> {
        let collection = self.collection(namespace).await?;
        let result = if just_one {
            collection.delete_one(filter).await?
        } else {
            collection.delete_many(filter).await?
        };
        Ok(result.deleted_count)
    }

    async fn count(&self, namespace: &Namespace, filter: Document) -> Result<u64, DriverError> {
        let collection = self.collection(namespace).await?;
        Ok(collection.count_documents(filter).await?)
    }

    async fn distinct(
        &self,
        namespace: &Namespace,
        key: &str,
        filter: Document,
    ) -> Result<Vec<Bson>, DriverError> {
        let collection = self.collection(namespace).await?;
        Ok(collection.distinct(key, filter).await?)
    }

    async fn find_and_modify(
        &self,
        namespace: &Namespace,
        query: Document,
        request: FindAndModify,
    ) -> Result<Option<Document>, DriverError> {
        let collection = self.collection(namespace).await?;
        let return_document = if request.return_new {
            ReturnDocument::After
        } else {
            ReturnDocument::Before
        };

        if request.remove {
            let options = FindOneAndDeleteOptions::builder()
                .projection(request.fields)
                .sort(request.sort)
                .build();
            return Ok(collection
                .find_one_and_delete(query)
                .with_options(options)
                .await?);
        }

        let update = request.update.unwrap_or_default();
        if is_operator_document(&update) {
            let options = FindOneAndUpdateOptions::builder()
                .projection(request.fields)
                .sort(request.sort)
                .upsert(request.upsert)
                .return_document(return_document)
                .build();
            Ok(collection
                .find_one_and_update(query, update)
                .with_options(options)
                .await?)
        } else {
            let options = FindOneAndReplaceOptions::builder()
                .projection(request.fields)
                .sort(request.sort)
                .upsert(request.upsert)
                .return_document(return_document)
                .build();
            Ok(collection
                .find_one_and_replace(query, update)
                .with_options(options)
                .await?)
        }
    }
}
