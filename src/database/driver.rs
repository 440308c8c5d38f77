use async_trait::async_trait;
use bson::{Bson, Document};
use mongodb::error::{ErrorKind, WriteFailure};
use thiserror::Error;

use super::Namespace;

/// Server error code for a unique index violation
pub const DUPLICATE_KEY_CODE: i32 = 11000;

/// Errors reported by a [`DocumentDriver`]
#[derive(Debug, Error)]
pub enum DriverError {
    #[error(transparent)]
    Mongo(#[from] mongodb::error::Error),

    #[error("client is not connected")]
    NotConnected,

    #[error("duplicate key: {0}")]
    DuplicateKey(String),
}

impl DriverError {
    pub fn is_duplicate_key(&self) -> bool {
        match self {
            DriverError::DuplicateKey(_) => true,
            DriverError::Mongo(err) => match err.kind.as_ref() {
                ErrorKind::Write(WriteFailure::WriteError(write_error)) => {
                    write_error.code == DUPLICATE_KEY_CODE
                }
                ErrorKind::Command(command_error) => command_error.code == DUPLICATE_KEY_CODE,
                _ => false,
            },
            DriverError::NotConnected => false,
        }
    }
}

/// Flags for an update call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateMode {
    pub upsert: bool,
    pub multiple: bool,
}

impl UpdateMode {
    pub fn single() -> Self {
        Self::default()
    }

    pub fn upsert() -> Self {
        Self {
            upsert: true,
            multiple: false,
        }
    }

    pub fn multiple() -> Self {
        Self {
            upsert: false,
            multiple: true,
        }
    }
}

/// What an update call touched
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateOutcome {
    pub matched: u64,
    pub modified: u64,
    pub upserted_id: Option<Bson>,
}

/// Arguments of a find-and-modify call
///
/// Exactly one of `update` and `remove` must be set. `update` may be either an
/// operator document (`$set`, `$inc`, ...) or a full replacement.
#[derive(Debug, Clone, Default)]
pub struct FindAndModify {
    pub update: Option<Document>,
    pub remove: bool,
    pub fields: Option<Document>,
    pub sort: Option<Document>,
    pub upsert: bool,
    /// Return the document as it is after the modification
    pub return_new: bool,
}

impl FindAndModify {
    pub fn update(update: Document) -> Self {
        Self {
            update: Some(update),
            ..Self::default()
        }
    }

    pub fn remove() -> Self {
        Self {
            remove: true,
            ..Self::default()
        }
    }
}

/// True when every key of `document` is an update operator such as `$set`
pub fn is_operator_document(document: &Document) -> bool {
    !document.is_empty() && document.keys().all(|key| key.starts_with('$'))
}

/// The document database client the managers delegate to
///
/// Every call is addressed by a [`Namespace`]. Implementations own the connection
/// state; `close` followed by `connect` must leave the driver usable again.
#[async_trait]
pub trait DocumentDriver: Send + Sync {
    async fn connect(&self) -> Result<(), DriverError>;

    async fn close(&self);

    async fn find(
        &self,
        namespace: &Namespace,
        filter: Document,
        projection: Option<Document>,
    ) -> Result<Vec<Document>, DriverError>;

    async fn find_one(
        &self,
        namespace: &Namespace,
        filter: Document,
        projection: Option<Document>,
    ) -> Result<Option<Document>, DriverError>;

    async fn insert(&self, namespace: &Namespace, document: Document) -> Result<Bson, DriverError>;

    async fn update(
        &self,
        namespace: &Namespace,
        filter: Document,
        update: Document,
        mode: UpdateMode,
    ) -> Result<UpdateOutcome, DriverError>;

    async fn remove(
        &self,
        namespace: &Namespace,
        filter: Document,
        just_one: bool,
    ) -> Result<u64, DriverError>;

    async fn count(&self, namespace: &Namespace, filter: Document) -> Result<u64, DriverError>;

    async fn distinct(
        &self,
        namespace: &Namespace,
        key: &str,
        filter: Document,
    ) -> Result<Vec<Bson>, DriverError>;

    async fn find_and_modify(
        &self,
        namespace: &Namespace,
        query: Document,
        request: FindAndModify,
    ) -> Result<Option<Document>, DriverError>;
}
