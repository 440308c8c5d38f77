use std::error::Error as StdError;

use thiserror::Error;

use crate::database::driver::DriverError;
use crate::database::Namespace;

pub type Result<T, E = MongoServiceError> = std::result::Result<T, E>;

/// Errors surfaced by the connection wrapper and the CRUD managers
#[derive(Debug, Error)]
pub enum MongoServiceError {
    /// Every connect attempt failed
    #[error("Unable to connect to Mongo after {retries} retries")]
    Connection {
        retries: u32,
        #[source]
        source: DriverError,
    },

    /// An operation kept failing until the retry budget ran out
    #[error("Unable to {operation} on {namespace} after {retries} retries")]
    Operation {
        operation: &'static str,
        namespace: Namespace,
        retries: u32,
        #[source]
        source: DriverError,
    },

    /// The item handed to a write operation could not become a document
    #[error("Invalid payload: {reason}")]
    Payload {
        reason: String,
        #[source]
        source: Option<Box<dyn StdError + Send + Sync>>,
    },

    /// The write conflicts with a unique index; never retried
    #[error("Duplicate key on {namespace}")]
    DuplicateKey {
        namespace: Namespace,
        #[source]
        source: DriverError,
    },
}

impl MongoServiceError {
    pub fn payload(reason: impl Into<String>) -> Self {
        Self::Payload {
            reason: reason.into(),
            source: None,
        }
    }

    pub fn payload_with_source(
        reason: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self::Payload {
            reason: reason.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn is_duplicate_key(&self) -> bool {
        matches!(self, Self::DuplicateKey { .. })
    }

    /// The driver error behind this failure, if there is one
    pub fn driver_error(&self) -> Option<&DriverError> {
        match self {
            Self::Connection { source, .. }
            | Self::Operation { source, .. }
            | Self::DuplicateKey { source, .. } => Some(source),
            Self::Payload { .. } => None,
        }
    }
}
