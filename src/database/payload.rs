use bson::{Bson, Document};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::errors::{MongoServiceError, Result};

pub const LAST_UPDATED_FIELD: &str = "lastUpdated";

/// Entities that record when they were last modified
///
/// Payloads built with [`Payload::stamped`] get a `lastUpdated` date field.
pub trait LastUpdated {
    fn last_updated(&self) -> Option<DateTime<Utc>>;

    fn set_last_updated(&mut self, last_updated: Option<DateTime<Utc>>);
}

/// An item handed to a write operation
#[derive(Debug)]
pub enum Payload {
    /// Already a document; stored as is
    Document(Document),
    /// A generic JSON object
    Json(serde_json::Value),
    /// JSON text, parsed before storing
    JsonText(String),
    /// A serialized domain entity
    Entity {
        serialized: std::result::Result<Bson, bson::ser::Error>,
        last_updated: Option<DateTime<Utc>>,
    },
}

impl Payload {
    pub fn entity<T: Serialize + ?Sized>(item: &T) -> Self {
        Payload::Entity {
            serialized: bson::to_bson(item),
            last_updated: None,
        }
    }

    pub fn stamped<T: Serialize + LastUpdated + ?Sized>(item: &T) -> Self {
        Payload::Entity {
            serialized: bson::to_bson(item),
            last_updated: item.last_updated(),
        }
    }

    /// The modification time recorded by [`Payload::stamped`]
    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        match self {
            Payload::Entity { last_updated, .. } => *last_updated,
            _ => None,
        }
    }

    /// Convert into a plain document, then add `lastUpdated` and the extra dates
    ///
    /// Extra dates are applied last and win over `lastUpdated` on a key clash.
    pub fn into_document(self, extra_dates: &[(&str, DateTime<Utc>)]) -> Result<Document> {
        let (mut document, last_updated) = match self {
            Payload::Document(document) => (document, None),
            Payload::Json(value) => (json_to_document(value)?, None),
            Payload::JsonText(text) => {
                let value: serde_json::Value = serde_json::from_str(&text).map_err(|e| {
                    MongoServiceError::payload_with_source("the item is not valid JSON", e)
                })?;
                (json_to_document(value)?, None)
            }
            Payload::Entity {
                serialized,
                last_updated,
            } => match serialized {
                Ok(Bson::Document(document)) => (document, last_updated),
                Ok(other) => {
                    return Err(MongoServiceError::payload(format!(
                        "the entity must serialize to a document, got {:?}",
                        other.element_type()
                    )))
                }
                Err(e) => {
                    return Err(MongoServiceError::payload_with_source(
                        "the entity could not be serialized",
                        e,
                    ))
                }
            },
        };

        if let Some(last_updated) = last_updated {
            document.insert(LAST_UPDATED_FIELD, to_bson_seconds(last_updated));
        }
        for (key, value) in extra_dates {
            document.insert(*key, to_bson_date(*value));
        }

        Ok(document)
    }
}

impl From<Document> for Payload {
    fn from(document: Document) -> Self {
        Payload::Document(document)
    }
}

impl From<serde_json::Value> for Payload {
    fn from(value: serde_json::Value) -> Self {
        Payload::Json(value)
    }
}

fn json_to_document(value: serde_json::Value) -> Result<Document> {
    if !value.is_object() {
        return Err(MongoServiceError::payload(
            "the item must be a document, a JSON object or a serializable entity",
        ));
    }
    bson::to_document(&value)
        .map_err(|e| MongoServiceError::payload_with_source("the JSON object could not be converted", e))
}

pub fn to_bson_date(value: DateTime<Utc>) -> Bson {
    Bson::DateTime(bson::DateTime::from_millis(value.timestamp_millis()))
}

/// A BSON date truncated to whole seconds
pub fn to_bson_seconds(value: DateTime<Utc>) -> Bson {
    Bson::DateTime(bson::DateTime::from_millis(value.timestamp() * 1000))
}
