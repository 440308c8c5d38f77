use log::{debug, error, warn};
use std::future::Future;

use super::driver::{DocumentDriver, DriverError};
use super::service::MongoService;
use super::Namespace;
use crate::errors::{MongoServiceError, Result};

/// Fixed retry budget: one call plus `retries` more
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RetryPolicy {
    retries: u32,
}

impl RetryPolicy {
    pub fn new(retries: u32) -> Self {
        Self { retries }
    }

    pub fn retries(&self) -> u32 {
        self.retries
    }

    pub fn max_attempts(&self) -> u32 {
        self.retries.saturating_add(1)
    }
}

/// The driver calls a manager issues
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Find,
    FindOne,
    Insert,
    Update,
    Upsert,
    Remove,
    Count,
    Distinct,
    FindAndModify,
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Find => "find",
            Operation::FindOne => "find one",
            Operation::Insert => "insert",
            Operation::Update => "update",
            Operation::Upsert => "upsert",
            Operation::Remove => "remove",
            Operation::Count => "count",
            Operation::Distinct => "distinct",
            Operation::FindAndModify => "find and modify",
        }
    }

    /// Writes reconnect before they are retried
    pub fn is_mutating(&self) -> bool {
        matches!(
            self,
            Operation::Insert
                | Operation::Update
                | Operation::Upsert
                | Operation::Remove
                | Operation::FindAndModify
        )
    }
}

impl<D: DocumentDriver> MongoService<D> {
    /// Run `call` under the current retry policy
    ///
    /// A duplicate-key error is returned straight away. Any other error is retried until
    /// the budget is spent, reconnecting in between for mutating operations, and the last
    /// error becomes the source of [`MongoServiceError::Operation`].
    pub async fn with_retries<T, F, Fut>(
        &self,
        namespace: &Namespace,
        operation: Operation,
        mut call: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, DriverError>>,
    {
        let policy = self.retry_policy();
        let attempts = policy.max_attempts();
        let mut attempt = 0;

        loop {
            attempt += 1;
            debug!("{} on {} (attempt {}/{})", operation.name(), namespace, attempt, attempts);

            let err = match call().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if err.is_duplicate_key() {
                warn!("{} on {} hit a duplicate key: {}", operation.name(), namespace, err);
                return Err(MongoServiceError::DuplicateKey {
                    namespace: namespace.clone(),
                    source: err,
                });
            }

            if attempt >= attempts {
                error!(
                    "Unable to {} on {} after {} retries: {}",
                    operation.name(),
                    namespace,
                    policy.retries(),
                    err
                );
                return Err(MongoServiceError::Operation {
                    operation: operation.name(),
                    namespace: namespace.clone(),
                    retries: policy.retries(),
                    source: err,
                });
            }

            warn!(
                "{} on {} failed (attempt {}/{}): {}",
                operation.name(),
                namespace,
                attempt,
                attempts,
                err
            );

            if operation.is_mutating() {
                if let Err(e) = self.reconnect().await {
                    warn!("Reconnect before retrying {} failed: {}", operation.name(), e);
                }
            }
        }
    }
}
