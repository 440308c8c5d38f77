use log::{debug, info, warn};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use super::descriptor::ConnectionDescriptor;
use super::driver::{DocumentDriver, DriverError};
use super::mongodb::MongoDriver;
use super::retry::RetryPolicy;
use crate::errors::{MongoServiceError, Result};

/// Connection wrapper shared by the CRUD managers
///
/// Owns the driver handle together with the retry count and the pause taken before
/// every reconnect. Managers hold it behind an `Arc`; both settings can be changed
/// through a shared reference.
#[derive(Debug)]
pub struct MongoService<D = MongoDriver> {
    driver: D,
    retries: AtomicU32,
    retry_sleep_nanos: AtomicU64,
}

impl MongoService<MongoDriver> {
    /// Connect to the server described by `descriptor`
    pub async fn connect(descriptor: &ConnectionDescriptor) -> Result<Self> {
        let driver = MongoDriver::from_descriptor(descriptor);
        Self::open(driver, descriptor.retries(), descriptor.retry_sleep()).await
    }
}

impl<D: DocumentDriver> MongoService<D> {
    /// Wrap `driver` and open it, trying up to `retries + 1` times
    pub async fn open(driver: D, retries: u32, retry_sleep: Duration) -> Result<Self> {
        let service = Self {
            driver,
            retries: AtomicU32::new(retries),
            retry_sleep_nanos: AtomicU64::new(duration_nanos(retry_sleep)),
        };

        let attempts = RetryPolicy::new(retries).max_attempts();
        let mut attempt = 0;
        loop {
            attempt += 1;
            service.driver.close().await;
            match service.driver.connect().await {
                Ok(()) => break,
                Err(e) if attempt >= attempts => {
                    return Err(MongoServiceError::Connection { retries, source: e });
                }
                Err(e) => warn!("Connect attempt {}/{} failed: {}", attempt, attempts, e),
            }
        }

        Ok(service)
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// Swap the driver handle, returning the previous one
    pub fn set_driver(&mut self, driver: D) -> D {
        std::mem::replace(&mut self.driver, driver)
    }

    pub fn retries(&self) -> u32 {
        self.retries.load(Ordering::Relaxed)
    }

    pub fn set_retries(&self, retries: u32) -> &Self {
        self.retries.store(retries, Ordering::Relaxed);
        self
    }

    pub fn retry_sleep(&self) -> Duration {
        Duration::from_nanos(self.retry_sleep_nanos.load(Ordering::Relaxed))
    }

    pub fn set_retry_sleep(&self, retry_sleep: Duration) -> &Self {
        self.retry_sleep_nanos
            .store(duration_nanos(retry_sleep), Ordering::Relaxed);
        self
    }

    /// The policy operations run under right now
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retries())
    }

    /// Sleep, force-close and reopen the connection
    pub async fn reconnect(&self) -> std::result::Result<(), DriverError> {
        let retry_sleep = self.retry_sleep();
        if !retry_sleep.is_zero() {
            debug!("Sleeping {:?} before reconnecting", retry_sleep);
            tokio::time::sleep(retry_sleep).await;
        }
        self.driver.close().await;
        self.driver.connect().await
    }

    /// Close the underlying client
    pub async fn shutdown(&self) {
        info!("Shutting down MongoDB connection");
        self.driver.close().await;
    }
}

// Saturates at roughly 584 years
fn duration_nanos(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::testing::FakeDriver;
    use std::error::Error;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_open_succeeds_after_failures() {
        let driver = FakeDriver::new();
        driver.fail_connects(2);

        let service = MongoService::open(driver, 2, Duration::ZERO).await.unwrap();
        assert_eq!(service.driver().connect_calls(), 3);
        assert!(service.driver().is_open());
    }

    #[tokio::test]
    async fn test_open_gives_up_after_retries() {
        let driver = FakeDriver::new();
        driver.fail_connects(3);

        let err = MongoService::open(driver, 2, Duration::ZERO).await.unwrap_err();
        assert!(matches!(err, MongoServiceError::Connection { retries: 2, .. }));
        assert_eq!(err.to_string(), "Unable to connect to Mongo after 2 retries");
        assert!(err.source().is_some());
    }

    #[tokio::test]
    async fn test_zero_retries_means_single_attempt() {
        let driver = FakeDriver::new();
        driver.fail_connects(1);

        let err = MongoService::open(driver, 0, Duration::ZERO).await.unwrap_err();
        assert!(matches!(err, MongoServiceError::Connection { .. }));
    }

    #[tokio::test]
    async fn test_reconnect_closes_then_opens() {
        let service = MongoService::open(FakeDriver::new(), 1, Duration::ZERO)
            .await
            .unwrap();
        let closes = service.driver().close_calls();

        service.reconnect().await.unwrap();
        assert_eq!(service.driver().close_calls(), closes + 1);
        assert_eq!(service.driver().connect_calls(), 2);
        assert!(service.driver().is_open());

        service.shutdown().await;
        assert!(!service.driver().is_open());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_sleeps_configured_duration() {
        let service = MongoService::open(FakeDriver::new(), 1, Duration::from_secs(5))
            .await
            .unwrap();

        let started = tokio::time::Instant::now();
        service.reconnect().await.unwrap();
        assert!(started.elapsed() >= Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_sleep_changes_through_shared_handle() {
        let service = Arc::new(
            MongoService::open(FakeDriver::new(), 1, Duration::ZERO)
                .await
                .unwrap(),
        );
        let shared = Arc::clone(&service);

        shared.set_retry_sleep(Duration::from_secs(3)).set_retries(4);
        assert_eq!(service.retry_sleep(), Duration::from_secs(3));
        assert_eq!(service.retries(), 4);

        let started = tokio::time::Instant::now();
        service.reconnect().await.unwrap();
        assert!(started.elapsed() >= Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_retry_setters() {
        let mut service = MongoService::open(FakeDriver::new(), 1, Duration::ZERO)
            .await
            .unwrap();
        service.set_retries(7);
        service.set_retry_sleep(Duration::from_millis(10));

        assert_eq!(service.retries(), 7);
        assert_eq!(service.retry_policy().max_attempts(), 8);
        assert_eq!(service.retry_sleep(), Duration::from_millis(10));

        let previous = service.set_driver(FakeDriver::new());
        assert!(previous.is_open());
        assert!(!service.driver().is_open());
    }
}
