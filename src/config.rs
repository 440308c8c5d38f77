use anyhow::{anyhow, Result};
use log::{error, info};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::database::ConnectionDescriptor;

pub const DEFAULT_CONFIG_PATH: &str = "config/config.toml";

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Config {
    pub database: MongoDbConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MongoDbConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub replica_set: Option<String>,
    pub retries: u32,
    pub retry_sleep_ms: u64,
    #[serde(default)]
    pub connection_timeout_ms: Option<u64>,
    #[serde(default)]
    pub max_pool_size: Option<u32>,
    /// Pin the Stable API V1 (MongoDB Atlas)
    #[serde(default)]
    pub server_api: bool,
}

impl Default for MongoDbConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 27017,
            database: "app".to_string(),
            username: None,
            password: None,
            replica_set: None,
            retries: 3,
            retry_sleep_ms: 500,
            connection_timeout_ms: Some(5000),
            max_pool_size: Some(10),
            server_api: false,
        }
    }
}

impl MongoDbConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.host.is_empty() {
            return Err(anyhow!("MongoDB host not configured"));
        }

        if self.port == 0 {
            return Err(anyhow!("MongoDB port not configured"));
        }

        if self.database.is_empty() {
            return Err(anyhow!("MongoDB database name not configured"));
        }

        let has_user = self.username.as_deref().is_some_and(|u| !u.is_empty());
        let has_pass = self.password.as_deref().is_some_and(|p| !p.is_empty());
        if has_user != has_pass {
            return Err(anyhow!(
                "MongoDB username and password must be configured together"
            ));
        }

        Ok(())
    }

    pub fn descriptor(&self) -> ConnectionDescriptor {
        let mut descriptor = ConnectionDescriptor::new(&self.host, self.port, &self.database)
            .with_retries(self.retries)
            .with_retry_sleep(Duration::from_millis(self.retry_sleep_ms))
            .with_server_api(self.server_api);

        if let (Some(username), Some(password)) = (&self.username, &self.password) {
            descriptor = descriptor.with_credentials(username, password);
        }
        if let Some(replica_set) = &self.replica_set {
            descriptor = descriptor.with_replica_set(replica_set);
        }
        if let Some(timeout) = self.connection_timeout_ms {
            descriptor = descriptor.with_connect_timeout(Duration::from_millis(timeout));
        }
        if let Some(max_pool_size) = self.max_pool_size {
            descriptor = descriptor.with_max_pool_size(max_pool_size);
        }

        descriptor
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_or_env(DEFAULT_CONFIG_PATH)
    }

    /// Load `path`, falling back to environment variables over the defaults
    pub fn load_or_env<P: AsRef<Path>>(path: P) -> Result<Self> {
        info!("Loading config from {}", path.as_ref().display());
        let config = match Self::load_from_file(&path) {
            Ok(config) => {
                info!("Config loaded from file");
                config
            }
            Err(e) => {
                error!("Failed to load config from file: {}", e);
                info!("Falling back to environment variables or defaults");
                Self::from_env()
            }
        };

        config.database.validate()?;
        Ok(config)
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    pub fn from_env() -> Self {
        let mut config = Config::default();
        let database = &mut config.database;

        if let Ok(host) = std::env::var("MONGODB_HOST") {
            database.host = host;
        }

        if let Some(port) = env_parse("MONGODB_PORT") {
            database.port = port;
        }

        if let Ok(name) = std::env::var("MONGODB_DATABASE") {
            database.database = name;
        }

        if let Ok(username) = std::env::var("MONGODB_USERNAME") {
            database.username = Some(username);
        }

        if let Ok(password) = std::env::var("MONGODB_PASSWORD") {
            database.password = Some(password);
        }

        if let Ok(replica_set) = std::env::var("MONGODB_REPLICA_SET") {
            database.replica_set = Some(replica_set);
        }

        if let Some(retries) = env_parse("MONGODB_RETRIES") {
            database.retries = retries;
        }

        if let Some(sleep) = env_parse("MONGODB_RETRY_SLEEP_MS") {
            database.retry_sleep_ms = sleep;
        }

        if let Some(timeout) = env_parse("MONGODB_CONNECT_TIMEOUT_MS") {
            database.connection_timeout_ms = Some(timeout);
        }

        if let Some(max_pool_size) = env_parse("MONGODB_MAX_POOL_SIZE") {
            database.max_pool_size = Some(max_pool_size);
        }

        if let Some(server_api) = env_parse("MONGODB_SERVER_API") {
            database.server_api = server_api;
        }

        config
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|value| value.parse().ok())
}
