use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use std::time::Duration;

pub const MONGO_PREFIX: &str = "mongodb://";

/// Everything needed to open (and reopen) one MongoDB connection
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionDescriptor {
    host: String,
    port: u16,
    database: String,
    username: Option<String>,
    password: Option<String>,
    replica_set: Option<String>,
    retries: u32,
    retry_sleep: Duration,
    connect_timeout: Option<Duration>,
    max_pool_size: Option<u32>,
    server_api: bool,
}

impl ConnectionDescriptor {
    pub fn new(host: impl Into<String>, port: u16, database: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            database: database.into(),
            username: None,
            password: None,
            replica_set: None,
            retries: 0,
            retry_sleep: Duration::ZERO,
            connect_timeout: None,
            max_pool_size: None,
            server_api: false,
        }
    }

    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    pub fn with_replica_set(mut self, replica_set: impl Into<String>) -> Self {
        self.replica_set = Some(replica_set.into());
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn with_retry_sleep(mut self, retry_sleep: Duration) -> Self {
        self.retry_sleep = retry_sleep;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    pub fn with_max_pool_size(mut self, max_pool_size: u32) -> Self {
        self.max_pool_size = Some(max_pool_size);
        self
    }

    /// Pin the Stable API version (needed by MongoDB Atlas)
    pub fn with_server_api(mut self, server_api: bool) -> Self {
        self.server_api = server_api;
        self
    }

    /// Build the connection string
    ///
    /// `mongodb://[user:pass@]host:port/db`, or `mongodb://[user:pass@]host/db?replicaSet=name`
    /// when a replica set is named. The host may then list several `host:port` seeds.
    pub fn uri(&self) -> String {
        let mut uri = String::from(MONGO_PREFIX);

        if let (Some(user), Some(pass)) = (self.username.as_deref(), self.password.as_deref()) {
            if !user.is_empty() && !pass.is_empty() {
                uri.push_str(&format!(
                    "{}:{}@",
                    utf8_percent_encode(user, NON_ALPHANUMERIC),
                    utf8_percent_encode(pass, NON_ALPHANUMERIC)
                ));
            }
        }

        match self.replica_set.as_deref().filter(|name| !name.is_empty()) {
            Some(replica_set) => uri.push_str(&format!(
                "{}/{}?replicaSet={}",
                self.host,
                self.database,
                utf8_percent_encode(replica_set, NON_ALPHANUMERIC)
            )),
            None => uri.push_str(&format!("{}:{}/{}", self.host, self.port, self.database)),
        }

        uri
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn replica_set(&self) -> Option<&str> {
        self.replica_set.as_deref()
    }

    pub fn retries(&self) -> u32 {
        self.retries
    }

    pub fn retry_sleep(&self) -> Duration {
        self.retry_sleep
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout
    }

    pub fn max_pool_size(&self) -> Option<u32> {
        self.max_pool_size
    }

    pub fn server_api(&self) -> bool {
        self.server_api
    }

    pub fn set_retries(&mut self, retries: u32) -> &mut Self {
        self.retries = retries;
        self
    }

    pub fn set_retry_sleep(&mut self, retry_sleep: Duration) -> &mut Self {
        self.retry_sleep = retry_sleep;
        self
    }

    pub fn set_replica_set(&mut self, replica_set: Option<String>) -> &mut Self {
        self.replica_set = replica_set;
        self
    }
}
