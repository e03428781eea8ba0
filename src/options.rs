//! Client configuration.
use std::time::Duration;

use crate::common::WriteConcern;
use crate::connstring::{self, ConnectionString, Host, DEFAULT_PORT};
use crate::error::Error::ArgumentError;
use crate::error::Result;
use crate::pool::{PoolOptions, DEFAULT_MAX_POOL_SIZE};
use crate::stream::StreamConnector;

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Options for a `Client`. Durations of zero are treated as unset, except `timeout`, where an
/// explicit zero disables client-side timeouts.
#[derive(Clone, Debug)]
pub struct ClientOptions {
    pub hosts: Vec<Host>,
    pub default_database: Option<String>,
    /// The default budget for each operation, overridable per operation.
    pub timeout: Option<Duration>,
    pub max_pool_size: u32,
    pub min_pool_size: u32,
    /// How long a checkout may wait for a connection once the pool is full.
    pub wait_queue_timeout: Option<Duration>,
    pub socket_timeout: Option<Duration>,
    pub connect_timeout: Option<Duration>,
    pub max_idle_time: Option<Duration>,
    pub write_concern: WriteConcern,
    pub stream_connector: StreamConnector,
}

impl Default for ClientOptions {
    fn default() -> Self {
        ClientOptions {
            hosts: vec![Host::new("localhost", DEFAULT_PORT)],
            default_database: None,
            timeout: None,
            max_pool_size: DEFAULT_MAX_POOL_SIZE,
            min_pool_size: 0,
            wait_queue_timeout: None,
            socket_timeout: None,
            connect_timeout: Some(DEFAULT_CONNECT_TIMEOUT),
            max_idle_time: None,
            write_concern: WriteConcern::new(),
            stream_connector: StreamConnector::Tcp,
        }
    }
}

impl ClientOptions {
    pub fn new() -> ClientOptions {
        Default::default()
    }

    /// Parses a `mongodb://` connection string.
    pub fn parse(uri: &str) -> Result<ClientOptions> {
        let config = connstring::parse(uri)?;
        ClientOptions::from_connection_string(config)
    }

    fn from_connection_string(config: ConnectionString) -> Result<ClientOptions> {
        let mut options = ClientOptions {
            hosts: config.hosts.clone(),
            default_database: config.database.clone(),
            ..Default::default()
        };

        options.timeout = config.get_u64("timeoutMS")?.map(Duration::from_millis);
        if let Some(max) = config.get_u64("maxPoolSize")? {
            options.max_pool_size = to_u32("maxPoolSize", max)?;
        }
        if let Some(min) = config.get_u64("minPoolSize")? {
            options.min_pool_size = to_u32("minPoolSize", min)?;
        }
        options.wait_queue_timeout = millis(&config, "waitQueueTimeoutMS")?;
        options.socket_timeout = millis(&config, "socketTimeoutMS")?;
        options.max_idle_time = millis(&config, "maxIdleTimeMS")?;
        if let Some(connect_timeout) = config.get_u64("connectTimeoutMS")? {
            options.connect_timeout =
                Some(Duration::from_millis(connect_timeout)).filter(|d| !d.is_zero());
        }

        if let Some(w) = config.get("w") {
            let w = w
                .parse::<i32>()
                .map_err(|_| ArgumentError(format!("w must be an integer, got '{}'.", w)))?;
            options.write_concern = WriteConcern::with_w(w);
        }

        options.validate()?;
        Ok(options)
    }

    pub fn validate(&self) -> Result<()> {
        if self.hosts.is_empty() {
            return Err(ArgumentError("At least one host is required.".to_owned()));
        }
        if self.max_pool_size != 0 && self.min_pool_size > self.max_pool_size {
            return Err(ArgumentError(format!(
                "minPoolSize ({}) must not exceed maxPoolSize ({}).",
                self.min_pool_size, self.max_pool_size
            )));
        }
        Ok(())
    }

    pub(crate) fn pool_options(&self) -> PoolOptions {
        PoolOptions {
            max_pool_size: self.max_pool_size,
            min_pool_size: self.min_pool_size,
            wait_queue_timeout: self.wait_queue_timeout.filter(|d| !d.is_zero()),
            max_idle_time: self.max_idle_time.filter(|d| !d.is_zero()),
            connect_timeout: self.connect_timeout.filter(|d| !d.is_zero()),
            connector: self.stream_connector.clone(),
        }
    }
}

fn millis(config: &ConnectionString, key: &str) -> Result<Option<Duration>> {
    Ok(config
        .get_u64(key)?
        .map(Duration::from_millis)
        .filter(|d| !d.is_zero()))
}

fn to_u32(key: &str, value: u64) -> Result<u32> {
    u32::try_from(value).map_err(|_| ArgumentError(format!("{} is out of range: {}.", key, value)))
}
