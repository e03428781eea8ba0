//! MongoDB driver core with client-side operation timeouts.
//!
//! Every public operation runs under one `TimeoutContext`, resolved from the operation's own
//! `timeout` or else the client's default. The same budget bounds connection checkout, each
//! command round trip, cursor iteration, and the best-effort cleanup that follows a timeout.
//!
//! ```no_run
//! # async fn run() -> mongodb::Result<()> {
//! use bson::doc;
//! use mongodb::bulk_write::WriteModel;
//! use mongodb::common::Namespace;
//! use mongodb::Client;
//!
//! let client = Client::with_uri_str("mongodb://localhost:27017/?timeoutMS=500")?;
//! let models = vec![WriteModel::insert_one(Namespace::new("db", "coll"), doc! { "x": 1 })];
//! let result = client.bulk_write(models, None).await?;
//! assert_eq!(result.inserted_count, 1);
//! # Ok(())
//! # }
//! ```
pub mod apm;
pub mod bulk_write;
pub mod coll;
pub mod command_type;
pub mod common;
pub mod connection;
pub mod connstring;
pub mod cursor;
pub mod db;
pub mod error;
pub mod executor;
pub mod operation;
pub mod options;
pub mod pool;
pub mod stream;
pub mod timeout;
pub mod topology;
pub mod wire_protocol;

pub use crate::apm::{CommandResult, CommandStarted};
pub use crate::error::{Error, ErrorCode, Result};
pub use crate::options::ClientOptions;
pub use crate::timeout::TimeoutContext;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::apm::Listener;
use crate::bulk_write::{BulkWriteOptions, BulkWriteResult, WriteModel};
use crate::db::Database;
use crate::executor::Executor;
use crate::operation::{BulkWriteOperation, Operation};
use crate::topology::Topology;

/// Interfaces with a MongoDB deployment. Cheap to clone; clones share connection pools.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Client").field("hosts", &self.inner.options.hosts).finish()
    }
}

struct ClientInner {
    options: ClientOptions,
    executor: Executor,
    listener: Arc<Listener>,
}

impl Client {
    /// Creates a client from a MongoDB connection string URI as defined by
    /// [the manual](http://docs.mongodb.org/manual/reference/connection-string/).
    /// Connections are established lazily.
    pub fn with_uri_str(uri: &str) -> Result<Client> {
        Client::with_options(ClientOptions::parse(uri)?)
    }

    /// Creates a client without establishing any connections.
    pub fn with_options(options: ClientOptions) -> Result<Client> {
        options.validate()?;

        let listener = Arc::new(Listener::new());
        let topology = Topology::new(&options.hosts, options.pool_options());
        let executor = Executor::new(topology, listener.clone(), options.socket_timeout);

        Ok(Client {
            inner: Arc::new(ClientInner {
                options,
                executor,
                listener,
            }),
        })
    }

    /// Creates a client and fills each server's pool up to `min_pool_size`, under the client's
    /// default timeout.
    pub async fn connect(options: ClientOptions) -> Result<Client> {
        let client = Client::with_options(options)?;
        let ctx = client.timeout_context(None);

        for server in client.topology().servers() {
            server.pool().populate(&ctx).await?;
        }
        Ok(client)
    }

    pub fn options(&self) -> &ClientOptions {
        &self.inner.options
    }

    pub fn topology(&self) -> &Topology {
        self.inner.executor.topology()
    }

    pub fn executor(&self) -> &Executor {
        &self.inner.executor
    }

    /// Creates a database representation with the client's write concern.
    pub fn database(&self, name: &str) -> Database {
        Database::open(self.clone(), name, None)
    }

    /// The database named in the connection string, if any.
    pub fn default_database(&self) -> Option<Database> {
        self.inner
            .options
            .default_database
            .as_deref()
            .map(|name| self.database(name))
    }

    /// Registers a hook run before every command attempt.
    pub fn add_start_hook<F>(&self, hook: F) -> Result<()>
    where
        F: Fn(&CommandStarted) + Send + Sync + 'static,
    {
        self.inner.listener.add_start_hook(hook)
    }

    /// Registers a hook run after every command attempt, successful or not.
    pub fn add_completion_hook<F>(&self, hook: F) -> Result<()>
    where
        F: for<'a> Fn(&CommandResult<'a>) + Send + Sync + 'static,
    {
        self.inner.listener.add_completion_hook(hook)
    }

    /// A fresh context for one top-level operation. `timeout` overrides the client default.
    pub fn timeout_context(&self, timeout: Option<Duration>) -> TimeoutContext {
        TimeoutContext::resolve(timeout, self.inner.options.timeout)
    }

    /// Runs `op` to completion under a single timeout context.
    pub async fn execute_operation<T: Operation>(
        &self,
        op: T,
        timeout: Option<Duration>,
    ) -> Result<T::O> {
        let ctx = self.timeout_context(timeout);
        debug!(operation = T::NAME, timeout = ?ctx.timeout(), "executing operation");

        let result = op.execute(&self.inner.executor, &ctx).await;
        if let Err(ref e) = result {
            debug!(operation = T::NAME, elapsed = ?ctx.elapsed(), error = %e, "operation failed");
        }
        result
    }

    /// Executes a batch of writes, possibly spanning several namespaces.
    pub async fn bulk_write(
        &self,
        models: Vec<WriteModel>,
        options: impl Into<Option<BulkWriteOptions>>,
    ) -> Result<BulkWriteResult> {
        let options = options.into().unwrap_or_default();
        let timeout = options.timeout;
        let op = BulkWriteOperation::new(models, options, self.inner.options.write_concern.clone());
        self.execute_operation(op, timeout).await
    }

    /// Closes every connection pool. Operations started afterwards fail.
    pub fn shutdown(&self) {
        self.topology().close();
    }
}
