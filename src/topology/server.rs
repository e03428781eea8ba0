use std::fmt;

use tracing::debug;

use crate::connection::StreamDescription;
use crate::connstring::Host;
use crate::error::Result;
use crate::pool::{ConnectionPool, PoolOptions, PooledConnection};
use crate::timeout::TimeoutContext;

/// Holds connection information about a single server.
#[derive(Clone)]
pub struct Server {
    /// Host connection details.
    pub host: Host,
    /// The connection pool for this server.
    pool: ConnectionPool,
}

impl fmt::Debug for Server {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Server").field("host", &self.host).finish()
    }
}

impl Server {
    pub fn new(host: Host, options: PoolOptions) -> Server {
        Server {
            pool: ConnectionPool::with_options(host.clone(), options),
            host,
        }
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    /// Returns a server stream from the pool.
    pub async fn acquire_stream(&self, ctx: &TimeoutContext) -> Result<PooledConnection> {
        self.pool.check_out(ctx).await
    }

    /// Server limits from the handshake. If no connection has been established yet, one is
    /// checked out (and returned) to perform the handshake.
    pub async fn description(&self, ctx: &TimeoutContext) -> Result<StreamDescription> {
        if let Some(description) = self.pool.description() {
            return Ok(description);
        }
        let conn = self.pool.check_out(ctx).await?;
        Ok(*conn.description())
    }

    /// Invalidates pooled connections after a network failure on this server.
    pub fn handle_network_error(&self) {
        debug!(host = %self.host, "network error; clearing connection pool");
        self.pool.clear();
    }
}
