pub mod server;

use std::collections::HashMap;
use std::sync::Arc;

use rand::seq::SliceRandom;
use rand::thread_rng;

use crate::connstring::Host;
use crate::error::Error::ServerSelectionError;
use crate::error::Result;
use crate::pool::PoolOptions;
use crate::timeout::TimeoutContext;

pub use self::server::Server;

/// Holds the known servers of a deployment. Servers are seeded from the configured hosts and are
/// never rediscovered.
#[derive(Clone, Debug)]
pub struct Topology {
    servers: Arc<HashMap<Host, Server>>,
}

impl Topology {
    pub fn new(hosts: &[Host], options: PoolOptions) -> Topology {
        let servers = hosts
            .iter()
            .map(|host| (host.clone(), Server::new(host.clone(), options.clone())))
            .collect();

        Topology {
            servers: Arc::new(servers),
        }
    }

    pub fn server(&self, host: &Host) -> Option<&Server> {
        self.servers.get(host)
    }

    pub fn servers(&self) -> impl Iterator<Item = &Server> {
        self.servers.values()
    }

    /// Picks a server at random, preferring those not in `deprioritized`. Falls back to the
    /// deprioritized servers when nothing else is known.
    pub fn select_server(&self, deprioritized: &[Host], ctx: &TimeoutContext) -> Result<Server> {
        ctx.check("server selection")?;

        if self.servers.is_empty() {
            return Err(ServerSelectionError(
                "No servers are available for the given topology.".to_owned(),
            ));
        }

        let preferred: Vec<&Server> = self
            .servers
            .values()
            .filter(|s| !deprioritized.contains(&s.host))
            .collect();

        let candidates = if preferred.is_empty() {
            self.servers.values().collect()
        } else {
            preferred
        };

        match candidates.choose(&mut thread_rng()) {
            Some(server) => Ok((*server).clone()),
            None => Err(ServerSelectionError(
                "No servers are available for the given topology.".to_owned(),
            )),
        }
    }

    /// Closes every server's pool.
    pub fn close(&self) {
        for server in self.servers.values() {
            server.pool().close();
        }
    }
}
