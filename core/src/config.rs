use std::time::Duration;

use crate::{
    error::{Error, Result},
    protocol::onion::{Port, Relay, RelayId},
};

/// How long the client waits for each reply.
pub const DEFAULT_RECEIVE_TIMEOUT: Duration = Duration::from_secs(10);

pub const CLIENT_NODE: usize = 0;
pub const SERVER_NODE: usize = 1;
/// Index of the first relay; client and server occupy the slots before it.
pub const FIRST_RELAY_NODE: usize = 2;

/// The port layout of a simulation: `node_count` consecutive ports starting at
/// `start_port`, one per node. Node 0 is the client, node 1 the server and
/// every node after that a relay whose id is its node index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Topology {
    start_port: Port,
    node_count: usize,
}

impl Topology {
    pub fn contiguous(start_port: Port, node_count: usize) -> Result<Self> {
        if node_count <= FIRST_RELAY_NODE {
            return Err(Error::Config(format!(
                "need at least {} nodes for a client, a server and one relay, got {}",
                FIRST_RELAY_NODE + 1,
                node_count
            )));
        }
        let last = (start_port as usize).checked_add(node_count - 1);
        if last.map_or(true, |last| last > Port::MAX as usize) {
            return Err(Error::Config(format!(
                "{} nodes starting at port {} run past port {}",
                node_count,
                start_port,
                Port::MAX
            )));
        }

        Ok(Self {
            start_port,
            node_count,
        })
    }

    pub fn node_count(&self) -> usize {
        self.node_count
    }

    pub fn port_of(&self, node: usize) -> Port {
        self.start_port + node as Port
    }

    pub fn client_port(&self) -> Port {
        self.port_of(CLIENT_NODE)
    }

    pub fn server_port(&self) -> Port {
        self.port_of(SERVER_NODE)
    }

    pub fn relays(&self) -> Vec<Relay> {
        (FIRST_RELAY_NODE..self.node_count)
            .map(|node| Relay {
                id: node as RelayId,
                port: self.port_of(node),
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientConfig {
    pub receive_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            receive_timeout: DEFAULT_RECEIVE_TIMEOUT,
        }
    }
}
