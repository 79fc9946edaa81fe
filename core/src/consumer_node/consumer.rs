use std::time::Instant;

use async_std::task;
use rand::seq::SliceRandom;
use tracing::{debug, info, warn};

use super::{circuit::Circuit, onionizer::Onionizer};
use crate::{
    config::ClientConfig,
    crypto::ClientSecret,
    error::{Error, Result},
    protocol::{
        io::{receive_envelope_within, send_envelope, Transport},
        onion::{Command, Data, Envelope, Onion, Port, Relay, TorHeader},
    },
    uid_generator::UIDGenerator,
};

/// The client: builds a circuit hop by hop through randomly chosen relays,
/// then talks to the server through it.
pub struct Consumer<T: Transport> {
    transport: T,
    relays: Vec<Relay>,
    server_port: Port,
    config: ClientConfig,
    circ_id_generator: UIDGenerator,
    route: Vec<Relay>,
    circuits: Vec<Circuit>,
    exit_circuit_id: Option<u32>,
}

impl<T: Transport> Consumer<T> {
    pub fn new(transport: T, relays: Vec<Relay>, server_port: Port, config: ClientConfig) -> Self {
        Self {
            transport,
            relays,
            server_port,
            config,
            circ_id_generator: UIDGenerator::new(0),
            route: Vec::new(),
            circuits: Vec::new(),
            exit_circuit_id: None,
        }
    }

    pub fn port(&self) -> Port {
        self.transport.port()
    }

    /// The relays of the current circuit, in construction order.
    pub fn route(&self) -> &[Relay] {
        &self.route
    }

    /// The established hops, hop 0 first.
    pub fn circuits(&self) -> &[Circuit] {
        &self.circuits
    }

    /// Builds a circuit through `relay_count` distinct relays chosen at random.
    ///
    /// Any previous circuit is discarded first. Each hop is created through
    /// the hops before it; if any hop fails the whole build is aborted and no
    /// partial circuit is kept. The ids used are fresh for this client, so a
    /// failed build can simply be retried.
    pub async fn build_circuit(&mut self, relay_count: usize) -> Result<()> {
        if relay_count == 0 || relay_count > self.relays.len() {
            return Err(Error::protocol(format!(
                "cannot build a circuit of {} relays from {} known relays",
                relay_count,
                self.relays.len()
            )));
        }
        self.route.clear();
        self.circuits.clear();
        self.exit_circuit_id = None;

        let route: Vec<Relay> = self
            .relays
            .choose_multiple(&mut rand::thread_rng(), relay_count)
            .copied()
            .collect();
        let route_str: String = route
            .iter()
            .map(|relay| format!("Relay {} -- ", relay.id))
            .collect();
        info!("route: Client -- {}Server", route_str);

        // One id per hop, plus one for the link from the last hop to the server.
        let circuit_ids = self.circ_id_generator.get_uids(relay_count + 1)?;
        let entry_port = route[0].port;
        let entry_id = circuit_ids[0];

        let mut circuits = Vec::with_capacity(relay_count);
        for (hop, relay) in route.iter().enumerate() {
            let circuit = self
                .extend_to(relay, circuit_ids[hop], (entry_id, entry_port), &circuits)
                .await
                .map_err(|err| Error::BuildAborted {
                    hop,
                    source: Box::new(err),
                })?;
            info!(
                "hop {} established: circuit {} through relay {} on port {}",
                hop, circuit.circuit_id, relay.id, relay.port
            );
            circuits.push(circuit);
        }

        self.route = route;
        self.circuits = circuits;
        self.exit_circuit_id = Some(circuit_ids[relay_count]);
        Ok(())
    }

    // Runs one CREATE/CREATED round trip with `relay`, tunnelled through the
    // hops already established
    // param entry: The id and port of hop 0, which every reply comes back through
    async fn extend_to(
        &self,
        relay: &Relay,
        circuit_id: u32,
        entry: (u32, Port),
        established: &[Circuit],
    ) -> Result<Circuit> {
        let (entry_id, entry_port) = entry;
        let secret = task::spawn_blocking(ClientSecret::generate).await?;
        let create = Onion::new(
            TorHeader::new(circuit_id, Command::Create),
            Data::PublicKey(secret.public_key().to_string()),
            relay.port,
        );
        if !established.is_empty() {
            info!("applying {} layers of encryption", established.len());
        }
        let onion = Onionizer::grow_onion(create, established, Command::Extend)?;

        send_envelope(&self.transport, &onion.into_envelope(self.port()), entry_port).await?;

        let expected = if established.is_empty() {
            Command::Created
        } else {
            Command::Extended
        };
        let reply = self.receive(expected, entry_id).await?;
        let sealed_key = match Onionizer::peel_onion(reply.data, established)? {
            Data::SessionKey(sealed_key) => sealed_key,
            other => {
                return Err(Error::protocol(format!(
                    "expected a session key, got {}",
                    other.describe()
                )))
            }
        };

        debug!("storing session key for port {}", relay.port);
        Ok(Circuit {
            circuit_id,
            session_key: secret.session_key(&sealed_key)?,
            upstream_port: relay.port,
        })
    }

    /// Sends `message` to the server through the circuit.
    pub async fn send_request(&self, message: &str) -> Result<()> {
        let (entry, exit_circuit_id) = match (self.circuits.first(), self.exit_circuit_id) {
            (Some(entry), Some(exit_circuit_id)) => (entry, exit_circuit_id),
            _ => return Err(Error::protocol("no circuit has been built")),
        };

        let request = Onion::new(
            TorHeader::new(exit_circuit_id, Command::RelayForward),
            Data::Message(message.to_string()),
            self.server_port,
        );
        let onion = Onionizer::grow_onion(request, &self.circuits, Command::RelayForward)?;
        info!("sending request through {} hops", self.circuits.len());

        send_envelope(&self.transport, &onion.into_envelope(self.port()), entry.upstream_port).await
    }

    /// Waits for the server's response and peels every layer off it.
    pub async fn receive_response(&self) -> Result<String> {
        let entry = self
            .circuits
            .first()
            .ok_or_else(|| Error::protocol("no circuit has been built"))?;

        let reply = self.receive(Command::RelayBackward, entry.circuit_id).await?;
        match Onionizer::peel_onion(reply.data, &self.circuits)? {
            Data::Message(response) => {
                info!("response: {:?}", response);
                Ok(response)
            }
            other => Err(Error::protocol(format!(
                "expected a response message, got {}",
                other.describe()
            ))),
        }
    }

    /// Sends `message` and waits for the response.
    pub async fn request(&self, message: &str) -> Result<String> {
        self.send_request(message).await?;
        self.receive_response().await
    }

    // Waits for the next reply on link `circuit_id`. Replies on other ids are
    // leftovers of an earlier build or duplicates, and are skipped until the
    // receive timeout runs out.
    async fn receive(&self, expected: Command, circuit_id: u32) -> Result<Envelope> {
        let timeout = self.config.receive_timeout;
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(Error::Timeout(timeout));
            }
            let reply = receive_envelope_within(&self.transport, remaining)
                .await
                .map_err(|err| match err {
                    Error::Timeout(_) => Error::Timeout(timeout),
                    other => other,
                })?;
            if reply.tor_header.circuit_id != circuit_id {
                warn!(
                    "skipping {} from port {}, waiting on circuit {}",
                    reply.tor_header, reply.sender_port, circuit_id
                );
                continue;
            }
            if reply.tor_header.cmd != expected {
                return Err(Error::protocol(format!(
                    "expected {}, got {}",
                    expected, reply.tor_header
                )));
            }
            return Ok(reply);
        }
    }
}
