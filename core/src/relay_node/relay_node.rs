use tracing::{info, warn};

use super::relay_context::RelayContext;
use crate::{
    crypto::{self, SessionKey},
    error::{Error, Result},
    protocol::{
        io::{send_envelope, Transport},
        onion::{Command, Data, Envelope, Onion, Port, RelayId, Reply, TorHeader},
    },
};

/// A relay: one sequential loop that peels a layer off everything travelling
/// away from the client and adds one to everything travelling back.
pub struct RelayNode<T: Transport> {
    id: RelayId,
    transport: T,
    context: RelayContext,
}

impl<T: Transport> RelayNode<T> {
    pub fn new(id: RelayId, transport: T) -> Self {
        Self {
            id,
            transport,
            context: RelayContext::new(),
        }
    }

    pub fn id(&self) -> RelayId {
        self.id
    }

    pub fn port(&self) -> Port {
        self.transport.port()
    }

    pub fn context(&self) -> &RelayContext {
        &self.context
    }

    // Serves messages until the transport fails. A message that cannot be
    // handled is logged and dropped; it never stops the loop.
    pub async fn start(&mut self) -> Result<()> {
        info!(relay = self.id, "listening on port {}", self.port());
        loop {
            let (bytes, from) = self.transport.receive().await?;
            if let Err(err) = self.handle_datagram(&bytes).await {
                warn!(relay = self.id, "dropped message from {}: {}", from, err);
            }
        }
    }

    pub async fn handle_datagram(&mut self, bytes: &[u8]) -> Result<()> {
        let envelope = Envelope::from_bytes(bytes)?;
        self.handle_envelope(envelope).await
    }

    pub async fn handle_envelope(&mut self, envelope: Envelope) -> Result<()> {
        let Envelope {
            tor_header,
            data,
            sender_port,
            ..
        } = envelope;
        info!(
            relay = self.id,
            "inbound {} from port {}: {}",
            tor_header,
            sender_port,
            data.describe()
        );

        match tor_header.cmd {
            Command::Create => self.create(tor_header, data, sender_port).await,
            Command::Extend => self.extend(tor_header, data).await,
            Command::Created | Command::Extended => self.created_or_extended(tor_header, data).await,
            Command::RelayForward => self.relay_forward(tor_header, data).await,
            Command::RelayBackward => self.relay_backward(tor_header, data).await,
        }
    }

    async fn create(&mut self, tor_header: TorHeader, data: Data, sender_port: Port) -> Result<()> {
        let public_key = match data {
            Data::PublicKey(public_key) => public_key,
            other => {
                return Err(Error::protocol(format!(
                    "CREATE carries {} instead of a public key",
                    other.describe()
                )))
            }
        };

        let session_key = SessionKey::generate();
        let sealed_key = crypto::seal_session_key(&public_key, &session_key)?;
        self.context
            .create(tor_header.circuit_id, session_key, sender_port)?;
        info!(
            relay = self.id,
            "circuit {} initialized, downstream port {}", tor_header.circuit_id, sender_port
        );

        self.send(
            TorHeader::new(tor_header.circuit_id, Command::Created),
            Data::SessionKey(sealed_key),
            sender_port,
        )
        .await
    }

    async fn extend(&mut self, tor_header: TorHeader, data: Data) -> Result<()> {
        let onion = self.peel(tor_header, &data)?;
        if !matches!(onion.tor_header.cmd, Command::Create | Command::Extend) {
            return Err(Error::protocol(format!(
                "EXTEND wraps {} instead of CREATE or EXTEND",
                onion.tor_header
            )));
        }

        self.forward(tor_header.circuit_id, onion).await
    }

    async fn relay_forward(&mut self, tor_header: TorHeader, data: Data) -> Result<()> {
        let onion = self.peel(tor_header, &data)?;
        if onion.tor_header.cmd != Command::RelayForward {
            return Err(Error::protocol(format!(
                "RELAY_FORWARD wraps {}",
                onion.tor_header
            )));
        }

        self.forward(tor_header.circuit_id, onion).await
    }

    async fn created_or_extended(&mut self, tor_header: TorHeader, data: Data) -> Result<()> {
        let circuit = self.context.by_next_id(tor_header.circuit_id)?;
        let (circuit_id, downstream_port) = (circuit.circuit_id, circuit.downstream_port);
        let sealed = Reply::seal(data, &circuit.session_key)?;
        info!(
            relay = self.id,
            "circuit {} extended, passing confirmation to port {}", circuit_id, downstream_port
        );

        self.send(
            TorHeader::new(circuit_id, Command::Extended),
            sealed,
            downstream_port,
        )
        .await
    }

    // Replies from upstream are only routed through a next-id link; there is
    // no fallback to neighbouring own ids.
    async fn relay_backward(&mut self, tor_header: TorHeader, data: Data) -> Result<()> {
        let circuit = self
            .context
            .by_next_id(tor_header.circuit_id)
            .map_err(|_| {
                Error::protocol(format!(
                    "RELAY_BACKWARD on id {} that no circuit extends to",
                    tor_header.circuit_id
                ))
            })?;
        let (circuit_id, downstream_port) = (circuit.circuit_id, circuit.downstream_port);
        let sealed = Reply::seal(data, &circuit.session_key)?;

        self.send(
            TorHeader::new(circuit_id, Command::RelayBackward),
            sealed,
            downstream_port,
        )
        .await
    }

    // Peels this relay's layer off the data of an EXTEND or RELAY_FORWARD
    fn peel(&self, tor_header: TorHeader, data: &Data) -> Result<Onion> {
        let circuit = self.context.by_own_id(tor_header.circuit_id)?;
        let ciphertext = data
            .as_cipher()
            .ok_or_else(|| Error::protocol(format!("{} carries plaintext", tor_header)))?;
        let onion = Onion::open(&circuit.session_key, ciphertext)?;
        info!(
            relay = self.id,
            "peeled {}: {} for port {}",
            tor_header,
            onion.tor_header,
            onion.target_port
        );
        Ok(onion)
    }

    // Passes a peeled onion on to its target, remembering the id the target
    // will answer with
    async fn forward(&mut self, own_id: u32, onion: Onion) -> Result<()> {
        let target_port = onion.target_port;
        self.context
            .link_next(own_id, onion.tor_header.circuit_id, target_port)?;

        let envelope = onion.into_envelope(self.port());
        info!(
            relay = self.id,
            "outbound {} to port {}: {}",
            envelope.tor_header,
            target_port,
            envelope.data.describe()
        );
        send_envelope(&self.transport, &envelope, target_port).await
    }

    async fn send(&self, tor_header: TorHeader, data: Data, target_port: Port) -> Result<()> {
        let envelope = Envelope::new(tor_header, data, self.port());
        info!(
            relay = self.id,
            "outbound {} to port {}: {}",
            tor_header,
            target_port,
            envelope.data.describe()
        );
        send_envelope(&self.transport, &envelope, target_port).await
    }
}
