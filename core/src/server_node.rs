use tracing::{info, warn};

use crate::{
    error::{Error, Result},
    protocol::{
        io::{send_envelope, Transport},
        onion::{Command, Data, Envelope, Port, TorHeader},
    },
};

/// Computes the response to one request.
pub type Responder = Box<dyn Fn(&str) -> String + Send + Sync>;

pub const DEFAULT_SUFFIX: &str = " accepted";

/// The default responder.
pub fn accept(request: &str) -> String {
    format!("{}{}", request, DEFAULT_SUFFIX)
}

/// The endpoint behind the circuit. It keeps no state: every RELAY_FORWARD
/// is answered with a plaintext RELAY_BACKWARD on the same link id, which the
/// exit relay encrypts.
pub struct ServerNode<T: Transport> {
    transport: T,
    responder: Responder,
}

impl<T: Transport> ServerNode<T> {
    pub fn new(transport: T) -> Self {
        Self::with_responder(transport, accept)
    }

    /// A server that answers every request with the request followed by `suffix`.
    pub fn with_suffix(transport: T, suffix: impl Into<String>) -> Self {
        let suffix = suffix.into();
        Self::with_responder(transport, move |request| format!("{}{}", request, suffix))
    }

    pub fn with_responder<F>(transport: T, responder: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        Self {
            transport,
            responder: Box::new(responder),
        }
    }

    pub fn port(&self) -> Port {
        self.transport.port()
    }

    pub async fn start(&self) -> Result<()> {
        info!("server listening on port {}", self.port());
        loop {
            let (bytes, from) = self.transport.receive().await?;
            if let Err(err) = self.handle_datagram(&bytes).await {
                warn!("server dropped message from {}: {}", from, err);
            }
        }
    }

    pub async fn handle_datagram(&self, bytes: &[u8]) -> Result<()> {
        let envelope = Envelope::from_bytes(bytes)?;
        self.handle_envelope(envelope).await
    }

    pub async fn handle_envelope(&self, envelope: Envelope) -> Result<()> {
        if envelope.tor_header.cmd != Command::RelayForward {
            return Err(Error::protocol(format!(
                "server cannot handle {}",
                envelope.tor_header
            )));
        }
        let request = match envelope.data {
            Data::Message(request) => request,
            other => {
                return Err(Error::protocol(format!(
                    "request carries {}",
                    other.describe()
                )))
            }
        };
        info!("request {:?} on circuit {}", request, envelope.tor_header.circuit_id);

        let response = (self.responder)(&request);
        info!(
            "sending response {:?} to port {}",
            response, envelope.sender_port
        );
        let reply = Envelope::new(
            TorHeader::new(envelope.tor_header.circuit_id, Command::RelayBackward),
            Data::Message(response),
            self.port(),
        );
        send_envelope(&self.transport, &reply, envelope.sender_port).await
    }
}
