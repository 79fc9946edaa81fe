use crate::{crypto::SessionKey, protocol::onion::Port};

/// A relay's state for one circuit passing through it.
#[derive(Debug, Clone)]
pub struct Circuit {
    /// The id this relay is addressed with on the link toward the client.
    pub circuit_id: u32,
    pub session_key: SessionKey,
    /// The node that sent the CREATE, toward the client.
    pub downstream_port: Port,
    /// The node this relay extends to, away from the client. Known once an
    /// EXTEND or RELAY_FORWARD has been processed.
    pub upstream_port: Option<Port>,
}

impl Circuit {
    pub fn new(circuit_id: u32, session_key: SessionKey, downstream_port: Port) -> Self {
        Self {
            circuit_id,
            session_key,
            downstream_port,
            upstream_port: None,
        }
    }
}
