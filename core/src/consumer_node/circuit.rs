use crate::{crypto::SessionKey, protocol::onion::Port};

/// The client's record of one established hop.
#[derive(Debug, Clone)]
pub struct Circuit {
    /// The id the hop was created with.
    pub circuit_id: u32,
    pub session_key: SessionKey,
    /// The hop's own port: where the layer outside this one delivers to.
    pub upstream_port: Port,
}
