use super::circuit::Circuit;
use crate::{
    error::{Error, Result},
    protocol::onion::{Command, Data, Onion, Reply, TorHeader},
};

/// Adds and removes the client's layers.
///
/// `hops` is always ordered as built, hop 0 nearest the client. Layers are
/// added from the last hop back to hop 0 so that hop 0 peels first, and
/// replies are peeled in the same order the relays added them.
pub struct Onionizer;

impl Onionizer {
    // Wraps `core` once per hop, returning the onion to hand to hop 0
    // param core: The innermost onion, meant for whatever lies past the last hop
    // param hops: The established hops to wrap for
    // param cmd: The command every wrapping layer is addressed with
    pub fn grow_onion(core: Onion, hops: &[Circuit], cmd: Command) -> Result<Onion> {
        hops.iter().rev().try_fold(core, |onion, hop| {
            onion.seal(
                &hop.session_key,
                TorHeader::new(hop.circuit_id, cmd),
                hop.upstream_port,
            )
        })
    }

    // Removes one layer per hop from reply data, hop 0 first
    pub fn peel_onion(data: Data, hops: &[Circuit]) -> Result<Data> {
        hops.iter().enumerate().try_fold(data, |data, (index, hop)| {
            let ciphertext = data.as_cipher().ok_or_else(|| {
                Error::protocol(format!(
                    "reply has {} where hop {} should have added a layer",
                    data.describe(),
                    index
                ))
            })?;
            Reply::open(&hop.session_key, ciphertext)
        })
    }
}
