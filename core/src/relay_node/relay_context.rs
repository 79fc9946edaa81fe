use std::collections::{hash_map::Entry, HashMap};

use super::circuit::Circuit;
use crate::{
    crypto::SessionKey,
    error::{CircuitTable, Error, Result},
    protocol::onion::Port,
};

/// A relay's circuit table, indexed two ways.
///
/// `by_own_id` holds every circuit under the id this relay was created with.
/// `by_next_id` maps the id the next hop uses on its link back to the owning
/// circuit, which is how replies coming back from upstream find their way
/// downstream. Entries are never removed.
#[derive(Default)]
pub struct RelayContext {
    by_own_id: HashMap<u32, Circuit>,
    by_next_id: HashMap<u32, u32>,
}

impl RelayContext {
    pub fn new() -> Self {
        Self::default()
    }

    // Registers a new circuit created by a CREATE
    // param circuit_id: The id the CREATE was addressed with
    // param session_key: The key generated for the circuit
    // param downstream_port: The port the CREATE came from
    pub fn create(
        &mut self,
        circuit_id: u32,
        session_key: SessionKey,
        downstream_port: Port,
    ) -> Result<&Circuit> {
        match self.by_own_id.entry(circuit_id) {
            Entry::Occupied(_) => Err(Error::protocol(format!(
                "circuit {} already exists",
                circuit_id
            ))),
            Entry::Vacant(entry) => Ok(entry.insert(Circuit::new(
                circuit_id,
                session_key,
                downstream_port,
            ))),
        }
    }

    pub fn by_own_id(&self, circuit_id: u32) -> Result<&Circuit> {
        self.by_own_id.get(&circuit_id).ok_or(Error::Lookup {
            table: CircuitTable::OwnId,
            circuit_id,
        })
    }

    pub fn by_next_id(&self, next_id: u32) -> Result<&Circuit> {
        let own_id = self.by_next_id.get(&next_id).ok_or(Error::Lookup {
            table: CircuitTable::NextId,
            circuit_id: next_id,
        })?;
        self.by_own_id(*own_id)
    }

    // Records that circuit `own_id` continues to `upstream_port`, where the next
    // hop knows it as `next_id`.
    // Linking an id that already belongs to another circuit, or moving a circuit
    // to a different upstream port, is a protocol error; linking the same id to
    // the same circuit and port again changes nothing.
    pub fn link_next(&mut self, own_id: u32, next_id: u32, upstream_port: Port) -> Result<&Circuit> {
        let circuit = self.by_own_id.get_mut(&own_id).ok_or(Error::Lookup {
            table: CircuitTable::OwnId,
            circuit_id: own_id,
        })?;
        if let Some(current) = circuit.upstream_port {
            if current != upstream_port {
                return Err(Error::protocol(format!(
                    "circuit {} already continues to port {}, not {}",
                    own_id, current, upstream_port
                )));
            }
        }

        match self.by_next_id.entry(next_id) {
            Entry::Occupied(entry) if *entry.get() != own_id => {
                return Err(Error::protocol(format!(
                    "next id {} already belongs to circuit {}",
                    next_id,
                    entry.get()
                )));
            }
            Entry::Occupied(_) => {}
            Entry::Vacant(entry) => {
                entry.insert(own_id);
            }
        }

        circuit.upstream_port = Some(upstream_port);
        Ok(circuit)
    }

    pub fn len(&self) -> usize {
        self.by_own_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_own_id.is_empty()
    }
}
