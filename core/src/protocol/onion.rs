use serde::{Deserialize, Serialize};

use crate::{
    crypto::{CryptoError, SessionKey},
    error::{Error, Result},
};

pub type RelayId = u32;
pub type Port = u16;

/// A relay as the client knows it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Relay {
    pub id: RelayId,
    pub port: Port,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Command {
    Create,
    Created,
    Extend,
    Extended,
    RelayForward,
    RelayBackward,
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Command::Create => "CREATE",
            Command::Created => "CREATED",
            Command::Extend => "EXTEND",
            Command::Extended => "EXTENDED",
            Command::RelayForward => "RELAY_FORWARD",
            Command::RelayBackward => "RELAY_BACKWARD",
        };
        f.write_str(name)
    }
}

/// The circuit id is link-scoped: the same circuit carries a different id on
/// every link, chosen by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TorHeader {
    pub circuit_id: u32,
    pub cmd: Command,
}

impl TorHeader {
    pub fn new(circuit_id: u32, cmd: Command) -> Self {
        Self { circuit_id, cmd }
    }
}

impl std::fmt::Display for TorHeader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.cmd, self.circuit_id)
    }
}

/// Envelope payload. Plaintext variants are only readable by the node the
/// innermost layer is meant for; `Cipher` is a sealed layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Data {
    /// PEM encoded RSA public key of a CREATE.
    PublicKey(String),
    /// Session key encrypted to the CREATE's public key.
    SessionKey(#[serde(with = "base64_bytes")] Vec<u8>),
    /// Application request or response.
    Message(String),
    Cipher(#[serde(with = "base64_bytes")] Vec<u8>),
}

impl Data {
    pub fn as_cipher(&self) -> Option<&[u8]> {
        match self {
            Data::Cipher(ciphertext) => Some(ciphertext),
            _ => None,
        }
    }

    /// A loggable description that never includes key material or ciphertext.
    pub fn describe(&self) -> String {
        match self {
            Data::PublicKey(_) => "CLIENT PUBLIC KEY".to_string(),
            Data::SessionKey(_) => "SESSION KEY encrypted with CLIENT PUBLIC KEY".to_string(),
            Data::Message(message) => format!("message {:?}", message),
            Data::Cipher(ciphertext) => format!("{} encrypted bytes", ciphertext.len()),
        }
    }
}

/// The datagram exchanged between two nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub tor_header: TorHeader,
    pub data: Data,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_port: Option<Port>,
    pub sender_port: Port,
}

impl Envelope {
    pub fn new(tor_header: TorHeader, data: Data, sender_port: Port) -> Self {
        Self {
            tor_header,
            data,
            target_port: None,
            sender_port,
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// One forward-direction layer: what a relay finds after peeling its key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Onion {
    pub tor_header: TorHeader,
    pub data: Data,
    pub target_port: Port,
}

impl Onion {
    pub fn new(tor_header: TorHeader, data: Data, target_port: Port) -> Self {
        Self {
            tor_header,
            data,
            target_port,
        }
    }

    // Returns a new onion whose data is this onion encrypted under the given key
    // param key: The session key of the hop that will peel the layer
    // param tor_header: The header the hop is addressed with
    // param target_port: Where that hop delivers the peeled onion
    pub fn seal(&self, key: &SessionKey, tor_header: TorHeader, target_port: Port) -> Result<Onion> {
        let plaintext = serde_json::to_vec(self)?;
        Ok(Onion::new(
            tor_header,
            Data::Cipher(key.add_layer(&plaintext)),
            target_port,
        ))
    }

    // Peels one layer of encryption, returning the onion inside
    pub fn open(key: &SessionKey, ciphertext: &[u8]) -> Result<Onion> {
        let plaintext = key.peel_layer(ciphertext)?;
        serde_json::from_slice(&plaintext).map_err(|_| Error::Crypto(CryptoError::CorruptLayer))
    }

    pub fn into_envelope(self, sender_port: Port) -> Envelope {
        Envelope {
            tor_header: self.tor_header,
            data: self.data,
            target_port: Some(self.target_port),
            sender_port,
        }
    }
}

/// One backward-direction layer, added by each relay a reply passes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reply {
    pub data: Data,
}

impl Reply {
    pub fn seal(data: Data, key: &SessionKey) -> Result<Data> {
        let plaintext = serde_json::to_vec(&Reply { data })?;
        Ok(Data::Cipher(key.add_layer(&plaintext)))
    }

    pub fn open(key: &SessionKey, ciphertext: &[u8]) -> Result<Data> {
        let plaintext = key.peel_layer(ciphertext)?;
        let reply: Reply = serde_json::from_slice(&plaintext)
            .map_err(|_| Error::Crypto(CryptoError::CorruptLayer))?;
        Ok(reply.data)
    }
}

mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}
