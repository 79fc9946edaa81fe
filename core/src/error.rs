use std::time::Duration;

use thiserror::Error;

use crate::crypto::CryptoError;

pub type Result<T> = std::result::Result<T, Error>;

/// Which of a relay's two circuit indices a lookup went through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitTable {
    /// Keyed by the id this relay was addressed with, on the link toward the client.
    OwnId,
    /// Keyed by the id the next hop uses when replying.
    NextId,
}

impl std::fmt::Display for CircuitTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitTable::OwnId => write!(f, "own-id"),
            CircuitTable::NextId => write!(f, "next-id"),
        }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    /// A symmetric or asymmetric operation failed: bad key, bad padding, wrong layer key.
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// No circuit is registered under the given id.
    #[error("no circuit {circuit_id} in {table} table")]
    Lookup { table: CircuitTable, circuit_id: u32 },

    /// The message was well formed but not valid at this point of the protocol.
    #[error("protocol violation: {0}")]
    Protocol(String),

    #[error("no message received within {0:?}")]
    Timeout(Duration),

    /// The bytes did not decode into the expected envelope.
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Circuit construction failed while establishing the given hop. Nothing
    /// of the partial circuit is kept.
    #[error("circuit build aborted at hop {hop}: {source}")]
    BuildAborted {
        hop: usize,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    pub(crate) fn protocol(message: impl Into<String>) -> Self {
        Error::Protocol(message.into())
    }
}
