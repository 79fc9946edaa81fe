pub mod config;
pub mod consumer_node;
pub mod crypto;
pub mod error;
pub mod logging;
pub mod protocol;
pub mod relay_node;
pub mod server_node;
pub mod uid_generator;

pub use error::{Error, Result};
