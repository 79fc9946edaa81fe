pub mod circuit;
pub mod consumer;
pub mod onionizer;
