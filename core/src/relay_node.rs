pub mod circuit;
pub mod relay_context;
pub mod relay_node;
