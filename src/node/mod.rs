pub mod cache;
pub mod model;
pub mod service;

pub use model::{AssembledNode, Node, Property};
pub use service::{CreateNodeInput, NodeService, FIELD_EXTENDS, FIELD_SUPERTAG, FIELD_TYPE};
