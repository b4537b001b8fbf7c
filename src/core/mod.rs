pub mod error;
pub mod ids;
pub mod value;

pub use error::{CoreError, Result};
pub use ids::{NodeId, NodeRef};
pub use value::PropertyValue;
