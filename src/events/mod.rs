pub mod bus;
pub mod event;

pub use bus::{EventBus, ListenerId};
pub use event::{DbEvent, EventFilter};
