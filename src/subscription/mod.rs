pub mod service;

pub use service::{ChangeCallback, ChangeEvent, SubscriptionHandle, SubscriptionService};
