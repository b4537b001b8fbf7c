pub mod tracker;

pub use tracker::{DependencyKey, DependencyTracker, SubscriptionId};
