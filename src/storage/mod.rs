pub mod engine;
pub mod memory;

pub use engine::Persistence;
pub use memory::InMemoryPersistence;
