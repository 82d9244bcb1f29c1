//! Persistence layer: the `Storage` trait plus the in-memory backend.

pub mod memory;
pub mod traits;

pub use memory::MemoryStore;
pub use traits::Storage;
