mod kv;
mod repository;

pub use kv::MemoryStore;
pub use repository::MemoryRepository;
