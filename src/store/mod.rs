//! Persistence layer — `Storage` trait plus libSQL and in-memory backends.

pub mod libsql_backend;
pub mod memory;
pub mod traits;

pub use libsql_backend::LibSqlStorage;
pub use memory::MemoryStorage;
pub use traits::Storage;
