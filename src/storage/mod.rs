//! Storage backends for Turnmark
//!
//! Everything persistent goes through the `KvStore` trait. `MemoryKv` backs
//! tests and embedded use; `SqliteKv` is the on-disk store the CLI opens.

mod memory;
mod sqlite;
mod traits;

pub use memory::MemoryKv;
pub use sqlite::SqliteKv;
pub use traits::{KvStore, OpenKvStore, Quotas, StorageChange, StorageError, StorageResult, StorageScope};
