#![forbid(unsafe_code)]

mod contract;
mod error;
mod memory;
mod sqlite;

pub use contract::*;
pub use error::StoreError;
pub use memory::MemoryStore;
pub use sqlite::{SqliteStore, SqliteStoreOptions};
