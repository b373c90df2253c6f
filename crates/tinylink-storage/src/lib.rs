//! Storage backends for short links and the facade that selects between them.

pub mod config;
pub mod memory;
pub mod postgres;
pub mod snapshot;
pub mod storage;
pub mod worker;

pub use config::{BackendConfig, PostgresConfig, StorageConfig};
pub use memory::InMemoryStorage;
pub use postgres::PostgresStorage;
pub use snapshot::{FileSnapshot, RestoreSummary};
pub use storage::Storage;
pub use worker::{DeletionHandle, DeletionWorker};

pub use tinylink_core::{Item, ItemBatch, LinkStore, OwnedLink, Result, Stats, StorageError};
