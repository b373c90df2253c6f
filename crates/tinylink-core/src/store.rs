use crate::error::Result;
use crate::item::ItemBatch;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// An alias owned by a given identity, as returned by [`LinkStore::batch_by_owner`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnedLink {
    pub alias: String,
    pub original_url: String,
}

/// Aggregate counters over live (non-deleted) links.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    /// Number of live URLs.
    pub urls: u64,
    /// Number of distinct owners of live URLs.
    pub owners: u64,
}

/// The storage contract shared by every backend.
///
/// Callers branch on the returned [`StorageError`](crate::StorageError) kind:
/// `NotFound` for an alias that never existed, `Gone` for a soft-deleted one,
/// `AlreadyExists` when a write collides with a stored original URL.
#[async_trait]
pub trait LinkStore: Send + Sync + 'static {
    /// Stores every item of the batch, or none of them.
    ///
    /// Returns `Err(AlreadyExists(url))` if an original URL is already mapped
    /// to another alias, and `Err(AliasTaken(alias))` if an alias is already
    /// bound to a different original URL.
    async fn set(&self, items: &ItemBatch) -> Result<()>;

    /// Resolves an alias to its original URL.
    async fn get(&self, alias: &str) -> Result<String>;

    /// Reverse lookup used to turn an `AlreadyExists` conflict into the
    /// alias already stored for `original_url`.
    async fn alias_for(&self, original_url: &str) -> Result<String>;

    /// Returns the live links owned by `owner_id`, in no particular order.
    async fn batch_by_owner(&self, owner_id: &str) -> Result<Vec<OwnedLink>>;

    /// Soft-deletes every alias in `aliases` whose stored owner is `owner_id`.
    ///
    /// Aliases owned by someone else, or unknown aliases, are skipped silently.
    async fn delete_batch(&self, aliases: &[String], owner_id: &str) -> Result<()>;

    async fn stats(&self) -> Result<Stats>;

    /// Database reachability check.
    async fn ping(&self) -> Result<()>;

    /// Releases backend resources. Safe to call more than once.
    async fn close(&self);
}
