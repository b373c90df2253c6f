use async_trait::async_trait;
use jiff::{SignedDuration, Timestamp};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use tinylink_core::{Item, ItemBatch, LinkStore, OwnedLink, Result, Stats, StorageError};
use tracing::{debug, trace};

/// How long a soft-deleted item keeps its original URL reserved.
pub const DEFAULT_TOMBSTONE_TTL: SignedDuration = SignedDuration::from_mins(10);

#[derive(Debug, Default)]
struct Index {
    items: HashMap<String, Item>,
    /// original URL -> alias, kept in step with `items`.
    by_url: HashMap<String, String>,
}

impl Index {
    /// Returns the alias currently holding `original_url`, unless that item expired.
    fn holder_of(&self, original_url: &str, now: Timestamp) -> Option<&str> {
        let alias = self.by_url.get(original_url)?;
        let item = self.items.get(alias)?;
        (!item.is_expired_at(now)).then_some(alias.as_str())
    }

    fn check(&self, batch: &ItemBatch, now: Timestamp) -> Result<()> {
        let mut claimed = HashSet::with_capacity(batch.len());

        for (alias, item) in batch {
            if let Some(existing) = self.items.get(alias) {
                // Deleted aliases are never rebound, even after the tombstone lapses.
                let held = existing.is_deleted || !existing.is_expired_at(now);
                if held && existing.original_url != item.original_url {
                    return Err(StorageError::AliasTaken(alias.clone()));
                }
            }

            if let Some(holder) = self.holder_of(&item.original_url, now) {
                if holder != alias.as_str() {
                    return Err(StorageError::AlreadyExists(item.original_url.clone()));
                }
            }

            if !claimed.insert(item.original_url.as_str()) {
                return Err(StorageError::AlreadyExists(item.original_url.clone()));
            }
        }

        Ok(())
    }

    fn put(&mut self, alias: &str, item: Item) {
        // `check` guarantees a tombstone here maps to the same URL; never undelete it.
        if self.items.get(alias).is_some_and(|existing| existing.is_deleted) {
            trace!(alias = %alias, "keeping soft-deleted item");
            return;
        }

        let original_url = item.original_url.clone();
        if let Some(previous) = self.items.insert(alias.to_owned(), item) {
            let stale = previous.original_url != original_url
                && self
                    .by_url
                    .get(&previous.original_url)
                    .is_some_and(|holder| holder == alias);
            if stale {
                self.by_url.remove(&previous.original_url);
            }
        }
        self.by_url.insert(original_url, alias.to_owned());
    }
}

/// In-memory implementation of [`LinkStore`].
///
/// A single reader/writer lock guards the alias map and its reverse
/// `original_url -> alias` index, so a batch is validated and applied as one
/// unit and readers never observe a partially written batch.
///
/// Expired items are kept until replaced; reads report them as
/// [`StorageError::Expired`]. Soft-deleted items stay readable as
/// [`StorageError::Gone`] and keep their original URL reserved for the
/// tombstone TTL.
#[derive(Debug)]
pub struct InMemoryStorage {
    index: RwLock<Index>,
    tombstone_ttl: SignedDuration,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Creates a new in-memory storage with the specified capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            index: RwLock::new(Index {
                items: HashMap::with_capacity(capacity),
                by_url: HashMap::with_capacity(capacity),
            }),
            tombstone_ttl: DEFAULT_TOMBSTONE_TTL,
        }
    }

    /// Overrides how long deleted items keep their original URL reserved.
    pub fn with_tombstone_ttl(mut self, ttl: SignedDuration) -> Self {
        self.tombstone_ttl = ttl;
        self
    }

    /// Number of stored items, including deleted and expired ones.
    pub fn len(&self) -> usize {
        self.index.read().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LinkStore for InMemoryStorage {
    async fn set(&self, items: &ItemBatch) -> Result<()> {
        let now = Timestamp::now();
        let mut index = self.index.write();

        index.check(items, now)?;
        for (alias, item) in items {
            index.put(alias, item.clone());
        }

        trace!(count = items.len(), "stored batch in memory");
        Ok(())
    }

    async fn get(&self, alias: &str) -> Result<String> {
        let index = self.index.read();

        let Some(item) = index.items.get(alias) else {
            return Err(StorageError::NotFound(alias.to_owned()));
        };

        if item.is_deleted {
            return Err(StorageError::Gone(alias.to_owned()));
        }

        if item.is_expired() {
            return Err(StorageError::Expired(alias.to_owned()));
        }

        Ok(item.original_url.clone())
    }

    async fn alias_for(&self, original_url: &str) -> Result<String> {
        let index = self.index.read();

        let Some(alias) = index.by_url.get(original_url) else {
            return Err(StorageError::NotFound(original_url.to_owned()));
        };

        match index.items.get(alias) {
            Some(item) if item.is_expired() => Err(StorageError::Expired(alias.clone())),
            Some(_) => Ok(alias.clone()),
            None => Err(StorageError::NotFound(original_url.to_owned())),
        }
    }

    async fn batch_by_owner(&self, owner_id: &str) -> Result<Vec<OwnedLink>> {
        let now = Timestamp::now();
        let index = self.index.read();

        let links = index
            .items
            .iter()
            .filter(|(_, item)| item.owner_id == owner_id && item.is_live_at(now))
            .map(|(alias, item)| OwnedLink {
                alias: alias.clone(),
                original_url: item.original_url.clone(),
            })
            .collect();

        Ok(links)
    }

    async fn delete_batch(&self, aliases: &[String], owner_id: &str) -> Result<()> {
        let retain_until = Timestamp::now() + self.tombstone_ttl;
        let mut index = self.index.write();

        for alias in aliases {
            let Some(item) = index.items.get_mut(alias) else {
                continue;
            };

            if item.owner_id != owner_id {
                debug!(alias = %alias, owner_id = %owner_id, "skipping delete of foreign alias");
                continue;
            }

            if !item.is_deleted {
                *item = item.clone().into_deleted(retain_until);
            }
        }

        Ok(())
    }

    async fn stats(&self) -> Result<Stats> {
        let now = Timestamp::now();
        let index = self.index.read();

        let mut urls = 0;
        let mut owners = HashSet::new();
        for item in index.items.values().filter(|item| item.is_live_at(now)) {
            urls += 1;
            owners.insert(item.owner_id.as_str());
        }

        Ok(Stats {
            urls,
            owners: owners.len() as u64,
        })
    }

    async fn ping(&self) -> Result<()> {
        Err(StorageError::Unsupported(
            "in-memory storage is not backed by a database".to_owned(),
        ))
    }

    async fn close(&self) {
        let mut index = self.index.write();
        index.items.clear();
        index.by_url.clear();
    }
}
