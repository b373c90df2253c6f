use crate::error::{Result, ShortenerError};
use jiff::{SignedDuration, Timestamp};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tinylink_core::{Item, ItemBatch, LinkStore, Stats, StorageError};
use tinylink_generator::Generator;
use tinylink_storage::worker::{DeletionWorker, DEFAULT_QUEUE_CAPACITY};
use tracing::{debug, info, trace};
use typed_builder::TypedBuilder;

#[derive(Debug, Clone, TypedBuilder)]
pub struct ShortenerConfig {
    /// Prefix of every returned short URL. A trailing slash is ignored.
    #[builder(default = "http://localhost:8080".to_string(), setter(into))]
    pub base_url: String,
    /// How many generated aliases are tried before giving up on a collision.
    #[builder(default = 5)]
    pub max_attempts: u32,
    #[builder(default = DEFAULT_QUEUE_CAPACITY)]
    pub deletion_queue: usize,
}

impl Default for ShortenerConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// When a shortened link stops resolving.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExpirationPolicy {
    #[default]
    Never,
    AfterDuration(Duration),
    AtTimestamp(Timestamp),
}

impl ExpirationPolicy {
    fn expire_at(self, now: Timestamp) -> Result<Option<Timestamp>> {
        match self {
            ExpirationPolicy::Never => Ok(None),
            ExpirationPolicy::AfterDuration(duration) => {
                let duration = SignedDuration::try_from(duration)
                    .map_err(|e| ShortenerError::InvalidExpiration(e.to_string()))?;
                now.checked_add(duration)
                    .map(Some)
                    .map_err(|e| ShortenerError::InvalidExpiration(e.to_string()))
            }
            ExpirationPolicy::AtTimestamp(timestamp) if timestamp <= now => Err(
                ShortenerError::InvalidExpiration(format!("{timestamp} is in the past")),
            ),
            ExpirationPolicy::AtTimestamp(timestamp) => Ok(Some(timestamp)),
        }
    }
}

#[derive(Debug, Clone, TypedBuilder)]
pub struct ShortenParams {
    #[builder(setter(into))]
    pub original_url: String,
    #[builder(setter(into))]
    pub owner_id: String,
    #[builder(default)]
    pub expiration: ExpirationPolicy,
}

/// Result of shortening a single URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shortened {
    pub alias: String,
    pub short_url: String,
    /// `false` when the URL was already stored and its existing alias was reused.
    pub created: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchEntry {
    pub correlation_id: String,
    pub original_url: String,
}

impl BatchEntry {
    pub fn new(correlation_id: impl Into<String>, original_url: impl Into<String>) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            original_url: original_url.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchShortened {
    pub correlation_id: String,
    pub short_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShortUrl {
    pub short_url: String,
    pub original_url: String,
}

/// The shortening service.
///
/// Wraps a [`LinkStore`] and a [`Generator`] to handle:
/// - URL validation
/// - alias generation, retrying when a generated alias is already taken
/// - reuse of the stored alias when the URL was shortened before
/// - deletions, serialized through a background [`DeletionWorker`]
///
/// Constructing the service spawns the deletion worker, so it must happen
/// inside a tokio runtime. Call [`ShortenerService::close`] to drain pending
/// deletions and release the store.
pub struct ShortenerService<S, G> {
    store: Arc<S>,
    generator: G,
    config: ShortenerConfig,
    deletion: Mutex<Option<DeletionWorker>>,
}

impl<S: LinkStore, G: Generator> ShortenerService<S, G> {
    pub fn new(store: S, generator: G, config: ShortenerConfig) -> Self {
        let store = Arc::new(store);
        let worker = DeletionWorker::spawn(store.clone(), config.deletion_queue);

        Self {
            store,
            generator,
            config,
            deletion: Mutex::new(Some(worker)),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &ShortenerConfig {
        &self.config
    }

    fn short_url(&self, alias: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), alias)
    }

    /// Shortens a single URL on behalf of `params.owner_id`.
    ///
    /// If the URL is already stored, the existing alias is returned with
    /// `created == false` instead of failing.
    pub async fn shorten(&self, params: ShortenParams) -> Result<Shortened> {
        validate_url(&params.original_url)?;
        let expire_at = params.expiration.expire_at(Timestamp::now())?;

        for attempt in 1..=self.config.max_attempts {
            let alias = self.generator.generate();
            let item = Item::new(params.original_url.as_str(), params.owner_id.as_str())
                .with_expire_at(expire_at);
            let batch = ItemBatch::from([(alias.clone(), item)]);

            match self.store.set(&batch).await {
                Ok(()) => {
                    trace!(alias = %alias, owner_id = %params.owner_id, "shortened url");
                    return Ok(Shortened {
                        short_url: self.short_url(&alias),
                        alias,
                        created: true,
                    });
                }
                Err(StorageError::AliasTaken(_)) => {
                    debug!(alias = %alias, attempt, "generated alias already taken");
                }
                Err(StorageError::AlreadyExists(_)) => {
                    let alias = self.store.alias_for(&params.original_url).await?;
                    debug!(alias = %alias, "url already shortened, reusing alias");
                    return Ok(Shortened {
                        short_url: self.short_url(&alias),
                        alias,
                        created: false,
                    });
                }
                Err(err) => return Err(err.into()),
            }
        }

        Err(ShortenerError::AliasExhausted(self.config.max_attempts))
    }

    /// Shortens every entry in one atomic write.
    ///
    /// Results keep the order and correlation ids of `entries`. If any URL is
    /// already stored the whole batch fails with `AlreadyExists`.
    pub async fn shorten_batch(
        &self,
        entries: Vec<BatchEntry>,
        owner_id: &str,
    ) -> Result<Vec<BatchShortened>> {
        if entries.is_empty() {
            return Ok(Vec::new());
        }

        for entry in &entries {
            validate_url(&entry.original_url)?;
        }

        'attempts: for attempt in 1..=self.config.max_attempts {
            let mut batch = ItemBatch::with_capacity(entries.len());
            let mut aliases = Vec::with_capacity(entries.len());

            for entry in &entries {
                let alias = self.generator.generate();
                if batch.contains_key(&alias) {
                    debug!(alias = %alias, attempt, "generated alias repeated within batch");
                    continue 'attempts;
                }
                batch.insert(
                    alias.clone(),
                    Item::new(entry.original_url.as_str(), owner_id),
                );
                aliases.push(alias);
            }

            match self.store.set(&batch).await {
                Ok(()) => {
                    trace!(count = aliases.len(), owner_id = %owner_id, "shortened batch");
                    return Ok(entries
                        .into_iter()
                        .zip(aliases)
                        .map(|(entry, alias)| BatchShortened {
                            correlation_id: entry.correlation_id,
                            short_url: self.short_url(&alias),
                        })
                        .collect());
                }
                Err(StorageError::AliasTaken(alias)) => {
                    debug!(alias = %alias, attempt, "generated alias already taken");
                }
                Err(err) => return Err(err.into()),
            }
        }

        Err(ShortenerError::AliasExhausted(self.config.max_attempts))
    }

    pub async fn resolve(&self, alias: &str) -> Result<String> {
        Ok(self.store.get(alias).await?)
    }

    /// Live links of `owner_id`, as full short URLs ordered by short URL.
    pub async fn links_by_owner(&self, owner_id: &str) -> Result<Vec<ShortUrl>> {
        let mut links: Vec<ShortUrl> = self
            .store
            .batch_by_owner(owner_id)
            .await?
            .into_iter()
            .map(|link| ShortUrl {
                short_url: self.short_url(&link.alias),
                original_url: link.original_url,
            })
            .collect();

        links.sort_by(|a, b| a.short_url.cmp(&b.short_url));
        Ok(links)
    }

    /// Soft-deletes the aliases owned by `owner_id`, waiting for the deletion
    /// worker to apply the batch. Aliases owned by someone else are skipped.
    pub async fn delete(&self, aliases: Vec<String>, owner_id: &str) -> Result<()> {
        let handle = self.deletion.lock().as_ref().map(DeletionWorker::handle);
        let Some(handle) = handle else {
            return Err(
                StorageError::Unavailable("deletion worker has stopped".to_string()).into(),
            );
        };

        handle.delete(aliases, owner_id).await?;
        Ok(())
    }

    pub async fn stats(&self) -> Result<Stats> {
        Ok(self.store.stats().await?)
    }

    pub async fn ping(&self) -> Result<()> {
        Ok(self.store.ping().await?)
    }

    /// Drains pending deletions, stops the worker and closes the store.
    pub async fn close(&self) {
        let worker = self.deletion.lock().take();
        if let Some(worker) = worker {
            worker.shutdown().await;
        }

        self.store.close().await;
        info!("shortener service closed");
    }
}

/// Accepts absolute http(s) URLs with a non-empty host.
fn validate_url(url: &str) -> Result<()> {
    if url.is_empty() {
        return Err(ShortenerError::InvalidUrl(
            "URL cannot be empty".to_string(),
        ));
    }

    if url.chars().any(char::is_whitespace) {
        return Err(ShortenerError::InvalidUrl(format!(
            "URL must not contain whitespace: {url}"
        )));
    }

    let Some((scheme, rest)) = url.split_once("://") else {
        return Err(ShortenerError::InvalidUrl(format!(
            "URL must have a valid scheme and host: {url}"
        )));
    };

    let scheme = scheme.to_ascii_lowercase();
    if scheme != "http" && scheme != "https" {
        return Err(ShortenerError::InvalidUrl(format!(
            "URL scheme must be http or https: {scheme}"
        )));
    }

    let host = rest
        .split(|c| matches!(c, '/' | '?' | '#'))
        .next()
        .unwrap_or_default();
    if host.is_empty() {
        return Err(ShortenerError::InvalidUrl(format!(
            "URL must have a valid scheme and host: {url}"
        )));
    }

    Ok(())
}
