use jiff::Timestamp;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;

/// A batch of items keyed by alias, written atomically by [`LinkStore::set`].
///
/// [`LinkStore::set`]: crate::store::LinkStore::set
pub type ItemBatch = HashMap<String, Item>;

/// A stored mapping from an alias to its original URL.
///
/// Also reads the older record layout (`Object`, `UserID`, `IsDeleted` and
/// `Expiration` as unix nanoseconds, `0` meaning never).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    /// The original URL that was shortened.
    #[serde(alias = "Object")]
    pub original_url: String,
    /// Opaque identifier of the identity that submitted the URL.
    #[serde(alias = "UserID")]
    pub owner_id: String,
    /// Soft-delete marker. Only ever transitions from `false` to `true`.
    #[serde(default, alias = "IsDeleted")]
    pub is_deleted: bool,
    /// When the item expires, if ever.
    #[serde(
        default,
        alias = "Expiration",
        deserialize_with = "deserialize_expire_at",
        skip_serializing_if = "Option::is_none"
    )]
    pub expire_at: Option<Timestamp>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ExpireAt {
    UnixNanos(i64),
    At(Timestamp),
}

fn deserialize_expire_at<'de, D>(deserializer: D) -> Result<Option<Timestamp>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    match Option::<ExpireAt>::deserialize(deserializer)? {
        None | Some(ExpireAt::UnixNanos(0)) => Ok(None),
        Some(ExpireAt::UnixNanos(nanos)) => Timestamp::from_nanosecond(i128::from(nanos))
            .map(Some)
            .map_err(D::Error::custom),
        Some(ExpireAt::At(at)) => Ok(Some(at)),
    }
}

impl Item {
    /// Creates a live, non-expiring item.
    pub fn new(original_url: impl Into<String>, owner_id: impl Into<String>) -> Self {
        Self {
            original_url: original_url.into(),
            owner_id: owner_id.into(),
            is_deleted: false,
            expire_at: None,
        }
    }

    /// Sets the expiration instant.
    pub fn with_expire_at(mut self, expire_at: Option<Timestamp>) -> Self {
        self.expire_at = expire_at;
        self
    }

    pub fn is_expired_at(&self, now: Timestamp) -> bool {
        self.expire_at.is_some_and(|expire_at| now >= expire_at)
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Timestamp::now())
    }

    /// A live item is neither deleted nor expired.
    pub fn is_live_at(&self, now: Timestamp) -> bool {
        !self.is_deleted && !self.is_expired_at(now)
    }

    /// Returns the soft-deleted replacement of this item, retained until `retain_until`.
    pub fn into_deleted(self, retain_until: Timestamp) -> Self {
        Self {
            is_deleted: true,
            expire_at: Some(retain_until),
            ..self
        }
    }
}
