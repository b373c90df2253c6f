//! The link shortening service built on top of the storage core.
//!
//! [`ShortenerService`] turns original URLs into short URLs: it validates
//! input, generates aliases and retries on collision, reuses the existing
//! alias when a URL was already shortened, and routes deletions through the
//! background deletion worker.

pub mod error;
pub mod service;

pub use error::{Result, ShortenerError};
pub use service::{
    BatchEntry, BatchShortened, ExpirationPolicy, ShortUrl, ShortenParams, Shortened,
    ShortenerConfig, ShortenerService,
};
