//! Core types and traits for the tinylink URL shortener.
//!
//! This crate provides the stored record type, the storage error
//! taxonomy and the [`LinkStore`] contract shared by every storage
//! backend and by the shortener service.

pub mod error;
pub mod item;
pub mod store;

pub use error::{Result, StorageError};
pub use item::{Item, ItemBatch};
pub use store::{LinkStore, OwnedLink, Stats};
