//! Cache module for storing service responses on disk
//!
//! This module provides a file-backed store keyed by canonical cache keys. It is
//! local to one machine, keeps one directory per service and has no expiry:
//! entries stay until they are overwritten by a re-fetch or deleted by hand.

mod store;

pub use store::{CacheEntry, CacheError, CacheStore, Payload};
