//! Cache subsystem: request fingerprinting and the two-tier response store
//!
//! This module turns arbitrary request parameters into deterministic hex keys
//! and maps each key to an on-disk entry through a process-private in-memory
//! index. Entries live forever unless the store is configured with a TTL.

mod key;
mod store;

pub use key::{ParamValue, RequestSignature};
pub use store::{CacheError, CacheStore, STATUS_CACHE_HIT, STATUS_ERROR, STATUS_NO_DATA};
