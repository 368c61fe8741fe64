//! Two-tier response cache: in-memory index over on-disk files
//!
//! Entries are addressed by (sub-directory, cache key). Tabular payloads live
//! in `.table` files, everything else in `.json` sidecars. A process-private
//! index maps keys to file paths and is populated lazily on the first disk
//! lookup; it is lost on process exit, so every run starts cold.
//!
//! There is no locking across writers: concurrent saves to the same key are
//! unordered and last write wins. A reader racing a writer can observe a
//! partial table file; the sidecar fallback is what bounds that failure.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::response::Payload;
use crate::table::Table;

/// Synthetic status: non-empty result served from cache
pub const STATUS_CACHE_HIT: u16 = 250;

/// Synthetic status: no data available (cache miss or empty result)
pub const STATUS_NO_DATA: u16 = 402;

/// Synthetic status: a cached sidecar recorded an upstream error
pub const STATUS_ERROR: u16 = 500;

/// Default on-disk cache root
const DEFAULT_CACHE_ROOT: &str = "./data/cache";

/// Errors that can occur during cache operations
#[derive(Debug, Error)]
pub enum CacheError {
    /// Caller-contract violation: lookups and saves need a sub-directory
    #[error("cache sub-directory must be specified")]
    SubDirRequired,

    /// Reading or writing a cache file failed
    #[error("cache I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// A cache file held content that does not parse
    #[error("cache entry is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Disk-backed response cache owned by one client instance.
///
/// The index is process-private and never shared across instances; two
/// processes pointed at the same root coordinate only through the filesystem.
#[derive(Debug)]
pub struct CacheStore {
    /// Root directory holding one sub-directory per endpoint family
    root: PathBuf,
    /// Optional entry lifetime, judged by file mtime; `None` = live forever
    ttl: Option<Duration>,
    /// Lazily populated key -> file path map
    index: Mutex<HashMap<String, PathBuf>>,
}

impl Default for CacheStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheStore {
    /// Creates a store rooted at `./data/cache` with no expiration
    pub fn new() -> Self {
        Self::with_root(PathBuf::from(DEFAULT_CACHE_ROOT))
    }

    /// Creates a store rooted at a custom directory
    pub fn with_root(root: PathBuf) -> Self {
        Self {
            root,
            ttl: None,
            index: Mutex::new(HashMap::new()),
        }
    }

    /// Sets an explicit entry lifetime; stale entries are treated as misses
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    fn index(&self) -> MutexGuard<'_, HashMap<String, PathBuf>> {
        self.index.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn table_path(&self, sub_dir: &str, key: &str) -> PathBuf {
        self.root.join(sub_dir).join(format!("{key}.table"))
    }

    fn sidecar_path(&self, sub_dir: &str, key: &str) -> PathBuf {
        self.root.join(sub_dir).join(format!("{key}.json"))
    }

    fn ensure_dir(&self, sub_dir: &str) -> std::io::Result<()> {
        fs::create_dir_all(self.root.join(sub_dir))
    }

    /// Whether the configured TTL marks this file stale
    fn is_stale(&self, path: &Path) -> bool {
        let Some(ttl) = self.ttl else {
            return false;
        };
        fs::metadata(path)
            .and_then(|m| m.modified())
            .ok()
            .and_then(|mtime| mtime.elapsed().ok())
            .is_some_and(|age| age > ttl)
    }

    /// Looks up a cache entry.
    ///
    /// Probes the in-memory index first, then the expected tabular file path
    /// on disk (registering it in the index when found). A tabular file that
    /// fails to load, or a key that only ever produced a sidecar, falls back
    /// to the `.json` sidecar at the same key, whose `s` field classifies the
    /// result. Sidecar entries are not indexed: the index maps keys to
    /// tabular files only.
    ///
    /// # Returns
    /// * `(Payload::Table, 250)` for a non-empty tabular hit
    /// * `(payload, 402)` for misses, empty tables, and `no_data` sidecars
    /// * `(Payload::Raw, 500)` for `error` sidecars
    /// * `(Payload::Raw, 250)` for sidecars with any other `s` value
    pub fn lookup(&self, sub_dir: &str, key: &str) -> Result<(Payload, u16), CacheError> {
        if sub_dir.is_empty() {
            return Err(CacheError::SubDirRequired);
        }
        self.ensure_dir(sub_dir)?;

        let indexed = self.index().get(key).cloned();
        if let Some(path) = indexed {
            if !self.is_stale(&path) {
                let table = read_table(&path)?;
                if !table.is_empty() {
                    debug!("cache hit for {key} via index");
                    return Ok((Payload::Table(table), STATUS_CACHE_HIT));
                }
                return Ok((Payload::Table(Table::new()), STATUS_NO_DATA));
            }
        } else {
            let path = self.table_path(sub_dir, key);
            if path.exists() && !self.is_stale(&path) {
                self.index().insert(key.to_string(), path.clone());
                debug!("cache file found for {key} in {sub_dir}");

                match read_table(&path) {
                    Ok(table) => {
                        let status = if table.is_empty() {
                            STATUS_NO_DATA
                        } else {
                            STATUS_CACHE_HIT
                        };
                        return Ok((Payload::Table(table), status));
                    }
                    Err(err) => {
                        debug!("unreadable table for {key} ({err}), trying sidecar");
                        let raw: Value =
                            serde_json::from_str(&fs::read_to_string(self.sidecar_path(sub_dir, key))?)?;
                        let status = classify_sidecar(&raw);
                        return Ok((Payload::Raw(raw), status));
                    }
                }
            }

            let sidecar = self.sidecar_path(sub_dir, key);
            if sidecar.exists() && !self.is_stale(&sidecar) {
                debug!("sidecar entry found for {key} in {sub_dir}");
                let raw: Value = serde_json::from_str(&fs::read_to_string(&sidecar)?)?;
                let status = classify_sidecar(&raw);
                return Ok((Payload::Raw(raw), status));
            }
        }

        Ok((Payload::Table(Table::new()), STATUS_NO_DATA))
    }

    /// Persists a payload under (sub-directory, key).
    ///
    /// Tabular payloads go to `.table` files, raw and text payloads to `.json`
    /// sidecars. The sub-directory is created if absent; an existing entry
    /// under the same key is overwritten in place.
    pub fn save(&self, payload: &Payload, key: &str, sub_dir: &str) -> Result<(), CacheError> {
        if sub_dir.is_empty() {
            return Err(CacheError::SubDirRequired);
        }
        self.ensure_dir(sub_dir)?;

        match payload {
            Payload::Table(table) => {
                fs::write(self.table_path(sub_dir, key), serde_json::to_string(table)?)?;
            }
            Payload::Raw(value) => {
                fs::write(self.sidecar_path(sub_dir, key), serde_json::to_string(value)?)?;
            }
            Payload::Text(text) => {
                let value = Value::String(text.clone());
                fs::write(self.sidecar_path(sub_dir, key), serde_json::to_string(&value)?)?;
            }
        }
        debug!("saved cache entry {key} in {sub_dir}");
        Ok(())
    }

    #[cfg(test)]
    fn is_indexed(&self, key: &str) -> bool {
        self.index().contains_key(key)
    }
}

fn read_table(path: &Path) -> Result<Table, CacheError> {
    Ok(serde_json::from_str(&fs::read_to_string(path)?)?)
}

/// Maps a sidecar's `s` field to a sentinel status
fn classify_sidecar(value: &Value) -> u16 {
    match value.get("s").and_then(Value::as_str) {
        Some("no_data") => STATUS_NO_DATA,
        Some("error") => STATUS_ERROR,
        _ => STATUS_CACHE_HIT,
    }
}
