//! On-disk cache for expensive GitHub responses
//!
//! One JSON file per key under `~/.shiplog/cache`, shaped
//! `{data, timestamp, version}`.
//!
//! # Error Handling
//!
//! Cache operations are best-effort. A failed write is logged at `debug` and
//! otherwise ignored, and any unreadable, corrupt, stale, or foreign-version
//! entry is treated as a miss. The data will simply be fetched again.

use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Bumped whenever the shape of cached payloads changes.
pub const CACHE_VERSION: u32 = 1;

const CACHE_DIR: &str = ".shiplog/cache";
const CACHE_TTL_HOURS: i64 = 24;

#[derive(Serialize)]
struct CacheEntryRef<'a, T> {
    data: &'a T,
    timestamp: i64,
    version: u32,
}

#[derive(Deserialize)]
struct CacheEntry {
    data: serde_json::Value,
    timestamp: i64,
    version: u32,
}

#[derive(Debug, Clone)]
pub struct ResponseCache {
    dir: PathBuf,
    enabled: bool,
    ttl: Duration,
}

impl ResponseCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            enabled: true,
            ttl: Duration::hours(CACHE_TTL_HOURS),
        }
    }

    /// `~/.shiplog/cache`, or `None` when no home directory can be resolved.
    pub fn default_dir() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(CACHE_DIR))
    }

    /// Cache rooted at [`Self::default_dir`]. Falls back to a disabled cache
    /// when there is no home directory.
    pub fn at_default_location() -> Self {
        match Self::default_dir() {
            Some(dir) => Self::new(dir),
            None => {
                debug!("No home directory; response cache disabled");
                Self::disabled()
            }
        }
    }

    /// A cache where every operation is a no-op.
    pub fn disabled() -> Self {
        Self {
            dir: PathBuf::new(),
            enabled: false,
            ttl: Duration::hours(CACHE_TTL_HOURS),
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `prefix_<fnv64 of sorted "k=v" pairs joined by "&">`. Parameter order
    /// does not affect the key.
    pub fn key(prefix: &str, params: &[(&str, &str)]) -> String {
        let mut pairs: Vec<String> = params.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
        pairs.sort();
        format!("{}_{}", prefix, crate::util::hash_str(&pairs.join("&")))
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }

    pub fn get<T: DeserializeOwned>(&self, prefix: &str, params: &[(&str, &str)]) -> Option<T> {
        self.get_at(prefix, params, Utc::now())
    }

    /// Look up an entry as of `now`.
    pub fn get_at<T: DeserializeOwned>(
        &self,
        prefix: &str,
        params: &[(&str, &str)],
        now: DateTime<Utc>,
    ) -> Option<T> {
        if !self.enabled {
            return None;
        }

        let key = Self::key(prefix, params);
        let content = fs::read_to_string(self.path_for(&key)).ok()?;
        let entry: CacheEntry = match serde_json::from_str(&content) {
            Ok(entry) => entry,
            Err(e) => {
                debug!(key = %key, error = %e, "Ignoring corrupt cache entry");
                return None;
            }
        };

        if entry.version != CACHE_VERSION {
            debug!(key = %key, version = entry.version, "Ignoring cache entry from another version");
            return None;
        }
        if now.timestamp_millis() - entry.timestamp > self.ttl.num_milliseconds() {
            debug!(key = %key, "Cache entry expired");
            return None;
        }

        match serde_json::from_value(entry.data) {
            Ok(data) => {
                debug!(key = %key, "Cache hit");
                Some(data)
            }
            Err(e) => {
                debug!(key = %key, error = %e, "Cache entry has unexpected shape");
                None
            }
        }
    }

    pub fn set<T: Serialize>(&self, prefix: &str, params: &[(&str, &str)], data: &T) {
        self.set_at(prefix, params, data, Utc::now())
    }

    /// Store an entry stamped with `now`. Failures are logged and swallowed.
    pub fn set_at<T: Serialize>(
        &self,
        prefix: &str,
        params: &[(&str, &str)],
        data: &T,
        now: DateTime<Utc>,
    ) {
        if !self.enabled {
            return;
        }

        let key = Self::key(prefix, params);
        if let Err(e) = self.write_entry(&key, data, now) {
            debug!(key = %key, error = %e, "Failed to write cache entry");
        }
    }

    fn write_entry<T: Serialize>(
        &self,
        key: &str,
        data: &T,
        now: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        fs::create_dir_all(&self.dir)?;
        let entry = CacheEntryRef {
            data,
            timestamp: now.timestamp_millis(),
            version: CACHE_VERSION,
        };
        let content = serde_json::to_string(&entry)?;
        write_atomic(&self.path_for(key), &content)
    }

    /// Delete every cached entry. Returns how many files were removed.
    pub fn clear(&self) -> anyhow::Result<usize> {
        if !self.enabled || !self.dir.exists() {
            return Ok(0);
        }

        let mut removed = 0;
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == "json") {
                fs::remove_file(&path)?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}

/// Write via a temp file and rename so readers never see a partial entry.
fn write_atomic(path: &Path, content: &str) -> anyhow::Result<()> {
    let tmp_path = path.with_extension("tmp");
    fs::write(&tmp_path, content)?;

    // Owner read/write only
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let _ = fs::set_permissions(&tmp_path, fs::Permissions::from_mode(0o600));
    }

    #[cfg(windows)]
    {
        // rename does not replace an existing file here
        if path.exists() {
            let _ = fs::remove_file(path);
        }
    }

    if let Err(err) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(err.into());
    }
    Ok(())
}
