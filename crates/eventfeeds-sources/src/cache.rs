//! Flat JSON cache of fetched bodies, keyed by URL and credentials.
//!
//! The cache is read once when a run starts and written once when it ends.
//! Nothing depends on its contents for correctness: a missing or corrupt
//! file simply starts an empty cache.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::error::{SourceError, SourceResult};

/// Cache settings, the `[cache]` section of the configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Location of the cache file.
    pub path: PathBuf,
    /// Serve cached bodies younger than this without a request. 0 disables.
    pub fresh_for_minutes: u64,
    /// Bodies are truncated to this many bytes before caching.
    pub max_body_bytes: usize,
}

impl CacheConfig {
    pub const DEFAULT_PATH: &'static str = "data/cache.json";
    pub const DEFAULT_MAX_BODY_BYTES: usize = 500_000;

    /// Returns the freshness window, if enabled.
    pub fn fresh_for(&self) -> Option<Duration> {
        (self.fresh_for_minutes > 0).then(|| Duration::minutes(self.fresh_for_minutes as i64))
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(Self::DEFAULT_PATH),
            fresh_for_minutes: 0,
            max_body_bytes: Self::DEFAULT_MAX_BODY_BYTES,
        }
    }
}

/// A cached response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub etag: Option<String>,
    pub last_modified: Option<String>,
    pub fetched_at: DateTime<Utc>,
    /// SHA-256 of the full body, hex encoded.
    pub content_hash: String,
    /// The body, possibly truncated.
    pub body: String,
}

impl CacheEntry {
    /// Returns true if the entry was fetched less than `max_age` ago.
    pub fn is_fresh(&self, max_age: Duration, now: DateTime<Utc>) -> bool {
        now - self.fetched_at < max_age
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CacheFile {
    #[serde(default)]
    http_cache: BTreeMap<String, CacheEntry>,
}

/// Builds the cache key for a request.
///
/// The credentials and user agent are hashed into the key so a body fetched
/// with one token is never served to a request made with another.
pub fn cache_key(url: &str, authorization: Option<&str>, user_agent: &str) -> String {
    let material = format!("{}|{}", authorization.unwrap_or_default(), user_agent);
    format!("{}||{}", url, sha256_hex(material.as_bytes()))
}

/// Hex-encoded SHA-256 digest.
pub fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Truncates `s` to at most `max_bytes` without splitting a character.
fn truncate_utf8(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// The persisted HTTP cache.
#[derive(Debug)]
pub struct CacheStore {
    path: Option<PathBuf>,
    entries: BTreeMap<String, CacheEntry>,
    max_body_bytes: usize,
}

impl CacheStore {
    /// Creates a cache that is never written to disk.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            entries: BTreeMap::new(),
            max_body_bytes: CacheConfig::DEFAULT_MAX_BODY_BYTES,
        }
    }

    /// Opens the cache file named in `config`.
    ///
    /// With `clear` set the existing file is ignored and will be overwritten
    /// on [`save`](Self::save).
    pub fn open(config: &CacheConfig, clear: bool) -> Self {
        let mut store = if clear {
            debug!(path = %config.path.display(), "starting from an empty cache");
            Self {
                path: Some(config.path.clone()),
                entries: BTreeMap::new(),
                max_body_bytes: config.max_body_bytes,
            }
        } else {
            Self::load(&config.path)
        };
        store.max_body_bytes = config.max_body_bytes;
        store
    }

    /// Loads the cache from `path`; missing or unreadable files give an empty cache.
    pub fn load(path: &Path) -> Self {
        let entries = match fs::read_to_string(path) {
            Ok(content) => match serde_json::from_str::<CacheFile>(&content) {
                Ok(file) => file.http_cache,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "cache file is corrupt, ignoring it");
                    BTreeMap::new()
                }
            },
            Err(_) => BTreeMap::new(),
        };
        debug!(path = %path.display(), entries = entries.len(), "loaded cache");
        Self {
            path: Some(path.to_path_buf()),
            entries,
            max_body_bytes: CacheConfig::DEFAULT_MAX_BODY_BYTES,
        }
    }

    pub fn get(&self, key: &str) -> Option<&CacheEntry> {
        self.entries.get(key)
    }

    /// Records a fresh 200 response.
    pub fn store(
        &mut self,
        key: impl Into<String>,
        etag: Option<String>,
        last_modified: Option<String>,
        body: &str,
    ) {
        let entry = CacheEntry {
            etag,
            last_modified,
            fetched_at: Utc::now(),
            content_hash: sha256_hex(body.as_bytes()),
            body: truncate_utf8(body, self.max_body_bytes).to_string(),
        };
        self.entries.insert(key.into(), entry);
    }

    /// Marks an entry as revalidated (the server answered 304).
    pub fn touch(&mut self, key: &str) {
        if let Some(entry) = self.entries.get_mut(key) {
            entry.fetched_at = Utc::now();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Writes the cache file atomically (temp file, then rename).
    ///
    /// An in-memory cache has nothing to write.
    pub fn save(&self) -> SourceResult<()> {
        let Some(ref path) = self.path else {
            return Ok(());
        };

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|e| {
                SourceError::cache(format!("failed to create cache directory: {}", e)).with_source(e)
            })?;
        }

        let file = CacheFile {
            http_cache: self.entries.clone(),
        };
        let content = serde_json::to_string_pretty(&file)
            .map_err(|e| SourceError::cache(format!("failed to serialize cache: {}", e)))?;

        let temp_path = path.with_extension("json.tmp");
        fs::write(&temp_path, &content)
            .map_err(|e| SourceError::cache(format!("failed to write cache file: {}", e)))?;
        fs::rename(&temp_path, path)
            .map_err(|e| SourceError::cache(format!("failed to rename cache file: {}", e)))?;

        debug!(path = %path.display(), entries = self.entries.len(), "saved cache");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config_in(dir: &TempDir) -> CacheConfig {
        CacheConfig {
            path: dir.path().join("data").join("cache.json"),
            ..CacheConfig::default()
        }
    }

    mod keys {
        use super::*;

        #[test]
        fn key_separates_credentials() {
            let url = "https://api.example.org/events";
            let anon = cache_key(url, None, "eventfeeds/0.1");
            let token = cache_key(url, Some("Bearer abc"), "eventfeeds/0.1");
            let other_ua = cache_key(url, None, "other-agent");

            assert!(anon.starts_with("https://api.example.org/events||"));
            assert_ne!(anon, token);
            assert_ne!(anon, other_ua);
            assert_eq!(anon, cache_key(url, None, "eventfeeds/0.1"));
        }

        #[test]
        fn sha256_is_hex() {
            insta::assert_snapshot!(
                sha256_hex(b"abc"),
                @"ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
            );
        }
    }

    mod store {
        use super::*;

        #[test]
        fn truncates_on_char_boundary() {
            assert_eq!(truncate_utf8("héllo", 2), "h");
            assert_eq!(truncate_utf8("héllo", 3), "hé");
            assert_eq!(truncate_utf8("short", 100), "short");
        }

        #[test]
        fn store_truncates_body_but_hashes_full_content() {
            let dir = TempDir::new().unwrap();
            let config = CacheConfig {
                max_body_bytes: 4,
                ..config_in(&dir)
            };
            let mut cache = CacheStore::open(&config, false);
            cache.store("k", Some("\"v1\"".into()), None, "abcdefgh");

            let entry = cache.get("k").unwrap();
            assert_eq!(entry.body, "abcd");
            assert_eq!(entry.content_hash, sha256_hex(b"abcdefgh"));
        }

        #[test]
        fn freshness() {
            let mut cache = CacheStore::in_memory();
            cache.store("k", None, None, "body");
            let entry = cache.get("k").unwrap();
            let now = Utc::now();
            assert!(entry.is_fresh(Duration::minutes(5), now));
            assert!(!entry.is_fresh(Duration::minutes(5), now + Duration::minutes(10)));
        }

        #[test]
        fn fresh_for_disabled_by_default() {
            assert_eq!(CacheConfig::default().fresh_for(), None);
            let config = CacheConfig {
                fresh_for_minutes: 30,
                ..CacheConfig::default()
            };
            assert_eq!(config.fresh_for(), Some(Duration::minutes(30)));
        }
    }

    mod persistence {
        use super::*;

        #[test]
        fn save_and_reload() {
            let dir = TempDir::new().unwrap();
            let config = config_in(&dir);

            let mut cache = CacheStore::open(&config, false);
            assert!(cache.is_empty());
            cache.store("https://example.org||x", Some("\"abc\"".into()), Some("Tue, 01 Oct 2025 10:00:00 GMT".into()), "<html/>");
            cache.save().unwrap();

            let reloaded = CacheStore::open(&config, false);
            assert_eq!(reloaded.len(), 1);
            let entry = reloaded.get("https://example.org||x").unwrap();
            assert_eq!(entry.etag.as_deref(), Some("\"abc\""));
            assert_eq!(entry.body, "<html/>");
            assert!(!config.path.with_extension("json.tmp").exists());
        }

        #[test]
        fn corrupt_file_gives_empty_cache() {
            let dir = TempDir::new().unwrap();
            let config = config_in(&dir);
            fs::create_dir_all(config.path.parent().unwrap()).unwrap();
            fs::write(&config.path, "{ not json").unwrap();

            let cache = CacheStore::open(&config, false);
            assert!(cache.is_empty());
        }

        #[test]
        fn clear_ignores_existing_file() {
            let dir = TempDir::new().unwrap();
            let config = config_in(&dir);

            let mut cache = CacheStore::open(&config, false);
            cache.store("k", None, None, "body");
            cache.save().unwrap();

            let cleared = CacheStore::open(&config, true);
            assert!(cleared.is_empty());
        }

        #[test]
        fn in_memory_save_is_noop() {
            let mut cache = CacheStore::in_memory();
            cache.store("k", None, None, "body");
            cache.save().unwrap();
            cache.clear();
            assert!(cache.is_empty());
        }
    }
}
