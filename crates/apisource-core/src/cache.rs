//! Cache keys and [`CacheStore`] implementations.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::PathBuf;

use moka::future::Cache;
use serde::Serialize;

use crate::error::AppError;
use crate::models::{BasicAuth, FetchRequest, HttpMethod, compute_hash};
use crate::traits::CacheStore;

const TIMESTAMP_SUFFIX: &str = "-timestamp";
const PAGED_SUFFIX: &str = "-paged";

/// The fields that define a request's identity, in a fixed order.
#[derive(Serialize)]
struct CacheKeyFields<'a> {
    url: &'a str,
    method: HttpMethod,
    headers: &'a BTreeMap<String, String>,
    data: &'a Option<serde_json::Value>,
    name: &'a str,
    path: &'a Option<String>,
    payload_key: &'a Option<String>,
    auth: &'a Option<BasicAuth>,
    params: &'a BTreeMap<String, String>,
}

/// SHA-256 digest of the request's canonical JSON form.
///
/// Pagination is not part of the key: two requests that differ only in their
/// continuation share a cache entry.
pub fn cache_key(request: &FetchRequest) -> Result<String, AppError> {
    let fields = CacheKeyFields {
        url: &request.url,
        method: request.method,
        headers: &request.headers,
        data: &request.data,
        name: &request.name,
        path: &request.path,
        payload_key: &request.payload_key,
        auth: &request.auth,
        params: &request.params,
    };
    let canonical = serde_json::to_string(&fields)?;
    Ok(compute_hash(&canonical))
}

/// Key under which the write time of `cache_key` is stored.
pub fn timestamp_key(cache_key: &str) -> String {
    format!("{cache_key}{TIMESTAMP_SUFFIX}")
}

/// Key recording whether the payload under `cache_key` is a list of pages.
pub fn paged_key(cache_key: &str) -> String {
    format!("{cache_key}{PAGED_SUFFIX}")
}

/// `name` itself when it is a plain file stem, otherwise its digest.
///
/// Keeps names taken from keys or configuration from escaping their directory.
pub fn safe_file_stem(name: &str) -> String {
    let safe = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if safe {
        name.to_string()
    } else {
        compute_hash(name)
    }
}

// ---------------------------------------------------------------------------
// MemoryCache
// ---------------------------------------------------------------------------

/// Process-local cache backed by moka. Entries vanish with the process.
#[derive(Clone)]
pub struct MemoryCache {
    inner: Cache<String, serde_json::Value>,
}

impl MemoryCache {
    pub fn new(max_capacity: u64) -> Self {
        Self {
            inner: Cache::new(max_capacity),
        }
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new(10_000)
    }
}

impl CacheStore for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>, AppError> {
        Ok(self.inner.get(key).await)
    }

    async fn set(&self, key: &str, value: serde_json::Value) -> Result<(), AppError> {
        self.inner.insert(key.to_string(), value).await;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// FileCache
// ---------------------------------------------------------------------------

/// Cache persisted as one JSON file per key, surviving across runs.
#[derive(Debug, Clone)]
pub struct FileCache {
    dir: PathBuf,
}

impl FileCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", safe_file_stem(key)))
    }
}

impl CacheStore for FileCache {
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>, AppError> {
        let path = self.entry_path(key);
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(AppError::CacheError(format!(
                    "Failed to read {}: {e}",
                    path.display()
                )));
            }
        };
        let value = serde_json::from_str(&raw).map_err(|e| {
            AppError::CacheError(format!("Corrupt cache entry {}: {e}", path.display()))
        })?;
        Ok(Some(value))
    }

    async fn set(&self, key: &str, value: serde_json::Value) -> Result<(), AppError> {
        tokio::fs::create_dir_all(&self.dir).await.map_err(|e| {
            AppError::CacheError(format!(
                "Failed to create cache dir {}: {e}",
                self.dir.display()
            ))
        })?;

        let path = self.entry_path(key);
        let tmp = path.with_extension("json.tmp");
        let raw = serde_json::to_vec(&value)?;
        tokio::fs::write(&tmp, raw)
            .await
            .map_err(|e| AppError::CacheError(format!("Failed to write {}: {e}", tmp.display())))?;
        tokio::fs::rename(&tmp, &path).await.map_err(|e| {
            AppError::CacheError(format!("Failed to write {}: {e}", path.display()))
        })?;

        tracing::trace!(path = %path.display(), "cache entry written");
        Ok(())
    }
}
