use chrono::{DateTime, Utc};

use crate::cache::{cache_key, paged_key, timestamp_key};
use crate::error::AppError;
use crate::models::{CacheConfig, FetchRequest, is_present};
use crate::paginate::{PagedResult, fetch_pages};
use crate::report::{SourceEvent, SourceReporter};
use crate::traits::{CacheStore, ContinuationHandle, HttpTransport};

/// Orchestrates one retrieval cycle: cache check → fetch → cache write → post-process.
///
/// Generic over the transport, cache and reporter via traits, enabling
/// dependency injection and testability without real HTTP.
pub struct RetrievalService<T, C, R>
where
    T: HttpTransport,
    C: CacheStore,
    R: SourceReporter,
{
    transport: T,
    cache: C,
    reporter: R,
}

impl<T, C, R> RetrievalService<T, C, R>
where
    T: HttpTransport,
    C: CacheStore,
    R: SourceReporter,
{
    pub fn new(transport: T, cache: C, reporter: R) -> Self {
        Self {
            transport,
            cache,
            reporter,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn reporter(&self) -> &R {
        &self.reporter
    }

    /// Run one retrieval cycle for `request`.
    ///
    /// Returns the payload in its external shape (a bare value for one page,
    /// an array of pages when paginated), or `None` when the server sent no
    /// payload.
    pub async fn retrieve(
        &self,
        request: &FetchRequest,
        cache: &CacheConfig,
    ) -> Result<Option<serde_json::Value>, AppError> {
        Ok(self.retrieve_result(request, cache).await?.into_payload())
    }

    /// Run one retrieval cycle for `request`, keeping whether it paginated.
    ///
    /// 1. Reject invalid requests before any I/O
    /// 2. Serve the cached payload if it is younger than `cache.max_age`
    /// 3. Otherwise fetch every page and, if caching is enabled, store the result
    /// 4. Save a local copy if requested
    /// 5. Extract `payload_key` if set
    pub async fn retrieve_result(
        &self,
        request: &FetchRequest,
        cache: &CacheConfig,
    ) -> Result<PagedResult, AppError> {
        // 1. Validate
        validate(request)?;

        let key = cache_key(request)?;
        let ts_key = timestamp_key(&key);

        // 2. Cache freshness
        let mut use_cache = cache.enabled;
        if cache.enabled {
            if let Some(stamp) = self.cache.get(&ts_key).await? {
                use_cache = self.is_fresh(&stamp, cache);
            }
        }

        let cached = if use_cache {
            self.cached(&key).await?
        } else {
            None
        };

        // 3. Fetch + store
        let result = match cached {
            Some(result) => {
                self.reporter
                    .report(SourceEvent::CacheHit { url: &request.url });
                result
            }
            None => match self.fetch_and_store(request, cache, &key, &ts_key).await {
                Ok(result) => result,
                Err(error) => {
                    self.reporter.report(SourceEvent::FetchFailed {
                        url: &request.url,
                        error: &error,
                    });
                    return Err(error);
                }
            },
        };

        if result.is_empty() {
            return Ok(PagedResult::Empty);
        }

        // 4. Local copy
        if let Some(path) = request.local_save_path() {
            save_local(&path, &result).await?;
            if request.verbose {
                self.reporter.report(SourceEvent::LocalSaved {
                    name: &request.name,
                    path: &path,
                });
            }
        }

        // 5. Extract
        let Some(payload_key) = &request.payload_key else {
            return Ok(result);
        };
        Ok(
            match result
                .into_payload()
                .and_then(|payload| payload.get(payload_key).cloned())
            {
                Some(value) => PagedResult::Single(value),
                None => PagedResult::Empty,
            },
        )
    }

    /// The cached payload under `key`, with its paging shape restored.
    async fn cached(&self, key: &str) -> Result<Option<PagedResult>, AppError> {
        let Some(payload) = self.cache.get(key).await?.filter(is_present) else {
            return Ok(None);
        };
        let paged = self
            .cache
            .get(&paged_key(key))
            .await?
            .and_then(|v| v.as_bool())
            .unwrap_or(false);

        Ok(Some(match payload {
            serde_json::Value::Array(pages) if paged => PagedResult::Paged(pages),
            payload => PagedResult::Single(payload),
        }))
    }

    async fn fetch_and_store(
        &self,
        request: &FetchRequest,
        cache: &CacheConfig,
        key: &str,
        ts_key: &str,
    ) -> Result<PagedResult, AppError> {
        let result = fetch_pages(
            &self.transport,
            &self.reporter,
            &request.to_http_request(),
            request.next_page.as_ref().map(ContinuationHandle::as_dyn),
        )
        .await?;

        if cache.enabled && !result.is_empty() {
            let paged = matches!(result, PagedResult::Paged(_));
            self.cache.set(key, serde_json::to_value(&result)?).await?;
            self.cache
                .set(&paged_key(key), serde_json::Value::Bool(paged))
                .await?;
            self.cache
                .set(ts_key, serde_json::Value::String(now_iso8601()))
                .await?;
            self.reporter.report(SourceEvent::CacheStored { key });
        }

        Ok(result)
    }

    /// An unparseable timestamp counts as stale.
    fn is_fresh(&self, stamp: &serde_json::Value, cache: &CacheConfig) -> bool {
        let written = stamp
            .as_str()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc));

        let age_secs = match written {
            Some(written) => (Utc::now() - written).num_milliseconds() as f64 / 1000.0,
            None => f64::NAN,
        };

        let fresh = age_secs < cache.max_age.as_secs_f64();
        if !fresh {
            self.reporter.report(SourceEvent::CacheStale { age_secs });
        }
        fresh
    }
}

/// Reject request combinations that cannot work before anything is sent.
pub fn validate(request: &FetchRequest) -> Result<(), AppError> {
    if request.url.is_empty() {
        return Err(AppError::ConfigError(format!(
            "entity '{}' has no url",
            request.name
        )));
    }
    if request.payload_key.is_some() && request.next_page.is_some() {
        return Err(AppError::ConfigError(
            "payload_key and a next-page function cannot be used together".into(),
        ));
    }
    Ok(())
}

/// Current time as an RFC 3339 UTC string with millisecond precision.
pub fn now_iso8601() -> String {
    Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// Write `payload` as pretty-printed JSON to `path`.
async fn save_local(path: &str, payload: &PagedResult) -> Result<(), AppError> {
    let pretty = serde_json::to_string_pretty(payload)?;
    tokio::fs::write(path, pretty)
        .await
        .map_err(|source| AppError::LocalSave {
            path: path.to_string(),
            source,
        })
}
