use crate::error::AppError;

/// Events emitted while sourcing entities, for logging and monitoring.
#[derive(Debug, Clone)]
pub enum SourceEvent<'a> {
    /// About to request a page.
    Loading { url: &'a str },
    /// A page arrived.
    Loaded { url: &'a str, status: u16 },
    /// The continuation reported another page.
    NextPage { url: &'a str },
    /// The continuation failed; pagination stops at the current page.
    ContinuationFailed { url: &'a str, error: &'a AppError },
    /// The cached payload is older than the freshness window.
    CacheStale { age_secs: f64 },
    /// The payload was served from cache.
    CacheHit { url: &'a str },
    /// Fetched payload written to cache.
    CacheStored { key: &'a str },
    /// The fetch cycle failed.
    FetchFailed { url: &'a str, error: &'a AppError },
    /// Local JSON copy written.
    LocalSaved { name: &'a str, path: &'a str },
    /// The login request did not yield a token.
    AuthFailed { error: &'a str },
    EntityStarted { name: &'a str, url: &'a str },
    NodesCreated { entity_type: &'a str, count: usize },
    /// Node creation skipped by configuration.
    EntitySkipped { name: &'a str, entities: usize },
    /// A fatal error stopped processing of this entity.
    EntityAborted { name: &'a str, error: &'a AppError },
}

/// What the runner does after an entity fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorAction {
    /// Record the failure and go on with the next entity.
    #[default]
    Continue,
    /// Stop the whole run.
    Abort,
}

/// Trait for receiving source events (decoupled logging).
pub trait SourceReporter: Send + Sync {
    fn report(&self, event: SourceEvent<'_>) {
        let _ = event;
    }

    /// Decide whether a non-fatal entity failure (fetch, cache or sink) ends the run.
    fn on_entity_error(&self, entity: &str, error: &AppError) -> ErrorAction {
        let _ = (entity, error);
        ErrorAction::Continue
    }
}

/// Reporter that uses the `tracing` crate.
///
/// Verbose progress goes to `debug`, stale-cache notices to `info`, login
/// problems to `warn` and other failures to `error`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter {
    abort_on_entity_error: bool,
}

impl TracingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stop the run on the first failed entity instead of moving on.
    pub fn abort_on_entity_error(mut self, abort: bool) -> Self {
        self.abort_on_entity_error = abort;
        self
    }
}

impl SourceReporter for TracingReporter {
    fn report(&self, event: SourceEvent<'_>) {
        match event {
            SourceEvent::Loading { url } => {
                tracing::debug!(%url, "loading from server");
            }
            SourceEvent::Loaded { url, status } => {
                tracing::debug!(%url, %status, "got url");
            }
            SourceEvent::NextPage { url } => {
                tracing::debug!(%url, "have more data, next page");
            }
            SourceEvent::ContinuationFailed { url, error } => {
                tracing::error!(%url, %error, "error computing next page");
            }
            SourceEvent::CacheStale { age_secs } => {
                tracing::info!(age_secs, "not using cache as it is too old");
            }
            SourceEvent::CacheHit { url } => {
                tracing::debug!(%url, "using cached data");
            }
            SourceEvent::CacheStored { key } => {
                tracing::debug!(%key, "payload cached");
            }
            SourceEvent::FetchFailed { url, error } => match error.response_errors() {
                Some(errors) => {
                    tracing::error!(%url, %error, %errors, "api server response error");
                }
                None => {
                    tracing::error!(%url, %error, "api server response error");
                }
            },
            SourceEvent::LocalSaved { name, path } => {
                tracing::info!(%name, %path, "saved locally");
            }
            SourceEvent::AuthFailed { error } => {
                tracing::warn!(%error, "authentication failed, continuing without token");
            }
            SourceEvent::EntityStarted { name, url } => {
                tracing::debug!(%name, %url, "sourcing entity");
            }
            SourceEvent::NodesCreated { entity_type, count } => {
                tracing::info!(%entity_type, %count, "nodes created");
            }
            SourceEvent::EntitySkipped { name, entities } => {
                tracing::info!(%name, %entities, "skipping node creation");
            }
            SourceEvent::EntityAborted { name, error } => {
                tracing::error!(%name, %error, "apisource aborted entity");
            }
        }
    }

    fn on_entity_error(&self, _entity: &str, _error: &AppError) -> ErrorAction {
        if self.abort_on_entity_error {
            ErrorAction::Abort
        } else {
            ErrorAction::Continue
        }
    }
}
