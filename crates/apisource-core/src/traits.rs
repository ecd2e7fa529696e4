use std::fmt;
use std::future::Future;
use std::sync::Arc;

use crate::error::AppError;
use crate::models::{HttpRequest, HttpResponse, NodeBatch};
use crate::paginate::{ContinuationContext, NextPage};

/// Sends a single HTTP request and parses the JSON body.
///
/// Implementations must turn non-2xx statuses into [`AppError::HttpStatus`]
/// and leave timeouts and retries to their own policy.
pub trait HttpTransport: Send + Sync + Clone {
    fn send(
        &self,
        request: &HttpRequest,
    ) -> impl Future<Output = Result<HttpResponse, AppError>> + Send;
}

/// Async key-value store used to cache raw payloads across runs.
pub trait CacheStore: Send + Sync + Clone {
    fn get(
        &self,
        key: &str,
    ) -> impl Future<Output = Result<Option<serde_json::Value>, AppError>> + Send;

    fn set(
        &self,
        key: &str,
        value: serde_json::Value,
    ) -> impl Future<Output = Result<(), AppError>> + Send;
}

/// Materializes normalized entities as graph nodes. Owns node identity.
pub trait NodeSink: Send + Sync {
    /// Returns the number of nodes created.
    fn create_nodes(&self, batch: NodeBatch) -> impl Future<Output = Result<usize, AppError>> + Send;
}

/// Decides whether another page follows the one just received.
///
/// The context is owned by the pagination loop and handed back on every call,
/// so implementations can keep cursors or counters in it.
pub trait Continuation: Send + Sync {
    fn next_page(
        &self,
        current_url: &str,
        response: &HttpResponse,
        context: &mut ContinuationContext,
    ) -> Result<NextPage, AppError>;
}

impl<F> Continuation for F
where
    F: Fn(&str, &HttpResponse, &mut ContinuationContext) -> Result<NextPage, AppError>
        + Send
        + Sync,
{
    fn next_page(
        &self,
        current_url: &str,
        response: &HttpResponse,
        context: &mut ContinuationContext,
    ) -> Result<NextPage, AppError> {
        self(current_url, response, context)
    }
}

/// Shared, cheaply clonable handle to a [`Continuation`].
#[derive(Clone)]
pub struct ContinuationHandle(Arc<dyn Continuation>);

impl ContinuationHandle {
    pub fn new(continuation: impl Continuation + 'static) -> Self {
        Self(Arc::new(continuation))
    }

    pub fn as_dyn(&self) -> &dyn Continuation {
        self.0.as_ref()
    }
}

impl fmt::Debug for ContinuationHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ContinuationHandle(..)")
    }
}

/// A no-op CacheStore for use when caching is not needed.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullCache;

impl CacheStore for NullCache {
    async fn get(&self, _key: &str) -> Result<Option<serde_json::Value>, AppError> {
        Ok(None)
    }

    async fn set(&self, _key: &str, _value: serde_json::Value) -> Result<(), AppError> {
        Ok(())
    }
}
