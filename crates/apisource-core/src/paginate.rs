//! Sequential page fetching driven by a caller-supplied continuation.
//!
//! One call to [`fetch_pages`] is one fetch cycle: every page URL depends on
//! the previous response, so requests are issued strictly one after another
//! and no retries are attempted.

use serde::Serialize;

use crate::error::AppError;
use crate::models::HttpRequest;
use crate::report::{SourceEvent, SourceReporter};
use crate::traits::{Continuation, HttpTransport};

/// Outcome of a continuation call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NextPage {
    pub has_next: bool,
    /// Required when `has_next` is true.
    pub url: Option<String>,
}

impl NextPage {
    /// Another page lives at `url`.
    pub fn to(url: impl Into<String>) -> Self {
        Self {
            has_next: true,
            url: Some(url.into()),
        }
    }

    /// The current page is the last one.
    pub fn done() -> Self {
        Self::default()
    }
}

/// State threaded between continuation calls of one fetch cycle.
///
/// `pages_fetched` is maintained by the loop; everything else is a free-form
/// JSON map owned by the continuation (cursors, counters, tokens).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContinuationContext {
    pages_fetched: usize,
    state: serde_json::Map<String, serde_json::Value>,
}

impl ContinuationContext {
    /// Number of non-empty pages received so far, including the current one.
    pub fn pages_fetched(&self) -> usize {
        self.pages_fetched
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.state.get(key)
    }

    pub fn insert(
        &mut self,
        key: impl Into<String>,
        value: serde_json::Value,
    ) -> Option<serde_json::Value> {
        self.state.insert(key.into(), value)
    }
}

/// Result of a fetch cycle.
///
/// [`into_payload`](Self::into_payload) gives the external dual shape: a bare
/// value for a single page, a JSON array when the continuation paginated.
/// Serializes to that same shape.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PagedResult {
    /// The (last) response carried no body.
    Empty,
    Single(serde_json::Value),
    Paged(Vec<serde_json::Value>),
}

impl PagedResult {
    pub fn into_payload(self) -> Option<serde_json::Value> {
        match self {
            PagedResult::Empty => None,
            PagedResult::Single(value) => Some(value),
            PagedResult::Paged(pages) => Some(serde_json::Value::Array(pages)),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, PagedResult::Empty)
    }
}

/// Accumulator for one fetch cycle.
#[derive(Debug)]
struct PageContext {
    pages: Vec<serde_json::Value>,
    current_url: String,
    last: Option<serde_json::Value>,
    continuation: ContinuationContext,
    did_paginate: bool,
}

impl PageContext {
    fn new(url: &str) -> Self {
        Self {
            pages: Vec::new(),
            current_url: url.to_string(),
            last: None,
            continuation: ContinuationContext::default(),
            did_paginate: false,
        }
    }

    fn finish(self) -> PagedResult {
        if self.did_paginate {
            return PagedResult::Paged(self.pages);
        }
        match self.last {
            Some(value) => PagedResult::Single(value),
            None => PagedResult::Empty,
        }
    }
}

/// Fetch `request` and every page the continuation points at.
///
/// Transport errors propagate unchanged. A failing continuation is reported
/// and ends pagination; the pages collected so far are still returned.
pub async fn fetch_pages<T, R>(
    transport: &T,
    reporter: &R,
    request: &HttpRequest,
    continuation: Option<&dyn Continuation>,
) -> Result<PagedResult, AppError>
where
    T: HttpTransport,
    R: SourceReporter + ?Sized,
{
    let mut ctx = PageContext::new(&request.url);

    loop {
        let page_request = HttpRequest {
            url: ctx.current_url.clone(),
            ..request.clone()
        };

        reporter.report(SourceEvent::Loading {
            url: &ctx.current_url,
        });
        let response = transport.send(&page_request).await?;
        reporter.report(SourceEvent::Loaded {
            url: &ctx.current_url,
            status: response.status,
        });

        ctx.last = response.payload().cloned();
        let Some(data) = ctx.last.clone() else {
            break;
        };
        ctx.pages.push(data);

        let Some(continuation) = continuation else {
            break;
        };
        ctx.continuation.pages_fetched = ctx.pages.len();

        let decision =
            continuation.next_page(&ctx.current_url, &response, &mut ctx.continuation);
        match decision {
            Ok(NextPage {
                has_next: true,
                url: Some(next),
            }) => {
                ctx.did_paginate = true;
                ctx.current_url = next;
                reporter.report(SourceEvent::NextPage {
                    url: &ctx.current_url,
                });
            }
            Ok(NextPage {
                has_next: true,
                url: None,
            }) => {
                let error = AppError::Pagination(format!(
                    "next page announced without a url after {}",
                    ctx.current_url
                ));
                reporter.report(SourceEvent::ContinuationFailed {
                    url: &ctx.current_url,
                    error: &error,
                });
                break;
            }
            Ok(_) => break,
            Err(error) => {
                reporter.report(SourceEvent::ContinuationFailed {
                    url: &ctx.current_url,
                    error: &error,
                });
                break;
            }
        }
    }

    Ok(ctx.finish())
}
