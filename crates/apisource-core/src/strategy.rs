//! Built-in continuations that can be selected from configuration files.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::AppError;
use crate::models::HttpResponse;
use crate::paginate::{ContinuationContext, NextPage};
use crate::traits::Continuation;

const PAGE_STATE_KEY: &str = "page";

/// A declarative pagination policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PaginationStrategy {
    /// Follow the `Link: <…>; rel="next"` response header.
    LinkHeader,
    /// Read the next URL from a JSON Pointer into the body (e.g. `/links/next`).
    BodyField { pointer: String },
    /// Increment a query parameter while the page holds a non-empty array.
    PageNumber {
        param: String,
        #[serde(default = "default_start")]
        start: u64,
        /// JSON Pointer to the array to inspect; the whole body when unset.
        #[serde(default)]
        pointer: Option<String>,
    },
}

fn default_start() -> u64 {
    1
}

impl Continuation for PaginationStrategy {
    fn next_page(
        &self,
        current_url: &str,
        response: &HttpResponse,
        context: &mut ContinuationContext,
    ) -> Result<NextPage, AppError> {
        match self {
            PaginationStrategy::LinkHeader => match response.header("link").and_then(next_link) {
                Some(next) => Ok(NextPage::to(resolve(current_url, &next)?)),
                None => Ok(NextPage::done()),
            },
            PaginationStrategy::BodyField { pointer } => {
                let next = response
                    .data
                    .as_ref()
                    .and_then(|data| data.pointer(pointer))
                    .and_then(|v| v.as_str())
                    .filter(|s| !s.is_empty());
                match next {
                    Some(next) => Ok(NextPage::to(resolve(current_url, next)?)),
                    None => Ok(NextPage::done()),
                }
            }
            PaginationStrategy::PageNumber {
                param,
                start,
                pointer,
            } => {
                let items = match (response.data.as_ref(), pointer) {
                    (Some(data), Some(pointer)) => data.pointer(pointer),
                    (data, None) => data,
                    (None, Some(_)) => None,
                };
                let has_items = items
                    .and_then(|v| v.as_array())
                    .is_some_and(|a| !a.is_empty());
                if !has_items {
                    return Ok(NextPage::done());
                }

                let page = context
                    .get(PAGE_STATE_KEY)
                    .and_then(|v| v.as_u64())
                    .unwrap_or(*start);
                let next = page + 1;
                context.insert(PAGE_STATE_KEY, serde_json::json!(next));

                Ok(NextPage::to(with_query_param(
                    current_url,
                    param,
                    &next.to_string(),
                )?))
            }
        }
    }
}

/// Extract the `rel="next"` target from an RFC 8288 `Link` header.
fn next_link(header: &str) -> Option<String> {
    header.split(',').find_map(|link| {
        let mut parts = link.split(';');
        let target = parts.next()?.trim();
        let target = target.strip_prefix('<')?.strip_suffix('>')?;
        let is_next = parts.any(|param| {
            let Some((name, value)) = param.trim().split_once('=') else {
                return false;
            };
            name.trim().eq_ignore_ascii_case("rel")
                && value
                    .trim()
                    .trim_matches('"')
                    .split_whitespace()
                    .any(|rel| rel.eq_ignore_ascii_case("next"))
        });
        is_next.then(|| target.to_string())
    })
}

fn resolve(base: &str, next: &str) -> Result<String, AppError> {
    let base = Url::parse(base)
        .map_err(|e| AppError::Pagination(format!("Invalid page url '{base}': {e}")))?;
    base.join(next)
        .map(String::from)
        .map_err(|e| AppError::Pagination(format!("Invalid next page url '{next}': {e}")))
}

fn with_query_param(url: &str, name: &str, value: &str) -> Result<String, AppError> {
    let mut parsed =
        Url::parse(url).map_err(|e| AppError::Pagination(format!("Invalid page url '{url}': {e}")))?;
    let kept: Vec<(String, String)> = parsed
        .query_pairs()
        .filter(|(k, _)| k != name)
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    parsed
        .query_pairs_mut()
        .clear()
        .extend_pairs(kept)
        .append_pair(name, value);
    Ok(parsed.into())
}
