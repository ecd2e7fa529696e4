use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::AppError;
use crate::paginate::{ContinuationContext, NextPage};
use crate::traits::{Continuation, ContinuationHandle};

/// Default freshness window for cached payloads: one day.
pub const DEFAULT_MAX_CACHE_AGE: Duration = Duration::from_secs(60 * 60 * 24);

/// HTTP verb of a source request. Serialized lower-case (`"get"`, `"post"`, …).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "get",
            HttpMethod::Post => "post",
            HttpMethod::Put => "put",
            HttpMethod::Patch => "patch",
            HttpMethod::Delete => "delete",
            HttpMethod::Head => "head",
            HttpMethod::Options => "options",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// HTTP basic-auth credentials attached to every request of a fetch cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BasicAuth {
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

/// A single request handed to an [`HttpTransport`](crate::traits::HttpTransport).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HttpRequest {
    #[serde(default)]
    pub method: HttpMethod,
    pub url: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<serde_json::Value>,
    #[serde(default)]
    pub params: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<BasicAuth>,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }
}

/// Response returned by a transport.
///
/// Header names are lower-cased. `data` is `None` when the body was empty.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    /// Final URL of the request, after redirects.
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub data: Option<serde_json::Value>,
}

impl HttpResponse {
    /// A 200 response carrying a JSON body.
    pub fn json(url: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            status: 200,
            url: url.into(),
            headers: BTreeMap::new(),
            data: Some(data),
        }
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Returns the body only when it is present in the JavaScript-truthy sense.
    pub fn payload(&self) -> Option<&serde_json::Value> {
        self.data.as_ref().filter(|v| is_present(v))
    }
}

/// Everything that defines one fetch cycle for a configured entity.
///
/// The cache key is derived from every field except `local_save`, `verbose`
/// and `next_page`.
#[derive(Clone, Default)]
pub struct FetchRequest {
    pub name: String,
    pub method: HttpMethod,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub data: Option<serde_json::Value>,
    pub params: BTreeMap<String, String>,
    pub auth: Option<BasicAuth>,
    /// Prefix for the local JSON copy; the file is written to `<path><name>.json`.
    pub path: Option<String>,
    pub local_save: bool,
    pub payload_key: Option<String>,
    pub next_page: Option<ContinuationHandle>,
    pub verbose: bool,
}

impl FetchRequest {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn with_method(mut self, method: HttpMethod) -> Self {
        self.method = method;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_auth(mut self, auth: BasicAuth) -> Self {
        self.auth = Some(auth);
        self
    }

    /// Write the raw payload to `<path><name>.json` after every successful cycle.
    pub fn with_local_save(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self.local_save = true;
        self
    }

    pub fn with_payload_key(mut self, key: impl Into<String>) -> Self {
        self.payload_key = Some(key.into());
        self
    }

    /// Paginate with a closure deciding on the next page.
    pub fn with_next_page<F>(self, next_page: F) -> Self
    where
        F: Fn(&str, &HttpResponse, &mut ContinuationContext) -> Result<NextPage, AppError>
            + Send
            + Sync
            + 'static,
    {
        self.with_continuation(next_page)
    }

    pub fn with_continuation(mut self, continuation: impl Continuation + 'static) -> Self {
        self.next_page = Some(ContinuationHandle::new(continuation));
        self
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// The request for the first page.
    pub fn to_http_request(&self) -> HttpRequest {
        HttpRequest {
            method: self.method,
            url: self.url.clone(),
            headers: self.headers.clone(),
            body: self.data.clone(),
            params: self.params.clone(),
            auth: self.auth.clone(),
        }
    }

    /// Local save target, when saving is enabled.
    pub fn local_save_path(&self) -> Option<String> {
        if !self.local_save {
            return None;
        }
        Some(format!(
            "{}{}.json",
            self.path.as_deref().unwrap_or_default(),
            self.name
        ))
    }
}

impl fmt::Debug for FetchRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchRequest")
            .field("name", &self.name)
            .field("method", &self.method)
            .field("url", &self.url)
            .field("headers", &self.headers)
            .field("data", &self.data)
            .field("params", &self.params)
            .field("auth", &self.auth.as_ref().map(|a| &a.username))
            .field("path", &self.path)
            .field("local_save", &self.local_save)
            .field("payload_key", &self.payload_key)
            .field("next_page", &self.next_page.is_some())
            .finish()
    }
}

/// Cache behaviour for one retrieval cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    pub enabled: bool,
    pub max_age: Duration,
}

impl CacheConfig {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            max_age: DEFAULT_MAX_CACHE_AGE,
        }
    }

    pub fn enabled(max_age: Duration) -> Self {
        Self {
            enabled: true,
            max_age,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self::disabled()
    }
}

/// Entities of one configured entity type, ready for node creation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeBatch {
    pub entities: Vec<serde_json::Value>,
    pub entity_type: String,
    pub schema_type: Option<serde_json::Value>,
    pub dev_refresh: bool,
    pub enable_refresh_endpoint: bool,
    /// Entity field used as the stable node identity.
    pub refresh_id: String,
}

/// JavaScript truthiness of a JSON value: `null`, `false`, `0` and `""` are absent.
pub fn is_present(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Null => false,
        serde_json::Value::Bool(b) => *b,
        serde_json::Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        serde_json::Value::String(s) => !s.is_empty(),
        serde_json::Value::Array(_) | serde_json::Value::Object(_) => true,
    }
}

/// Compute a SHA-256 hash of a string, returned as 64-char hex.
pub fn compute_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}
