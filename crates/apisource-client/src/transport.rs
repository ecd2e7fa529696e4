use std::collections::{BTreeMap, HashSet};
use std::time::Duration;

use apisource_core::error::AppError;
use apisource_core::models::{HttpMethod, HttpRequest, HttpResponse};
use apisource_core::traits::HttpTransport;
use reqwest::{Client, Method};
use url::Url;

/// HTTP transport using reqwest.
///
/// Sends JSON requests with the configured headers, query parameters and
/// basic auth, and parses JSON responses. Non-2xx statuses become
/// [`AppError::HttpStatus`] carrying the body's `errors` field.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: Client,
    timeout_secs: u64,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, AppError> {
        Self::with_timeout(Duration::from_secs(30))
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, AppError> {
        let timeout_secs = timeout.as_secs();
        let client = Client::builder()
            .user_agent(concat!("apisource/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::HttpError(e.to_string()))?;

        Ok(Self {
            client,
            timeout_secs,
        })
    }

    fn map_send_error(&self, e: reqwest::Error) -> AppError {
        if e.is_timeout() {
            AppError::Timeout(self.timeout_secs)
        } else if e.is_connect() {
            AppError::NetworkError(format!("Connection failed: {e}"))
        } else {
            AppError::HttpError(e.to_string())
        }
    }
}

impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse, AppError> {
        let url = build_url(request)?;

        let mut builder = self.client.request(to_method(request.method), url);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }
        if let Some(auth) = &request.auth {
            builder = builder.basic_auth(&auth.username, auth.password.as_ref());
        }

        let response = builder.send().await.map_err(|e| self.map_send_error(e))?;

        let status = response.status().as_u16();
        let final_url = response.url().to_string();
        let headers = collect_headers(response.headers());
        let bytes = response
            .bytes()
            .await
            .map_err(|e| AppError::HttpError(format!("Failed to read response body: {e}")))?;
        let data = parse_body(&bytes);

        if !(200..300).contains(&status) {
            return Err(AppError::HttpStatus {
                status,
                url: final_url,
                errors: data.as_ref().and_then(|d| d.get("errors")).cloned(),
            });
        }

        Ok(HttpResponse {
            status,
            url: final_url,
            headers,
            data,
        })
    }
}

/// Parse the request URL and append its query parameters.
///
/// A parameter already present in the URL's own query wins, so a next-page
/// URL carrying `page=2` is not overridden by a configured `page=1`.
fn build_url(request: &HttpRequest) -> Result<Url, AppError> {
    let mut url = Url::parse(&request.url)
        .map_err(|e| AppError::ConfigError(format!("Invalid URL '{}': {e}", request.url)))?;

    match url.scheme() {
        "http" | "https" => {}
        scheme => {
            return Err(AppError::ConfigError(format!(
                "URL scheme '{scheme}' is not allowed (only http/https)"
            )));
        }
    }

    let present: HashSet<String> = url.query_pairs().map(|(k, _)| k.into_owned()).collect();
    let extra: Vec<(&String, &String)> = request
        .params
        .iter()
        .filter(|(key, _)| !present.contains(key.as_str()))
        .collect();
    if !extra.is_empty() {
        url.query_pairs_mut().extend_pairs(extra);
    }
    Ok(url)
}

fn to_method(method: HttpMethod) -> Method {
    match method {
        HttpMethod::Get => Method::GET,
        HttpMethod::Post => Method::POST,
        HttpMethod::Put => Method::PUT,
        HttpMethod::Patch => Method::PATCH,
        HttpMethod::Delete => Method::DELETE,
        HttpMethod::Head => Method::HEAD,
        HttpMethod::Options => Method::OPTIONS,
    }
}

/// Lower-cased header map. Repeated headers are joined with `", "`.
fn collect_headers(headers: &reqwest::header::HeaderMap) -> BTreeMap<String, String> {
    let mut out: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers {
        let Ok(value) = value.to_str() else {
            continue;
        };
        out.entry(name.as_str().to_string())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(value);
            })
            .or_insert_with(|| value.to_string());
    }
    out
}

/// Empty bodies are absent; bodies that are not JSON are kept as a string.
fn parse_body(bytes: &[u8]) -> Option<serde_json::Value> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return None;
    }
    match serde_json::from_slice(bytes) {
        Ok(value) => Some(value),
        Err(_) => Some(serde_json::Value::String(
            String::from_utf8_lossy(bytes).into_owned(),
        )),
    }
}
