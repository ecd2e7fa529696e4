use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use axum::extract::{Query, State};
use axum::http::{HeaderMap, Method, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{Value, json};
use tracing_subscriber::EnvFilter;

pub const TOKEN: &str = "test-id-token";

/// Request counter shared by every handler.
#[derive(Clone, Default)]
pub struct ApiState {
    hits: Arc<AtomicUsize>,
}

impl ApiState {
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    fn hit(&self) {
        self.hits.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct TestApi {
    pub base_url: String,
    pub state: ApiState,
}

impl TestApi {
    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Serve the fake JSON API on an ephemeral local port.
pub async fn spawn_api() -> TestApi {
    init_tracing();

    let state = ApiState::default();
    let app = router(state.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind test listener");
    let addr = listener.local_addr().expect("Failed to read local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("test server failed");
    });

    TestApi {
        base_url: format!("http://{addr}"),
        state,
    }
}

fn router(state: ApiState) -> Router {
    Router::new()
        .route("/items", get(items))
        .route("/cursor", get(cursor))
        .route("/pages", get(pages))
        .route("/broken", get(broken))
        .route("/empty", get(empty))
        .route("/echo", get(echo).post(echo))
        .route("/login", post(login))
        .route("/secure/posts", get(secure_posts))
        .with_state(state)
}

fn page_param(query: &HashMap<String, String>, name: &str) -> u64 {
    query.get(name).and_then(|p| p.parse().ok()).unwrap_or(1)
}

/// Three pages of two items, chained with `Link` headers.
async fn items(
    State(state): State<ApiState>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    state.hit();
    let page = page_param(&query, "page");
    let first = (page - 1) * 2 + 1;
    let body = Json(json!([{"id": first}, {"id": first + 1}]));

    if page < 3 {
        let link = format!(
            "</items?page={}>; rel=\"next\", </items?page=3>; rel=\"last\"",
            page + 1
        );
        ([(header::LINK, link)], body).into_response()
    } else {
        body.into_response()
    }
}

/// Two pages, the next URL carried in the body.
async fn cursor(
    State(state): State<ApiState>,
    Query(query): Query<HashMap<String, String>>,
) -> Json<Value> {
    state.hit();
    match query.get("after").map(String::as_str) {
        None => Json(json!({"data": [{"id": "a"}], "links": {"next": "/cursor?after=a"}})),
        Some(_) => Json(json!({"data": [{"id": "b"}], "links": {"next": null}})),
    }
}

/// Numbered pages; the third one is empty.
async fn pages(
    State(state): State<ApiState>,
    Query(query): Query<HashMap<String, String>>,
) -> Json<Value> {
    state.hit();
    match page_param(&query, "page") {
        1 => Json(json!([{"n": 1}])),
        2 => Json(json!([{"n": 2}])),
        _ => Json(json!([])),
    }
}

async fn broken(State(state): State<ApiState>) -> Response {
    state.hit();
    (
        StatusCode::UNPROCESSABLE_ENTITY,
        Json(json!({"errors": [{"message": "invalid filter"}]})),
    )
        .into_response()
}

async fn empty(State(state): State<ApiState>) -> StatusCode {
    state.hit();
    StatusCode::NO_CONTENT
}

/// Reflect the request back as JSON.
async fn echo(
    State(state): State<ApiState>,
    method: Method,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
    body: String,
) -> Json<Value> {
    state.hit();
    let header_value = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    Json(json!({
        "method": method.as_str(),
        "query": query,
        "authorization": header_value("authorization"),
        "x-custom": header_value("x-custom"),
        "body": serde_json::from_str::<Value>(&body).ok(),
    }))
}

async fn login(State(state): State<ApiState>, Json(body): Json<Value>) -> Response {
    state.hit();
    if body["username"] == "editor" && body["password"] == "secret" {
        Json(json!({"id_token": TOKEN})).into_response()
    } else {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({"errors": ["bad credentials"]})),
        )
            .into_response()
    }
}

async fn secure_posts(State(state): State<ApiState>, headers: HeaderMap) -> Response {
    state.hit();
    let expected = format!("Bearer {TOKEN}");
    let authorized = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == expected);
    if !authorized {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"errors": ["unauthorized"]})),
        )
            .into_response();
    }
    Json(json!([
        {"id": 1, "slug": "hello-world", "title": "Hello"},
        {"id": 2, "slug": "second", "title": "Second"}
    ]))
    .into_response()
}
