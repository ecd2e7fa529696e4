use apisource_client::ReqwestTransport;
use apisource_core::models::{CacheConfig, FetchRequest};
use apisource_core::paginate::NextPage;
use apisource_core::report::TracingReporter;
use apisource_core::retrieve::RetrievalService;
use apisource_core::strategy::PaginationStrategy;
use apisource_core::traits::NullCache;
use serde_json::json;

use crate::integration::common::spawn_api;

fn service() -> RetrievalService<ReqwestTransport, NullCache, TracingReporter> {
    RetrievalService::new(
        ReqwestTransport::new().unwrap(),
        NullCache,
        TracingReporter::new(),
    )
}

#[tokio::test]
async fn follows_link_headers_to_the_end() {
    let api = spawn_api().await;
    let request =
        FetchRequest::new("items", api.url("/items")).with_continuation(PaginationStrategy::LinkHeader);

    let result = service()
        .retrieve(&request, &CacheConfig::disabled())
        .await
        .unwrap();

    assert_eq!(
        result,
        Some(json!([
            [{"id": 1}, {"id": 2}],
            [{"id": 3}, {"id": 4}],
            [{"id": 5}, {"id": 6}]
        ]))
    );
    assert_eq!(api.state.hits(), 3);
}

#[tokio::test]
async fn follows_next_url_in_body() {
    let api = spawn_api().await;
    let request = FetchRequest::new("cursor", api.url("/cursor")).with_continuation(
        PaginationStrategy::BodyField {
            pointer: "/links/next".into(),
        },
    );

    let result = service()
        .retrieve(&request, &CacheConfig::disabled())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(result[0]["data"], json!([{"id": "a"}]));
    assert_eq!(result[1]["data"], json!([{"id": "b"}]));
    assert_eq!(api.state.hits(), 2);
}

#[tokio::test]
async fn page_numbers_stop_on_empty_page() {
    let api = spawn_api().await;
    let request = FetchRequest::new("pages", api.url("/pages")).with_continuation(
        PaginationStrategy::PageNumber {
            param: "page".into(),
            start: 1,
            pointer: None,
        },
    );

    let result = service()
        .retrieve(&request, &CacheConfig::disabled())
        .await
        .unwrap();

    assert_eq!(result, Some(json!([[{"n": 1}], [{"n": 2}], []])));
    assert_eq!(api.state.hits(), 3);
}

#[tokio::test]
async fn configured_page_param_does_not_pin_every_page() {
    let api = spawn_api().await;
    let request = FetchRequest::new("pages", api.url("/pages"))
        .with_param("page", "1")
        .with_continuation(PaginationStrategy::PageNumber {
            param: "page".into(),
            start: 1,
            pointer: None,
        });

    let result = service()
        .retrieve(&request, &CacheConfig::disabled())
        .await
        .unwrap();

    assert_eq!(result, Some(json!([[{"n": 1}], [{"n": 2}], []])));
    assert_eq!(api.state.hits(), 3);
}

#[tokio::test]
async fn closure_can_cap_page_count() {
    let api = spawn_api().await;
    let base = api.url("/items");
    let request = FetchRequest::new("items", api.url("/items")).with_next_page(move |_, _, ctx| {
        if ctx.pages_fetched() < 2 {
            Ok(NextPage::to(format!("{base}?page={}", ctx.pages_fetched() + 1)))
        } else {
            Ok(NextPage::done())
        }
    });

    let result = service()
        .retrieve(&request, &CacheConfig::disabled())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(result.as_array().unwrap().len(), 2);
    assert_eq!(result[1], json!([{"id": 3}, {"id": 4}]));
}

#[tokio::test]
async fn single_page_is_returned_bare() {
    let api = spawn_api().await;

    let result = service()
        .retrieve(
            &FetchRequest::new("items", api.url("/items")),
            &CacheConfig::disabled(),
        )
        .await
        .unwrap();

    assert_eq!(result, Some(json!([{"id": 1}, {"id": 2}])));
    assert_eq!(api.state.hits(), 1);
}
