use apisource_client::{JsonDirSink, ReqwestTransport};
use apisource_core::cache::FileCache;
use apisource_core::config::{RuntimeFlags, SourceOptions};
use apisource_core::report::TracingReporter;
use apisource_core::source::{EntityOutcome, SourceRunner};
use serde_json::{Value, json};
use tempfile::TempDir;

use crate::integration::common::{TestApi, spawn_api};

fn blog_options(api: &TestApi, password: &str) -> SourceOptions {
    serde_json::from_value(json!({
        "type_prefix": "blog__",
        "allow_cache": true,
        "login": {
            "method": "post",
            "url": api.url("/login"),
            "body": {"username": "editor", "password": password}
        },
        "entities": [
            {"name": "posts", "url": api.url("/secure/posts"), "refresh_id": "slug"},
            {
                "name": "comments",
                "url": api.url("/cursor"),
                "entity_level": "data",
                "pagination": {"type": "body_field", "pointer": "/links/next"}
            }
        ]
    }))
    .unwrap()
}

fn read_nodes(sink: &JsonDirSink, entity_type: &str) -> Vec<Value> {
    let raw = std::fs::read_to_string(sink.path_for(entity_type)).unwrap();
    let file: Value = serde_json::from_str(&raw).unwrap();
    file["nodes"].as_array().unwrap().clone()
}

#[tokio::test]
async fn full_run_writes_nodes_and_reuses_cache() -> anyhow::Result<()> {
    let api = spawn_api().await;
    let cache_dir = TempDir::new()?;
    let out_dir = TempDir::new()?;
    let sink = JsonDirSink::new(out_dir.path());
    let runner = SourceRunner::new(
        ReqwestTransport::new()?,
        FileCache::new(cache_dir.path()),
        TracingReporter::new(),
        sink.clone(),
        RuntimeFlags::default(),
    );
    let options = blog_options(&api, "secret");

    let summary = runner.run(&options).await?;

    assert_eq!(
        summary.entities[0].outcome,
        EntityOutcome::Created { count: 2 }
    );
    assert_eq!(
        summary.entities[1].outcome,
        EntityOutcome::Created { count: 2 }
    );
    // login + posts + two cursor pages
    assert_eq!(api.state.hits(), 4);

    let posts = read_nodes(&sink, "blog__posts");
    assert_eq!(posts[0]["slug"], "hello-world");
    assert_eq!(posts[0]["alternative_id"], 1);
    assert_eq!(posts[0]["internal"]["type"], "blog__posts");

    let comments = read_nodes(&sink, "blog__comments");
    let ids: Vec<&Value> = comments.iter().map(|n| &n["alternative_id"]).collect();
    assert_eq!(ids, vec![&json!("a"), &json!("b")]);

    // A second run only logs in; both payloads come from the file cache.
    let again = runner.run(&options).await?;
    assert_eq!(again.nodes_created(), 4);
    assert_eq!(api.state.hits(), 5);
    assert_eq!(read_nodes(&sink, "blog__posts"), posts);

    Ok(())
}

#[tokio::test]
async fn failed_login_leaves_protected_entity_failed() -> anyhow::Result<()> {
    let api = spawn_api().await;
    let cache_dir = TempDir::new()?;
    let out_dir = TempDir::new()?;
    let runner = SourceRunner::new(
        ReqwestTransport::new()?,
        FileCache::new(cache_dir.path()),
        TracingReporter::new(),
        JsonDirSink::new(out_dir.path()),
        RuntimeFlags::default(),
    );

    let summary = runner.run(&blog_options(&api, "wrong")).await?;

    match &summary.entities[0].outcome {
        EntityOutcome::Failed { error } => assert!(error.contains("401")),
        other => panic!("unexpected outcome {other:?}"),
    }
    assert_eq!(
        summary.entities[1].outcome,
        EntityOutcome::Created { count: 2 }
    );
    assert_eq!(summary.failures().count(), 1);

    Ok(())
}

#[tokio::test]
async fn aborting_reporter_stops_on_http_error() -> anyhow::Result<()> {
    let api = spawn_api().await;
    let out_dir = TempDir::new()?;
    let runner = SourceRunner::new(
        ReqwestTransport::new()?,
        apisource_core::traits::NullCache,
        TracingReporter::new().abort_on_entity_error(true),
        JsonDirSink::new(out_dir.path()),
        RuntimeFlags::default(),
    );
    let options: SourceOptions = serde_json::from_value(json!({
        "entities": [
            {"name": "broken", "url": api.url("/broken")},
            {"name": "items", "url": api.url("/items")}
        ]
    }))?;

    let err = runner.run(&options).await.unwrap_err();

    assert_eq!(
        err.response_errors(),
        Some(&json!([{"message": "invalid filter"}]))
    );
    assert_eq!(api.state.hits(), 1);

    Ok(())
}

#[tokio::test]
async fn local_save_writes_pretty_copy() -> anyhow::Result<()> {
    let api = spawn_api().await;
    let save_dir = TempDir::new()?;
    let out_dir = TempDir::new()?;
    let runner = SourceRunner::new(
        ReqwestTransport::new()?,
        apisource_core::traits::NullCache,
        TracingReporter::new(),
        JsonDirSink::new(out_dir.path()),
        RuntimeFlags::default(),
    );
    let options: SourceOptions = serde_json::from_value(json!({
        "url": api.url("/items"),
        "name": "items",
        "local_save": true,
        "path": format!("{}/", save_dir.path().display()),
        "skip_create_node": true
    }))?;

    let summary = runner.run(&options).await?;

    assert_eq!(
        summary.entities[0].outcome,
        EntityOutcome::Skipped { entities: 2 }
    );
    let saved = std::fs::read_to_string(save_dir.path().join("items.json"))?;
    assert_eq!(
        saved,
        serde_json::to_string_pretty(&json!([{"id": 1}, {"id": 2}]))?
    );
    assert!(!out_dir.path().join("items.json").exists());

    Ok(())
}
