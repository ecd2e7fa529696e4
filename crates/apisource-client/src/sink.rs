use std::path::PathBuf;

use apisource_core::cache::safe_file_stem;
use apisource_core::error::AppError;
use apisource_core::models::{NodeBatch, compute_hash};
use apisource_core::traits::NodeSink;
use serde::Serialize;

/// Node sink that writes one JSON document per node type to `<dir>/<entity_type>.json`.
///
/// Node types are configuration-derived, so a type such as `../x` is written
/// under its digest instead of leaving `dir`.
///
/// A later batch of the same type replaces the file.
#[derive(Debug, Clone)]
pub struct JsonDirSink {
    dir: PathBuf,
}

#[derive(Debug, Serialize)]
struct NodeFile<'a> {
    entity_type: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    schema_type: Option<&'a serde_json::Value>,
    dev_refresh: bool,
    enable_refresh_endpoint: bool,
    nodes: Vec<serde_json::Value>,
}

impl JsonDirSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// File for `entity_type`. Types that are not a plain file name are hashed.
    pub fn path_for(&self, entity_type: &str) -> PathBuf {
        self.dir.join(format!("{}.json", safe_file_stem(entity_type)))
    }
}

/// Turn a batch into nodes.
///
/// The node id is a digest of the type and the entity's `refresh_id` field,
/// or of its position when the field is missing. An entity's own `id` moves
/// to `alternative_id`. Non-object entities are wrapped under `value`.
pub fn build_nodes(batch: &NodeBatch) -> Result<Vec<serde_json::Value>, AppError> {
    batch
        .entities
        .iter()
        .enumerate()
        .map(|(index, entity)| -> Result<serde_json::Value, AppError> {
            let identity = match entity.get(&batch.refresh_id) {
                Some(serde_json::Value::String(s)) => s.clone(),
                Some(value) if !value.is_null() => value.to_string(),
                _ => index.to_string(),
            };
            let content_digest = compute_hash(&serde_json::to_string(entity)?);

            let mut fields = match entity {
                serde_json::Value::Object(map) => map.clone(),
                other => {
                    let mut map = serde_json::Map::new();
                    map.insert("value".to_string(), other.clone());
                    map
                }
            };
            if let Some(original) = fields.remove("id") {
                fields.insert("alternative_id".to_string(), original);
            }
            fields.insert(
                "id".to_string(),
                serde_json::Value::String(compute_hash(&format!(
                    "{}:{identity}",
                    batch.entity_type
                ))),
            );
            fields.insert(
                "internal".to_string(),
                serde_json::json!({
                    "type": batch.entity_type,
                    "content_digest": content_digest,
                }),
            );
            Ok(serde_json::Value::Object(fields))
        })
        .collect()
}

impl NodeSink for JsonDirSink {
    async fn create_nodes(&self, batch: NodeBatch) -> Result<usize, AppError> {
        let nodes = build_nodes(&batch)?;
        let count = nodes.len();
        let file = NodeFile {
            entity_type: &batch.entity_type,
            schema_type: batch.schema_type.as_ref(),
            dev_refresh: batch.dev_refresh,
            enable_refresh_endpoint: batch.enable_refresh_endpoint,
            nodes,
        };

        tokio::fs::create_dir_all(&self.dir).await.map_err(|e| {
            AppError::SinkError(format!(
                "Failed to create node dir {}: {e}",
                self.dir.display()
            ))
        })?;

        let path = self.path_for(&batch.entity_type);
        let tmp = path.with_extension("json.tmp");
        let raw = serde_json::to_vec_pretty(&file)?;
        tokio::fs::write(&tmp, raw)
            .await
            .map_err(|e| AppError::SinkError(format!("Failed to write {}: {e}", tmp.display())))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| AppError::SinkError(format!("Failed to write {}: {e}", path.display())))?;

        tracing::debug!(path = %path.display(), count, "nodes written");
        Ok(count)
    }
}
