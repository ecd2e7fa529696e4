use std::sync::{Arc, Mutex};

use crate::error::AppError;
use crate::models::NodeBatch;
use crate::traits::NodeSink;

/// Sink that keeps every batch in memory. Clones share the same storage.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    batches: Arc<Mutex<Vec<NodeBatch>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the batches received so far.
    pub fn batches(&self) -> Vec<NodeBatch> {
        self.batches
            .lock()
            .map(|batches| batches.clone())
            .unwrap_or_default()
    }

    /// All entities of the given node type, across batches.
    pub fn entities(&self, entity_type: &str) -> Vec<serde_json::Value> {
        self.batches()
            .into_iter()
            .filter(|b| b.entity_type == entity_type)
            .flat_map(|b| b.entities)
            .collect()
    }
}

impl NodeSink for MemorySink {
    async fn create_nodes(&self, batch: NodeBatch) -> Result<usize, AppError> {
        let count = batch.entities.len();
        self.batches
            .lock()
            .map_err(|e| AppError::SinkError(format!("sink lock poisoned: {e}")))?
            .push(batch);
        Ok(count)
    }
}
