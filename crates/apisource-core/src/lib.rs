pub mod cache;
pub mod config;
pub mod entity;
pub mod error;
pub mod models;
pub mod paginate;
pub mod report;
pub mod retrieve;
pub mod sink;
pub mod source;
pub mod strategy;
pub mod traits;


pub use cache::{FileCache, MemoryCache, cache_key};
pub use config::{EntityConfig, EntityOverrides, RuntimeFlags, SourceOptions};
pub use entity::normalize_entities;
pub use error::AppError;
pub use models::{
    BasicAuth, CacheConfig, FetchRequest, HttpMethod, HttpRequest, HttpResponse, NodeBatch,
    compute_hash,
};
pub use paginate::{ContinuationContext, NextPage, PagedResult, fetch_pages};
pub use report::{ErrorAction, SourceEvent, SourceReporter, TracingReporter};
pub use retrieve::RetrievalService;
pub use sink::MemorySink;
pub use source::{EntityOutcome, EntityReport, SourceRunner, SourceSummary};
pub use strategy::PaginationStrategy;
pub use traits::{CacheStore, Continuation, ContinuationHandle, HttpTransport, NodeSink, NullCache};
