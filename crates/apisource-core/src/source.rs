use tokio::sync::OnceCell;

use crate::config::{EntityOverrides, RuntimeFlags, SourceOptions};
use crate::entity::normalize_entities;
use crate::error::AppError;
use crate::models::{CacheConfig, HttpRequest};
use crate::report::{ErrorAction, SourceEvent, SourceReporter};
use crate::retrieve::RetrievalService;
use crate::traits::{CacheStore, HttpTransport, NodeSink};

/// What happened to one configured entity during a run.
#[derive(Debug, Clone, PartialEq)]
pub enum EntityOutcome {
    Created { count: usize },
    /// Fetched and normalized, but node creation was disabled.
    Skipped { entities: usize },
    /// A non-fatal error the reporter chose to step over.
    Failed { error: String },
    /// A fatal error stopped this entity before nodes were created.
    Aborted { error: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct EntityReport {
    pub name: String,
    pub outcome: EntityOutcome,
}

/// Per-entity results of [`SourceRunner::run`], in configuration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceSummary {
    pub entities: Vec<EntityReport>,
}

impl SourceSummary {
    /// Total number of nodes created across entities.
    pub fn nodes_created(&self) -> usize {
        self.entities
            .iter()
            .map(|e| match e.outcome {
                EntityOutcome::Created { count } => count,
                _ => 0,
            })
            .sum()
    }

    /// Entities that ended in `Failed` or `Aborted`.
    pub fn failures(&self) -> impl Iterator<Item = &EntityReport> {
        self.entities.iter().filter(|e| {
            matches!(
                e.outcome,
                EntityOutcome::Failed { .. } | EntityOutcome::Aborted { .. }
            )
        })
    }
}

/// Drives every configured entity through retrieval, normalization and
/// node creation.
///
/// Entities are processed one after another. Configuration, local-save and
/// entity-level errors abort only the entity they belong to; every other
/// error is handed to [`SourceReporter::on_entity_error`], which decides
/// whether the run goes on.
pub struct SourceRunner<T, C, R, S>
where
    T: HttpTransport,
    C: CacheStore,
    R: SourceReporter,
    S: NodeSink,
{
    retrieval: RetrievalService<T, C, R>,
    sink: S,
    flags: RuntimeFlags,
}

impl<T, C, R, S> SourceRunner<T, C, R, S>
where
    T: HttpTransport,
    C: CacheStore,
    R: SourceReporter,
    S: NodeSink,
{
    pub fn new(transport: T, cache: C, reporter: R, sink: S, flags: RuntimeFlags) -> Self {
        Self {
            retrieval: RetrievalService::new(transport, cache, reporter),
            sink,
            flags,
        }
    }

    pub fn reporter(&self) -> &R {
        self.retrieval.reporter()
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Process every entity in `options`.
    ///
    /// The login request, if configured, is sent once, just before the first
    /// entity that resolved successfully is fetched.
    pub async fn run(&self, options: &SourceOptions) -> Result<SourceSummary, AppError> {
        options.validate()?;

        let authorization = OnceCell::new();
        let cache = options.cache_config();

        let mut summary = SourceSummary::default();
        for overrides in &options.entities {
            let name = overrides
                .name
                .clone()
                .or_else(|| options.name.clone())
                .unwrap_or_else(|| "unnamed".to_string());

            let outcome = match self
                .source_entity(options, overrides, &authorization, &cache)
                .await
            {
                Ok(outcome) => outcome,
                Err(error) if error.is_fatal() => {
                    self.reporter().report(SourceEvent::EntityAborted {
                        name: &name,
                        error: &error,
                    });
                    EntityOutcome::Aborted {
                        error: error.to_string(),
                    }
                }
                Err(error) => match self.reporter().on_entity_error(&name, &error) {
                    ErrorAction::Abort => return Err(error),
                    ErrorAction::Continue => EntityOutcome::Failed {
                        error: error.to_string(),
                    },
                },
            };
            summary.entities.push(EntityReport { name, outcome });
        }

        Ok(summary)
    }

    async fn source_entity(
        &self,
        options: &SourceOptions,
        overrides: &EntityOverrides,
        authorization: &OnceCell<Option<String>>,
        cache: &CacheConfig,
    ) -> Result<EntityOutcome, AppError> {
        let mut entity = options.resolve(overrides)?;
        if let Some(login) = &options.login {
            let token = authorization.get_or_init(|| self.login(login)).await;
            if let Some(token) = token {
                entity
                    .headers
                    .insert("Authorization".to_string(), token.clone());
            }
        }

        self.reporter().report(SourceEvent::EntityStarted {
            name: &entity.name,
            url: &entity.url,
        });

        let result = self
            .retrieval
            .retrieve_result(&entity.to_fetch_request(), cache)
            .await?;
        let entities = normalize_entities(result, entity.entity_level.as_deref())?;

        if entity.skip_create_node {
            self.reporter().report(SourceEvent::EntitySkipped {
                name: &entity.name,
                entities: entities.len(),
            });
            return Ok(EntityOutcome::Skipped {
                entities: entities.len(),
            });
        }

        let entity_type = entity.entity_type();
        let count = self
            .sink
            .create_nodes(entity.node_batch(entities, &self.flags))
            .await?;
        self.reporter().report(SourceEvent::NodesCreated {
            entity_type: &entity_type,
            count,
        });
        Ok(EntityOutcome::Created { count })
    }

    /// Send the login request and turn its `id_token` into a bearer header value.
    async fn login(&self, login: &HttpRequest) -> Option<String> {
        let response = match self.retrieval.transport().send(login).await {
            Ok(response) => response,
            Err(error) => {
                self.reporter().report(SourceEvent::AuthFailed {
                    error: &error.to_string(),
                });
                return None;
            }
        };

        match response
            .data
            .as_ref()
            .and_then(|data| data.get("id_token"))
            .and_then(serde_json::Value::as_str)
        {
            Some(token) => Some(format!("Bearer {token}")),
            None => {
                self.reporter().report(SourceEvent::AuthFailed {
                    error: "login response has no id_token",
                });
                None
            }
        }
    }
}
