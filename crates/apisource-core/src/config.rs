use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::AppError;
use crate::models::{
    BasicAuth, CacheConfig, FetchRequest, HttpMethod, HttpRequest, HttpResponse, NodeBatch,
};
use crate::paginate::{ContinuationContext, NextPage};
use crate::strategy::PaginationStrategy;
use crate::traits::ContinuationHandle;

const DEFAULT_MAX_CACHE_SECONDS: u64 = 60 * 60 * 24;

fn default_entities() -> Vec<EntityOverrides> {
    vec![EntityOverrides::default()]
}

fn default_refresh_id() -> String {
    "id".to_string()
}

fn default_max_cache_seconds() -> u64 {
    DEFAULT_MAX_CACHE_SECONDS
}

/// Source configuration: shared defaults plus one override set per entity.
///
/// Usually loaded from a JSON file with [`from_path`](Self::from_path).
/// Closures cannot live in a file, so `next_page` is only set from code.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourceOptions {
    #[serde(default)]
    pub type_prefix: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub method: HttpMethod,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
    #[serde(default)]
    pub local_save: bool,
    #[serde(default)]
    pub skip_create_node: bool,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub auth: Option<BasicAuth>,
    /// Login request sent once, before the first entity that resolves; its `id_token` becomes a bearer token.
    #[serde(default)]
    pub login: Option<HttpRequest>,
    #[serde(default)]
    pub payload_key: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub entity_level: Option<String>,
    #[serde(default)]
    pub schema_type: Option<serde_json::Value>,
    #[serde(default = "default_entities")]
    pub entities: Vec<EntityOverrides>,
    #[serde(default)]
    pub params: BTreeMap<String, String>,
    #[serde(default)]
    pub verbose_output: bool,
    #[serde(default)]
    pub enable_dev_refresh: bool,
    #[serde(default = "default_refresh_id")]
    pub refresh_id: String,
    #[serde(default)]
    pub allow_cache: bool,
    #[serde(default = "default_max_cache_seconds")]
    pub max_cache_duration_seconds: u64,
    #[serde(default)]
    pub pagination: Option<PaginationStrategy>,
    #[serde(skip)]
    pub next_page: Option<ContinuationHandle>,
}

impl Default for SourceOptions {
    fn default() -> Self {
        Self {
            type_prefix: String::new(),
            url: None,
            method: HttpMethod::Get,
            headers: BTreeMap::new(),
            data: None,
            local_save: false,
            skip_create_node: false,
            path: None,
            auth: None,
            login: None,
            payload_key: None,
            name: None,
            entity_level: None,
            schema_type: None,
            entities: default_entities(),
            params: BTreeMap::new(),
            verbose_output: false,
            enable_dev_refresh: false,
            refresh_id: default_refresh_id(),
            allow_cache: false,
            max_cache_duration_seconds: DEFAULT_MAX_CACHE_SECONDS,
            pagination: None,
            next_page: None,
        }
    }
}

/// Per-entity overrides. Every field left unset falls back to [`SourceOptions`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EntityOverrides {
    pub type_prefix: Option<String>,
    pub url: Option<String>,
    pub method: Option<HttpMethod>,
    pub headers: Option<BTreeMap<String, String>>,
    pub data: Option<serde_json::Value>,
    pub local_save: Option<bool>,
    pub skip_create_node: Option<bool>,
    pub path: Option<String>,
    pub auth: Option<BasicAuth>,
    pub params: Option<BTreeMap<String, String>>,
    pub payload_key: Option<String>,
    pub name: Option<String>,
    pub entity_level: Option<String>,
    pub schema_type: Option<serde_json::Value>,
    pub enable_dev_refresh: Option<bool>,
    pub refresh_id: Option<String>,
    pub pagination: Option<PaginationStrategy>,
    #[serde(skip)]
    pub next_page: Option<ContinuationHandle>,
}

impl EntityOverrides {
    pub fn with_next_page<F>(mut self, next_page: F) -> Self
    where
        F: Fn(&str, &HttpResponse, &mut ContinuationContext) -> Result<NextPage, AppError>
            + Send
            + Sync
            + 'static,
    {
        self.next_page = Some(ContinuationHandle::new(next_page));
        self
    }
}

/// Fully resolved configuration for one entity.
#[derive(Debug, Clone)]
pub struct EntityConfig {
    pub type_prefix: String,
    pub url: String,
    pub method: HttpMethod,
    pub headers: BTreeMap<String, String>,
    pub data: Option<serde_json::Value>,
    pub local_save: bool,
    pub skip_create_node: bool,
    pub path: Option<String>,
    pub auth: Option<BasicAuth>,
    pub params: BTreeMap<String, String>,
    pub payload_key: Option<String>,
    pub name: String,
    pub entity_level: Option<String>,
    pub schema_type: Option<serde_json::Value>,
    pub enable_dev_refresh: bool,
    pub refresh_id: String,
    pub next_page: Option<ContinuationHandle>,
    pub verbose: bool,
}

impl EntityConfig {
    /// Node type: prefix followed by the entity name.
    pub fn entity_type(&self) -> String {
        format!("{}{}", self.type_prefix, self.name)
    }

    pub fn to_fetch_request(&self) -> FetchRequest {
        FetchRequest {
            name: self.name.clone(),
            method: self.method,
            url: self.url.clone(),
            headers: self.headers.clone(),
            data: self.data.clone(),
            params: self.params.clone(),
            auth: self.auth.clone(),
            path: self.path.clone(),
            local_save: self.local_save,
            payload_key: self.payload_key.clone(),
            next_page: self.next_page.clone(),
            verbose: self.verbose,
        }
    }

    pub fn node_batch(&self, entities: Vec<serde_json::Value>, flags: &RuntimeFlags) -> NodeBatch {
        NodeBatch {
            entities,
            entity_type: self.entity_type(),
            schema_type: self.schema_type.clone(),
            dev_refresh: flags.development && self.enable_dev_refresh,
            enable_refresh_endpoint: flags.enable_refresh_endpoint,
            refresh_id: self.refresh_id.clone(),
        }
    }
}

impl SourceOptions {
    /// Parse options from a JSON document.
    pub fn from_json_str(raw: &str) -> Result<Self, AppError> {
        let options: Self = serde_json::from_str(raw)
            .map_err(|e| AppError::ConfigError(format!("Invalid source options: {e}")))?;
        options.validate()?;
        Ok(options)
    }

    /// Read and parse options from a JSON file.
    pub fn from_path(path: &Path) -> Result<Self, AppError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            AppError::ConfigError(format!(
                "Failed to read source options {}: {e}",
                path.display()
            ))
        })?;
        Self::from_json_str(&raw).map_err(|e| match e {
            AppError::ConfigError(msg) => {
                AppError::ConfigError(format!("{}: {msg}", path.display()))
            }
            other => other,
        })
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.max_cache_duration_seconds == 0 {
            return Err(AppError::ConfigError(
                "max_cache_duration_seconds must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn with_next_page<F>(mut self, next_page: F) -> Self
    where
        F: Fn(&str, &HttpResponse, &mut ContinuationContext) -> Result<NextPage, AppError>
            + Send
            + Sync
            + 'static,
    {
        self.next_page = Some(ContinuationHandle::new(next_page));
        self
    }

    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig {
            enabled: self.allow_cache,
            max_age: Duration::from_secs(self.max_cache_duration_seconds),
        }
    }

    /// Merge one entity's overrides over the shared defaults.
    pub fn resolve(&self, entity: &EntityOverrides) -> Result<EntityConfig, AppError> {
        let name = entity
            .name
            .clone()
            .or_else(|| self.name.clone())
            .ok_or_else(|| AppError::ConfigError("entity has no name".into()))?;
        let url = entity
            .url
            .clone()
            .or_else(|| self.url.clone())
            .filter(|u| !u.is_empty())
            .ok_or_else(|| AppError::ConfigError(format!("entity '{name}' has no url")))?;

        let local_save = entity.local_save.unwrap_or(self.local_save);
        let path = entity.path.clone().or_else(|| self.path.clone());
        if local_save && path.is_none() {
            return Err(AppError::ConfigError(format!(
                "entity '{name}' enables local_save without a path"
            )));
        }

        let next_page = entity
            .next_page
            .clone()
            .or_else(|| entity.pagination.clone().map(ContinuationHandle::new))
            .or_else(|| self.next_page.clone())
            .or_else(|| self.pagination.clone().map(ContinuationHandle::new));
        let payload_key = entity
            .payload_key
            .clone()
            .or_else(|| self.payload_key.clone());
        if payload_key.is_some() && next_page.is_some() {
            return Err(AppError::ConfigError(format!(
                "entity '{name}': payload_key and pagination cannot be used together"
            )));
        }

        Ok(EntityConfig {
            type_prefix: entity
                .type_prefix
                .clone()
                .unwrap_or_else(|| self.type_prefix.clone()),
            url,
            method: entity.method.unwrap_or(self.method),
            headers: entity
                .headers
                .clone()
                .unwrap_or_else(|| self.headers.clone()),
            data: entity.data.clone().or_else(|| self.data.clone()),
            local_save,
            skip_create_node: entity.skip_create_node.unwrap_or(self.skip_create_node),
            path,
            auth: entity.auth.clone().or_else(|| self.auth.clone()),
            params: entity.params.clone().unwrap_or_else(|| self.params.clone()),
            payload_key,
            name,
            entity_level: entity
                .entity_level
                .clone()
                .or_else(|| self.entity_level.clone()),
            schema_type: entity
                .schema_type
                .clone()
                .or_else(|| self.schema_type.clone()),
            enable_dev_refresh: entity.enable_dev_refresh.unwrap_or(self.enable_dev_refresh),
            refresh_id: entity
                .refresh_id
                .clone()
                .unwrap_or_else(|| self.refresh_id.clone()),
            next_page,
            verbose: self.verbose_output,
        })
    }
}

/// Process-wide flags, resolved once at startup and passed down explicitly.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RuntimeFlags {
    /// Running in development mode; enables per-entity dev refresh.
    pub development: bool,
    pub enable_refresh_endpoint: bool,
}

impl RuntimeFlags {
    /// Read flags from environment variables.
    ///
    /// - `APISOURCE_ENV` (`development` enables dev mode)
    /// - `ENABLE_REFRESH_ENDPOINT` (`1`, `true` or `yes`)
    pub fn from_env() -> Self {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Self {
        let development = var("APISOURCE_ENV").is_some_and(|v| v == "development");
        let enable_refresh_endpoint = var("ENABLE_REFRESH_ENDPOINT").is_some_and(|v| {
            matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes")
        });
        Self {
            development,
            enable_refresh_endpoint,
        }
    }
}
