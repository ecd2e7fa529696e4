use thiserror::Error;

/// Application-wide error types for apisource.
#[derive(Error, Debug)]
pub enum AppError {
    /// Invalid source or entity configuration. Raised before any request is sent.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// The server answered with a non-2xx status.
    #[error("HTTP {status} for {url}")]
    HttpStatus {
        status: u16,
        url: String,
        /// The `errors` field of the response body, when the server sent one.
        errors: Option<serde_json::Value>,
    },

    /// HTTP request could not be built or its body could not be read.
    #[error("HTTP error: {0}")]
    HttpError(String),

    /// Network/connection error.
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Request timed out.
    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    /// A continuation function failed to compute the next page.
    #[error("Pagination error: {0}")]
    Pagination(String),

    /// Cache store read or write failed.
    #[error("Cache error: {0}")]
    CacheError(String),

    /// Writing the local JSON copy failed.
    #[error(
        "could not save the file {path}. Please make sure the folder structure is already in place: {source}"
    )]
    LocalSave {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The configured entity level does not exist in the fetched payload.
    #[error("Entity level error: {0}")]
    EntityLevel(String),

    /// JSON serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Node sink rejected a batch.
    #[error("Sink error: {0}")]
    SinkError(String),
}

impl AppError {
    /// Returns true if this error aborts processing of the current entity
    /// regardless of the reporter's error policy.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            AppError::ConfigError(_) | AppError::LocalSave { .. } | AppError::EntityLevel(_)
        )
    }

    /// Returns true for failures of the HTTP exchange itself.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            AppError::HttpStatus { .. }
                | AppError::HttpError(_)
                | AppError::NetworkError(_)
                | AppError::Timeout(_)
        )
    }

    /// The error list reported by the server, if any.
    pub fn response_errors(&self) -> Option<&serde_json::Value> {
        match self {
            AppError::HttpStatus { errors, .. } => errors.as_ref(),
            _ => None,
        }
    }
}
