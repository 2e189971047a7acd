use thiserror::Error;

/// Errors raised while opening, registering or probing connections.
#[derive(Debug, Error)]
pub enum ConnectError {
    /// A live connection with this name is already registered.
    #[error("connection '{name}' already exists")]
    DuplicateName { name: String },

    /// No live connection is registered under this name.
    #[error("connection '{name}' not found")]
    NotFound { name: String },

    /// The descriptor names an engine the connector cannot open.
    #[error("unsupported engine '{engine}' for connection '{name}'")]
    UnsupportedEngine { name: String, engine: String },

    /// The driver rejected the address or could not build the pool.
    #[error("failed to open connection '{name}': {source}")]
    ConnectFailed {
        name: String,
        #[source]
        source: sqlx::Error,
    },

    /// The liveness probe against an open pool failed.
    #[error("health check failed for connection '{name}': {source}")]
    Probe {
        name: String,
        #[source]
        source: sqlx::Error,
    },

    /// Loading descriptors from the metadata store failed.
    #[error("metadata store error: {0}")]
    Store(#[from] ferry_store::StoreError),
}

impl ConnectError {
    pub fn code(&self) -> &'static str {
        match self {
            ConnectError::DuplicateName { .. } => "DUPLICATE_NAME",
            ConnectError::NotFound { .. } => "NOT_FOUND",
            ConnectError::UnsupportedEngine { .. } => "UNSUPPORTED_ENGINE",
            ConnectError::ConnectFailed { .. } => "CONNECT_FAILED",
            ConnectError::Probe { .. } => "HEALTH_CHECK_FAILED",
            ConnectError::Store(_) => "STORE_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, ConnectError>;
