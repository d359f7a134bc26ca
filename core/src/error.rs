use thiserror::Error;

/// Failure to load or validate the schema registry. Always fatal: no session
/// may start against a registry that did not load.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("failed to read schema file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid schema document: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("schema declares no tables")]
    Empty,
    #[error("duplicate table '{0}'")]
    DuplicateTable(String),
    #[error("table '{0}' declares no columns")]
    NoColumns(String),
    #[error("duplicate column '{column}' in table '{table}'")]
    DuplicateColumn { table: String, column: String },
    #[error("invalid identifier '{0}'")]
    InvalidIdentifier(String),
    #[error("relationship endpoint '{0}' is not a registered column")]
    DanglingRelationship(String),
    #[error("database is missing {0} declared in the schema registry")]
    Drift(String),
}

/// Runtime failure raised by the database while running an accepted query.
/// The message is engine text and must never reach the end user.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
}

/// Failure talking to the text-generation service.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("missing API key: environment variable {0} is not set")]
    MissingApiKey(String),
    #[error("text-generation request failed: {0}")]
    Transport(String),
    #[error("text-generation service returned no content")]
    EmptyResponse,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid value for {key}: {message}")]
    Invalid { key: String, message: String },
}
