use crate::ids::{CategoryId, DataSourceId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MappingError {
    #[error("failed to read the mapping with {0:?}")]
    Io(#[from] std::io::Error),
    #[error("mapping is missing the {0:?} column")]
    MissingColumn(&'static str),
    #[error("line {line}: {value:?} is not a valid category id")]
    InvalidInteger { line: usize, value: String },
    #[error("line {line}: origin category {origin} is mapped more than once")]
    DuplicateOrigin { line: usize, origin: CategoryId },
}

#[derive(Debug, Error)]
pub enum ExpressionError {
    #[error("failed to parse the expression with {0}")]
    Malformed(serde_json::Error),
    #[error("unexpected expression shape: {0}")]
    Shape(&'static str),
    #[error("failed to serialize the expression with {0}")]
    Serialize(serde_json::Error),
}

#[derive(Debug, PartialEq, Error)]
pub enum RewriteError {
    #[error("at least one origin data source is required")]
    NoOrigin,
    #[error("origin data source {0} is also the target data source")]
    OriginIsTarget(DataSourceId),
    #[error("origin data source {0} has already been defined")]
    DuplicateOrigin(DataSourceId),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database request failed with {0}")]
    Database(#[from] rusqlite::Error),
    #[error("no category table is known for data source {0}")]
    UnknownDataSource(DataSourceId),
    #[error("store is unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error)]
pub enum PushError {
    #[error("request failed with {0}")]
    Transport(#[from] reqwest::Error),
    #[error("targeting service answered {status}: {body}")]
    Status { status: u16, body: String },
    #[error("{0:?} is not a valid header value")]
    InvalidHeader(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read the configuration with {0:?}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse the configuration with {0}")]
    Parse(#[from] toml::de::Error),
    #[error("no audience service is configured for environment {0:?}")]
    UnknownEnvironment(String),
    #[error("warehouse table key {0:?} is not a data source id")]
    InvalidDataSource(String),
}

/// The errors that abort a whole run before any expression is pushed.
#[derive(Debug, Error)]
pub enum RemapError {
    #[error("failed to load the mapping table with {0}")]
    Mapping(#[from] MappingError),
    #[error("failed to fetch the candidate expressions with {0}")]
    Fetch(#[from] StoreError),
    #[error("invalid rewrite configuration: {0}")]
    Rewrite(#[from] RewriteError),
}
