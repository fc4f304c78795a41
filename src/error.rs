use thiserror::Error;

use crate::join::Dimension;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing field `{field}` in row {row}")]
    MissingField { field: String, row: usize },

    #[error("Invalid value `{value}` for field `{field}` in row {row}")]
    InvalidField {
        field: String,
        value: String,
        row: usize,
    },

    #[error("Duplicate key {key} in {table}")]
    DuplicateKey { table: &'static str, key: String },

    #[error("{dimension} lookup failed for product {product_id}: {reason}")]
    Lookup {
        dimension: Dimension,
        product_id: i64,
        reason: String,
    },

    #[error("Fact sink rejected row: {0}")]
    Sink(String),

    #[error("Setup failed: {0}")]
    Setup(String),

    #[error("Hand-off channel closed")]
    ChannelClosed,

    #[error("Task join error: {0}")]
    TaskJoin(String),

    #[error("Generic error: {0}")]
    Generic(String),
}

/// Why a stream record produced no fact row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SkipReason {
    LookupFailure,
    SinkFailure,
}

impl Error {
    pub fn error_code(&self) -> i32 {
        match self {
            Error::Io(_) => -1,
            Error::Csv(_) => -2,
            Error::Json(_) => -3,
            Error::Config(_) => -4,
            Error::MissingField { .. } => -5,
            Error::InvalidField { .. } => -6,
            Error::DuplicateKey { .. } => -7,
            Error::Lookup { .. } => -8,
            Error::Sink(_) => -9,
            Error::Setup(_) => -10,
            Error::ChannelClosed => -11,
            Error::TaskJoin(_) => -12,
            Error::Generic(_) => -99,
        }
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        Error::TaskJoin(err.to_string())
    }
}
