//! Crate-wide error type and Result alias

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("field `{0}` is not supported by the in-memory evaluator, use find_matches")]
    UnsupportedField(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("corrupt row: {0}")]
    Decode(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("notification delivery failed: {0}")]
    Delivery(String),

    #[error("rate limited after {attempts} acquire attempts")]
    RateLimited { attempts: u32 },

    #[error("invalid job transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("config error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl Error {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Error::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}
