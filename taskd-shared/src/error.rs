//! Error types shared across the relational store, the task index, and
//! configuration loading.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SharedError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("index error: {0}")]
    Index(#[from] crate::index::IndexError),
    #[error("quantity error: {0}")]
    Quantity(#[from] crate::quantity::QuantityError),
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),
}
