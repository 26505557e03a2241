//! # taskd-shared
//!
//! Types and persistence shared by the scheduler (`taskd-worker`) and the
//! HTTP surface (`taskd-api`):
//!
//! - `quantity`: resource quantity arithmetic
//! - `phase`: task phase/status/timeout types
//! - `models`: relational models (`template`, `pool`, `pool_resource`) and
//!   the persisted task-record shape
//! - `db`: PostgreSQL connection pool + migrations for the relational models
//! - `index`: the task index contract and its Redis-backed implementation
//! - `redis`: the shared Redis client wrapper
//! - `config`: YAML configuration loading
//! - `error`: shared error types

pub mod config;
pub mod db;
pub mod error;
pub mod index;
pub mod models;
pub mod phase;
pub mod quantity;
pub mod redis;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_is_set() {
        assert!(!VERSION.is_empty());
    }
}
