//! The task index: a content-addressed store of [`TaskRec`]s plus a set
//! of reverse indexes for listing, keyed by whatever field a caller wants
//! to filter on. This is the *only* place a `TaskRec` is persisted — the
//! relational store (`crate::db`, `crate::models::{template,pool}`) never
//! holds task records, only template/pool definitions.
//!
//! Implementations must uphold one crash-tolerance invariant: a task that
//! is not yet finished must remain discoverable via [`TaskIndex::list_running`]
//! even if the process crashes mid-write. See `RedisTaskIndex::bury` for
//! how that invariant shapes write ordering.

pub mod redis_store;

use crate::models::TaskRec;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use redis_store::RedisTaskIndex;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("task not found: {0}")]
    NotFound(String),
    #[error("task already exists: {0}")]
    AlreadyExists(String),
    #[error("index backend error: {0}")]
    Backend(String),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListTasksArgs {
    #[serde(default)]
    pub uuid: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub template: String,
    #[serde(default)]
    pub project: String,
    #[serde(default)]
    pub pool: String,
    #[serde(default, rename = "owner")]
    pub created_by: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub page: usize,
    #[serde(default, rename = "pageSize")]
    pub page_size: usize,
    /// Sort field, accepted for parity with the query contract but not
    /// yet applied to ordering — `dao.ListTasksArgs.Sort` is likewise
    /// bound and unused in the source this was ported from.
    #[serde(default)]
    pub sort: String,
    #[serde(default)]
    pub verbose: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ListTasksResult {
    pub total: usize,
    pub list: Vec<TaskRec>,
}

/// The contract the scheduler and HTTP layer depend on; `RedisTaskIndex`
/// is the only implementation shipped here, but callers should depend on
/// this trait so a different backing store can be swapped in without
/// touching scheduling logic.
#[async_trait]
pub trait TaskIndex: Send + Sync {
    async fn create(&self, rec: &TaskRec) -> Result<(), IndexError>;
    async fn update(&self, rec: &TaskRec) -> Result<(), IndexError>;
    /// Marks a task as finished in the index: writes the status-reverse
    /// index and retires the running-marker. Callers must only call this
    /// once a task has reached a terminal status.
    async fn bury(&self, rec: &TaskRec) -> Result<(), IndexError>;
    async fn delete(&self, uuid: &str) -> Result<(), IndexError>;
    async fn load(&self, uuid: &str) -> Result<Option<TaskRec>, IndexError>;
    async fn exists(&self, uuid: &str) -> Result<bool, IndexError>;
    async fn list(&self, args: &ListTasksArgs) -> Result<ListTasksResult, IndexError>;
    /// Tasks whose running-marker is still present — used at startup to
    /// recover in-flight work after a crash/restart.
    async fn list_running(&self) -> Result<Vec<TaskRec>, IndexError>;
}

pub(crate) fn obj_key(uuid: &str) -> String {
    format!("tasks:objects:{}", uuid)
}

pub(crate) fn running_key(uuid: &str) -> String {
    format!("tasks:running:{}", uuid)
}

pub(crate) fn index_key(field: &str, value: &str, uuid: &str) -> String {
    format!("tasks:indexes:{}:{}:{}", field, value, uuid)
}

pub(crate) fn index_prefix(field: &str, value: &str) -> String {
    format!("tasks:indexes:{}:{}:", field, value)
}

pub(crate) fn uuid_from_key(key: &str) -> String {
    key.rsplit(':').next().unwrap_or(key).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_follow_the_documented_layout() {
        assert_eq!(obj_key("abc"), "tasks:objects:abc");
        assert_eq!(running_key("abc"), "tasks:running:abc");
        assert_eq!(index_key("name", "demo", "abc"), "tasks:indexes:name:demo:abc");
    }

    #[test]
    fn uuid_from_key_takes_last_segment() {
        assert_eq!(uuid_from_key("tasks:indexes:name:demo:abc-123"), "abc-123");
    }
}
