//! The backend adapter contract every engine kind implements.
//!
//! `Job` plays the role `axontask_worker::adapters::Adapter` plays in the
//! teacher crate, but its shape follows `internal/task/type.go`'s three
//! interfaces (`Meta`, `Action`, `Metrics`) bundled into one: a job knows
//! its engine and its instance, can be started/stopped, and can be asked
//! for status/logs/metrics at any time.

use crate::error::JobResult;
use crate::instance::InstanceHandle;
use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::pin::Pin;
use taskd_shared::phase::Status;

/// Opaque engine identifier. Deliberately not a closed enum: adapters
/// outside this crate can register a kind the scheduler has never heard
/// of, and the registry only ever compares kinds for equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EngineKind(pub String);

impl EngineKind {
    pub fn new(kind: impl Into<String>) -> Self {
        EngineKind(kind.into())
    }
}

impl std::fmt::Display for EngineKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for EngineKind {
    fn from(s: &str) -> Self {
        EngineKind(s.to_string())
    }
}

/// Named for callers' convenience; the registry treats all four (and any
/// others) identically. Only `mock` and `rpc` ship with a real adapter in
/// this repo — `pod`/`crd`/`kfjob` are documented, stubbed engine kinds.
pub const POD_ENGINE: &str = "pod";
pub const CRD_ENGINE: &str = "crd";
pub const KFJOB_ENGINE: &str = "kfjob";
pub const RPC_ENGINE: &str = "rpc";
pub const MOCK_ENGINE: &str = "mock";

/// Log output for a single task entity (a pod, a worker thread, ...).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityLogs {
    pub completed: bool,
    pub entity: String,
    pub logs: String,
}

/// Free-form custom metrics an adapter wants surfaced alongside the task.
pub type Metric = HashMap<String, serde_json::Value>;

/// A line-oriented log stream returned by `Job::follow_logs`.
pub type LogStream = Pin<Box<dyn Stream<Item = std::io::Result<String>> + Send>>;

/// Contract every task engine's job implementation fulfills. Modeled on
/// `internal/task/type.go`'s `TaskJob` interface: metadata (`engine`,
/// `instance`), actions (`start`, `stop`), and metrics (`fetch_status`,
/// `logs`, `follow_logs`, `custom_metrics`).
#[async_trait]
pub trait Job: Send + Sync {
    fn engine(&self) -> EngineKind;

    /// The shared, lockable instance state backing this job.
    fn instance(&self) -> InstanceHandle;

    async fn start(&self) -> JobResult<()>;

    async fn stop(&self) -> JobResult<()>;

    async fn fetch_status(&self) -> Status;

    async fn logs(&self, entity: &str, tail: i64) -> JobResult<Vec<EntityLogs>>;

    async fn follow_logs(&self, entity: &str, timestamps: bool, tail: i64) -> JobResult<LogStream>;

    /// Default: no custom metrics. Most engine kinds never override this.
    fn custom_metrics(&self) -> Metric {
        Metric::new()
    }
}
