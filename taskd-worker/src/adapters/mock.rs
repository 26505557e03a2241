//! Deterministic mock engine: simulates a task's progress purely from
//! elapsed wall-clock time, with no external dependency. Useful for
//! demos and for exercising the scheduler without a real backend.
//!
//! Poller-driven: [`MockJob::start`] just records when it began; all
//! status transitions are discovered by [`crate::runner::deal_running_job`]
//! ticking [`MockJob::fetch_status`], the same way a passive backend like
//! a Kubernetes pod would be polled.

use crate::error::JobError;
use crate::instance::{InstanceHandle, TaskInstance};
use crate::job::{EntityLogs, Job, LogStream, Metric};
use crate::job::{EngineKind, MOCK_ENGINE};
use crate::runner::Runner;
use async_trait::async_trait;
use futures::StreamExt;
use serde::Deserialize;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use taskd_shared::models::{TaskRec, TaskTemplate};
use taskd_shared::phase::{Phase, Status};

/// Arguments (task `args` JSON):
/// `{"duration_ms": 5000, "should_fail": false, "failure_percent": 50}`
#[derive(Debug, Clone, Deserialize)]
struct MockConfig {
    #[serde(default = "default_duration_ms")]
    duration_ms: u64,
    #[serde(default)]
    should_fail: bool,
    #[serde(default = "default_failure_percent")]
    failure_percent: u64,
}

fn default_duration_ms() -> u64 {
    5000
}

fn default_failure_percent() -> u64 {
    50
}

impl Default for MockConfig {
    fn default() -> Self {
        Self { duration_ms: default_duration_ms(), should_fail: false, failure_percent: default_failure_percent() }
    }
}

pub struct MockJob {
    instance: InstanceHandle,
    config: MockConfig,
    started_at: Mutex<Option<Instant>>,
    logs: Mutex<Vec<String>>,
}

impl MockJob {
    pub fn new(template: Arc<TaskTemplate>, rec: TaskRec) -> Result<Self, JobError> {
        let config: MockConfig = serde_json::from_value(rec.obj.args.clone()).unwrap_or_default();
        let instance = TaskInstance::init((*template).clone(), rec)
            .map_err(|e| JobError::InvalidArguments(e.to_string()))?;
        Ok(Self {
            instance: Arc::new(tokio::sync::RwLock::new(instance)),
            config,
            started_at: Mutex::new(None),
            logs: Mutex::new(Vec::new()),
        })
    }

    /// Registration entry point: the factory the engine registry calls
    /// for every submitted `mock` task. `runner` is unused — a
    /// poller-driven job never calls back into it directly.
    pub fn new_job(template: Arc<TaskTemplate>, rec: TaskRec, _runner: Arc<dyn Runner>) -> Result<Arc<dyn Job>, JobError> {
        Ok(Arc::new(MockJob::new(template, rec)?))
    }
}

#[async_trait]
impl Job for MockJob {
    fn engine(&self) -> EngineKind {
        EngineKind::new(MOCK_ENGINE)
    }

    fn instance(&self) -> InstanceHandle {
        self.instance.clone()
    }

    async fn start(&self) -> Result<(), JobError> {
        *self.started_at.lock().unwrap() = Some(Instant::now());
        self.logs.lock().unwrap().push("Mock task starting...".to_string());
        Ok(())
    }

    async fn stop(&self) -> Result<(), JobError> {
        Ok(())
    }

    async fn fetch_status(&self) -> Status {
        let Some(started) = *self.started_at.lock().unwrap() else {
            return Status::Init;
        };
        let elapsed_ms = started.elapsed().as_millis() as u64;
        let percent = ((elapsed_ms.saturating_mul(100)) / self.config.duration_ms.max(1)).min(100);

        if self.config.should_fail && percent >= self.config.failure_percent {
            self.logs.lock().unwrap().push(format!("Simulated failure at {percent}%"));
            return Status::Failed;
        }
        if percent >= 100 {
            self.logs.lock().unwrap().push("Task complete!".to_string());
            return Status::Succeeded;
        }
        if percent >= 50 {
            self.logs.lock().unwrap().push("Processing data...".to_string());
        }
        Status::Running
    }

    async fn logs(&self, _entity: &str, _tail: i64) -> Result<Vec<EntityLogs>, JobError> {
        let logs = self.logs.lock().unwrap().join("\n");
        let completed = self.instance.read().await.phase() == Phase::Finished;
        Ok(vec![EntityLogs { completed, entity: String::new(), logs }])
    }

    async fn follow_logs(&self, _entity: &str, _timestamps: bool, _tail: i64) -> Result<LogStream, JobError> {
        let lines = self.logs.lock().unwrap().clone();
        Ok(futures::stream::iter(lines.into_iter().map(Ok::<String, std::io::Error>)).boxed())
    }

    fn custom_metrics(&self) -> Metric {
        Metric::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use taskd_shared::models::task_rec::TaskObjRec;

    fn sample_rec(args: serde_json::Value) -> TaskRec {
        TaskRec::new(TaskObjRec {
            uuid: "u-1".into(),
            parent: None,
            namespace: String::new(),
            name: "demo".into(),
            project: String::new(),
            template: "tpl".into(),
            pool: "default".into(),
            extra: serde_json::Value::Null,
            args,
            timeout: Default::default(),
            quotas: vec![],
            tags: Default::default(),
            callback: String::new(),
            created_by: "alice".into(),
        })
    }

    fn sample_template() -> Arc<TaskTemplate> {
        Arc::new(TaskTemplate {
            name: "tpl".into(),
            title: "Demo".into(),
            engine: MOCK_ENGINE.into(),
            schema: String::new(),
            extra: "{}".into(),
            create_time: chrono::Utc::now(),
        })
    }

    #[tokio::test]
    async fn fetch_status_is_init_before_start() {
        let job = MockJob::new(sample_template(), sample_rec(json!({}))).unwrap();
        assert_eq!(job.fetch_status().await, Status::Init);
    }

    #[tokio::test]
    async fn fetch_status_succeeds_once_duration_elapses() {
        let job = MockJob::new(sample_template(), sample_rec(json!({ "duration_ms": 1 }))).unwrap();
        job.start().await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(job.fetch_status().await, Status::Succeeded);
    }

    #[tokio::test]
    async fn fetch_status_fails_when_configured_to() {
        let job = MockJob::new(sample_template(), sample_rec(json!({ "duration_ms": 1, "should_fail": true, "failure_percent": 0 }))).unwrap();
        job.start().await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(job.fetch_status().await, Status::Failed);
    }
}
