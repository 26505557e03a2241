//! Pool runners: the two strategies a pool drives its running jobs with.
//!
//! Grounded on `internal/flow/poller.go` and `internal/flow/reactor.go`.
//! A `Poller` assumes the backend is passive and has to be asked for
//! status on a tick; a `Reactor` assumes the backend (or the job's own
//! `start()` implementation) pushes state transitions as they happen.
//! Both eventually do the same thing on completion: hand the job to the
//! pool's finished channel.

use crate::job::Job;
use crate::pool::TaskPool;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use taskd_shared::index::TaskIndex;
use taskd_shared::phase::{Phase, Status, Timeout};
use tokio::sync::mpsc;
use tokio::time;

/// What a pool's runner does when a job's lifecycle state changes.
/// `start`/`stop` never call these directly for poller-driven engines
/// (the poller observes state changes itself); reactor-driven engines
/// (e.g. the in-tree `rpc` adapter) call them from inside their own
/// `start()` implementation.
#[async_trait]
pub trait Runner: Send + Sync {
    async fn on_job_start(&self, job: Arc<dyn Job>);
    async fn on_job_running(&self, job: Arc<dyn Job>);
    async fn on_job_end(&self, job: Arc<dyn Job>);
    async fn run(self: Arc<Self>);
}

/// Marks a job finished with `status` (and, if given, an error message)
/// and hands it to the pool's finished channel. Mirrors `stopJob`.
pub async fn stop_job(job: &Arc<dyn Job>, pool: &TaskPool, status: Status, error: Option<String>) {
    debug_assert!(status.is_finished(), "stop_job called with a non-terminal status");
    {
        let mut instance = job.instance().write().await;
        match error {
            Some(msg) => instance.set_error(status, msg),
            None => instance.set_status(status),
        }
    }
    pool.send_finished(job.clone()).await;
}

/// Advances one running job's state machine by asking its backend for a
/// status and comparing the resulting phase against what's on file.
/// Mirrors `dealRunningJob` exactly, including the "phase didn't move
/// forward" timeout-checking branch.
pub async fn deal_running_job(job: &Arc<dyn Job>, pool: &TaskPool, index: &dyn TaskIndex, default_timeout: &Timeout) {
    let status = job.fetch_status().await;
    let phase = status.phase();

    let current_phase = job.instance().read().await.phase();
    if phase <= current_phase {
        let (beg, max_duration, whole_start, whole_timeout) = {
            let instance = job.instance().read().await;
            let timeout = instance.timeout(default_timeout);
            let (beg, max_duration) = instance.phase_time(&timeout);
            let whole_start = instance.rec.runtime.start_time.unwrap_or(instance.rec.runtime.create_time);
            (beg, max_duration, whole_start, timeout.whole)
        };
        if elapsed_since(beg) >= max_duration {
            stop_job(job, pool, Status::Failed, Some(format!("{:?} phase execution exceeded limit: {:?}", current_phase, max_duration))).await;
            return;
        }
        if elapsed_since(whole_start) >= whole_timeout {
            stop_job(job, pool, Status::Failed, Some(format!("task execution exceeded total time limit: {:?}", whole_timeout))).await;
        }
        return;
    }

    {
        let mut instance = job.instance().write().await;
        instance.set_status(status);
        let rec = instance.rec.clone();
        drop(instance);
        if let Err(err) = index.update(&rec).await {
            tracing::warn!(task = %rec.title(), %err, "failed to persist status transition");
        }
    }

    if phase >= Phase::Finished {
        tracing::info!(task = %job.instance().read().await.title(), ?status, "task finished");
        stop_job(job, pool, status, None).await;
        return;
    }

    let (whole_start, whole_timeout) = {
        let instance = job.instance().read().await;
        let timeout = instance.timeout(default_timeout);
        (instance.rec.runtime.start_time.unwrap_or(instance.rec.runtime.create_time), timeout.whole)
    };
    if elapsed_since(whole_start) >= whole_timeout {
        stop_job(job, pool, Status::Failed, Some(format!("task execution exceeds total time limit: {:?}", whole_timeout))).await;
    }
}

fn elapsed_since(t: chrono::DateTime<chrono::Utc>) -> Duration {
    (chrono::Utc::now() - t).to_std().unwrap_or(Duration::ZERO)
}

/// Polling-mode runner: assumes the backend never calls back, and checks
/// on every running job once a second via [`deal_running_job`].
pub struct Poller {
    pool: Arc<TaskPool>,
    index: Arc<dyn TaskIndex>,
    default_timeout: Timeout,
}

impl Poller {
    pub fn new(pool: Arc<TaskPool>, index: Arc<dyn TaskIndex>, default_timeout: Timeout) -> Self {
        Self { pool, index, default_timeout }
    }
}

#[async_trait]
impl Runner for Poller {
    async fn on_job_start(&self, job: Arc<dyn Job>) {
        let rec = job.instance().read().await.rec.clone();
        if let Err(err) = self.index.update(&rec).await {
            tracing::warn!(%err, "poller: failed to persist job start");
        }
    }

    async fn on_job_running(&self, job: Arc<dyn Job>) {
        self.on_job_start(job).await;
    }

    async fn on_job_end(&self, job: Arc<dyn Job>) {
        self.on_job_start(job).await;
    }

    async fn run(self: Arc<Self>) {
        let mut ticker = time::interval(Duration::from_secs(1));
        loop {
            ticker.tick().await;
            for job in self.pool.running_jobs().await {
                let finished = job.instance().read().await.status().is_finished();
                if finished {
                    self.pool.send_finished(job).await;
                } else {
                    deal_running_job(&job, &self.pool, self.index.as_ref(), &self.default_timeout).await;
                }
            }
        }
    }
}

enum JobEventKind {
    Start,
    Running,
    End,
}

struct JobEvent {
    kind: JobEventKind,
    job: Arc<dyn Job>,
}

/// Event-driven runner: a job's own `start()` (or its backend) pushes
/// lifecycle events through an internal channel instead of being polled.
/// Channel capacity is `3 * max_running`, exactly as
/// `internal/flow/reactor.go`'s `make(chan JobEvent, taskPool.Running*3)`.
pub struct Reactor {
    pool: Arc<TaskPool>,
    events_tx: mpsc::Sender<JobEvent>,
    events_rx: tokio::sync::Mutex<Option<mpsc::Receiver<JobEvent>>>,
}

impl Reactor {
    pub fn new(pool: Arc<TaskPool>) -> Self {
        let capacity = (pool.max_running * 3).max(1);
        let (events_tx, events_rx) = mpsc::channel(capacity);
        Self { pool, events_tx, events_rx: tokio::sync::Mutex::new(Some(events_rx)) }
    }
}

#[async_trait]
impl Runner for Reactor {
    async fn on_job_start(&self, job: Arc<dyn Job>) {
        let _ = self.events_tx.send(JobEvent { kind: JobEventKind::Start, job }).await;
    }

    async fn on_job_running(&self, job: Arc<dyn Job>) {
        let _ = self.events_tx.send(JobEvent { kind: JobEventKind::Running, job }).await;
    }

    async fn on_job_end(&self, job: Arc<dyn Job>) {
        let _ = self.events_tx.send(JobEvent { kind: JobEventKind::End, job }).await;
    }

    async fn run(self: Arc<Self>) {
        let mut rx = match self.events_rx.lock().await.take() {
            Some(rx) => rx,
            None => {
                tracing::error!("reactor run() called more than once");
                return;
            }
        };
        while let Some(event) = rx.recv().await {
            match event.kind {
                JobEventKind::Start => event.job.instance().write().await.set_status(Status::Init),
                JobEventKind::Running => event.job.instance().write().await.set_status(Status::Running),
                JobEventKind::End => self.pool.send_finished(event.job).await,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::JobResult;
    use crate::instance::{InstanceHandle, TaskInstance};
    use crate::job::{EngineKind, EntityLogs, LogStream, Metric};
    use async_trait::async_trait;
    use futures::StreamExt;
    use std::sync::Mutex;
    use taskd_shared::models::{PoolRec, TaskObjRec, TaskRec, TaskTemplate};

    struct FakeJob {
        instance: InstanceHandle,
        fetched: Mutex<Status>,
    }

    impl FakeJob {
        fn new(status: Status) -> Arc<Self> {
            let rec = TaskRec::new(TaskObjRec {
                uuid: "u-1".into(),
                parent: None,
                namespace: String::new(),
                name: "demo".into(),
                project: String::new(),
                template: "tpl".into(),
                pool: "default".into(),
                extra: serde_json::Value::Null,
                args: serde_json::Value::Null,
                timeout: Default::default(),
                quotas: vec![],
                tags: Default::default(),
                callback: String::new(),
                created_by: "alice".into(),
            });
            let template = TaskTemplate {
                name: "tpl".into(),
                title: "Demo".into(),
                engine: "mock".into(),
                schema: String::new(),
                extra: "{}".into(),
                create_time: chrono::Utc::now(),
            };
            let instance = TaskInstance::init(template, rec).unwrap();
            Arc::new(Self { instance: Arc::new(tokio::sync::RwLock::new(instance)), fetched: Mutex::new(status) })
        }
    }

    #[async_trait]
    impl Job for FakeJob {
        fn engine(&self) -> EngineKind {
            EngineKind::new("mock")
        }

        fn instance(&self) -> InstanceHandle {
            self.instance.clone()
        }

        async fn start(&self) -> JobResult<()> {
            Ok(())
        }

        async fn stop(&self) -> JobResult<()> {
            Ok(())
        }

        async fn fetch_status(&self) -> Status {
            *self.fetched.lock().unwrap()
        }

        async fn logs(&self, _entity: &str, _tail: i64) -> JobResult<Vec<EntityLogs>> {
            Ok(Vec::new())
        }

        async fn follow_logs(&self, _entity: &str, _timestamps: bool, _tail: i64) -> JobResult<LogStream> {
            Ok(futures::stream::empty().boxed())
        }

        fn custom_metrics(&self) -> Metric {
            Metric::new()
        }
    }

    struct FakeIndex;

    #[async_trait]
    impl TaskIndex for FakeIndex {
        async fn create(&self, _rec: &TaskRec) -> Result<(), taskd_shared::index::IndexError> {
            Ok(())
        }
        async fn update(&self, _rec: &TaskRec) -> Result<(), taskd_shared::index::IndexError> {
            Ok(())
        }
        async fn bury(&self, _rec: &TaskRec) -> Result<(), taskd_shared::index::IndexError> {
            Ok(())
        }
        async fn delete(&self, _uuid: &str) -> Result<(), taskd_shared::index::IndexError> {
            Ok(())
        }
        async fn load(&self, _uuid: &str) -> Result<Option<TaskRec>, taskd_shared::index::IndexError> {
            Ok(None)
        }
        async fn exists(&self, _uuid: &str) -> Result<bool, taskd_shared::index::IndexError> {
            Ok(false)
        }
        async fn list(&self, _args: &taskd_shared::index::ListTasksArgs) -> Result<taskd_shared::index::ListTasksResult, taskd_shared::index::IndexError> {
            Ok(taskd_shared::index::ListTasksResult { total: 0, list: vec![] })
        }
        async fn list_running(&self) -> Result<Vec<TaskRec>, taskd_shared::index::IndexError> {
            Ok(vec![])
        }
    }

    fn sample_pool() -> Arc<TaskPool> {
        let rec = PoolRec {
            pool_id: "default".into(),
            engine: "mock".into(),
            description: String::new(),
            config: String::new(),
            max_running: 2,
            max_waiting: 4,
        };
        TaskPool::new(&rec).0
    }

    #[tokio::test]
    async fn stop_job_marks_instance_finished_and_hands_off_to_pool() {
        let job: Arc<dyn Job> = FakeJob::new(Status::Running);
        let pool = sample_pool();
        stop_job(&job, &pool, Status::Cancelled, Some("user cancelled".to_string())).await;
        let instance = job.instance().read().await;
        assert_eq!(instance.status(), Status::Cancelled);
        assert_eq!(instance.rec.runtime.error, "user cancelled");
    }

    #[tokio::test]
    async fn deal_running_job_kills_on_no_progress_past_phase_timeout() {
        let job: Arc<dyn Job> = FakeJob::new(Status::Queue);
        let pool = sample_pool();
        let index = FakeIndex;
        // The instance starts in Queue with create_time = now and Queue's
        // default timeout is a full day, so shrink the timeout to nothing
        // up front to force an immediate overrun.
        let mut timeout = Timeout::default();
        timeout.queue = Duration::from_secs(0);
        // fetch_status() reports Queue (no forward progress from Queue),
        // so deal_running_job takes the timeout-check branch.
        deal_running_job(&job, &pool, &index, &timeout).await;
        let instance = job.instance().read().await;
        assert_eq!(instance.status(), Status::Failed);
    }

    #[tokio::test]
    async fn deal_running_job_advances_status_on_progress() {
        let job: Arc<dyn Job> = FakeJob::new(Status::Running);
        let pool = sample_pool();
        let index = FakeIndex;
        let timeout = Timeout::default();
        deal_running_job(&job, &pool, &index, &timeout).await;
        let instance = job.instance().read().await;
        assert_eq!(instance.status(), Status::Running);
        assert_eq!(instance.phase(), Phase::Running);
    }
}
