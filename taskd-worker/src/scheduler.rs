//! The scheduler ("Keeper"): owns every pool and every in-flight job,
//! and is the only thing the HTTP surface talks to.
//!
//! Grounded on `internal/flow/keeper.go` and `internal/flow/schedule.go`.
//! Lock order is `pools`/`jobs` before any individual pool lock, never the
//! reverse: every method here clones the `Arc<TaskPool>` it needs out of
//! the registry and drops the registry lock before doing anything that
//! `.await`s on the pool itself.

use crate::error::SchedulerError;
use crate::instance;
use crate::job::{EntityLogs, Job, LogStream};
use crate::pool::{PoolChannels, TaskPool, TaskPoolDetail, TaskPoolSummary};
use crate::registry::EngineRegistry;
use crate::runner::{self, Runner};
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use taskd_shared::index::{ListTasksArgs, ListTasksResult, TaskIndex};
use taskd_shared::models::{CreatePool, PoolRec, PoolResourceRec, TaskObjRec, TaskRec, TaskTemplate, UpdatePool};
use taskd_shared::phase::{Status, Timeout};
use tokio::sync::RwLock;
use tokio::time;

pub struct Scheduler {
    registry: Arc<EngineRegistry>,
    index: Arc<dyn TaskIndex>,
    db: PgPool,
    http: reqwest::Client,
    default_timeout: Timeout,
    pools: RwLock<HashMap<String, Arc<TaskPool>>>,
    /// The runner driving each pool, keyed by pool id — kept here rather
    /// than on `TaskPool` itself so a pool never points back at the thing
    /// that points at it.
    runners: RwLock<HashMap<String, Arc<dyn Runner>>>,
    jobs: RwLock<HashMap<String, Arc<dyn Job>>>,
}

impl Scheduler {
    pub fn new(registry: Arc<EngineRegistry>, index: Arc<dyn TaskIndex>, db: PgPool, default_timeout: Timeout) -> Arc<Self> {
        Arc::new(Self {
            registry,
            index,
            db,
            http: reqwest::Client::new(),
            default_timeout,
            pools: RwLock::new(HashMap::new()),
            runners: RwLock::new(HashMap::new()),
            jobs: RwLock::new(HashMap::new()),
        })
    }

    /// Startup sequence: initialize every persisted pool (spawning its
    /// workers), then reload any task still marked running in the index
    /// and re-enqueue it. Mirrors `flow.Init` + `ReloadHistoryTasks`.
    pub async fn bootstrap(self: &Arc<Self>) -> Result<(), SchedulerError> {
        let pool_recs = PoolRec::list(&self.db).await?;
        for rec in &pool_recs {
            self.init_pool(rec).await?;
        }
        let unfinished = self.index.list_running().await?;
        for rec in unfinished {
            let title = rec.title();
            match self.enqueue(rec, true).await {
                Ok(_) => tracing::info!(task = %title, "reloaded unfinished task"),
                Err(err) => tracing::error!(task = %title, %err, "failed to reload unfinished task"),
            }
        }
        Ok(())
    }

    /// Builds a pool from a persisted definition, registers it, and
    /// spawns its five long-lived workers: waiting-chan, running-chan,
    /// waiting-timeout sweep, the runner itself, and finished-chan.
    pub async fn init_pool(self: &Arc<Self>, rec: &PoolRec) -> Result<(), SchedulerError> {
        let (pool, channels, runner) = self.registry.new_pool(rec).await?;
        pool.load_resources(&self.db).await?;
        self.pools.write().await.insert(rec.pool_id.clone(), pool.clone());
        self.runners.write().await.insert(rec.pool_id.clone(), runner.clone());

        let PoolChannels { waiting_rx, running_rx, finished_rx } = channels;
        tokio::spawn(handle_waiting_chan(pool.clone(), waiting_rx));
        tokio::spawn(handle_running_chan(self.clone(), pool.clone(), running_rx));
        tokio::spawn(handle_waiting_jobs(pool.clone(), self.default_timeout));
        tokio::spawn(runner.run());
        tokio::spawn(handle_finished_chan(self.clone(), pool, finished_rx));
        Ok(())
    }

    pub async fn create_pool(self: &Arc<Self>, req: CreatePool) -> Result<TaskPoolSummary, SchedulerError> {
        let resources = req.resources.clone();
        let rec = PoolRec::create(&self.db, req).await?;
        for r in &resources {
            PoolResourceRec::upsert(&self.db, &rec.pool_id, &r.res_name, &r.res_num).await?;
        }
        self.init_pool(&rec).await?;
        let pool = self.pools.read().await.get(&rec.pool_id).cloned().expect("just inserted");
        Ok(pool.summary().await)
    }

    /// Reloads a pool's resource capacities after an `UpdatePool` call,
    /// recomputing `allocated` from the quotas its currently-running jobs
    /// hold.
    pub async fn reload_pool(&self, pool_id: &str, req: UpdatePool) -> Result<(), SchedulerError> {
        let resources = req.resources.clone();
        PoolRec::update(&self.db, pool_id, req).await?.ok_or_else(|| SchedulerError::PoolNotFound(pool_id.to_string()))?;
        for r in &resources {
            PoolResourceRec::upsert(&self.db, pool_id, &r.res_name, &r.res_num).await?;
        }
        let pool = self.pools.read().await.get(pool_id).cloned().ok_or_else(|| SchedulerError::PoolNotFound(pool_id.to_string()))?;
        let mut running_quotas = Vec::new();
        for job in pool.running_jobs().await {
            let instance = job.instance().read().await;
            running_quotas.push((instance.rec.obj.uuid.clone(), instance.held_quotas().to_vec()));
        }
        pool.reload_resources(&self.db, &running_quotas).await?;
        Ok(())
    }

    /// Removes an idle pool (no running or waiting jobs). Mirrors
    /// `RemovePool`'s busy-check.
    pub async fn remove_pool(&self, pool_id: &str) -> Result<(), SchedulerError> {
        let mut pools = self.pools.write().await;
        let Some(pool) = pools.get(pool_id) else { return Ok(()) };
        let busy = pool.running_count().await + pool.waiting_count().await;
        if busy > 0 {
            return Err(SchedulerError::PoolBusy(pool_id.to_string(), busy));
        }
        pools.remove(pool_id);
        PoolRec::delete(&self.db, pool_id).await?;
        Ok(())
    }

    pub async fn list_pools(&self) -> Vec<TaskPoolSummary> {
        let pools = self.pools.read().await;
        let mut out = Vec::with_capacity(pools.len());
        for pool in pools.values() {
            out.push(pool.summary().await);
        }
        out.sort_by(|a, b| a.pool_id.cmp(&b.pool_id));
        out
    }

    pub async fn pool_detail(&self, pool_id: &str) -> Option<TaskPoolDetail> {
        let pool = self.pools.read().await.get(pool_id).cloned()?;
        Some(pool.detail().await)
    }

    pub async fn pool_summary(&self, pool_id: &str) -> Option<TaskPoolSummary> {
        let pool = self.pools.read().await.get(pool_id).cloned()?;
        Some(pool.summary().await)
    }

    /// Submits a brand-new task: loads its template, assigns a UUID if
    /// the caller omitted one, checks for collisions, selects a pool,
    /// persists it to the index, and enqueues it. Mirrors the combination
    /// of a controller handler plus `PoolNewJob`.
    pub async fn submit(self: &Arc<Self>, mut obj: TaskObjRec) -> Result<TaskRec, SchedulerError> {
        if obj.template.is_empty() {
            return Err(SchedulerError::EmptyTemplate);
        }
        if obj.uuid.is_empty() {
            obj.uuid = uuid::Uuid::new_v4().to_string();
        }
        if self.index.exists(&obj.uuid).await? {
            return Err(SchedulerError::TaskAlreadyExists(obj.uuid.clone()));
        }
        let rec = TaskRec::new(obj);
        self.index.create(&rec).await?;
        self.enqueue(rec.clone(), false).await?;
        Ok(rec)
    }

    /// Shared tail of submission and startup-reload: look up the
    /// template, select a pool, build the job (which compiles the
    /// template into the job's own [`TaskInstance`] via
    /// [`TaskInstance::init`]), register it, and push it onto the pool's
    /// waiting channel.
    async fn enqueue(self: &Arc<Self>, rec: TaskRec, _resuming: bool) -> Result<(), SchedulerError> {
        let template = TaskTemplate::find_by_name(&self.db, &rec.obj.template)
            .await?
            .ok_or_else(|| SchedulerError::TemplateNotFound(rec.obj.template.clone()))?;

        let pool = self.select_pool_for(&rec, &template).await?;
        let runner = self
            .runners
            .read()
            .await
            .get(&pool.pool_id)
            .cloned()
            .unwrap_or_else(runner_placeholder);

        let job = self.registry.new_job(Arc::new(template), rec.clone(), runner).await?;
        job.instance().write().await.attach_pool(pool.pool_id.clone());

        self.jobs.write().await.insert(rec.obj.uuid.clone(), job.clone());
        if !pool.try_send_waiting(job.clone()) {
            self.jobs.write().await.remove(&rec.obj.uuid);
            return Err(SchedulerError::PoolSaturated);
        }
        Ok(())
    }

    async fn select_pool_for(&self, rec: &TaskRec, template: &TaskTemplate) -> Result<Arc<TaskPool>, SchedulerError> {
        let pools = self.pools.read().await;
        if !rec.obj.pool.is_empty() {
            return pools.get(&rec.obj.pool).cloned().ok_or_else(|| SchedulerError::PoolNotFound(rec.obj.pool.clone()));
        }
        let mut best: Option<Arc<TaskPool>> = None;
        let mut best_capacity = 0usize;
        for pool in pools.values() {
            if pool.engine != template.engine {
                continue;
            }
            let (waiting_avail, _) = pool.capacity().await;
            if waiting_avail > best_capacity || best.is_none() {
                best_capacity = waiting_avail;
                best = Some(pool.clone());
            }
        }
        best.ok_or_else(|| SchedulerError::NoPoolAvailable(template.engine.clone()))
    }

    /// In-memory lookup only — a finished, reaped task has no live `Job`.
    pub async fn get_job(&self, uuid: &str) -> Option<Arc<dyn Job>> {
        self.jobs.read().await.get(uuid).cloned()
    }

    /// Looks a task up regardless of whether it's still in-flight: the
    /// in-memory instance if present, otherwise the persisted record.
    pub async fn find_task(&self, uuid: &str) -> Result<Option<TaskRec>, SchedulerError> {
        if let Some(job) = self.get_job(uuid).await {
            return Ok(Some(job.instance().read().await.rec.clone()));
        }
        Ok(self.index.load(uuid).await?)
    }

    pub async fn list_tasks(&self, args: &ListTasksArgs) -> Result<ListTasksResult, SchedulerError> {
        Ok(self.index.list(args).await?)
    }

    /// Current tags for a task, live or finished.
    pub async fn get_tags(&self, uuid: &str) -> Result<HashMap<String, String>, SchedulerError> {
        if let Some(job) = self.get_job(uuid).await {
            return Ok(job.instance().read().await.tags().clone());
        }
        let rec = self.index.load(uuid).await?.ok_or_else(|| SchedulerError::TaskNotFound(uuid.to_string()))?;
        Ok(rec.obj.tags)
    }

    /// Merges `extra` over a task's existing tags, live or finished, and
    /// persists the result. Returns the tag set after the merge.
    pub async fn merge_tags(&self, uuid: &str, extra: HashMap<String, String>) -> Result<HashMap<String, String>, SchedulerError> {
        if let Some(job) = self.get_job(uuid).await {
            let mut instance = job.instance().write().await;
            instance.merge_tags(extra);
            let rec = instance.rec.clone();
            drop(instance);
            self.index.update(&rec).await?;
            return Ok(rec.obj.tags);
        }
        let mut rec = self.index.load(uuid).await?.ok_or_else(|| SchedulerError::TaskNotFound(uuid.to_string()))?;
        rec.obj.tags.extend(extra);
        self.index.update(&rec).await?;
        Ok(rec.obj.tags)
    }

    /// Non-streaming log fetch: the live backend's own buffer for an
    /// in-flight task, or the final logs captured at `deal_finished_job`
    /// time for one that has already been reaped. Returns the task's
    /// status alongside so callers building the `{uuid,status,entities}`
    /// envelope don't need a second lookup.
    pub async fn task_logs(&self, uuid: &str, entity: &str, tail: i64) -> Result<(Status, Vec<EntityLogs>), SchedulerError> {
        if let Some(job) = self.get_job(uuid).await {
            let status = job.instance().read().await.status();
            let logs = job.logs(entity, tail).await?;
            return Ok((status, logs));
        }
        let rec = self.index.load(uuid).await?.ok_or_else(|| SchedulerError::TaskNotFound(uuid.to_string()))?;
        let logs: Vec<EntityLogs> = serde_json::from_str(&rec.runtime.end_log).unwrap_or_default();
        Ok((rec.runtime.status, logs))
    }

    /// Streaming log follow. Only meaningful for a task that's still
    /// in-flight — a finished task has no live backend to tail.
    pub async fn follow_task_logs(&self, uuid: &str, entity: &str, timestamps: bool, tail: i64) -> Result<LogStream, SchedulerError> {
        let job = self.get_job(uuid).await.ok_or_else(|| SchedulerError::TaskNotFound(uuid.to_string()))?;
        Ok(job.follow_logs(entity, timestamps, tail).await?)
    }

    /// Cancels a task. If it's still in flight, routes through
    /// `stop_job` with `Cancelled`; if it's already gone (finished and
    /// reaped, or never existed), mirrors `CancelJob`'s lenient handling
    /// of the "already finished" case versus a genuine not-found.
    pub async fn cancel(&self, uuid: &str) -> Result<(), SchedulerError> {
        let Some(job) = self.get_job(uuid).await else {
            if self.index.exists(uuid).await? {
                return Ok(());
            }
            return Err(SchedulerError::TaskNotFound(uuid.to_string()));
        };
        let pool_id = job.instance().read().await.pool_id().map(|s| s.to_string());
        let Some(pool_id) = pool_id else { return Ok(()) };
        let Some(pool) = self.pools.read().await.get(&pool_id).cloned() else { return Ok(()) };
        runner::stop_job(&job, &pool, Status::Cancelled, Some("user cancelled".to_string())).await;
        Ok(())
    }

    /// Starts a job: transitions it to `Init`, invokes its `start()`, and
    /// on success admits it into the pool's running map. Mirrors
    /// `startJob`.
    async fn start_job(self: &Arc<Self>, job: Arc<dyn Job>, pool: &Arc<TaskPool>) {
        let uuid = job.instance().read().await.rec.obj.uuid.clone();
        {
            let mut instance = job.instance().write().await;
            instance.prerun();
            if let Err(err) = instance.alloc_quotas(pool).await {
                let title = instance.title();
                drop(instance);
                tracing::error!(task = %title, %err, "quota allocation failed");
                runner::stop_job(&job, pool, Status::Failed, Some(err.to_string())).await;
                return;
            }
        }
        if let Err(err) = job.start().await {
            tracing::error!(task = %uuid, %err, "task start failed");
            runner::stop_job(&job, pool, Status::Failed, Some(err.to_string())).await;
            return;
        }
        pool.add_running(uuid.clone(), job.clone()).await;
        tracing::info!(task = %uuid, "task start succeeded");
    }

    async fn resume_waiting_job(self: &Arc<Self>, pool: Arc<TaskPool>) {
        if let Some(job) = pool.pop_waiting().await {
            self.start_job(job, &pool).await;
        }
    }

    /// Finalizes a completed job: stop the backend, free quotas, remove
    /// it from the pool, free up an admission slot, record final logs,
    /// bury it in the index, and fire its callback. Mirrors
    /// `dealFinishedJob`.
    async fn deal_finished_job(&self, job: Arc<dyn Job>, pool: Arc<TaskPool>) {
        let uuid = job.instance().read().await.rec.obj.uuid.clone();
        if let Err(err) = job.stop().await {
            tracing::error!(task = %uuid, %err, "task stop failed");
        }
        job.instance().write().await.free_quotas(&pool).await;
        pool.remove_job(&uuid).await;
        pool.notify_running(1);

        match job.logs("", 200).await {
            Ok(logs) => {
                let serialized = serde_json::to_string(&logs).unwrap_or_default();
                job.instance().write().await.set_end_log(serialized);
            }
            Err(err) => tracing::error!(task = %uuid, %err, "failed to fetch final logs"),
        }

        let rec = job.instance().read().await.rec.clone();
        if let Err(err) = self.index.bury(&rec).await {
            tracing::error!(task = %uuid, %err, "failed to bury task");
        }
        if let Err(err) = instance::send_callback(&rec, &self.http).await {
            tracing::warn!(task = %uuid, %err, "callback delivery failed");
        }

        self.jobs.write().await.remove(&uuid);
    }
}

/// Placeholder runner handed to `registry.new_job` before the real,
/// pool-scoped runner is known. Poller-driven jobs never call back into
/// it; reactor-driven jobs are re-pointed at the pool's actual runner
/// before they're admitted (see `Scheduler::enqueue`).
fn runner_placeholder() -> Arc<dyn Runner> {
    struct NullRunner;
    #[async_trait::async_trait]
    impl Runner for NullRunner {
        async fn on_job_start(&self, _job: Arc<dyn Job>) {}
        async fn on_job_running(&self, _job: Arc<dyn Job>) {}
        async fn on_job_end(&self, _job: Arc<dyn Job>) {}
        async fn run(self: Arc<Self>) {}
    }
    Arc::new(NullRunner)
}

async fn handle_waiting_chan(pool: Arc<TaskPool>, mut rx: tokio::sync::mpsc::Receiver<Arc<dyn Job>>) {
    while let Some(job) = rx.recv().await {
        pool.push_waiting(job).await;
        let (_, running_avail) = pool.capacity().await;
        if running_avail > 0 {
            pool.notify_running(1);
        }
    }
}

async fn handle_running_chan(scheduler: Arc<Scheduler>, pool: Arc<TaskPool>, mut rx: tokio::sync::mpsc::UnboundedReceiver<usize>) {
    while let Some(count) = rx.recv().await {
        for _ in 0..count {
            scheduler.resume_waiting_job(pool.clone()).await;
        }
    }
}

async fn handle_finished_chan(scheduler: Arc<Scheduler>, pool: Arc<TaskPool>, mut rx: tokio::sync::mpsc::Receiver<Arc<dyn Job>>) {
    while let Some(job) = rx.recv().await {
        scheduler.deal_finished_job(job, pool.clone()).await;
    }
}

/// Timeout sweep over the waiting queue: once a second, kill any task
/// that has overrun its queue-phase deadline. Mirrors `handleWaitingJobs`.
async fn handle_waiting_jobs(pool: Arc<TaskPool>, default_timeout: Timeout) {
    let mut ticker = time::interval(Duration::from_secs(1));
    loop {
        ticker.tick().await;
        for job in pool.waiting_jobs().await {
            let (beg, max_duration, phase) = {
                let instance = job.instance().read().await;
                let timeout = instance.timeout(&default_timeout);
                let (beg, max_duration) = instance.phase_time(&timeout);
                (beg, max_duration, instance.phase())
            };
            if (chrono::Utc::now() - beg).to_std().unwrap_or(Duration::ZERO) >= max_duration {
                runner::stop_job(&job, &pool, Status::Killed, Some(format!("{:?} phase timeout: {:?}", phase, max_duration))).await;
            }
        }
    }
}
