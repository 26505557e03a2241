//! Task pool: the admission/capacity boundary a job runs inside.
//!
//! Grounded on `internal/task/taskpool.go`. Channel plumbing follows
//! `schedule.go`'s wiring exactly (see `crate::scheduler`): a bounded
//! `WaitingChan`, an unbounded `RunningChan` carrying an admit-count, and
//! a bounded `FinishedChan`. The pool itself never reaches into the
//! scheduler's registries — it only tracks what is running/waiting
//! *inside it* and how much resource capacity remains.

use crate::error::PoolError;
use crate::job::Job;
use std::any::Any;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, OnceLock};
use taskd_shared::models::{PoolRec, Quota, TaskSummary};
use taskd_shared::quantity::Quantity;
use tokio::sync::{mpsc, RwLock};

/// One resource's capacity/allocation ledger, e.g. `gpu: 8 allocated of 16`.
#[derive(Debug, Clone)]
pub struct ResourceAlloc {
    pub name: String,
    pub capacity: Quantity,
    pub allocated: Quantity,
}

/// Read view of one resource, formatted for the HTTP surface.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ResourceItem {
    pub name: String,
    pub capacity: String,
    pub allocate: String,
    pub remain: String,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct TaskPoolSummary {
    pub pool_id: String,
    pub engine: String,
    pub config: String,
    pub max_waiting: usize,
    pub max_running: usize,
    pub waiting: usize,
    pub running: usize,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct TaskPoolDetail {
    pub pool_id: String,
    pub engine: String,
    pub config: String,
    pub max_waiting: usize,
    pub max_running: usize,
    pub waiting: usize,
    pub running: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tasks: Vec<TaskSummary>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub resources: Vec<ResourceItem>,
}

struct PoolInner {
    running: HashMap<String, Arc<dyn Job>>,
    waiting: VecDeque<Arc<dyn Job>>,
    resources: HashMap<String, ResourceAlloc>,
}

/// The receiving ends of a pool's three channels, handed once to the
/// scheduler at pool-construction time so it can spawn the consumer
/// workers (`handle_waiting_chan`, `handle_running_chan`,
/// `handle_finished_chan` in `crate::scheduler`).
pub struct PoolChannels {
    pub waiting_rx: mpsc::Receiver<Arc<dyn Job>>,
    pub running_rx: mpsc::UnboundedReceiver<usize>,
    pub finished_rx: mpsc::Receiver<Arc<dyn Job>>,
}

pub struct TaskPool {
    pub pool_id: String,
    pub engine: String,
    pub description: String,
    pub config: String,
    pub max_running: usize,
    pub max_waiting: usize,
    /// Opaque per-engine side state (e.g. a shared `reqwest::Client` for
    /// the `rpc` adapter), modeled on the type-map `axum::Extension`
    /// already uses — set once at `InitExtension` time, read many times.
    extension: OnceLock<Arc<dyn Any + Send + Sync>>,
    waiting_tx: mpsc::Sender<Arc<dyn Job>>,
    running_tx: mpsc::UnboundedSender<usize>,
    finished_tx: mpsc::Sender<Arc<dyn Job>>,
    inner: RwLock<PoolInner>,
}

impl TaskPool {
    pub fn new(rec: &PoolRec) -> (Arc<TaskPool>, PoolChannels) {
        let max_running = rec.max_running.max(0) as usize;
        let max_waiting = rec.max_waiting.max(0) as usize;
        let (waiting_tx, waiting_rx) = mpsc::channel(max_waiting.max(1));
        let (running_tx, running_rx) = mpsc::unbounded_channel();
        let (finished_tx, finished_rx) = mpsc::channel(max_running.max(1));

        let pool = Arc::new(TaskPool {
            pool_id: rec.pool_id.clone(),
            engine: rec.engine.clone(),
            description: rec.description.clone(),
            config: rec.config.clone(),
            max_running,
            max_waiting,
            extension: OnceLock::new(),
            waiting_tx,
            running_tx,
            finished_tx,
            inner: RwLock::new(PoolInner {
                running: HashMap::new(),
                waiting: VecDeque::new(),
                resources: HashMap::new(),
            }),
        });
        (pool, PoolChannels { waiting_rx, running_rx, finished_rx })
    }

    pub fn set_extension<T: Send + Sync + 'static>(&self, value: Arc<T>) {
        let _ = self.extension.set(value as Arc<dyn Any + Send + Sync>);
    }

    pub fn extension<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.extension.get().and_then(|ext| ext.clone().downcast::<T>().ok())
    }

    /// Enqueues a job for admission. Uses `try_send` rather than a
    /// blocking send — a full waiting queue is reported to the caller as
    /// saturation (see `SchedulerError::PoolSaturated`) instead of
    /// blocking the submitting task indefinitely, the one place this port
    /// deliberately departs from `original_source`'s blocking channel
    /// send (spec backpressure redesign).
    pub fn try_send_waiting(&self, job: Arc<dyn Job>) -> bool {
        self.waiting_tx.try_send(job).is_ok()
    }

    pub fn notify_running(&self, count: usize) {
        let _ = self.running_tx.send(count);
    }

    pub async fn send_finished(&self, job: Arc<dyn Job>) {
        if self.finished_tx.send(job).await.is_err() {
            tracing::error!(pool_id = %self.pool_id, "finished channel closed, job result dropped");
        }
    }

    pub async fn running_count(&self) -> usize {
        self.inner.read().await.running.len()
    }

    pub async fn waiting_count(&self) -> usize {
        self.inner.read().await.waiting.len()
    }

    /// Remaining admission capacity: `(waiting slots free, running slots free)`.
    pub async fn capacity(&self) -> (usize, usize) {
        let inner = self.inner.read().await;
        (
            self.max_waiting.saturating_sub(inner.waiting.len()),
            self.max_running.saturating_sub(inner.running.len()),
        )
    }

    pub async fn running_jobs(&self) -> Vec<Arc<dyn Job>> {
        self.inner.read().await.running.values().cloned().collect()
    }

    pub async fn waiting_jobs(&self) -> Vec<Arc<dyn Job>> {
        self.inner.read().await.waiting.iter().cloned().collect()
    }

    pub async fn add_running(&self, uuid: String, job: Arc<dyn Job>) {
        self.inner.write().await.running.insert(uuid, job);
    }

    pub async fn push_waiting(&self, job: Arc<dyn Job>) {
        self.inner.write().await.waiting.push_back(job);
    }

    pub async fn pop_waiting(&self) -> Option<Arc<dyn Job>> {
        self.inner.write().await.waiting.pop_front()
    }

    /// Removes a job from either the running map or the waiting queue,
    /// whichever it's in. A no-op if it's in neither (already removed).
    pub async fn remove_job(&self, uuid: &str) {
        let mut inner = self.inner.write().await;
        if inner.running.remove(uuid).is_some() {
            return;
        }
        if let Some(pos) = position_of(&inner.waiting, uuid) {
            inner.waiting.remove(pos);
        }
    }

    pub async fn load_resources(&self, pool: &sqlx::PgPool) -> Result<(), PoolError> {
        let rows = taskd_shared::models::PoolResourceRec::list_for_pool(pool, &self.pool_id)
            .await
            .map_err(|e| PoolError::Quantity(taskd_shared::quantity::QuantityError::Parse(e.to_string())))?;
        let mut inner = self.inner.write().await;
        for row in rows {
            match Quantity::parse(&row.res_num) {
                Ok(capacity) => {
                    inner.resources.insert(
                        row.res_name.clone(),
                        ResourceAlloc { name: row.res_name, capacity, allocated: Quantity::zero() },
                    );
                }
                Err(err) => {
                    tracing::error!(pool_id = %self.pool_id, res_name = %row.res_name, %err, "invalid resource capacity");
                }
            }
        }
        Ok(())
    }

    /// Reloads resource capacities from the database (e.g. after a scale
    /// change) and recomputes every resource's allocated amount from the
    /// quotas currently held by running jobs.
    pub async fn reload_resources(&self, db: &sqlx::PgPool, running_quotas: &[(String, Vec<Quota>)]) -> Result<(), PoolError> {
        self.load_resources(db).await?;
        let mut inner = self.inner.write().await;
        for (_, quotas) in running_quotas {
            for q in quotas {
                if let Some(alloc) = inner.resources.get_mut(&q.res_name) {
                    if let Ok(qt) = Quantity::new(q.res_num, &q.res_fmt) {
                        if let Ok(sum) = alloc.allocated.plus(&qt) {
                            alloc.allocated = sum;
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Allocates every quota in `quotas`, rolling back everything granted
    /// so far the moment one entry doesn't fit — mirrors
    /// `TaskPool.AllocQuotas`'s `FreeQuotas(quotas[:n])` on failure.
    pub async fn alloc_quotas(&self, quotas: &[Quota]) -> Result<(), PoolError> {
        let mut inner = self.inner.write().await;
        for (n, q) in quotas.iter().enumerate() {
            let alloc = inner
                .resources
                .get_mut(&q.res_name)
                .ok_or_else(|| PoolError::UnknownResource(q.res_name.clone()))?;
            let qt = Quantity::new(q.res_num, &q.res_fmt)?;
            let attempted = alloc.allocated.plus(&qt)?;
            if alloc.capacity.compare(&attempted)? == std::cmp::Ordering::Less {
                drop_free(&mut inner.resources, &quotas[..n]);
                return Err(PoolError::CapacityExceeded(q.res_name.clone()));
            }
            alloc.allocated = attempted;
        }
        Ok(())
    }

    pub async fn free_quotas(&self, quotas: &[Quota]) -> Result<(), PoolError> {
        let mut inner = self.inner.write().await;
        for q in quotas {
            let alloc = inner
                .resources
                .get_mut(&q.res_name)
                .ok_or_else(|| PoolError::UnknownResource(q.res_name.clone()))?;
            let qt = Quantity::new(q.res_num, &q.res_fmt)?;
            alloc.allocated = alloc.allocated.minus(&qt)?;
        }
        Ok(())
    }

    pub async fn summary(&self) -> TaskPoolSummary {
        let inner = self.inner.read().await;
        TaskPoolSummary {
            pool_id: self.pool_id.clone(),
            engine: self.engine.clone(),
            config: self.config.clone(),
            max_waiting: self.max_waiting,
            max_running: self.max_running,
            waiting: inner.waiting.len(),
            running: inner.running.len(),
        }
    }

    /// Holds the read lock for the whole walk, exactly as
    /// `TaskPool.GetDetail` does — callers get a point-in-time,
    /// internally-consistent view rather than a racy composite.
    pub async fn detail(&self) -> TaskPoolDetail {
        let inner = self.inner.read().await;
        let mut tasks = Vec::with_capacity(inner.running.len() + inner.waiting.len());
        for job in inner.running.values().chain(inner.waiting.iter()) {
            tasks.push(job.instance().read().await.summary());
        }
        let resources = inner
            .resources
            .values()
            .map(|r| ResourceItem {
                name: r.name.clone(),
                capacity: r.capacity.to_k8s_string(),
                allocate: r.allocated.to_k8s_string(),
                remain: r
                    .capacity
                    .minus(&r.allocated)
                    .map(|q| q.to_k8s_string())
                    .unwrap_or_else(|_| "?".to_string()),
            })
            .collect();
        TaskPoolDetail {
            pool_id: self.pool_id.clone(),
            engine: self.engine.clone(),
            config: self.config.clone(),
            max_waiting: self.max_waiting,
            max_running: self.max_running,
            waiting: inner.waiting.len(),
            running: inner.running.len(),
            tasks,
            resources,
        }
    }
}

fn position_of(waiting: &VecDeque<Arc<dyn Job>>, uuid: &str) -> Option<usize> {
    // Can't `.await` inside this closure (instance() returns a lock), so
    // this relies on `Job::instance` being cheap (an `Arc` clone) and the
    // uuid being readable synchronously off the cached task record isn't
    // available here — callers only have the uuid, so we match by trying
    // a best-effort `try_read`. Jobs are never held write-locked during
    // pool bookkeeping, so this always succeeds in practice.
    waiting.iter().position(|job| {
        job.instance()
            .try_read()
            .map(|ti| ti.rec.obj.uuid == uuid)
            .unwrap_or(false)
    })
}

fn drop_free(resources: &mut HashMap<String, ResourceAlloc>, quotas: &[Quota]) {
    for q in quotas {
        if let Some(alloc) = resources.get_mut(&q.res_name) {
            if let Ok(qt) = Quantity::new(q.res_num, &q.res_fmt) {
                if let Ok(diff) = alloc.allocated.minus(&qt) {
                    alloc.allocated = diff;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_pool_rec() -> PoolRec {
        PoolRec {
            pool_id: "default".into(),
            engine: "mock".into(),
            description: String::new(),
            config: String::new(),
            max_running: 2,
            max_waiting: 4,
        }
    }

    #[tokio::test]
    async fn capacity_reflects_waiting_and_running_counts() {
        let (pool, _channels) = TaskPool::new(&sample_pool_rec());
        let (waiting, running) = pool.capacity().await;
        assert_eq!(waiting, 4);
        assert_eq!(running, 2);
    }

    #[tokio::test]
    async fn alloc_quotas_rejects_unknown_resource() {
        let (pool, _channels) = TaskPool::new(&sample_pool_rec());
        let quotas = vec![Quota { res_name: "gpu".into(), res_num: 1, res_fmt: String::new() }];
        let err = pool.alloc_quotas(&quotas).await.unwrap_err();
        assert!(matches!(err, PoolError::UnknownResource(_)));
    }

    #[tokio::test]
    async fn alloc_quotas_rolls_back_on_partial_overflow() {
        let (pool, _channels) = TaskPool::new(&sample_pool_rec());
        pool.inner.write().await.resources.insert(
            "gpu".into(),
            ResourceAlloc { name: "gpu".into(), capacity: Quantity::new(4, "").unwrap(), allocated: Quantity::zero() },
        );
        pool.inner.write().await.resources.insert(
            "cpu".into(),
            ResourceAlloc { name: "cpu".into(), capacity: Quantity::new(1, "").unwrap(), allocated: Quantity::zero() },
        );
        let quotas = vec![
            Quota { res_name: "gpu".into(), res_num: 2, res_fmt: String::new() },
            Quota { res_name: "cpu".into(), res_num: 5, res_fmt: String::new() },
        ];
        let err = pool.alloc_quotas(&quotas).await.unwrap_err();
        assert!(matches!(err, PoolError::CapacityExceeded(_)));
        // gpu allocation from the failed batch must have been rolled back.
        assert_eq!(pool.inner.read().await.resources["gpu"].allocated.amend, 0);
    }
}
