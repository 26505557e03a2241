//! Engine registry: maps an opaque [`EngineKind`] to the three factory
//! functions an engine needs to participate in scheduling.
//!
//! Grounded on `internal/task/taskjob.go`'s `TaskEngine`/`RegisterEngine`/
//! `taskEngines` package-level map. Populated once at startup by
//! `crate::adapters::register_all`.

use crate::error::{JobError, PoolError, SchedulerError};
use crate::job::{EngineKind, Job};
use crate::pool::{PoolChannels, TaskPool};
use crate::runner::Runner;
use std::collections::HashMap;
use std::sync::Arc;
use taskd_shared::models::{PoolRec, TaskRec, TaskTemplate};
use tokio::sync::RwLock;

pub type NewJobFn =
    Arc<dyn Fn(Arc<TaskTemplate>, TaskRec, Arc<dyn Runner>) -> Result<Arc<dyn Job>, JobError> + Send + Sync>;
pub type InitExtensionFn = Arc<dyn Fn(&TaskPool) -> Result<(), PoolError> + Send + Sync>;
pub type NewRunnerFn = Arc<dyn Fn(Arc<TaskPool>) -> Arc<dyn Runner> + Send + Sync>;

#[derive(Clone)]
pub struct EngineEntry {
    pub new_job: NewJobFn,
    pub init_extension: Option<InitExtensionFn>,
    pub new_runner: NewRunnerFn,
}

#[derive(Default)]
pub struct EngineRegistry {
    entries: RwLock<HashMap<EngineKind, EngineEntry>>,
}

impl EngineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, kind: EngineKind, entry: EngineEntry) {
        self.entries.write().await.insert(kind, entry);
    }

    async fn entry_for(&self, kind: &EngineKind) -> Result<EngineEntry, SchedulerError> {
        self.entries
            .read()
            .await
            .get(kind)
            .cloned()
            .ok_or_else(|| SchedulerError::UnknownEngine(kind.to_string()))
    }

    /// Builds a pool for `rec`, wiring its extension (if the engine
    /// defines one) and runner. Returns the pool, its channel receivers,
    /// and the runner the caller must spawn (`Runner::run`).
    pub async fn new_pool(&self, rec: &PoolRec) -> Result<(Arc<TaskPool>, PoolChannels, Arc<dyn Runner>), SchedulerError> {
        let entry = self.entry_for(&EngineKind::new(rec.engine.clone())).await?;
        let (pool, channels) = TaskPool::new(rec);
        if let Some(init_extension) = &entry.init_extension {
            init_extension(&pool)?;
        }
        let runner = (entry.new_runner)(pool.clone());
        Ok((pool, channels, runner))
    }

    pub async fn new_job(
        &self,
        template: Arc<TaskTemplate>,
        rec: TaskRec,
        runner: Arc<dyn Runner>,
    ) -> Result<Arc<dyn Job>, SchedulerError> {
        let entry = self.entry_for(&EngineKind::new(template.engine.clone())).await?;
        Ok((entry.new_job)(template, rec, runner)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskd_shared::models::PoolRec;

    fn sample_pool_rec() -> PoolRec {
        PoolRec {
            pool_id: "default".into(),
            engine: "nonexistent".into(),
            description: String::new(),
            config: String::new(),
            max_running: 1,
            max_waiting: 1,
        }
    }

    #[tokio::test]
    async fn new_pool_rejects_unregistered_engine() {
        let registry = EngineRegistry::new();
        let err = registry.new_pool(&sample_pool_rec()).await.unwrap_err();
        assert!(matches!(err, SchedulerError::UnknownEngine(_)));
    }

    #[tokio::test]
    async fn register_then_new_pool_succeeds() {
        let registry = EngineRegistry::new();
        registry
            .register(
                EngineKind::new("mock"),
                EngineEntry {
                    new_job: Arc::new(|_template, _rec, _runner| Err(JobError::StartFailed("unused".into()))),
                    init_extension: None,
                    new_runner: Arc::new(|pool| Arc::new(crate::runner::Poller::new(
                        pool,
                        std::sync::Arc::new(NullIndex) as std::sync::Arc<dyn taskd_shared::index::TaskIndex>,
                        taskd_shared::phase::Timeout::default(),
                    )) as Arc<dyn Runner>),
                },
            )
            .await;
        let rec = PoolRec { engine: "mock".into(), ..sample_pool_rec() };
        let (pool, _channels, _runner) = registry.new_pool(&rec).await.unwrap();
        assert_eq!(pool.pool_id, "default");
    }

    struct NullIndex;

    #[async_trait::async_trait]
    impl taskd_shared::index::TaskIndex for NullIndex {
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
}
