//! Error types for the scheduling/lifecycle engine.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("template render failed: {0}")]
    Render(String),
    #[error("template args are not valid JSON: {0}")]
    InvalidArgs(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum JobError {
    #[error("adapter start failed: {0}")]
    StartFailed(String),
    #[error("adapter stop failed: {0}")]
    StopFailed(String),
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
    #[error("log retrieval failed: {0}")]
    LogFailure(String),
}

pub type JobResult<T> = Result<T, JobError>;

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("resource {0} is not defined on this pool")]
    UnknownResource(String),
    #[error("pool capacity exceeded for resource {0}")]
    CapacityExceeded(String),
    #[error("quantity error: {0}")]
    Quantity(#[from] taskd_shared::quantity::QuantityError),
    #[error("job not found in pool")]
    JobNotFound,
    #[error("waiting queue is empty")]
    WaitingQueueEmpty,
}

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("engine kind not registered: {0}")]
    UnknownEngine(String),
    #[error("template not found: {0}")]
    TemplateNotFound(String),
    #[error("pool not found: {0}")]
    PoolNotFound(String),
    #[error("no pool with capacity is available for engine {0}")]
    NoPoolAvailable(String),
    #[error("task not found: {0}")]
    TaskNotFound(String),
    #[error("task template must not be empty")]
    EmptyTemplate,
    #[error("task [{0}] already exists")]
    TaskAlreadyExists(String),
    #[error("pool is saturated, try again later")]
    PoolSaturated,
    #[error("pool {0} is still busy ({1} running/waiting jobs)")]
    PoolBusy(String, usize),
    #[error(transparent)]
    Template(#[from] TemplateError),
    #[error(transparent)]
    Job(#[from] JobError),
    #[error(transparent)]
    Pool(#[from] PoolError),
    #[error(transparent)]
    Index(#[from] taskd_shared::index::IndexError),
    #[error(transparent)]
    Db(#[from] sqlx::Error),
}
