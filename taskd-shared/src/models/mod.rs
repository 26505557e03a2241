pub mod pool;
pub mod task_rec;
pub mod template;

pub use pool::{CreatePool, PoolRec, PoolResourceInput, PoolResourceRec, UpdatePool};
pub use task_rec::{Quota, TaskObjRec, TaskRec, TaskRuntimeRec, TaskSummary};
pub use template::{CreateTemplate, TaskTemplate};
