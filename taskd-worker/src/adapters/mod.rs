//! Engine adapters that ship in this crate: `mock` (poller-driven,
//! dependency-free, useful for demos and tests) and `rpc` (reactor-driven,
//! executes a task as a single outbound HTTP call).
//!
//! `pod`/`crd`/`kfjob` are documented engine kinds (see
//! `crate::job::{POD_ENGINE, CRD_ENGINE, KFJOB_ENGINE}`) with no adapter
//! here — the original's Kubernetes client plumbing is out of scope for
//! this repo; registering a third adapter against a real cluster client
//! is a drop-in `EngineRegistry::register` call away.

pub mod mock;
pub mod rpc;

use crate::job::{EngineKind, MOCK_ENGINE, RPC_ENGINE};
use crate::registry::{EngineEntry, EngineRegistry};
use crate::runner::{Poller, Reactor, Runner};
use std::sync::Arc;
use taskd_shared::index::TaskIndex;
use taskd_shared::phase::Timeout;

/// Registers every adapter this crate ships. Called once at startup,
/// before [`crate::scheduler::Scheduler::bootstrap`].
pub async fn register_all(registry: &EngineRegistry, index: Arc<dyn TaskIndex>, default_timeout: Timeout) {
    registry
        .register(
            EngineKind::new(MOCK_ENGINE),
            EngineEntry {
                new_job: Arc::new(mock::MockJob::new_job),
                init_extension: None,
                new_runner: {
                    let index = index.clone();
                    Arc::new(move |pool| Arc::new(Poller::new(pool, index.clone(), default_timeout)) as Arc<dyn Runner>)
                },
            },
        )
        .await;

    registry
        .register(
            EngineKind::new(RPC_ENGINE),
            EngineEntry {
                new_job: Arc::new(rpc::RpcJob::new_job),
                init_extension: None,
                new_runner: Arc::new(|pool| Arc::new(Reactor::new(pool)) as Arc<dyn Runner>),
            },
        )
        .await;
}
