//! Task instance: the live, in-memory counterpart of a persisted
//! [`TaskRec`], carrying the compiled template output, the pool it is
//! attached to, and the quotas it currently holds.
//!
//! Grounded on `internal/task/taskinstance.go`. One deliberate departure:
//! the original keeps a `*TaskPool` back-pointer directly on the
//! instance. Here the instance only stores the owning pool's id — every
//! lookup of the actual pool goes back through the scheduler's registry,
//! which keeps the ownership graph a simple tree (`Scheduler` owns
//! `TaskPool`s and `Job`s; nothing points back up) instead of a cycle.

use crate::error::{JobError, PoolError, TemplateError};
use crate::pool::TaskPool;
use crate::template;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use std::time::Duration;
use taskd_shared::models::{Quota, TaskRec, TaskSummary, TaskTemplate};
use taskd_shared::phase::{Phase, Status, Timeout};
use tokio::sync::RwLock;

/// Shared handle to a [`TaskInstance`] — cheap to clone, safe to hand to
/// a job's `start`/`stop` implementations and to the scheduler's workers
/// alike.
pub type InstanceHandle = Arc<RwLock<TaskInstance>>;

#[derive(Debug, Clone)]
pub struct TaskInstance {
    pub rec: TaskRec,
    pub template: TaskTemplate,
    pool_id: Option<String>,
    quotas: Vec<Quota>,
}

impl TaskInstance {
    /// Mirrors `TaskInstance.Init`: if `rec` already carries a compiled
    /// document (the resume-from-persistence path), it is left exactly
    /// as loaded. Otherwise this is a fresh submission: status is reset
    /// to `Queue`, both timestamps are stamped now, and the template is
    /// compiled immediately — a compile failure here is a submission-time
    /// error, not something deferred to the running phase.
    pub fn init(template: TaskTemplate, mut rec: TaskRec) -> Result<Self, TemplateError> {
        if !rec.runtime.yaml_content.is_empty() {
            return Ok(Self { rec, template, pool_id: None, quotas: Vec::new() });
        }
        let now = chrono::Utc::now();
        rec.runtime.status = Status::Queue;
        rec.runtime.create_time = now;
        rec.runtime.update_time = now;
        let compiled = template::compile(&template, &rec)?;
        rec.runtime.yaml_content = compiled;
        Ok(Self { rec, template, pool_id: None, quotas: Vec::new() })
    }

    pub fn attach_pool(&mut self, pool_id: impl Into<String>) {
        self.pool_id = Some(pool_id.into());
    }

    pub fn pool_id(&self) -> Option<&str> {
        self.pool_id.as_deref()
    }

    pub fn phase(&self) -> Phase {
        self.rec.phase()
    }

    pub fn status(&self) -> Status {
        self.rec.runtime.status
    }

    pub fn title(&self) -> String {
        self.rec.title()
    }

    /// Stamps the four phase timestamps and the derived phase the same
    /// way `TaskInstance.UpdateStatus`/`SetStatus` do (the Go original
    /// splits these into two methods that differ only in whether they
    /// persist immediately; here persistence is always the caller's
    /// explicit next step via the task index, so one method covers both).
    pub fn set_status(&mut self, status: Status) {
        let now = chrono::Utc::now();
        self.rec.runtime.status = status;
        self.rec.runtime.update_time = now;
        match status {
            Status::Init => self.rec.runtime.start_time = Some(now),
            Status::Running => self.rec.runtime.running_time = Some(now),
            _ if status.is_finished() => self.rec.runtime.end_time = Some(now),
            _ => {}
        }
    }

    /// Moves the instance into a terminal status carrying an error
    /// message. `status` must be a finished status; debug builds assert
    /// this instead of the original's hard panic.
    pub fn set_error(&mut self, status: Status, message: impl Into<String>) {
        debug_assert!(status.is_finished(), "set_error called with a non-terminal status");
        self.rec.runtime.error = message.into();
        self.set_status(status);
    }

    pub fn set_warning(&mut self, warning: impl Into<String>) {
        self.rec.runtime.warning = warning.into();
    }

    pub fn set_end_log(&mut self, end_log: impl Into<String>) {
        self.rec.runtime.end_log = end_log.into();
    }

    /// Prepares the instance to run: status `Init`, `start_time` stamped.
    pub fn prerun(&mut self) {
        self.set_status(Status::Init);
    }

    /// Begin/max-duration pair for the instance's current phase, used by
    /// the timeout sweep to decide whether the phase has overrun.
    pub fn phase_time(&self, timeout: &Timeout) -> (chrono::DateTime<chrono::Utc>, Duration) {
        let phase = self.phase();
        let beg = match phase {
            Phase::Queue => self.rec.runtime.create_time,
            Phase::Init => self.rec.runtime.start_time.unwrap_or(self.rec.runtime.create_time),
            Phase::Running => self
                .rec
                .runtime
                .running_time
                .or(self.rec.runtime.start_time)
                .unwrap_or(self.rec.runtime.create_time),
            Phase::Finished => self.rec.runtime.end_time.unwrap_or_else(chrono::Utc::now),
        };
        (beg, timeout.for_phase(phase))
    }

    /// Effective timeout for this instance, overlaying its own settings
    /// onto the process-wide default.
    pub fn timeout(&self, default: &Timeout) -> Timeout {
        template::resolve_timeout(&self.rec, default)
    }

    pub fn extra(&self) -> JsonValue {
        template::merge_extra(&self.template, &self.rec)
    }

    pub fn tags(&self) -> &std::collections::HashMap<String, String> {
        &self.rec.obj.tags
    }

    /// Merges the given pairs over the instance's existing tags,
    /// overwriting on key collision. Tags are scheduler hints, not part
    /// of the otherwise-immutable submission payload, so this is the one
    /// field `taskd-api` is allowed to mutate on a live task.
    pub fn merge_tags(&mut self, extra: std::collections::HashMap<String, String>) {
        self.rec.obj.tags.extend(extra);
    }

    pub fn summary(&self) -> TaskSummary {
        TaskSummary::from(&self.rec)
    }

    /// Allocates the quotas requested at submission against `pool`,
    /// remembering what was granted so [`TaskInstance::free_quotas`] can
    /// release exactly that later.
    pub async fn alloc_quotas(&mut self, pool: &TaskPool) -> Result<(), PoolError> {
        let quotas = self.rec.obj.quotas.clone();
        pool.alloc_quotas(&quotas).await?;
        self.quotas = quotas;
        Ok(())
    }

    /// Releases whatever quotas are currently held. A no-op if nothing
    /// was allocated (e.g. the instance never started).
    pub async fn free_quotas(&mut self, pool: &TaskPool) {
        if self.quotas.is_empty() {
            return;
        }
        if let Err(err) = pool.free_quotas(&self.quotas).await {
            tracing::error!(task = %self.title(), %err, "failed to free quotas");
        }
        self.quotas.clear();
    }

    /// Quotas currently held, as granted by the pool (may differ from the
    /// originally requested amounts if none were ever allocated).
    pub fn held_quotas(&self) -> &[Quota] {
        &self.quotas
    }

    /// Recompiles the template against the current record, e.g. after an
    /// operator edits `args` on a still-queued task.
    pub fn recompile(&mut self) -> Result<(), TemplateError> {
        self.rec.runtime.yaml_content = template::compile(&self.template, &self.rec)?;
        Ok(())
    }
}

/// Posts the finish notification to the task's callback URL, if it set
/// one. Mirrors `TaskInstance.SendCallback`: a missing callback is not an
/// error, and delivery failures are the caller's to log and swallow (spec
/// §7 — notification delivery never blocks task completion).
pub async fn send_callback(rec: &TaskRec, client: &reqwest::Client) -> Result<(), JobError> {
    if rec.obj.callback.is_empty() {
        return Ok(());
    }
    #[derive(serde::Serialize)]
    struct Payload<'a> {
        name: &'a str,
        uuid: &'a str,
        status: &'static str,
        message: String,
    }
    let message = if rec.runtime.error.is_empty() {
        format!("Task [{}] has finished running", rec.title())
    } else {
        rec.runtime.error.clone()
    };
    let payload = Payload {
        name: &rec.obj.name,
        uuid: &rec.obj.uuid,
        status: rec.runtime.status.as_str(),
        message,
    };
    client
        .post(&rec.obj.callback)
        .json(&payload)
        .send()
        .await
        .map_err(|e| JobError::StartFailed(format!("callback post failed: {e}")))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskd_shared::models::TaskObjRec;

    fn sample_obj() -> TaskObjRec {
        TaskObjRec {
            uuid: "u-1".into(),
            parent: None,
            namespace: String::new(),
            name: "demo".into(),
            project: String::new(),
            template: "tpl".into(),
            pool: "default".into(),
            extra: JsonValue::Null,
            args: JsonValue::Null,
            timeout: Default::default(),
            quotas: vec![],
            tags: Default::default(),
            callback: String::new(),
            created_by: "alice".into(),
        }
    }

    fn sample_template() -> TaskTemplate {
        TaskTemplate {
            name: "tpl".into(),
            title: "Demo".into(),
            engine: "mock".into(),
            schema: String::new(),
            extra: "{}".into(),
            create_time: chrono::Utc::now(),
        }
    }

    #[test]
    fn init_fresh_task_starts_queued() {
        let rec = TaskRec::new(sample_obj());
        let ti = TaskInstance::init(sample_template(), rec).unwrap();
        assert_eq!(ti.status(), Status::Queue);
        assert_eq!(ti.phase(), Phase::Queue);
    }

    #[test]
    fn init_resuming_task_keeps_existing_status() {
        let mut rec = TaskRec::new(sample_obj());
        rec.runtime.yaml_content = "already: compiled".into();
        rec.runtime.status = Status::Running;
        let ti = TaskInstance::init(sample_template(), rec).unwrap();
        assert_eq!(ti.status(), Status::Running);
    }

    #[test]
    fn set_status_stamps_phase_specific_timestamp() {
        let rec = TaskRec::new(sample_obj());
        let mut ti = TaskInstance::init(sample_template(), rec).unwrap();
        assert!(ti.rec.runtime.start_time.is_none());
        ti.set_status(Status::Init);
        assert!(ti.rec.runtime.start_time.is_some());
        ti.set_status(Status::Running);
        assert!(ti.rec.runtime.running_time.is_some());
        ti.set_status(Status::Succeeded);
        assert!(ti.rec.runtime.end_time.is_some());
    }

    #[test]
    fn set_error_records_message_and_finishes() {
        let rec = TaskRec::new(sample_obj());
        let mut ti = TaskInstance::init(sample_template(), rec).unwrap();
        ti.set_error(Status::Failed, "boom");
        assert_eq!(ti.status(), Status::Failed);
        assert_eq!(ti.rec.runtime.error, "boom");
    }

    #[test]
    fn attach_pool_records_pool_id() {
        let rec = TaskRec::new(sample_obj());
        let mut ti = TaskInstance::init(sample_template(), rec).unwrap();
        assert!(ti.pool_id().is_none());
        ti.attach_pool("default");
        assert_eq!(ti.pool_id(), Some("default"));
    }
}
