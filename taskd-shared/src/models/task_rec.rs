//! The persisted shape of a task: everything the caller submitted
//! (`TaskObjRec`) plus everything the runtime has observed since
//! (`TaskRuntimeRec`). This is what lives in the task index, never in the
//! relational store.

use crate::phase::{Phase, Status};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// A single resource request, e.g. `{res_name: "gpu", res_num: 2, res_fmt: ""}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quota {
    pub res_name: String,
    pub res_num: i64,
    #[serde(default)]
    pub res_fmt: String,
}

/// Fields supplied at submission time and never mutated afterward.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskObjRec {
    pub uuid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub project: String,
    pub template: String,
    pub pool: String,
    /// Raw JSON object, merged over the template's own `extra` at compile time.
    #[serde(default)]
    pub extra: JsonValue,
    /// Raw JSON object bound into the template as `args`.
    #[serde(default)]
    pub args: JsonValue,
    #[serde(default)]
    pub timeout: crate::phase::TimeoutSetting,
    #[serde(default)]
    pub quotas: Vec<Quota>,
    #[serde(default)]
    pub tags: std::collections::HashMap<String, String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub callback: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub created_by: String,
}

/// Fields the runtime owns and updates as the task progresses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRuntimeRec {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub yaml_content: String,
    pub create_time: chrono::DateTime<chrono::Utc>,
    #[serde(default)]
    pub start_time: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(default)]
    pub running_time: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(default)]
    pub end_time: Option<chrono::DateTime<chrono::Utc>>,
    pub update_time: chrono::DateTime<chrono::Utc>,
    pub status: Status,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub warning: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub end_log: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRec {
    #[serde(flatten)]
    pub obj: TaskObjRec,
    #[serde(flatten)]
    pub runtime: TaskRuntimeRec,
}

impl TaskRec {
    pub fn new(obj: TaskObjRec) -> Self {
        let now = chrono::Utc::now();
        Self {
            obj,
            runtime: TaskRuntimeRec {
                yaml_content: String::new(),
                create_time: now,
                start_time: None,
                running_time: None,
                end_time: None,
                update_time: now,
                status: Status::Queue,
                error: String::new(),
                warning: String::new(),
                end_log: String::new(),
            },
        }
    }

    pub fn phase(&self) -> Phase {
        self.runtime.status.phase()
    }

    pub fn title(&self) -> String {
        format!("{}:{}", self.obj.template, self.obj.uuid)
    }
}

/// A read-optimized view returned by listing/summary endpoints; mirrors
/// `TaskInstanceSummary` from the original runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSummary {
    pub uuid: String,
    pub name: String,
    pub status: Status,
    pub created_by: String,
    pub pool: String,
    pub warning: String,
    pub error: String,
    pub tags: std::collections::HashMap<String, String>,
    pub create_time: chrono::DateTime<chrono::Utc>,
    pub start_time: Option<chrono::DateTime<chrono::Utc>>,
    pub running_time: Option<chrono::DateTime<chrono::Utc>>,
    pub end_time: Option<chrono::DateTime<chrono::Utc>>,
}

impl From<&TaskRec> for TaskSummary {
    fn from(rec: &TaskRec) -> Self {
        Self {
            uuid: rec.obj.uuid.clone(),
            name: rec.obj.name.clone(),
            status: rec.runtime.status,
            created_by: rec.obj.created_by.clone(),
            pool: rec.obj.pool.clone(),
            warning: rec.runtime.warning.clone(),
            error: rec.runtime.error.clone(),
            tags: rec.obj.tags.clone(),
            create_time: rec.runtime.create_time,
            start_time: rec.runtime.start_time,
            running_time: rec.runtime.running_time,
            end_time: rec.runtime.end_time,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

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

    #[test]
    fn new_task_starts_in_queue_phase() {
        let rec = TaskRec::new(sample_obj());
        assert_eq!(rec.runtime.status, Status::Queue);
        assert_eq!(rec.phase(), Phase::Queue);
    }

    #[test]
    fn title_combines_template_and_uuid() {
        let rec = TaskRec::new(sample_obj());
        assert_eq!(rec.title(), "tpl:u-1");
    }

    #[test]
    fn summary_blanks_nothing_by_default() {
        let rec = TaskRec::new(sample_obj());
        let summary = TaskSummary::from(&rec);
        assert_eq!(summary.name, "demo");
        assert_eq!(summary.pool, "default");
    }
}
