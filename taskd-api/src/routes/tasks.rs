//! Task submission, lookup, status, logs, tags, and cancellation.
//!
//! Grounded on `controllers.{TaskCommit,ListTasks,TaskData,TaskStatus,
//! TaskLogs,TaskTags,TaskGetTags,TaskStop}` / `service.{TaskStatusResult,
//! TaskLogsArgs,TaskLogsResult,TaskTagsResult}`.

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
};
use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, HeaderValue},
    response::{IntoResponse, Response},
    Json,
};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use taskd_shared::index::{ListTasksArgs, ListTasksResult};
use taskd_shared::models::{TaskObjRec, TaskRec};
use taskd_shared::phase::Status;
use taskd_worker::job::EntityLogs;

pub async fn submit(State(state): State<AppState>, Json(obj): Json<TaskObjRec>) -> ApiResult<Json<serde_json::Value>> {
    let rec = state.scheduler.submit(obj).await?;
    Ok(Json(serde_json::json!({ "uuid": rec.obj.uuid })))
}

pub async fn list(State(state): State<AppState>, Query(args): Query<ListTasksArgs>) -> ApiResult<Json<ListTasksResult>> {
    Ok(Json(state.scheduler.list_tasks(&args).await?))
}

pub async fn get(State(state): State<AppState>, Path(uuid): Path<String>) -> ApiResult<Json<TaskRec>> {
    let rec = state
        .scheduler
        .find_task(&uuid)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("task [{uuid}] not found")))?;
    Ok(Json(rec))
}

#[derive(Debug, Serialize)]
pub struct TaskStatusResult {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub template: String,
    pub status: Status,
}

pub async fn status(State(state): State<AppState>, Path(uuid): Path<String>) -> ApiResult<Json<TaskStatusResult>> {
    let rec = state
        .scheduler
        .find_task(&uuid)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("task [{uuid}] not found")))?;
    Ok(Json(TaskStatusResult { name: rec.obj.name, template: rec.obj.template, status: rec.runtime.status }))
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogsQuery {
    #[serde(default)]
    pub entity: String,
    #[serde(default)]
    pub tail: i64,
    #[serde(default)]
    pub follow: bool,
    #[serde(default)]
    pub timestamps: bool,
}

#[derive(Debug, Serialize)]
struct TaskLogsResult {
    uuid: String,
    status: Status,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    entities: Vec<EntityLogs>,
}

/// Logs are capped at a `tail` of 1000 lines the same way
/// `TaskLogs` clamps `args.Tail` before dispatching to the backend.
/// `follow=true` streams `text/plain` straight from the live backend;
/// a finished task has no live backend to follow, so it only ever
/// answers the non-streaming branch (see `Scheduler::follow_task_logs`).
pub async fn logs(State(state): State<AppState>, Path(uuid): Path<String>, Query(q): Query<LogsQuery>) -> ApiResult<Response> {
    let tail = q.tail.min(1000);
    if q.follow {
        let stream = state.scheduler.follow_task_logs(&uuid, &q.entity, q.timestamps, tail).await?;
        let body = Body::from_stream(stream.map(|line| line.map(|s| format!("{s}\n"))));
        let mut response = Response::new(body);
        response.headers_mut().insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        return Ok(response);
    }
    let (status, entities) = state.scheduler.task_logs(&uuid, &q.entity, tail).await?;
    Ok(Json(TaskLogsResult { uuid, status, entities }).into_response())
}

#[derive(Debug, Serialize)]
struct TaskTagsResult {
    tags: HashMap<String, String>,
}

pub async fn get_tags(State(state): State<AppState>, Path(uuid): Path<String>) -> ApiResult<Json<TaskTagsResult>> {
    Ok(Json(TaskTagsResult { tags: state.scheduler.get_tags(&uuid).await? }))
}

pub async fn set_tags(
    State(state): State<AppState>,
    Path(uuid): Path<String>,
    Json(tags): Json<HashMap<String, String>>,
) -> ApiResult<Json<TaskTagsResult>> {
    Ok(Json(TaskTagsResult { tags: state.scheduler.merge_tags(&uuid, tags).await? }))
}

pub async fn cancel(State(state): State<AppState>, Path(uuid): Path<String>) -> ApiResult<Json<serde_json::Value>> {
    state.scheduler.cancel(&uuid).await?;
    Ok(Json(serde_json::json!("task stopped")))
}
