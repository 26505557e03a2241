//! Task pool CRUD.
//!
//! Grounded on `controllers.{ListPools,GetPool,AddPool,UpdatePool,
//! DeletePool}`. Unlike templates, a pool's update/delete touch live
//! scheduler state (`Scheduler::{reload_pool,remove_pool}`), not just a
//! row — see `taskd_worker::scheduler`.

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
};
use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use taskd_shared::models::{CreatePool, UpdatePool};
use taskd_worker::pool::{TaskPoolDetail, TaskPoolSummary};

pub async fn list(State(state): State<AppState>) -> Json<Vec<TaskPoolSummary>> {
    Json(state.scheduler.list_pools().await)
}

#[derive(Debug, Deserialize)]
pub struct GetQuery {
    #[serde(default)]
    verbose: bool,
}

pub async fn get(State(state): State<AppState>, Path(pool_id): Path<String>, Query(q): Query<GetQuery>) -> ApiResult<Json<serde_json::Value>> {
    if q.verbose {
        let detail: TaskPoolDetail = state
            .scheduler
            .pool_detail(&pool_id)
            .await
            .ok_or_else(|| ApiError::NotFound(format!("pool [{pool_id}] not found")))?;
        return Ok(Json(serde_json::to_value(detail).expect("TaskPoolDetail always serializes")));
    }
    let summary = state
        .scheduler
        .pool_summary(&pool_id)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("pool [{pool_id}] not found")))?;
    Ok(Json(serde_json::to_value(summary).expect("TaskPoolSummary always serializes")))
}

pub async fn create(State(state): State<AppState>, Json(req): Json<CreatePool>) -> ApiResult<Json<serde_json::Value>> {
    let pool_id = req.pool_id.clone();
    state.scheduler.create_pool(req).await?;
    Ok(Json(serde_json::json!({ "pool_id": pool_id })))
}

pub async fn update(
    State(state): State<AppState>,
    Path(pool_id): Path<String>,
    Json(req): Json<UpdatePool>,
) -> ApiResult<Json<serde_json::Value>> {
    state.scheduler.reload_pool(&pool_id, req).await?;
    Ok(Json(serde_json::json!({ "pool_id": pool_id })))
}

pub async fn remove(State(state): State<AppState>, Path(pool_id): Path<String>) -> ApiResult<Json<String>> {
    state.scheduler.remove_pool(&pool_id).await?;
    Ok(Json(format!("pool [{pool_id}] deleted")))
}
