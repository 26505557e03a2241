//! Health check: confirms the process is up and the database is
//! reachable. Unversioned, outside `/taskd/api/v1`.

use crate::{app::AppState, error::ApiResult};
use axum::{extract::State, Json};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub database: String,
}

pub async fn health_check(State(state): State<AppState>) -> ApiResult<Json<HealthResponse>> {
    let database = match sqlx::query("SELECT 1").fetch_one(&state.db).await {
        Ok(_) => "connected",
        Err(_) => "disconnected",
    };
    Ok(Json(HealthResponse {
        status: if database == "connected" { "healthy".to_string() } else { "degraded".to_string() },
        version: taskd_shared::VERSION.to_string(),
        database: database.to_string(),
    }))
}
