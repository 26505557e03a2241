//! Task template CRUD.
//!
//! Grounded on `controllers.{ListTemplates,GetTemplate,AddTemplate,
//! UpdateTemplate,DeleteTemplate}`. Name is immutable on `PUT`: a body
//! that names a different template than the path is rejected, mirroring
//! `UpdateTemplate`'s `name != req.Name` check.

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
};
use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use taskd_shared::models::template::{CreateTemplate, TaskTemplate};

const MAX_NAME_LEN: usize = 64;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    verbose: bool,
}

pub async fn list(State(state): State<AppState>, Query(q): Query<ListQuery>) -> ApiResult<Json<Vec<TaskTemplate>>> {
    Ok(Json(TaskTemplate::list(&state.db, q.verbose).await?))
}

pub async fn get(State(state): State<AppState>, Path(name): Path<String>) -> ApiResult<Json<TaskTemplate>> {
    let template = TaskTemplate::find_by_name(&state.db, &name)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("template [{name}] not found")))?;
    Ok(Json(template))
}

#[derive(Debug, Serialize)]
struct CreateTemplateResult {
    name: String,
}

fn validate_name(name: &str) -> ApiResult<()> {
    if name.is_empty() {
        return Err(ApiError::BadRequest("template name cannot be empty".to_string()));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(ApiError::BadRequest(format!("template name length cannot exceed {MAX_NAME_LEN} characters")));
    }
    Ok(())
}

pub async fn create(State(state): State<AppState>, Json(req): Json<CreateTemplate>) -> ApiResult<Json<CreateTemplateResult>> {
    validate_name(&req.name)?;
    let template = TaskTemplate::create(&state.db, req).await?;
    Ok(Json(CreateTemplateResult { name: template.name }))
}

pub async fn update(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(req): Json<CreateTemplate>,
) -> ApiResult<Json<CreateTemplateResult>> {
    if !req.name.is_empty() && req.name != name {
        return Err(ApiError::BadRequest("template name modification is not allowed".to_string()));
    }
    let template = TaskTemplate::update(&state.db, &name, req)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("template [{name}] not found")))?;
    Ok(Json(CreateTemplateResult { name: template.name }))
}

pub async fn remove(State(state): State<AppState>, Path(name): Path<String>) -> ApiResult<Json<String>> {
    let deleted = TaskTemplate::delete(&state.db, &name).await?;
    if !deleted {
        return Err(ApiError::NotFound(format!("template [{name}] not found")));
    }
    Ok(Json(format!("template [{name}] deleted")))
}
