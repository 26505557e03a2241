//! Application state and router builder.
//!
//! Mirrors the teacher's own `app::{AppState, build_router}` split, minus
//! the auth/rate-limit layers it has no use for here: this surface has no
//! notion of a caller identity, only tasks/templates/pools (see
//! `DESIGN.md` for what was dropped and why).

use crate::routes;
use axum::{
    routing::{get, post},
    Router,
};
use sqlx::PgPool;
use std::sync::Arc;
use taskd_worker::scheduler::Scheduler;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub scheduler: Arc<Scheduler>,
}

impl AppState {
    pub fn new(db: PgPool, scheduler: Arc<Scheduler>) -> Self {
        Self { db, scheduler }
    }
}

/// Builds the full router: base path `/taskd/api/v1` for everything
/// task/template/pool-shaped, plus an unversioned `/health`.
pub fn build_router(state: AppState) -> Router {
    let task_routes = Router::new()
        .route("/tasks", post(routes::tasks::submit).get(routes::tasks::list))
        .route("/tasks/:uuid", get(routes::tasks::get).delete(routes::tasks::cancel))
        .route("/tasks/:uuid/status", get(routes::tasks::status))
        .route("/tasks/:uuid/logs", get(routes::tasks::logs))
        .route("/tasks/:uuid/tags", get(routes::tasks::get_tags).post(routes::tasks::set_tags));

    let template_routes = Router::new()
        .route("/templates", get(routes::templates::list).post(routes::templates::create))
        .route(
            "/templates/:name",
            get(routes::templates::get).put(routes::templates::update).delete(routes::templates::remove),
        );

    let pool_routes = Router::new()
        .route("/pools", get(routes::pools::list).post(routes::pools::create))
        .route(
            "/pools/:pool_id",
            get(routes::pools::get).put(routes::pools::update).delete(routes::pools::remove),
        );

    let v1 = Router::new().merge(task_routes).merge(template_routes).merge(pool_routes);

    Router::new()
        .route("/health", get(routes::health::health_check))
        .nest("/taskd/api/v1", v1)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .with_state(state)
}
