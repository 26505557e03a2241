//! Relational storage for pool definitions and their resource capacities.
//!
//! `max_waiting`/`max_running` are kept as distinct named fields (never a
//! single ambiguous pair) precisely to avoid the historical bug where an
//! update handler copied one field onto the other; see `DESIGN.md`.

use serde::{Deserialize, Serialize};
use sqlx::PgPool;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PoolRec {
    pub pool_id: String,
    pub engine: String,
    pub description: String,
    /// Opaque engine-specific configuration blob (JSON text).
    pub config: String,
    pub max_running: i32,
    pub max_waiting: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PoolResourceRec {
    pub id: i64,
    pub pool_id: String,
    pub res_name: String,
    /// Quantity string, e.g. `"4"`, `"512M"`.
    pub res_num: String,
}

/// One resource capacity a pool is created or updated with, e.g.
/// `{res_name: "gpu", res_num: "8"}`. Mirrors `dao.PoolResource` as seen
/// through `service.TaskPoolArgs.Resources`.
#[derive(Debug, Clone, Deserialize)]
pub struct PoolResourceInput {
    pub res_name: String,
    pub res_num: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreatePool {
    pub pool_id: String,
    pub engine: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub config: String,
    pub max_running: i32,
    pub max_waiting: i32,
    #[serde(default)]
    pub resources: Vec<PoolResourceInput>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdatePool {
    pub engine: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub config: String,
    pub max_running: i32,
    pub max_waiting: i32,
    #[serde(default)]
    pub resources: Vec<PoolResourceInput>,
}

impl PoolRec {
    pub async fn create(pool: &PgPool, req: CreatePool) -> Result<PoolRec, sqlx::Error> {
        sqlx::query_as::<_, PoolRec>(
            r#"
            INSERT INTO pool (pool_id, engine, description, config, max_running, max_waiting)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING pool_id, engine, description, config, max_running, max_waiting
            "#,
        )
        .bind(req.pool_id)
        .bind(req.engine)
        .bind(req.description)
        .bind(req.config)
        .bind(req.max_running)
        .bind(req.max_waiting)
        .fetch_one(pool)
        .await
    }

    pub async fn update(pool: &PgPool, pool_id: &str, req: UpdatePool) -> Result<Option<PoolRec>, sqlx::Error> {
        sqlx::query_as::<_, PoolRec>(
            r#"
            UPDATE pool SET engine = $2, description = $3, config = $4, max_running = $5, max_waiting = $6
            WHERE pool_id = $1
            RETURNING pool_id, engine, description, config, max_running, max_waiting
            "#,
        )
        .bind(pool_id)
        .bind(req.engine)
        .bind(req.description)
        .bind(req.config)
        .bind(req.max_running)
        .bind(req.max_waiting)
        .fetch_optional(pool)
        .await
    }

    pub async fn find_by_id(pool: &PgPool, pool_id: &str) -> Result<Option<PoolRec>, sqlx::Error> {
        sqlx::query_as::<_, PoolRec>(
            "SELECT pool_id, engine, description, config, max_running, max_waiting FROM pool WHERE pool_id = $1",
        )
        .bind(pool_id)
        .fetch_optional(pool)
        .await
    }

    pub async fn list(pool: &PgPool) -> Result<Vec<PoolRec>, sqlx::Error> {
        sqlx::query_as::<_, PoolRec>(
            "SELECT pool_id, engine, description, config, max_running, max_waiting FROM pool ORDER BY pool_id",
        )
        .fetch_all(pool)
        .await
    }

    /// Deletes a pool and its resource rows in one transaction. Callers
    /// are responsible for verifying the pool is idle first (zero running
    /// and zero waiting jobs) — this function does not check scheduler
    /// state.
    pub async fn delete(pool: &PgPool, pool_id: &str) -> Result<bool, sqlx::Error> {
        let mut tx = pool.begin().await?;
        sqlx::query("DELETE FROM pool_resource WHERE pool_id = $1")
            .bind(pool_id)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM pool WHERE pool_id = $1")
            .bind(pool_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }
}

impl PoolResourceRec {
    pub async fn list_for_pool(pool: &PgPool, pool_id: &str) -> Result<Vec<PoolResourceRec>, sqlx::Error> {
        sqlx::query_as::<_, PoolResourceRec>(
            "SELECT id, pool_id, res_name, res_num FROM pool_resource WHERE pool_id = $1 ORDER BY res_name",
        )
        .bind(pool_id)
        .fetch_all(pool)
        .await
    }

    pub async fn upsert(pool: &PgPool, pool_id: &str, res_name: &str, res_num: &str) -> Result<PoolResourceRec, sqlx::Error> {
        sqlx::query_as::<_, PoolResourceRec>(
            r#"
            INSERT INTO pool_resource (pool_id, res_name, res_num)
            VALUES ($1, $2, $3)
            ON CONFLICT (pool_id, res_name) DO UPDATE SET res_num = EXCLUDED.res_num
            RETURNING id, pool_id, res_name, res_num
            "#,
        )
        .bind(pool_id)
        .bind(res_name)
        .bind(res_num)
        .fetch_one(pool)
        .await
    }
}
