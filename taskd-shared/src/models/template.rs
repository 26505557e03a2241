//! Relational storage for task templates: the schema text, the engine
//! kind it targets, and default extra values.

use serde::{Deserialize, Serialize};
use sqlx::PgPool;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct TaskTemplate {
    pub name: String,
    pub title: String,
    pub engine: String,
    /// Handlebars source compiled at task-submission time.
    pub schema: String,
    /// Default values merged under an instance's own `extra`.
    pub extra: String,
    pub create_time: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateTemplate {
    pub name: String,
    pub title: String,
    pub engine: String,
    pub schema: String,
    #[serde(default)]
    pub extra: String,
}

impl TaskTemplate {
    pub async fn create(pool: &PgPool, req: CreateTemplate) -> Result<TaskTemplate, sqlx::Error> {
        sqlx::query_as::<_, TaskTemplate>(
            r#"
            INSERT INTO template (name, title, engine, schema, extra, create_time)
            VALUES ($1, $2, $3, $4, $5, now())
            RETURNING name, title, engine, schema, extra, create_time
            "#,
        )
        .bind(req.name)
        .bind(req.title)
        .bind(req.engine)
        .bind(req.schema)
        .bind(req.extra)
        .fetch_one(pool)
        .await
    }

    pub async fn update(pool: &PgPool, name: &str, req: CreateTemplate) -> Result<Option<TaskTemplate>, sqlx::Error> {
        sqlx::query_as::<_, TaskTemplate>(
            r#"
            UPDATE template SET title = $2, engine = $3, schema = $4, extra = $5
            WHERE name = $1
            RETURNING name, title, engine, schema, extra, create_time
            "#,
        )
        .bind(name)
        .bind(req.title)
        .bind(req.engine)
        .bind(req.schema)
        .bind(req.extra)
        .fetch_optional(pool)
        .await
    }

    pub async fn find_by_name(pool: &PgPool, name: &str) -> Result<Option<TaskTemplate>, sqlx::Error> {
        sqlx::query_as::<_, TaskTemplate>(
            "SELECT name, title, engine, schema, extra, create_time FROM template WHERE name = $1",
        )
        .bind(name)
        .fetch_optional(pool)
        .await
    }

    /// When `verbose` is false, blanks the `schema` field the way a list
    /// view should — callers rarely need the full template body, and it
    /// can be large.
    pub async fn list(pool: &PgPool, verbose: bool) -> Result<Vec<TaskTemplate>, sqlx::Error> {
        let mut templates = sqlx::query_as::<_, TaskTemplate>(
            "SELECT name, title, engine, schema, extra, create_time FROM template ORDER BY name",
        )
        .fetch_all(pool)
        .await?;
        if !verbose {
            for t in &mut templates {
                t.schema.clear();
            }
        }
        Ok(templates)
    }

    pub async fn delete(pool: &PgPool, name: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM template WHERE name = $1")
            .bind(name)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
