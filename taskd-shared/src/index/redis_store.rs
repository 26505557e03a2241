//! Redis-backed implementation of [`super::TaskIndex`].

use super::{index_key, index_prefix, obj_key, running_key, uuid_from_key, IndexError, ListTasksArgs, ListTasksResult, TaskIndex};
use crate::models::TaskRec;
use crate::redis::RedisClient;
use async_trait::async_trait;
use redis::AsyncCommands;
use std::collections::HashSet;

/// Every key written by this store carries a one-year TTL, matching the
/// original task-index lifetime: old records age out on their own rather
/// than requiring an explicit GC pass.
const TTL_SECONDS: u64 = 365 * 24 * 3600;

const REVERSE_INDEX_FIELDS: &[&str] = &["name", "namespace", "project", "template", "pool", "created_by"];

pub struct RedisTaskIndex {
    redis: RedisClient,
}

impl RedisTaskIndex {
    pub fn new(redis: RedisClient) -> Self {
        Self { redis }
    }

    async fn set_json(&self, key: &str, rec: &TaskRec) -> Result<(), IndexError> {
        let body = serde_json::to_string(rec)?;
        let mut conn = self.redis.get_connection();
        conn.set_ex::<_, _, ()>(key, body, TTL_SECONDS)
            .await
            .map_err(|e| IndexError::Backend(e.to_string()))
    }

    async fn get_json(&self, key: &str) -> Result<Option<TaskRec>, IndexError> {
        let mut conn = self.redis.get_connection();
        let raw: Option<String> = conn.get(key).await.map_err(|e| IndexError::Backend(e.to_string()))?;
        match raw {
            Some(body) => Ok(Some(serde_json::from_str(&body)?)),
            None => Ok(None),
        }
    }

    async fn del(&self, key: &str) -> Result<(), IndexError> {
        let mut conn = self.redis.get_connection();
        conn.del::<_, ()>(key).await.map_err(|e| IndexError::Backend(e.to_string()))
    }

    async fn keys_by_prefix(&self, prefix: &str) -> Result<Vec<String>, IndexError> {
        let mut conn = self.redis.get_connection();
        let pattern = format!("{}*", prefix);
        let mut cursor: u64 = 0;
        let mut keys = Vec::new();
        loop {
            let (next_cursor, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(100)
                .query_async(&mut conn)
                .await
                .map_err(|e| IndexError::Backend(e.to_string()))?;
            keys.extend(batch);
            if next_cursor == 0 {
                break;
            }
            cursor = next_cursor;
        }
        Ok(keys)
    }

    fn reverse_index_values(rec: &TaskRec) -> [(&'static str, String); 6] {
        [
            ("name", rec.obj.name.clone()),
            ("namespace", rec.obj.namespace.clone()),
            ("project", rec.obj.project.clone()),
            ("template", rec.obj.template.clone()),
            ("pool", rec.obj.pool.clone()),
            ("created_by", rec.obj.created_by.clone()),
        ]
    }

    async fn matcher(&self, field: &str, value: &str, activated: &mut bool, result: &mut HashSet<String>) -> Result<(), IndexError> {
        if value.is_empty() {
            return Ok(());
        }
        let keys = self.keys_by_prefix(&index_prefix(field, value)).await?;
        let uuids: HashSet<String> = keys.iter().map(|k| uuid_from_key(k)).collect();
        if !*activated {
            *result = uuids;
            *activated = true;
        } else {
            *result = result.intersection(&uuids).cloned().collect();
        }
        Ok(())
    }
}

#[async_trait]
impl TaskIndex for RedisTaskIndex {
    /// Writes the object plus every reverse-index key and the running
    /// marker. These are separate, non-atomic Redis writes: a crash
    /// partway through leaves a partially-indexed task, which is why
    /// `list` tolerates missing reverse-index entries and readers always
    /// treat a missing object key as "does not exist" rather than erroring.
    async fn create(&self, rec: &TaskRec) -> Result<(), IndexError> {
        self.set_json(&obj_key(&rec.obj.uuid), rec).await?;
        for (field, value) in Self::reverse_index_values(rec) {
            if value.is_empty() {
                continue;
            }
            self.set_json(&index_key(field, &value, &rec.obj.uuid), rec).await?;
        }
        self.set_json(&running_key(&rec.obj.uuid), rec).await?;
        Ok(())
    }

    async fn update(&self, rec: &TaskRec) -> Result<(), IndexError> {
        self.set_json(&obj_key(&rec.obj.uuid), rec).await
    }

    /// Writes the object and the status index, then deletes the running
    /// marker *last*. This is the opposite write order from
    /// deleting-the-marker-first: deleting last is what actually delivers
    /// the crash-tolerance guarantee documented on [`TaskIndex`] — a crash
    /// between these steps still leaves the running marker in place, so a
    /// restart's `list_running` scan still finds the task and can decide
    /// what to do with it.
    async fn bury(&self, rec: &TaskRec) -> Result<(), IndexError> {
        self.set_json(&obj_key(&rec.obj.uuid), rec).await?;
        self.set_json(&index_key("status", rec.runtime.status.as_str(), &rec.obj.uuid), rec).await?;
        self.del(&running_key(&rec.obj.uuid)).await?;
        Ok(())
    }

    async fn delete(&self, uuid: &str) -> Result<(), IndexError> {
        self.del(&obj_key(uuid)).await?;
        self.del(&running_key(uuid)).await?;
        Ok(())
    }

    async fn load(&self, uuid: &str) -> Result<Option<TaskRec>, IndexError> {
        self.get_json(&obj_key(uuid)).await
    }

    async fn exists(&self, uuid: &str) -> Result<bool, IndexError> {
        Ok(self.load(uuid).await?.is_some())
    }

    async fn list(&self, args: &ListTasksArgs) -> Result<ListTasksResult, IndexError> {
        let mut activated = false;
        let mut result: HashSet<String> = HashSet::new();

        self.matcher("name", &args.name, &mut activated, &mut result).await?;
        self.matcher("template", &args.template, &mut activated, &mut result).await?;
        self.matcher("project", &args.project, &mut activated, &mut result).await?;
        self.matcher("pool", &args.pool, &mut activated, &mut result).await?;
        self.matcher("namespace", &args.namespace, &mut activated, &mut result).await?;
        self.matcher("created_by", &args.created_by, &mut activated, &mut result).await?;
        self.matcher("status", &args.status, &mut activated, &mut result).await?;

        let mut uuids: Vec<String> = if activated {
            result.into_iter().collect()
        } else {
            self.keys_by_prefix("tasks:objects:").await?.iter().map(|k| uuid_from_key(k)).collect()
        };
        uuids.sort();

        let total = uuids.len();
        let page = args.page.max(1);
        let page_size = if args.page_size == 0 { total.max(1) } else { args.page_size };
        let start = (page - 1) * page_size;
        let end = (start + page_size).min(total);
        let page_uuids: Vec<String> = if start >= total { Vec::new() } else { uuids[start..end].to_vec() };

        let mut list = Vec::with_capacity(page_uuids.len());
        for uuid in page_uuids {
            if let Some(mut rec) = self.load(&uuid).await? {
                if !args.verbose {
                    rec.obj.extra = serde_json::Value::Null;
                    rec.obj.args = serde_json::Value::Null;
                    rec.runtime.yaml_content = String::new();
                }
                list.push(rec);
            }
        }

        Ok(ListTasksResult { total, list })
    }

    async fn list_running(&self) -> Result<Vec<TaskRec>, IndexError> {
        let keys = self.keys_by_prefix("tasks:running:").await?;
        let mut out = Vec::with_capacity(keys.len());
        for key in keys {
            let uuid = uuid_from_key(&key);
            if let Some(rec) = self.load(&uuid).await? {
                out.push(rec);
            }
        }
        Ok(out)
    }
}
