//! RPC engine: executes a task as a single outbound HTTP request against
//! a configured service, using its own `start()` to push lifecycle
//! events rather than waiting to be polled.
//!
//! Grounded on `internal/custom/rpc.go`. Reactor-driven: `start()` spawns
//! the request on a background task and calls `on_job_start`/
//! `on_job_running`/`on_job_end` itself, exactly like the original's
//! `s.Runner().OnJobStart(s)` sequence — the one engine kind in this repo
//! that doesn't wait for a 1s poller tick to notice it's done.

use crate::error::JobError;
use crate::instance::{InstanceHandle, TaskInstance};
use crate::job::{EntityLogs, Job, LogStream, Metric};
use crate::job::{EngineKind, RPC_ENGINE};
use crate::runner::Runner;
use async_trait::async_trait;
use futures::StreamExt;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock, Weak};
use taskd_shared::models::{TaskRec, TaskTemplate};
use taskd_shared::phase::{Phase, Status};

/// Extra (template-level) configuration: the base URL, API path, and
/// HTTP verb. Mirrors the `extra` fields `NewRpc` reads.
#[derive(Debug, Clone, Deserialize)]
struct RpcExtra {
    #[serde(default = "default_url")]
    url: String,
    #[serde(default)]
    api: String,
    #[serde(default = "default_method")]
    method: String,
    #[serde(default)]
    headers: HashMap<String, String>,
}

impl Default for RpcExtra {
    fn default() -> Self {
        Self { url: default_url(), api: String::new(), method: default_method(), headers: HashMap::new() }
    }
}

fn default_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_method() -> String {
    "GET".to_string()
}

/// Per-instance (task `args`) configuration: the request body and the
/// path/query parameters to substitute into `api`.
#[derive(Debug, Clone, Deserialize, Default)]
struct RpcArgs {
    #[serde(default)]
    body: String,
    #[serde(default)]
    paths: HashMap<String, String>,
    #[serde(default)]
    queries: HashMap<String, String>,
}

pub struct RpcJob {
    instance: InstanceHandle,
    runner: Arc<dyn Runner>,
    http: reqwest::Client,
    extra: RpcExtra,
    args: RpcArgs,
    logs: Arc<Mutex<Vec<String>>>,
    self_handle: OnceLock<Weak<dyn Job>>,
}

impl RpcJob {
    fn new(template: Arc<TaskTemplate>, rec: TaskRec, runner: Arc<dyn Runner>) -> Result<Self, JobError> {
        let extra: RpcExtra = serde_json::from_str(&template.extra).unwrap_or_default();
        let args: RpcArgs = serde_json::from_value(rec.obj.args.clone()).unwrap_or_default();
        let instance = TaskInstance::init((*template).clone(), rec)
            .map_err(|e| JobError::InvalidArguments(e.to_string()))?;
        Ok(Self {
            instance: Arc::new(tokio::sync::RwLock::new(instance)),
            runner,
            http: reqwest::Client::new(),
            extra,
            args,
            logs: Arc::new(Mutex::new(Vec::new())),
            self_handle: OnceLock::new(),
        })
    }

    /// Registration entry point for the `rpc` engine kind. Binds the
    /// job's self-handle immediately after construction, so its own
    /// `start()` can hand the runner an `Arc<dyn Job>` of itself the way
    /// `s.Runner().OnJobStart(s)` hands over `s`.
    pub fn new_job(template: Arc<TaskTemplate>, rec: TaskRec, runner: Arc<dyn Runner>) -> Result<Arc<dyn Job>, JobError> {
        let job: Arc<RpcJob> = Arc::new(RpcJob::new(template, rec, runner)?);
        let _ = job.self_handle.set(Arc::downgrade(&job) as Weak<dyn Job>);
        Ok(job)
    }

    fn self_arc(&self) -> Arc<dyn Job> {
        self.self_handle
            .get()
            .and_then(Weak::upgrade)
            .expect("RpcJob used before new_job bound its self-handle")
    }

    fn resolved_api(&self) -> String {
        let mut api = self.extra.api.clone();
        for (k, v) in &self.args.paths {
            api = api.replace(&format!("{{{k}}}"), v);
        }
        api
    }
}

#[async_trait]
impl Job for RpcJob {
    fn engine(&self) -> EngineKind {
        EngineKind::new(RPC_ENGINE)
    }

    fn instance(&self) -> InstanceHandle {
        self.instance.clone()
    }

    async fn start(&self) -> Result<(), JobError> {
        self.instance.write().await.set_status(Status::Init);
        self.runner.on_job_start(self.self_arc()).await;

        let url = self.extra.url.clone();
        let api = self.resolved_api();
        let method = self.extra.method.clone();
        let headers = self.extra.headers.clone();
        let queries = self.args.queries.clone();
        let body = self.args.body.clone();
        let http = self.http.clone();
        let instance = self.instance.clone();
        let runner = self.runner.clone();
        let self_arc = self.self_arc();
        let log_sink = self.logs.clone();

        tokio::spawn(async move {
            instance.write().await.set_status(Status::Running);
            runner.on_job_running(self_arc.clone()).await;

            let mut request = http.request(parse_method(&method), format!("{url}{api}"));
            for (k, v) in &headers {
                request = request.header(k, v);
            }
            if !queries.is_empty() {
                request = request.query(&queries);
            }
            if !body.is_empty() {
                request = request.body(body.clone());
            }

            match request.send().await {
                Ok(resp) => {
                    let status_code = resp.status();
                    log_sink.lock().unwrap().push(format!("{method} {api} -> {status_code}"));
                    if status_code.is_success() {
                        instance.write().await.set_status(Status::Succeeded);
                    } else {
                        instance.write().await.set_error(Status::Failed, format!("request returned {status_code}"));
                    }
                }
                Err(err) => {
                    log_sink.lock().unwrap().push(format!("{method} {api} -> error: {err}"));
                    instance.write().await.set_error(Status::Failed, err.to_string());
                }
            }

            runner.on_job_end(self_arc).await;
        });

        Ok(())
    }

    async fn stop(&self) -> Result<(), JobError> {
        Ok(())
    }

    async fn fetch_status(&self) -> Status {
        self.instance.read().await.status()
    }

    async fn logs(&self, _entity: &str, _tail: i64) -> Result<Vec<EntityLogs>, JobError> {
        let logs = self.logs.lock().unwrap().join("\n");
        let completed = self.instance.read().await.phase() == Phase::Finished;
        Ok(vec![EntityLogs { completed, entity: String::new(), logs }])
    }

    async fn follow_logs(&self, _entity: &str, _timestamps: bool, _tail: i64) -> Result<LogStream, JobError> {
        let lines = self.logs.lock().unwrap().clone();
        Ok(futures::stream::iter(lines.into_iter().map(Ok::<String, std::io::Error>)).boxed())
    }

    fn custom_metrics(&self) -> Metric {
        Metric::new()
    }
}

fn parse_method(method: &str) -> reqwest::Method {
    method.parse().unwrap_or(reqwest::Method::GET)
}
