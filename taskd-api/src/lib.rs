//! # taskd-api
//!
//! The HTTP surface mounted over a [`taskd_worker::scheduler::Scheduler`]:
//! task submission/status/logs/tags, and template/pool CRUD.
//!
//! ## Modules
//!
//! - `app`: shared state and the router builder
//! - `error`: the `{code, message, success, data}` error envelope
//! - `routes`: one module per resource

pub mod app;
pub mod error;
pub mod routes;
