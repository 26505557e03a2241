//! Relational metadata store: connection pooling and migrations for the
//! `template`, `pool`, and `pool_resource` tables.

pub mod migrations;
pub mod pool;
