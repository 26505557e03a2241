pub mod client;

pub use client::{RedisClient, RedisClientError, RedisConfig};
