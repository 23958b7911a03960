//! Shared-cache adapters for presence, rate limiting and deduplication.
//!
//! [`RedisStore`] is the production adapter; [`InMemoryStore`] keeps the same
//! semantics inside one process.

mod keys;
mod memory;
mod redis_store;

pub use memory::InMemoryStore;
pub use redis_store::{RedisConfig, RedisStore};
