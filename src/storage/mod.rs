//! # Backing Store Abstraction
//!
//! Minimal key/value store used by every other component: scalars with TTL, hashes
//! with atomic field increments, sets, and sorted sets with score and rank queries.
//!
//! ## Drivers
//!
//! - **Memory**: process-local keyspace for tests and single-process deployments
//! - **Redis**: `redis://` connection via `ConnectionManager` (feature `redis-storage`)
//! - **Database**: PostgreSQL table emulation via `sqlx` (feature `database-storage`)
//!
//! All drivers sit behind [`StorageProvider`]; the store is the single source of
//! truth and the synchronization point between concurrent producers.

pub mod command;
pub mod errors;
pub mod keys;
pub mod provider;
pub mod providers;
pub mod traits;

pub use command::{Increment, Pipeline, StorageCommand};
pub use errors::{StorageError, StorageResult};
pub use keys::KeyBuilder;
pub use provider::StorageProvider;
pub use providers::MemoryStorageDriver;
pub use traits::StorageDriver;

#[cfg(feature = "redis-storage")]
pub use providers::RedisStorageDriver;

#[cfg(feature = "database-storage")]
pub use providers::DatabaseStorageDriver;
