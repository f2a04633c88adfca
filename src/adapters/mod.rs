pub mod memory;
pub mod postgres;
pub mod redis_store;

pub use memory::{InMemoryAdminStore, InMemoryTransactionRepository};
pub use postgres::{PostgresAdminStore, PostgresTransactionRepository};
pub use redis_store::RedisTransactionRepository;
