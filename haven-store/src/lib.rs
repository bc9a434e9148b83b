pub mod app_config;
pub mod database;
pub mod memory;
pub mod redis_repo;
pub mod reservation_repo;

pub use database::DbClient;
pub use memory::InMemoryStore;
pub use redis_repo::{RateLimiter, RedisClient};
pub use reservation_repo::PgReservationStore;
