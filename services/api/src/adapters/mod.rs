pub mod db;
pub mod redis_store;

pub use db::DbAdapter;
pub use redis_store::RedisStore;
