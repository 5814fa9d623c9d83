//! services/api/src/adapters/redis_store.rs
//!
//! Redis implementation of the `KeyValueStore` port. Backs both the session
//! store and the listing cache.

use async_trait::async_trait;
use listings_core::ports::{KeyValueStore, PortError, PortResult};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, RedisError};
use std::time::Duration;

/// A `KeyValueStore` over a multiplexed, auto-reconnecting Redis connection.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    /// Connects to `url` and verifies the server answers.
    pub async fn connect(url: &str) -> Result<Self, RedisError> {
        let client = redis::Client::open(url)?;
        let mut conn = ConnectionManager::new(client).await?;
        redis::cmd("PING").query_async::<String>(&mut conn).await?;
        Ok(Self { conn })
    }
}

fn port_error(e: RedisError) -> PortError {
    if e.is_io_error() || e.is_timeout() || e.is_connection_dropped() || e.is_connection_refusal() {
        PortError::Unavailable(e.to_string())
    } else {
        PortError::Unexpected(e.to_string())
    }
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn get(&self, key: &str) -> PortResult<Option<Vec<u8>>> {
        let mut conn = self.conn.clone();
        conn.get::<_, Option<Vec<u8>>>(key).await.map_err(port_error)
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> PortResult<()> {
        let mut conn = self.conn.clone();
        // PX takes milliseconds; a zero TTL would be rejected by the server.
        let millis = ttl.as_millis().clamp(1, u64::MAX as u128) as u64;
        conn.pset_ex::<_, _, ()>(key, value, millis)
            .await
            .map_err(port_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use redis::ErrorKind;

    #[test]
    fn connection_failures_are_unavailable() {
        let err = RedisError::from((ErrorKind::IoError, "connection reset"));
        assert!(matches!(port_error(err), PortError::Unavailable(_)));
    }

    #[test]
    fn protocol_errors_are_unexpected() {
        let err = RedisError::from((ErrorKind::TypeError, "wrong type"));
        assert!(matches!(port_error(err), PortError::Unexpected(_)));
    }
}
