use redis::{AsyncCommands, Client, aio::MultiplexedConnection};
use tracing::info;

#[derive(Clone)]
pub struct RedisService {
    client: Client,
}

impl RedisService {
    pub async fn new(connection_string: &str) -> Result<Self, redis::RedisError> {
        let service = Self::open(connection_string)?;

        // Test connection
        let _conn = service.get_conn().await?;

        info!("✅ Connected to Redis");
        Ok(service)
    }

    /// Client without an initial round trip; connections open on first use.
    pub fn open(connection_string: &str) -> Result<Self, redis::RedisError> {
        Ok(Self {
            client: Client::open(connection_string)?,
        })
    }

    pub async fn get_conn(&self) -> Result<MultiplexedConnection, redis::RedisError> {
        self.client.get_multiplexed_async_connection().await
    }

    /// Whether the session service has revoked this access token.
    pub async fn is_token_blocked(&self, token: &str) -> Result<bool, redis::RedisError> {
        let mut conn = self.get_conn().await?;
        conn.exists(format!("blocked_token:{}", token)).await
    }

    pub async fn publish(&self, channel: &str, payload: &str) -> Result<(), redis::RedisError> {
        let mut conn = self.get_conn().await?;
        let _receivers: i64 = conn.publish(channel, payload).await?;
        Ok(())
    }
}
