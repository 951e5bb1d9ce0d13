use async_trait::async_trait;
use crate::history::{ HistoryStore, StoreError };
use redis::{ Client, AsyncCommands };

impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        StoreError::Backend(err.to_string())
    }
}

pub struct RedisHistoryStore {
    client: Client,
    ttl_secs: u64,
}

impl RedisHistoryStore {
    /// `ttl_secs == 0` keeps conversations forever.
    pub fn new(url: &str, ttl_secs: u64) -> Result<Self, StoreError> {
        Ok(Self {
            client: Client::open(url)?,
            ttl_secs,
        })
    }

    async fn get_connection(&self) -> Result<redis::aio::MultiplexedConnection, redis::RedisError> {
        self.client.get_multiplexed_async_connection().await
    }
}

#[async_trait]
impl HistoryStore for RedisHistoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.get_connection().await?;
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut conn = self.get_connection().await?;
        if self.ttl_secs > 0 {
            conn.set_ex::<_, _, ()>(key, value, self.ttl_secs).await?;
        } else {
            conn.set::<_, _, ()>(key, value).await?;
        }
        Ok(())
    }
}
