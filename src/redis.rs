use crate::error::Result;
use redis::{AsyncCommands, Client, aio::ConnectionManager};
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Clone)]
pub struct RedisClient {
    manager: Arc<Mutex<ConnectionManager>>,
}

impl RedisClient {
    pub async fn new(redis_url: &str) -> Result<Self> {
        let client = Client::open(redis_url)?;
        let manager = ConnectionManager::new(client).await?;
        Ok(Self {
            manager: Arc::new(Mutex::new(manager)),
        })
    }

    // Fixed-window rate limiting. Returns false once `limit` is exceeded.
    pub async fn check_rate_limit(
        &self,
        key: &str,
        limit: u32,
        window_seconds: usize,
    ) -> Result<bool> {
        let mut conn = self.manager.lock().await;
        let key = format!("rate_limit:{}", key);

        let current: u32 = conn.incr(&key, 1).await?;
        if current == 1 {
            let _: () = conn.expire(&key, window_seconds as i64).await?;
        }

        Ok(current <= limit)
    }

    // Caching
    pub async fn cache_set(&self, key: &str, value: &str, ttl_seconds: usize) -> Result<()> {
        let mut conn = self.manager.lock().await;
        let _: () = conn.set_ex(key, value, ttl_seconds as u64).await?;
        Ok(())
    }

    pub async fn cache_get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.manager.lock().await;
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    pub async fn cache_delete(&self, key: &str) -> Result<()> {
        let mut conn = self.manager.lock().await;
        let _: () = conn.del(key).await?;
        Ok(())
    }
}
