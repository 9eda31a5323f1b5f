use crate::redis_client::RedisClient;
use redis::AsyncCommands;
use tracing::info;

pub mod auth;
pub mod seats;

/// Кеш на чтение. Источник истины - всегда база; любая ошибка Redis
/// означает промах кеша, а не отказ запроса.
#[derive(Clone)]
pub struct CacheService {
    redis: RedisClient,
}

impl CacheService {
    pub fn new(redis: RedisClient) -> Self {
        Self { redis }
    }

    // Удаляет все ключи по шаблону
    async fn delete_matching(&self, pattern: &str) -> usize {
        let mut conn = self.redis.conn.clone();
        let keys: Vec<String> = redis::cmd("KEYS")
            .arg(pattern)
            .query_async(&mut conn)
            .await
            .unwrap_or_default();

        if keys.is_empty() {
            return 0;
        }

        let count = keys.len();
        let _: Result<(), _> = conn.del(keys).await;
        info!("Invalidated {} cache keys matching {}", count, pattern);
        count
    }
}
