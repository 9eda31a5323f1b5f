use crate::cache::CacheService;
use crate::models::Identity;
use redis::AsyncCommands;
use sha2::{Digest, Sha256};

impl CacheService {
    /// Сохранить подтвержденного пользователя. В ключе только хеш токена
    pub async fn cache_identity(
        &self,
        token: &str,
        identity: &Identity,
        ttl_seconds: u64,
    ) -> Result<(), redis::RedisError> {
        if ttl_seconds == 0 {
            return Ok(());
        }
        let data = serde_json::to_string(identity).map_err(|_| {
            redis::RedisError::from((redis::ErrorKind::TypeError, "Serialize error"))
        })?;
        let mut conn = self.redis.conn.clone();
        conn.set_ex(token_key(token), data, ttl_seconds).await
    }

    /// Получить пользователя из кеша авторизации
    pub async fn get_cached_identity(&self, token: &str) -> Option<Identity> {
        let mut conn = self.redis.conn.clone();
        let data: Option<String> = conn
            .get::<_, Option<String>>(token_key(token))
            .await
            .ok()
            .flatten();
        data.and_then(|json| serde_json::from_str(&json).ok())
    }
}

pub(crate) fn token_key(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("auth:{:x}", hasher.finalize())
}
