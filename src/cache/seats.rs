use crate::cache::CacheService;
use crate::models::Seat;
use redis::AsyncCommands;
use tracing::{debug, warn};

// Схема зала меняется при каждом резерве, поэтому TTL короткий
const SEATS_TTL_SECONDS: u64 = 30;

impl CacheService {
    /// Получить схему зала из кеша
    pub async fn get_cached_seats(&self, studio_id: i64) -> Option<Vec<Seat>> {
        let mut conn = self.redis.conn.clone();
        let data: Option<String> = conn
            .get::<_, Option<String>>(seats_key(studio_id))
            .await
            .ok()
            .flatten();
        data.and_then(|json| serde_json::from_str(&json).ok())
    }

    /// Сохранить схему зала в кеш
    pub async fn cache_seats(&self, studio_id: i64, seats: &[Seat]) {
        let data = match serde_json::to_string(seats) {
            Ok(data) => data,
            Err(e) => {
                warn!("Failed to serialize seats for studio {}: {:?}", studio_id, e);
                return;
            }
        };
        let mut conn = self.redis.conn.clone();
        if let Err(e) = conn.set_ex::<_, _, ()>(seats_key(studio_id), data, SEATS_TTL_SECONDS).await {
            warn!("Failed to cache seats for studio {}: {:?}", studio_id, e);
        }
    }

    /// Инвалидировать кеш мест одного зала
    pub async fn invalidate_seats(&self, studio_id: i64) {
        let mut conn = self.redis.conn.clone();
        let _: Result<(), _> = conn.del(seats_key(studio_id)).await;
        debug!("Invalidated seats cache for studio {}", studio_id);
    }

    /// Резерв по id мест не знает зал - сбрасываем все схемы
    pub async fn invalidate_all_seats(&self) {
        self.delete_matching("seats:*").await;
    }
}

fn seats_key(studio_id: i64) -> String {
    format!("seats:{}", studio_id)
}
