use redis::{aio::MultiplexedConnection, Client};

#[derive(Clone)]
pub struct RedisClient {
    pub conn: MultiplexedConnection,
}

impl RedisClient {
    pub async fn connect(redis_url: &str) -> redis::RedisResult<Self> {
        let client = Client::open(redis_url)?;
        let mut conn = client.get_multiplexed_tokio_connection().await?;
        // Недоступный Redis лучше обнаружить при старте
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(RedisClient { conn })
    }
}
