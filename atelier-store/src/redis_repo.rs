use redis::{AsyncCommands, RedisResult};

/// Best-effort read cache and rate limiter. Never authoritative: product
/// pages read through it, but every availability decision that matters goes
/// to Postgres.
#[derive(Clone)]
pub struct RedisClient {
    client: redis::Client,
}

impl RedisClient {
    pub async fn new(connection_string: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(connection_string)?;
        Ok(Self { client })
    }

    /// Cache the serialized availability view for a product page. The TTL
    /// bounds staleness if an invalidation is ever missed.
    pub async fn cache_availability(
        &self,
        product_id: &str,
        payload: &str,
        ttl_seconds: u64,
    ) -> RedisResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let key = format!("product:{}:availability", product_id);
        conn.set_ex::<_, _, ()>(key, payload, ttl_seconds).await
    }

    pub async fn get_availability(&self, product_id: &str) -> RedisResult<Option<String>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let key = format!("product:{}:availability", product_id);
        conn.get(key).await
    }

    pub async fn clear_availability(&self, product_id: &str) -> RedisResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let key = format!("product:{}:availability", product_id);
        conn.del(key).await
    }

    pub async fn check_rate_limit(
        &self,
        key: &str,
        limit: i64,
        window_seconds: i64,
    ) -> RedisResult<bool> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let (count,): (i64,) = redis::pipe()
            .atomic()
            .incr(key, 1)
            .expire(key, window_seconds)
            .ignore()
            .query_async(&mut conn)
            .await?;

        Ok(count <= limit)
    }
}
