use crate::config::RedisConfig;
use crate::error::{RecError, Result};
use crate::models::{ItemId, Method, UserId};
use dashmap::DashMap;
use redis::AsyncCommands;
use std::fmt::{self, Display};
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKey {
    Recommendations {
        user_id: UserId,
        method: Method,
        top_n: usize,
    },
    PopularItems {
        top_n: usize,
    },
}

impl Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheKey::Recommendations { user_id, method, top_n } => {
                write!(f, "recommendations:{}:{}:{}", user_id, method, top_n)
            }
            CacheKey::PopularItems { top_n } => write!(f, "popular_items:{}", top_n),
        }
    }
}

/// Key-value store for ranked id lists with a per-entry TTL.
#[async_trait::async_trait]
pub trait RecommendationCache: Send + Sync {
    async fn get_ids(&self, key: &CacheKey) -> Result<Option<Vec<ItemId>>>;
    async fn put_ids(&self, key: &CacheKey, ids: &[ItemId], ttl: Duration) -> Result<()>;
}

pub struct RedisCache {
    client: redis::Client,
    connect_timeout: Duration,
    response_timeout: Duration,
}

impl RedisCache {
    /// Opens the client and checks the server answers `PING`.
    pub async fn connect(config: &RedisConfig) -> Result<Self> {
        let cache = Self {
            client: redis::Client::open(config.url())?,
            connect_timeout: config.connect_timeout(),
            response_timeout: config.response_timeout(),
        };

        let mut conn = cache.connection().await?;
        let _: String = cache
            .bounded("redis ping", redis::cmd("PING").query_async(&mut conn))
            .await?;

        info!("Connected to Redis at {}:{} (db {})", config.host, config.port, config.db);
        Ok(cache)
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection> {
        match tokio::time::timeout(
            self.connect_timeout,
            self.client.get_multiplexed_async_connection(),
        )
        .await
        {
            Ok(conn) => Ok(conn?),
            Err(_) => Err(RecError::Timeout("redis connect")),
        }
    }

    async fn bounded<T, F>(&self, what: &'static str, fut: F) -> Result<T>
    where
        F: Future<Output = redis::RedisResult<T>>,
    {
        match tokio::time::timeout(self.response_timeout, fut).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(RecError::Timeout(what)),
        }
    }
}

#[async_trait::async_trait]
impl RecommendationCache for RedisCache {
    async fn get_ids(&self, key: &CacheKey) -> Result<Option<Vec<ItemId>>> {
        let mut conn = self.connection().await?;
        let cached: Option<String> = self.bounded("redis get", conn.get(key.to_string())).await?;

        match cached {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn put_ids(&self, key: &CacheKey, ids: &[ItemId], ttl: Duration) -> Result<()> {
        let json = serde_json::to_string(ids)?;
        let mut conn = self.connection().await?;
        let mut cmd = redis::cmd("SET");
        cmd.arg(key.to_string())
            .arg(json)
            .arg("EX")
            .arg(ttl.as_secs().max(1));
        self.bounded("redis setex", cmd.query_async::<_, ()>(&mut conn))
            .await?;
        Ok(())
    }
}

/// Process-local cache; expired entries are dropped on read.
#[derive(Default)]
pub struct InMemoryCache {
    entries: DashMap<String, (Vec<ItemId>, Instant)>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait::async_trait]
impl RecommendationCache for InMemoryCache {
    async fn get_ids(&self, key: &CacheKey) -> Result<Option<Vec<ItemId>>> {
        let key = key.to_string();
        let hit = self.entries.get(&key).map(|entry| entry.value().clone());

        match hit {
            Some((ids, expires_at)) if Instant::now() < expires_at => Ok(Some(ids)),
            Some(_) => {
                self.entries.remove(&key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn put_ids(&self, key: &CacheKey, ids: &[ItemId], ttl: Duration) -> Result<()> {
        self.entries
            .insert(key.to_string(), (ids.to_vec(), Instant::now() + ttl));
        Ok(())
    }
}
