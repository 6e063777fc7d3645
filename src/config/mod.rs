use crate::error::{RecError, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

/// Environment prefix for nested overrides, e.g. `TASTEBUD__REDIS__HOST`.
pub const ENV_PREFIX: &str = "TASTEBUD";

/// Flat variable names understood by the deployed service, mapped onto the
/// nested configuration keys.
const LEGACY_ENV_KEYS: &[(&str, &str)] = &[
    ("DB_HOST", "database.host"),
    ("DB_PORT", "database.port"),
    ("DB_USER", "database.user"),
    ("DB_PASSWORD", "database.password"),
    ("DB_NAME", "database.name"),
    ("DB_POOL_SIZE", "database.pool_size"),
    ("DB_MAX_OVERFLOW", "database.max_overflow"),
    ("DB_POOL_RECYCLE", "database.pool_recycle_secs"),
    ("REDIS_HOST", "redis.host"),
    ("REDIS_PORT", "redis.port"),
    ("REDIS_PASSWORD", "redis.password"),
    ("REDIS_DB", "redis.db"),
    ("RECOMMENDATION_COUNT", "recommendation.count"),
    ("CACHE_EXPIRE_TIME", "recommendation.cache_expire_secs"),
    ("SIMILARITY_THRESHOLD", "recommendation.similarity_threshold"),
    ("RL_LEARNING_RATE", "reinforcement.learning_rate"),
    ("RL_EXPLORATION_RATE", "reinforcement.exploration_rate"),
    ("RL_ENABLED", "reinforcement.enabled"),
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub recommendation: RecommendationConfig,
    pub reinforcement: ReinforcementConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub workers: usize,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| RecError::InvalidConfig(format!("invalid server address: {}", e)))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub name: String,
    pub pool_size: u32,
    pub max_overflow: u32,
    pub pool_recycle_secs: u64,
    pub acquire_timeout_secs: u64,
}

impl DatabaseConfig {
    pub fn url(&self) -> String {
        format!(
            "mysql://{}:{}@{}:{}/{}?charset=utf8mb4",
            self.user, self.password, self.host, self.port, self.name
        )
    }

    pub fn max_connections(&self) -> u32 {
        self.pool_size + self.max_overflow
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    pub host: String,
    pub port: u16,
    pub password: Option<String>,
    pub db: i64,
    pub connect_timeout_secs: u64,
    pub response_timeout_secs: u64,
}

impl RedisConfig {
    pub fn url(&self) -> String {
        match self.password.as_deref().filter(|p| !p.is_empty()) {
            Some(password) => format!("redis://:{}@{}:{}/{}", password, self.host, self.port, self.db),
            None => format!("redis://{}:{}/{}", self.host, self.port, self.db),
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_secs(self.response_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendationConfig {
    /// Default list length when the caller does not ask for one.
    pub count: usize,
    pub cache_expire_secs: u64,
    pub popular_cache_secs: u64,
    pub similarity_threshold: f64,
    pub similar_users: usize,
    pub candidate_limit: usize,
    pub feedback_window: usize,
    /// Upper bound on any requested list length.
    pub max_top_n: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReinforcementConfig {
    pub enabled: bool,
    pub learning_rate: f64,
    /// Read for compatibility; not consumed by the scoring path.
    pub exploration_rate: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
                workers: num_cpus::get(),
            },
            database: DatabaseConfig {
                host: "localhost".to_string(),
                port: 3306,
                user: "root".to_string(),
                password: String::new(),
                name: "jxwq_end".to_string(),
                pool_size: 5,
                max_overflow: 10,
                pool_recycle_secs: 3600,
                acquire_timeout_secs: 5,
            },
            redis: RedisConfig {
                host: "localhost".to_string(),
                port: 6379,
                password: None,
                db: 0,
                connect_timeout_secs: 5,
                response_timeout_secs: 5,
            },
            recommendation: RecommendationConfig {
                count: 20,
                cache_expire_secs: 3600,
                popular_cache_secs: 1800,
                similarity_threshold: 0.1,
                similar_users: 20,
                candidate_limit: 200,
                feedback_window: 100,
                max_top_n: 1000,
            },
            reinforcement: ReinforcementConfig {
                enabled: true,
                learning_rate: 0.1,
                exploration_rate: 0.2,
            },
        }
    }
}

impl Config {
    pub fn from_file(path: &str) -> Result<Self> {
        Self::load(Some(path))
    }

    /// Layers defaults, an optional config file, `TASTEBUD__*` variables and
    /// the legacy flat variables, in increasing precedence.
    pub fn load(path: Option<&str>) -> Result<Self> {
        dotenvy::dotenv().ok();

        let mut builder = config::Config::builder()
            .add_source(config::Config::try_from(&Config::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__"),
        );

        for (var, key) in LEGACY_ENV_KEYS {
            builder = builder.set_override_option(*key, std::env::var(var).ok())?;
        }

        let config: Config = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let rec = &self.recommendation;
        if rec.count == 0 {
            return Err(RecError::InvalidConfig("recommendation.count must be positive".into()));
        }
        if rec.cache_expire_secs == 0 || rec.popular_cache_secs == 0 {
            return Err(RecError::InvalidConfig("cache TTLs must be positive".into()));
        }
        if rec.similar_users == 0 || rec.candidate_limit == 0 || rec.feedback_window == 0 {
            return Err(RecError::InvalidConfig(
                "similar_users, candidate_limit and feedback_window must be positive".into(),
            ));
        }
        if rec.max_top_n < rec.count {
            return Err(RecError::InvalidConfig("max_top_n must be at least count".into()));
        }
        if !rec.similarity_threshold.is_finite() {
            return Err(RecError::InvalidConfig("similarity_threshold must be finite".into()));
        }

        let rl = &self.reinforcement;
        if !rl.learning_rate.is_finite() || !rl.exploration_rate.is_finite() {
            return Err(RecError::InvalidConfig("reinforcement rates must be finite".into()));
        }

        if self.database.max_connections() == 0 {
            return Err(RecError::InvalidConfig("database pool must allow a connection".into()));
        }

        Ok(())
    }
}
