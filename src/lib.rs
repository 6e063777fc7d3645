pub mod algorithms;
pub mod config;
pub mod error;
pub mod models;
pub mod services;
pub mod utils;

pub use config::Config;
pub use error::{RecError, Result};
pub use models::*;

use services::cache::{RecommendationCache, RedisCache};
use services::recommendation::RecommendationService;
use services::store::{InteractionStore, MySqlStore};
use std::sync::Arc;
use tracing::{error, info};

/// Long-lived services, built once per process and shared by handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn InteractionStore>,
    pub cache: Option<Arc<dyn RecommendationCache>>,
    pub recommendation_service: Arc<RecommendationService>,
}

impl AppState {
    /// Connects to MySQL and Redis. A Redis outage disables caching rather
    /// than failing start-up.
    pub async fn new(config: Config) -> Result<Self> {
        let config = Arc::new(config);

        let store: Arc<dyn InteractionStore> = Arc::new(MySqlStore::connect(&config.database).await?);

        let cache: Option<Arc<dyn RecommendationCache>> = match RedisCache::connect(&config.redis).await {
            Ok(cache) => Some(Arc::new(cache)),
            Err(e) => {
                error!("Redis unavailable, running without cache: {}", e);
                None
            }
        };

        Ok(Self::with_services(config, store, cache))
    }

    pub fn with_services(
        config: Arc<Config>,
        store: Arc<dyn InteractionStore>,
        cache: Option<Arc<dyn RecommendationCache>>,
    ) -> Self {
        let recommendation_service = Arc::new(RecommendationService::new(
            store.clone(),
            cache.clone(),
            config.clone(),
        ));

        info!(
            cache = cache.is_some(),
            reinforcement = config.reinforcement.enabled,
            "Recommendation services ready"
        );

        Self {
            config,
            store,
            cache,
            recommendation_service,
        }
    }
}

/// Installs the global subscriber, writing to stderr. `RUST_LOG` overrides
/// `default_directive`.
pub fn init_tracing(default_directive: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
