use crate::algorithms::popularity::rank_popular;
use crate::algorithms::{CollaborativeFiltering, ContentBased, Recommender, ReinforcementRefiner};
use crate::config::Config;
use crate::error::Result;
use crate::models::*;
use crate::services::cache::{CacheKey, RecommendationCache};
use crate::services::store::InteractionStore;
use crate::utils::validation::{top_n_or_default, validate_recommendation_args};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Collaborative ids first, then content ids not already present, capped at
/// `top_n`.
pub fn merge_hybrid(collaborative: &[ItemId], content: &[ItemId], top_n: usize) -> Vec<ItemId> {
    let mut seen = HashSet::with_capacity(collaborative.len() + content.len());
    collaborative
        .iter()
        .chain(content.iter())
        .copied()
        .filter(|id| seen.insert(*id))
        .take(top_n)
        .collect()
}

/// Combines collaborative, content and popularity rankings, refines them
/// with explicit feedback and caches the result per (user, method, top_n).
pub struct RecommendationService {
    store: Arc<dyn InteractionStore>,
    cache: Option<Arc<dyn RecommendationCache>>,
    collaborative: Arc<dyn Recommender>,
    content: Arc<dyn Recommender>,
    refiner: ReinforcementRefiner,
    config: Arc<Config>,
}

impl RecommendationService {
    pub fn new(
        store: Arc<dyn InteractionStore>,
        cache: Option<Arc<dyn RecommendationCache>>,
        config: Arc<Config>,
    ) -> Self {
        let rec = &config.recommendation;
        let rl = &config.reinforcement;

        let collaborative = Arc::new(CollaborativeFiltering::new(
            store.clone(),
            rec.similarity_threshold,
            rec.similar_users,
        ));
        let content = Arc::new(ContentBased::new(store.clone(), rec.candidate_limit));
        let refiner = ReinforcementRefiner::new(
            store.clone(),
            rl.learning_rate,
            rl.exploration_rate,
            rec.feedback_window,
        );

        Self {
            store,
            cache,
            collaborative,
            content,
            refiner,
            config,
        }
    }

    pub fn with_collaborative(mut self, recommender: Arc<dyn Recommender>) -> Self {
        self.collaborative = recommender;
        self
    }

    pub fn with_content(mut self, recommender: Arc<dyn Recommender>) -> Self {
        self.content = recommender;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn default_top_n(&self) -> usize {
        self.config.recommendation.count
    }

    /// Zero means "use the default"; anything above the configured maximum
    /// is clamped to it.
    fn bounded_top_n(&self, top_n: Option<usize>) -> usize {
        top_n
            .filter(|n| *n > 0)
            .unwrap_or_else(|| self.default_top_n())
            .min(self.config.recommendation.max_top_n)
    }

    /// Validates raw caller arguments, serves the request and wraps the
    /// outcome in the response envelope. An empty answer is replaced by the
    /// popular list.
    pub async fn recommendation_response(
        &self,
        user_id: Option<&str>,
        method: Option<&str>,
        top_n: Option<&str>,
    ) -> ApiResponse<Vec<ItemId>> {
        let result = match validate_recommendation_args(user_id, method, top_n, self.default_top_n()) {
            Ok(args) => match self
                .get_recommendations(args.user_id, args.method, Some(args.top_n))
                .await
            {
                Ok(items) if items.is_empty() => self.get_popular_items(args.top_n).await,
                other => other,
            },
            Err(e) => Err(e),
        };
        ApiResponse::from_result(result)
    }

    /// Popular list envelope. An unusable `top_n` falls back to the default.
    pub async fn popular_response(&self, top_n: Option<&str>) -> ApiResponse<Vec<ItemId>> {
        let top_n = top_n_or_default(top_n, self.default_top_n());
        ApiResponse::from_result(self.get_popular_items(top_n).await)
    }

    pub async fn get_recommendations(
        &self,
        user_id: UserId,
        method: Method,
        top_n: Option<usize>,
    ) -> Result<Vec<ItemId>> {
        let top_n = self.bounded_top_n(top_n);
        let key = CacheKey::Recommendations { user_id, method, top_n };

        if let Some(cached) = self.cached(&key).await {
            debug!(user_id, %method, top_n, "Recommendation cache hit");
            return Ok(cached);
        }

        match self.compute(user_id, method, top_n).await {
            Ok(items) => {
                if !items.is_empty() {
                    let ttl = Duration::from_secs(self.config.recommendation.cache_expire_secs);
                    self.store_cached(&key, &items, ttl).await;
                }
                info!(user_id, %method, top_n, count = items.len(), "Served recommendations");
                Ok(items)
            }
            Err(e) => {
                error!(user_id, %method, error = %e, "Recommendation failed, serving popular items");
                self.get_popular_items(top_n).await
            }
        }
    }

    async fn compute(&self, user_id: UserId, method: Method, top_n: usize) -> Result<Vec<ItemId>> {
        let mut items = match method {
            Method::Collaborative => self.collaborative.recommend(user_id, top_n).await,
            Method::Content => self.content.recommend(user_id, top_n).await,
            Method::Hybrid => {
                let (cf, cb) = futures::join!(
                    self.collaborative.recommend(user_id, top_n),
                    self.content.recommend(user_id, top_n)
                );
                merge_hybrid(&cf, &cb, top_n)
            }
            Method::Popular => self.popular_for_user(user_id, top_n).await?,
        };

        if items.is_empty() {
            debug!(user_id, %method, "No personalised items, falling back to popular");
            items = self.popular_for_user(user_id, top_n).await?;
        }

        if self.config.reinforcement.enabled && !items.is_empty() {
            match self.refiner.refine(&items, user_id).await {
                Ok(mut refined) => {
                    refined.truncate(top_n);
                    items = refined;
                }
                Err(e) => {
                    warn!(user_id, error = %e, "Feedback refinement failed, keeping unrefined list");
                }
            }
        }

        Ok(items)
    }

    /// Items ranked by recency-weighted engagement, shared by all users.
    pub async fn get_popular_items(&self, top_n: usize) -> Result<Vec<ItemId>> {
        let top_n = self.bounded_top_n(Some(top_n));
        let key = CacheKey::PopularItems { top_n };
        if let Some(cached) = self.cached(&key).await {
            return Ok(cached);
        }

        let popular = self.rank_active(top_n).await?;
        if popular.is_empty() {
            return Ok(popular);
        }

        let ttl = Duration::from_secs(self.config.recommendation.popular_cache_secs);
        self.store_cached(&key, &popular, ttl).await;

        Ok(popular)
    }

    async fn rank_active(&self, top_n: usize) -> Result<Vec<ItemId>> {
        let items = self.store.active_items().await?;
        if items.is_empty() {
            return Ok(Vec::new());
        }

        let now = chrono::Local::now().naive_local();
        Ok(rank_popular(&items, now, top_n))
    }

    /// Popular items minus the ones the user already interacted with. Only
    /// the history-free case shares the cached popular list; the filtered
    /// ranking is cached under the caller's recommendation key instead.
    async fn popular_for_user(&self, user_id: UserId, top_n: usize) -> Result<Vec<ItemId>> {
        let seen: HashSet<ItemId> = self
            .store
            .user_interactions(user_id)
            .await?
            .into_iter()
            .map(|interaction| interaction.item_id)
            .collect();

        if seen.is_empty() {
            return self.get_popular_items(top_n).await;
        }

        let popular = self.rank_active(top_n.saturating_add(seen.len())).await?;
        Ok(popular
            .into_iter()
            .filter(|id| !seen.contains(id))
            .take(top_n)
            .collect())
    }

    async fn cached(&self, key: &CacheKey) -> Option<Vec<ItemId>> {
        let cache = self.cache.as_ref()?;
        match cache.get_ids(key).await {
            Ok(hit) => hit,
            Err(e) => {
                error!(key = %key, error = %e, "Failed to read from cache");
                None
            }
        }
    }

    async fn store_cached(&self, key: &CacheKey, items: &[ItemId], ttl: Duration) {
        if let Some(cache) = &self.cache {
            if let Err(e) = cache.put_ids(key, items, ttl).await {
                error!(key = %key, error = %e, "Failed to write to cache");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_prefers_collaborative_order() {
        assert_eq!(merge_hybrid(&[3, 1], &[1, 7, 8], 10), vec![3, 1, 7, 8]);
        assert_eq!(merge_hybrid(&[3, 1], &[1, 7, 8], 3), vec![3, 1, 7]);
        assert_eq!(merge_hybrid(&[3, 1, 2], &[9], 3), vec![3, 1, 2]);
        assert_eq!(merge_hybrid(&[], &[5, 5, 6], 10), vec![5, 6]);
        assert!(merge_hybrid(&[], &[], 10).is_empty());
    }

    #[test]
    fn test_merge_with_unbounded_top_n() {
        assert_eq!(merge_hybrid(&[3, 1], &[1, 7], usize::MAX), vec![3, 1, 7]);
    }
}
