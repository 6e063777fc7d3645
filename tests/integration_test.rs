use chrono::Duration as ChronoDuration;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tastebud::algorithms::{CollaborativeFiltering, ContentBased, Recommender, ReinforcementRefiner};
use tastebud::services::cache::{CacheKey, InMemoryCache, RecommendationCache};
use tastebud::services::recommendation::RecommendationService;
use tastebud::services::store::{InMemoryStore, InteractionStore};
use tastebud::*;
use tokio_test::assert_ok;

fn days_ago(days: i64) -> chrono::NaiveDateTime {
    chrono::Local::now().naive_local() - ChronoDuration::days(days)
}

/// Six live items, one soft-deleted blockbuster and three users:
/// user 1 likes 1, 2 (type 1) and browsed 3 (type 2);
/// user 2 likes 1, 2, 4 and collected 6;
/// user 3 likes 3 and 5.
fn seeded_store() -> Arc<InMemoryStore> {
    use InteractionKind::*;

    let store = Arc::new(InMemoryStore::new());
    let created = days_ago(2);
    for (id, types, likes) in [(1, "1", 5), (2, "1", 4), (3, "2", 3), (7, "1", 100)] {
        store.insert_item(
            Item::new(id, format!("item {}", id))
                .with_types(types)
                .with_counts(likes, 0, 0)
                .with_create_time(created),
        );
    }
    for (id, types, counts) in [(4, "1", (1, 1, 1)), (5, "2", (1, 1, 1)), (6, "3", (0, 0, 1))] {
        store.insert_item(
            Item::new(id, format!("item {}", id))
                .with_types(types)
                .with_counts(counts.0, counts.1, counts.2)
                .with_create_time(created),
        );
    }
    store.delete_item(7);

    store.record(1, 1, Like);
    store.record(1, 2, Like);
    store.record(1, 3, Browse);
    store.record(2, 1, Like);
    store.record(2, 2, Like);
    store.record(2, 4, Like);
    store.record(2, 6, Collect);
    store.record(3, 3, Like);
    store.record(3, 5, Like);
    store.set_tags(1, "spicy, noodles");
    store
}

fn service_with(
    store: Arc<dyn InteractionStore>,
    cache: Option<Arc<dyn RecommendationCache>>,
    config: Config,
) -> RecommendationService {
    RecommendationService::new(store, cache, Arc::new(config))
}

fn build_service(store: Arc<InMemoryStore>) -> RecommendationService {
    service_with(store, Some(Arc::new(InMemoryCache::new())), Config::default())
}

fn interacted(user_id: UserId) -> HashSet<ItemId> {
    match user_id {
        1 => [1, 2, 3].into_iter().collect(),
        2 => [1, 2, 4, 6].into_iter().collect(),
        3 => [3, 5].into_iter().collect(),
        _ => HashSet::new(),
    }
}

/// Delegates to an in-memory store but cannot read feedback.
struct FeedbackOutage(Arc<InMemoryStore>);

#[async_trait::async_trait]
impl InteractionStore for FeedbackOutage {
    async fn rating_events(&self) -> tastebud::Result<Vec<InteractionEvent>> {
        self.0.rating_events().await
    }

    async fn user_interactions(&self, user_id: UserId) -> tastebud::Result<Vec<TypedInteraction>> {
        self.0.user_interactions(user_id).await
    }

    async fn user_tags(&self, user_id: UserId) -> tastebud::Result<BTreeSet<String>> {
        self.0.user_tags(user_id).await
    }

    async fn candidate_items(&self, limit: usize) -> tastebud::Result<Vec<Item>> {
        self.0.candidate_items(limit).await
    }

    async fn active_items(&self) -> tastebud::Result<Vec<Item>> {
        self.0.active_items().await
    }

    async fn recent_feedback(&self, _user_id: UserId, _limit: usize) -> tastebud::Result<Vec<FeedbackRecord>> {
        Err(RecError::Internal("feedback table locked".into()))
    }

    async fn item_types(&self, ids: &[ItemId]) -> tastebud::Result<HashMap<ItemId, Option<TypeKey>>> {
        self.0.item_types(ids).await
    }
}

/// A cache whose backend is always down.
struct BrokenCache;

#[async_trait::async_trait]
impl RecommendationCache for BrokenCache {
    async fn get_ids(&self, _key: &CacheKey) -> tastebud::Result<Option<Vec<ItemId>>> {
        Err(RecError::Timeout("redis get"))
    }

    async fn put_ids(&self, _key: &CacheKey, _ids: &[ItemId], _ttl: Duration) -> tastebud::Result<()> {
        Err(RecError::Timeout("redis setex"))
    }
}

struct FixedRecommender(Vec<ItemId>);

#[async_trait::async_trait]
impl Recommender for FixedRecommender {
    fn name(&self) -> &'static str {
        "fixed"
    }

    async fn try_recommend(&self, _user_id: UserId, top_n: usize) -> tastebud::Result<Vec<ItemId>> {
        Ok(self.0.iter().copied().take(top_n).collect())
    }
}

#[tokio::test]
async fn test_hybrid_merges_collaborative_then_content() {
    let service = build_service(seeded_store());

    // CF (via user 2): 4 then 6. CB: 4, 5, 6 by type share and engagement.
    let items = assert_ok!(service.get_recommendations(1, Method::Hybrid, Some(10)).await);
    assert_eq!(items, vec![4, 6, 5]);

    let items = assert_ok!(service.get_recommendations(1, Method::Hybrid, Some(2)).await);
    assert_eq!(items, vec![4, 6]);
}

#[tokio::test]
async fn test_single_method_dispatch() {
    let service = build_service(seeded_store());

    let cf = assert_ok!(service.get_recommendations(1, Method::Collaborative, Some(10)).await);
    assert_eq!(cf, vec![4, 6]);

    let cb = assert_ok!(service.get_recommendations(1, Method::Content, Some(10)).await);
    assert_eq!(cb, vec![4, 5, 6]);

    // Popular, minus what user 1 has already seen.
    let popular = assert_ok!(service.get_recommendations(1, Method::Popular, Some(3)).await);
    assert_eq!(popular, vec![4, 5, 6]);
}

#[tokio::test]
async fn test_cold_user_gets_popular_list() {
    let store = seeded_store();
    let cf = CollaborativeFiltering::new(store.clone(), 0.1, 20);
    let cb = ContentBased::new(store.clone(), 200);
    assert!(cf.recommend(99, 10).await.is_empty());
    assert!(cb.recommend(99, 10).await.is_empty());

    let service = build_service(store);
    let hybrid = assert_ok!(service.get_recommendations(99, Method::Hybrid, Some(10)).await);
    let popular = assert_ok!(service.get_popular_items(10).await);
    assert_eq!(hybrid, popular);
    assert_eq!(popular, vec![1, 2, 3, 4, 5, 6]);
}

#[tokio::test]
async fn test_results_are_unique_and_unseen() {
    let service = build_service(seeded_store());

    for user_id in [1, 2, 3] {
        for method in [Method::Collaborative, Method::Content, Method::Hybrid] {
            for top_n in [1, 3, 10] {
                let items = assert_ok!(service.get_recommendations(user_id, method, Some(top_n)).await);
                let unique: HashSet<ItemId> = items.iter().copied().collect();
                assert_eq!(unique.len(), items.len(), "duplicate in {:?}", items);
                assert!(items.len() <= top_n);
                assert!(!items.contains(&7), "soft-deleted item recommended");
                let seen = interacted(user_id);
                assert!(
                    items.iter().all(|id| !seen.contains(id)),
                    "user {} {} returned interacted item: {:?}",
                    user_id,
                    method,
                    items
                );
            }
        }
    }
}

#[tokio::test]
async fn test_repeated_requests_hit_cache() {
    let store = seeded_store();
    let service = build_service(store.clone());

    let first = assert_ok!(service.get_recommendations(1, Method::Hybrid, Some(10)).await);
    let second = assert_ok!(service.get_recommendations(1, Method::Hybrid, Some(10)).await);
    assert_eq!(first, second);

    // New behaviour would change the ranking, but the cached list is served.
    store.record(1, 4, InteractionKind::Like);
    let third = assert_ok!(service.get_recommendations(1, Method::Hybrid, Some(10)).await);
    assert_eq!(first, third);

    // A different key is computed fresh.
    let fresh = assert_ok!(service.get_recommendations(1, Method::Hybrid, Some(9)).await);
    assert!(!fresh.contains(&4));
}

#[tokio::test]
async fn test_popular_on_empty_table() {
    let service = build_service(Arc::new(InMemoryStore::new()));
    let items = assert_ok!(service.get_popular_items(5).await);
    assert!(items.is_empty());
}

#[tokio::test]
async fn test_unknown_method_behaves_as_hybrid() {
    let service = build_service(seeded_store());
    let bogus = Method::parse_or_default(Some("bogus"));
    let from_bogus = assert_ok!(service.get_recommendations(1, bogus, Some(10)).await);
    let hybrid = assert_ok!(service.get_recommendations(1, Method::Hybrid, Some(10)).await);
    assert_eq!(from_bogus, hybrid);
}

#[tokio::test]
async fn test_feedback_filters_and_reranks() {
    let store = seeded_store();
    store.add_feedback(FeedbackRecord::new(1, 5, FeedbackKind::Dislike));
    let service = build_service(store.clone());
    let items = assert_ok!(service.get_recommendations(1, Method::Content, Some(10)).await);
    assert_eq!(items, vec![4, 6]);

    let store = seeded_store();
    store.add_feedback(FeedbackRecord::new(1, 6, FeedbackKind::Like));
    let service = build_service(store);
    let items = assert_ok!(service.get_recommendations(1, Method::Content, Some(10)).await);
    assert_eq!(items, vec![6, 4, 5]);
}

#[tokio::test]
async fn test_disabled_feedback_leaves_list_untouched() {
    let store = seeded_store();
    store.add_feedback(FeedbackRecord::new(1, 5, FeedbackKind::Dislike));
    store.add_feedback(FeedbackRecord::new(1, 6, FeedbackKind::Like));

    let mut config = Config::default();
    config.reinforcement.enabled = false;
    let service = service_with(store, None, config);

    let items = assert_ok!(service.get_recommendations(1, Method::Content, Some(10)).await);
    assert_eq!(items, vec![4, 5, 6]);
}

#[tokio::test]
async fn test_feedback_outage_keeps_unrefined_list() {
    let store = seeded_store();
    store.add_feedback(FeedbackRecord::new(1, 5, FeedbackKind::Dislike));
    let service = service_with(Arc::new(FeedbackOutage(store)), None, Config::default());

    let items = assert_ok!(service.get_recommendations(1, Method::Content, Some(10)).await);
    assert_eq!(items, vec![4, 5, 6]);
}

#[tokio::test]
async fn test_broken_cache_is_a_miss() {
    let service = service_with(seeded_store(), Some(Arc::new(BrokenCache)), Config::default());
    let items = assert_ok!(service.get_recommendations(1, Method::Hybrid, Some(10)).await);
    assert_eq!(items, vec![4, 6, 5]);
    let popular = assert_ok!(service.get_popular_items(2).await);
    assert_eq!(popular, vec![1, 2]);
}

#[tokio::test]
async fn test_database_outage_surfaces_error() {
    let store = seeded_store();
    store.set_unavailable(true);
    let service = build_service(store);

    let result = service.get_recommendations(1, Method::Hybrid, Some(10)).await;
    let err = result.expect_err("no data source should mean no answer");
    assert_eq!(err.status_code(), 500);
}

#[tokio::test]
async fn test_collaborative_source_is_swappable() {
    let service = build_service(seeded_store()).with_collaborative(Arc::new(FixedRecommender(vec![6, 5])));
    let items = assert_ok!(service.get_recommendations(1, Method::Hybrid, Some(10)).await);
    assert_eq!(items, vec![6, 5, 4]);
}

#[tokio::test]
async fn test_cache_keys_written() {
    let store = seeded_store();
    let cache = Arc::new(InMemoryCache::new());
    let service = service_with(store, Some(cache.clone()), Config::default());

    assert_ok!(service.get_recommendations(99, Method::Content, Some(4)).await);
    let key = CacheKey::Recommendations {
        user_id: 99,
        method: Method::Content,
        top_n: 4,
    };
    assert_eq!(assert_ok!(cache.get_ids(&key).await), Some(vec![1, 2, 3, 4]));
    let popular = CacheKey::PopularItems { top_n: 4 };
    assert_eq!(assert_ok!(cache.get_ids(&popular).await), Some(vec![1, 2, 3, 4]));
}

#[tokio::test]
async fn test_refiner_stages_share_one_profile() {
    let store = seeded_store();
    store.add_feedback(FeedbackRecord::new(1, 5, FeedbackKind::Dislike));
    store.add_feedback(FeedbackRecord::new(1, 6, FeedbackKind::Like));
    let refiner = ReinforcementRefiner::new(store, 0.1, 0.2, 100);

    assert_eq!(assert_ok!(refiner.apply_rl_filtering(&[4, 5, 6], 1).await), vec![4, 6]);
    assert_eq!(assert_ok!(refiner.apply_rl_scoring(&[4, 5, 6], 1).await), vec![6, 4, 5]);
    assert_eq!(assert_ok!(refiner.refine(&[4, 5, 6], 1).await), vec![6, 4]);

    // Users without feedback pass through untouched.
    assert_eq!(assert_ok!(refiner.refine(&[5, 4], 2).await), vec![5, 4]);
    assert_eq!(refiner.exploration_rate(), 0.2);
}

#[tokio::test]
async fn test_oversized_top_n_is_clamped() {
    let cache = Arc::new(InMemoryCache::new());
    let service = service_with(seeded_store(), Some(cache.clone()), Config::default());

    let items = assert_ok!(service.get_recommendations(1, Method::Hybrid, Some(usize::MAX)).await);
    assert_eq!(items, vec![4, 6, 5]);
    let key = CacheKey::Recommendations {
        user_id: 1,
        method: Method::Hybrid,
        top_n: 1000,
    };
    assert_eq!(assert_ok!(cache.get_ids(&key).await), Some(vec![4, 6, 5]));

    let popular = assert_ok!(service.get_popular_items(usize::MAX).await);
    assert_eq!(popular, vec![1, 2, 3, 4, 5, 6]);

    let response = service
        .recommendation_response(Some("1"), Some("hybrid"), Some("9223372036854775807"))
        .await;
    assert_eq!(response.code, 200);
    assert_eq!(response.data, Some(vec![4, 6, 5]));
}

#[tokio::test]
async fn test_envelope_reports_bad_arguments_as_400() {
    let service = build_service(seeded_store());

    for user_id in [None, Some("abc"), Some("0"), Some("-4")] {
        let response = service.recommendation_response(user_id, None, None).await;
        assert_eq!(response.code, 400, "user_id {:?}", user_id);
        assert!(response.data.is_none());
        assert!(response.message.contains("user_id"));
    }

    let response = service.recommendation_response(Some("1"), None, Some("ten")).await;
    assert_eq!(response.code, 400);
    assert!(response.message.contains("top_n"));

    // The popular entry point is lenient about top_n.
    let response = service.popular_response(Some("ten")).await;
    assert_eq!(response.code, 200);
    assert_eq!(response.data, Some(vec![1, 2, 3, 4, 5, 6]));
}

#[tokio::test]
async fn test_envelope_reports_internal_failure_as_500() {
    let store = seeded_store();
    store.set_unavailable(true);
    let service = build_service(store);

    let response = service.recommendation_response(Some("1"), Some("cf"), Some("5")).await;
    assert_eq!(response.code, 500);
    assert!(response.data.is_none());
    assert!(response.message.starts_with("Internal server error"));

    let response = service.popular_response(None).await;
    assert_eq!(response.code, 500);
}

#[tokio::test]
async fn test_empty_popular_envelope_is_success() {
    let service = build_service(Arc::new(InMemoryStore::new()));

    let response = service.popular_response(Some("5")).await;
    let json = assert_ok!(serde_json::to_value(&response));
    assert_eq!(
        json,
        serde_json::json!({"code": 200, "data": [], "message": "success"})
    );
}

#[tokio::test]
async fn test_filtered_popular_fallback_skips_shared_cache() {
    let cache = Arc::new(InMemoryCache::new());
    let service = service_with(seeded_store(), Some(cache.clone()), Config::default());

    // User 3 has history but no neighbour above the threshold.
    let items = assert_ok!(service.get_recommendations(3, Method::Collaborative, Some(2)).await);
    assert_eq!(items, vec![1, 2]);

    let oversized = CacheKey::PopularItems { top_n: 4 };
    assert_eq!(assert_ok!(cache.get_ids(&oversized).await), None);
    assert_eq!(cache.len(), 1);
}
