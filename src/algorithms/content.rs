//! Content-based filtering: type preferences from history, blended with
//! global engagement.

use super::Recommender;
use crate::error::Result;
use crate::models::*;
use crate::services::store::InteractionStore;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

const TYPE_WEIGHT: f64 = 0.6;
const POPULARITY_WEIGHT: f64 = 0.4;

/// What a user's history says about their taste.
#[derive(Debug, Clone, Default)]
pub struct ContentProfile {
    /// Self-declared tags. Loaded with the profile but not part of the score.
    pub tags: BTreeSet<String>,
    /// Share of the user's weighted interactions per item type, in [0, 1].
    pub type_weights: HashMap<TypeKey, f64>,
    pub interacted: HashSet<ItemId>,
}

impl ContentProfile {
    pub fn from_history(interactions: &[TypedInteraction], tags: BTreeSet<String>) -> Self {
        let mut type_scores: HashMap<TypeKey, f64> = HashMap::new();
        let mut total = 0.0;

        for interaction in interactions {
            let weight = interaction.kind.preference_weight();
            total += weight;
            if let Some(item_type) = &interaction.item_type {
                *type_scores.entry(item_type.clone()).or_default() += weight;
            }
        }

        let type_weights = if total > 0.0 {
            type_scores
                .into_iter()
                .map(|(item_type, score)| (item_type, score / total))
                .collect()
        } else {
            HashMap::new()
        };

        Self {
            tags,
            type_weights,
            interacted: interactions.iter().map(|i| i.item_id).collect(),
        }
    }

    pub fn type_weight(&self, item_type: Option<&TypeKey>) -> f64 {
        item_type
            .and_then(|t| self.type_weights.get(t))
            .copied()
            .unwrap_or(0.0)
    }

    pub fn score(&self, item: &Item) -> f64 {
        let popularity = item.engagement().max(0) as f64;
        self.type_weight(item.type_child_ids.as_ref()) * TYPE_WEIGHT
            + popularity.ln_1p() * POPULARITY_WEIGHT
    }

    /// Ranks the candidates the user has not interacted with.
    pub fn rank(&self, candidates: &[Item], top_n: usize) -> Vec<ItemId> {
        let mut scored: Vec<(ItemId, f64)> = candidates
            .iter()
            .filter(|item| !self.interacted.contains(&item.id))
            .map(|item| (item.id, self.score(item)))
            .collect();

        crate::utils::sort_scored_desc(&mut scored);
        crate::utils::top_ids(&crate::utils::dedup_scored(&scored), top_n)
    }
}

pub struct ContentBased {
    store: Arc<dyn InteractionStore>,
    candidate_limit: usize,
}

impl ContentBased {
    pub fn new(store: Arc<dyn InteractionStore>, candidate_limit: usize) -> Self {
        Self {
            store,
            candidate_limit,
        }
    }

    /// Candidate pool scales with the request but never exceeds the limit.
    pub fn pool_size(&self, top_n: usize) -> usize {
        self.candidate_limit.min(top_n.saturating_mul(10))
    }

    pub async fn load_profile(&self, user_id: UserId) -> Result<ContentProfile> {
        let tags = self.store.user_tags(user_id).await?;
        let history = self.store.user_interactions(user_id).await?;
        Ok(ContentProfile::from_history(&history, tags))
    }
}

#[async_trait::async_trait]
impl Recommender for ContentBased {
    fn name(&self) -> &'static str {
        "content"
    }

    async fn try_recommend(&self, user_id: UserId, top_n: usize) -> Result<Vec<ItemId>> {
        let profile = self.load_profile(user_id).await?;
        if profile.interacted.is_empty() {
            // No history, nothing to personalise; the caller serves popular items.
            return Ok(Vec::new());
        }

        let candidates = self.store.candidate_items(self.pool_size(top_n)).await?;
        debug!(
            user_id,
            types = profile.type_weights.len(),
            candidates = candidates.len(),
            "Scoring content candidates"
        );

        Ok(profile.rank(&candidates, top_n))
    }
}
