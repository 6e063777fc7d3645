//! Feedback-driven refinement of a ranked list.
//!
//! Explicit like/dislike feedback removes disliked items and shifts items up
//! or down by a learned per-type weight. This is a linear adjustment, not a
//! policy: rewards come from the feedback records as-is.

use crate::error::Result;
use crate::models::*;
use crate::services::store::InteractionStore;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

const BASE_SCORE: f64 = 1.0;
const LIKED_TYPE_BONUS: f64 = 0.5;
const DISLIKED_TYPE_PENALTY: f64 = 0.3;

#[derive(Debug, Clone, Default)]
pub struct FeedbackProfile {
    pub liked_items: HashSet<ItemId>,
    pub disliked_items: HashSet<ItemId>,
    pub liked_types: HashMap<TypeKey, f64>,
    pub disliked_types: HashMap<TypeKey, f64>,
    pub type_weights: HashMap<TypeKey, f64>,
}

impl FeedbackProfile {
    pub fn from_records(records: &[FeedbackRecord], learning_rate: f64) -> Self {
        let mut profile = Self::default();

        for record in records {
            match record.kind {
                FeedbackKind::Like => {
                    profile.liked_items.insert(record.item_id);
                    if let Some(item_type) = &record.item_type {
                        *profile.liked_types.entry(item_type.clone()).or_default() += record.reward;
                        *profile.type_weights.entry(item_type.clone()).or_default() +=
                            record.reward * learning_rate;
                    }
                }
                FeedbackKind::Dislike => {
                    profile.disliked_items.insert(record.item_id);
                    if let Some(item_type) = &record.item_type {
                        let penalty = record.reward.abs();
                        *profile.disliked_types.entry(item_type.clone()).or_default() += penalty;
                        *profile.type_weights.entry(item_type.clone()).or_default() -=
                            penalty * learning_rate;
                    }
                }
            }
        }

        profile
    }

    /// Drops disliked items, unless that would remove more than half of the
    /// list; then the list is returned untouched.
    pub fn filter(&self, items: &[ItemId]) -> Vec<ItemId> {
        let kept: Vec<ItemId> = items
            .iter()
            .copied()
            .filter(|id| !self.disliked_items.contains(id))
            .collect();

        if (kept.len() as f64) < items.len() as f64 * 0.5 {
            items.to_vec()
        } else {
            kept
        }
    }

    pub fn score(&self, item_type: Option<&TypeKey>) -> f64 {
        let mut score = BASE_SCORE;
        if let Some(item_type) = item_type {
            if let Some(weight) = self.type_weights.get(item_type) {
                score += weight;
            }
            if let Some(liked) = self.liked_types.get(item_type) {
                score += liked * LIKED_TYPE_BONUS;
            }
            if let Some(disliked) = self.disliked_types.get(item_type) {
                score -= disliked * DISLIKED_TYPE_PENALTY;
            }
        }
        score
    }

    /// Re-sorts the list by feedback score; equal scores keep their order.
    pub fn rerank(&self, items: &[ItemId], types: &HashMap<ItemId, Option<TypeKey>>) -> Vec<ItemId> {
        if self.type_weights.is_empty() || items.is_empty() || types.is_empty() {
            return items.to_vec();
        }

        let mut scored: Vec<(ItemId, f64)> = items
            .iter()
            .map(|id| (*id, self.score(types.get(id).and_then(Option::as_ref))))
            .collect();
        crate::utils::sort_scored_desc(&mut scored);
        scored.into_iter().map(|(id, _)| id).collect()
    }
}

pub struct ReinforcementRefiner {
    store: Arc<dyn InteractionStore>,
    learning_rate: f64,
    exploration_rate: f64,
    feedback_window: usize,
}

impl ReinforcementRefiner {
    pub fn new(store: Arc<dyn InteractionStore>, learning_rate: f64, exploration_rate: f64, feedback_window: usize) -> Self {
        Self {
            store,
            learning_rate,
            exploration_rate,
            feedback_window,
        }
    }

    /// Configured exploration rate. Exploration is not applied when ranking.
    pub fn exploration_rate(&self) -> f64 {
        self.exploration_rate
    }

    pub async fn load_profile(&self, user_id: UserId) -> Result<FeedbackProfile> {
        let records = self.store.recent_feedback(user_id, self.feedback_window).await?;
        Ok(FeedbackProfile::from_records(&records, self.learning_rate))
    }

    pub async fn apply_rl_filtering(&self, items: &[ItemId], user_id: UserId) -> Result<Vec<ItemId>> {
        Ok(self.load_profile(user_id).await?.filter(items))
    }

    pub async fn apply_rl_scoring(&self, items: &[ItemId], user_id: UserId) -> Result<Vec<ItemId>> {
        let profile = self.load_profile(user_id).await?;
        self.score_with(&profile, items).await
    }

    /// Filtering followed by scoring, sharing one feedback lookup.
    pub async fn refine(&self, items: &[ItemId], user_id: UserId) -> Result<Vec<ItemId>> {
        let profile = self.load_profile(user_id).await?;
        debug!(
            user_id,
            disliked = profile.disliked_items.len(),
            types = profile.type_weights.len(),
            "Applying feedback refinement"
        );

        let filtered = profile.filter(items);
        self.score_with(&profile, &filtered).await
    }

    async fn score_with(&self, profile: &FeedbackProfile, items: &[ItemId]) -> Result<Vec<ItemId>> {
        if profile.type_weights.is_empty() || items.is_empty() {
            return Ok(items.to_vec());
        }

        let types = self.store.item_types(items).await?;
        Ok(profile.rerank(items, &types))
    }
}
