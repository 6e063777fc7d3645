//! User-based collaborative filtering over the implicit rating matrix.

use super::Recommender;
use crate::error::{RecError, Result};
use crate::models::*;
use crate::services::store::InteractionStore;
use nalgebra::DMatrix;
use rayon::prelude::*;
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::debug;

/// Dense user x item matrix of summed interaction weights.
///
/// Rows follow ascending user id and columns ascending item id.
#[derive(Debug, Clone)]
pub struct RatingMatrix {
    users: Vec<UserId>,
    items: Vec<ItemId>,
    user_index: HashMap<UserId, usize>,
    ratings: DMatrix<f64>,
    norms: Vec<f64>,
}

impl RatingMatrix {
    pub fn from_events(events: &[InteractionEvent]) -> Self {
        let rated: Vec<(&InteractionEvent, f64)> = events
            .iter()
            .filter_map(|event| event.kind.rating_weight().map(|w| (event, w)))
            .collect();

        let users: Vec<UserId> = rated
            .iter()
            .map(|(e, _)| e.user_id)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let items: Vec<ItemId> = rated
            .iter()
            .map(|(e, _)| e.item_id)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let user_index: HashMap<UserId, usize> =
            users.iter().enumerate().map(|(i, u)| (*u, i)).collect();
        let item_index: HashMap<ItemId, usize> =
            items.iter().enumerate().map(|(i, it)| (*it, i)).collect();

        let mut ratings = DMatrix::zeros(users.len(), items.len());
        for (event, weight) in rated {
            ratings[(user_index[&event.user_id], item_index[&event.item_id])] += weight;
        }

        let norms = (0..users.len()).map(|row| ratings.row(row).norm()).collect();

        Self {
            users,
            items,
            user_index,
            ratings,
            norms,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    pub fn users(&self) -> &[UserId] {
        &self.users
    }

    pub fn contains_user(&self, user_id: UserId) -> bool {
        self.user_index.contains_key(&user_id)
    }

    pub fn rating(&self, user_id: UserId, item_id: ItemId) -> f64 {
        match (self.user_index.get(&user_id), self.items.binary_search(&item_id)) {
            (Some(&row), Ok(col)) => self.ratings[(row, col)],
            _ => 0.0,
        }
    }

    /// Cosine similarity of two users' rating rows; 0 when either row is
    /// all zeros.
    pub fn cosine(&self, a: UserId, b: UserId) -> Option<f64> {
        let a = *self.user_index.get(&a)?;
        let b = *self.user_index.get(&b)?;
        Some(self.cosine_rows(a, b))
    }

    fn cosine_rows(&self, a: usize, b: usize) -> f64 {
        let (norm_a, norm_b) = (self.norms[a], self.norms[b]);
        if norm_a == 0.0 || norm_b == 0.0 {
            return 0.0;
        }
        self.ratings.row(a).dot(&self.ratings.row(b)) / (norm_a * norm_b)
    }

    /// Accumulates `similarity * rating` over the neighbours for every item
    /// the neighbour rated and the target user has not. Highest score first,
    /// ties by ascending item id.
    pub fn score_unseen(&self, user_id: UserId, neighbours: &[(UserId, f64)]) -> Vec<(ItemId, f64)> {
        let Some(&target) = self.user_index.get(&user_id) else {
            return Vec::new();
        };

        let mut scores: Vec<Option<f64>> = vec![None; self.items.len()];
        for (neighbour, similarity) in neighbours {
            let Some(&row) = self.user_index.get(neighbour) else {
                continue;
            };
            for col in 0..self.items.len() {
                let rating = self.ratings[(row, col)];
                if rating > 0.0 && self.ratings[(target, col)] <= 0.0 {
                    *scores[col].get_or_insert(0.0) += similarity * rating;
                }
            }
        }

        let mut scored: Vec<(ItemId, f64)> = scores
            .into_iter()
            .enumerate()
            .filter_map(|(col, score)| score.map(|s| (self.items[col], s)))
            .collect();
        crate::utils::sort_scored_desc(&mut scored);
        scored
    }
}

/// Finds the users most similar to a target user.
///
/// Kept behind a trait so a precomputed similarity index can replace the
/// exhaustive scan without touching the orchestrator.
pub trait UserSimilarity: Send + Sync {
    fn similar_users(&self, matrix: &RatingMatrix, user_id: UserId, top_k: usize) -> Vec<(UserId, f64)>;
}

/// Compares the target with every other user on each call.
#[derive(Debug, Clone)]
pub struct ExhaustiveCosine {
    pub threshold: f64,
}

impl ExhaustiveCosine {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }
}

impl UserSimilarity for ExhaustiveCosine {
    fn similar_users(&self, matrix: &RatingMatrix, user_id: UserId, top_k: usize) -> Vec<(UserId, f64)> {
        let Some(&target) = matrix.user_index.get(&user_id) else {
            return Vec::new();
        };

        let mut similar: Vec<(UserId, f64)> = (0..matrix.users.len())
            .into_par_iter()
            .filter(|&row| row != target)
            .map(|row| (matrix.users[row], matrix.cosine_rows(target, row)))
            .filter(|(_, similarity)| *similarity > self.threshold)
            .collect();

        similar.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        similar.truncate(top_k);
        similar
    }
}

pub struct CollaborativeFiltering {
    store: Arc<dyn InteractionStore>,
    similarity: Arc<dyn UserSimilarity>,
    similar_users: usize,
}

impl CollaborativeFiltering {
    pub fn new(store: Arc<dyn InteractionStore>, similarity_threshold: f64, similar_users: usize) -> Self {
        Self {
            store,
            similarity: Arc::new(ExhaustiveCosine::new(similarity_threshold)),
            similar_users,
        }
    }

    pub fn with_similarity(mut self, similarity: Arc<dyn UserSimilarity>) -> Self {
        self.similarity = similarity;
        self
    }
}

/// Pure ranking step: matrix build, neighbour search and scoring.
pub fn recommend_from_events(
    events: &[InteractionEvent],
    similarity: &dyn UserSimilarity,
    user_id: UserId,
    similar_users: usize,
    top_n: usize,
) -> Vec<ItemId> {
    let matrix = RatingMatrix::from_events(events);
    if !matrix.contains_user(user_id) {
        return Vec::new();
    }

    let neighbours = similarity.similar_users(&matrix, user_id, similar_users);
    if neighbours.is_empty() {
        return Vec::new();
    }

    crate::utils::top_ids(&matrix.score_unseen(user_id, &neighbours), top_n)
}

#[async_trait::async_trait]
impl Recommender for CollaborativeFiltering {
    fn name(&self) -> &'static str {
        "collaborative"
    }

    async fn try_recommend(&self, user_id: UserId, top_n: usize) -> Result<Vec<ItemId>> {
        let events = self.store.rating_events().await?;
        debug!(user_id, events = events.len(), "Building rating matrix");

        let similarity = self.similarity.clone();
        let similar_users = self.similar_users;
        tokio::task::spawn_blocking(move || {
            recommend_from_events(&events, similarity.as_ref(), user_id, similar_users, top_n)
        })
        .await
        .map_err(|e| RecError::Internal(format!("collaborative scoring task failed: {}", e)))
    }
}
