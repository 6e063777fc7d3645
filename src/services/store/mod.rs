//! Read side of the relational store the recommender draws from.

mod memory;
mod mysql;

pub use memory::InMemoryStore;
pub use mysql::MySqlStore;

use crate::error::Result;
use crate::models::*;
use std::collections::{BTreeSet, HashMap};

#[async_trait::async_trait]
pub trait InteractionStore: Send + Sync {
    /// Every like/collect/browse event, across all users.
    async fn rating_events(&self) -> Result<Vec<InteractionEvent>>;

    /// All events of one user, joined with the interacted item's types.
    async fn user_interactions(&self, user_id: UserId) -> Result<Vec<TypedInteraction>>;

    async fn user_tags(&self, user_id: UserId) -> Result<BTreeSet<String>>;

    /// Active items ordered by engagement, highest first.
    async fn candidate_items(&self, limit: usize) -> Result<Vec<Item>>;

    async fn active_items(&self) -> Result<Vec<Item>>;

    /// Most recent feedback of one user, newest first.
    async fn recent_feedback(&self, user_id: UserId, limit: usize) -> Result<Vec<FeedbackRecord>>;

    async fn item_types(&self, ids: &[ItemId]) -> Result<HashMap<ItemId, Option<TypeKey>>>;
}
