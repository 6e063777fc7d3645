pub mod collaborative;
pub mod content;
pub mod popularity;
pub mod reinforcement;

pub use collaborative::{CollaborativeFiltering, ExhaustiveCosine, RatingMatrix, UserSimilarity};
pub use content::ContentBased;
pub use reinforcement::{FeedbackProfile, ReinforcementRefiner};

use crate::error::Result;
use crate::models::{ItemId, UserId};
use tracing::error;

/// A source of ranked candidates for one user.
#[async_trait::async_trait]
pub trait Recommender: Send + Sync {
    fn name(&self) -> &'static str;

    async fn try_recommend(&self, user_id: UserId, top_n: usize) -> Result<Vec<ItemId>>;

    /// Failures are logged and yield an empty list so that callers can fall
    /// back to another source.
    async fn recommend(&self, user_id: UserId, top_n: usize) -> Vec<ItemId> {
        match self.try_recommend(user_id, top_n).await {
            Ok(items) => items,
            Err(e) => {
                error!(recommender = self.name(), user_id, error = %e, "Recommendation failed, returning no items");
                Vec::new()
            }
        }
    }
}
