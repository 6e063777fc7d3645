//! Recency-weighted popularity, the cold-start ranking.

use crate::models::{Item, ItemId};
use chrono::NaiveDateTime;

const SECONDS_PER_DAY: f64 = 86_400.0;
const MIN_AGE_DAYS: f64 = 1.0 / SECONDS_PER_DAY;

/// `engagement / age_in_days + 1`. Age is clamped to one second so fresh
/// (or clock-skewed) items stay finite. Items without a creation time are
/// not scored.
pub fn popularity_score(item: &Item, now: NaiveDateTime) -> Option<f64> {
    let created = item.create_time?;
    let age_days = (now - created).num_milliseconds() as f64 / 1000.0 / SECONDS_PER_DAY;
    Some(item.engagement() as f64 / age_days.max(MIN_AGE_DAYS) + 1.0)
}

/// Top `top_n` item ids by popularity; ties keep the input order.
pub fn rank_popular(items: &[Item], now: NaiveDateTime, top_n: usize) -> Vec<ItemId> {
    let mut scored: Vec<(ItemId, f64)> = items
        .iter()
        .filter_map(|item| popularity_score(item, now).map(|score| (item.id, score)))
        .collect();

    crate::utils::sort_scored_desc(&mut scored);
    crate::utils::top_ids(&crate::utils::dedup_scored(&scored), top_n)
}
