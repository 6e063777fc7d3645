use std::cmp::Ordering;
use std::collections::HashSet;
use std::hash::Hash;

pub mod validation;

/// Descending comparison on scores; NaN compares equal.
pub fn by_score_desc(a: f64, b: f64) -> Ordering {
    b.partial_cmp(&a).unwrap_or(Ordering::Equal)
}

/// Stable sort by descending score, so ties keep their input order.
pub fn sort_scored_desc<T>(scored: &mut [(T, f64)]) {
    scored.sort_by(|a, b| by_score_desc(a.1, b.1));
}

pub fn top_ids<T: Copy>(scored: &[(T, f64)], n: usize) -> Vec<T> {
    scored.iter().take(n).map(|(id, _)| *id).collect()
}

pub fn dedup_scored<T: Eq + Hash + Copy>(scored: &[(T, f64)]) -> Vec<(T, f64)> {
    let mut seen = HashSet::with_capacity(scored.len());
    scored.iter().copied().filter(|(id, _)| seen.insert(*id)).collect()
}
