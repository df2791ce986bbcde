//! Time-decayed popularity

use chrono::DateTime;
use chrono::Utc;
use serde::Serialize;

use super::ReactionTally;
use crate::models::CastId;

const LIKE_WEIGHT: f64 = 1.0;
const RECAST_WEIGHT: f64 = 0.5;
const SECONDS_PER_DAY: f64 = 86_400.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HotEntry {
    pub target: CastId,
    pub likes: u64,
    pub recasts: u64,
    pub score: f64,
}

/// `log10(max(1, |likes + 0.5 * recasts|)) - age_days`
///
/// Age runs from the earliest reaction in the window to `now`, so one day of
/// age costs as much as a tenfold difference in weighted reactions.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn hotness_score(likes: u64, recasts: u64, earliest: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let weighted = likes as f64 * LIKE_WEIGHT + recasts as f64 * RECAST_WEIGHT;
    let age_seconds = (now - earliest).num_seconds().max(0) as f64;
    weighted.abs().max(1.0).log10() - age_seconds / SECONDS_PER_DAY
}

/// Score every tally and sort hottest first; ties fall back to target order
#[must_use]
pub fn rank_hot(tallies: &[ReactionTally], now: DateTime<Utc>) -> Vec<HotEntry> {
    let mut entries: Vec<HotEntry> = tallies
        .iter()
        .map(|t| HotEntry {
            target: t.target.clone(),
            likes: t.likes,
            recasts: t.recasts,
            score: hotness_score(t.likes, t.recasts, t.earliest, now),
        })
        .collect();
    entries.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.target.cmp(&b.target))
    });
    entries
}
