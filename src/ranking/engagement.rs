//! Weighted engagement roll-ups and period-over-period rank deltas

use std::collections::HashMap;

use serde::Deserialize;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SubjectKind {
    /// One cast, keyed `fid:0xhash`
    Cast,
    /// One embedded URL
    Url,
    /// One author fid
    Author,
    /// One channel URL
    Channel,
}

/// Raw activity for one subject over one window
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectCounts {
    pub subject: String,
    pub posts: u64,
    pub replies: u64,
    pub likes: u64,
    pub recasts: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EngagementWeights {
    #[serde(default = "default_posts_weight")]
    pub posts: f64,
    #[serde(default = "default_replies_weight")]
    pub replies: f64,
    #[serde(default = "default_likes_weight")]
    pub likes: f64,
    #[serde(default = "default_recasts_weight")]
    pub recasts: f64,
}

const fn default_posts_weight() -> f64 {
    1.0
}

const fn default_replies_weight() -> f64 {
    0.5
}

const fn default_likes_weight() -> f64 {
    0.25
}

const fn default_recasts_weight() -> f64 {
    0.25
}

impl Default for EngagementWeights {
    fn default() -> Self {
        Self {
            posts: default_posts_weight(),
            replies: default_replies_weight(),
            likes: default_likes_weight(),
            recasts: default_recasts_weight(),
        }
    }
}

impl EngagementWeights {
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn score(&self, counts: &SubjectCounts) -> f64 {
        self.posts * counts.posts as f64
            + self.replies * counts.replies as f64
            + self.likes * counts.likes as f64
            + self.recasts * counts.recasts as f64
    }
}

/// `previous rank - current rank` per field; positive means the subject moved up
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankDelta {
    pub posts: i64,
    pub replies: i64,
    pub likes: i64,
    pub recasts: i64,
    pub engagement: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngagementRow {
    pub counts: SubjectCounts,
    pub engagement: f64,
    pub previous: Option<SubjectCounts>,
    pub previous_engagement: Option<f64>,
    /// 1-based rank by engagement in the current window
    pub rank: i64,
    /// Absent when the subject had no activity in the previous window
    pub rank_delta: Option<RankDelta>,
}

#[derive(Clone, Copy)]
enum Field {
    Posts,
    Replies,
    Likes,
    Recasts,
    Engagement,
}

#[allow(clippy::cast_precision_loss)]
fn field_value(counts: &SubjectCounts, engagement: f64, field: Field) -> f64 {
    match field {
        Field::Posts => counts.posts as f64,
        Field::Replies => counts.replies as f64,
        Field::Likes => counts.likes as f64,
        Field::Recasts => counts.recasts as f64,
        Field::Engagement => engagement,
    }
}

/// 1-based rank of every subject by `field` descending, ties by subject ascending
fn ranks_by<'a>(scored: &[(&'a SubjectCounts, f64)], field: Field) -> HashMap<&'a str, i64> {
    let mut order: Vec<(&SubjectCounts, f64)> = scored
        .iter()
        .map(|(counts, engagement)| (*counts, field_value(counts, *engagement, field)))
        .collect();
    order.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.subject.cmp(&b.0.subject)));
    order
        .into_iter()
        .zip(1_i64..)
        .map(|((counts, _), rank)| (counts.subject.as_str(), rank))
        .collect()
}

struct WindowRanks<'a> {
    posts: HashMap<&'a str, i64>,
    replies: HashMap<&'a str, i64>,
    likes: HashMap<&'a str, i64>,
    recasts: HashMap<&'a str, i64>,
    engagement: HashMap<&'a str, i64>,
}

impl<'a> WindowRanks<'a> {
    fn new(scored: &[(&'a SubjectCounts, f64)]) -> Self {
        Self {
            posts: ranks_by(scored, Field::Posts),
            replies: ranks_by(scored, Field::Replies),
            likes: ranks_by(scored, Field::Likes),
            recasts: ranks_by(scored, Field::Recasts),
            engagement: ranks_by(scored, Field::Engagement),
        }
    }

    fn get(&self, subject: &str) -> Option<RankDelta> {
        Some(RankDelta {
            posts: *self.posts.get(subject)?,
            replies: *self.replies.get(subject)?,
            likes: *self.likes.get(subject)?,
            recasts: *self.recasts.get(subject)?,
            engagement: *self.engagement.get(subject)?,
        })
    }
}

/// Score the current window, rank it, and compare against the previous window
///
/// Rows come back in current engagement rank order.
#[must_use]
pub fn rank_engagement(
    current: &[SubjectCounts],
    previous: Option<&[SubjectCounts]>,
    weights: &EngagementWeights,
) -> Vec<EngagementRow> {
    let scored: Vec<(&SubjectCounts, f64)> = current.iter().map(|c| (c, weights.score(c))).collect();
    let current_ranks = WindowRanks::new(&scored);

    let previous_scored: Vec<(&SubjectCounts, f64)> = previous
        .unwrap_or_default()
        .iter()
        .map(|c| (c, weights.score(c)))
        .collect();
    let previous_ranks = WindowRanks::new(&previous_scored);
    let previous_by_subject: HashMap<&str, (&SubjectCounts, f64)> = previous_scored
        .iter()
        .map(|(c, e)| (c.subject.as_str(), (*c, *e)))
        .collect();

    let mut rows: Vec<EngagementRow> = scored
        .iter()
        .filter_map(|(counts, engagement)| {
            let now = current_ranks.get(&counts.subject)?;
            let before = previous_ranks.get(&counts.subject);
            let prior = previous_by_subject.get(counts.subject.as_str());
            Some(EngagementRow {
                counts: (*counts).clone(),
                engagement: *engagement,
                previous: prior.map(|(c, _)| (*c).clone()),
                previous_engagement: prior.map(|(_, e)| *e),
                rank: now.engagement,
                rank_delta: before.map(|b| RankDelta {
                    posts: b.posts - now.posts,
                    replies: b.replies - now.replies,
                    likes: b.likes - now.likes,
                    recasts: b.recasts - now.recasts,
                    engagement: b.engagement - now.engagement,
                }),
            })
        })
        .collect();
    rows.sort_by_key(|row| row.rank);
    rows
}
