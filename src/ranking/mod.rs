//! Ranking and aggregation
//!
//! Read-only views computed on demand from the store:
//!
//! - hotness: time-decayed popularity of recently reacted casts
//! - top: casts ordered by reaction count within a time window
//! - engagement: weighted activity per subject with period-over-period rank deltas

use std::sync::Arc;

use chrono::DateTime;
use chrono::Duration;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;

use crate::config::RankingConfig;
use crate::database::Store;
use crate::models::CastId;
use crate::Result;

mod engagement;
mod hotness;

pub use engagement::rank_engagement;
pub use engagement::EngagementRow;
pub use engagement::EngagementWeights;
pub use engagement::RankDelta;
pub use engagement::SubjectCounts;
pub use engagement::SubjectKind;
pub use hotness::hotness_score;
pub use hotness::rank_hot;
pub use hotness::HotEntry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Window {
    Hour,
    Day,
    Week,
    Month,
    Year,
    All,
}

impl Window {
    /// Length of the window; `All` is unbounded
    #[must_use]
    pub fn duration(self) -> Option<Duration> {
        match self {
            Self::Hour => Some(Duration::hours(1)),
            Self::Day => Some(Duration::days(1)),
            Self::Week => Some(Duration::days(7)),
            Self::Month => Some(Duration::days(30)),
            Self::Year => Some(Duration::days(365)),
            Self::All => None,
        }
    }

    #[must_use]
    pub fn since(self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.duration().map(|d| now - d)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    #[default]
    Likes,
    Recasts,
    Reactions,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TopScope {
    Global,
    /// Casts written by one author
    Author(u64),
    /// Replies written by one author
    AuthorReplies(u64),
    /// Casts whose root is anchored to a channel URL
    Channel(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopQuery {
    pub window: Window,
    pub metric: Metric,
    pub scope: TopScope,
    pub limit: usize,
    pub offset: usize,
}

/// Reaction counts on one cast within a window
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactionTally {
    pub target: CastId,
    pub likes: u64,
    pub recasts: u64,
    /// Earliest counted reaction
    pub earliest: DateTime<Utc>,
}

impl ReactionTally {
    #[must_use]
    pub const fn count(&self, metric: Metric) -> u64 {
        match metric {
            Metric::Likes => self.likes,
            Metric::Recasts => self.recasts,
            Metric::Reactions => self.likes + self.recasts,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopEntry {
    pub target: CastId,
    pub count: u64,
}

/// Order tallies by metric count desc, then target fid desc, then hash asc, and page
#[must_use]
pub fn rank_top(tallies: &[ReactionTally], metric: Metric, limit: usize, offset: usize) -> Vec<TopEntry> {
    let mut entries: Vec<TopEntry> = tallies
        .iter()
        .map(|t| TopEntry {
            target: t.target.clone(),
            count: t.count(metric),
        })
        .filter(|e| e.count > 0)
        .collect();
    entries.sort_by(|a, b| {
        b.count
            .cmp(&a.count)
            .then_with(|| b.target.fid.cmp(&a.target.fid))
            .then_with(|| a.target.hash.cmp(&b.target.hash))
    });
    entries.into_iter().skip(offset).take(limit).collect()
}

/// Computes ranked views over a [`Store`]
pub struct RankingEngine {
    store: Arc<dyn Store>,
    config: RankingConfig,
}

impl RankingEngine {
    #[must_use]
    pub fn new(store: Arc<dyn Store>, config: RankingConfig) -> Self {
        Self { store, config }
    }

    /// One page of the hot feed as of `now`
    pub async fn hot(&self, now: DateTime<Utc>, page: usize) -> Result<Vec<HotEntry>> {
        let since = now - Duration::days(self.config.hot_window_days);
        let tallies = self.store.reaction_tallies(Some(since), &TopScope::Global).await?;
        tracing::debug!("Hotness over {} reacted casts since {}", tallies.len(), since);

        let ranked = rank_hot(&tallies, now);
        Ok(ranked
            .into_iter()
            .skip(page.saturating_mul(self.config.page_size))
            .take(self.config.page_size)
            .collect())
    }

    pub async fn top(&self, query: &TopQuery, now: DateTime<Utc>) -> Result<Vec<TopEntry>> {
        self.store.top_targets(query, now).await
    }

    /// Engagement for `window` ending at `now`, with deltas against the window before it
    pub async fn engagement(
        &self,
        kind: SubjectKind,
        window: Window,
        now: DateTime<Utc>,
    ) -> Result<Vec<EngagementRow>> {
        let (current, previous) = match window.duration() {
            Some(length) => {
                let start = now - length;
                let current = self.store.subject_counts(kind, start, now).await?;
                let previous = self.store.subject_counts(kind, start - length, start).await?;
                (current, Some(previous))
            }
            None => {
                // Unix epoch predates every protocol timestamp
                let current = self
                    .store
                    .subject_counts(kind, DateTime::<Utc>::default(), now)
                    .await?;
                (current, None)
            }
        };
        tracing::debug!(
            "Engagement for {:?}: {} current subjects, {} previous",
            kind,
            current.len(),
            previous.as_ref().map_or(0, Vec::len)
        );

        Ok(rank_engagement(&current, previous.as_deref(), &self.config.weights))
    }
}
