//! Keyword enrichment
//!
//! Casts are enriched at most once. A cast counts as done when it has keyword
//! rows or a processed marker; the marker is written even when extraction
//! returned nothing, so empty results are not retried. Extraction failures
//! leave the cast pending for the next pass.

use std::sync::Arc;

use futures::stream;
use futures::StreamExt;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::DEFAULT_WRITE_CHUNK_SIZE;
use crate::database::Store;
use crate::models::Cast;
use crate::models::Keyword;
use crate::Result;

mod client;

pub use client::ExtractedKeyword;
pub use client::HttpKeywordExtractor;
pub use client::KeywordExtractor;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EnrichStats {
    pub enriched: u64,
    pub failed: u64,
    pub keywords_written: u64,
}

impl EnrichStats {
    fn merge(&mut self, other: Self) {
        self.enriched += other.enriched;
        self.failed += other.failed;
        self.keywords_written += other.keywords_written;
    }
}

pub struct KeywordEnricher {
    store: Arc<dyn Store>,
    extractor: Arc<dyn KeywordExtractor>,
    concurrency: usize,
    batch_size: usize,
    write_chunk_size: usize,
}

impl KeywordEnricher {
    #[must_use]
    pub fn new(store: Arc<dyn Store>, extractor: Arc<dyn KeywordExtractor>, concurrency: usize, batch_size: usize) -> Self {
        Self {
            store,
            extractor,
            concurrency: concurrency.max(1),
            batch_size: batch_size.max(1),
            write_chunk_size: DEFAULT_WRITE_CHUNK_SIZE,
        }
    }

    /// Rows per keyword INSERT
    #[must_use]
    pub const fn with_write_chunk_size(mut self, chunk_size: usize) -> Self {
        self.write_chunk_size = chunk_size;
        self
    }

    /// The casts among `casts` that still need keywords
    ///
    /// # Errors
    /// Store failures
    pub async fn find_unenriched(&self, casts: &[Cast]) -> Result<Vec<Cast>> {
        let ids: Vec<_> = casts.iter().map(|c| c.id.clone()).collect();
        let done = self.store.enriched_among(&ids).await?;
        Ok(casts
            .iter()
            .filter(|c| !c.deleted && !done.contains(&c.id.hash))
            .cloned()
            .collect())
    }

    /// Extract and store keywords for every pending cast in `casts`
    ///
    /// # Errors
    /// Store failures; extraction failures are counted, not returned
    pub async fn enrich(&self, casts: &[Cast]) -> Result<EnrichStats> {
        let pending = self.find_unenriched(casts).await?;
        let mut stats = EnrichStats::default();

        let mut results = stream::iter(pending)
            .map(|cast| async move {
                let extracted = if cast.text.trim().is_empty() {
                    Ok(Vec::new())
                } else {
                    self.extractor.extract(&cast.text).await
                };
                (cast, extracted)
            })
            .buffer_unordered(self.concurrency);

        while let Some((cast, extracted)) = results.next().await {
            match extracted {
                Ok(found) => {
                    let keywords: Vec<Keyword> = found
                        .into_iter()
                        .map(|k| Keyword {
                            cast: cast.id.clone(),
                            keyword: k.keyword,
                            score: k.score,
                        })
                        .collect();
                    stats.keywords_written += self
                        .store
                        .save_keywords(&cast.id, &keywords, self.write_chunk_size)
                        .await?;
                    stats.enriched += 1;
                }
                Err(e) => {
                    tracing::debug!("Keyword extraction for {} failed: {}", cast.id, e);
                    stats.failed += 1;
                }
            }
        }
        if stats.failed > 0 {
            tracing::warn!("{} casts left pending after extraction failures", stats.failed);
        }
        Ok(stats)
    }

    /// Enrich up to `limit` pending casts from the store, newest first
    ///
    /// # Errors
    /// Store failures
    pub async fn sweep(&self, limit: usize) -> Result<EnrichStats> {
        let pending = self.store.pending_enrichment(limit).await?;
        tracing::info!("Enrichment sweep over {} pending casts", pending.len());

        let mut stats = EnrichStats::default();
        for batch in pending.chunks(self.batch_size) {
            stats.merge(self.enrich(batch).await?);
        }
        Ok(stats)
    }

    /// Run enrichment in a background task fed by a bounded queue
    ///
    /// The task ends once every sender is dropped and returns its totals.
    #[must_use]
    pub fn spawn(self: Arc<Self>, capacity: usize) -> (mpsc::Sender<Vec<Cast>>, JoinHandle<EnrichStats>) {
        let (tx, mut rx) = mpsc::channel::<Vec<Cast>>(capacity.max(1));
        let handle = tokio::spawn(async move {
            let mut totals = EnrichStats::default();
            while let Some(casts) = rx.recv().await {
                match self.enrich(&casts).await {
                    Ok(stats) => totals.merge(stats),
                    Err(e) => tracing::warn!("Enrichment batch failed: {}", e),
                }
            }
            tracing::info!(
                "Enrichment finished: {} enriched, {} failed, {} keywords",
                totals.enriched,
                totals.failed,
                totals.keywords_written
            );
            totals
        });
        (tx, handle)
    }
}
