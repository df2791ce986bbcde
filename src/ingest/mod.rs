//! Cast ingestion
//!
//! Turns raw cast-add messages into stored casts. Each batch is normalized,
//! missing ancestors are pulled from the hub level by level, every cast gets a
//! resolved top ancestor, and the whole set is written in one store call.
//! Ancestors that cannot be fetched are treated as absent; they never fail the
//! batch.

use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use serde::Serialize;

use crate::database::CastWriteSummary;
use crate::database::Store;
use crate::models::Cast;
use crate::models::CastHash;
use crate::models::CastId;
use crate::models::CastRecord;
use crate::sync::client::HubClient;
use crate::sync::types::classify;
use crate::sync::types::Classified;
use crate::sync::types::EventPayload;
use crate::sync::types::RawCast;
use crate::Result;

mod ancestors;
mod normalize;

pub use ancestors::resolve_tops;
pub use normalize::decompose_url;
pub use normalize::inline_urls;
pub use normalize::normalize;
pub use normalize::UrlParts;
pub use normalize::CHAIN_SCHEME;

#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestOutcome {
    pub written: CastWriteSummary,
    /// Ancestors pulled from the hub and stored alongside the batch
    pub ancestors_fetched: usize,
    /// Parents the hub could not return
    pub ancestors_missing: usize,
    /// The batch's own casts with resolved tops, in input order
    #[serde(skip)]
    pub casts: Vec<Cast>,
}

pub struct CastIngestor {
    hub: Arc<dyn HubClient>,
    store: Arc<dyn Store>,
    chunk_size: usize,
}

impl CastIngestor {
    #[must_use]
    pub fn new(hub: Arc<dyn HubClient>, store: Arc<dyn Store>, chunk_size: usize) -> Self {
        Self {
            hub,
            store,
            chunk_size,
        }
    }

    /// Normalize, resolve and store a batch of casts
    ///
    /// # Errors
    /// Only store failures propagate
    pub async fn ingest(&self, raws: &[RawCast]) -> Result<IngestOutcome> {
        if raws.is_empty() {
            return Ok(IngestOutcome::default());
        }
        let started = Instant::now();

        let mut order: Vec<CastHash> = Vec::with_capacity(raws.len());
        let mut records: HashMap<CastHash, CastRecord> = HashMap::with_capacity(raws.len());
        for raw in raws {
            let record = normalize(raw);
            let hash = record.cast.id.hash.clone();
            if records.insert(hash.clone(), record).is_none() {
                order.push(hash);
            }
        }

        let (fetched, stored, missing) = self.collect_ancestors(&records).await?;
        let ancestors_fetched = fetched.len();

        let mut fetched_order: Vec<CastHash> = fetched.keys().cloned().collect();
        fetched_order.sort();
        for (hash, record) in fetched {
            records.entry(hash).or_insert(record);
        }

        let casts: HashMap<CastHash, Cast> = records
            .iter()
            .map(|(hash, record)| (hash.clone(), record.cast.clone()))
            .collect();
        let stored: HashMap<CastHash, Cast> = stored.into_iter().map(|c| (c.id.hash.clone(), c)).collect();
        let tops = resolve_tops(&casts, &stored);
        for (hash, record) in &mut records {
            record.cast.top = tops.get(hash).cloned();
        }

        let batch: Vec<CastRecord> = fetched_order
            .iter()
            .chain(&order)
            .filter_map(|hash| records.get(hash).cloned())
            .collect();
        let written = self.store.upsert_casts(&batch, self.chunk_size).await?;

        tracing::debug!(
            "Ingested {} casts ({} ancestors fetched, {} missing) in {:?}",
            order.len(),
            ancestors_fetched,
            missing,
            started.elapsed()
        );

        Ok(IngestOutcome {
            written,
            ancestors_fetched,
            ancestors_missing: missing,
            casts: order
                .iter()
                .filter_map(|hash| records.get(hash).map(|r| r.cast.clone()))
                .collect(),
        })
    }

    /// Walk parent links outward from the batch
    ///
    /// Returns freshly fetched ancestors, parents already in the store, and the
    /// number of parents that could not be found anywhere.
    async fn collect_ancestors(
        &self,
        batch: &HashMap<CastHash, CastRecord>,
    ) -> Result<(HashMap<CastHash, CastRecord>, Vec<Cast>, usize)> {
        let mut seen: HashSet<CastHash> = batch.keys().cloned().collect();
        let mut fetched: HashMap<CastHash, CastRecord> = HashMap::new();
        let mut stored: Vec<Cast> = Vec::new();
        let mut missing = 0;

        let mut frontier = unseen_parents(batch.values(), &mut seen);
        while !frontier.is_empty() {
            let known = self.store.get_casts(&frontier).await?;
            let known_hashes: HashSet<CastHash> = known.iter().map(|c| c.id.hash.clone()).collect();
            stored.extend(known);

            let wanted: Vec<&CastId> = frontier.iter().filter(|id| !known_hashes.contains(&id.hash)).collect();
            let responses = join_all(wanted.iter().map(|id| self.hub.get_cast(id))).await;

            let mut level = Vec::new();
            for (id, response) in wanted.into_iter().zip(responses) {
                match response.map(|message| classify(&message)) {
                    Some(Classified::Payload(EventPayload::CastAdd(raw))) if raw.id == *id => {
                        level.push(normalize(&raw));
                    }
                    Some(_) => {
                        tracing::debug!("Hub returned an unusable message for ancestor {}", id);
                        missing += 1;
                    }
                    None => {
                        tracing::debug!("Ancestor {} is not available", id);
                        missing += 1;
                    }
                }
            }

            frontier = unseen_parents(level.iter(), &mut seen);
            fetched.extend(level.into_iter().map(|r| (r.cast.id.hash.clone(), r)));
        }

        Ok((fetched, stored, missing))
    }
}

/// Parent ids not yet in `seen`, which is extended with them
fn unseen_parents<'a>(records: impl Iterator<Item = &'a CastRecord>, seen: &mut HashSet<CastHash>) -> Vec<CastId> {
    let mut parents = Vec::new();
    for record in records {
        if let Some(parent) = record.cast.parent_cast() {
            if seen.insert(parent.hash.clone()) {
                parents.push(parent.clone());
            }
        }
    }
    parents
}
