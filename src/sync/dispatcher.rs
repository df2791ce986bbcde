//! Event dispatcher
//!
//! Every message, whether it comes from the live event feed, a backfill page
//! or a manual lookup, goes through [`Dispatcher::dispatch`]: it is classified
//! once and exactly one handler runs. Backfill and live mode each keep a named
//! checkpoint in the store so a restarted process resumes where the last one
//! stopped.

use std::future::Future;
use std::sync::Arc;

use futures::future::join_all;
use futures::StreamExt;
use tokio::sync::mpsc;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::client::HistoryKind;
use super::client::HubClient;
use super::state::SyncStats;
use super::types::classify;
use super::types::Classified;
use super::types::EventPayload;
use super::types::HubEventType;
use super::types::HubMessage;
use super::types::RawCast;
use crate::config::SyncConfig;
use crate::database::Store;
use crate::database::CHECKPOINT_BACKFILL;
use crate::database::CHECKPOINT_LIVE;
use crate::ingest::CastIngestor;
use crate::models::Cast;
use crate::models::CastId;
use crate::models::Link;
use crate::models::Reaction;
use crate::Result;

/// How a run sources its messages
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncMode {
    /// Walk fids upward from the backfill checkpoint
    Backfill,
    /// Follow the hub event feed
    Live { from_event_id: Option<u64> },
    /// Re-sync specific fids and casts without touching checkpoints
    Manual { fids: Vec<u64>, casts: Vec<CastId> },
}

pub struct Dispatcher {
    hub: Arc<dyn HubClient>,
    store: Arc<dyn Store>,
    ingestor: CastIngestor,
    config: SyncConfig,
    enrichment: Option<mpsc::Sender<Vec<Cast>>>,
    stats: SyncStats,
}

impl Dispatcher {
    #[must_use]
    pub fn new(hub: Arc<dyn HubClient>, store: Arc<dyn Store>, config: SyncConfig) -> Self {
        let ingestor = CastIngestor::new(Arc::clone(&hub), Arc::clone(&store), config.write_chunk_size);
        Self {
            hub,
            store,
            ingestor,
            config,
            enrichment: None,
            stats: SyncStats::default(),
        }
    }

    /// Forward newly written casts to a keyword enrichment queue
    #[must_use]
    pub fn with_enrichment(mut self, queue: mpsc::Sender<Vec<Cast>>) -> Self {
        self.enrichment = Some(queue);
        self
    }

    #[must_use]
    pub const fn stats(&self) -> &SyncStats {
        &self.stats
    }

    /// Run one mode to completion
    ///
    /// # Errors
    /// Store failures, history page failures in backfill, and a terminated
    /// event stream in live mode
    pub async fn run(&mut self, mode: SyncMode) -> Result<SyncStats> {
        self.run_until(mode, std::future::pending()).await
    }

    /// Like [`Dispatcher::run`], but live mode stops cleanly once `shutdown` resolves
    pub async fn run_until(&mut self, mode: SyncMode, shutdown: impl Future<Output = ()> + Send) -> Result<SyncStats> {
        info!("Starting {:?} sync", mode);
        match mode {
            SyncMode::Backfill => self.backfill().await?,
            SyncMode::Live { from_event_id } => self.live(from_event_id, shutdown).await?,
            SyncMode::Manual { fids, casts } => self.manual(&fids, &casts).await?,
        }
        info!("Sync finished: {}", self.stats.format());
        Ok(self.stats.clone())
    }

    /// Classify one message and route it to its handler
    ///
    /// # Errors
    /// Only store failures; malformed and unsupported messages are counted
    pub async fn dispatch(&mut self, message: &HubMessage) -> Result<()> {
        self.stats.events_seen += 1;
        match classify(message) {
            Classified::Payload(payload) => self.handle(payload).await,
            Classified::Unsupported(message_type) => {
                debug!("Ignoring {} message {}", message_type, message.hash);
                self.stats.ignored += 1;
                Ok(())
            }
            Classified::Malformed(reason) => {
                warn!("Dropping malformed message {}: {}", message.hash, reason);
                self.stats.dropped += 1;
                Ok(())
            }
        }
    }

    async fn handle(&mut self, payload: EventPayload) -> Result<()> {
        let chunk_size = self.config.write_chunk_size;
        match payload {
            EventPayload::CastAdd(raw) => self.ingest_casts(&[raw]).await,
            EventPayload::CastRemove { id, timestamp } => {
                if self.store.remove_cast(&id, timestamp).await? {
                    self.stats.casts_removed += 1;
                } else {
                    debug!("Remove for cast {} changed nothing", id);
                }
                Ok(())
            }
            EventPayload::ReactionAdd(reaction) => self.write_reactions(&[reaction], &[]).await,
            EventPayload::ReactionRemove(reaction) => self.write_reactions(&[], &[reaction]).await,
            EventPayload::LinkAdd(link) => self.write_links(&[link], &[]).await,
            EventPayload::LinkRemove(link) => self.write_links(&[], &[link]).await,
            EventPayload::ProfileUpdate(field) => {
                self.stats.profile_fields_written += self.store.upsert_profile_fields(&[field], chunk_size).await?;
                Ok(())
            }
            EventPayload::VerificationUpdate(verification) => {
                let written = if verification.deleted {
                    self.store.remove_verifications(&[verification], chunk_size).await?
                } else {
                    self.store.upsert_verifications(&[verification], chunk_size).await?
                };
                self.stats.verifications_written += written;
                Ok(())
            }
        }
    }

    async fn ingest_casts(&mut self, raws: &[RawCast]) -> Result<()> {
        let outcome = self.ingestor.ingest(raws).await?;
        self.stats.record_casts(outcome.written);
        self.stats.ancestors_fetched += outcome.ancestors_fetched as u64;
        self.enqueue_enrichment(outcome.casts).await;
        Ok(())
    }

    async fn enqueue_enrichment(&mut self, casts: Vec<Cast>) {
        if casts.is_empty() {
            return;
        }
        if let Some(queue) = &self.enrichment {
            if queue.send(casts).await.is_err() {
                warn!("Enrichment queue closed; no further casts will be enriched this run");
                self.enrichment = None;
            }
        }
    }

    async fn write_reactions(&mut self, adds: &[Reaction], removes: &[Reaction]) -> Result<()> {
        let chunk_size = self.config.write_chunk_size;
        if !adds.is_empty() {
            self.stats.reactions_written += self.store.upsert_reactions(adds, chunk_size).await?;
        }
        if !removes.is_empty() {
            self.stats.reactions_written += self.store.remove_reactions(removes, chunk_size).await?;
        }
        Ok(())
    }

    async fn write_links(&mut self, adds: &[Link], removes: &[Link]) -> Result<()> {
        let chunk_size = self.config.write_chunk_size;
        if !adds.is_empty() {
            self.stats.links_written += self.store.upsert_links(adds, chunk_size).await?;
        }
        if !removes.is_empty() {
            self.stats.links_written += self.store.remove_links(removes, chunk_size).await?;
        }
        Ok(())
    }

    async fn backfill(&mut self) -> Result<()> {
        let start = self
            .store
            .get_checkpoint(CHECKPOINT_BACKFILL)
            .await?
            .and_then(|fid| u64::try_from(fid).ok())
            .map_or(1, |fid| fid + 1);
        let end = match self.config.backfill_max_fid {
            Some(max) => max,
            None => self.hub.max_fid().await?,
        };

        if start > end {
            info!("Backfill is complete up to fid {}", end);
            return Ok(());
        }
        info!("Backfilling fids {} through {}", start, end);

        for fid in start..=end {
            self.sync_fid(fid).await?;
            self.store
                .set_checkpoint(CHECKPOINT_BACKFILL, crate::database::fid_param(fid))
                .await?;
            self.stats.fids_completed += 1;

            if fid % 1000 == 0 {
                info!("Backfill reached fid {}: {}", fid, self.stats.format());
            }
        }
        Ok(())
    }

    /// Drain one fid's full history
    ///
    /// Casts are collected across all pages and ingested as one batch so
    /// replies within the fid resolve against each other.
    async fn sync_fid(&mut self, fid: u64) -> Result<()> {
        debug!("Syncing fid {}", fid);

        let mut casts = Vec::new();
        for kind in HistoryKind::ALL {
            let mut token: Option<String> = None;
            loop {
                let page = self.hub.history_page(kind, fid, token.as_deref()).await?;
                let mut reactions = (Vec::new(), Vec::new());
                let mut links = (Vec::new(), Vec::new());

                for message in &page.messages {
                    self.stats.events_seen += 1;
                    match classify(message) {
                        Classified::Payload(EventPayload::CastAdd(raw)) => casts.push(raw),
                        Classified::Payload(EventPayload::ReactionAdd(r)) => reactions.0.push(r),
                        Classified::Payload(EventPayload::ReactionRemove(r)) => reactions.1.push(r),
                        Classified::Payload(EventPayload::LinkAdd(l)) => links.0.push(l),
                        Classified::Payload(EventPayload::LinkRemove(l)) => links.1.push(l),
                        Classified::Payload(other) => self.handle(other).await?,
                        Classified::Unsupported(_) => self.stats.ignored += 1,
                        Classified::Malformed(reason) => {
                            warn!("Dropping malformed history message {}: {}", message.hash, reason);
                            self.stats.dropped += 1;
                        }
                    }
                }
                self.write_reactions(&reactions.0, &reactions.1).await?;
                self.write_links(&links.0, &links.1).await?;

                match page.next_token() {
                    Some(next) => token = Some(next.to_string()),
                    None => break,
                }
            }
        }
        self.ingest_casts(&casts).await?;

        if let Some(profile) = self.hub.get_user_profile(fid).await {
            self.stats.profile_fields_written += self
                .store
                .upsert_profile_fields(&profile.fields, self.config.write_chunk_size)
                .await?;
        }
        let verifications = self.hub.get_verified_addresses(fid).await;
        if !verifications.is_empty() {
            self.stats.verifications_written += self
                .store
                .upsert_verifications(&verifications, self.config.write_chunk_size)
                .await?;
        }
        Ok(())
    }

    async fn live(&mut self, from_event_id: Option<u64>, shutdown: impl Future<Output = ()> + Send) -> Result<()> {
        let from = match from_event_id {
            Some(id) => Some(id),
            None => self
                .store
                .get_checkpoint(CHECKPOINT_LIVE)
                .await?
                .and_then(|id| u64::try_from(id).ok())
                .map(|id| id + 1),
        };
        info!(
            "Following hub events from {}",
            from.map_or_else(|| "the hub's oldest retained event".to_string(), |id| format!("event {id}"))
        );

        let mut events = self.hub.subscribe(&[HubEventType::MergeMessage], from);
        let mut unsaved: u64 = 0;
        tokio::pin!(shutdown);

        loop {
            let next = tokio::select! {
                biased;
                () = &mut shutdown => {
                    info!("Shutdown requested");
                    break;
                }
                next = events.next() => next,
            };
            let Some(item) = next else {
                info!("Event stream ended");
                break;
            };
            let event = match item {
                Ok(event) => event,
                Err(e) => {
                    self.save_live_checkpoint().await?;
                    return Err(e);
                }
            };

            match &event.message {
                Some(message) => self.dispatch(message).await?,
                None => {
                    self.stats.events_seen += 1;
                    self.stats.dropped += 1;
                    warn!("Dropping event {} without a message", event.id);
                }
            }
            self.stats.last_event_id = Some(event.id);

            unsaved += 1;
            if unsaved >= self.config.live_checkpoint_interval.max(1) {
                self.save_live_checkpoint().await?;
                unsaved = 0;
            }
        }

        self.save_live_checkpoint().await
    }

    async fn save_live_checkpoint(&self) -> Result<()> {
        if let Some(id) = self.stats.last_event_id {
            self.store
                .set_checkpoint(CHECKPOINT_LIVE, i64::try_from(id).unwrap_or(i64::MAX))
                .await?;
            debug!("Saved live checkpoint at event {}", id);
        }
        Ok(())
    }

    async fn manual(&mut self, fids: &[u64], casts: &[CastId]) -> Result<()> {
        for fid in fids {
            self.sync_fid(*fid).await?;
            self.stats.fids_completed += 1;
        }
        if casts.is_empty() {
            return Ok(());
        }

        let messages = join_all(casts.iter().map(|id| self.hub.get_cast(id))).await;
        for (id, message) in casts.iter().zip(&messages) {
            if message.is_none() {
                warn!("Cast {} is not available from the hub", id);
            }
        }
        let mut raws = Vec::new();
        for message in messages.iter().flatten() {
            self.stats.events_seen += 1;
            match classify(message) {
                Classified::Payload(EventPayload::CastAdd(raw)) => raws.push(raw),
                other => {
                    warn!("Hub returned a non-cast message {}: {:?}", message.hash, other);
                    self.stats.dropped += 1;
                }
            }
        }
        self.ingest_casts(&raws).await?;

        let reactions: Vec<Reaction> = join_all(casts.iter().map(|id| self.hub.get_reactions_for(id)))
            .await
            .into_iter()
            .flatten()
            .collect();
        self.write_reactions(&reactions, &[]).await
    }
}
