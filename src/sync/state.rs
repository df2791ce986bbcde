//! Run statistics

use serde::Serialize;

use crate::database::CastWriteSummary;

/// Counters for one sync run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncStats {
    /// Messages or events handed to the dispatcher
    pub events_seen: u64,
    /// Handled message types with required fields missing
    pub dropped: u64,
    /// Message types the pipeline does not store
    pub ignored: u64,
    pub casts_written: u64,
    pub casts_removed: u64,
    pub ancestors_fetched: u64,
    pub reactions_written: u64,
    pub links_written: u64,
    pub profile_fields_written: u64,
    pub verifications_written: u64,
    pub fids_completed: u64,
    pub last_event_id: Option<u64>,
}

impl SyncStats {
    pub fn record_casts(&mut self, summary: CastWriteSummary) {
        self.casts_written += summary.inserted + summary.undeleted;
    }

    /// One-line summary for logs and the CLI
    #[must_use]
    pub fn format(&self) -> String {
        format!(
            "events: {}, dropped: {}, ignored: {}, casts: {} (+{} ancestors, {} removed), reactions: {}, links: {}, \
             profile fields: {}, verifications: {}, fids: {}, last event: {}",
            self.events_seen,
            self.dropped,
            self.ignored,
            self.casts_written,
            self.ancestors_fetched,
            self.casts_removed,
            self.reactions_written,
            self.links_written,
            self.profile_fields_written,
            self.verifications_written,
            self.fids_completed,
            self.last_event_id
                .map_or_else(|| "none".to_string(), |id| id.to_string())
        )
    }
}
