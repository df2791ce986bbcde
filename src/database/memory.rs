//! In-process [`Store`] with the same upsert and soft-delete rules as `PostgreSQL`
//!
//! Every row handed to a write method is recorded in a write log, so callers
//! can assert exactly which fids a run touched.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::collections::HashSet;

use async_trait::async_trait;
use chrono::DateTime;
use chrono::Utc;
use tokio::sync::RwLock;

use super::CastWriteSummary;
use super::Checkpoint;
use super::Store;
use crate::models::sanitize_text;
use crate::models::Cast;
use crate::models::CastEmbed;
use crate::models::CastHash;
use crate::models::CastId;
use crate::models::CastRecord;
use crate::models::Keyword;
use crate::models::Link;
use crate::models::Mention;
use crate::models::ProfileField;
use crate::models::Reaction;
use crate::models::ReactionKind;
use crate::models::ReactionTarget;
use crate::models::TopAncestor;
use crate::models::UrlEmbed;
use crate::models::Verification;
use crate::ranking::rank_top;
use crate::ranking::ReactionTally;
use crate::ranking::SubjectCounts;
use crate::ranking::SubjectKind;
use crate::ranking::TopEntry;
use crate::ranking::TopQuery;
use crate::ranking::TopScope;
use crate::Result;

/// One row submitted to a write method
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteOp {
    pub table: &'static str,
    pub fid: u64,
}

/// Soft-deletable row keyed by its natural unique tuple
trait Tombstoned: Clone {
    fn timestamp(&self) -> DateTime<Utc>;
    fn deleted(&self) -> bool;
    fn mark(&mut self, deleted: bool, timestamp: DateTime<Utc>);
}

macro_rules! impl_tombstoned {
    ($($ty:ty),*) => {
        $(impl Tombstoned for $ty {
            fn timestamp(&self) -> DateTime<Utc> {
                self.timestamp
            }

            fn deleted(&self) -> bool {
                self.deleted
            }

            fn mark(&mut self, deleted: bool, timestamp: DateTime<Utc>) {
                self.deleted = deleted;
                self.timestamp = timestamp;
            }
        })*
    };
}

impl_tombstoned!(Reaction, Link, Verification);

/// Insert-if-absent, or revive a tombstone strictly older than `row`
fn apply_add<K: std::hash::Hash + Eq, T: Tombstoned>(table: &mut HashMap<K, T>, key: K, row: &T) -> bool {
    match table.get_mut(&key) {
        None => {
            let mut fresh = row.clone();
            fresh.mark(false, row.timestamp());
            table.insert(key, fresh);
            true
        }
        Some(existing) if existing.deleted() && existing.timestamp() < row.timestamp() => {
            existing.mark(false, row.timestamp());
            true
        }
        Some(_) => false,
    }
}

/// Tombstone when the remove is at least as new as the row; remove wins ties
fn apply_remove<K: std::hash::Hash + Eq, T: Tombstoned>(table: &mut HashMap<K, T>, key: K, row: &T) -> bool {
    match table.get_mut(&key) {
        None => {
            let mut tombstone = row.clone();
            tombstone.mark(true, row.timestamp());
            table.insert(key, tombstone);
            true
        }
        Some(existing) if existing.timestamp() <= row.timestamp() => {
            existing.mark(true, row.timestamp());
            true
        }
        Some(_) => false,
    }
}

#[derive(Default)]
struct State {
    casts: BTreeMap<CastHash, Cast>,
    mentions: BTreeMap<(CastHash, u64, u32), Mention>,
    url_embeds: BTreeMap<(CastHash, String), UrlEmbed>,
    cast_embeds: BTreeMap<(CastHash, CastHash), CastEmbed>,
    reactions: HashMap<(u64, String, ReactionKind), Reaction>,
    links: HashMap<(u64, String, u64), Link>,
    profile_fields: HashMap<(u64, String), ProfileField>,
    verifications: HashMap<(u64, String), Verification>,
    keywords: BTreeMap<(CastHash, String), Keyword>,
    keyword_runs: HashMap<CastHash, usize>,
    checkpoints: BTreeMap<String, (i64, DateTime<Utc>)>,
    writes: Vec<WriteOp>,
}

impl State {
    fn log(&mut self, table: &'static str, fid: u64) {
        self.writes.push(WriteOp { table, fid });
    }

    fn live_cast(&self, id: &CastId) -> Option<&Cast> {
        self.casts.get(&id.hash).filter(|c| !c.deleted)
    }

    fn set_embeds_deleted(&mut self, id: &CastId, deleted: bool) {
        for embed in self.url_embeds.values_mut().filter(|e| e.cast == *id) {
            embed.deleted = deleted;
        }
    }

    fn live_urls_of(&self, hash: &CastHash) -> Vec<String> {
        self.url_embeds
            .values()
            .filter(|e| !e.deleted && e.cast.hash == *hash)
            .map(|e| e.url.clone())
            .collect()
    }

    fn is_enriched(&self, hash: &CastHash) -> bool {
        self.keyword_runs.contains_key(hash) || self.keywords.keys().any(|(h, _)| h == hash)
    }
}

/// [`Store`] kept entirely in memory
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn cast(&self, id: &CastId) -> Option<Cast> {
        self.state.read().await.casts.get(&id.hash).cloned()
    }

    pub async fn cast_count(&self) -> usize {
        self.state.read().await.casts.len()
    }

    pub async fn mentions(&self, id: &CastId) -> Vec<Mention> {
        let state = self.state.read().await;
        state.mentions.values().filter(|m| m.cast == *id).cloned().collect()
    }

    pub async fn url_embeds(&self, id: &CastId) -> Vec<UrlEmbed> {
        let state = self.state.read().await;
        state.url_embeds.values().filter(|e| e.cast == *id).cloned().collect()
    }

    pub async fn cast_embeds(&self, id: &CastId) -> Vec<CastEmbed> {
        let state = self.state.read().await;
        state.cast_embeds.values().filter(|e| e.cast == *id).cloned().collect()
    }

    pub async fn reactions(&self) -> Vec<Reaction> {
        self.state.read().await.reactions.values().cloned().collect()
    }

    pub async fn links(&self) -> Vec<Link> {
        self.state.read().await.links.values().cloned().collect()
    }

    pub async fn profile_fields(&self, fid: u64) -> Vec<ProfileField> {
        let state = self.state.read().await;
        state.profile_fields.values().filter(|f| f.fid == fid).cloned().collect()
    }

    pub async fn verifications(&self, fid: u64) -> Vec<Verification> {
        let state = self.state.read().await;
        state.verifications.values().filter(|v| v.fid == fid).cloned().collect()
    }

    pub async fn keywords(&self, id: &CastId) -> Vec<Keyword> {
        let state = self.state.read().await;
        state.keywords.values().filter(|k| k.cast == *id).cloned().collect()
    }

    pub async fn write_log(&self) -> Vec<WriteOp> {
        self.state.read().await.writes.clone()
    }

    /// Rows submitted for `fid` across all tables
    pub async fn writes_for_fid(&self, fid: u64) -> usize {
        self.state.read().await.writes.iter().filter(|w| w.fid == fid).count()
    }

    /// Distinct fids in the write log, ascending
    pub async fn written_fids(&self) -> Vec<u64> {
        let state = self.state.read().await;
        let mut fids: Vec<u64> = state.writes.iter().map(|w| w.fid).collect();
        fids.sort_unstable();
        fids.dedup();
        fids
    }
}

fn in_window(ts: DateTime<Utc>, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
    ts >= start && ts < end
}

fn scope_matches(state: &State, target: &CastId, scope: &TopScope) -> bool {
    let cast = state.casts.get(&target.hash);
    if cast.is_some_and(|c| c.deleted) {
        return false;
    }
    match scope {
        TopScope::Global => true,
        TopScope::Author(fid) => target.fid == *fid,
        TopScope::AuthorReplies(fid) => target.fid == *fid && cast.is_some_and(Cast::is_reply),
        TopScope::Channel(url) => {
            cast.and_then(|c| c.top.as_ref()).and_then(|t| t.channel_url.as_deref()) == Some(url.as_str())
        }
    }
}

fn channel_of(cast: &Cast) -> Option<String> {
    cast.top.as_ref().and_then(|t| t.channel_url.clone())
}

#[derive(Default)]
struct Tally {
    posts: u64,
    replies: u64,
    likes: u64,
    recasts: u64,
}

impl Tally {
    fn post(&mut self, reply: bool) {
        if reply {
            self.replies += 1;
        } else {
            self.posts += 1;
        }
    }

    fn reaction(&mut self, kind: ReactionKind) {
        match kind {
            ReactionKind::Like => self.likes += 1,
            ReactionKind::Recast => self.recasts += 1,
        }
    }
}

fn count_subjects(
    state: &State,
    kind: SubjectKind,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> BTreeMap<String, Tally> {
    let mut by_subject: BTreeMap<String, Tally> = BTreeMap::new();
    let casts: Vec<&Cast> = state
        .casts
        .values()
        .filter(|c| !c.deleted && in_window(c.timestamp, start, end))
        .collect();
    let reactions: Vec<&Reaction> = state
        .reactions
        .values()
        .filter(|r| !r.deleted && in_window(r.timestamp, start, end))
        .collect();

    match kind {
        SubjectKind::Author => {
            for cast in &casts {
                by_subject.entry(cast.id.fid.to_string()).or_default().post(cast.is_reply());
            }
            for reaction in &reactions {
                if let Some(target) = reaction.target.cast() {
                    by_subject.entry(target.fid.to_string()).or_default().reaction(reaction.kind);
                }
            }
        }
        SubjectKind::Channel => {
            for cast in &casts {
                if let Some(channel) = channel_of(cast) {
                    by_subject.entry(channel).or_default().post(cast.is_reply());
                }
            }
            for reaction in &reactions {
                let channel = reaction
                    .target
                    .cast()
                    .and_then(|target| state.live_cast(target))
                    .and_then(channel_of);
                if let Some(channel) = channel {
                    by_subject.entry(channel).or_default().reaction(reaction.kind);
                }
            }
        }
        SubjectKind::Cast => {
            for embed in state.cast_embeds.values() {
                let quoting_live = state
                    .live_cast(&embed.cast)
                    .is_some_and(|c| in_window(c.timestamp, start, end));
                if quoting_live {
                    by_subject.entry(embed.embedded.to_string()).or_default().posts += 1;
                }
            }
            for cast in &casts {
                if let Some(parent) = cast.parent_cast() {
                    by_subject.entry(parent.to_string()).or_default().replies += 1;
                }
            }
            for reaction in &reactions {
                if let Some(target) = reaction.target.cast() {
                    by_subject.entry(target.to_string()).or_default().reaction(reaction.kind);
                }
            }
        }
        SubjectKind::Url => {
            for cast in &casts {
                for url in state.live_urls_of(&cast.id.hash) {
                    by_subject.entry(url).or_default().posts += 1;
                }
                if let Some(parent) = cast.parent_cast() {
                    for url in state.live_urls_of(&parent.hash) {
                        by_subject.entry(url).or_default().replies += 1;
                    }
                }
            }
            for reaction in &reactions {
                match &reaction.target {
                    ReactionTarget::Cast(target) => {
                        for url in state.live_urls_of(&target.hash) {
                            by_subject.entry(url).or_default().reaction(reaction.kind);
                        }
                    }
                    ReactionTarget::Url(url) => {
                        by_subject.entry(url.clone()).or_default().reaction(reaction.kind);
                    }
                }
            }
        }
    }
    by_subject
}

#[async_trait]
impl Store for MemoryStore {
    async fn upsert_casts(&self, records: &[CastRecord], _chunk_size: usize) -> Result<CastWriteSummary> {
        let mut guard = self.state.write().await;
        let state = &mut *guard;
        let mut summary = CastWriteSummary::default();

        for record in records {
            let cast = &record.cast;
            state.log("casts", cast.id.fid);

            let revive = match state.casts.get_mut(&cast.id.hash) {
                None => {
                    let mut stored = cast.clone();
                    stored.text = sanitize_text(&stored.text);
                    stored.deleted = false;
                    stored.deleted_at = None;
                    if stored.top.is_none() {
                        stored.top = Some(TopAncestor {
                            id: stored.id.clone(),
                            channel_url: stored.parent_url().map(str::to_string),
                        });
                    }
                    state.casts.insert(cast.id.hash.clone(), stored);
                    summary.inserted += 1;
                    false
                }
                Some(existing) => {
                    let revive = existing.deleted && existing.deleted_at.is_some_and(|at| at < cast.timestamp);
                    if revive {
                        existing.deleted = false;
                        existing.deleted_at = None;
                        summary.undeleted += 1;
                    }
                    revive
                }
            };
            if revive {
                state.set_embeds_deleted(&cast.id, false);
            }

            for mention in &record.mentions {
                state.log("cast_mentions", mention.cast.fid);
                state
                    .mentions
                    .entry((mention.cast.hash.clone(), mention.mentioned_fid, mention.position))
                    .or_insert_with(|| mention.clone());
            }
            for embed in &record.url_embeds {
                state.log("url_embeds", embed.cast.fid);
                state
                    .url_embeds
                    .entry((embed.cast.hash.clone(), embed.url.clone()))
                    .or_insert_with(|| embed.clone());
            }
            for embed in &record.cast_embeds {
                state.log("cast_embeds", embed.cast.fid);
                state
                    .cast_embeds
                    .entry((embed.cast.hash.clone(), embed.embedded.hash.clone()))
                    .or_insert_with(|| embed.clone());
            }
        }
        Ok(summary)
    }

    async fn get_casts(&self, ids: &[CastId]) -> Result<Vec<Cast>> {
        let state = self.state.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| state.casts.get(&id.hash).filter(|c| c.id == *id).cloned())
            .collect())
    }

    async fn remove_cast(&self, id: &CastId, removed_at: DateTime<Utc>) -> Result<bool> {
        let mut guard = self.state.write().await;
        let state = &mut *guard;
        state.log("casts", id.fid);

        let removed = match state.casts.get_mut(&id.hash) {
            Some(cast) if cast.id == *id && !cast.deleted && cast.timestamp <= removed_at => {
                cast.deleted = true;
                cast.deleted_at = Some(removed_at);
                true
            }
            _ => false,
        };
        if removed {
            state.set_embeds_deleted(id, true);
        }
        Ok(removed)
    }

    async fn upsert_reactions(&self, reactions: &[Reaction], _chunk_size: usize) -> Result<u64> {
        let mut guard = self.state.write().await;
        let state = &mut *guard;
        let mut written = 0;
        for reaction in reactions {
            state.log("reactions", reaction.fid);
            let key = (reaction.fid, reaction.target.key(), reaction.kind);
            if apply_add(&mut state.reactions, key, reaction) {
                written += 1;
            }
        }
        Ok(written)
    }

    async fn remove_reactions(&self, reactions: &[Reaction], _chunk_size: usize) -> Result<u64> {
        let mut guard = self.state.write().await;
        let state = &mut *guard;
        let mut written = 0;
        for reaction in reactions {
            state.log("reactions", reaction.fid);
            let key = (reaction.fid, reaction.target.key(), reaction.kind);
            if apply_remove(&mut state.reactions, key, reaction) {
                written += 1;
            }
        }
        Ok(written)
    }

    async fn upsert_links(&self, links: &[Link], _chunk_size: usize) -> Result<u64> {
        let mut guard = self.state.write().await;
        let state = &mut *guard;
        let mut written = 0;
        for link in links {
            state.log("links", link.fid);
            let key = (link.fid, link.kind.clone(), link.target_fid);
            if apply_add(&mut state.links, key, link) {
                written += 1;
            }
        }
        Ok(written)
    }

    async fn remove_links(&self, links: &[Link], _chunk_size: usize) -> Result<u64> {
        let mut guard = self.state.write().await;
        let state = &mut *guard;
        let mut written = 0;
        for link in links {
            state.log("links", link.fid);
            let key = (link.fid, link.kind.clone(), link.target_fid);
            if apply_remove(&mut state.links, key, link) {
                written += 1;
            }
        }
        Ok(written)
    }

    async fn upsert_profile_fields(&self, fields: &[ProfileField], _chunk_size: usize) -> Result<u64> {
        let mut guard = self.state.write().await;
        let state = &mut *guard;
        let mut written = 0;
        for field in fields {
            state.log("profile_fields", field.fid);
            let key = (field.fid, field.field.clone());
            let newer = state
                .profile_fields
                .get(&key)
                .map_or(true, |current| current.timestamp < field.timestamp);
            if newer {
                let mut row = field.clone();
                row.value = sanitize_text(&row.value);
                state.profile_fields.insert(key, row);
                written += 1;
            }
        }
        Ok(written)
    }

    async fn upsert_verifications(&self, verifications: &[Verification], _chunk_size: usize) -> Result<u64> {
        let mut guard = self.state.write().await;
        let state = &mut *guard;
        let mut written = 0;
        for verification in verifications {
            state.log("verifications", verification.fid);
            let key = (verification.fid, verification.address.clone());
            if apply_add(&mut state.verifications, key, verification) {
                written += 1;
            }
        }
        Ok(written)
    }

    async fn remove_verifications(&self, verifications: &[Verification], _chunk_size: usize) -> Result<u64> {
        let mut guard = self.state.write().await;
        let state = &mut *guard;
        let mut written = 0;
        for verification in verifications {
            state.log("verifications", verification.fid);
            let key = (verification.fid, verification.address.clone());
            if apply_remove(&mut state.verifications, key, verification) {
                written += 1;
            }
        }
        Ok(written)
    }

    async fn enriched_among(&self, ids: &[CastId]) -> Result<HashSet<CastHash>> {
        let state = self.state.read().await;
        Ok(ids
            .iter()
            .filter(|id| state.is_enriched(&id.hash))
            .map(|id| id.hash.clone())
            .collect())
    }

    async fn save_keywords(&self, cast: &CastId, keywords: &[Keyword], _chunk_size: usize) -> Result<u64> {
        let mut guard = self.state.write().await;
        let state = &mut *guard;
        let mut written = 0;
        for keyword in keywords {
            state.log("cast_keywords", cast.fid);
            let key = (cast.hash.clone(), keyword.keyword.clone());
            if let std::collections::btree_map::Entry::Vacant(slot) = state.keywords.entry(key) {
                slot.insert(keyword.clone());
                written += 1;
            }
        }
        state.log("keyword_runs", cast.fid);
        state.keyword_runs.insert(cast.hash.clone(), keywords.len());
        Ok(written)
    }

    async fn pending_enrichment(&self, limit: usize) -> Result<Vec<Cast>> {
        let state = self.state.read().await;
        let mut pending: Vec<Cast> = state
            .casts
            .values()
            .filter(|c| !c.deleted && !state.is_enriched(&c.id.hash))
            .cloned()
            .collect();
        pending.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        pending.truncate(limit);
        Ok(pending)
    }

    async fn get_checkpoint(&self, name: &str) -> Result<Option<i64>> {
        Ok(self.state.read().await.checkpoints.get(name).map(|(value, _)| *value))
    }

    async fn set_checkpoint(&self, name: &str, value: i64) -> Result<()> {
        self.state
            .write()
            .await
            .checkpoints
            .insert(name.to_string(), (value, Utc::now()));
        Ok(())
    }

    async fn delete_checkpoint(&self, name: &str) -> Result<bool> {
        Ok(self.state.write().await.checkpoints.remove(name).is_some())
    }

    async fn list_checkpoints(&self) -> Result<Vec<Checkpoint>> {
        let state = self.state.read().await;
        Ok(state
            .checkpoints
            .iter()
            .map(|(name, (value, updated_at))| Checkpoint {
                name: name.clone(),
                value: *value,
                updated_at: *updated_at,
            })
            .collect())
    }

    async fn reaction_tallies(&self, since: Option<DateTime<Utc>>, scope: &TopScope) -> Result<Vec<ReactionTally>> {
        let guard = self.state.read().await;
        let state = &*guard;
        let since = since.unwrap_or_default();
        let mut tallies: BTreeMap<CastId, ReactionTally> = BTreeMap::new();

        for reaction in state.reactions.values() {
            let Some(target) = reaction.target.cast() else {
                continue;
            };
            if reaction.deleted || reaction.timestamp < since || !scope_matches(state, target, scope) {
                continue;
            }
            let tally = tallies.entry(target.clone()).or_insert_with(|| ReactionTally {
                target: target.clone(),
                likes: 0,
                recasts: 0,
                earliest: reaction.timestamp,
            });
            match reaction.kind {
                ReactionKind::Like => tally.likes += 1,
                ReactionKind::Recast => tally.recasts += 1,
            }
            tally.earliest = tally.earliest.min(reaction.timestamp);
        }
        Ok(tallies.into_values().collect())
    }

    async fn top_targets(&self, query: &TopQuery, now: DateTime<Utc>) -> Result<Vec<TopEntry>> {
        let tallies = self.reaction_tallies(query.window.since(now), &query.scope).await?;
        Ok(rank_top(&tallies, query.metric, query.limit, query.offset))
    }

    async fn subject_counts(
        &self,
        kind: SubjectKind,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<SubjectCounts>> {
        let state = self.state.read().await;
        Ok(count_subjects(&state, kind, start, end)
            .into_iter()
            .map(|(subject, t)| SubjectCounts {
                subject,
                posts: t.posts,
                replies: t.replies,
                likes: t.likes,
                recasts: t.recasts,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::models::ParentRef;

    fn id(fid: u64, last: u8) -> CastId {
        let mut bytes = [0u8; 20];
        bytes[19] = last;
        CastId::new(fid, CastHash::from_bytes(&bytes).unwrap())
    }

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap()
    }

    fn record(id: CastId, ts: DateTime<Utc>, parent: Option<ParentRef>) -> CastRecord {
        CastRecord {
            cast: Cast {
                id,
                timestamp: ts,
                text: "gm".into(),
                parent,
                top: None,
                deleted: false,
                deleted_at: None,
            },
            mentions: vec![],
            url_embeds: vec![],
            cast_embeds: vec![],
        }
    }

    fn like(fid: u64, target: CastId, ts: DateTime<Utc>) -> Reaction {
        Reaction {
            fid,
            kind: ReactionKind::Like,
            target: ReactionTarget::Cast(target),
            timestamp: ts,
            deleted: false,
        }
    }

    #[tokio::test]
    async fn test_replayed_add_does_not_revive_removed_cast() {
        let store = MemoryStore::new();
        let cast = id(1, 1);
        store.upsert_casts(&[record(cast.clone(), at(0), None)], 100).await.unwrap();
        assert!(store.remove_cast(&cast, at(10)).await.unwrap());

        let replay = store.upsert_casts(&[record(cast.clone(), at(0), None)], 100).await.unwrap();
        assert_eq!(replay, CastWriteSummary::default());
        assert!(store.cast(&cast).await.unwrap().deleted);

        let newer = store.upsert_casts(&[record(cast.clone(), at(20), None)], 100).await.unwrap();
        assert_eq!(newer.undeleted, 1);
        assert!(!store.cast(&cast).await.unwrap().deleted);
    }

    #[tokio::test]
    async fn test_remove_before_add_leaves_tombstone() {
        let store = MemoryStore::new();
        let target = id(2, 2);
        let mut removed = like(5, target.clone(), at(10));
        removed.deleted = true;
        store.remove_reactions(&[removed], 100).await.unwrap();

        assert_eq!(store.upsert_reactions(&[like(5, target.clone(), at(5))], 100).await.unwrap(), 0);
        assert!(store.reactions().await[0].deleted);
        assert_eq!(store.upsert_reactions(&[like(5, target, at(11))], 100).await.unwrap(), 1);
        assert!(!store.reactions().await[0].deleted);
    }

    #[tokio::test]
    async fn test_tallies_respect_scope_and_deleted_targets() {
        let store = MemoryStore::new();
        let root = id(1, 1);
        let reply = id(1, 2);
        let gone = id(3, 3);
        store
            .upsert_casts(
                &[
                    record(root.clone(), at(0), Some(ParentRef::Url("https://chan".into()))),
                    record(reply.clone(), at(1), Some(ParentRef::Cast(root.clone()))),
                    record(gone.clone(), at(2), None),
                ],
                100,
            )
            .await
            .unwrap();
        store.remove_cast(&gone, at(3)).await.unwrap();
        store
            .upsert_reactions(
                &[like(7, root.clone(), at(5)), like(8, reply.clone(), at(5)), like(7, gone, at(5))],
                100,
            )
            .await
            .unwrap();

        let all = store.reaction_tallies(None, &TopScope::Global).await.unwrap();
        assert_eq!(all.len(), 2);
        let replies = store.reaction_tallies(None, &TopScope::AuthorReplies(1)).await.unwrap();
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].target, reply);
        let channel = store
            .reaction_tallies(Some(at(4)), &TopScope::Channel("https://chan".into()))
            .await
            .unwrap();
        assert_eq!(channel.len(), 1);
        assert_eq!(channel[0].target, root);
        assert!(store
            .reaction_tallies(Some(at(6)), &TopScope::Global)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_author_subject_counts_window_is_half_open() {
        let store = MemoryStore::new();
        let root = id(4, 1);
        store
            .upsert_casts(
                &[
                    record(root.clone(), at(0), None),
                    record(id(4, 2), at(10), Some(ParentRef::Cast(root.clone()))),
                ],
                100,
            )
            .await
            .unwrap();
        store.upsert_reactions(&[like(9, root, at(5))], 100).await.unwrap();

        let counts = store.subject_counts(SubjectKind::Author, at(0), at(10)).await.unwrap();
        assert_eq!(counts.len(), 1);
        assert_eq!(counts[0].subject, "4");
        assert_eq!((counts[0].posts, counts[0].replies, counts[0].likes), (1, 0, 1));

        let wider = store
            .subject_counts(SubjectKind::Author, at(0), at(10) + Duration::seconds(1))
            .await
            .unwrap();
        assert_eq!(wider[0].replies, 1);
    }
}
