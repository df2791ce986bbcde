//! Shared fixtures: a scripted in-process hub and hub message builders

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Mutex;

use async_trait::async_trait;
use castfeed::config::SyncConfig;
use castfeed::models::CastHash;
use castfeed::models::CastId;
use castfeed::models::Reaction;
use castfeed::models::UserProfile;
use castfeed::models::Verification;
use castfeed::sync::CastAddBody;
use castfeed::sync::CastRemoveBody;
use castfeed::sync::HistoryKind;
use castfeed::sync::HubClient;
use castfeed::sync::HubEvent;
use castfeed::sync::HubEventType;
use castfeed::sync::HubInfo;
use castfeed::sync::HubMessage;
use castfeed::sync::LinkBody;
use castfeed::sync::MessageData;
use castfeed::sync::MessagePage;
use castfeed::sync::ReactionBody;
use castfeed::sync::UserDataBody;
use castfeed::sync::WireCastId;
use castfeed::CastfeedError;
use castfeed::Result;
use chrono::DateTime;
use chrono::Utc;
use futures::stream::BoxStream;
use futures::StreamExt;

/// Protocol seconds for 2024-01-01T00:00:00Z
pub const BASE_TS: u64 = 94_608_000;

/// History pages handed out by [`ScriptedHub`] hold this many messages
pub const PAGE_SIZE: usize = 2;

/// Deterministic 20-byte hash: `tag` repeated
pub fn hash(tag: u8) -> CastHash {
    CastHash::from_bytes(&[tag; 20]).expect("20 bytes")
}

/// Hash distinguishing `n` casts under one `tag`
pub fn hash_n(tag: u8, n: u16) -> CastHash {
    let mut bytes = [tag; 20];
    bytes[18..].copy_from_slice(&n.to_be_bytes());
    CastHash::from_bytes(&bytes).expect("20 bytes")
}

pub fn cast_id(fid: u64, tag: u8) -> CastId {
    CastId::new(fid, hash(tag))
}

pub fn at(protocol_secs: u64) -> DateTime<Utc> {
    castfeed::sync::from_farcaster_time(protocol_secs)
}

pub fn sync_config() -> SyncConfig {
    SyncConfig {
        write_chunk_size: 3000,
        backfill_max_fid: None,
        live_checkpoint_interval: 2,
    }
}

fn data(message_type: &str, fid: u64, timestamp: u64) -> MessageData {
    MessageData {
        message_type: message_type.to_string(),
        fid,
        timestamp,
        cast_add_body: None,
        cast_remove_body: None,
        reaction_body: None,
        link_body: None,
        user_data_body: None,
        verification_add_address_body: None,
        verification_remove_body: None,
    }
}

fn wire(id: &CastId) -> WireCastId {
    WireCastId {
        fid: id.fid,
        hash: id.hash.to_string(),
    }
}

fn message(data: MessageData, hash: String) -> HubMessage {
    HubMessage { data: Some(data), hash }
}

pub fn cast_add(id: &CastId, timestamp: u64, text: &str, parent: Option<&CastId>) -> HubMessage {
    let mut data = data("MESSAGE_TYPE_CAST_ADD", id.fid, timestamp);
    data.cast_add_body = Some(CastAddBody {
        text: text.to_string(),
        parent_cast_id: parent.map(wire),
        ..CastAddBody::default()
    });
    message(data, id.hash.to_string())
}

pub fn channel_cast_add(id: &CastId, timestamp: u64, text: &str, channel: &str) -> HubMessage {
    let mut data = data("MESSAGE_TYPE_CAST_ADD", id.fid, timestamp);
    data.cast_add_body = Some(CastAddBody {
        text: text.to_string(),
        parent_url: Some(channel.to_string()),
        ..CastAddBody::default()
    });
    message(data, id.hash.to_string())
}

pub fn cast_remove(id: &CastId, timestamp: u64) -> HubMessage {
    let mut data = data("MESSAGE_TYPE_CAST_REMOVE", id.fid, timestamp);
    data.cast_remove_body = Some(CastRemoveBody {
        target_hash: id.hash.to_string(),
    });
    message(data, hash(0xF0).to_string())
}

fn reaction(message_type: &str, fid: u64, reaction_type: &str, target: &CastId, timestamp: u64) -> HubMessage {
    let mut data = data(message_type, fid, timestamp);
    data.reaction_body = Some(ReactionBody {
        reaction_type: reaction_type.to_string(),
        target_cast_id: Some(wire(target)),
        target_url: None,
    });
    message(data, hash(0xF1).to_string())
}

pub fn like(fid: u64, target: &CastId, timestamp: u64) -> HubMessage {
    reaction("MESSAGE_TYPE_REACTION_ADD", fid, "REACTION_TYPE_LIKE", target, timestamp)
}

pub fn recast(fid: u64, target: &CastId, timestamp: u64) -> HubMessage {
    reaction("MESSAGE_TYPE_REACTION_ADD", fid, "REACTION_TYPE_RECAST", target, timestamp)
}

pub fn unlike(fid: u64, target: &CastId, timestamp: u64) -> HubMessage {
    reaction("MESSAGE_TYPE_REACTION_REMOVE", fid, "REACTION_TYPE_LIKE", target, timestamp)
}

pub fn follow(fid: u64, target_fid: u64, timestamp: u64) -> HubMessage {
    let mut data = data("MESSAGE_TYPE_LINK_ADD", fid, timestamp);
    data.link_body = Some(LinkBody {
        link_type: "follow".to_string(),
        target_fid: Some(target_fid),
    });
    message(data, hash(0xF2).to_string())
}

pub fn user_data(fid: u64, data_type: &str, value: &str, timestamp: u64) -> HubMessage {
    let mut data = data("MESSAGE_TYPE_USER_DATA_ADD", fid, timestamp);
    data.user_data_body = Some(UserDataBody {
        data_type: data_type.to_string(),
        value: value.to_string(),
    });
    message(data, hash(0xF3).to_string())
}

/// A message of a type the pipeline does not store
pub fn frame_action(fid: u64, timestamp: u64) -> HubMessage {
    message(data("MESSAGE_TYPE_FRAME_ACTION", fid, timestamp), hash(0xF4).to_string())
}

/// A cast add whose body is missing
pub fn bodiless_cast_add(fid: u64, timestamp: u64) -> HubMessage {
    message(data("MESSAGE_TYPE_CAST_ADD", fid, timestamp), hash(0xF5).to_string())
}

pub fn merge_event(id: u64, message: HubMessage) -> HubEvent {
    HubEvent {
        id,
        event_type: HubEventType::MergeMessage,
        message: Some(message),
    }
}

/// In-process [`HubClient`] answering from scripted data
#[derive(Default)]
pub struct ScriptedHub {
    casts: HashMap<CastHash, HubMessage>,
    history: HashMap<(HistoryKind, u64), Vec<HubMessage>>,
    reactions: HashMap<CastHash, Vec<Reaction>>,
    profiles: HashMap<u64, UserProfile>,
    verifications: HashMap<u64, Vec<Verification>>,
    events: Vec<HubEvent>,
    fail_stream_after_events: bool,
    max_fid: u64,
    cast_lookups: AtomicUsize,
    history_requests: Mutex<Vec<u64>>,
    subscribed_from: Mutex<Vec<Option<u64>>>,
}

impl ScriptedHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make a cast available to point lookups
    pub fn with_cast(mut self, message: HubMessage) -> Self {
        let hash: CastHash = message.hash.parse().expect("scripted cast hash");
        self.casts.insert(hash, message);
        self
    }

    /// Append to a fid's history; casts are also made available to lookups
    pub fn with_history(mut self, kind: HistoryKind, fid: u64, messages: Vec<HubMessage>) -> Self {
        if kind == HistoryKind::Casts {
            for message in &messages {
                if let Ok(hash) = message.hash.parse::<CastHash>() {
                    self.casts.insert(hash, message.clone());
                }
            }
        }
        self.history.entry((kind, fid)).or_default().extend(messages);
        self.max_fid = self.max_fid.max(fid);
        self
    }

    pub fn with_reactions(mut self, target: &CastId, reactions: Vec<Reaction>) -> Self {
        self.reactions.insert(target.hash.clone(), reactions);
        self
    }

    pub fn with_profile(mut self, profile: UserProfile) -> Self {
        self.profiles.insert(profile.fid, profile);
        self
    }

    pub fn with_verifications(mut self, fid: u64, verifications: Vec<Verification>) -> Self {
        self.verifications.insert(fid, verifications);
        self
    }

    pub fn with_events(mut self, events: Vec<HubEvent>) -> Self {
        self.events.extend(events);
        self
    }

    /// End the event stream with an error instead of closing it
    pub fn failing_stream(mut self) -> Self {
        self.fail_stream_after_events = true;
        self
    }

    pub fn with_max_fid(mut self, max_fid: u64) -> Self {
        self.max_fid = max_fid;
        self
    }

    pub fn cast_lookups(&self) -> usize {
        self.cast_lookups.load(Ordering::SeqCst)
    }

    /// Fids whose history was requested, in request order
    pub fn history_requests(&self) -> Vec<u64> {
        self.history_requests.lock().expect("lock").clone()
    }

    pub fn subscribed_from(&self) -> Vec<Option<u64>> {
        self.subscribed_from.lock().expect("lock").clone()
    }
}

#[async_trait]
impl HubClient for ScriptedHub {
    async fn connect(&self) -> Result<HubInfo> {
        Ok(HubInfo {
            version: "scripted".to_string(),
            ..HubInfo::default()
        })
    }

    async fn get_cast(&self, id: &CastId) -> Option<HubMessage> {
        self.cast_lookups.fetch_add(1, Ordering::SeqCst);
        self.casts.get(&id.hash).cloned()
    }

    async fn get_reactions_for(&self, id: &CastId) -> Vec<Reaction> {
        self.reactions.get(&id.hash).cloned().unwrap_or_default()
    }

    async fn get_verified_addresses(&self, fid: u64) -> Vec<Verification> {
        self.verifications.get(&fid).cloned().unwrap_or_default()
    }

    async fn get_user_profile(&self, fid: u64) -> Option<UserProfile> {
        self.profiles.get(&fid).cloned()
    }

    async fn max_fid(&self) -> Result<u64> {
        Ok(self.max_fid)
    }

    async fn history_page(&self, kind: HistoryKind, fid: u64, page_token: Option<&str>) -> Result<MessagePage> {
        self.history_requests.lock().expect("lock").push(fid);
        let messages = self.history.get(&(kind, fid)).cloned().unwrap_or_default();
        let start: usize = match page_token {
            Some(token) => token
                .parse()
                .map_err(|_| CastfeedError::Protocol(format!("bad page token {token}")))?,
            None => 0,
        };
        let end = (start + PAGE_SIZE).min(messages.len());
        Ok(MessagePage {
            messages: messages.get(start..end).map(<[HubMessage]>::to_vec).unwrap_or_default(),
            next_page_token: (end < messages.len()).then(|| end.to_string()),
        })
    }

    fn subscribe(&self, event_types: &[HubEventType], from_event_id: Option<u64>) -> BoxStream<'static, Result<HubEvent>> {
        self.subscribed_from.lock().expect("lock").push(from_event_id);
        let events: Vec<Result<HubEvent>> = self
            .events
            .iter()
            .filter(|e| event_types.contains(&e.event_type))
            .filter(|e| from_event_id.map_or(true, |from| e.id >= from))
            .cloned()
            .map(Ok)
            .collect();
        let tail = self
            .fail_stream_after_events
            .then(|| Err(CastfeedError::StreamTerminated("scripted disconnect".to_string())));
        futures::stream::iter(events.into_iter().chain(tail)).boxed()
    }
}
