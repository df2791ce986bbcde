//! Hub HTTP API wire types and event classification
//!
//! The hub speaks camelCase JSON. Every message carries a `data.type`
//! discriminant and at most one populated body; [`classify`] turns a message
//! into an [`EventPayload`] or reports why it cannot.

use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde_json::Value;

use crate::models::CastHash;
use crate::models::CastId;
use crate::models::Link;
use crate::models::ProfileField;
use crate::models::Reaction;
use crate::models::ReactionKind;
use crate::models::ReactionTarget;
use crate::models::Verification;
use crate::models::LINK_KIND_FOLLOW;

pub const MESSAGE_TYPE_CAST_ADD: &str = "MESSAGE_TYPE_CAST_ADD";
pub const MESSAGE_TYPE_CAST_REMOVE: &str = "MESSAGE_TYPE_CAST_REMOVE";
pub const MESSAGE_TYPE_REACTION_ADD: &str = "MESSAGE_TYPE_REACTION_ADD";
pub const MESSAGE_TYPE_REACTION_REMOVE: &str = "MESSAGE_TYPE_REACTION_REMOVE";
pub const MESSAGE_TYPE_LINK_ADD: &str = "MESSAGE_TYPE_LINK_ADD";
pub const MESSAGE_TYPE_LINK_REMOVE: &str = "MESSAGE_TYPE_LINK_REMOVE";
pub const MESSAGE_TYPE_USER_DATA_ADD: &str = "MESSAGE_TYPE_USER_DATA_ADD";
pub const MESSAGE_TYPE_VERIFICATION_ADD: &str = "MESSAGE_TYPE_VERIFICATION_ADD_ETH_ADDRESS";
pub const MESSAGE_TYPE_VERIFICATION_REMOVE: &str = "MESSAGE_TYPE_VERIFICATION_REMOVE";

/// Convert a protocol timestamp to wall-clock time
#[must_use]
pub fn from_farcaster_time(seconds: u64) -> DateTime<Utc> {
    let unix = i64::try_from(crate::farcaster_to_unix_timestamp(seconds)).unwrap_or(i64::MAX);
    DateTime::from_timestamp(unix, 0).unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Convert wall-clock time to a protocol timestamp, clamping pre-epoch times to zero
#[must_use]
pub fn to_farcaster_time(time: DateTime<Utc>) -> u64 {
    u64::try_from(time.timestamp())
        .ok()
        .and_then(|unix| unix.checked_sub(crate::FARCASTER_EPOCH / 1000))
        .unwrap_or(0)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireCastId {
    pub fid: u64,
    pub hash: String,
}

impl WireCastId {
    #[must_use]
    pub fn parse(&self) -> Option<CastId> {
        Some(CastId::new(self.fid, self.hash.parse().ok()?))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireEmbed {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cast_id: Option<WireCastId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CastAddBody {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub mentions: Vec<u64>,
    #[serde(default)]
    pub mentions_positions: Vec<u32>,
    #[serde(default)]
    pub embeds: Vec<WireEmbed>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_cast_id: Option<WireCastId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CastRemoveBody {
    #[serde(default)]
    pub target_hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactionBody {
    #[serde(default, rename = "type")]
    pub reaction_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_cast_id: Option<WireCastId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkBody {
    #[serde(default, rename = "type")]
    pub link_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_fid: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserDataBody {
    #[serde(default, rename = "type")]
    pub data_type: String,
    #[serde(default)]
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationBody {
    #[serde(default)]
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageData {
    #[serde(default, rename = "type")]
    pub message_type: String,
    #[serde(default)]
    pub fid: u64,
    #[serde(default)]
    pub timestamp: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cast_add_body: Option<CastAddBody>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cast_remove_body: Option<CastRemoveBody>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reaction_body: Option<ReactionBody>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link_body: Option<LinkBody>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_data_body: Option<UserDataBody>,
    #[serde(
        default,
        alias = "verificationAddEthAddressBody",
        skip_serializing_if = "Option::is_none"
    )]
    pub verification_add_address_body: Option<VerificationBody>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification_remove_body: Option<VerificationBody>,
}

/// One signed hub message; signature fields are not needed downstream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HubMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<MessageData>,
    #[serde(default)]
    pub hash: String,
}

/// Paged response shared by `castsByFid`, `reactionsByFid`, `linksByFid`, ...
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePage {
    #[serde(default, deserialize_with = "lenient_messages")]
    pub messages: Vec<HubMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_page_token: Option<String>,
}

impl MessagePage {
    /// The hub signals the last page with an absent or empty token
    #[must_use]
    pub fn next_token(&self) -> Option<&str> {
        self.next_page_token.as_deref().filter(|t| !t.is_empty())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FidsPage {
    #[serde(default)]
    pub fids: Vec<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_page_token: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HubInfo {
    #[serde(default)]
    pub version: String,
    #[serde(default, alias = "peer_id")]
    pub peer_id: String,
    #[serde(default)]
    pub num_shards: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HubEventType {
    MergeMessage,
    PruneMessage,
    RevokeMessage,
    MergeOnChainEvent,
    MergeUsernameProof,
    Other,
}

impl HubEventType {
    #[must_use]
    pub fn from_hub(value: &str) -> Self {
        match value {
            "HUB_EVENT_TYPE_MERGE_MESSAGE" => Self::MergeMessage,
            "HUB_EVENT_TYPE_PRUNE_MESSAGE" => Self::PruneMessage,
            "HUB_EVENT_TYPE_REVOKE_MESSAGE" => Self::RevokeMessage,
            "HUB_EVENT_TYPE_MERGE_ON_CHAIN_EVENT" => Self::MergeOnChainEvent,
            "HUB_EVENT_TYPE_MERGE_USERNAME_PROOF" => Self::MergeUsernameProof,
            _ => Self::Other,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeMessageBody {
    #[serde(deserialize_with = "lenient_message")]
    pub message: HubMessage,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merge_message_body: Option<MergeMessageBody>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventsPage {
    #[serde(default, deserialize_with = "lenient_events")]
    pub events: Vec<WireEvent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_page_event_id: Option<u64>,
}

/// An event delivered by the subscription
#[derive(Debug, Clone)]
pub struct HubEvent {
    pub id: u64,
    pub event_type: HubEventType,
    pub message: Option<HubMessage>,
}

impl From<WireEvent> for HubEvent {
    fn from(event: WireEvent) -> Self {
        Self {
            id: event.id,
            event_type: HubEventType::from_hub(&event.event_type),
            message: event.merge_message_body.map(|body| body.message),
        }
    }
}

/// Decode one message without failing its page
///
/// A message that does not fit the wire types keeps only its hash, so
/// [`classify`] reports it as malformed and the caller counts it as dropped.
fn message_or_placeholder(value: Value) -> HubMessage {
    let hash = value
        .get("hash")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    serde_json::from_value(value).unwrap_or_else(|e| {
        tracing::debug!("Undecodable hub message {}: {}", hash, e);
        HubMessage { data: None, hash }
    })
}

fn lenient_message<'de, D: Deserializer<'de>>(deserializer: D) -> Result<HubMessage, D::Error> {
    Ok(message_or_placeholder(Value::deserialize(deserializer)?))
}

fn lenient_messages<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<HubMessage>, D::Error> {
    let values = Vec::<Value>::deserialize(deserializer)?;
    Ok(values.into_iter().map(message_or_placeholder).collect())
}

/// Events without a usable id or type cannot be checkpointed and are skipped
fn lenient_events<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<WireEvent>, D::Error> {
    let values = Vec::<Value>::deserialize(deserializer)?;
    Ok(values
        .into_iter()
        .filter_map(|value| match serde_json::from_value::<WireEvent>(value) {
            Ok(event) => Some(event),
            Err(e) => {
                tracing::warn!("Skipping undecodable hub event: {}", e);
                None
            }
        })
        .collect())
}

/// A cast-add message with its identity already validated
#[derive(Debug, Clone, PartialEq)]
pub struct RawCast {
    pub id: CastId,
    pub timestamp: DateTime<Utc>,
    pub body: CastAddBody,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EventPayload {
    CastAdd(RawCast),
    CastRemove {
        id: CastId,
        timestamp: DateTime<Utc>,
    },
    ReactionAdd(Reaction),
    ReactionRemove(Reaction),
    LinkAdd(Link),
    LinkRemove(Link),
    ProfileUpdate(ProfileField),
    /// `deleted` is set for verification removes
    VerificationUpdate(Verification),
}

/// Outcome of classifying one message
#[derive(Debug, Clone, PartialEq)]
pub enum Classified {
    Payload(EventPayload),
    /// A message type the pipeline does not store
    Unsupported(String),
    /// A handled type with required fields missing or invalid
    Malformed(String),
}

/// Classify a hub message by its `data.type` discriminant
#[must_use]
pub fn classify(message: &HubMessage) -> Classified {
    let Some(data) = &message.data else {
        return Classified::Malformed("message has no data".to_string());
    };
    if data.message_type.is_empty() {
        return Classified::Malformed("message has no type".to_string());
    }
    if data.fid == 0 {
        return Classified::Malformed(format!("{} has no fid", data.message_type));
    }
    let timestamp = from_farcaster_time(data.timestamp);

    let payload = match data.message_type.as_str() {
        MESSAGE_TYPE_CAST_ADD => cast_add(message, data, timestamp),
        MESSAGE_TYPE_CAST_REMOVE => data.cast_remove_body.as_ref().and_then(|body| {
            let hash: CastHash = body.target_hash.parse().ok()?;
            Some(EventPayload::CastRemove {
                id: CastId::new(data.fid, hash),
                timestamp,
            })
        }),
        MESSAGE_TYPE_REACTION_ADD => reaction(data, timestamp, false).map(EventPayload::ReactionAdd),
        MESSAGE_TYPE_REACTION_REMOVE => {
            reaction(data, timestamp, true).map(EventPayload::ReactionRemove)
        }
        MESSAGE_TYPE_LINK_ADD => link(data, timestamp, false).map(EventPayload::LinkAdd),
        MESSAGE_TYPE_LINK_REMOVE => link(data, timestamp, true).map(EventPayload::LinkRemove),
        MESSAGE_TYPE_USER_DATA_ADD => data
            .user_data_body
            .as_ref()
            .filter(|body| !body.data_type.is_empty())
            .map(|body| {
                EventPayload::ProfileUpdate(ProfileField {
                    fid: data.fid,
                    field: profile_field_name(&body.data_type),
                    value: crate::models::sanitize_text(&body.value),
                    timestamp,
                })
            }),
        MESSAGE_TYPE_VERIFICATION_ADD => data
            .verification_add_address_body
            .as_ref()
            .filter(|body| !body.address.is_empty())
            .map(|body| EventPayload::VerificationUpdate(verification(data.fid, body, timestamp, false))),
        MESSAGE_TYPE_VERIFICATION_REMOVE => data
            .verification_remove_body
            .as_ref()
            .filter(|body| !body.address.is_empty())
            .map(|body| EventPayload::VerificationUpdate(verification(data.fid, body, timestamp, true))),
        other => return Classified::Unsupported(other.to_string()),
    };

    payload.map_or_else(
        || Classified::Malformed(format!("{} from fid {} is missing required fields", data.message_type, data.fid)),
        Classified::Payload,
    )
}

fn cast_add(message: &HubMessage, data: &MessageData, timestamp: DateTime<Utc>) -> Option<EventPayload> {
    let body = data.cast_add_body.as_ref()?;
    let hash: CastHash = message.hash.parse().ok()?;
    // A parent id that fails to parse would silently turn a reply into a root
    if let Some(parent) = &body.parent_cast_id {
        parent.parse()?;
    }
    Some(EventPayload::CastAdd(RawCast {
        id: CastId::new(data.fid, hash),
        timestamp,
        body: body.clone(),
    }))
}

fn reaction(data: &MessageData, timestamp: DateTime<Utc>, deleted: bool) -> Option<Reaction> {
    let body = data.reaction_body.as_ref()?;
    let kind = ReactionKind::from_hub(&body.reaction_type)?;
    let target = match (&body.target_cast_id, &body.target_url) {
        (Some(cast_id), _) => ReactionTarget::Cast(cast_id.parse()?),
        (None, Some(url)) => ReactionTarget::Url(url.clone()),
        (None, None) => return None,
    };
    Some(Reaction {
        fid: data.fid,
        kind,
        target,
        timestamp,
        deleted,
    })
}

fn link(data: &MessageData, timestamp: DateTime<Utc>, deleted: bool) -> Option<Link> {
    let body = data.link_body.as_ref()?;
    if body.link_type != LINK_KIND_FOLLOW {
        return None;
    }
    Some(Link {
        fid: data.fid,
        kind: body.link_type.clone(),
        target_fid: body.target_fid?,
        timestamp,
        deleted,
    })
}

fn verification(fid: u64, body: &VerificationBody, timestamp: DateTime<Utc>, deleted: bool) -> Verification {
    let protocol = match body.protocol.as_deref() {
        Some("PROTOCOL_SOLANA") => "solana",
        _ => "ethereum",
    };
    Verification {
        fid,
        address: body.address.to_lowercase(),
        protocol: protocol.to_string(),
        timestamp,
        deleted,
    }
}

/// `USER_DATA_TYPE_DISPLAY` -> `display`
fn profile_field_name(data_type: &str) -> String {
    data_type
        .strip_prefix("USER_DATA_TYPE_")
        .unwrap_or(data_type)
        .to_lowercase()
}
