//! Domain types shared by ingestion, storage and ranking

use std::fmt;
use std::str::FromStr;

use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;

use crate::CastfeedError;

/// Length of a message hash in bytes (blake3 truncated to 160 bits)
pub const HASH_LEN: usize = 20;

/// Message hash, rendered as `0x` followed by 40 lowercase hex digits
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CastHash(Vec<u8>);

impl CastHash {
    /// Wrap raw hash bytes
    ///
    /// # Errors
    /// Returns `InvalidHash` when the slice is not exactly 20 bytes
    pub fn from_bytes(bytes: &[u8]) -> crate::Result<Self> {
        if bytes.len() != HASH_LEN {
            return Err(CastfeedError::InvalidHash(format!(
                "expected {HASH_LEN} bytes, got {}",
                bytes.len()
            )));
        }
        Ok(Self(bytes.to_vec()))
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl FromStr for CastHash {
    type Err = CastfeedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s
            .strip_prefix("0x")
            .ok_or_else(|| CastfeedError::InvalidHash(format!("missing 0x prefix: {s}")))?;
        let bytes = hex::decode(digits)
            .map_err(|e| CastfeedError::InvalidHash(format!("{s}: {e}")))?;
        Self::from_bytes(&bytes)
    }
}

impl TryFrom<String> for CastHash {
    type Error = CastfeedError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<CastHash> for String {
    fn from(hash: CastHash) -> Self {
        hash.to_string()
    }
}

impl fmt::Display for CastHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(&self.0))
    }
}

impl fmt::Debug for CastHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CastHash({self})")
    }
}

/// Identity of a cast: author fid plus message hash
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CastId {
    pub fid: u64,
    pub hash: CastHash,
}

impl CastId {
    #[must_use]
    pub const fn new(fid: u64, hash: CastHash) -> Self {
        Self { fid, hash }
    }
}

impl fmt::Display for CastId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.fid, self.hash)
    }
}

/// Parses the `fid:0xhash` form used on the command line
impl FromStr for CastId {
    type Err = CastfeedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (fid, hash) = s
            .split_once(':')
            .ok_or_else(|| CastfeedError::InvalidHash(format!("expected fid:0xhash, got {s}")))?;
        let fid = fid
            .parse::<u64>()
            .map_err(|e| CastfeedError::InvalidHash(format!("bad fid in {s}: {e}")))?;
        Ok(Self::new(fid, hash.parse()?))
    }
}

/// What a cast replies to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParentRef {
    Cast(CastId),
    /// Channel-anchored cast
    Url(String),
}

/// Resolved root of a cast's reply chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopAncestor {
    pub id: CastId,
    /// Parent URL of the root, when the root is channel-anchored
    pub channel_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cast {
    pub id: CastId,
    pub timestamp: DateTime<Utc>,
    pub text: String,
    pub parent: Option<ParentRef>,
    /// Filled in by ancestor resolution before the cast is stored
    pub top: Option<TopAncestor>,
    pub deleted: bool,
    /// Timestamp of the remove that deleted this cast
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Cast {
    #[must_use]
    pub fn parent_cast(&self) -> Option<&CastId> {
        match &self.parent {
            Some(ParentRef::Cast(id)) => Some(id),
            _ => None,
        }
    }

    #[must_use]
    pub fn parent_url(&self) -> Option<&str> {
        match &self.parent {
            Some(ParentRef::Url(url)) => Some(url),
            _ => None,
        }
    }

    #[must_use]
    pub const fn is_reply(&self) -> bool {
        matches!(self.parent, Some(ParentRef::Cast(_)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mention {
    pub cast: CastId,
    pub mentioned_fid: u64,
    /// UTF-8 byte offset into the cast text
    pub position: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UrlEmbed {
    pub cast: CastId,
    pub url: String,
    pub host: Option<String>,
    pub path: Option<String>,
    pub query: Option<String>,
    pub content_type: Option<String>,
    pub content_metadata: Option<serde_json::Value>,
    pub parsed_from_text: bool,
    pub deleted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CastEmbed {
    pub cast: CastId,
    pub embedded: CastId,
}

/// A cast together with the rows derived from it, written as one unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CastRecord {
    pub cast: Cast,
    pub mentions: Vec<Mention>,
    pub url_embeds: Vec<UrlEmbed>,
    pub cast_embeds: Vec<CastEmbed>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReactionKind {
    Like,
    Recast,
}

impl ReactionKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Like => "like",
            Self::Recast => "recast",
        }
    }

    /// Map the hub's `REACTION_TYPE_*` names
    #[must_use]
    pub fn from_hub(value: &str) -> Option<Self> {
        match value {
            "REACTION_TYPE_LIKE" => Some(Self::Like),
            "REACTION_TYPE_RECAST" => Some(Self::Recast),
            _ => None,
        }
    }
}

impl FromStr for ReactionKind {
    type Err = CastfeedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "like" => Ok(Self::Like),
            "recast" => Ok(Self::Recast),
            other => Err(CastfeedError::Custom(format!("unknown reaction kind: {other}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ReactionTarget {
    Cast(CastId),
    Url(String),
}

impl ReactionTarget {
    /// Stable text key; the natural unique tuple is (fid, key, kind)
    #[must_use]
    pub fn key(&self) -> String {
        match self {
            Self::Cast(id) => id.to_string(),
            Self::Url(url) => url.clone(),
        }
    }

    #[must_use]
    pub const fn cast(&self) -> Option<&CastId> {
        match self {
            Self::Cast(id) => Some(id),
            Self::Url(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reaction {
    pub fid: u64,
    pub kind: ReactionKind,
    pub target: ReactionTarget,
    pub timestamp: DateTime<Utc>,
    pub deleted: bool,
}

pub const LINK_KIND_FOLLOW: &str = "follow";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub fid: u64,
    pub kind: String,
    pub target_fid: u64,
    pub timestamp: DateTime<Utc>,
    pub deleted: bool,
}

/// Latest value of one user-data field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileField {
    pub fid: u64,
    pub field: String,
    pub value: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub fid: u64,
    pub fields: Vec<ProfileField>,
}

impl UserProfile {
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.field == field)
            .map(|f| f.value.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verification {
    pub fid: u64,
    pub address: String,
    pub protocol: String,
    pub timestamp: DateTime<Utc>,
    pub deleted: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Keyword {
    pub cast: CastId,
    pub keyword: String,
    pub score: f64,
}

/// Strip NUL bytes, which `PostgreSQL` rejects in text columns
#[must_use]
pub fn sanitize_text(s: &str) -> String {
    s.replace('\0', "")
}
