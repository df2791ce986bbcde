//! Hub HTTP client
//!
//! [`HubClient`] is the seam between the pipeline and a hub node. Point lookups
//! (`get_cast`, `get_reactions_for`, ...) never fail: transport errors are logged
//! and come back as an empty result, so "not found" and "unreachable" look the
//! same to callers. History pages and fid discovery propagate errors, because
//! backfill must not advance its checkpoint past data it never saw.

use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use reqwest::Client;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use url::Url;

use super::types::classify;
use super::types::Classified;
use super::types::EventPayload;
use super::types::EventsPage;
use super::types::FidsPage;
use super::types::HubEvent;
use super::types::HubEventType;
use super::types::HubInfo;
use super::types::HubMessage;
use super::types::MessagePage;
use crate::config::HubConfig;
use crate::models::CastId;
use crate::models::Reaction;
use crate::models::ReactionKind;
use crate::models::UserProfile;
use crate::models::Verification;
use crate::models::LINK_KIND_FOLLOW;
use crate::retry::RetryPolicy;
use crate::CastfeedError;
use crate::Result;

/// Per-fid message history drained by backfill
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HistoryKind {
    Casts,
    Likes,
    Recasts,
    Links,
}

impl HistoryKind {
    pub const ALL: [Self; 4] = [Self::Casts, Self::Likes, Self::Recasts, Self::Links];
}

#[async_trait]
pub trait HubClient: Send + Sync {
    /// Check that the hub answers; fails with `Connection` when it does not answer in time
    async fn connect(&self) -> Result<HubInfo>;

    async fn get_cast(&self, id: &CastId) -> Option<HubMessage>;

    /// Current likes and recasts on a cast
    async fn get_reactions_for(&self, id: &CastId) -> Vec<Reaction>;

    async fn get_verified_addresses(&self, fid: u64) -> Vec<Verification>;

    async fn get_user_profile(&self, fid: u64) -> Option<UserProfile>;

    /// Highest registered fid
    async fn max_fid(&self) -> Result<u64>;

    async fn history_page(&self, kind: HistoryKind, fid: u64, page_token: Option<&str>) -> Result<MessagePage>;

    /// Events of the given types, starting at `from_event_id` when set
    ///
    /// A transport failure ends the stream with an error item.
    fn subscribe(&self, event_types: &[HubEventType], from_event_id: Option<u64>) -> BoxStream<'static, Result<HubEvent>>;
}

/// [`HubClient`] over the hub's JSON API
#[derive(Debug, Clone)]
pub struct HttpHubClient {
    client: Client,
    base_url: Url,
    retry: RetryPolicy,
    connect_timeout: Duration,
    page_size: u32,
    poll_interval: Duration,
}

impl HttpHubClient {
    /// # Errors
    /// Returns an error if the endpoint is not a valid URL or the HTTP client cannot be built
    pub fn new(config: &HubConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout())
            .timeout(config.request_timeout())
            .build()?;
        let base_url = Url::parse(config.http_endpoint.trim_end_matches('/'))?;

        tracing::debug!("Creating hub client for {}", base_url);

        Ok(Self {
            client,
            base_url,
            retry: RetryPolicy::new(config.retry_attempts, config.retry_delay()),
            connect_timeout: config.connect_timeout(),
            page_size: config.page_size,
            poll_interval: config.event_poll_interval(),
        })
    }

    /// # Errors
    /// Same as [`HttpHubClient::new`]
    pub fn from_config(config: &crate::AppConfig) -> Result<Self> {
        Self::new(&config.hub)
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        Ok(self.base_url.join(path)?)
    }

    /// GET once; a 404 is `Ok(None)`
    async fn fetch<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<Option<T>> {
        let url = self.endpoint(path)?;
        let response = self.client.get(url).query(query).send().await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(CastfeedError::Protocol(format!(
                "GET {path} returned HTTP {}",
                response.status()
            )));
        }
        Ok(Some(response.json().await?))
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<Option<T>> {
        self.retry.run(path, || self.fetch(path, query)).await
    }

    /// Drain every page of a message listing
    async fn all_messages(&self, path: &str, query: &[(&str, String)]) -> Result<Vec<HubMessage>> {
        let mut messages = Vec::new();
        let mut token: Option<String> = None;
        loop {
            let mut params = query.to_vec();
            params.push(("pageSize", self.page_size.to_string()));
            if let Some(token) = &token {
                params.push(("pageToken", token.clone()));
            }
            let Some(page) = self.get_json::<MessagePage>(path, &params).await? else {
                break;
            };
            messages.extend(page.messages.iter().cloned());
            match page.next_token() {
                Some(next) => token = Some(next.to_string()),
                None => break,
            }
        }
        Ok(messages)
    }

    /// Point lookup helper: log and degrade to empty
    async fn lookup_messages(&self, what: &str, path: &str, query: &[(&str, String)]) -> Vec<HubMessage> {
        match self.all_messages(path, query).await {
            Ok(messages) => messages,
            Err(e) => {
                tracing::warn!("Hub lookup of {} failed: {}", what, e);
                Vec::new()
            }
        }
    }
}

fn payloads(messages: &[HubMessage]) -> impl Iterator<Item = EventPayload> + '_ {
    messages.iter().filter_map(|m| match classify(m) {
        Classified::Payload(payload) => Some(payload),
        Classified::Unsupported(_) | Classified::Malformed(_) => None,
    })
}

const fn reaction_type_param(kind: ReactionKind) -> &'static str {
    match kind {
        ReactionKind::Like => "REACTION_TYPE_LIKE",
        ReactionKind::Recast => "REACTION_TYPE_RECAST",
    }
}

#[async_trait]
impl HubClient for HttpHubClient {
    async fn connect(&self) -> Result<HubInfo> {
        let url = self.endpoint("/v1/info")?;
        let handshake = async {
            let response = self.client.get(url).send().await?;
            if !response.status().is_success() {
                return Err(CastfeedError::Connection(format!("hub info returned HTTP {}", response.status())));
            }
            Ok::<HubInfo, CastfeedError>(response.json().await?)
        };

        let info = tokio::time::timeout(self.connect_timeout, handshake)
            .await
            .map_err(|_| {
                CastfeedError::Connection(format!(
                    "{} did not answer within {:?}",
                    self.base_url, self.connect_timeout
                ))
            })?
            .map_err(|e| match e {
                CastfeedError::Connection(_) => e,
                other => CastfeedError::Connection(format!("{}: {other}", self.base_url)),
            })?;

        tracing::info!("Connected to hub {} (version {})", self.base_url, info.version);
        Ok(info)
    }

    async fn get_cast(&self, id: &CastId) -> Option<HubMessage> {
        let query = [("fid", id.fid.to_string()), ("hash", id.hash.to_string())];
        match self.get_json::<HubMessage>("/v1/castById", &query).await {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!("Hub lookup of cast {} failed: {}", id, e);
                None
            }
        }
    }

    async fn get_reactions_for(&self, id: &CastId) -> Vec<Reaction> {
        let mut reactions = Vec::new();
        for kind in [ReactionKind::Like, ReactionKind::Recast] {
            let query = [
                ("target_fid", id.fid.to_string()),
                ("target_hash", id.hash.to_string()),
                ("reaction_type", reaction_type_param(kind).to_string()),
            ];
            let messages = self
                .lookup_messages(&format!("reactions on {id}"), "/v1/reactionsByCast", &query)
                .await;
            reactions.extend(payloads(&messages).filter_map(|p| match p {
                EventPayload::ReactionAdd(reaction) => Some(reaction),
                _ => None,
            }));
        }
        reactions
    }

    async fn get_verified_addresses(&self, fid: u64) -> Vec<Verification> {
        let messages = self
            .lookup_messages(
                &format!("verifications of fid {fid}"),
                "/v1/verificationsByFid",
                &[("fid", fid.to_string())],
            )
            .await;
        payloads(&messages)
            .filter_map(|p| match p {
                EventPayload::VerificationUpdate(v) if !v.deleted => Some(v),
                _ => None,
            })
            .collect()
    }

    async fn get_user_profile(&self, fid: u64) -> Option<UserProfile> {
        let messages = self
            .lookup_messages(
                &format!("profile of fid {fid}"),
                "/v1/userDataByFid",
                &[("fid", fid.to_string())],
            )
            .await;
        let fields: Vec<_> = payloads(&messages)
            .filter_map(|p| match p {
                EventPayload::ProfileUpdate(field) => Some(field),
                _ => None,
            })
            .collect();
        (!fields.is_empty()).then_some(UserProfile { fid, fields })
    }

    async fn max_fid(&self) -> Result<u64> {
        let mut max = 0;
        let mut token: Option<String> = None;
        loop {
            let mut params = vec![("pageSize", self.page_size.to_string())];
            if let Some(token) = &token {
                params.push(("pageToken", token.clone()));
            }
            let page = self
                .get_json::<FidsPage>("/v1/fids", &params)
                .await?
                .unwrap_or_default();
            max = page.fids.iter().copied().fold(max, u64::max);
            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(next) => token = Some(next),
                None => break,
            }
        }
        tracing::debug!("Hub reports max fid {}", max);
        Ok(max)
    }

    async fn history_page(&self, kind: HistoryKind, fid: u64, page_token: Option<&str>) -> Result<MessagePage> {
        let (path, mut query) = match kind {
            HistoryKind::Casts => ("/v1/castsByFid", vec![]),
            HistoryKind::Likes => (
                "/v1/reactionsByFid",
                vec![("reaction_type", reaction_type_param(ReactionKind::Like).to_string())],
            ),
            HistoryKind::Recasts => (
                "/v1/reactionsByFid",
                vec![("reaction_type", reaction_type_param(ReactionKind::Recast).to_string())],
            ),
            HistoryKind::Links => ("/v1/linksByFid", vec![("link_type", LINK_KIND_FOLLOW.to_string())]),
        };
        query.push(("fid", fid.to_string()));
        query.push(("pageSize", self.page_size.to_string()));
        if let Some(token) = page_token {
            query.push(("pageToken", token.to_string()));
        }

        Ok(self.get_json::<MessagePage>(path, &query).await?.unwrap_or_default())
    }

    fn subscribe(&self, event_types: &[HubEventType], from_event_id: Option<u64>) -> BoxStream<'static, Result<HubEvent>> {
        let client = self.clone();
        let wanted = event_types.to_vec();

        async_stream::try_stream! {
            let mut cursor = from_event_id;
            loop {
                let query: Vec<(&str, String)> = cursor
                    .map(|id| vec![("from_event_id", id.to_string())])
                    .unwrap_or_default();
                let page = client
                    .get_json::<EventsPage>("/v1/events", &query)
                    .await
                    .map_err(|e| CastfeedError::StreamTerminated(e.to_string()))?
                    .unwrap_or_default();

                let last_id = page.events.last().map(|e| e.id);
                let idle = page.events.is_empty();
                for wire in page.events {
                    let event = HubEvent::from(wire);
                    if wanted.contains(&event.event_type) {
                        yield event;
                    }
                }

                cursor = match (page.next_page_event_id, last_id) {
                    (Some(next), _) => Some(next),
                    (None, Some(last)) => Some(last + 1),
                    (None, None) => cursor,
                };
                if idle {
                    tokio::time::sleep(client.poll_interval).await;
                }
            }
        }
        .boxed()
    }
}
