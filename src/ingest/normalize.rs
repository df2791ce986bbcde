//! Raw cast-add body to normalized rows

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use url::Url;

use crate::models::sanitize_text;
use crate::models::Cast;
use crate::models::CastEmbed;
use crate::models::CastId;
use crate::models::CastRecord;
use crate::models::Mention;
use crate::models::ParentRef;
use crate::models::UrlEmbed;
use crate::sync::types::RawCast;

/// Reserved scheme for on-chain references; stored without decomposition
pub const CHAIN_SCHEME: &str = "chain://";

static INLINE_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"https?://[^\s<>"'`]+"#).expect("inline url pattern is valid"));

const TRAILING_PUNCTUATION: &[char] = &['.', ',', ';', ':', '!', '?', ')', ']', '}', '\'', '"'];

/// Host, path and query of an embed URL; all `None` for opaque or unparsable URLs
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UrlParts {
    pub host: Option<String>,
    pub path: Option<String>,
    pub query: Option<String>,
}

#[must_use]
pub fn decompose_url(raw: &str) -> UrlParts {
    if raw.starts_with(CHAIN_SCHEME) {
        return UrlParts::default();
    }
    match Url::parse(raw) {
        Ok(url) => UrlParts {
            host: url.host_str().map(str::to_string),
            path: Some(url.path().to_string()),
            query: url.query().map(str::to_string),
        },
        Err(e) => {
            tracing::debug!("Embed url {} does not parse: {}", raw, e);
            UrlParts::default()
        }
    }
}

/// URLs in `text` that are not part of any explicit embed, in order of appearance
#[must_use]
pub fn inline_urls(text: &str, explicit: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    INLINE_URL
        .find_iter(text)
        .map(|m| m.as_str().trim_end_matches(TRAILING_PUNCTUATION).to_string())
        .filter(|url| url.len() > "https://".len())
        .filter(|url| !explicit.iter().any(|e| e.contains(url.as_str())))
        .filter(|url| seen.insert(url.clone()))
        .collect()
}

fn url_embed(cast: &CastId, url: String, parsed_from_text: bool) -> UrlEmbed {
    let parts = decompose_url(&url);
    UrlEmbed {
        cast: cast.clone(),
        url,
        host: parts.host,
        path: parts.path,
        query: parts.query,
        content_type: None,
        content_metadata: None,
        parsed_from_text,
        deleted: false,
    }
}

/// Map a byte offset in `raw` onto the same byte after NULs are stripped
fn stripped_offset(raw: &str, position: u32) -> u32 {
    let end = usize::try_from(position).map_or(raw.len(), |p| p.min(raw.len()));
    let removed = raw.as_bytes()[..end].iter().filter(|b| **b == 0).count();
    position.saturating_sub(u32::try_from(removed).unwrap_or(u32::MAX))
}

/// Normalize one cast; the top ancestor is left unresolved
///
/// Mention positions are byte offsets into the stored (NUL-stripped) text.
#[must_use]
pub fn normalize(raw: &RawCast) -> CastRecord {
    let body = &raw.body;
    let id = raw.id.clone();

    let parent = match (&body.parent_cast_id, &body.parent_url) {
        (Some(parent), _) => parent.parse().map(ParentRef::Cast),
        (None, Some(url)) => Some(ParentRef::Url(url.clone())),
        (None, None) => None,
    };

    if body.mentions.len() != body.mentions_positions.len() {
        tracing::debug!(
            "Cast {} has {} mentions but {} positions",
            id,
            body.mentions.len(),
            body.mentions_positions.len()
        );
    }
    let mentions = body
        .mentions
        .iter()
        .zip(&body.mentions_positions)
        .map(|(fid, position)| Mention {
            cast: id.clone(),
            mentioned_fid: *fid,
            position: stripped_offset(&body.text, *position),
        })
        .collect();

    let explicit: Vec<String> = body
        .embeds
        .iter()
        .filter_map(|e| e.url.as_ref().map(|u| sanitize_text(u)))
        .collect();
    let cast_embeds = body
        .embeds
        .iter()
        .filter_map(|e| e.cast_id.as_ref()?.parse())
        .map(|embedded| CastEmbed {
            cast: id.clone(),
            embedded,
        })
        .collect();

    let text = sanitize_text(&body.text);
    let inline = inline_urls(&text, &explicit);
    let url_embeds = explicit
        .iter()
        .map(|url| url_embed(&id, url.clone(), false))
        .chain(inline.into_iter().map(|url| url_embed(&id, url, true)))
        .collect();

    CastRecord {
        cast: Cast {
            id,
            timestamp: raw.timestamp,
            text,
            parent,
            top: None,
            deleted: false,
            deleted_at: None,
        },
        mentions,
        url_embeds,
        cast_embeds,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::types::CastAddBody;
    use crate::sync::types::WireCastId;
    use crate::sync::types::WireEmbed;

    const HASH: &str = "0x00000000000000000000000000000000000000aa";
    const OTHER: &str = "0x00000000000000000000000000000000000000cc";

    fn raw(body: CastAddBody) -> RawCast {
        RawCast {
            id: CastId::new(1, HASH.parse().unwrap()),
            timestamp: chrono::DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
            body,
        }
    }

    #[test]
    fn test_decompose_url() {
        let parts = decompose_url("https://example.com/a/b?x=1");
        assert_eq!(parts.host.as_deref(), Some("example.com"));
        assert_eq!(parts.path.as_deref(), Some("/a/b"));
        assert_eq!(parts.query.as_deref(), Some("x=1"));

        assert_eq!(decompose_url("chain://eip155:1/erc721:0xabc/1"), UrlParts::default());
        assert_eq!(decompose_url("not a url"), UrlParts::default());
    }

    #[test]
    fn test_inline_urls_skip_explicit_and_trailing_punctuation() {
        let explicit = vec!["https://example.com/page?ref=1".to_string()];
        let urls = inline_urls(
            "see https://example.com/page, and (https://other.org/x). again https://other.org/x",
            &explicit,
        );
        assert_eq!(urls, vec!["https://other.org/x".to_string()]);
    }

    #[test]
    fn test_normalize_collects_mentions_and_embeds() {
        let record = normalize(&raw(CastAddBody {
            text: "gm  read https://blog.example/post\0".to_string(),
            mentions: vec![7, 8],
            mentions_positions: vec![2, 3],
            embeds: vec![
                WireEmbed {
                    url: Some("https://img.example/a.png".to_string()),
                    cast_id: None,
                },
                WireEmbed {
                    url: None,
                    cast_id: Some(WireCastId {
                        fid: 9,
                        hash: OTHER.to_string(),
                    }),
                },
            ],
            parent_cast_id: None,
            parent_url: Some("https://warpcast.com/~/channel/rust".to_string()),
        }));

        assert_eq!(record.cast.text, "gm  read https://blog.example/post");
        assert_eq!(
            record.cast.parent,
            Some(ParentRef::Url("https://warpcast.com/~/channel/rust".to_string()))
        );
        assert_eq!(record.mentions.len(), 2);
        assert_eq!(record.mentions[1].position, 3);
        assert_eq!(record.cast_embeds[0].embedded.fid, 9);

        let urls: Vec<_> = record.url_embeds.iter().map(|e| (e.url.as_str(), e.parsed_from_text)).collect();
        assert_eq!(
            urls,
            vec![("https://img.example/a.png", false), ("https://blog.example/post", true)]
        );
    }

    #[test]
    fn test_mention_positions_follow_stripped_text() {
        let record = normalize(&raw(CastAddBody {
            text: "\0hi\0 @ and @".to_string(),
            mentions: vec![5, 6, 7],
            mentions_positions: vec![0, 5, 10],
            ..CastAddBody::default()
        }));

        assert_eq!(record.cast.text, "hi @ and @");
        let positions: Vec<u32> = record.mentions.iter().map(|m| m.position).collect();
        assert_eq!(positions, vec![0, 3, 8]);
        assert_eq!(&record.cast.text[3..4], "@");
        assert_eq!(&record.cast.text[8..9], " ");
    }

    #[test]
    fn test_mismatched_mention_positions_truncate() {
        let record = normalize(&raw(CastAddBody {
            text: "hi".to_string(),
            mentions: vec![1, 2, 3],
            mentions_positions: vec![0],
            ..CastAddBody::default()
        }));
        assert_eq!(record.mentions.len(), 1);
    }
}
