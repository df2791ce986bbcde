//! Ranked views computed over an in-memory store

mod common;

use std::sync::Arc;

use castfeed::config::RankingConfig;
use castfeed::database::Store;
use castfeed::ingest::normalize;
use castfeed::models::CastId;
use castfeed::models::Reaction;
use castfeed::models::ReactionKind;
use castfeed::models::ReactionTarget;
use castfeed::ranking::Metric;
use castfeed::ranking::RankingEngine;
use castfeed::ranking::SubjectKind;
use castfeed::ranking::TopQuery;
use castfeed::ranking::TopScope;
use castfeed::ranking::Window;
use castfeed::sync::CastAddBody;
use castfeed::sync::RawCast;
use castfeed::MemoryStore;
use chrono::DateTime;
use chrono::Duration;
use chrono::Utc;
use common::*;

fn now() -> DateTime<Utc> {
    at(BASE_TS + 30 * 86_400)
}

async fn put_cast(store: &MemoryStore, id: &CastId, timestamp: DateTime<Utc>, parent_url: Option<&str>) {
    let raw = RawCast {
        id: id.clone(),
        timestamp,
        body: CastAddBody {
            text: "ranked".to_string(),
            parent_url: parent_url.map(str::to_string),
            ..CastAddBody::default()
        },
    };
    store.upsert_casts(&[normalize(&raw)], 3000).await.unwrap();
}

async fn put_reactions(store: &MemoryStore, target: &CastId, kind: ReactionKind, count: u64, timestamp: DateTime<Utc>) {
    let reactions: Vec<Reaction> = (0..count)
        .map(|n| Reaction {
            fid: 10_000 + n,
            kind,
            target: ReactionTarget::Cast(target.clone()),
            timestamp,
            deleted: false,
        })
        .collect();
    store.upsert_reactions(&reactions, 3000).await.unwrap();
}

fn engine(store: Arc<MemoryStore>) -> RankingEngine {
    RankingEngine::new(store, RankingConfig::default())
}

fn top_query(window: Window, metric: Metric, scope: TopScope) -> TopQuery {
    TopQuery {
        window,
        metric,
        scope,
        limit: 10,
        offset: 0,
    }
}

#[tokio::test]
async fn test_hot_prefers_recent_reactions() {
    let store = Arc::new(MemoryStore::new());
    let fresh_small = cast_id(1, 0x01);
    let stale_big = cast_id(2, 0x02);
    let fresh_big = cast_id(3, 0x03);
    let expired = cast_id(4, 0x04);
    for id in [&fresh_small, &stale_big, &fresh_big, &expired] {
        put_cast(&store, id, now() - Duration::days(12), None).await;
    }
    put_reactions(&store, &fresh_small, ReactionKind::Like, 10, now() - Duration::hours(1)).await;
    put_reactions(&store, &stale_big, ReactionKind::Like, 100, now() - Duration::days(2)).await;
    put_reactions(&store, &fresh_big, ReactionKind::Like, 100, now() - Duration::hours(1)).await;
    put_reactions(&store, &expired, ReactionKind::Like, 1000, now() - Duration::days(10)).await;

    let hot = engine(store).hot(now(), 0).await.unwrap();

    let order: Vec<&CastId> = hot.iter().map(|e| &e.target).collect();
    assert_eq!(order, vec![&fresh_big, &fresh_small, &stale_big]);
    assert!((hot[0].score - (2.0 - 1.0 / 24.0)).abs() < 1e-6);
    assert!(hot[2].score.abs() < 1e-6);
}

#[tokio::test]
async fn test_hot_page_beyond_the_end_is_empty() {
    let store = Arc::new(MemoryStore::new());
    let id = cast_id(1, 0x01);
    put_cast(&store, &id, now() - Duration::days(1), None).await;
    put_reactions(&store, &id, ReactionKind::Like, 3, now() - Duration::hours(1)).await;
    let engine = engine(store);

    assert_eq!(engine.hot(now(), 0).await.unwrap().len(), 1);
    assert!(engine.hot(now(), 1).await.unwrap().is_empty());
    assert!(engine.hot(now(), usize::MAX).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_top_by_likes_isolates_windows() {
    let store = Arc::new(MemoryStore::new());
    let recent = cast_id(5, 0x05);
    let older = cast_id(6, 0x06);
    put_cast(&store, &recent, now() - Duration::days(5), None).await;
    put_cast(&store, &older, now() - Duration::days(5), None).await;
    put_reactions(&store, &recent, ReactionKind::Like, 3, now() - Duration::hours(2)).await;
    put_reactions(&store, &older, ReactionKind::Like, 5, now() - Duration::days(3)).await;
    put_reactions(&store, &older, ReactionKind::Recast, 7, now() - Duration::hours(2)).await;
    let engine = engine(store);

    let day = engine
        .top(&top_query(Window::Day, Metric::Likes, TopScope::Global), now())
        .await
        .unwrap();
    assert_eq!(day.len(), 1);
    assert_eq!(day[0].target, recent);
    assert_eq!(day[0].count, 3);

    let week = engine
        .top(&top_query(Window::Week, Metric::Likes, TopScope::Global), now())
        .await
        .unwrap();
    let counts: Vec<(CastId, u64)> = week.into_iter().map(|e| (e.target, e.count)).collect();
    assert_eq!(counts, vec![(older.clone(), 5), (recent.clone(), 3)]);

    let recasts = engine
        .top(&top_query(Window::Day, Metric::Recasts, TopScope::Global), now())
        .await
        .unwrap();
    assert_eq!(recasts[0].target, older);
    assert_eq!(recasts[0].count, 7);
}

#[tokio::test]
async fn test_top_scopes() {
    let store = Arc::new(MemoryStore::new());
    let channel = "https://warpcast.com/~/channel/rust";
    let in_channel = cast_id(7, 0x07);
    let elsewhere = cast_id(8, 0x08);
    put_cast(&store, &in_channel, now() - Duration::days(1), Some(channel)).await;
    put_cast(&store, &elsewhere, now() - Duration::days(1), None).await;
    put_reactions(&store, &in_channel, ReactionKind::Like, 2, now() - Duration::hours(3)).await;
    put_reactions(&store, &elsewhere, ReactionKind::Like, 4, now() - Duration::hours(3)).await;
    let engine = engine(store.clone());

    let by_channel = engine
        .top(
            &top_query(Window::Week, Metric::Likes, TopScope::Channel(channel.to_string())),
            now(),
        )
        .await
        .unwrap();
    assert_eq!(by_channel.len(), 1);
    assert_eq!(by_channel[0].target, in_channel);

    let by_author = engine
        .top(&top_query(Window::All, Metric::Reactions, TopScope::Author(8)), now())
        .await
        .unwrap();
    assert_eq!(by_author.len(), 1);
    assert_eq!(by_author[0].target, elsewhere);

    // Deleted casts drop out of every view
    store.remove_cast(&elsewhere, now()).await.unwrap();
    let global = engine
        .top(&top_query(Window::Week, Metric::Likes, TopScope::Global), now())
        .await
        .unwrap();
    assert_eq!(global.len(), 1);
    assert_eq!(global[0].target, in_channel);
}

#[tokio::test]
async fn test_engagement_rank_delta_sign() {
    let store = Arc::new(MemoryStore::new());
    let current = [(1u64, 10u16), (5, 8), (2, 6), (3, 4), (4, 2), (6, 1)];
    let previous = [(1u64, 10u16), (2, 9), (3, 8), (4, 7), (5, 6)];

    for (fid, posts) in current {
        for n in 0..posts {
            #[allow(clippy::cast_possible_truncation)]
            let id = CastId::new(fid, hash_n(fid as u8, n));
            put_cast(&store, &id, now() - Duration::hours(1), None).await;
        }
    }
    for (fid, posts) in previous {
        for n in 0..posts {
            #[allow(clippy::cast_possible_truncation)]
            let id = CastId::new(fid, hash_n(fid as u8, 100 + n));
            put_cast(&store, &id, now() - Duration::days(8), None).await;
        }
    }

    let rows = engine(store)
        .engagement(SubjectKind::Author, Window::Week, now())
        .await
        .unwrap();

    let row = |subject: &str| rows.iter().find(|r| r.counts.subject == subject).expect(subject);
    assert_eq!(rows.len(), 6);
    assert_eq!(rows[0].counts.subject, "1");

    let climber = row("5");
    assert_eq!(climber.rank, 2);
    assert_eq!(climber.counts.posts, 8);
    assert_eq!(climber.previous.as_ref().map(|p| p.posts), Some(6));
    assert_eq!(climber.rank_delta.map(|d| d.engagement), Some(3));

    assert_eq!(row("2").rank_delta.map(|d| d.engagement), Some(-1));
    assert_eq!(row("1").rank_delta.map(|d| d.engagement), Some(0));
    assert!(row("6").rank_delta.is_none());
}

#[tokio::test]
async fn test_engagement_all_time_has_no_deltas() {
    let store = Arc::new(MemoryStore::new());
    let id = cast_id(9, 0x09);
    put_cast(&store, &id, now() - Duration::days(200), None).await;
    put_reactions(&store, &id, ReactionKind::Recast, 2, now() - Duration::days(100)).await;

    let rows = engine(store)
        .engagement(SubjectKind::Author, Window::All, now())
        .await
        .unwrap();

    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].counts.posts, 1);
    assert_eq!(rows[0].counts.recasts, 2);
    assert!((rows[0].engagement - 1.5).abs() < 1e-9);
    assert!(rows[0].rank_delta.is_none());
}
