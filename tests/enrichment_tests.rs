//! Keyword enrichment against a mock extraction service

mod common;

use std::sync::Arc;
use std::time::Duration;

use castfeed::database::Store;
use castfeed::enrichment::HttpKeywordExtractor;
use castfeed::enrichment::KeywordEnricher;
use castfeed::enrichment::KeywordExtractor;
use castfeed::ingest::normalize;
use castfeed::models::Cast;
use castfeed::models::CastId;
use castfeed::retry::RetryPolicy;
use castfeed::sync::CastAddBody;
use castfeed::sync::RawCast;
use castfeed::CastfeedError;
use castfeed::MemoryStore;
use common::*;
use serde_json::json;
use wiremock::matchers::body_json;
use wiremock::matchers::header;
use wiremock::matchers::method;
use wiremock::matchers::path;
use wiremock::Mock;
use wiremock::MockServer;
use wiremock::ResponseTemplate;

fn extractor(server: &MockServer) -> HttpKeywordExtractor {
    HttpKeywordExtractor::new(
        &format!("{}/keywords", server.uri()),
        Some("test-key".to_string()),
        RetryPolicy::new(1, Duration::from_millis(1)),
    )
    .unwrap()
}

async fn stored_cast(store: &MemoryStore, id: &CastId, text: &str) -> Cast {
    let raw = RawCast {
        id: id.clone(),
        timestamp: at(BASE_TS),
        body: CastAddBody {
            text: text.to_string(),
            ..CastAddBody::default()
        },
    };
    let record = normalize(&raw);
    store.upsert_casts(std::slice::from_ref(&record), 3000).await.unwrap();
    store.cast(id).await.unwrap()
}

fn enricher(store: &Arc<MemoryStore>, server: &MockServer) -> KeywordEnricher {
    KeywordEnricher::new(store.clone(), Arc::new(extractor(server)), 2, 10)
}

#[tokio::test]
async fn test_extractor_posts_text_with_bearer_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/keywords"))
        .and(header("authorization", "Bearer test-key"))
        .and(body_json(json!({ "text": "rust async runtimes" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "keywords": [
                { "keyword": "rust", "score": 0.9 },
                { "keyword": "async", "score": 0.4 }
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let keywords = extractor(&server).extract("rust async runtimes").await.unwrap();

    assert_eq!(keywords.len(), 2);
    assert_eq!(keywords[0].keyword, "rust");
    assert!((keywords[0].score - 0.9).abs() < f64::EPSILON);
}

#[tokio::test]
async fn test_extractor_maps_server_errors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/keywords"))
        .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
        .mount(&server)
        .await;

    let err = extractor(&server).extract("anything").await.unwrap_err();

    match err {
        CastfeedError::Enrichment(message) => assert!(message.contains("503")),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_enrich_writes_keywords_once() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/keywords"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "keywords": [{ "keyword": "farcaster", "score": 0.7 }]
        })))
        .expect(1)
        .mount(&server)
        .await;
    let store = Arc::new(MemoryStore::new());
    let id = cast_id(1, 0x01);
    let cast = stored_cast(&store, &id, "hello farcaster").await;
    let enricher = enricher(&store, &server);

    let first = enricher.enrich(std::slice::from_ref(&cast)).await.unwrap();
    let second = enricher.enrich(&[cast]).await.unwrap();

    assert_eq!(first.enriched, 1);
    assert_eq!(first.keywords_written, 1);
    assert_eq!(second.enriched, 0);
    assert_eq!(store.keywords(&id).await[0].keyword, "farcaster");
}

#[tokio::test]
async fn test_empty_extraction_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/keywords"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "keywords": [] })))
        .expect(1)
        .mount(&server)
        .await;
    let store = Arc::new(MemoryStore::new());
    let cast = stored_cast(&store, &cast_id(2, 0x02), "gm").await;
    let enricher = enricher(&store, &server);

    let first = enricher.sweep(100).await.unwrap();
    let second = enricher.sweep(100).await.unwrap();

    assert_eq!(first.enriched, 1);
    assert_eq!(first.keywords_written, 0);
    assert_eq!(second.enriched, 0);
    assert!(store.pending_enrichment(10).await.unwrap().is_empty());
    assert!(store.keywords(&cast.id).await.is_empty());
}

#[tokio::test]
async fn test_blank_text_is_marked_without_calling_service() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;
    let store = Arc::new(MemoryStore::new());
    stored_cast(&store, &cast_id(3, 0x03), "   ").await;

    let stats = enricher(&store, &server).sweep(10).await.unwrap();

    assert_eq!(stats.enriched, 1);
    assert!(store.pending_enrichment(10).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_failed_extraction_leaves_cast_pending() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/keywords"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    let store = Arc::new(MemoryStore::new());
    let id = cast_id(4, 0x04);
    stored_cast(&store, &id, "will fail").await;

    let stats = enricher(&store, &server).sweep(10).await.unwrap();

    assert_eq!(stats.failed, 1);
    assert_eq!(stats.enriched, 0);
    let pending = store.pending_enrichment(10).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, id);
}

#[tokio::test]
async fn test_deleted_casts_are_skipped() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "keywords": [] })))
        .expect(0)
        .mount(&server)
        .await;
    let store = Arc::new(MemoryStore::new());
    let id = cast_id(5, 0x05);
    stored_cast(&store, &id, "gone soon").await;
    store.remove_cast(&id, at(BASE_TS + 1)).await.unwrap();
    let deleted = store.cast(&id).await.unwrap();

    let stats = enricher(&store, &server).enrich(&[deleted]).await.unwrap();

    assert_eq!(stats.enriched, 0);
}

#[tokio::test]
async fn test_background_enricher_drains_queue() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/keywords"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "keywords": [{ "keyword": "queued", "score": 0.5 }]
        })))
        .expect(2)
        .mount(&server)
        .await;
    let store = Arc::new(MemoryStore::new());
    let a = stored_cast(&store, &cast_id(6, 0x06), "first").await;
    let b = stored_cast(&store, &cast_id(7, 0x07), "second").await;

    let (queue, handle) = Arc::new(enricher(&store, &server)).spawn(4);
    queue.send(vec![a]).await.unwrap();
    queue.send(vec![b]).await.unwrap();
    drop(queue);
    let totals = handle.await.unwrap();

    assert_eq!(totals.enriched, 2);
    assert_eq!(totals.keywords_written, 2);
}
