//! HTTP hub client against a mock hub

mod common;

use std::sync::Arc;

use castfeed::config::HubConfig;
use castfeed::database::Store;
use castfeed::database::CHECKPOINT_LIVE;
use castfeed::models::ReactionKind;
use castfeed::sync::HistoryKind;
use castfeed::sync::HttpHubClient;
use castfeed::sync::HubClient;
use castfeed::sync::classify;
use castfeed::sync::Classified;
use castfeed::sync::Dispatcher;
use castfeed::sync::HubEventType;
use castfeed::sync::SyncMode;
use castfeed::CastfeedError;
use castfeed::MemoryStore;
use common::*;
use futures::StreamExt;
use serde_json::json;
use wiremock::matchers::method;
use wiremock::matchers::path;
use wiremock::matchers::query_param;
use wiremock::matchers::query_param_is_missing;
use wiremock::Mock;
use wiremock::MockServer;
use wiremock::ResponseTemplate;

fn client(server: &MockServer) -> HttpHubClient {
    HttpHubClient::new(&HubConfig {
        http_endpoint: server.uri(),
        retry_attempts: 2,
        retry_delay_ms: 1,
        page_size: 2,
        event_poll_interval_ms: 10,
        ..HubConfig::default()
    })
    .unwrap()
}

#[tokio::test]
async fn test_connect_reads_hub_info() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/info"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "version": "1.19.0",
            "peerId": "12D3Koo",
            "numShards": 2
        })))
        .mount(&server)
        .await;

    let info = client(&server).connect().await.unwrap();

    assert_eq!(info.version, "1.19.0");
    assert_eq!(info.peer_id, "12D3Koo");
    assert_eq!(info.num_shards, 2);
}

#[tokio::test]
async fn test_connect_failure_is_a_connection_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/info"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let err = client(&server).connect().await.unwrap_err();

    assert!(matches!(err, CastfeedError::Connection(_)));
}

#[tokio::test]
async fn test_get_cast_found_and_missing() {
    let server = MockServer::start().await;
    let id = cast_id(2, 0xBB);
    Mock::given(method("GET"))
        .and(path("/v1/castById"))
        .and(query_param("fid", "2"))
        .and(query_param("hash", id.hash.to_string()))
        .respond_with(ResponseTemplate::new(200).set_body_json(cast_add(&id, BASE_TS, "gm", None)))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/castById"))
        .and(query_param("fid", "9"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;
    let client = client(&server);

    let found = client.get_cast(&id).await.expect("cast");
    assert_eq!(found.hash, id.hash.to_string());
    assert!(client.get_cast(&cast_id(9, 0x99)).await.is_none());
}

#[tokio::test]
async fn test_lookup_errors_degrade_to_empty() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    let client = client(&server);

    assert!(client.get_cast(&cast_id(2, 0xBB)).await.is_none());
    assert!(client.get_verified_addresses(2).await.is_empty());
    assert!(client.get_user_profile(2).await.is_none());
    assert!(client.history_page(HistoryKind::Casts, 2, None).await.is_err());
}

#[tokio::test]
async fn test_history_page_passes_token_and_kind() {
    let server = MockServer::start().await;
    let target = cast_id(3, 0x33);
    Mock::given(method("GET"))
        .and(path("/v1/reactionsByFid"))
        .and(query_param("fid", "7"))
        .and(query_param("reaction_type", "REACTION_TYPE_RECAST"))
        .and(query_param("pageToken", "abc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "messages": [recast(7, &target, BASE_TS)],
            "nextPageToken": ""
        })))
        .expect(1)
        .mount(&server)
        .await;

    let page = client(&server)
        .history_page(HistoryKind::Recasts, 7, Some("abc"))
        .await
        .unwrap();

    assert_eq!(page.messages.len(), 1);
    assert!(page.next_token().is_none());
}

#[tokio::test]
async fn test_reactions_for_cast_collects_likes_and_recasts() {
    let server = MockServer::start().await;
    let target = cast_id(3, 0x34);
    Mock::given(method("GET"))
        .and(path("/v1/reactionsByCast"))
        .and(query_param("reaction_type", "REACTION_TYPE_LIKE"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "messages": [like(4, &target, BASE_TS), like(5, &target, BASE_TS)]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/reactionsByCast"))
        .and(query_param("reaction_type", "REACTION_TYPE_RECAST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "messages": [recast(6, &target, BASE_TS)]
        })))
        .mount(&server)
        .await;

    let reactions = client(&server).get_reactions_for(&target).await;

    assert_eq!(reactions.len(), 3);
    assert_eq!(reactions.iter().filter(|r| r.kind == ReactionKind::Like).count(), 2);
    assert!(reactions.iter().all(|r| r.target.cast() == Some(&target)));
}

#[tokio::test]
async fn test_max_fid_walks_all_pages() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/fids"))
        .and(query_param_is_missing("pageToken"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "fids": [1, 2],
            "nextPageToken": "p2"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/fids"))
        .and(query_param("pageToken", "p2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "fids": [812, 5] })))
        .mount(&server)
        .await;

    assert_eq!(client(&server).max_fid().await.unwrap(), 812);
}

#[tokio::test]
async fn test_user_profile_from_user_data() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/userDataByFid"))
        .and(query_param("fid", "8"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "messages": [
                user_data(8, "USER_DATA_TYPE_USERNAME", "alice", BASE_TS),
                user_data(8, "USER_DATA_TYPE_DISPLAY", "Alice", BASE_TS)
            ]
        })))
        .mount(&server)
        .await;

    let profile = client(&server).get_user_profile(8).await.expect("profile");

    assert_eq!(profile.get("username"), Some("alice"));
    assert_eq!(profile.get("display"), Some("Alice"));
}

#[tokio::test]
async fn test_subscribe_filters_types_and_follows_cursor() {
    let server = MockServer::start().await;
    let id = cast_id(2, 0x22);
    Mock::given(method("GET"))
        .and(path("/v1/events"))
        .and(query_param("from_event_id", "5"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "events": [
                {
                    "type": "HUB_EVENT_TYPE_MERGE_MESSAGE",
                    "id": 5,
                    "mergeMessageBody": { "message": cast_add(&id, BASE_TS, "gm", None) }
                },
                { "type": "HUB_EVENT_TYPE_PRUNE_MESSAGE", "id": 6 }
            ],
            "nextPageEventId": 7
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/events"))
        .and(query_param("from_event_id", "7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "events": [
                { "type": "HUB_EVENT_TYPE_MERGE_MESSAGE", "id": 7, "mergeMessageBody": { "message": follow(2, 3, BASE_TS) } }
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let events: Vec<_> = client(&server)
        .subscribe(&[HubEventType::MergeMessage], Some(5))
        .take(2)
        .collect()
        .await;

    let ids: Vec<u64> = events.iter().map(|e| e.as_ref().unwrap().id).collect();
    assert_eq!(ids, vec![5, 7]);
    let first = events[0].as_ref().unwrap().message.as_ref().unwrap();
    assert_eq!(first.hash, id.hash.to_string());
}

#[tokio::test]
async fn test_subscribe_ends_with_stream_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/events"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let events: Vec<_> = client(&server).subscribe(&[HubEventType::MergeMessage], None).collect().await;

    assert_eq!(events.len(), 1);
    assert!(matches!(events[0], Err(CastfeedError::StreamTerminated(_))));
}

fn hollow_cast_remove(fid: u64) -> serde_json::Value {
    json!({
        "data": {
            "type": "MESSAGE_TYPE_CAST_REMOVE",
            "fid": fid,
            "timestamp": BASE_TS,
            "castRemoveBody": {}
        },
        "hash": hash(0xEE).to_string()
    })
}

#[tokio::test]
async fn test_history_page_keeps_messages_around_a_malformed_one() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/linksByFid"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "messages": [follow(7, 8, BASE_TS), hollow_cast_remove(7), follow(7, 9, BASE_TS)]
        })))
        .mount(&server)
        .await;

    let page = client(&server)
        .history_page(HistoryKind::Links, 7, None)
        .await
        .unwrap();

    assert_eq!(page.messages.len(), 3);
    assert!(matches!(classify(&page.messages[1]), Classified::Malformed(_)));
    assert!(matches!(classify(&page.messages[2]), Classified::Payload(_)));
}

#[tokio::test]
async fn test_live_drops_malformed_event_and_keeps_following() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/events"))
        .and(query_param("from_event_id", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "events": [
                {
                    "type": "HUB_EVENT_TYPE_MERGE_MESSAGE",
                    "id": 1,
                    "mergeMessageBody": { "message": follow(2, 3, BASE_TS) }
                },
                {
                    "type": "HUB_EVENT_TYPE_MERGE_MESSAGE",
                    "id": 2,
                    "mergeMessageBody": { "message": hollow_cast_remove(2) }
                }
            ],
            "nextPageEventId": 3
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/events"))
        .and(query_param("from_event_id", "3"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    let store = Arc::new(MemoryStore::new());
    let mut dispatcher = Dispatcher::new(Arc::new(client(&server)), store.clone(), sync_config());

    let err = dispatcher
        .run(SyncMode::Live { from_event_id: Some(1) })
        .await
        .unwrap_err();

    assert!(matches!(err, CastfeedError::StreamTerminated(_)));
    assert_eq!(dispatcher.stats().events_seen, 2);
    assert_eq!(dispatcher.stats().dropped, 1);
    assert_eq!(dispatcher.stats().links_written, 1);
    assert_eq!(store.links().await.len(), 1);
    assert_eq!(store.get_checkpoint(CHECKPOINT_LIVE).await.unwrap(), Some(2));
}
