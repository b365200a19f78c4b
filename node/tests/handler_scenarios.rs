//! End-to-end handler scenarios: datagram in → datagram out, wired through
//! the full service (config → rate limiter → cache → coordinator → handler)
//! against nullable host and store implementations.

use std::net::SocketAddr;
use std::sync::Arc;

use hyquery_node::{HandlerAction, QueryConfig, QueryHandler, QueryService};
use hyquery_nullables::{NullHost, NullSnapshotStore};
use hyquery_protocol::status::{
    self, StatusPacket, ACK_BAD_HMAC, ACK_OK, ACK_STALE, ACK_UNKNOWN_ID,
};
use hyquery_protocol::v1;
use hyquery_protocol::v2;
use hyquery_types::{Player, WorkerEntry};
use hyquery_utils::time::unix_millis;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn client(last: u8) -> SocketAddr {
    SocketAddr::from(([203, 0, 113, last], 40000))
}

fn default_host() -> Arc<NullHost> {
    let host = Arc::new(NullHost::new());
    host.add_player("alice", 1);
    host.add_player("bob", 2);
    host
}

async fn started_service(config: QueryConfig, host: Arc<NullHost>) -> (QueryService, Arc<QueryHandler>) {
    let service = QueryService::new(config, host);
    service.start().await.expect("service starts");
    let handler = service.handler().expect("handler installed");
    (service, handler)
}

async fn respond(handler: &QueryHandler, data: &[u8], sender: SocketAddr) -> Vec<u8> {
    match handler.process(data, sender).await {
        HandlerAction::Respond(bytes) => bytes,
        other => panic!("expected Respond, got {other:?}"),
    }
}

/// Run the V2 challenge round-trip and return the minted token.
async fn fetch_challenge_token(
    handler: &QueryHandler,
    family: v2::RequestFamily,
    sender: SocketAddr,
) -> [u8; 32] {
    let response = respond(handler, &v2::build_challenge_request(family), sender).await;
    assert_eq!(response.len(), 48);
    assert!(response.starts_with(family.response_magic()));
    assert_eq!(response[8], v2::TYPE_CHALLENGE);
    assert_eq!(&response[41..48], &[0u8; 7]);

    let mut token = [0u8; 32];
    token.copy_from_slice(&response[9..41]);
    token
}

// ---------------------------------------------------------------------------
// 1. V1 basic query happy path — literal bytes
// ---------------------------------------------------------------------------

#[tokio::test]
async fn v1_basic_query_exact_bytes() {
    let (_service, handler) = started_service(QueryConfig::default(), default_host()).await;

    let response = respond(&handler, &v1::build_request(v1::TYPE_BASIC), client(1)).await;

    let mut expected = Vec::new();
    expected.extend_from_slice(b"HYREPLY\0\x00");
    expected.extend_from_slice(&[13, 0]);
    expected.extend_from_slice(b"Hytale Server");
    expected.extend_from_slice(&[2, 0]);
    expected.extend_from_slice(b"hi");
    expected.extend_from_slice(&[0x02, 0x00, 0x00, 0x00]); // online = 2
    expected.extend_from_slice(&[0x64, 0x00, 0x00, 0x00]); // max = 100
    expected.extend_from_slice(&[0x90, 0x15, 0x00, 0x00]); // port = 5520
    expected.extend_from_slice(&[3, 0]);
    expected.extend_from_slice(b"1.0");

    assert_eq!(response, expected);
}

// ---------------------------------------------------------------------------
// 2 & 3. V2 challenge → BASIC; token bound to source address
// ---------------------------------------------------------------------------

#[tokio::test]
async fn v2_challenge_then_basic() {
    let (_service, handler) = started_service(QueryConfig::default(), default_host()).await;
    let sender = client(7);

    let token = fetch_challenge_token(&handler, v2::RequestFamily::OneQuery, sender).await;

    let request =
        v2::build_query_request(v2::RequestFamily::OneQuery, v2::TYPE_BASIC, &token, 1, 0, None);
    let response_bytes = respond(&handler, &request, sender).await;

    let response = v2::parse_response(&response_bytes).unwrap();
    assert_eq!(response.family, v2::RequestFamily::OneQuery);
    assert_eq!(response.version, 0x01);
    assert_eq!(response.flags, 0);
    assert_eq!(response.request_id, 1);

    let value = v2::find_tlv(&response.payload, v2::TLV_TYPE_SERVER_INFO)
        .unwrap()
        .expect("server info TLV present");
    let info = v2::parse_server_info(&value).unwrap();
    assert_eq!(info.server_name, "Hytale Server");
    assert_eq!(info.motd, "hi");
    assert_eq!(info.online_players, 2);
    assert_eq!(info.max_players, 100);
    assert_eq!(info.address, None);
}

#[tokio::test]
async fn v2_token_from_wrong_source_is_dropped() {
    let (_service, handler) = started_service(QueryConfig::default(), default_host()).await;

    let token = fetch_challenge_token(&handler, v2::RequestFamily::OneQuery, client(7)).await;
    let request =
        v2::build_query_request(v2::RequestFamily::OneQuery, v2::TYPE_BASIC, &token, 1, 0, None);

    assert_eq!(
        handler.process(&request, client(8)).await,
        HandlerAction::Consume
    );
}

#[tokio::test]
async fn v2_response_magic_follows_request_family() {
    let (_service, handler) = started_service(QueryConfig::default(), default_host()).await;
    let sender = client(9);

    let token = fetch_challenge_token(&handler, v2::RequestFamily::HyQuery2, sender).await;
    let request =
        v2::build_query_request(v2::RequestFamily::HyQuery2, v2::TYPE_BASIC, &token, 77, 0, None);
    let response = respond(&handler, &request, sender).await;
    assert!(response.starts_with(b"HYREPLY2"));
    assert_eq!(v2::parse_response(&response).unwrap().request_id, 77);
}

// ---------------------------------------------------------------------------
// 4. PLAYERS pagination sweep
// ---------------------------------------------------------------------------

#[tokio::test]
async fn v2_players_pagination_covers_all_players() {
    let host = Arc::new(NullHost::new());
    let players: Vec<Player> = (0..500)
        .map(|n| Player::new(format!("player{n:03}"), Uuid::from_u128(n as u128)))
        .collect();
    host.set_players(players);

    let config = QueryConfig {
        show_player_list: true,
        rate_limit_enabled: false,
        ..QueryConfig::default()
    };
    let (_service, handler) = started_service(config, host).await;
    let sender = client(4);
    let token = fetch_challenge_token(&handler, v2::RequestFamily::OneQuery, sender).await;

    let mut seen = Vec::new();
    let mut offset = 0u32;
    let mut first_page_count = None;

    loop {
        let request = v2::build_query_request(
            v2::RequestFamily::OneQuery,
            v2::TYPE_PLAYERS,
            &token,
            offset,
            offset,
            None,
        );
        let response_bytes = respond(&handler, &request, sender).await;
        assert!(response_bytes.len() <= v2::SAFE_MTU);

        let response = v2::parse_response(&response_bytes).unwrap();
        let value = v2::find_tlv(&response.payload, v2::TLV_TYPE_PLAYER_LIST)
            .unwrap()
            .expect("player list TLV present");
        let list = v2::parse_player_list(&value).unwrap();

        assert_eq!(list.total_players, 500);
        assert_eq!(list.start_offset as u32, offset);
        if first_page_count.is_none() {
            first_page_count = Some(list.count_in_response);
            assert_ne!(response.flags & v2::FLAG_RESPONSE_HAS_MORE_PLAYERS, 0);
        }

        seen.extend(list.players);
        offset += list.count_in_response as u32;

        if response.flags & v2::FLAG_RESPONSE_HAS_MORE_PLAYERS == 0 {
            break;
        }
    }

    assert_eq!(seen.len(), 500);
    let mut unique: Vec<String> = seen.iter().map(|p| p.username.clone()).collect();
    unique.sort();
    unique.dedup();
    assert_eq!(unique.len(), 500);

    // Sorted by (username, uuid string) ascending.
    let mut sorted = seen.clone();
    sorted.sort_by_key(Player::sort_key);
    assert_eq!(seen, sorted);
}

// ---------------------------------------------------------------------------
// 5. UDP status ACK semantics
// ---------------------------------------------------------------------------

fn status_bytes(worker_id: &str, key: &str, timestamp: i64, online: i32) -> Vec<u8> {
    status::build_status_packet(
        &StatusPacket {
            worker_id: worker_id.into(),
            server_name: "Game".into(),
            motd: String::new(),
            online_players: online,
            max_players: 50,
            port: 5521,
            version: "1.0".into(),
            players: vec![Player::new("carol", Uuid::from_u128(9))],
            timestamp_millis: timestamp,
        },
        key,
    )
}

#[tokio::test]
async fn udp_status_ack_ladder() {
    let mut config = QueryConfig::default();
    config.network.enabled = true;
    config.network.role = "primary".to_string();
    config.network.workers = vec![WorkerEntry::new("game-1", "K")];

    let (_service, handler) = started_service(config, default_host()).await;
    let sender: SocketAddr = "198.51.100.20:39000".parse().unwrap();

    // Unknown worker id.
    let ack = respond(&handler, &status_bytes("game-99", "K", unix_millis(), 4), sender).await;
    assert_eq!(status::parse_ack_packet(&ack).unwrap().status, ACK_UNKNOWN_ID);

    // Known id, wrong key.
    let ack = respond(&handler, &status_bytes("game-1", "K-prime", unix_millis(), 4), sender).await;
    assert_eq!(status::parse_ack_packet(&ack).unwrap().status, ACK_BAD_HMAC);

    // Correct key, stale timestamp.
    let ack = respond(
        &handler,
        &status_bytes("game-1", "K", unix_millis() - 60_000, 4),
        sender,
    )
    .await;
    assert_eq!(status::parse_ack_packet(&ack).unwrap().status, ACK_STALE);

    // Correct key, fresh timestamp.
    let timestamp = unix_millis();
    let ack = respond(&handler, &status_bytes("game-1", "K", timestamp, 4), sender).await;
    let parsed = status::parse_ack_packet(&ack).unwrap();
    assert_eq!(parsed.status, ACK_OK);
    assert_eq!(parsed.timestamp_millis, timestamp);
    assert!(status::verify_ack_hmac(&ack, "K"));

    // The registry now feeds network totals into V2 BASIC responses.
    let query_sender = client(5);
    let token = fetch_challenge_token(&handler, v2::RequestFamily::OneQuery, query_sender).await;
    let request =
        v2::build_query_request(v2::RequestFamily::OneQuery, v2::TYPE_BASIC, &token, 2, 0, None);
    let response = v2::parse_response(&respond(&handler, &request, query_sender).await).unwrap();
    assert_ne!(response.flags & v2::FLAG_RESPONSE_IS_NETWORK, 0);

    let value = v2::find_tlv(&response.payload, v2::TLV_TYPE_SERVER_INFO)
        .unwrap()
        .unwrap();
    let info = v2::parse_server_info(&value).unwrap();
    assert_eq!(info.online_players, 2 + 4);
    assert_eq!(info.max_players, 100 + 50);
}

#[tokio::test]
async fn accepted_status_invalidates_cached_v1_responses() {
    let mut config = QueryConfig::default();
    config.cache_ttl_seconds = 3600; // cache would otherwise outlive the test
    config.network.enabled = true;
    config.network.role = "primary".to_string();
    config.network.workers = vec![WorkerEntry::new("game-1", "K")];

    let (_service, handler) = started_service(config, default_host()).await;
    let sender: SocketAddr = "198.51.100.21:39000".parse().unwrap();

    let before = respond(&handler, &v1::build_request(v1::TYPE_BASIC), client(1)).await;
    assert_eq!(v1::parse_response(&before).unwrap().info.online_players, 2);

    let ack = respond(&handler, &status_bytes("game-1", "K", unix_millis(), 4), sender).await;
    assert_eq!(status::parse_ack_packet(&ack).unwrap().status, ACK_OK);

    let after = respond(&handler, &v1::build_request(v1::TYPE_BASIC), client(1)).await;
    assert_eq!(v1::parse_response(&after).unwrap().info.online_players, 6);
}

// ---------------------------------------------------------------------------
// 6. Shared-store aggregate staleness
// ---------------------------------------------------------------------------

fn store_snapshot_json(id: &str, online: i32, max: i32, updated_at: i64) -> String {
    format!(
        r#"{{"serverId":"{id}","serverName":"{id}-name","motd":"","onlinePlayers":{online},"maxPlayers":{max},"port":5520,"version":"1.0","players":[],"updatedAtMillis":{updated_at}}}"#
    )
}

#[tokio::test]
async fn store_aggregate_hides_stale_snapshots() {
    let store = Arc::new(NullSnapshotStore::new());
    let now = unix_millis();
    let index = "hyquery:{default}:index";
    for (id, online, age) in [("beta", 3, 3000i64), ("alpha", 5, 9000), ("gamma", 9, 11_000)] {
        store.seed(
            &format!("hyquery:{{default}}:server:{id}"),
            index,
            id,
            &store_snapshot_json(id, online, 50, now - age),
            now - age,
        );
    }

    let mut config = QueryConfig::default();
    config.network.enabled = true;
    config.network.role = "primary".to_string();
    config.network.coordinator = "redis".to_string();
    config.network.stale_after_seconds = 10;

    let service =
        QueryService::new(config, default_host()).with_snapshot_store(store.clone());
    service.start().await.unwrap();
    let handler = service.handler().unwrap();

    let response = respond(&handler, &v1::build_request(v1::TYPE_FULL), client(6)).await;
    let parsed = v1::parse_response(&response).unwrap();

    assert_eq!(parsed.remote_servers.len(), 2);
    assert_eq!(parsed.remote_servers[0].server_id, "alpha");
    assert_eq!(parsed.remote_servers[1].server_id, "beta");
    // Totals sum only the two fresh snapshots: local 2 + (5 + 3).
    assert_eq!(parsed.info.online_players, 10);

    service.shutdown().await;
}

#[tokio::test]
async fn store_startup_fails_closed_when_unreachable() {
    let store = Arc::new(NullSnapshotStore::new());
    store.fail_connect(true);

    let mut config = QueryConfig::default();
    config.network.enabled = true;
    config.network.role = "primary".to_string();
    config.network.coordinator = "redis".to_string();

    let service = QueryService::new(config, default_host()).with_snapshot_store(store);
    assert!(service.start().await.is_err());
}

#[tokio::test]
async fn store_read_failure_drops_query() {
    let store = Arc::new(NullSnapshotStore::new());
    let mut config = QueryConfig::default();
    config.cache_enabled = false;
    config.network.enabled = true;
    config.network.role = "primary".to_string();
    config.network.coordinator = "redis".to_string();

    let service =
        QueryService::new(config, default_host()).with_snapshot_store(store.clone());
    service.start().await.unwrap();
    let handler = service.handler().unwrap();

    store.fail_read(true);
    assert_eq!(
        handler
            .process(&v1::build_request(v1::TYPE_BASIC), client(2))
            .await,
        HandlerAction::Consume
    );
}

// ---------------------------------------------------------------------------
// Demultiplexer, toggles, auth, rate limiting
// ---------------------------------------------------------------------------

#[tokio::test]
async fn foreign_traffic_is_forwarded_untouched() {
    let (_service, handler) = started_service(QueryConfig::default(), default_host()).await;
    assert_eq!(
        handler.process(b"QUICv1 game payload", client(1)).await,
        HandlerAction::Forward
    );
    assert_eq!(
        handler.process(b"\x00\x01", client(1)).await,
        HandlerAction::Forward
    );
}

#[tokio::test]
async fn reply_magics_are_consumed_not_forwarded() {
    let (_service, handler) = started_service(QueryConfig::default(), default_host()).await;
    for packet in [
        &b"HYREPLY\0\x00"[..],
        &b"HYREPLY2\x01"[..],
        &b"ONEREPLY\x00"[..],
        &b"HYSTATOK\x00"[..],
    ] {
        assert_eq!(handler.process(packet, client(1)).await, HandlerAction::Consume);
    }
}

#[tokio::test]
async fn disabled_v1_drops_v1_queries() {
    let config = QueryConfig {
        v1_enabled: false,
        ..QueryConfig::default()
    };
    let (_service, handler) = started_service(config, default_host()).await;
    assert_eq!(
        handler
            .process(&v1::build_request(v1::TYPE_BASIC), client(1))
            .await,
        HandlerAction::Consume
    );
}

#[tokio::test]
async fn disabled_v2_drops_v2_queries() {
    let config = QueryConfig {
        v2_enabled: false,
        ..QueryConfig::default()
    };
    let (_service, handler) = started_service(config, default_host()).await;
    assert_eq!(
        handler
            .process(&v2::build_challenge_request(v2::RequestFamily::OneQuery), client(1))
            .await,
        HandlerAction::Consume
    );
}

#[tokio::test]
async fn status_packets_dropped_when_not_primary() {
    let (_service, handler) = started_service(QueryConfig::default(), default_host()).await;
    assert_eq!(
        handler
            .process(&status_bytes("game-1", "K", unix_millis(), 1), client(1))
            .await,
        HandlerAction::Consume
    );
}

#[tokio::test]
async fn players_endpoint_requires_token_when_not_public() {
    // showPlayerList=false maps to players=false for public access.
    let config = QueryConfig::from_json_str(
        r#"{
            "showPlayerList": false,
            "authentication": {
                "publicAccess": {"basic": true, "players": false},
                "tokens": {"scanner-key": {"basic": true, "players": true}}
            }
        }"#,
    )
    .unwrap();
    let (_service, handler) = started_service(config, default_host()).await;
    let sender = client(3);
    let token = fetch_challenge_token(&handler, v2::RequestFamily::OneQuery, sender).await;

    // Without a token: BASIC body with AUTH_REQUIRED set.
    let request =
        v2::build_query_request(v2::RequestFamily::OneQuery, v2::TYPE_PLAYERS, &token, 5, 0, None);
    let response = v2::parse_response(&respond(&handler, &request, sender).await).unwrap();
    assert_ne!(response.flags & v2::FLAG_RESPONSE_AUTH_REQUIRED, 0);
    assert_eq!(response.request_id, 5);
    assert!(v2::find_tlv(&response.payload, v2::TLV_TYPE_SERVER_INFO)
        .unwrap()
        .is_some());

    // With the configured token the listing is served.
    let request = v2::build_query_request(
        v2::RequestFamily::OneQuery,
        v2::TYPE_PLAYERS,
        &token,
        6,
        0,
        Some(b"scanner-key"),
    );
    let response = v2::parse_response(&respond(&handler, &request, sender).await).unwrap();
    assert_eq!(response.flags & v2::FLAG_RESPONSE_AUTH_REQUIRED, 0);
    assert!(v2::find_tlv(&response.payload, v2::TLV_TYPE_PLAYER_LIST)
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn unknown_v2_type_is_served_as_basic() {
    let (_service, handler) = started_service(QueryConfig::default(), default_host()).await;
    let sender = client(11);
    let token = fetch_challenge_token(&handler, v2::RequestFamily::OneQuery, sender).await;

    let request = v2::build_query_request(v2::RequestFamily::OneQuery, 0x7F, &token, 8, 0, None);
    let response = v2::parse_response(&respond(&handler, &request, sender).await).unwrap();
    assert!(v2::find_tlv(&response.payload, v2::TLV_TYPE_SERVER_INFO)
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn rate_limit_drops_excess_queries() {
    let config = QueryConfig {
        rate_limit_per_second: 1,
        rate_limit_burst: 2,
        cache_enabled: false,
        ..QueryConfig::default()
    };
    let (_service, handler) = started_service(config, default_host()).await;

    let request = v1::build_request(v1::TYPE_BASIC);
    assert!(matches!(
        handler.process(&request, client(1)).await,
        HandlerAction::Respond(_)
    ));
    assert!(matches!(
        handler.process(&request, client(1)).await,
        HandlerAction::Respond(_)
    ));
    assert_eq!(handler.process(&request, client(1)).await, HandlerAction::Consume);

    // A different source is unaffected.
    assert!(matches!(
        handler.process(&request, client(2)).await,
        HandlerAction::Respond(_)
    ));
}

#[tokio::test]
async fn malformed_packets_are_dropped_silently() {
    let (_service, handler) = started_service(QueryConfig::default(), default_host()).await;

    // V1 magic with no type byte.
    assert_eq!(
        handler.process(b"HYQUERY\0", client(1)).await,
        HandlerAction::Consume
    );
    // V2 query missing its challenge token.
    let mut short = b"ONEQUERY".to_vec();
    short.push(v2::TYPE_BASIC);
    short.extend_from_slice(&[0u8; 4]);
    assert_eq!(handler.process(&short, client(1)).await, HandlerAction::Consume);
}

#[tokio::test]
async fn host_failure_substitutes_defaults() {
    let host = Arc::new(NullHost::new());
    host.fail_players();
    let (_service, handler) = started_service(QueryConfig::default(), host).await;

    let response = respond(&handler, &v1::build_request(v1::TYPE_BASIC), client(1)).await;
    let parsed = v1::parse_response(&response).unwrap();
    assert_eq!(parsed.info.online_players, 0);
    assert_eq!(parsed.info.max_players, 100);
}

#[tokio::test]
async fn disabled_service_installs_no_handler() {
    let config = QueryConfig {
        enabled: false,
        ..QueryConfig::default()
    };
    let service = QueryService::new(config, default_host());
    service.start().await.unwrap();
    assert!(service.handler().is_none());
}

#[tokio::test]
async fn shutdown_releases_handler() {
    let (service, _handler) = started_service(QueryConfig::default(), default_host()).await;
    assert!(service.handler().is_some());
    service.shutdown().await;
    assert!(service.handler().is_none());
}

#[tokio::test]
async fn v1_full_hides_lists_unless_configured() {
    let host = default_host();
    host.add_player("carol", 3);
    let config = QueryConfig {
        show_player_list: false,
        show_plugins: false,
        ..QueryConfig::default()
    };
    let (_service, handler) = started_service(config, host.clone()).await;

    let response = respond(&handler, &v1::build_request(v1::TYPE_FULL), client(1)).await;
    let parsed = v1::parse_response(&response).unwrap();
    assert!(parsed.players.is_empty());
    assert!(parsed.plugins.is_empty());
    // Counts still reflect reality even when the list is hidden.
    assert_eq!(parsed.info.online_players, 3);
}

#[tokio::test]
async fn v1_full_lists_players_and_plugins_when_enabled() {
    let host = Arc::new(NullHost::new().with_plugins(&["hyvote:hyquery"]));
    host.add_player("alice", 1);
    let config = QueryConfig {
        show_player_list: true,
        show_plugins: true,
        ..QueryConfig::default()
    };
    let (_service, handler) = started_service(config, host).await;

    let response = respond(&handler, &v1::build_request(v1::TYPE_FULL), client(1)).await;
    let parsed = v1::parse_response(&response).unwrap();
    assert_eq!(parsed.players.len(), 1);
    assert_eq!(parsed.players[0].username, "alice");
    assert_eq!(parsed.players[0].server_id, "");
    assert_eq!(parsed.plugins, vec!["hyvote:hyquery".to_string()]);
}

#[tokio::test]
async fn v2_address_revealed_only_on_request_and_when_known() {
    let host = Arc::new(NullHost::new().with_public_address("play.example.net", 5520));
    let (_service, handler) = started_service(QueryConfig::default(), host).await;
    let sender = client(12);
    let token = fetch_challenge_token(&handler, v2::RequestFamily::OneQuery, sender).await;

    // Not requested: absent.
    let request =
        v2::build_query_request(v2::RequestFamily::OneQuery, v2::TYPE_BASIC, &token, 1, 0, None);
    let response = v2::parse_response(&respond(&handler, &request, sender).await).unwrap();
    assert_eq!(response.flags & v2::FLAG_RESPONSE_HAS_ADDRESS, 0);

    // Requested via the flags field: present.
    let mut request =
        v2::build_query_request(v2::RequestFamily::OneQuery, v2::TYPE_BASIC, &token, 2, 0, None);
    let flags_pos = 8 + 1 + 32 + 4;
    request[flags_pos..flags_pos + 2]
        .copy_from_slice(&v2::FLAG_RESPONSE_HAS_ADDRESS.to_le_bytes());
    let response = v2::parse_response(&respond(&handler, &request, sender).await).unwrap();
    assert_ne!(response.flags & v2::FLAG_RESPONSE_HAS_ADDRESS, 0);

    let value = v2::find_tlv(&response.payload, v2::TLV_TYPE_SERVER_INFO)
        .unwrap()
        .unwrap();
    assert_eq!(
        v2::parse_server_info(&value).unwrap().address,
        Some(("play.example.net".to_string(), 5520))
    );
}
