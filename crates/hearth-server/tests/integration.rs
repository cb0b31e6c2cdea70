//! End-to-end tests against a real gateway using a WebSocket client.

use std::net::SocketAddr;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use hearth_core::{EntityType, ServerMessage};
use hearth_server::{DrainOutcome, HearthServer, ServerConfig};
use tokio::time::{sleep, timeout};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};

const TIMEOUT: Duration = Duration::from_secs(5);

type WsStream = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

async fn boot_with(config: ServerConfig) -> (HearthServer, SocketAddr) {
    let server = HearthServer::new(ServerConfig { port: 0, ..config });
    let (addr, _handle) = server.listen().await.unwrap();
    (server, addr)
}

async fn boot() -> (HearthServer, SocketAddr) {
    boot_with(ServerConfig::default()).await
}

fn ws_url(addr: SocketAddr, household: &str, user: &str) -> String {
    format!("ws://{addr}/ws?householdId={household}&userId={user}&displayName={user}")
}

async fn connect(addr: SocketAddr, household: &str, user: &str) -> WsStream {
    let (ws, _) = connect_async(ws_url(addr, household, user)).await.unwrap();
    ws
}

/// Next application message, skipping control frames.
async fn next_message(ws: &mut WsStream) -> ServerMessage {
    timeout(TIMEOUT, async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Text(text))) => return ServerMessage::decode(&text).unwrap(),
                Some(Ok(_)) => {}
                other => panic!("connection ended: {other:?}"),
            }
        }
    })
    .await
    .expect("timed out waiting for a message")
}

/// Assert nothing but control frames arrives within `window`.
async fn assert_silent(ws: &mut WsStream, window: Duration) {
    let result = timeout(window, async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Text(text))) => return text.to_string(),
                Some(Ok(_)) => {}
                other => panic!("connection ended: {other:?}"),
            }
        }
    })
    .await;
    assert!(result.is_err(), "unexpected message: {result:?}");
}

async fn presence(ws: &mut WsStream) -> Vec<String> {
    match next_message(ws).await {
        ServerMessage::PresenceUpdate(list) => {
            list.into_iter().map(|e| e.user_id.into_inner()).collect()
        }
        other => panic!("expected presence_update, got {other:?}"),
    }
}

async fn data_updated(ws: &mut WsStream) -> EntityType {
    match next_message(ws).await {
        ServerMessage::DataUpdated(d) => d.entity_type,
        other => panic!("expected DATA_UPDATED, got {other:?}"),
    }
}

async fn wait_until(mut cond: impl FnMut() -> bool) {
    timeout(TIMEOUT, async {
        while !cond() {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached");
}

#[tokio::test]
async fn joiner_receives_presence_and_others_are_updated() {
    let (_server, addr) = boot().await;

    let mut ada = connect(addr, "hh1", "ada").await;
    assert_eq!(presence(&mut ada).await, vec!["ada"]);

    let mut bo = connect(addr, "hh1", "bo").await;
    assert_eq!(presence(&mut bo).await, vec!["ada", "bo"]);
    assert_eq!(presence(&mut ada).await, vec!["ada", "bo"]);
}

#[tokio::test]
async fn second_tab_gets_snapshot_without_rebroadcast() {
    let (_server, addr) = boot().await;

    let mut tab1 = connect(addr, "hh1", "ada").await;
    let _ = presence(&mut tab1).await;
    let mut tab2 = connect(addr, "hh1", "ada").await;

    assert_eq!(presence(&mut tab2).await, vec!["ada"]);
    assert_silent(&mut tab1, Duration::from_millis(200)).await;
}

#[tokio::test]
async fn transport_drop_updates_presence_and_discards_channel() {
    let (server, addr) = boot().await;

    let mut ada = connect(addr, "hh1", "ada").await;
    let _ = presence(&mut ada).await;
    let mut bo = connect(addr, "hh1", "bo").await;
    let _ = presence(&mut bo).await;
    let _ = presence(&mut ada).await;

    drop(bo);
    assert_eq!(presence(&mut ada).await, vec!["ada"]);

    ada.close(None).await.unwrap();
    let registry = server.registry().clone();
    wait_until(|| registry.channel_count() == 0).await;
    assert_eq!(registry.session_count(), 0);
}

#[tokio::test]
async fn events_stay_in_their_household() {
    let (server, addr) = boot().await;

    let mut a = connect(addr, "hh_a", "ada").await;
    let _ = presence(&mut a).await;
    let mut b = connect(addr, "hh_b", "bo").await;
    let _ = presence(&mut b).await;

    let recipients = server
        .notifier()
        .notify(EntityType::Transaction, &"hh_a".into(), None);
    assert_eq!(recipients, 1);

    assert_eq!(data_updated(&mut a).await, EntityType::Transaction);
    assert_silent(&mut b, Duration::from_millis(200)).await;
}

#[tokio::test]
async fn events_arrive_in_publish_order() {
    let (server, addr) = boot().await;

    let mut ada = connect(addr, "hh1", "ada").await;
    let _ = presence(&mut ada).await;
    let mut bo = connect(addr, "hh1", "bo").await;
    let _ = presence(&mut bo).await;
    let _ = presence(&mut ada).await;

    let order = [
        EntityType::Budget,
        EntityType::Transaction,
        EntityType::CalendarEvent,
    ];
    for entity in order {
        let _ = server.notifier().notify(entity, &"hh1".into(), None);
    }

    for ws in [&mut ada, &mut bo] {
        for expected in order {
            assert_eq!(data_updated(ws).await, expected);
        }
    }
}

#[tokio::test]
async fn late_joiner_gets_no_replay() {
    let (server, addr) = boot().await;

    let mut ada = connect(addr, "hh1", "ada").await;
    let _ = presence(&mut ada).await;
    let _ = server.notifier().notify(EntityType::Chore, &"hh1".into(), None);

    let mut bo = connect(addr, "hh1", "bo").await;
    assert_eq!(presence(&mut bo).await, vec!["ada", "bo"]);
    let _ = server.notifier().notify(EntityType::Asset, &"hh1".into(), None);
    assert_eq!(data_updated(&mut bo).await, EntityType::Asset);
}

#[tokio::test]
async fn payload_reaches_clients() {
    let (server, addr) = boot().await;
    let mut ada = connect(addr, "hh1", "ada").await;
    let _ = presence(&mut ada).await;

    let _ = server.notifier().notify(
        EntityType::Member,
        &"hh1".into(),
        Some(serde_json::json!({"memberId": "m9"})),
    );
    match next_message(&mut ada).await {
        ServerMessage::DataUpdated(d) => {
            assert_eq!(d.entity_type, EntityType::Member);
            assert_eq!(d.payload.unwrap()["memberId"], "m9");
        }
        other => panic!("expected DATA_UPDATED, got {other:?}"),
    }
}

#[tokio::test]
async fn handshake_without_identity_is_rejected() {
    let (server, addr) = boot().await;
    let err = connect_async(format!("ws://{addr}/ws?householdId=hh1"))
        .await
        .unwrap_err();
    match err {
        WsError::Http(resp) => assert_eq!(resp.status(), 400),
        other => panic!("expected HTTP rejection, got {other:?}"),
    }
    assert_eq!(server.registry().session_count(), 0);
}

#[tokio::test]
async fn connection_limit_answers_503() {
    let (_server, addr) = boot_with(ServerConfig {
        max_connections: 1,
        ..ServerConfig::default()
    })
    .await;

    let mut first = connect(addr, "hh1", "ada").await;
    let _ = presence(&mut first).await;

    let err = connect_async(ws_url(addr, "hh1", "bo")).await.unwrap_err();
    match err {
        WsError::Http(resp) => assert_eq!(resp.status(), 503),
        other => panic!("expected HTTP rejection, got {other:?}"),
    }
}

#[tokio::test]
async fn silent_client_is_dropped_by_heartbeat() {
    let (server, addr) = boot_with(ServerConfig {
        heartbeat_interval_ms: 50,
        heartbeat_timeout_ms: 150,
        ..ServerConfig::default()
    })
    .await;

    let mut silent = connect(addr, "hh1", "ada").await;
    let _ = presence(&mut silent).await;

    // Never polled again, so pings go unanswered.
    let registry = server.registry().clone();
    wait_until(|| registry.session_count() == 0).await;
    assert_eq!(registry.channel_count(), 0);
}

#[tokio::test]
async fn shutdown_closes_sessions() {
    let (server, addr) = boot().await;
    let mut ada = connect(addr, "hh1", "ada").await;
    let _ = presence(&mut ada).await;

    server.shutdown().shutdown();

    let closed = timeout(TIMEOUT, async {
        loop {
            match ws_next(&mut ada).await {
                Some(Message::Close(_)) | None => return,
                Some(_) => {}
            }
        }
    })
    .await;
    assert!(closed.is_ok());
    let registry = server.registry().clone();
    wait_until(|| registry.session_count() == 0).await;
}

#[tokio::test]
async fn drain_empties_registry_before_returning() {
    let server = HearthServer::new(ServerConfig {
        port: 0,
        ..ServerConfig::default()
    });
    let (addr, listener) = server.listen().await.unwrap();
    let mut ada = connect(addr, "hh1", "ada").await;
    let mut bo = connect(addr, "hh2", "bo").await;
    let _ = presence(&mut ada).await;
    let _ = presence(&mut bo).await;
    assert_eq!(server.registry().session_count(), 2);

    let outcome = server.shutdown().drain(listener, Some(TIMEOUT)).await;

    assert_eq!(outcome, DrainOutcome::Drained);
    assert_eq!(server.registry().session_count(), 0);
    assert_eq!(server.registry().channel_count(), 0);
}

async fn ws_next(ws: &mut WsStream) -> Option<Message> {
    match ws.next().await {
        Some(Ok(msg)) => Some(msg),
        _ => None,
    }
}

#[tokio::test]
async fn http_publish_reaches_websocket_clients() {
    let (_server, addr) = boot().await;
    let mut ada = connect(addr, "hh1", "ada").await;
    let _ = presence(&mut ada).await;

    let body = r#"{"entityType":"calendar_event"}"#;
    let request = format!(
        "POST /households/hh1/changes HTTP/1.1\r\nHost: {addr}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
    tokio::io::AsyncWriteExt::write_all(&mut stream, request.as_bytes())
        .await
        .unwrap();
    let mut response = String::new();
    let _ = tokio::io::AsyncReadExt::read_to_string(&mut stream, &mut response)
        .await
        .unwrap();
    assert!(response.starts_with("HTTP/1.1 202"), "{response}");
    assert!(response.contains(r#"{"recipients":1}"#), "{response}");

    assert_eq!(data_updated(&mut ada).await, EntityType::CalendarEvent);
}

#[tokio::test]
async fn registry_counts_sessions_and_households() {
    let (server, addr) = boot().await;
    let mut a = connect(addr, "hh1", "ada").await;
    let _ = presence(&mut a).await;
    let mut b = connect(addr, "hh2", "bo").await;
    let _ = presence(&mut b).await;

    assert_eq!(server.registry().session_count(), 2);
    assert_eq!(server.registry().channel_count(), 2);

    b.send(Message::Close(None)).await.unwrap();
    let registry = server.registry().clone();
    wait_until(|| registry.channel_count() == 1).await;
}
