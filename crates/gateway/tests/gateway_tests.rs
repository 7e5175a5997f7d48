//! Gateway integration tests: REST surface and the event-socket plane over
//! a real listener, with every external collaborator disabled.

use std::{net::SocketAddr, time::Duration};

use {
    futures::{SinkExt, StreamExt},
    tinchat_config::TinchatConfig,
    tinchat_gateway::{build_router, server::build_state},
    tokio_tungstenite::tungstenite::Message,
};

async fn start_server() -> SocketAddr {
    let config = TinchatConfig::default();
    let state = build_state(config, None).await.expect("state builds");
    let router = build_router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });
    addr
}

type WsStream = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

async fn ws_connect(addr: SocketAddr) -> WsStream {
    let (stream, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws"))
        .await
        .expect("ws connects");
    stream
}

async fn send_event(ws: &mut WsStream, event: &str, data: serde_json::Value) {
    let frame = serde_json::json!({ "event": event, "data": data });
    ws.send(Message::Text(frame.to_string().into()))
        .await
        .expect("ws send");
}

async fn recv_event(ws: &mut WsStream) -> serde_json::Value {
    loop {
        let message = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for event")
            .expect("stream open")
            .expect("frame ok");
        match message {
            Message::Text(text) => return serde_json::from_str(&text).expect("json frame"),
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("unexpected frame: {other:?}"),
        }
    }
}

// ── REST plane ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn health_reports_disabled_tiers_as_healthy() {
    let addr = start_server().await;
    let body: serde_json::Value = reqwest::get(format!("http://{addr}/api/friends/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["overall"], "healthy");
    assert_eq!(body["data"]["database"], "disabled");
    assert_eq!(body["data"]["redis"], "disabled");
    assert!(body["timestamp"].is_i64());
}

#[tokio::test]
async fn friends_surface_is_503_without_database() {
    let addr = start_server().await;
    let response = reqwest::get(format!("http://{addr}/api/friends/user_1"))
        .await
        .unwrap();
    assert_eq!(response.status(), 503);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert!(body["error"].as_str().unwrap().contains("disabled"));
}

#[tokio::test]
async fn unknown_route_is_404() {
    let addr = start_server().await;
    let response = reqwest::get(format!("http://{addr}/api/nope")).await.unwrap();
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn preflight_is_answered() {
    let addr = start_server().await;
    let client = reqwest::Client::new();
    let response = client
        .request(
            reqwest::Method::OPTIONS,
            format!("http://{addr}/api/friends/health"),
        )
        .header("Origin", "http://localhost:3000")
        .header("Access-Control-Request-Method", "GET")
        .send()
        .await
        .unwrap();
    assert!(response.status().is_success());
    assert_eq!(
        response
            .headers()
            .get("access-control-allow-origin")
            .and_then(|v| v.to_str().ok()),
        Some("http://localhost:3000")
    );
}

// ── Event-socket plane ───────────────────────────────────────────────────────

#[tokio::test]
async fn validation_failure_answers_on_same_event_channel() {
    let addr = start_server().await;
    let mut ws = ws_connect(addr).await;

    let eleven: Vec<String> = (0..11).map(|i| format!("topic{i}")).collect();
    send_event(
        &mut ws,
        "findPartner",
        serde_json::json!({ "chatType": "text", "interests": eleven }),
    )
    .await;

    let reply = recv_event(&mut ws).await;
    assert_eq!(reply["event"], "findPartner");
    assert_eq!(reply["data"]["success"], false);
    assert_eq!(reply["data"]["error"], "interests: at most 10 entries");
}

#[tokio::test]
async fn unknown_event_gets_error_frame() {
    let addr = start_server().await;
    let mut ws = ws_connect(addr).await;
    send_event(&mut ws, "teleport", serde_json::json!({})).await;
    let reply = recv_event(&mut ws).await;
    assert_eq!(reply["event"], "error");
    assert_eq!(reply["data"]["success"], false);
}

#[tokio::test]
async fn anonymous_pairing_over_the_wire() {
    let addr = start_server().await;

    let mut ws1 = ws_connect(addr).await;
    // Distinct connection ages so the matchmaker's reconnect heuristics
    // pass (anonymous minimum age 1s, age gap 500ms).
    tokio::time::sleep(Duration::from_millis(1_600)).await;
    let mut ws2 = ws_connect(addr).await;
    tokio::time::sleep(Duration::from_millis(1_100)).await;

    send_event(
        &mut ws1,
        "findPartner",
        serde_json::json!({ "chatType": "text", "interests": ["music", "games"] }),
    )
    .await;
    // Give the first enqueue a moment to land before the second triggers the
    // match.
    tokio::time::sleep(Duration::from_millis(200)).await;
    send_event(
        &mut ws2,
        "findPartner",
        serde_json::json!({ "chatType": "text", "interests": ["music", "games"] }),
    )
    .await;

    let found1 = recv_event(&mut ws1).await;
    let found2 = recv_event(&mut ws2).await;
    assert_eq!(found1["event"], "partner-found");
    assert_eq!(found2["event"], "partner-found");
    let room1 = found1["data"]["roomId"].as_str().unwrap();
    let room2 = found2["data"]["roomId"].as_str().unwrap();
    assert_eq!(room1, room2);
    assert_eq!(found1["data"]["commonInterests"], found2["data"]["commonInterests"]);

    // Message relay: only the peer sees it, with a server id and timestamp.
    send_event(
        &mut ws1,
        "sendMessage",
        serde_json::json!({ "roomId": room1, "message": "hi" }),
    )
    .await;
    let message = recv_event(&mut ws2).await;
    assert_eq!(message["event"], "message");
    assert_eq!(message["data"]["message"], "hi");
    assert!(message["data"]["id"].is_string());
    assert!(message["data"]["timestamp"].is_i64());

    // Peer disconnect propagates as partner-left.
    drop(ws1);
    let left = recv_event(&mut ws2).await;
    assert_eq!(left["event"], "partner-left");
}

#[tokio::test]
async fn oversized_message_is_rejected_without_relay() {
    let addr = start_server().await;
    let mut ws = ws_connect(addr).await;
    let long = "x".repeat(2_001);
    send_event(
        &mut ws,
        "sendMessage",
        serde_json::json!({ "message": long }),
    )
    .await;
    let reply = recv_event(&mut ws).await;
    assert_eq!(reply["event"], "sendMessage");
    assert_eq!(reply["data"]["success"], false);
    assert_eq!(reply["data"]["error"], "message: at most 2000 characters");
}
