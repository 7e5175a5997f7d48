//! Session lifecycle tests: pairing, relay, teardown, auth takeover.
//!
//! These drive the session manager through its public API with all remote
//! tiers disabled. The pairing tests sleep briefly because the matchmaker's
//! anti-self-match rules require connections of a minimum (and distinct)
//! age.

use std::{sync::Arc, time::Duration};

use {
    tinchat_cache::{KvClient, PresenceBatcher},
    tinchat_common::types::{ChatType, UserStatus},
    tinchat_matchmaker::Matchmaker,
    tinchat_protocol::events::{FindPartnerParams, SendMessageParams},
    tinchat_sessions::{AttachedProfile, FindPartnerResult, SessionManager},
    tokio::sync::mpsc,
};

fn manager() -> SessionManager {
    let kv = KvClient::disabled();
    let matchmaker = Arc::new(Matchmaker::new(kv.clone()));
    let (presence, _task) = PresenceBatcher::spawn(None, kv.clone());
    SessionManager::new(matchmaker, presence, kv, None)
}

async fn connect(
    manager: &SessionManager,
    socket_id: &str,
) -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    manager.register(socket_id, tx).await;
    rx
}

fn find_params(interests: &[&str]) -> FindPartnerParams {
    FindPartnerParams {
        chat_type: ChatType::Text,
        interests: interests.iter().map(|s| s.to_string()).collect(),
        auth_id: None,
    }
}

fn next_event(rx: &mut mpsc::UnboundedReceiver<String>) -> serde_json::Value {
    let frame = rx.try_recv().expect("expected a frame");
    serde_json::from_str(&frame).expect("frame must be JSON")
}

#[tokio::test]
async fn lone_user_queues() {
    let manager = manager();
    let _rx = connect(&manager, "s1").await;
    tokio::time::sleep(Duration::from_millis(1_100)).await;
    let result = manager.find_partner("s1", &find_params(&[])).await.unwrap();
    assert!(matches!(result, FindPartnerResult::Queued));
    assert_eq!(manager.room_count().await, 0);
}

#[tokio::test]
async fn anonymous_pairing_end_to_end() {
    let manager = manager();
    let mut rx1 = connect(&manager, "s1").await;
    // Distinct connection ages so the reconnect heuristics pass.
    tokio::time::sleep(Duration::from_millis(1_600)).await;
    let mut rx2 = connect(&manager, "s2").await;
    tokio::time::sleep(Duration::from_millis(1_100)).await;

    let first = manager
        .find_partner("s1", &find_params(&["music", "games"]))
        .await
        .unwrap();
    assert!(matches!(first, FindPartnerResult::Queued));

    let second = manager
        .find_partner("s2", &find_params(&["music", "games"]))
        .await
        .unwrap();
    let FindPartnerResult::Matched { room_id } = second else {
        panic!("expected a match");
    };

    // Both sides got partner-found with the same room id and the common
    // interests.
    let ev1 = next_event(&mut rx1);
    let ev2 = next_event(&mut rx2);
    assert_eq!(ev1["event"], "partner-found");
    assert_eq!(ev2["event"], "partner-found");
    assert_eq!(ev1["data"]["roomId"], room_id.as_str());
    assert_eq!(ev2["data"]["roomId"], room_id.as_str());
    let common: Vec<String> =
        serde_json::from_value(ev1["data"]["commonInterests"].clone()).unwrap();
    assert_eq!(common, vec!["music", "games"]);

    assert!(manager.registries_consistent().await);

    // s1 sends a message; only s2 receives it, with a server id + timestamp.
    manager
        .relay_message("s1", &SendMessageParams {
            room_id: Some(room_id.clone()),
            message: "  hi \u{0007}there  ".into(),
            username: None,
            auth_id: None,
        })
        .await
        .unwrap();
    let msg = next_event(&mut rx2);
    assert_eq!(msg["event"], "message");
    assert_eq!(msg["data"]["message"], "hi there");
    assert!(msg["data"]["id"].is_string());
    assert!(msg["data"]["timestamp"].is_i64());
    assert!(rx1.try_recv().is_err(), "sender must not receive its own message");

    // Typing indicator relays to the peer.
    manager.relay_typing("s1", true).await.unwrap();
    let typing = next_event(&mut rx2);
    assert_eq!(typing["event"], "typing_start");

    // s1 disconnects; s2 receives partner-left and the room is gone.
    manager.disconnect("s1").await;
    let left = next_event(&mut rx2);
    assert_eq!(left["event"], "partner-left");
    assert_eq!(manager.room_count().await, 0);
    assert!(manager.registries_consistent().await);
}

#[tokio::test]
async fn webrtc_signal_relays_verbatim() {
    let manager = manager();
    let mut rx1 = connect(&manager, "v1").await;
    tokio::time::sleep(Duration::from_millis(1_600)).await;
    let mut rx2 = connect(&manager, "v2").await;
    tokio::time::sleep(Duration::from_millis(1_100)).await;

    let params = FindPartnerParams {
        chat_type: ChatType::Video,
        interests: vec![],
        auth_id: None,
    };
    manager.find_partner("v1", &params).await.unwrap();
    let FindPartnerResult::Matched { room_id } =
        manager.find_partner("v2", &params).await.unwrap()
    else {
        panic!("expected a match");
    };
    let _ = next_event(&mut rx1);
    let _ = next_event(&mut rx2);

    let signal = serde_json::json!({"sdp": {"type": "offer", "payload": "blob"}});
    manager.relay_signal("v1", &room_id, &signal).await.unwrap();
    let ev = next_event(&mut rx2);
    assert_eq!(ev["event"], "webrtcSignal");
    assert_eq!(ev["data"]["signalData"], signal);

    // Wrong room id is rejected.
    let err = manager
        .relay_signal("v1", "some-other-room", &signal)
        .await
        .unwrap_err();
    assert!(err.contains("room"));
}

#[tokio::test]
async fn relay_without_room_is_rejected() {
    let manager = manager();
    let _rx = connect(&manager, "s1").await;
    let err = manager
        .relay_message("s1", &SendMessageParams {
            room_id: None,
            message: "hello".into(),
            username: None,
            auth_id: None,
        })
        .await
        .unwrap_err();
    assert!(err.contains("no active chat room"));

    let err = manager.relay_typing("s1", true).await.unwrap_err();
    assert!(err.contains("no active chat room"));
}

#[tokio::test]
async fn auth_takeover_replaces_prior_socket() {
    let manager = manager();
    let mut rx_old = connect(&manager, "old").await;
    let _rx_new = connect(&manager, "new").await;

    manager
        .attach_identity("old", "userA", AttachedProfile::default())
        .await;
    manager
        .attach_identity("new", "userA", AttachedProfile::default())
        .await;

    let ev = next_event(&mut rx_old);
    assert_eq!(ev["event"], "replaced");
    // The prior socket is torn down by its ws task; simulate that here.
    manager.disconnect("old").await;
    assert!(manager.connected_sockets().await.contains("new"));
}

#[tokio::test]
async fn status_update_tracks_session_state() {
    let manager = manager();
    let _rx = connect(&manager, "s1").await;
    manager
        .attach_identity("s1", "userB", AttachedProfile::default())
        .await;
    manager
        .update_status("s1", UserStatus::Dnd)
        .await
        .unwrap();
    // Unknown sockets are rejected.
    assert!(manager.update_status("ghost", UserStatus::Idle).await.is_err());
}

#[tokio::test]
async fn leave_keeps_socket_but_drops_room() {
    let manager = manager();
    let mut rx1 = connect(&manager, "s1").await;
    tokio::time::sleep(Duration::from_millis(1_600)).await;
    let mut rx2 = connect(&manager, "s2").await;
    tokio::time::sleep(Duration::from_millis(1_100)).await;

    manager.find_partner("s1", &find_params(&[])).await.unwrap();
    let FindPartnerResult::Matched { .. } =
        manager.find_partner("s2", &find_params(&[])).await.unwrap()
    else {
        panic!("expected a match");
    };
    let _ = next_event(&mut rx1);
    let _ = next_event(&mut rx2);

    manager.leave("s1").await.unwrap();
    let ev = next_event(&mut rx2);
    assert_eq!(ev["event"], "partner-left");
    assert_eq!(manager.room_count().await, 0);
    // Both sockets are still registered and can queue again.
    assert_eq!(manager.connection_count().await, 2);
}

#[tokio::test]
async fn heartbeat_sweep_drops_dead_sockets() {
    let manager = manager();
    let rx = connect(&manager, "dead").await;
    let _rx_live = connect(&manager, "live").await;
    drop(rx); // write channel closed: the transport considers it dead

    let swept = manager.heartbeat_sweep().await;
    assert!(swept >= 1);
    let connected = manager.connected_sockets().await;
    assert!(!connected.contains("dead"));
    assert!(connected.contains("live"));
}
