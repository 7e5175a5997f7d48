//! End-to-end tests for the matchmaker over its public API, with the remote
//! mirror disabled.

use std::collections::HashSet;

use {
    tinchat_cache::KvClient,
    tinchat_common::{now_ms, types::ChatType},
    tinchat_matchmaker::{Matchmaker, QUEUE_CAP, QueuedUser},
};

/// An entry old enough to clear every connection-age rule, with a distinct
/// age per socket so the age-gap rule never fires between them.
fn eligible(socket: &str, chat_type: ChatType, age_secs: i64) -> QueuedUser {
    let mut user = QueuedUser::new(socket, chat_type);
    user.connection_start = now_ms() - age_secs * 1_000;
    user
}

#[tokio::test]
async fn double_enqueue_keeps_one_entry() {
    let mm = Matchmaker::new(KvClient::disabled());
    mm.enqueue(eligible("s1", ChatType::Text, 60)).await.unwrap();
    mm.enqueue(eligible("s1", ChatType::Text, 60)).await.unwrap();

    let health = mm.health().await;
    assert_eq!(health.text.count, 1);
    assert_eq!(health.text.duplicates, 0);
}

#[tokio::test]
async fn auth_id_dedupes_across_both_queues() {
    let mm = Matchmaker::new(KvClient::disabled());
    mm.enqueue(eligible("s1", ChatType::Text, 60).with_auth("u1"))
        .await
        .unwrap();
    // Same user reconnects on a new socket asking for video.
    mm.enqueue(eligible("s2", ChatType::Video, 30).with_auth("u1"))
        .await
        .unwrap();

    let health = mm.health().await;
    assert_eq!(health.text.count, 0);
    assert_eq!(health.video.count, 1);
    assert!(health.is_healthy());
}

#[tokio::test]
async fn empty_socket_id_is_rejected() {
    let mm = Matchmaker::new(KvClient::disabled());
    let result = mm.enqueue(eligible("", ChatType::Text, 60)).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn queue_cap_evicts_oldest() {
    let mm = Matchmaker::new(KvClient::disabled());
    for i in 0..(QUEUE_CAP + 3) {
        mm.enqueue(eligible(&format!("s{i}"), ChatType::Text, 60 + i as i64))
            .await
            .unwrap();
    }
    let health = mm.health().await;
    assert_eq!(health.text.count, QUEUE_CAP);
}

#[tokio::test]
async fn two_eligible_users_pair_up() {
    let mm = Matchmaker::new(KvClient::disabled());
    mm.enqueue(
        eligible("s1", ChatType::Text, 60).with_interests(vec!["music".into(), "games".into()]),
    )
    .await
    .unwrap();
    mm.enqueue(
        eligible("s2", ChatType::Text, 120).with_interests(vec!["music".into()]),
    )
    .await
    .unwrap();

    let outcome = mm.try_match("s1").await.expect("expected a pair");
    let pair: HashSet<&str> = [outcome.seeker.socket_id.as_str(), outcome.peer.socket_id.as_str()]
        .into_iter()
        .collect();
    assert_eq!(pair, HashSet::from(["s1", "s2"]));
    assert!(outcome.score > 0.0);

    // Both left the queue.
    let health = mm.health().await;
    assert_eq!(health.text.count, 0);
}

#[tokio::test]
async fn no_match_across_chat_types() {
    let mm = Matchmaker::new(KvClient::disabled());
    mm.enqueue(eligible("s1", ChatType::Text, 60)).await.unwrap();
    mm.enqueue(eligible("s2", ChatType::Video, 120)).await.unwrap();
    assert!(mm.try_match("s1").await.is_none());
}

#[tokio::test]
async fn rapid_reconnect_cannot_self_match() {
    let mm = Matchmaker::new(KvClient::disabled());
    // Authenticated user connects and queues.
    mm.enqueue(eligible("s1", ChatType::Text, 60).with_auth("userA"))
        .await
        .unwrap();
    // Network blip: same auth id reconnects on a fresh socket. The enqueue
    // dedup evicts the old entry, leaving exactly one.
    mm.enqueue(eligible("s2", ChatType::Text, 1).with_auth("userA"))
        .await
        .unwrap();

    assert!(mm.try_match("s2").await.is_none());
    let health = mm.health().await;
    assert_eq!(health.text.count, 1);
    assert!(health.is_healthy());
}

#[tokio::test]
async fn higher_affinity_candidate_wins() {
    let mm = Matchmaker::new(KvClient::disabled());
    mm.enqueue(
        eligible("seeker", ChatType::Text, 300)
            .with_interests(vec!["rust".into(), "chess".into()]),
    )
    .await
    .unwrap();
    mm.enqueue(eligible("stranger", ChatType::Text, 60)).await.unwrap();
    mm.enqueue(
        eligible("kindred", ChatType::Text, 120)
            .with_interests(vec!["rust".into(), "chess".into()]),
    )
    .await
    .unwrap();

    // J contributes 0.3 for the kindred candidate vs 0.3·0.3 for the
    // stranger; wait and randomness cannot close that gap here.
    let outcome = mm.try_match("seeker").await.expect("expected a pair");
    assert_eq!(outcome.peer.socket_id, "kindred");
}

#[tokio::test]
async fn remove_clears_user_from_queue() {
    let mm = Matchmaker::new(KvClient::disabled());
    mm.enqueue(eligible("s1", ChatType::Text, 60)).await.unwrap();
    assert!(mm.remove("s1", None).await);
    assert!(!mm.remove("s1", None).await);
    assert_eq!(mm.health().await.text.count, 0);
}

#[tokio::test]
async fn stale_sweep_drops_disconnected_sockets() {
    let mm = Matchmaker::new(KvClient::disabled());
    mm.enqueue(eligible("alive", ChatType::Text, 60)).await.unwrap();
    mm.enqueue(eligible("gone", ChatType::Text, 120)).await.unwrap();

    let connected: HashSet<String> = ["alive".to_string()].into_iter().collect();
    assert_eq!(mm.stale_sweep(&connected).await, 1);
    assert_eq!(mm.health().await.text.count, 1);
}

#[tokio::test]
async fn recent_disconnect_blocks_matching() {
    let mm = Matchmaker::new(KvClient::disabled());
    mm.enqueue(eligible("s1", ChatType::Text, 60)).await.unwrap();
    mm.enqueue(eligible("s2", ChatType::Text, 120)).await.unwrap();
    // s2 is flagged as having dropped a connection moments ago.
    mm.record_disconnect("s2").await;
    assert!(mm.try_match("s1").await.is_none());
}

#[tokio::test]
async fn match_history_feeds_preferred_interests() {
    let mm = Matchmaker::new(KvClient::disabled());
    mm.enqueue(eligible("s1", ChatType::Text, 60).with_auth("u1"))
        .await
        .unwrap();
    mm.enqueue(
        eligible("s2", ChatType::Text, 120)
            .with_auth("u2")
            .with_interests(vec!["astronomy".into()]),
    )
    .await
    .unwrap();

    mm.try_match("s1").await.expect("expected a pair");
    let preferred = mm.preferred_interests("u1").await;
    assert_eq!(preferred, vec!["astronomy".to_string()]);
}
