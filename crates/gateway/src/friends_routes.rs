//! Friends REST surface.
//!
//! Every handler answers with the envelope
//! `{success, data?, error?, message?, timestamp, cached?, fetchTime?}`.
//! Conflicts come back as structured refusals (409 + `message`), never as
//! thrown errors; when the system of record is absent the whole surface
//! reports 503.

use std::time::Instant;

use {
    axum::{
        Json, Router,
        extract::{Path, Query, State},
        http::StatusCode,
        routing::{get, post},
    },
    serde::Deserialize,
    tinchat_common::now_ms,
    tinchat_profiles::{FriendsService, friends::PendingDirection},
    tinchat_protocol::{
        ApiEnvelope, MAX_BATCH_STATUS_IDS, MAX_REQUEST_MESSAGE_CHARS, MAX_SEARCH_LIMIT,
        MIN_SEARCH_TERM_CHARS,
    },
    tinchat_store::error::Error as StoreError,
    tracing::error,
};

use crate::state::AppState;

type ApiResponse = (StatusCode, Json<ApiEnvelope>);

pub fn friends_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/request/send", post(send_request))
        .route("/accept-request", post(accept_request))
        .route("/decline-request", post(decline_request))
        .route("/remove", post(remove_friend))
        .route("/status", post(friendship_status))
        .route("/search", post(search))
        .route("/batch-status", post(batch_status))
        .route("/block", post(block_user))
        .route("/unblock", post(unblock_user))
        .route("/{user_id}", get(friends_list))
        .route("/{user_id}/friends", get(friends_list))
        .route("/{user_id}/requests", get(pending_requests))
        .route("/{user_id}/blocked", get(blocked_list))
        .route("/{user_id}/mutual/{other_id}", get(mutual_friends))
        .route("/{user_id}/stats", get(stats))
        .route("/{user_id}/suggestions", get(suggestions))
}

// ── Envelope helpers ─────────────────────────────────────────────────────────

fn ok(data: serde_json::Value) -> ApiResponse {
    (StatusCode::OK, Json(ApiEnvelope::ok(data)))
}

fn ok_timed(data: serde_json::Value, cached: bool, started: Instant) -> ApiResponse {
    (
        StatusCode::OK,
        Json(ApiEnvelope::ok_timed(
            data,
            cached,
            started.elapsed().as_millis() as u64,
        )),
    )
}

fn bad_request(error: impl Into<String>) -> ApiResponse {
    (StatusCode::BAD_REQUEST, Json(ApiEnvelope::error(error)))
}

fn store_error(e: &StoreError) -> ApiResponse {
    match e {
        StoreError::Conflict(message) => {
            (StatusCode::CONFLICT, Json(ApiEnvelope::refused(message)))
        },
        StoreError::NotFound => (
            StatusCode::NOT_FOUND,
            Json(ApiEnvelope::error("not found")),
        ),
        other => {
            error!(error = %other, "friends endpoint failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiEnvelope::error("internal error")),
            )
        },
    }
}

/// The friends surface requires the system of record.
fn service(state: &AppState) -> Result<&FriendsService, ApiResponse> {
    state.profile_manager.friends.as_ref().ok_or((
        StatusCode::SERVICE_UNAVAILABLE,
        Json(ApiEnvelope::error("friends features are disabled")),
    ))
}

// ── Health ───────────────────────────────────────────────────────────────────

async fn health(State(state): State<AppState>) -> ApiResponse {
    let database = match &state.profile_manager.friends {
        Some(_) => state.profile_manager.ping_store().await,
        None => false,
    };
    let redis = state.kv.ping().await;
    let database_configured = state.profile_manager.has_store();
    let redis_configured = state.config.redis_enabled();

    // Unconfigured tiers do not count against health; a configured but
    // unreachable one does.
    let overall = (!database_configured || database) && (!redis_configured || redis);
    let queue_health = state.matchmaker.health().await;

    let tier_label = |healthy: bool, configured: bool| {
        if healthy {
            "healthy"
        } else if configured {
            "unhealthy"
        } else {
            "disabled"
        }
    };
    let overall_label = if overall { "healthy" } else { "degraded" };
    let body = serde_json::json!({
        "database": tier_label(database, database_configured),
        "redis": tier_label(redis, redis_configured),
        "overall": overall_label,
        "performance": {
            "uptimeMs": now_ms() - state.started_at,
            "connections": state.sessions.connection_count().await,
            "rooms": state.sessions.room_count().await,
            "profileCacheHitRate": state.profile_manager.profiles.local_hit_rate(),
            "queues": queue_health,
        },
    });
    let status = if overall {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(ApiEnvelope::ok(body)))
}

// ── Reads ────────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct Pagination {
    limit: Option<i64>,
    offset: Option<i64>,
}

async fn friends_list(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(page): Query<Pagination>,
) -> ApiResponse {
    let friends = match service(&state) {
        Ok(f) => f,
        Err(resp) => return resp,
    };
    let limit = page.limit.unwrap_or(50);
    let offset = page.offset.unwrap_or(0);
    if !(1..=100).contains(&limit) {
        return bad_request("limit: must be between 1 and 100");
    }
    if offset < 0 {
        return bad_request("offset: must be non-negative");
    }

    let started = Instant::now();
    match friends.friends_list(&user_id, limit, offset).await {
        Ok((list, cached)) => ok_timed(
            serde_json::json!({ "friends": list, "limit": limit, "offset": offset }),
            cached,
            started,
        ),
        Err(e) => store_error(&e),
    }
}

#[derive(Deserialize)]
struct RequestsQuery {
    #[serde(rename = "type")]
    direction: Option<String>,
}

async fn pending_requests(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(query): Query<RequestsQuery>,
) -> ApiResponse {
    let friends = match service(&state) {
        Ok(f) => f,
        Err(resp) => return resp,
    };
    let direction = match query.direction.as_deref() {
        None | Some("received") => PendingDirection::Received,
        Some("sent") => PendingDirection::Sent,
        Some(other) => return bad_request(format!("type: unknown direction {other:?}")),
    };
    let started = Instant::now();
    match friends.pending_requests(&user_id, direction).await {
        Ok((requests, cached)) => {
            ok_timed(serde_json::json!({ "requests": requests }), cached, started)
        },
        Err(e) => store_error(&e),
    }
}

async fn blocked_list(State(state): State<AppState>, Path(user_id): Path<String>) -> ApiResponse {
    let blocking = match &state.profile_manager.blocking {
        Some(b) => b,
        None => {
            return (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ApiEnvelope::error("friends features are disabled")),
            );
        },
    };
    match blocking.blocked_list(&user_id).await {
        Ok(rows) => ok(serde_json::json!({ "blocked": rows })),
        Err(e) => store_error(&e),
    }
}

async fn mutual_friends(
    State(state): State<AppState>,
    Path((user_id, other_id)): Path<(String, String)>,
) -> ApiResponse {
    let friends = match service(&state) {
        Ok(f) => f,
        Err(resp) => return resp,
    };
    let started = Instant::now();
    match friends.mutual_friends(&user_id, &other_id).await {
        Ok((mutuals, cached)) => ok_timed(
            serde_json::json!({ "mutualFriends": mutuals, "count": mutuals.len() }),
            cached,
            started,
        ),
        Err(e) => store_error(&e),
    }
}

async fn stats(State(state): State<AppState>, Path(user_id): Path<String>) -> ApiResponse {
    let friends = match service(&state) {
        Ok(f) => f,
        Err(resp) => return resp,
    };
    match friends.stats(&user_id).await {
        Ok(stats) => ok(serde_json::to_value(stats).unwrap_or_default()),
        Err(e) => store_error(&e),
    }
}

async fn suggestions(State(state): State<AppState>, Path(user_id): Path<String>) -> ApiResponse {
    let friends = match service(&state) {
        Ok(f) => f,
        Err(resp) => return resp,
    };
    match friends.suggestions(&user_id, 10).await {
        Ok(list) => ok(serde_json::json!({ "suggestions": list })),
        Err(e) => store_error(&e),
    }
}

// ── Mutations ────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendRequestBody {
    sender_auth_id: String,
    receiver_auth_id: String,
    message: Option<String>,
}

async fn send_request(
    State(state): State<AppState>,
    Json(body): Json<SendRequestBody>,
) -> ApiResponse {
    let friends = match service(&state) {
        Ok(f) => f,
        Err(resp) => return resp,
    };
    if let Some(message) = &body.message {
        if message.chars().count() > MAX_REQUEST_MESSAGE_CHARS {
            return bad_request("message: at most 500 characters");
        }
    }
    match friends
        .send_request(
            &body.sender_auth_id,
            &body.receiver_auth_id,
            body.message.as_deref(),
        )
        .await
    {
        Ok(row) => (
            StatusCode::CREATED,
            Json(ApiEnvelope::ok(
                serde_json::to_value(&row).unwrap_or_default(),
            )),
        ),
        Err(e) => store_error(&e),
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AcceptRequestBody {
    request_id: String,
    accepting_user_id: String,
}

async fn accept_request(
    State(state): State<AppState>,
    Json(body): Json<AcceptRequestBody>,
) -> ApiResponse {
    let friends = match service(&state) {
        Ok(f) => f,
        Err(resp) => return resp,
    };
    match friends
        .accept_request(&body.request_id, &body.accepting_user_id)
        .await
    {
        Ok(row) => ok(serde_json::to_value(&row).unwrap_or_default()),
        Err(e) => store_error(&e),
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeclineRequestBody {
    request_id: String,
    declining_user_id: String,
}

async fn decline_request(
    State(state): State<AppState>,
    Json(body): Json<DeclineRequestBody>,
) -> ApiResponse {
    let friends = match service(&state) {
        Ok(f) => f,
        Err(resp) => return resp,
    };
    match friends
        .decline_request(&body.request_id, &body.declining_user_id)
        .await
    {
        Ok(row) => ok(serde_json::to_value(&row).unwrap_or_default()),
        Err(e) => store_error(&e),
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PairBody {
    user1_auth_id: String,
    user2_auth_id: String,
}

async fn remove_friend(State(state): State<AppState>, Json(body): Json<PairBody>) -> ApiResponse {
    let friends = match service(&state) {
        Ok(f) => f,
        Err(resp) => return resp,
    };
    match friends
        .remove_friend(&body.user1_auth_id, &body.user2_auth_id)
        .await
    {
        Ok(true) => ok(serde_json::json!({ "removed": true })),
        Ok(false) => (
            StatusCode::NOT_FOUND,
            Json(ApiEnvelope::refused("Not friends")),
        ),
        Err(e) => store_error(&e),
    }
}

async fn friendship_status(
    State(state): State<AppState>,
    Json(body): Json<PairBody>,
) -> ApiResponse {
    let friends = match service(&state) {
        Ok(f) => f,
        Err(resp) => return resp,
    };
    let started = Instant::now();
    match friends
        .friendship_status(&body.user1_auth_id, &body.user2_auth_id)
        .await
    {
        Ok(status) => ok_timed(
            serde_json::json!({ "status": status.as_str() }),
            false,
            started,
        ),
        Err(e) => store_error(&e),
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchBody {
    current_user_auth_id: String,
    search_term: String,
    limit: Option<i64>,
}

async fn search(State(state): State<AppState>, Json(body): Json<SearchBody>) -> ApiResponse {
    let search = match &state.profile_manager.search {
        Some(s) => s,
        None => {
            return (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ApiEnvelope::error("friends features are disabled")),
            );
        },
    };
    let term = body.search_term.trim();
    if term.chars().count() < MIN_SEARCH_TERM_CHARS {
        return bad_request("searchTerm: at least 2 characters");
    }
    let limit = body.limit.unwrap_or(20);
    if !(1..=MAX_SEARCH_LIMIT).contains(&limit) {
        return bad_request("limit: must be between 1 and 50");
    }
    match search.search(&body.current_user_auth_id, term, limit).await {
        Ok(results) => ok(serde_json::json!({ "results": results })),
        Err(e) => store_error(&e),
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BatchStatusBody {
    user_ids: Vec<String>,
    #[allow(dead_code)]
    requester_id: String,
}

async fn batch_status(
    State(state): State<AppState>,
    Json(body): Json<BatchStatusBody>,
) -> ApiResponse {
    let friends = match service(&state) {
        Ok(f) => f,
        Err(resp) => return resp,
    };
    if body.user_ids.len() > MAX_BATCH_STATUS_IDS {
        return bad_request("userIds: at most 100 entries");
    }
    match friends.batch_status(&body.user_ids).await {
        Ok(rows) => {
            let mut map = serde_json::Map::new();
            for row in rows {
                map.insert(
                    row.id.clone(),
                    serde_json::json!({
                        "isOnline": row.is_online,
                        "lastSeen": row.last_seen.timestamp_millis(),
                    }),
                );
            }
            ok(serde_json::Value::Object(map))
        },
        Err(e) => store_error(&e),
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BlockBody {
    blocker_auth_id: String,
    blocked_auth_id: String,
    reason: Option<String>,
}

async fn block_user(State(state): State<AppState>, Json(body): Json<BlockBody>) -> ApiResponse {
    let blocking = match &state.profile_manager.blocking {
        Some(b) => b,
        None => {
            return (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ApiEnvelope::error("friends features are disabled")),
            );
        },
    };
    match blocking
        .block(
            &body.blocker_auth_id,
            &body.blocked_auth_id,
            body.reason.as_deref(),
        )
        .await
    {
        Ok(()) => ok(serde_json::json!({ "blocked": true })),
        Err(e) => store_error(&e),
    }
}

async fn unblock_user(State(state): State<AppState>, Json(body): Json<BlockBody>) -> ApiResponse {
    let blocking = match &state.profile_manager.blocking {
        Some(b) => b,
        None => {
            return (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ApiEnvelope::error("friends features are disabled")),
            );
        },
    };
    match blocking
        .unblock(&body.blocker_auth_id, &body.blocked_auth_id)
        .await
    {
        Ok(()) => ok(serde_json::json!({ "unblocked": true })),
        Err(e) => store_error(&e),
    }
}
