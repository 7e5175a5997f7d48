//! Candidate rejection filter and match scoring.
//!
//! Both are pure functions over queue entries and history: the selection
//! loop never suspends.

use std::collections::HashSet;

use crate::{
    entry::QueuedUser,
    history::{RECENT_DISCONNECT_MS, SessionHistory},
};

/// Minimum connection age before an entry may match at all.
pub const MIN_AGE_AUTH_MS: i64 = 2_000;
pub const MIN_AGE_ANON_MS: i64 = 1_000;
/// Minimum difference between the two connection ages; defeats the
/// rapid-reconnect self-match.
pub const MIN_AGE_GAP_AUTH_MS: i64 = 1_000;
pub const MIN_AGE_GAP_ANON_MS: i64 = 500;
/// Wait time at which the wait factor saturates.
pub const WAIT_SATURATION_MS: i64 = 5 * 60 * 1_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    SameSocket,
    SameAuthId,
    TooYoung,
    AgeTooClose,
    RecentDisconnect,
    RecentlyMatched,
    WaitedTooLong,
}

/// Apply the rejection rules in order. `Ok(())` means the candidate survives
/// to scoring.
pub fn filter_candidate(
    seeker: &QueuedUser,
    candidate: &QueuedUser,
    seeker_history: &SessionHistory,
    candidate_history: &SessionHistory,
    now: i64,
) -> Result<(), RejectReason> {
    if seeker.socket_id == candidate.socket_id {
        return Err(RejectReason::SameSocket);
    }
    if let (Some(a), Some(b)) = (&seeker.auth_id, &candidate.auth_id) {
        if a == b {
            return Err(RejectReason::SameAuthId);
        }
    }

    // Either side's connection must be old enough; the bar is higher for
    // authenticated users since their reconnects carry identity.
    for user in [seeker, candidate] {
        let min_age = if user.is_authenticated() {
            MIN_AGE_AUTH_MS
        } else {
            MIN_AGE_ANON_MS
        };
        if user.connection_age_ms(now) < min_age {
            return Err(RejectReason::TooYoung);
        }
    }

    // Two connections born within a breath of each other look like one user
    // reconnecting.
    let either_auth = seeker.is_authenticated() || candidate.is_authenticated();
    let min_gap = if either_auth {
        MIN_AGE_GAP_AUTH_MS
    } else {
        MIN_AGE_GAP_ANON_MS
    };
    let gap = (seeker.connection_age_ms(now) - candidate.connection_age_ms(now)).abs();
    if gap < min_gap {
        return Err(RejectReason::AgeTooClose);
    }

    if seeker_history.disconnected_within(RECENT_DISCONNECT_MS, now)
        || candidate_history.disconnected_within(RECENT_DISCONNECT_MS, now)
    {
        return Err(RejectReason::RecentDisconnect);
    }

    if seeker.avoid_recent_matches && seeker_history.recently_matched(candidate.history_key()) {
        return Err(RejectReason::RecentlyMatched);
    }

    if candidate.wait_ms(now) > seeker.max_wait_ms {
        return Err(RejectReason::WaitedTooLong);
    }

    Ok(())
}

/// `s = 0.3·J + 0.2·B + 0.3·W + 0.2·P + 0.1·R`, clamped to `[0, 1]`.
/// `tiebreak` is the caller-supplied uniform random in `[0, 1)`.
#[must_use]
pub fn score_candidate(
    seeker: &QueuedUser,
    candidate: &QueuedUser,
    now: i64,
    tiebreak: f64,
) -> f64 {
    let j = interest_similarity(&seeker.interests, &candidate.interests);
    let b = if seeker.is_authenticated() && candidate.is_authenticated() {
        1.0
    } else {
        0.0
    };
    let w = (candidate.wait_ms(now) as f64 / WAIT_SATURATION_MS as f64).min(1.0);
    let p = candidate.profile_completeness();
    let r = tiebreak;

    (0.3 * j + 0.2 * b + 0.3 * w + 0.2 * p + 0.1 * r).clamp(0.0, 1.0)
}

/// Case-insensitive Jaccard similarity; 0.5 when both sets are empty, 0.3
/// when exactly one is.
#[must_use]
pub fn interest_similarity(a: &[String], b: &[String]) -> f64 {
    let a: HashSet<String> = a.iter().map(|s| s.to_ascii_lowercase()).collect();
    let b: HashSet<String> = b.iter().map(|s| s.to_ascii_lowercase()).collect();
    match (a.is_empty(), b.is_empty()) {
        (true, true) => 0.5,
        (true, false) | (false, true) => 0.3,
        (false, false) => {
            let intersection = a.intersection(&b).count() as f64;
            let union = a.union(&b).count() as f64;
            intersection / union
        },
    }
}

#[cfg(test)]
mod tests {
    use {super::*, tinchat_common::types::ChatType};

    const NOW: i64 = 1_000_000;

    fn user(socket: &str, age_ms: i64, wait_ms: i64) -> QueuedUser {
        let mut u = QueuedUser::new(socket, ChatType::Text);
        u.connection_start = NOW - age_ms;
        u.enqueued_at = NOW - wait_ms;
        u
    }

    fn auth_user(socket: &str, auth: &str, age_ms: i64, wait_ms: i64) -> QueuedUser {
        user(socket, age_ms, wait_ms).with_auth(auth)
    }

    #[test]
    fn jaccard_empty_set_conventions() {
        assert_eq!(interest_similarity(&[], &[]), 0.5);
        assert_eq!(interest_similarity(&["music".into()], &[]), 0.3);
        assert_eq!(interest_similarity(&[], &["music".into()]), 0.3);
    }

    #[test]
    fn jaccard_case_insensitive_overlap() {
        let a = vec!["Music".to_string(), "games".to_string()];
        let b = vec!["music".to_string(), "films".to_string()];
        // |{music}| / |{music, games, films}|
        assert!((interest_similarity(&a, &b) - 1.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn rejects_same_socket_and_same_auth() {
        let h = SessionHistory::default();
        let a = user("s1", 5_000, 1_000);
        assert_eq!(
            filter_candidate(&a, &a, &h, &h, NOW),
            Err(RejectReason::SameSocket)
        );

        let b = auth_user("s1", "u1", 5_000, 1_000);
        let c = auth_user("s2", "u1", 9_000, 1_000);
        assert_eq!(
            filter_candidate(&b, &c, &h, &h, NOW),
            Err(RejectReason::SameAuthId)
        );
    }

    #[test]
    fn rejects_connections_too_young() {
        let h = SessionHistory::default();
        // Anonymous: 1s minimum.
        let a = user("s1", 5_000, 100);
        let young = user("s2", 500, 100);
        assert_eq!(
            filter_candidate(&a, &young, &h, &h, NOW),
            Err(RejectReason::TooYoung)
        );
        // Authenticated: 2s minimum.
        let b = auth_user("s3", "u3", 1_500, 100);
        let c = user("s4", 9_000, 100);
        assert_eq!(
            filter_candidate(&b, &c, &h, &h, NOW),
            Err(RejectReason::TooYoung)
        );
    }

    #[test]
    fn rejects_near_simultaneous_connections() {
        let h = SessionHistory::default();
        // Anonymous pair, ages 5000 and 5300: gap 300 < 500.
        let a = user("s1", 5_000, 1_000);
        let b = user("s2", 5_300, 1_000);
        assert_eq!(
            filter_candidate(&a, &b, &h, &h, NOW),
            Err(RejectReason::AgeTooClose)
        );
        // Gap 700 passes for anonymous…
        let c = user("s3", 5_700, 1_000);
        assert_eq!(filter_candidate(&a, &c, &h, &h, NOW), Ok(()));
        // …but not when one side is authenticated (1s gap required).
        let d = auth_user("s4", "u4", 5_700, 1_000);
        assert_eq!(
            filter_candidate(&a, &d, &h, &h, NOW),
            Err(RejectReason::AgeTooClose)
        );
    }

    #[test]
    fn rejects_recent_disconnector() {
        let clean = SessionHistory::default();
        let mut suspect = SessionHistory::default();
        suspect.record_disconnect(NOW - 10_000); // 10s ago, inside 30s window
        let a = user("s1", 60_000, 1_000);
        let b = user("s2", 120_000, 1_000);
        assert_eq!(
            filter_candidate(&a, &b, &clean, &suspect, NOW),
            Err(RejectReason::RecentDisconnect)
        );
        assert_eq!(
            filter_candidate(&a, &b, &suspect, &clean, NOW),
            Err(RejectReason::RecentDisconnect)
        );
    }

    #[test]
    fn avoid_recent_matches_preference() {
        let clean = SessionHistory::default();
        let mut seeker_history = SessionHistory::default();
        seeker_history.record_match("u2", 0.8, &[], NOW - 60_000);

        let mut seeker = user("s1", 60_000, 1_000);
        seeker.avoid_recent_matches = true;
        let candidate = auth_user("s2", "u2", 120_000, 1_000);
        assert_eq!(
            filter_candidate(&seeker, &candidate, &seeker_history, &clean, NOW),
            Err(RejectReason::RecentlyMatched)
        );

        // Preference off: same history passes.
        seeker.avoid_recent_matches = false;
        assert_eq!(
            filter_candidate(&seeker, &candidate, &seeker_history, &clean, NOW),
            Ok(())
        );
    }

    #[test]
    fn rejects_candidates_past_max_wait() {
        let h = SessionHistory::default();
        let mut seeker = user("s1", 60_000, 1_000);
        seeker.max_wait_ms = 10_000;
        let waited = user("s2", 120_000, 11_000);
        assert_eq!(
            filter_candidate(&seeker, &waited, &h, &h, NOW),
            Err(RejectReason::WaitedTooLong)
        );
    }

    #[test]
    fn score_is_clamped_and_weighted() {
        let seeker = auth_user("s1", "u1", 60_000, 1_000)
            .with_interests(vec!["music".into()]);
        let mut candidate = auth_user("s2", "u2", 120_000, WAIT_SATURATION_MS + 1)
            .with_interests(vec!["music".into()]);
        candidate.display_name = Some("Ada".into());
        candidate.has_avatar = true;
        candidate.pronouns = Some("they/them".into());
        candidate.badge_count = 1;

        // J=1, B=1, W=1, P=1, R=1 → 0.3+0.2+0.3+0.2+0.1 = 1.0
        let s = score_candidate(&seeker, &candidate, NOW, 1.0);
        assert!((s - 1.0).abs() < 1e-9);

        // All factors zero except J=0.5 (both empty).
        let a = user("s3", 60_000, 0);
        let b = user("s4", 120_000, 0);
        let s = score_candidate(&a, &b, NOW, 0.0);
        assert!((s - 0.15).abs() < 1e-9);
    }

    #[test]
    fn waiting_candidate_outscores_fresh_one() {
        let seeker = user("s1", 60_000, 1_000);
        let fresh = user("s2", 120_000, 1_000);
        let waiting = user("s3", 180_000, 4 * 60 * 1_000);
        let fresh_score = score_candidate(&seeker, &fresh, NOW, 0.0);
        let waiting_score = score_candidate(&seeker, &waiting, NOW, 0.0);
        assert!(waiting_score > fresh_score);
    }
}
