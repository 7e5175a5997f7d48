//! Queue introspection for the health endpoint and operational logging.

use std::collections::HashSet;

use serde::Serialize;

use crate::{STALE_WAIT_MS, entry::QueuedUser};

#[derive(Debug, Clone, Default, Serialize)]
pub struct QueueStats {
    pub count: usize,
    pub authenticated: usize,
    pub anonymous: usize,
    /// Longest wait in the queue, in milliseconds.
    pub oldest_wait_ms: i64,
    /// Entries waiting past the stale bound.
    pub stale: usize,
    /// Entries sharing a socket id or auth id with another; should always be
    /// zero.
    pub duplicates: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct QueueHealthReport {
    pub text: QueueStats,
    pub video: QueueStats,
}

impl QueueHealthReport {
    pub fn compute<'a>(
        text: impl Iterator<Item = &'a QueuedUser>,
        video: impl Iterator<Item = &'a QueuedUser>,
        now: i64,
    ) -> Self {
        let text: Vec<&QueuedUser> = text.collect();
        let video: Vec<&QueuedUser> = video.collect();
        let mut report = Self {
            text: stats_for(&text, now),
            video: stats_for(&video, now),
        };
        // Auth-id uniqueness spans both queues.
        report.text.duplicates += cross_queue_auth_duplicates(&text, &video);
        report
    }

    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.text.duplicates == 0 && self.video.duplicates == 0
    }
}

fn stats_for(users: &[&QueuedUser], now: i64) -> QueueStats {
    let mut stats = QueueStats::default();
    let mut sockets = HashSet::new();
    let mut auth_ids = HashSet::new();
    for user in users {
        stats.count += 1;
        if user.is_authenticated() {
            stats.authenticated += 1;
        } else {
            stats.anonymous += 1;
        }
        let wait = user.wait_ms(now);
        stats.oldest_wait_ms = stats.oldest_wait_ms.max(wait);
        if wait > STALE_WAIT_MS {
            stats.stale += 1;
        }
        if !sockets.insert(user.socket_id.as_str()) {
            stats.duplicates += 1;
        }
        if let Some(auth) = user.auth_id.as_deref() {
            if !auth_ids.insert(auth) {
                stats.duplicates += 1;
            }
        }
    }
    stats
}

fn cross_queue_auth_duplicates(text: &[&QueuedUser], video: &[&QueuedUser]) -> usize {
    let text_auth: HashSet<&str> = text.iter().filter_map(|u| u.auth_id.as_deref()).collect();
    video
        .iter()
        .filter_map(|u| u.auth_id.as_deref())
        .filter(|a| text_auth.contains(a))
        .count()
}

#[cfg(test)]
mod tests {
    use {super::*, tinchat_common::types::ChatType};

    const NOW: i64 = 10_000_000;

    fn user(socket: &str, wait_ms: i64) -> QueuedUser {
        let mut u = QueuedUser::new(socket, ChatType::Text);
        u.enqueued_at = NOW - wait_ms;
        u.connection_start = NOW - wait_ms - 5_000;
        u
    }

    #[test]
    fn counts_and_split() {
        let a = user("s1", 1_000);
        let b = user("s2", STALE_WAIT_MS + 1).with_auth("u2");
        let users = vec![&a, &b];
        let stats = stats_for(&users, NOW);
        assert_eq!(stats.count, 2);
        assert_eq!(stats.authenticated, 1);
        assert_eq!(stats.anonymous, 1);
        assert_eq!(stats.stale, 1);
        assert_eq!(stats.oldest_wait_ms, STALE_WAIT_MS + 1);
        assert_eq!(stats.duplicates, 0);
    }

    #[test]
    fn detects_cross_queue_auth_duplicates() {
        let a = user("s1", 0).with_auth("u1");
        let mut b = QueuedUser::new("s2", ChatType::Video).with_auth("u1");
        b.enqueued_at = NOW;
        let report = QueueHealthReport::compute([&a].into_iter(), [&b].into_iter(), NOW);
        assert!(!report.is_healthy());
        assert_eq!(report.text.duplicates, 1);
    }
}
