//! Per-user session history feeding the candidate filter.

use {
    serde::{Deserialize, Serialize},
    std::collections::VecDeque,
};

pub const MAX_DISCONNECTS: usize = 10;
pub const MAX_MATCHES: usize = 20;
pub const MAX_PREFERRED_INTERESTS: usize = 20;
/// Records older than this are pruned.
pub const HISTORY_TTL_MS: i64 = 30 * 24 * 60 * 60 * 1_000;
/// A disconnect within this window marks the user as reconnect-suspect.
pub const RECENT_DISCONNECT_MS: i64 = 30 * 1_000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchRecord {
    pub counterparty: String,
    pub score: f64,
    pub matched_at: i64,
}

/// Rolling history per user key (auth id when present, else socket id).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionHistory {
    disconnects: VecDeque<i64>,
    matches: VecDeque<MatchRecord>,
    preferred_interests: Vec<String>,
}

impl SessionHistory {
    pub fn record_disconnect(&mut self, at: i64) {
        self.disconnects.push_back(at);
        while self.disconnects.len() > MAX_DISCONNECTS {
            self.disconnects.pop_front();
        }
    }

    /// Append a match outcome and fold the counterparty's interests into the
    /// capped preferred list.
    pub fn record_match(
        &mut self,
        counterparty: &str,
        score: f64,
        counterparty_interests: &[String],
        at: i64,
    ) {
        self.matches.push_back(MatchRecord {
            counterparty: counterparty.to_string(),
            score,
            matched_at: at,
        });
        while self.matches.len() > MAX_MATCHES {
            self.matches.pop_front();
        }
        for interest in counterparty_interests {
            let key = interest.to_ascii_lowercase();
            let known = self
                .preferred_interests
                .iter()
                .any(|p| p.to_ascii_lowercase() == key);
            if !known {
                self.preferred_interests.push(interest.clone());
            }
        }
        if self.preferred_interests.len() > MAX_PREFERRED_INTERESTS {
            let excess = self.preferred_interests.len() - MAX_PREFERRED_INTERESTS;
            self.preferred_interests.drain(0..excess);
        }
    }

    #[must_use]
    pub fn disconnected_within(&self, window_ms: i64, now: i64) -> bool {
        self.disconnects
            .back()
            .is_some_and(|&at| now - at < window_ms)
    }

    /// Whether `key` shows up among the last 10 match counterparties.
    #[must_use]
    pub fn recently_matched(&self, key: &str) -> bool {
        self.matches
            .iter()
            .rev()
            .take(10)
            .any(|r| r.counterparty == key)
    }

    #[must_use]
    pub fn preferred_interests(&self) -> &[String] {
        &self.preferred_interests
    }

    #[must_use]
    pub fn match_count(&self) -> usize {
        self.matches.len()
    }

    /// Drop records past the 30-day TTL.
    pub fn prune(&mut self, now: i64) {
        let cutoff = now - HISTORY_TTL_MS;
        while self.disconnects.front().is_some_and(|&at| at < cutoff) {
            self.disconnects.pop_front();
        }
        while self.matches.front().is_some_and(|r| r.matched_at < cutoff) {
            self.matches.pop_front();
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.disconnects.is_empty() && self.matches.is_empty()
    }
}
