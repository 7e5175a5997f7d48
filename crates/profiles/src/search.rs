//! User search with relationship annotation.

use tinchat_store::{FriendshipStore, ProfileStore, error::Result};

use crate::friends::friend_summary;

#[derive(Clone)]
pub struct SearchService {
    profiles: ProfileStore,
    friendships: FriendshipStore,
}

impl SearchService {
    #[must_use]
    pub fn new(profiles: ProfileStore, friendships: FriendshipStore) -> Self {
        Self {
            profiles,
            friendships,
        }
    }

    /// Username/display-name search. Blocked relationships (either
    /// direction) are filtered out, and each hit is annotated with the
    /// requester's relationship to it.
    pub async fn search(
        &self,
        current_user: &str,
        term: &str,
        limit: i64,
    ) -> Result<Vec<serde_json::Value>> {
        // Over-fetch a little since block filtering removes rows post-query.
        let hits = self.profiles.search(term, current_user, limit * 2).await?;
        let mut out = Vec::with_capacity(hits.len().min(limit as usize));
        for profile in hits {
            if out.len() as i64 >= limit {
                break;
            }
            let status = self
                .friendships
                .friendship_status(current_user, &profile.id)
                .await?;
            if matches!(
                status,
                tinchat_common::types::FriendshipStatus::Blocked
                    | tinchat_common::types::FriendshipStatus::BlockedBy
            ) {
                continue;
            }
            let mut summary = friend_summary(&profile);
            summary["friendshipStatus"] = serde_json::json!(status.as_str());
            out.push(summary);
        }
        Ok(out)
    }
}
