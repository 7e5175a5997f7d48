//! Block/unblock operations.

use {
    tinchat_cache::FriendsCache,
    tinchat_store::{BlockRow, FriendshipStore, error::Result},
    tracing::info,
};

#[derive(Clone)]
pub struct BlockingService {
    friendships: FriendshipStore,
    cache: FriendsCache,
}

impl BlockingService {
    #[must_use]
    pub fn new(friendships: FriendshipStore, cache: FriendsCache) -> Self {
        Self { friendships, cache }
    }

    /// Block `blocked`: severs any friendship, kills pending requests both
    /// ways, then invalidates the pair's caches.
    pub async fn block(&self, blocker: &str, blocked: &str, reason: Option<&str>) -> Result<()> {
        self.friendships.block(blocker, blocked, reason).await?;
        self.cache.invalidate_pair(blocker, blocked).await;
        info!(blocker, blocked, "user blocked");
        Ok(())
    }

    pub async fn unblock(&self, blocker: &str, blocked: &str) -> Result<()> {
        self.friendships.unblock(blocker, blocked).await?;
        self.cache.invalidate_pair(blocker, blocked).await;
        info!(blocker, blocked, "user unblocked");
        Ok(())
    }

    pub async fn blocked_list(&self, blocker: &str) -> Result<Vec<BlockRow>> {
        self.friendships.blocked_by_user(blocker).await
    }
}
