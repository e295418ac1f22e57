/// Refresh Lineage
///
/// Per (client, user) bookkeeping of issued refresh tokens:
/// - a bounded history list, newest first, pruned on every issuance
/// - a pending-deletion set holding refresh keys superseded by a rotation
///
/// A rotated refresh token is not deleted right away. A client may have
/// fired a duplicate refresh with the same token (network retry); that
/// request still succeeds until the next bearer validation for the pair
/// drains the pending set.
///
/// None of the sequences here take a lock. The prune trims and reads the
/// history in one store call, so every key that leaves the list is deleted
/// by exactly one writer. Two concurrent drains can only delete the same
/// keys twice, or leave a key for the next pass.

use std::sync::Arc;

use crate::auth::records::{lineage_key, pending_key};
use crate::error::AppError;
use crate::store::TokenStore;

#[derive(Clone)]
pub struct RefreshLineage {
    store: Arc<dyn TokenStore>,
    max_history: usize,
}

impl RefreshLineage {
    pub fn new(store: Arc<dyn TokenStore>, max_history: usize) -> Self {
        Self {
            store,
            max_history: max_history.max(1),
        }
    }

    pub fn max_history(&self) -> usize {
        self.max_history
    }

    /// Record a newly issued refresh key and prune history beyond `max_history`
    ///
    /// Pruned entries are hard-deleted from the store.
    pub async fn register(
        &self,
        client_id: &str,
        email: &str,
        refresh_key: &str,
    ) -> Result<(), AppError> {
        let key = lineage_key(client_id, email);

        self.store.list_push_front(&key, refresh_key).await?;

        let stale = self.store.list_trim(&key, 0, self.max_history as i64 - 1).await?;
        if stale.is_empty() {
            return Ok(());
        }
        self.store.delete(&stale).await?;

        tracing::debug!(
            client_id = client_id,
            pruned = stale.len(),
            "Pruned refresh token history"
        );
        Ok(())
    }

    /// Schedule a just-consumed refresh key for deletion on the next bearer validation
    pub async fn defer_delete(
        &self,
        client_id: &str,
        email: &str,
        stale_refresh_key: &str,
    ) -> Result<(), AppError> {
        self.store
            .set_add(&pending_key(client_id, email), stale_refresh_key)
            .await?;
        Ok(())
    }

    /// Delete every refresh record pending deletion for the pair
    ///
    /// Only the members read here are removed from the set, so a rotation
    /// racing the drain keeps its entry for the next pass. Draining an empty
    /// set is a no-op. Returns the number of keys drained.
    pub async fn drain_pending_deletions(
        &self,
        client_id: &str,
        email: &str,
    ) -> Result<usize, AppError> {
        let key = pending_key(client_id, email);

        let pending = self.store.set_members(&key).await?;
        if pending.is_empty() {
            return Ok(0);
        }

        self.store.delete(&pending).await?;
        self.store.set_remove(&key, &pending).await?;

        tracing::debug!(
            client_id = client_id,
            drained = pending.len(),
            "Deleted superseded refresh tokens"
        );
        Ok(pending.len())
    }

    /// Revoke every refresh token of the pair (logout)
    ///
    /// Bearer tokens already handed out stay valid until they expire.
    pub async fn revoke_all(&self, client_id: &str, email: &str) -> Result<usize, AppError> {
        let history_key = lineage_key(client_id, email);
        let pending = pending_key(client_id, email);

        let mut keys = self.store.list_range(&history_key, 0, -1).await?;
        keys.extend(self.store.set_members(&pending).await?);
        let revoked = keys.len();

        if !keys.is_empty() {
            self.store.delete(&keys).await?;
        }
        self.store.set_clear(&pending).await?;
        self.store.delete(&[history_key]).await?;

        tracing::info!(client_id = client_id, revoked = revoked, "Revoked refresh tokens");
        Ok(revoked)
    }
}
