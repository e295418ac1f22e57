/// Bearer Token Validation
///
/// Resolves a presented bearer token to the user snapshot cached at issuance.
/// The first successful validation of a token also drains the pending
/// refresh deletions of its (client, user) pair and clears the fresh flag.

use std::sync::Arc;

use chrono::Utc;

use crate::auth::lineage::RefreshLineage;
use crate::auth::records::{bearer_key, fresh_flag, BearerTokenRecord, UserSnapshot, FIELD_FRESH};
use crate::auth::Outcome;
use crate::error::{AppError, AuthError};
use crate::store::TokenStore;

/// Identity behind a validated bearer token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BearerPrincipal {
    pub client_id: String,
    /// Space-joined groups, for authorization checks without the snapshot
    pub privileges: String,
    pub user: UserSnapshot,
}

impl BearerPrincipal {
    pub fn has_privilege(&self, group: &str) -> bool {
        self.privileges.split(' ').any(|p| p == group)
    }
}

#[derive(Clone)]
pub struct BearerValidator {
    store: Arc<dyn TokenStore>,
    lineage: RefreshLineage,
}

impl BearerValidator {
    pub fn new(store: Arc<dyn TokenStore>, lineage: RefreshLineage) -> Self {
        Self { store, lineage }
    }

    /// Validate a bearer token
    ///
    /// Two concurrent first validations may both see the fresh flag and both
    /// drain; draining is idempotent so the race is harmless.
    ///
    /// # Errors
    /// Only infrastructure faults; unknown or expired tokens are `Rejected`
    pub async fn validate(&self, token: &str) -> Result<Outcome<BearerPrincipal>, AppError> {
        let key = bearer_key(token);

        let fields = match self.store.get_hash(&key).await? {
            Some(fields) => fields,
            None => return Ok(Outcome::Rejected(AuthError::ExpiredOrUnknownToken)),
        };
        let record = BearerTokenRecord::from_fields(&fields)?;

        if record.is_expired_at(Utc::now().timestamp_millis()) {
            tracing::debug!(client_id = %record.client_id, "Bearer token expired");
            return Ok(Outcome::Rejected(AuthError::ExpiredOrUnknownToken));
        }

        if record.is_fresh {
            self.lineage
                .drain_pending_deletions(&record.client_id, &record.user_email)
                .await?;
            self.store.set_field(&key, FIELD_FRESH, fresh_flag(false)).await?;
        }

        Ok(Outcome::Granted(BearerPrincipal {
            client_id: record.client_id,
            privileges: record.privileges,
            user: record.user_snapshot,
        }))
    }
}
