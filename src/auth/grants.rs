/// Grant Handlers
///
/// Password and refresh-token grants. Each runs PENDING -> AUTHENTICATED ->
/// ISSUED, or stops at REJECTED. Rejections never say which factor failed.
///
/// Store calls inside one grant are strictly sequential: issue, then
/// register the lineage, then (refresh only) defer the consumed key.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;

use crate::auth::lineage::RefreshLineage;
use crate::auth::password::PasswordVerifier;
use crate::auth::records::{is_valid_client_id, refresh_key, RefreshTokenRecord};
use crate::auth::token_factory::{IssuedPair, TokenFactory};
use crate::auth::Outcome;
use crate::error::{AppError, AuthError};
use crate::store::TokenStore;
use crate::users::{normalize_email, UserRecord, UserRepository};

/// Tokens handed back to the client
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    /// Bearer lifetime in seconds
    pub expires_in: i64,
}

#[derive(Clone)]
pub struct GrantHandlers {
    store: Arc<dyn TokenStore>,
    users: Arc<dyn UserRepository>,
    verifier: Arc<dyn PasswordVerifier>,
    factory: TokenFactory,
    lineage: RefreshLineage,
}

impl GrantHandlers {
    pub fn new(
        store: Arc<dyn TokenStore>,
        users: Arc<dyn UserRepository>,
        verifier: Arc<dyn PasswordVerifier>,
        factory: TokenFactory,
        lineage: RefreshLineage,
    ) -> Self {
        Self {
            store,
            users,
            verifier,
            factory,
            lineage,
        }
    }

    /// Exchange an email/password pair for tokens
    ///
    /// # Errors
    /// Only infrastructure faults; bad credentials are `Rejected`
    pub async fn password_grant(
        &self,
        client_id: &str,
        email: &str,
        password: &str,
    ) -> Result<Outcome<TokenPair>, AppError> {
        if !is_valid_client_id(client_id) {
            return Ok(Outcome::Rejected(AuthError::InvalidClient));
        }

        let user = match self.users.find_user_by_email(email).await? {
            Some(user) => user,
            None => {
                // Burn a full verification so a miss is as slow as a wrong password.
                let dummy = self.verifier.dummy_hash().await?;
                self.verifier.verify(password, &dummy).await?;
                tracing::debug!(client_id = client_id, "Password grant: unknown email");
                return Ok(Outcome::Rejected(AuthError::InvalidCredentials));
            }
        };

        if !self.verifier.verify(password, &user.hashed_password).await? {
            tracing::debug!(client_id = client_id, user_id = %user.id, "Password grant: wrong password");
            return Ok(Outcome::Rejected(AuthError::InvalidCredentials));
        }

        let pair = self.issue(client_id, &user).await?;

        tracing::info!(client_id = client_id, user_id = %user.id, "Password grant issued");
        Ok(Outcome::Granted(self.token_pair(pair)))
    }

    /// Rotate a refresh token into a new token pair
    ///
    /// The consumed refresh token stays usable until the next bearer
    /// validation for the (client, user) pair.
    ///
    /// # Errors
    /// Only infrastructure faults; unknown, expired or foreign tokens are `Rejected`
    pub async fn refresh_grant(
        &self,
        client_id: &str,
        refresh_token: &str,
    ) -> Result<Outcome<TokenPair>, AppError> {
        if !is_valid_client_id(client_id) {
            return Ok(Outcome::Rejected(AuthError::InvalidClient));
        }

        let consumed_key = refresh_key(refresh_token);

        let record = match self.store.get_hash(&consumed_key).await? {
            Some(fields) => RefreshTokenRecord::from_fields(&fields)?,
            None => return Ok(Outcome::Rejected(AuthError::ExpiredOrUnknownToken)),
        };

        if record.is_expired_at(Utc::now().timestamp_millis()) {
            return Ok(Outcome::Rejected(AuthError::ExpiredOrUnknownToken));
        }

        // Refresh tokens are bound to the client they were issued to.
        if record.client_id != client_id {
            tracing::warn!(
                client_id = client_id,
                "Refresh token presented by a client it was not issued to"
            );
            return Ok(Outcome::Rejected(AuthError::ExpiredOrUnknownToken));
        }

        // Reload so the new pair reflects current group membership.
        let user = match self.users.find_user_by_email(&record.user_email).await? {
            Some(user) => user,
            None => {
                tracing::info!(client_id = client_id, "Refresh grant for a removed user");
                return Ok(Outcome::Rejected(AuthError::ExpiredOrUnknownToken));
            }
        };

        let pair = self.issue(client_id, &user).await?;
        self.lineage
            .defer_delete(client_id, &normalize_email(&user.email), &consumed_key)
            .await?;

        tracing::info!(client_id = client_id, user_id = %user.id, "Refresh token rotated");
        Ok(Outcome::Granted(self.token_pair(pair)))
    }

    async fn issue(&self, client_id: &str, user: &UserRecord) -> Result<IssuedPair, AppError> {
        let pair = self.factory.issue(client_id, user).await?;
        self.lineage
            .register(client_id, &normalize_email(&user.email), &pair.refresh_key)
            .await?;
        Ok(pair)
    }

    fn token_pair(&self, pair: IssuedPair) -> TokenPair {
        TokenPair {
            access_token: pair.bearer_token,
            refresh_token: pair.refresh_token,
            expires_in: self.factory.bearer_ttl_seconds(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::password::CredentialVerifier;
    use crate::auth::records::lineage_key;
    use crate::configuration::AuthSettings;
    use crate::store::MemoryStore;
    use crate::users::InMemoryUserRepository;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use uuid::Uuid;

    /// Counts password checks on top of the real verifier
    struct CountingVerifier {
        inner: CredentialVerifier,
        checks: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl PasswordVerifier for CountingVerifier {
        async fn verify(&self, password: &str, hashed: &str) -> Result<bool, AppError> {
            self.checks.fetch_add(1, Ordering::SeqCst);
            self.inner.verify(password, hashed).await
        }

        async fn dummy_hash(&self) -> Result<String, AppError> {
            self.inner.dummy_hash().await
        }
    }

    struct Harness {
        store: Arc<MemoryStore>,
        users: InMemoryUserRepository,
        verifier: Arc<CountingVerifier>,
        grants: GrantHandlers,
    }

    async fn harness() -> Harness {
        let store = Arc::new(MemoryStore::new());
        let users = InMemoryUserRepository::new();
        let verifier = Arc::new(CountingVerifier {
            inner: CredentialVerifier::new(4),
            checks: AtomicUsize::new(0),
        });
        let settings = AuthSettings::default();

        users.insert(UserRecord {
            id: Uuid::new_v4(),
            email: "u1@x.com".to_string(),
            name: "User One".to_string(),
            hashed_password: verifier.inner.hash("hunter22").await.unwrap(),
            groups: vec!["members".to_string()],
        });

        let grants = GrantHandlers::new(
            store.clone(),
            Arc::new(users.clone()),
            verifier.clone(),
            TokenFactory::new(store.clone(), &settings),
            RefreshLineage::new(store.clone(), settings.max_refresh_history),
        );

        Harness {
            store,
            users,
            verifier,
            grants,
        }
    }

    fn granted(outcome: Outcome<TokenPair>) -> TokenPair {
        match outcome {
            Outcome::Granted(pair) => pair,
            Outcome::Rejected(e) => panic!("Expected a token pair, got {}", e),
        }
    }

    #[tokio::test]
    async fn test_password_grant_issues_pair() {
        let h = harness().await;

        let pair = granted(h.grants.password_grant("c1", "u1@x.com", "hunter22").await.unwrap());

        assert_eq!(pair.expires_in, 7200);
        let history = h.store.list_range(&lineage_key("c1", "u1@x.com"), 0, -1).await.unwrap();
        assert_eq!(history, vec![refresh_key(&pair.refresh_token)]);
    }

    #[tokio::test]
    async fn test_password_grant_rejections_are_indistinguishable() {
        let h = harness().await;

        let wrong_password = h.grants.password_grant("c1", "u1@x.com", "hunter23").await.unwrap();
        let unknown_user = h.grants.password_grant("c1", "u9@x.com", "hunter22").await.unwrap();

        assert_eq!(wrong_password, Outcome::Rejected(AuthError::InvalidCredentials));
        assert_eq!(unknown_user, wrong_password);
        assert!(h.store.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_email_still_pays_for_a_password_check() {
        let h = harness().await;

        h.grants.password_grant("c1", "u9@x.com", "hunter22").await.unwrap();
        let after_unknown = h.verifier.checks.load(Ordering::SeqCst);
        h.grants.password_grant("c1", "u1@x.com", "hunter23").await.unwrap();
        let after_wrong = h.verifier.checks.load(Ordering::SeqCst);

        assert_eq!(after_unknown, 1);
        assert_eq!(after_wrong - after_unknown, 1);
    }

    #[tokio::test]
    async fn test_refresh_grant_defers_deletion_of_consumed_token() {
        let h = harness().await;
        let first = granted(h.grants.password_grant("c1", "u1@x.com", "hunter22").await.unwrap());

        let second = granted(h.grants.refresh_grant("c1", &first.refresh_token).await.unwrap());

        assert_ne!(first.refresh_token, second.refresh_token);
        assert!(h.store.get_hash(&refresh_key(&first.refresh_token)).await.unwrap().is_some());
        let pending = h.store.set_members("rd/c1/u1@x.com").await.unwrap();
        assert_eq!(pending, vec![refresh_key(&first.refresh_token)]);
    }

    #[tokio::test]
    async fn test_client_id_with_key_separator_is_rejected() {
        let h = harness().await;

        let password = h.grants.password_grant("c1/u9", "u1@x.com", "hunter22").await.unwrap();
        let refresh = h.grants.refresh_grant("a/b", "any-token").await.unwrap();

        assert_eq!(password, Outcome::Rejected(AuthError::InvalidClient));
        assert_eq!(refresh, Outcome::Rejected(AuthError::InvalidClient));
        assert!(h.store.is_empty());
    }

    #[tokio::test]
    async fn test_refresh_grant_unknown_token() {
        let h = harness().await;

        let outcome = h.grants.refresh_grant("c1", "not-a-token").await.unwrap();
        assert_eq!(outcome, Outcome::Rejected(AuthError::ExpiredOrUnknownToken));
    }

    #[tokio::test]
    async fn test_refresh_grant_rejects_other_client() {
        let h = harness().await;
        let pair = granted(h.grants.password_grant("c1", "u1@x.com", "hunter22").await.unwrap());

        let outcome = h.grants.refresh_grant("c2", &pair.refresh_token).await.unwrap();
        assert_eq!(outcome, Outcome::Rejected(AuthError::ExpiredOrUnknownToken));
    }

    #[tokio::test]
    async fn test_refresh_grant_rejects_removed_user() {
        let h = harness().await;
        let pair = granted(h.grants.password_grant("c1", "u1@x.com", "hunter22").await.unwrap());
        h.users.remove("u1@x.com");

        let outcome = h.grants.refresh_grant("c1", &pair.refresh_token).await.unwrap();
        assert_eq!(outcome, Outcome::Rejected(AuthError::ExpiredOrUnknownToken));
    }

    #[tokio::test]
    async fn test_refresh_grant_rejects_logically_expired_record() {
        let h = harness().await;
        let record = RefreshTokenRecord {
            client_id: "c1".to_string(),
            user_email: "u1@x.com".to_string(),
            privileges: "members".to_string(),
            expires_at: Utc::now().timestamp_millis() - 1,
        };
        h.store
            .set_hash(&refresh_key("stale"), record.to_fields(), 3600)
            .await
            .unwrap();

        let outcome = h.grants.refresh_grant("c1", "stale").await.unwrap();
        assert_eq!(outcome, Outcome::Rejected(AuthError::ExpiredOrUnknownToken));
    }
}
