/// Token Factory
///
/// Mints bearer/refresh token pairs and writes their records.
/// Tokens are opaque base62 strings; the store only ever sees their digest.
/// Lineage bookkeeping is left to the caller.

use std::sync::Arc;

use chrono::Utc;
use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};

use crate::auth::records::{
    bearer_key, refresh_key, BearerTokenRecord, RefreshTokenRecord, UserSnapshot,
};
use crate::configuration::AuthSettings;
use crate::error::AppError;
use crate::store::TokenStore;
use crate::users::{normalize_email, UserRecord};

/// 32 base62 characters, about 190 bits
const TOKEN_LENGTH: usize = 32;

/// A freshly minted token pair with the store keys it was written under
#[derive(Debug, Clone)]
pub struct IssuedPair {
    pub bearer_token: String,
    pub refresh_token: String,
    pub bearer_key: String,
    pub refresh_key: String,
}

/// Generate a new random token
pub fn generate_token() -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .take(TOKEN_LENGTH)
        .map(char::from)
        .collect()
}

#[derive(Clone)]
pub struct TokenFactory {
    store: Arc<dyn TokenStore>,
    bearer_ttl_seconds: u32,
    refresh_ttl_seconds: u32,
}

impl TokenFactory {
    pub fn new(store: Arc<dyn TokenStore>, settings: &AuthSettings) -> Self {
        Self {
            store,
            bearer_ttl_seconds: settings.bearer_ttl_seconds,
            refresh_ttl_seconds: settings.refresh_ttl_seconds,
        }
    }

    pub fn bearer_ttl_seconds(&self) -> i64 {
        i64::from(self.bearer_ttl_seconds)
    }

    /// Issue a bearer/refresh pair for `client_id` acting for `user`
    ///
    /// # Errors
    /// Returns error if either store write fails
    pub async fn issue(&self, client_id: &str, user: &UserRecord) -> Result<IssuedPair, AppError> {
        let bearer_token = generate_token();
        let refresh_token = generate_token();
        let pair = IssuedPair {
            bearer_key: bearer_key(&bearer_token),
            refresh_key: refresh_key(&refresh_token),
            bearer_token,
            refresh_token,
        };

        let now = Utc::now().timestamp_millis();
        let email = normalize_email(&user.email);
        let snapshot = UserSnapshot::from(user);
        let privileges = snapshot.privileges();

        let bearer = BearerTokenRecord {
            client_id: client_id.to_string(),
            user_email: email.clone(),
            user_snapshot: snapshot,
            privileges: privileges.clone(),
            expires_at: now + i64::from(self.bearer_ttl_seconds) * 1000,
            is_fresh: true,
        };
        let refresh = RefreshTokenRecord {
            client_id: client_id.to_string(),
            user_email: email,
            privileges,
            expires_at: now + i64::from(self.refresh_ttl_seconds) * 1000,
        };

        self.store
            .set_hash(&pair.bearer_key, bearer.to_fields()?, u64::from(self.bearer_ttl_seconds))
            .await?;
        self.store
            .set_hash(&pair.refresh_key, refresh.to_fields(), u64::from(self.refresh_ttl_seconds))
            .await?;

        Ok(pair)
    }
}
