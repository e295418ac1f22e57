/// Authentication module
///
/// Handles opaque bearer/refresh token issuance, refresh rotation with
/// bounded lineage, bearer validation and password verification.

mod grants;
mod lineage;
mod password;
mod records;
mod token_factory;
mod validator;

use std::sync::Arc;

use crate::configuration::AuthSettings;
use crate::error::{AppError, AuthError};
use crate::store::TokenStore;
use crate::users::UserRepository;

pub use grants::{GrantHandlers, TokenPair};
pub use lineage::RefreshLineage;
pub use password::{CredentialVerifier, PasswordVerifier};
pub use records::{
    bearer_key, digest, is_valid_client_id, lineage_key, pending_key, refresh_key,
    BearerTokenRecord, RefreshTokenRecord, UserSnapshot,
};
pub use token_factory::{generate_token, IssuedPair, TokenFactory};
pub use validator::{BearerPrincipal, BearerValidator};

/// Result of a grant or validation that ran without infrastructure faults
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T> {
    Granted(T),
    Rejected(AuthError),
}

impl<T> Outcome<T> {
    pub fn is_granted(&self) -> bool {
        matches!(self, Outcome::Granted(_))
    }

    /// Folds a rejection into [`AppError::Auth`] for the HTTP layer.
    pub fn into_result(self) -> Result<T, AppError> {
        match self {
            Outcome::Granted(value) => Ok(value),
            Outcome::Rejected(e) => Err(AppError::Auth(e)),
        }
    }
}

/// Everything the transport layer needs, wired over one store and one user repository
#[derive(Clone)]
pub struct AuthService {
    grants: GrantHandlers,
    validator: BearerValidator,
    lineage: RefreshLineage,
    store: Arc<dyn TokenStore>,
}

impl AuthService {
    pub fn new(
        store: Arc<dyn TokenStore>,
        users: Arc<dyn UserRepository>,
        settings: &AuthSettings,
    ) -> Self {
        let lineage = RefreshLineage::new(store.clone(), settings.max_refresh_history);
        let factory = TokenFactory::new(store.clone(), settings);
        let verifier = Arc::new(CredentialVerifier::new(settings.bcrypt_cost));

        Self {
            grants: GrantHandlers::new(store.clone(), users, verifier, factory, lineage.clone()),
            validator: BearerValidator::new(store.clone(), lineage.clone()),
            lineage,
            store,
        }
    }

    pub async fn password_grant(
        &self,
        client_id: &str,
        email: &str,
        password: &str,
    ) -> Result<Outcome<TokenPair>, AppError> {
        self.grants.password_grant(client_id, email, password).await
    }

    pub async fn refresh_grant(
        &self,
        client_id: &str,
        refresh_token: &str,
    ) -> Result<Outcome<TokenPair>, AppError> {
        self.grants.refresh_grant(client_id, refresh_token).await
    }

    pub async fn validate_bearer(&self, token: &str) -> Result<Outcome<BearerPrincipal>, AppError> {
        self.validator.validate(token).await
    }

    /// Revoke all refresh tokens of the principal's (client, user) pair
    pub async fn logout(&self, principal: &BearerPrincipal) -> Result<usize, AppError> {
        self.lineage
            .revoke_all(&principal.client_id, &crate::users::normalize_email(&principal.user.email))
            .await
    }

    pub async fn ping(&self) -> Result<(), AppError> {
        self.store.ping().await.map_err(AppError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_into_result() {
        let granted: Outcome<u8> = Outcome::Granted(7);
        assert_eq!(granted.into_result().unwrap(), 7);

        let rejected: Outcome<u8> = Outcome::Rejected(AuthError::InvalidCredentials);
        assert!(matches!(
            rejected.into_result(),
            Err(AppError::Auth(AuthError::InvalidCredentials))
        ));
    }
}
