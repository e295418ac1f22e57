/// Password Hashing and Verification
///
/// Wraps bcrypt. Hashing is slow on purpose, so both directions run on the
/// blocking pool instead of an executor thread.

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use bcrypt::{hash, verify};

use crate::auth::token_factory::generate_token;
use crate::error::AppError;

/// Checks a presented password against a stored hash
#[async_trait]
pub trait PasswordVerifier: Send + Sync {
    async fn verify(&self, password: &str, hashed: &str) -> Result<bool, AppError>;

    /// A hash at the working cost that no presented password matches.
    ///
    /// Verifying against it costs the same as a real check, so a lookup
    /// miss takes as long as a wrong password.
    async fn dummy_hash(&self) -> Result<String, AppError>;
}

/// Bcrypt-backed credential verifier with a tunable work factor
#[derive(Debug, Clone)]
pub struct CredentialVerifier {
    cost: u32,
    dummy: Arc<OnceLock<String>>,
}

impl CredentialVerifier {
    pub fn new(cost: u32) -> Self {
        Self {
            cost,
            dummy: Arc::new(OnceLock::new()),
        }
    }

    pub fn cost(&self) -> u32 {
        self.cost
    }

    /// Hash a password
    ///
    /// # Errors
    /// Returns error if bcrypt rejects the cost or the blocking task fails
    pub async fn hash(&self, password: &str) -> Result<String, AppError> {
        let password = password.to_string();
        let cost = self.cost;

        tokio::task::spawn_blocking(move || hash(password, cost))
            .await?
            .map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))
    }

    /// Verify a password against its stored hash
    ///
    /// A malformed stored hash counts as a mismatch.
    pub async fn verify(&self, password: &str, hashed: &str) -> Result<bool, AppError> {
        let password = password.to_string();
        let hashed = hashed.to_string();

        let result = tokio::task::spawn_blocking(move || verify(password, &hashed)).await?;
        match result {
            Ok(matches) => Ok(matches),
            Err(e) => {
                tracing::warn!("Stored password hash could not be checked: {}", e);
                Ok(false)
            }
        }
    }
}

#[async_trait]
impl PasswordVerifier for CredentialVerifier {
    async fn verify(&self, password: &str, hashed: &str) -> Result<bool, AppError> {
        CredentialVerifier::verify(self, password, hashed).await
    }

    async fn dummy_hash(&self) -> Result<String, AppError> {
        if let Some(hashed) = self.dummy.get() {
            return Ok(hashed.clone());
        }

        // Hashed from a random secret nobody holds. Two first callers may
        // both compute one; the loser's is discarded.
        let hashed = self.hash(&generate_token()).await?;
        Ok(self.dummy.get_or_init(|| hashed).clone())
    }
}

impl Default for CredentialVerifier {
    fn default() -> Self {
        Self::new(bcrypt::DEFAULT_COST)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn verifier() -> CredentialVerifier {
        CredentialVerifier::new(4)
    }

    #[tokio::test]
    async fn test_hash_password() {
        let password = "hunter22";
        let hash = verifier().hash(password).await.expect("Failed to hash password");

        // Hash should not be the same as password
        assert_ne!(password, hash);
        // Hash should start with bcrypt identifier
        assert!(hash.starts_with("$2"));
    }

    #[tokio::test]
    async fn test_verify_password() {
        let hash = verifier().hash("hunter22").await.unwrap();

        let is_valid = verifier().verify("hunter22", &hash).await.expect("Failed to verify password");
        assert!(is_valid);
    }

    #[tokio::test]
    async fn test_verify_wrong_password() {
        let hash = verifier().hash("hunter22").await.unwrap();

        let is_valid = verifier().verify("hunter23", &hash).await.unwrap();
        assert!(!is_valid);
    }

    #[tokio::test]
    async fn test_malformed_hash_fails_closed() {
        let is_valid = verifier().verify("hunter22", "not-a-bcrypt-hash").await.unwrap();
        assert!(!is_valid);
    }

    #[tokio::test]
    async fn test_dummy_hash_uses_working_cost_and_is_cached() {
        let verifier = verifier();

        let first = verifier.dummy_hash().await.unwrap();
        let second = verifier.clone().dummy_hash().await.unwrap();

        assert!(first.starts_with("$2b$04$"));
        assert_eq!(first, second);
        assert!(!PasswordVerifier::verify(&verifier, "", &first).await.unwrap());
    }

    #[tokio::test]
    async fn test_invalid_cost_is_an_error() {
        let result = CredentialVerifier::new(2).hash("hunter22").await;
        assert!(result.is_err());
    }
}
