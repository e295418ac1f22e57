use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use super::{normalize_email, UserRecord, UserRepository};
use crate::error::AppError;

/// Seeded, in-process user repository for tests and local development
#[derive(Clone, Default)]
pub struct InMemoryUserRepository {
    users: Arc<RwLock<HashMap<String, UserRecord>>>,
}

impl InMemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a user, keyed by normalized email.
    pub fn insert(&self, user: UserRecord) {
        let mut users = self.users.write().unwrap_or_else(|e| e.into_inner());
        users.insert(normalize_email(&user.email), user);
    }

    pub fn remove(&self, email: &str) -> Option<UserRecord> {
        let mut users = self.users.write().unwrap_or_else(|e| e.into_inner());
        users.remove(&normalize_email(email))
    }
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserRecord>, AppError> {
        let users = self
            .users
            .read()
            .map_err(|_| AppError::Internal("user map lock poisoned".to_string()))?;
        Ok(users.get(&normalize_email(email)).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn user(email: &str) -> UserRecord {
        UserRecord {
            id: Uuid::new_v4(),
            email: email.to_string(),
            name: "Test User".to_string(),
            hashed_password: "$2b$04$invalid".to_string(),
            groups: vec!["readers".to_string()],
        }
    }

    #[tokio::test]
    async fn test_lookup_is_case_insensitive() {
        let repo = InMemoryUserRepository::new();
        repo.insert(user("U1@x.com"));

        let found = repo.find_user_by_email("u1@X.COM").await.unwrap();
        assert!(found.is_some());
    }

    #[tokio::test]
    async fn test_missing_user() {
        let repo = InMemoryUserRepository::new();
        assert!(repo.find_user_by_email("nobody@x.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_remove_user() {
        let repo = InMemoryUserRepository::new();
        repo.insert(user("u1@x.com"));
        assert!(repo.remove("u1@x.com").is_some());
        assert!(repo.find_user_by_email("u1@x.com").await.unwrap().is_none());
    }
}
