/// User repository
///
/// The token service reads users; it never writes them. Lookups go through
/// [`UserRepository`] so the grant handlers can run against Postgres in
/// production and against a seeded map in tests.

mod memory;
mod postgres;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::AppError;

pub use memory::InMemoryUserRepository;
pub use postgres::PgUserRepository;

/// A stored user, including the password hash
#[derive(Debug, Clone)]
pub struct UserRecord {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub hashed_password: String,
    pub groups: Vec<String>,
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Finds a user by email. Emails match case-insensitively.
    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserRecord>, AppError>;
}

/// Lowercases and trims an email so lookups and lineage keys agree.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
