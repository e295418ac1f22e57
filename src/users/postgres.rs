use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::{normalize_email, UserRecord, UserRepository};
use crate::error::AppError;

/// Postgres-backed user lookups (see `migrations/` for the schema)
#[derive(Clone)]
pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserRecord>, AppError> {
        let row = sqlx::query_as::<_, (Uuid, String, String, String, Vec<String>)>(
            r#"
            SELECT id, email, name, password_hash, groups
            FROM users
            WHERE lower(email) = $1
            "#,
        )
        .bind(normalize_email(email))
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(id, email, name, hashed_password, groups)| UserRecord {
            id,
            email,
            name,
            hashed_password,
            groups,
        }))
    }
}
