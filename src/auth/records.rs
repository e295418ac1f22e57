/// Token store records
///
/// Shapes of the bearer and refresh records as they sit in the token
/// store, and the key layout that namespaces them:
///
/// | key                     | value                                   |
/// |-------------------------|-----------------------------------------|
/// | `b/<digest>`            | bearer record (hash)                    |
/// | `r/<digest>`            | refresh record (hash)                   |
/// | `rl/<client>/<email>`   | refresh lineage, newest first (list)    |
/// | `rd/<client>/<email>`   | refresh keys pending deletion (set)     |
///
/// The digest is a lookup key, not a secret: anyone holding the store can
/// still match a presented token against it.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::StoreError;
use crate::store::Fields;
use crate::users::UserRecord;

const BEARER_PREFIX: &str = "b/";
const REFRESH_PREFIX: &str = "r/";
const LINEAGE_PREFIX: &str = "rl/";
const PENDING_PREFIX: &str = "rd/";

const FIELD_CLIENT: &str = "client";
const FIELD_EMAIL: &str = "email";
const FIELD_USER: &str = "user";
const FIELD_PRIVILEGES: &str = "privileges";
const FIELD_EXPIRES_AT: &str = "expiresAt";
pub(crate) const FIELD_FRESH: &str = "new";

/// SHA-256 hex digest of a token
pub fn digest(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

pub fn bearer_key(token: &str) -> String {
    format!("{}{}", BEARER_PREFIX, digest(token))
}

pub fn refresh_key(token: &str) -> String {
    format!("{}{}", REFRESH_PREFIX, digest(token))
}

/// Client ids become the first segment of the lineage and pending keys, so
/// they must not contain the separator.
pub fn is_valid_client_id(client_id: &str) -> bool {
    !client_id.is_empty() && !client_id.contains('/') && !client_id.chars().any(char::is_control)
}

pub fn lineage_key(client_id: &str, email: &str) -> String {
    format!("{}{}/{}", LINEAGE_PREFIX, client_id, email)
}

pub fn pending_key(client_id: &str, email: &str) -> String {
    format!("{}{}/{}", PENDING_PREFIX, client_id, email)
}

/// Minimal user cached inside a bearer record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSnapshot {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub groups: Vec<String>,
}

impl From<&UserRecord> for UserSnapshot {
    fn from(user: &UserRecord) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            name: user.name.clone(),
            groups: user.groups.clone(),
        }
    }
}

impl UserSnapshot {
    /// Space-joined group list
    pub fn privileges(&self) -> String {
        self.groups.join(" ")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BearerTokenRecord {
    pub client_id: String,
    pub user_email: String,
    pub user_snapshot: UserSnapshot,
    pub privileges: String,
    /// Epoch milliseconds
    pub expires_at: i64,
    pub is_fresh: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshTokenRecord {
    pub client_id: String,
    pub user_email: String,
    pub privileges: String,
    /// Epoch milliseconds
    pub expires_at: i64,
}

impl BearerTokenRecord {
    pub fn is_expired_at(&self, now_millis: i64) -> bool {
        self.expires_at <= now_millis
    }

    pub fn to_fields(&self) -> Result<Fields, StoreError> {
        let user = serde_json::to_string(&self.user_snapshot)
            .map_err(|e| StoreError::Corrupt(e.to_string()))?;

        Ok(Fields::from([
            (FIELD_CLIENT.to_string(), self.client_id.clone()),
            (FIELD_EMAIL.to_string(), self.user_email.clone()),
            (FIELD_USER.to_string(), user),
            (FIELD_PRIVILEGES.to_string(), self.privileges.clone()),
            (FIELD_EXPIRES_AT.to_string(), self.expires_at.to_string()),
            (FIELD_FRESH.to_string(), fresh_flag(self.is_fresh).to_string()),
        ]))
    }

    pub fn from_fields(fields: &Fields) -> Result<Self, StoreError> {
        let user_snapshot = serde_json::from_str(required(fields, FIELD_USER)?)
            .map_err(|e| StoreError::Corrupt(format!("user snapshot: {}", e)))?;

        Ok(Self {
            client_id: required(fields, FIELD_CLIENT)?.to_string(),
            user_email: required(fields, FIELD_EMAIL)?.to_string(),
            user_snapshot,
            privileges: fields.get(FIELD_PRIVILEGES).cloned().unwrap_or_default(),
            expires_at: expires_at(fields)?,
            is_fresh: fields.get(FIELD_FRESH).is_some_and(|v| v == "1"),
        })
    }
}

impl RefreshTokenRecord {
    pub fn is_expired_at(&self, now_millis: i64) -> bool {
        self.expires_at <= now_millis
    }

    pub fn to_fields(&self) -> Fields {
        Fields::from([
            (FIELD_CLIENT.to_string(), self.client_id.clone()),
            (FIELD_EMAIL.to_string(), self.user_email.clone()),
            (FIELD_PRIVILEGES.to_string(), self.privileges.clone()),
            (FIELD_EXPIRES_AT.to_string(), self.expires_at.to_string()),
        ])
    }

    pub fn from_fields(fields: &Fields) -> Result<Self, StoreError> {
        Ok(Self {
            client_id: required(fields, FIELD_CLIENT)?.to_string(),
            user_email: required(fields, FIELD_EMAIL)?.to_string(),
            privileges: fields.get(FIELD_PRIVILEGES).cloned().unwrap_or_default(),
            expires_at: expires_at(fields)?,
        })
    }
}

pub(crate) fn fresh_flag(is_fresh: bool) -> &'static str {
    if is_fresh {
        "1"
    } else {
        "0"
    }
}

fn required<'a>(fields: &'a Fields, name: &str) -> Result<&'a str, StoreError> {
    fields
        .get(name)
        .map(String::as_str)
        .ok_or_else(|| StoreError::Corrupt(format!("missing field `{}`", name)))
}

fn expires_at(fields: &Fields) -> Result<i64, StoreError> {
    required(fields, FIELD_EXPIRES_AT)?
        .parse()
        .map_err(|_| StoreError::Corrupt("unparseable expiresAt".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_id_validation() {
        assert!(is_valid_client_id("mobile-app"));
        assert!(!is_valid_client_id(""));
        assert!(!is_valid_client_id("a/b"));
        assert!(!is_valid_client_id("a\nb"));
    }

    fn snapshot() -> UserSnapshot {
        UserSnapshot {
            id: Uuid::new_v4(),
            email: "u1@x.com".to_string(),
            name: "User One".to_string(),
            groups: vec!["admins".to_string(), "editors".to_string()],
        }
    }

    #[test]
    fn test_keys_are_namespaced_digests() {
        let key = bearer_key("abc");

        assert!(key.starts_with("b/"));
        assert_eq!(key.len(), 2 + 64);
        assert_ne!(bearer_key("abc")[2..], refresh_key("abd")[2..]);
        assert_eq!(bearer_key("abc")[2..], refresh_key("abc")[2..]);
        assert_eq!(lineage_key("c1", "u1@x.com"), "rl/c1/u1@x.com");
        assert_eq!(pending_key("c1", "u1@x.com"), "rd/c1/u1@x.com");
    }

    #[test]
    fn test_privileges_are_space_joined() {
        assert_eq!(snapshot().privileges(), "admins editors");
    }

    #[test]
    fn test_bearer_record_fields() {
        let user = snapshot();
        let record = BearerTokenRecord {
            client_id: "c1".to_string(),
            user_email: user.email.clone(),
            privileges: user.privileges(),
            user_snapshot: user,
            expires_at: 1_700_000_000_000,
            is_fresh: true,
        };

        let fields = record.to_fields().unwrap();
        assert_eq!(fields.get("new").map(String::as_str), Some("1"));
        assert_eq!(fields.get("expiresAt").map(String::as_str), Some("1700000000000"));
        assert_eq!(BearerTokenRecord::from_fields(&fields).unwrap(), record);
    }

    #[test]
    fn test_bearer_record_missing_user_is_corrupt() {
        let mut fields = Fields::new();
        fields.insert("client".to_string(), "c1".to_string());

        assert!(matches!(
            BearerTokenRecord::from_fields(&fields),
            Err(StoreError::Corrupt(_))
        ));
    }

    #[test]
    fn test_refresh_record_expiry_boundary() {
        let record = RefreshTokenRecord {
            client_id: "c1".to_string(),
            user_email: "u1@x.com".to_string(),
            privileges: String::new(),
            expires_at: 1_000,
        };

        assert!(!record.is_expired_at(999));
        assert!(record.is_expired_at(1_000));
        assert_eq!(RefreshTokenRecord::from_fields(&record.to_fields()).unwrap(), record);
    }
}
