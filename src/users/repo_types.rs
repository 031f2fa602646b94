use serde::Serialize;
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// User record in the database.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String, // hex digest
    #[serde(skip_serializing)]
    pub password_salt: String, // hex salt
    pub full_name: String,
    pub is_admin: bool,
    pub balance: i64,
    pub referral_id: Option<Uuid>, // set once, by a successful verification
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Fields needed to insert a user; the store assigns id and timestamps.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub password_hash: String,
    pub password_salt: String,
    pub full_name: String,
}
