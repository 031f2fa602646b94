//! Storage collaborators consumed by the auth and referral services.
//!
//! The services only see these traits; `PgStore` backs them with Postgres and
//! `MemoryStore` keeps everything in process.
use async_trait::async_trait;
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    referral::repo_types::Referral,
    users::repo_types::{NewUser, User},
};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unique constraint violated: {0}")]
    UniqueViolation(String),

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    /// Lifts unique-constraint failures out of a raw sqlx error.
    pub fn from_sqlx(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                StoreError::UniqueViolation(db.constraint().unwrap_or("unknown").to_string())
            }
            _ => StoreError::Database(e),
        }
    }
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn create(&self, user: NewUser) -> Result<User, StoreError>;
    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError>;
    /// Atomic increment of the balance.
    async fn update_balance(&self, id: Uuid, delta: i64) -> Result<(), StoreError>;
    /// Compare-and-set; returns `false` if the user already has a referral.
    async fn set_referral(&self, id: Uuid, referral_id: Uuid) -> Result<bool, StoreError>;
    async fn exists_by_username(&self, username: &str) -> Result<bool, StoreError>;
}

#[async_trait]
pub trait ReferralStore: Send + Sync {
    async fn create(
        &self,
        owner_id: Uuid,
        code: &str,
        expire_by: OffsetDateTime,
    ) -> Result<Referral, StoreError>;
    async fn find_active_by_owner_and_code(
        &self,
        owner_id: Uuid,
        code: &str,
    ) -> Result<Option<Referral>, StoreError>;
    async fn count_active_by_owner(&self, owner_id: Uuid) -> Result<i64, StoreError>;
    async fn soft_expire_by_owner(&self, owner_id: Uuid, now: OffsetDateTime)
        -> Result<u64, StoreError>;
    async fn soft_expire_where_expired_before(
        &self,
        cutoff: OffsetDateTime,
    ) -> Result<u64, StoreError>;
    /// Returns the new count, or `None` if the referral is not active.
    async fn increment_usage(&self, id: Uuid) -> Result<Option<i32>, StoreError>;
}

/// A unit of work spanning users and referrals. Dropping it without
/// `commit` discards every change made through it.
#[async_trait]
pub trait LedgerTx: Send {
    /// Locks every active referral of `owner_id`. Taken first so concurrent
    /// redemptions against one owner queue on the same rows in the same order.
    async fn lock_owner_referrals(&mut self, owner_id: Uuid) -> Result<u64, StoreError>;
    async fn add_balance(&mut self, user_id: Uuid, delta: i64) -> Result<(), StoreError>;
    async fn set_referral(&mut self, user_id: Uuid, referral_id: Uuid) -> Result<bool, StoreError>;
    async fn increment_usage(&mut self, referral_id: Uuid) -> Result<Option<i32>, StoreError>;
    async fn soft_expire_by_owner(
        &mut self,
        owner_id: Uuid,
        now: OffsetDateTime,
    ) -> Result<u64, StoreError>;
    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}

#[async_trait]
pub trait Store: UserStore + ReferralStore {
    async fn begin(&self) -> Result<Box<dyn LedgerTx>, StoreError>;
}
