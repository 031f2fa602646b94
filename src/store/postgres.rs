use anyhow::Context;
use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, PgPool, Postgres, Transaction};
use time::OffsetDateTime;
use tracing::info;
use uuid::Uuid;

use super::{LedgerTx, ReferralStore, Store, StoreError, UserStore};
use crate::{
    referral::{repo as referral_repo, repo_types::Referral},
    users::{
        repo as user_repo,
        repo_types::{NewUser, User},
    },
};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects and applies the bundled migrations.
    pub async fn connect(database_url: &str, max_connections: u32) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .context("connect to database")?;
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("run migrations")?;
        info!("database ready");
        Ok(Self::new(pool))
    }
}

#[async_trait]
impl UserStore for PgStore {
    async fn create(&self, user: NewUser) -> Result<User, StoreError> {
        user_repo::insert(&self.pool, &user)
            .await
            .map_err(StoreError::from_sqlx)
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        Ok(user_repo::find_by_username(&self.pool, username).await?)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(user_repo::find_by_id(&self.pool, id).await?)
    }

    async fn update_balance(&self, id: Uuid, delta: i64) -> Result<(), StoreError> {
        user_repo::add_balance(&self.pool, id, delta).await?;
        Ok(())
    }

    async fn set_referral(&self, id: Uuid, referral_id: Uuid) -> Result<bool, StoreError> {
        Ok(user_repo::set_referral(&self.pool, id, referral_id).await?)
    }

    async fn exists_by_username(&self, username: &str) -> Result<bool, StoreError> {
        Ok(user_repo::exists_by_username(&self.pool, username).await?)
    }
}

#[async_trait]
impl ReferralStore for PgStore {
    async fn create(
        &self,
        owner_id: Uuid,
        code: &str,
        expire_by: OffsetDateTime,
    ) -> Result<Referral, StoreError> {
        Ok(referral_repo::insert(&self.pool, owner_id, code, expire_by).await?)
    }

    async fn find_active_by_owner_and_code(
        &self,
        owner_id: Uuid,
        code: &str,
    ) -> Result<Option<Referral>, StoreError> {
        Ok(referral_repo::find_active_by_owner_and_code(&self.pool, owner_id, code).await?)
    }

    async fn count_active_by_owner(&self, owner_id: Uuid) -> Result<i64, StoreError> {
        Ok(referral_repo::count_active_by_owner(&self.pool, owner_id).await?)
    }

    async fn soft_expire_by_owner(
        &self,
        owner_id: Uuid,
        now: OffsetDateTime,
    ) -> Result<u64, StoreError> {
        Ok(referral_repo::soft_expire_by_owner(&self.pool, owner_id, now).await?)
    }

    async fn soft_expire_where_expired_before(
        &self,
        cutoff: OffsetDateTime,
    ) -> Result<u64, StoreError> {
        Ok(referral_repo::soft_expire_where_expired_before(&self.pool, cutoff).await?)
    }

    async fn increment_usage(&self, id: Uuid) -> Result<Option<i32>, StoreError> {
        Ok(referral_repo::increment_usage(&self.pool, id).await?)
    }
}

#[async_trait]
impl Store for PgStore {
    async fn begin(&self) -> Result<Box<dyn LedgerTx>, StoreError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgLedgerTx { tx }))
    }
}

/// Rolls back on drop unless committed.
struct PgLedgerTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl LedgerTx for PgLedgerTx {
    async fn lock_owner_referrals(&mut self, owner_id: Uuid) -> Result<u64, StoreError> {
        Ok(referral_repo::lock_active_by_owner(&mut *self.tx, owner_id).await?)
    }

    async fn add_balance(&mut self, user_id: Uuid, delta: i64) -> Result<(), StoreError> {
        user_repo::add_balance(&mut *self.tx, user_id, delta).await?;
        Ok(())
    }

    async fn set_referral(&mut self, user_id: Uuid, referral_id: Uuid) -> Result<bool, StoreError> {
        Ok(user_repo::set_referral(&mut *self.tx, user_id, referral_id).await?)
    }

    async fn increment_usage(&mut self, referral_id: Uuid) -> Result<Option<i32>, StoreError> {
        Ok(referral_repo::increment_usage(&mut *self.tx, referral_id).await?)
    }

    async fn soft_expire_by_owner(
        &mut self,
        owner_id: Uuid,
        now: OffsetDateTime,
    ) -> Result<u64, StoreError> {
        Ok(referral_repo::soft_expire_by_owner(&mut *self.tx, owner_id, now).await?)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }
}
