use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use super::{LedgerTx, ReferralStore, Store, StoreError, UserStore};
use crate::{
    referral::repo_types::{Referral, ReferralState},
    users::repo_types::{NewUser, User},
};

#[derive(Debug, Clone, Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    referrals: HashMap<Uuid, Referral>,
}

impl Tables {
    fn add_balance(&mut self, id: Uuid, delta: i64) {
        if let Some(user) = self.users.get_mut(&id) {
            user.balance += delta;
            user.updated_at = OffsetDateTime::now_utc();
        }
    }

    fn set_referral(&mut self, id: Uuid, referral_id: Uuid) -> bool {
        match self.users.get_mut(&id) {
            Some(user) if user.referral_id.is_none() => {
                user.referral_id = Some(referral_id);
                user.updated_at = OffsetDateTime::now_utc();
                true
            }
            _ => false,
        }
    }

    fn increment_usage(&mut self, id: Uuid) -> Option<i32> {
        let referral = self.referrals.get_mut(&id).filter(|r| r.is_active())?;
        referral.usage_count += 1;
        Some(referral.usage_count)
    }

    fn expire_where<P>(&mut self, now: OffsetDateTime, predicate: P) -> u64
    where
        P: Fn(&Referral) -> bool,
    {
        let mut expired = 0;
        for referral in self.referrals.values_mut() {
            if referral.is_active() && predicate(referral) {
                referral.state = ReferralState::Expired;
                referral.expired_at = Some(now);
                expired += 1;
            }
        }
        expired
    }
}

/// Process-local store; every operation runs under one lock.
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub async fn referral(&self, id: Uuid) -> Option<Referral> {
        self.tables.lock().await.referrals.get(&id).cloned()
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn create(&self, user: NewUser) -> Result<User, StoreError> {
        let mut tables = self.tables.lock().await;
        if tables.users.values().any(|u| u.username == user.username) {
            return Err(StoreError::UniqueViolation("users_username_key".into()));
        }
        let now = OffsetDateTime::now_utc();
        let row = User {
            id: Uuid::new_v4(),
            username: user.username,
            password_hash: user.password_hash,
            password_salt: user.password_salt,
            full_name: user.full_name,
            is_admin: false,
            balance: 0,
            referral_id: None,
            created_at: now,
            updated_at: now,
        };
        tables.users.insert(row.id, row.clone());
        Ok(row)
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables.users.values().find(|u| u.username == username).cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.tables.lock().await.users.get(&id).cloned())
    }

    async fn update_balance(&self, id: Uuid, delta: i64) -> Result<(), StoreError> {
        self.tables.lock().await.add_balance(id, delta);
        Ok(())
    }

    async fn set_referral(&self, id: Uuid, referral_id: Uuid) -> Result<bool, StoreError> {
        Ok(self.tables.lock().await.set_referral(id, referral_id))
    }

    async fn exists_by_username(&self, username: &str) -> Result<bool, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables.users.values().any(|u| u.username == username))
    }
}

#[async_trait]
impl ReferralStore for MemoryStore {
    async fn create(
        &self,
        owner_id: Uuid,
        code: &str,
        expire_by: OffsetDateTime,
    ) -> Result<Referral, StoreError> {
        let row = Referral {
            id: Uuid::new_v4(),
            owner_id,
            code: code.to_string(),
            state: ReferralState::Active,
            usage_count: 0,
            created_at: OffsetDateTime::now_utc(),
            expire_by,
            expired_at: None,
        };
        self.tables.lock().await.referrals.insert(row.id, row.clone());
        Ok(row)
    }

    async fn find_active_by_owner_and_code(
        &self,
        owner_id: Uuid,
        code: &str,
    ) -> Result<Option<Referral>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .referrals
            .values()
            .filter(|r| r.owner_id == owner_id && r.code == code && r.is_active())
            .max_by_key(|r| r.created_at)
            .cloned())
    }

    async fn count_active_by_owner(&self, owner_id: Uuid) -> Result<i64, StoreError> {
        let tables = self.tables.lock().await;
        let count = tables
            .referrals
            .values()
            .filter(|r| r.owner_id == owner_id && r.is_active())
            .count();
        Ok(count as i64)
    }

    async fn soft_expire_by_owner(
        &self,
        owner_id: Uuid,
        now: OffsetDateTime,
    ) -> Result<u64, StoreError> {
        let mut tables = self.tables.lock().await;
        Ok(tables.expire_where(now, |r| r.owner_id == owner_id))
    }

    async fn soft_expire_where_expired_before(
        &self,
        cutoff: OffsetDateTime,
    ) -> Result<u64, StoreError> {
        let mut tables = self.tables.lock().await;
        Ok(tables.expire_where(cutoff, |r| r.expire_by < cutoff))
    }

    async fn increment_usage(&self, id: Uuid) -> Result<Option<i32>, StoreError> {
        Ok(self.tables.lock().await.increment_usage(id))
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn LedgerTx>, StoreError> {
        let guard = self.tables.clone().lock_owned().await;
        let staged = guard.clone();
        Ok(Box::new(MemoryLedgerTx { guard, staged }))
    }
}

/// Holds the table lock for its whole life and writes `staged` back on commit.
struct MemoryLedgerTx {
    guard: OwnedMutexGuard<Tables>,
    staged: Tables,
}

#[async_trait]
impl LedgerTx for MemoryLedgerTx {
    // The table lock is already held for the life of the transaction.
    async fn lock_owner_referrals(&mut self, owner_id: Uuid) -> Result<u64, StoreError> {
        let held = self
            .staged
            .referrals
            .values()
            .filter(|r| r.owner_id == owner_id && r.is_active())
            .count();
        Ok(held as u64)
    }

    async fn add_balance(&mut self, user_id: Uuid, delta: i64) -> Result<(), StoreError> {
        self.staged.add_balance(user_id, delta);
        Ok(())
    }

    async fn set_referral(&mut self, user_id: Uuid, referral_id: Uuid) -> Result<bool, StoreError> {
        Ok(self.staged.set_referral(user_id, referral_id))
    }

    async fn increment_usage(&mut self, referral_id: Uuid) -> Result<Option<i32>, StoreError> {
        Ok(self.staged.increment_usage(referral_id))
    }

    async fn soft_expire_by_owner(
        &mut self,
        owner_id: Uuid,
        now: OffsetDateTime,
    ) -> Result<u64, StoreError> {
        Ok(self.staged.expire_where(now, |r| r.owner_id == owner_id))
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let MemoryLedgerTx { mut guard, staged } = *self;
        *guard = staged;
        Ok(())
    }
}
