use std::sync::Arc;

use rand::RngCore;
use time::{Duration, OffsetDateTime};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use super::repo_types::{Referral, ReferralState};
use crate::{
    config::ReferralConfig,
    error::AppError,
    store::{LedgerTx, ReferralStore, Store, UserStore},
};

/// Length of generated referral codes, in hex characters.
pub const CODE_LEN: usize = 7;

/// Random lowercase hex code of `len` characters.
pub fn generate_code(len: usize) -> String {
    let mut bytes = vec![0u8; len.div_ceil(2)];
    rand::thread_rng().fill_bytes(&mut bytes);
    let mut code = hex::encode(bytes);
    code.truncate(len);
    code
}

/// Owns the referral lifecycle: creation, lookup, expiry and redemption.
#[derive(Clone)]
pub struct ReferralLedger {
    store: Arc<dyn Store>,
    config: ReferralConfig,
}

impl ReferralLedger {
    pub fn new(store: Arc<dyn Store>, config: ReferralConfig) -> Self {
        Self { store, config }
    }

    pub fn generate_link(&self, user_id: Uuid, code: &str) -> String {
        format!(
            "{}://{}/referral/{}/{}",
            self.config.protocol, self.config.domain, user_id, code
        )
    }

    #[instrument(skip(self))]
    pub async fn create(&self, owner_id: Uuid, code: &str) -> Result<Referral, AppError> {
        let expire_by = OffsetDateTime::now_utc()
            .checked_add(Duration::days(self.config.expiry_days))
            .ok_or_else(|| {
                anyhow::anyhow!("expiry window of {} days is out of range", self.config.expiry_days)
            })?;
        let referral = ReferralStore::create(&*self.store, owner_id, code, expire_by).await?;
        info!(referral_id = %referral.id, owner_id = %owner_id, "referral created");
        Ok(referral)
    }

    pub async fn get_active(&self, owner_id: Uuid, code: &str) -> Result<Referral, AppError> {
        self.store
            .find_active_by_owner_and_code(owner_id, code)
            .await?
            .ok_or(AppError::ReferralNotFound)
    }

    /// Expires every active referral of `owner_id`. Returns how many changed.
    #[instrument(skip(self))]
    pub async fn expire_by_owner(&self, owner_id: Uuid) -> Result<u64, AppError> {
        let expired = self
            .store
            .soft_expire_by_owner(owner_id, OffsetDateTime::now_utc())
            .await?;
        info!(owner_id = %owner_id, expired, "referrals expired by owner");
        Ok(expired)
    }

    pub async fn count(&self, owner_id: Uuid) -> Result<i64, AppError> {
        Ok(self.store.count_active_by_owner(owner_id).await?)
    }

    /// Redeems `code` of `referrer_id` for `referee_id`.
    ///
    /// The link, the usage increment, the reward credit and the cap-triggered
    /// expiry commit together or not at all.
    #[instrument(skip(self, code))]
    pub async fn verify(
        &self,
        referrer_id: Uuid,
        referee_id: Uuid,
        code: &str,
    ) -> Result<Referral, AppError> {
        if referrer_id == referee_id {
            warn!(user_id = %referee_id, "self referral rejected");
            return Err(AppError::SelfReferral);
        }

        // Same answer as the profile routes give a token whose user is gone.
        let referee = self.store.find_by_id(referee_id).await?.ok_or_else(|| {
            error!(user_id = %referee_id, "referee not found");
            AppError::InvalidToken
        })?;
        if referee.referral_id.is_some() {
            warn!(user_id = %referee_id, "user already referred");
            return Err(AppError::AlreadyReferred);
        }

        let mut referral = self.get_active(referrer_id, code).await.inspect_err(|_| {
            warn!(referrer_id = %referrer_id, "no active referral for code");
        })?;

        let mut tx = self.store.begin().await?;
        // Owner rows first, then the referee row: one lock order for every caller.
        tx.lock_owner_referrals(referrer_id).await?;

        // Dropping `tx` on any early return below rolls everything back.
        if !tx.set_referral(referee_id, referral.id).await? {
            warn!(user_id = %referee_id, "user already referred");
            return Err(AppError::AlreadyReferred);
        }
        let Some(usage) = tx.increment_usage(referral.id).await? else {
            warn!(referral_id = %referral.id, "referral expired before redemption");
            return Err(AppError::ReferralNotFound);
        };
        tx.add_balance(referee_id, self.config.reward).await?;

        referral.usage_count = usage;
        if usage >= self.config.usage_cap {
            let now = OffsetDateTime::now_utc();
            tx.soft_expire_by_owner(referrer_id, now).await?;
            referral.state = ReferralState::Expired;
            referral.expired_at = Some(now);
        }
        tx.commit().await?;

        info!(
            referral_id = %referral.id,
            referee_id = %referee_id,
            usage,
            "referral verified"
        );
        if !referral.is_active() {
            info!(referrer_id = %referrer_id, "usage cap reached, referrals expired");
        }
        Ok(referral)
    }
}
