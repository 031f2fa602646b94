use std::{sync::Arc, time::Duration};

use time::OffsetDateTime;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::store::{ReferralStore, StoreError};

/// Periodically expires every referral whose deadline has passed, in one
/// bulk update per run.
#[derive(Clone)]
pub struct ExpirySweeper {
    referrals: Arc<dyn ReferralStore>,
    interval: Duration,
}

impl ExpirySweeper {
    pub fn new(referrals: Arc<dyn ReferralStore>, interval: Duration) -> Self {
        Self { referrals, interval }
    }

    pub async fn run_once(&self, now: OffsetDateTime) -> Result<u64, StoreError> {
        self.referrals.soft_expire_where_expired_before(now).await
    }

    /// Starts the sweep loop. The first run happens immediately.
    pub fn spawn(self) -> JoinHandle<()> {
        let period = self.interval;
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);

            loop {
                interval.tick().await;

                match self.run_once(OffsetDateTime::now_utc()).await {
                    Ok(expired) => info!(expired, "referral sweep finished"),
                    Err(e) => error!(error = %e, "referral sweep failed"),
                }
            }
        });

        info!(interval_secs = period.as_secs(), "referral sweeper started");
        handle
    }
}

/// Waits for the sweep loop to end and logs why. Returns `true` if it panicked.
pub async fn report_exit(handle: JoinHandle<()>) -> bool {
    match handle.await {
        Ok(()) => {
            warn!("referral sweeper stopped");
            false
        }
        Err(e) if e.is_panic() => {
            error!(error = %e, "referral sweeper panicked; expired referrals are no longer swept");
            true
        }
        Err(e) => {
            warn!(error = %e, "referral sweeper cancelled");
            false
        }
    }
}
