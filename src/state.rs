use std::{sync::Arc, time::Duration};

use axum::extract::FromRef;
use tracing::info;

use crate::{
    auth::{jwt::JwtKeys, password::CredentialHasher, services::AuthService},
    config::{AppConfig, StoreBackend},
    referral::{ExpirySweeper, ReferralLedger},
    store::{MemoryStore, PgStore, Store, UserStore},
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub keys: JwtKeys,
    pub auth: AuthService,
    pub referrals: ReferralLedger,
    pub users: Arc<dyn UserStore>,
    pub sweeper: ExpirySweeper,
}

impl AppState {
    pub async fn init(config: AppConfig) -> anyhow::Result<Self> {
        match config.store {
            StoreBackend::Postgres => {
                let url = config
                    .database_url
                    .as_deref()
                    .ok_or_else(|| anyhow::anyhow!("DATABASE_URL is not set"))?;
                let store = PgStore::connect(url, config.database_max_connections).await?;
                Self::from_store(config, Arc::new(store))
            }
            StoreBackend::Memory => {
                info!("using in-memory store; data is lost on restart");
                Self::from_store(config, Arc::new(MemoryStore::new()))
            }
        }
    }

    /// Wires every service to one store instance.
    pub fn from_store<S>(config: AppConfig, store: Arc<S>) -> anyhow::Result<Self>
    where
        S: Store + 'static,
    {
        let keys = JwtKeys::from_config(&config.jwt);
        let hasher = CredentialHasher::new(&config.hashing)?;
        let auth = AuthService::new(store.clone(), hasher, keys.clone());
        let referrals = ReferralLedger::new(store.clone(), config.referral.clone());
        let sweeper = ExpirySweeper::new(
            store.clone(),
            Duration::from_secs(config.referral.sweep_interval_minutes * 60),
        );

        Ok(Self {
            config: Arc::new(config),
            keys,
            auth,
            referrals,
            users: store,
            sweeper,
        })
    }

    #[cfg(test)]
    pub fn in_memory(config: AppConfig) -> (Self, MemoryStore) {
        let store = MemoryStore::new();
        let state = Self::from_store(config, Arc::new(store.clone())).expect("state");
        (state, store)
    }
}

impl FromRef<AppState> for JwtKeys {
    fn from_ref(state: &AppState) -> Self {
        state.keys.clone()
    }
}
