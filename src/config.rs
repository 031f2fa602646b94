use std::str::FromStr;

use anyhow::Context;
use serde::Deserialize;

/// Reward credited to a referee's balance on a successful verification.
pub const REFERRAL_REWARD: i64 = 5000;
/// Successful verifications after which the referrer's links are expired.
pub const REFERRAL_USAGE_CAP: i32 = 5;
/// Upper bound for `REFERRAL_EXPIRY_DAYS`.
pub const MAX_EXPIRY_DAYS: i64 = 3650;
/// Upper bound for `REFERRAL_SWEEP_INTERVAL_MINUTES` (one week).
pub const MAX_SWEEP_INTERVAL_MINUTES: u64 = 60 * 24 * 7;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
    pub refresh_ttl_minutes: i64,
}

impl JwtConfig {
    pub fn refresh_outlives_access(&self) -> bool {
        self.refresh_ttl_minutes > self.ttl_minutes
    }
}

/// Argon2id cost parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct HashConfig {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for HashConfig {
    fn default() -> Self {
        Self {
            memory_kib: argon2::Params::DEFAULT_M_COST,
            iterations: argon2::Params::DEFAULT_T_COST,
            parallelism: argon2::Params::DEFAULT_P_COST,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReferralConfig {
    pub protocol: String,
    pub domain: String,
    pub reward: i64,
    pub usage_cap: i32,
    pub expiry_days: i64,
    pub sweep_interval_minutes: u64,
}

impl Default for ReferralConfig {
    fn default() -> Self {
        Self {
            protocol: "http".into(),
            domain: "localhost:3000".into(),
            reward: REFERRAL_REWARD,
            usage_cap: REFERRAL_USAGE_CAP,
            expiry_days: 7,
            sweep_interval_minutes: 180,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Postgres,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub store: StoreBackend,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub jwt: JwtConfig,
    pub hashing: HashConfig,
    pub referral: ReferralConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let store = match lookup("APP_STORE").as_deref() {
            None | Some("postgres") => StoreBackend::Postgres,
            Some("memory") => StoreBackend::Memory,
            Some(other) => anyhow::bail!("APP_STORE must be `postgres` or `memory`, got `{other}`"),
        };

        let database_url = lookup("DATABASE_URL");
        if store == StoreBackend::Postgres && database_url.is_none() {
            anyhow::bail!("DATABASE_URL is required when APP_STORE=postgres");
        }

        let jwt = JwtConfig {
            secret: lookup("JWT_SECRET").context("JWT_SECRET is required")?,
            issuer: lookup("JWT_ISSUER").unwrap_or_else(|| "credireferral".into()),
            audience: lookup("JWT_AUDIENCE").unwrap_or_else(|| "credireferral-users".into()),
            ttl_minutes: parse_or(&lookup, "JWT_TTL_MINUTES", 60)?,
            refresh_ttl_minutes: parse_or(&lookup, "JWT_REFRESH_TTL_MINUTES", 60 * 24 * 14)?,
        };

        let hash_defaults = HashConfig::default();
        let hashing = HashConfig {
            memory_kib: parse_or(&lookup, "HASH_MEMORY_KIB", hash_defaults.memory_kib)?,
            iterations: parse_or(&lookup, "HASH_ITERATIONS", hash_defaults.iterations)?,
            parallelism: parse_or(&lookup, "HASH_PARALLELISM", hash_defaults.parallelism)?,
        };

        let referral_defaults = ReferralConfig::default();
        let referral = ReferralConfig {
            protocol: match lookup("APP_PROTOCOL").as_deref() {
                Some("https") => "https".into(),
                _ => "http".into(),
            },
            domain: lookup("APP_DOMAIN").unwrap_or(referral_defaults.domain),
            reward: parse_or(&lookup, "REFERRAL_REWARD", referral_defaults.reward)?,
            usage_cap: parse_or(&lookup, "REFERRAL_USAGE_CAP", referral_defaults.usage_cap)?,
            expiry_days: parse_or(&lookup, "REFERRAL_EXPIRY_DAYS", referral_defaults.expiry_days)?,
            sweep_interval_minutes: parse_or(
                &lookup,
                "REFERRAL_SWEEP_INTERVAL_MINUTES",
                referral_defaults.sweep_interval_minutes,
            )?,
        };
        anyhow::ensure!(referral.usage_cap > 0, "REFERRAL_USAGE_CAP must be positive");
        anyhow::ensure!(
            (1..=MAX_EXPIRY_DAYS).contains(&referral.expiry_days),
            "REFERRAL_EXPIRY_DAYS must be between 1 and {MAX_EXPIRY_DAYS}"
        );
        anyhow::ensure!(
            (1..=MAX_SWEEP_INTERVAL_MINUTES).contains(&referral.sweep_interval_minutes),
            "REFERRAL_SWEEP_INTERVAL_MINUTES must be between 1 and {MAX_SWEEP_INTERVAL_MINUTES}"
        );

        Ok(Self {
            host: lookup("APP_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port: parse_or(&lookup, "APP_PORT", 3000)?,
            store,
            database_url,
            database_max_connections: parse_or(&lookup, "DATABASE_MAX_CONNECTIONS", 10)?,
            jwt,
            hashing,
            referral,
        })
    }

    /// In-memory config with cheap hashing, used by tests.
    #[cfg(test)]
    pub fn for_tests() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            store: StoreBackend::Memory,
            database_url: None,
            database_max_connections: 1,
            jwt: JwtConfig {
                secret: "test-secret".into(),
                issuer: "test-issuer".into(),
                audience: "test-aud".into(),
                ttl_minutes: 5,
                refresh_ttl_minutes: 60,
            },
            hashing: HashConfig {
                memory_kib: 64,
                iterations: 1,
                parallelism: 1,
            },
            referral: ReferralConfig {
                protocol: "https".into(),
                domain: "credi.test".into(),
                ..ReferralConfig::default()
            },
        }
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> anyhow::Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("invalid value for {key}: {e}")),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_applied_when_only_required_vars_set() {
        let cfg = AppConfig::from_lookup(lookup_from(&[
            ("DATABASE_URL", "postgres://localhost/credi"),
            ("JWT_SECRET", "s3cret"),
        ]))
        .expect("config should load");

        assert_eq!(cfg.store, StoreBackend::Postgres);
        assert_eq!(cfg.port, 3000);
        assert_eq!(cfg.jwt.issuer, "credireferral");
        assert_eq!(cfg.jwt.ttl_minutes, 60);
        assert_eq!(cfg.jwt.refresh_ttl_minutes, 60 * 24 * 14);
        assert!(cfg.jwt.refresh_outlives_access());
        assert_eq!(cfg.referral.protocol, "http");
        assert_eq!(cfg.referral.reward, REFERRAL_REWARD);
        assert_eq!(cfg.referral.usage_cap, REFERRAL_USAGE_CAP);
        assert_eq!(cfg.referral.sweep_interval_minutes, 180);
        assert_eq!(cfg.hashing.memory_kib, argon2::Params::DEFAULT_M_COST);
    }

    #[test]
    fn missing_jwt_secret_fails() {
        let err = AppConfig::from_lookup(lookup_from(&[("APP_STORE", "memory")])).unwrap_err();
        assert!(err.to_string().contains("JWT_SECRET"));
    }

    #[test]
    fn postgres_requires_database_url() {
        let err = AppConfig::from_lookup(lookup_from(&[("JWT_SECRET", "x")])).unwrap_err();
        assert!(err.to_string().contains("DATABASE_URL"));
    }

    #[test]
    fn memory_store_does_not_need_database_url() {
        let cfg = AppConfig::from_lookup(lookup_from(&[
            ("APP_STORE", "memory"),
            ("JWT_SECRET", "x"),
            ("APP_PROTOCOL", "https"),
            ("APP_DOMAIN", "credi.example"),
        ]))
        .expect("config should load");
        assert_eq!(cfg.store, StoreBackend::Memory);
        assert!(cfg.database_url.is_none());
        assert_eq!(cfg.referral.protocol, "https");
        assert_eq!(cfg.referral.domain, "credi.example");
    }

    #[test]
    fn unparsable_number_names_the_variable() {
        let err = AppConfig::from_lookup(lookup_from(&[
            ("APP_STORE", "memory"),
            ("JWT_SECRET", "x"),
            ("REFERRAL_USAGE_CAP", "five"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("REFERRAL_USAGE_CAP"));
    }

    #[test]
    fn expiry_days_out_of_range_rejected() {
        for raw in ["0", "-1", "100000000"] {
            let err = AppConfig::from_lookup(lookup_from(&[
                ("APP_STORE", "memory"),
                ("JWT_SECRET", "x"),
                ("REFERRAL_EXPIRY_DAYS", raw),
            ]))
            .unwrap_err();
            assert!(err.to_string().contains("REFERRAL_EXPIRY_DAYS"), "{raw}: {err}");
        }

        let cfg = AppConfig::from_lookup(lookup_from(&[
            ("APP_STORE", "memory"),
            ("JWT_SECRET", "x"),
            ("REFERRAL_EXPIRY_DAYS", "3650"),
        ]))
        .expect("upper bound is allowed");
        assert_eq!(cfg.referral.expiry_days, MAX_EXPIRY_DAYS);
    }

    #[test]
    fn sweep_interval_out_of_range_rejected() {
        for raw in ["0", "10081", "18446744073709551615"] {
            let err = AppConfig::from_lookup(lookup_from(&[
                ("APP_STORE", "memory"),
                ("JWT_SECRET", "x"),
                ("REFERRAL_SWEEP_INTERVAL_MINUTES", raw),
            ]))
            .unwrap_err();
            assert!(
                err.to_string().contains("REFERRAL_SWEEP_INTERVAL_MINUTES"),
                "{raw}: {err}"
            );
        }
    }

    #[test]
    fn unknown_store_backend_rejected() {
        let err = AppConfig::from_lookup(lookup_from(&[
            ("APP_STORE", "redis"),
            ("JWT_SECRET", "x"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("APP_STORE"));
    }

    #[test]
    fn short_refresh_ttl_is_detectable() {
        let cfg = AppConfig::from_lookup(lookup_from(&[
            ("APP_STORE", "memory"),
            ("JWT_SECRET", "x"),
            ("JWT_TTL_MINUTES", "86400"),
            ("JWT_REFRESH_TTL_MINUTES", "10080"),
        ]))
        .expect("config should load");
        assert!(!cfg.jwt.refresh_outlives_access());
    }
}
