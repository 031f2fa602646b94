use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use time::{Duration, OffsetDateTime};
use tracing::{debug, warn};
use uuid::Uuid;

use super::claims::{Claims, TokenKind};
use crate::{config::JwtConfig, error::AppError};

/// Issues and checks HS256 tokens for one issuer/audience pair.
#[derive(Clone)]
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    issuer: String,
    audience: String,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl JwtKeys {
    pub fn from_config(cfg: &JwtConfig) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_audience(&[cfg.audience.as_str()]);
        validation.set_issuer(&[cfg.issuer.as_str()]);
        validation.leeway = 0;

        Self {
            encoding: EncodingKey::from_secret(cfg.secret.as_bytes()),
            decoding: DecodingKey::from_secret(cfg.secret.as_bytes()),
            validation,
            issuer: cfg.issuer.clone(),
            audience: cfg.audience.clone(),
            access_ttl: Duration::minutes(cfg.ttl_minutes.max(0)),
            refresh_ttl: Duration::minutes(cfg.refresh_ttl_minutes.max(0)),
        }
    }

    fn ttl(&self, kind: TokenKind) -> Duration {
        match kind {
            TokenKind::Access => self.access_ttl,
            TokenKind::Refresh => self.refresh_ttl,
        }
    }

    fn issue(&self, subject: Uuid, kind: TokenKind) -> anyhow::Result<String> {
        let claims = Claims::new(
            subject,
            kind,
            &self.issuer,
            &self.audience,
            OffsetDateTime::now_utc(),
            self.ttl(kind),
        );
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)?;
        debug!(user_id = %subject, ?kind, "token issued");
        Ok(token)
    }

    pub fn sign_access(&self, subject: Uuid) -> anyhow::Result<String> {
        self.issue(subject, TokenKind::Access)
    }

    pub fn sign_refresh(&self, subject: Uuid) -> anyhow::Result<String> {
        self.issue(subject, TokenKind::Refresh)
    }

    /// Checks signature, expiry, issuer and audience. Does not look at `kind`.
    pub fn verify(&self, token: &str) -> Result<Claims, AppError> {
        match decode::<Claims>(token, &self.decoding, &self.validation) {
            Ok(data) => Ok(data.claims),
            Err(e) => {
                warn!(error = %e, "token rejected");
                Err(AppError::InvalidToken)
            }
        }
    }

    /// Like `verify`, but a token of any other kind is rejected too.
    pub fn verify_kind(&self, token: &str, kind: TokenKind) -> Result<Claims, AppError> {
        let claims = self.verify(token)?;
        if claims.kind != kind {
            warn!(user_id = %claims.sub, expected = ?kind, got = ?claims.kind, "wrong token kind");
            return Err(AppError::InvalidToken);
        }
        Ok(claims)
    }

    pub fn verify_access(&self, token: &str) -> Result<Claims, AppError> {
        self.verify_kind(token, TokenKind::Access)
    }

    pub fn verify_refresh(&self, token: &str) -> Result<Claims, AppError> {
        self.verify_kind(token, TokenKind::Refresh)
    }
}
