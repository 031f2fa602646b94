use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

/// Which routes a token opens. Access tokens open everything except the
/// refresh route; refresh tokens open only the refresh route.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub iat: i64,
    pub exp: i64,
    pub iss: String,
    pub aud: String,
    pub kind: TokenKind,
}

impl Claims {
    pub fn new(
        sub: Uuid,
        kind: TokenKind,
        issuer: &str,
        audience: &str,
        issued_at: OffsetDateTime,
        ttl: Duration,
    ) -> Self {
        Self {
            sub,
            iat: issued_at.unix_timestamp(),
            exp: (issued_at + ttl).unix_timestamp(),
            iss: issuer.to_string(),
            aud: audience.to_string(),
            kind,
        }
    }
}
