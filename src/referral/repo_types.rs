use serde::Serialize;
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// Lifecycle of a referral. `Expired` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, sqlx::Type)]
#[sqlx(type_name = "referral_state", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ReferralState {
    Active,
    Expired,
}

/// Referral record in the database.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Referral {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub code: String,
    pub state: ReferralState,
    pub usage_count: i32,
    pub created_at: OffsetDateTime,
    pub expire_by: OffsetDateTime,
    pub expired_at: Option<OffsetDateTime>, // audit only; `state` decides
}

impl Referral {
    pub fn is_active(&self) -> bool {
        self.state == ReferralState::Active
    }
}
