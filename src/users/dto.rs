use serde::Serialize;
use uuid::Uuid;

use super::repo_types::User;

/// User as exposed over HTTP; never carries credentials.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    pub id: Uuid,
    pub username: String,
    pub full_name: String,
    pub is_admin: bool,
    pub balance: i64,
}

impl From<User> for PublicUser {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            username: u.username,
            full_name: u.full_name,
            is_admin: u.is_admin,
            balance: u.balance,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MeResponse {
    #[serde(flatten)]
    pub user: PublicUser,
    pub active_referrals: i64,
}
