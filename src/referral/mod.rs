pub mod dto;
pub mod handlers;
pub mod repo;
pub mod repo_types;
pub mod services;
pub mod sweeper;

use crate::state::AppState;
use axum::Router;

pub use services::ReferralLedger;
pub use sweeper::ExpirySweeper;

pub fn router() -> Router<AppState> {
    Router::new().merge(handlers::referral_routes())
}
