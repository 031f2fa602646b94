mod app;
mod auth;
mod config;
mod error;
mod referral;
mod response;
mod state;
mod store;
mod users;

use crate::{config::AppConfig, state::AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "credireferral=debug,axum=info,tower_http=info".to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let config = AppConfig::from_env()?;
    if !config.jwt.refresh_outlives_access() {
        tracing::warn!(
            access_minutes = config.jwt.ttl_minutes,
            refresh_minutes = config.jwt.refresh_ttl_minutes,
            "refresh token lifetime does not exceed access token lifetime"
        );
    }

    let app_state = AppState::init(config).await?;
    let sweeper = app_state.sweeper.clone().spawn();
    tokio::spawn(referral::sweeper::report_exit(sweeper));

    let config = app_state.config.clone();
    let app = app::build_app(app_state);
    app::serve(app, &config).await
}
