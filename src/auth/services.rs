use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use super::{
    dto::{AccessToken, TokenPair},
    jwt::JwtKeys,
    password::CredentialHasher,
};
use crate::{
    error::AppError,
    store::{StoreError, UserStore},
    users::repo_types::{NewUser, User},
};

/// Register / login / refresh on top of the user store.
#[derive(Clone)]
pub struct AuthService {
    users: Arc<dyn UserStore>,
    hasher: CredentialHasher,
    keys: JwtKeys,
}

impl AuthService {
    pub fn new(users: Arc<dyn UserStore>, hasher: CredentialHasher, keys: JwtKeys) -> Self {
        Self { users, hasher, keys }
    }

    #[instrument(skip(self, password, full_name))]
    pub async fn register(
        &self,
        username: &str,
        password: &str,
        full_name: &str,
    ) -> Result<User, AppError> {
        let salt = CredentialHasher::generate_salt();
        let password_hash = self.hash_blocking(password, &salt).await?;

        let new_user = NewUser {
            username: username.to_string(),
            password_hash,
            password_salt: salt,
            full_name: full_name.to_string(),
        };
        let user = self
            .users
            .create(new_user)
            .await
            .map_err(|e| match e {
                // Lost a race against a concurrent registration of the same name.
                StoreError::UniqueViolation(_) => {
                    warn!(username, "username already registered");
                    AppError::UsernameTaken
                }
                other => {
                    error!(error = %other, "create user failed");
                    AppError::from(other)
                }
            })?;

        info!(user_id = %user.id, username = %user.username, "user registered");
        Ok(user)
    }

    /// Unknown user, wrong password and internal failures all collapse into
    /// `InvalidCredentials`.
    #[instrument(skip(self, password))]
    pub async fn login(&self, username: &str, password: &str) -> Result<TokenPair, AppError> {
        let user = match self.users.find_by_username(username).await {
            Ok(Some(u)) => Some(u),
            Ok(None) => {
                warn!(username, "login unknown username");
                None
            }
            Err(e) => {
                error!(error = %e, "find_by_username failed");
                None
            }
        };

        let Some(user) = user else {
            // Burn one derivation so both failure paths cost the same.
            let salt = CredentialHasher::generate_salt();
            let _ = self.verify_blocking(password, &salt, "").await;
            return Err(AppError::InvalidCredentials);
        };

        match self
            .verify_blocking(password, &user.password_salt, &user.password_hash)
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                warn!(user_id = %user.id, "login invalid password");
                return Err(AppError::InvalidCredentials);
            }
            Err(e) => {
                error!(error = ?e, user_id = %user.id, "password verification failed");
                return Err(AppError::InvalidCredentials);
            }
        }

        let access_token = self.keys.sign_access(user.id)?;
        let refresh_token = self.keys.sign_refresh(user.id)?;
        info!(user_id = %user.id, "user logged in");
        Ok(TokenPair {
            access_token,
            refresh_token,
        })
    }

    /// Mints a fresh access token. The caller has already checked that the
    /// presented token was a valid refresh token for `user_id`.
    #[instrument(skip(self))]
    pub fn refresh(&self, user_id: Uuid) -> Result<AccessToken, AppError> {
        let access_token = self.keys.sign_access(user_id)?;
        info!(user_id = %user_id, "access token refreshed");
        Ok(AccessToken { access_token })
    }

    async fn hash_blocking(&self, password: &str, salt: &str) -> anyhow::Result<String> {
        let hasher = self.hasher.clone();
        let (password, salt) = (password.to_string(), salt.to_string());
        tokio::task::spawn_blocking(move || hasher.hash(&password, &salt))
            .await
            .context("hash task panicked")?
    }

    async fn verify_blocking(
        &self,
        password: &str,
        salt: &str,
        expected: &str,
    ) -> anyhow::Result<bool> {
        let hasher = self.hasher.clone();
        let (password, salt, expected) =
            (password.to_string(), salt.to_string(), expected.to_string());
        tokio::task::spawn_blocking(move || hasher.verify(&password, &salt, &expected))
            .await
            .context("verify task panicked")?
    }
}
