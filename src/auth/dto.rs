use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::AppError;

pub const MIN_USERNAME_LEN: usize = 6;
pub const MIN_FULL_NAME_LEN: usize = 6;

pub(crate) fn is_valid_username(username: &str) -> bool {
    lazy_static! {
        static ref USERNAME_RE: Regex = Regex::new(r"^\S+$").unwrap();
    }
    username.chars().count() >= MIN_USERNAME_LEN && USERNAME_RE.is_match(username)
}

/// Request body for user registration.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
    pub full_name: String,
}

impl RegisterRequest {
    /// Trims the fields and reports every problem at once.
    pub fn validate(mut self) -> Result<Self, AppError> {
        self.username = self.username.trim().to_string();
        self.full_name = self.full_name.trim().to_string();

        let mut errors = Vec::new();
        if !is_valid_username(&self.username) {
            errors.push(format!(
                "username must be at least {MIN_USERNAME_LEN} characters without spaces"
            ));
        }
        if self.password.is_empty() {
            errors.push("password should not be empty".to_string());
        }
        if self.full_name.chars().count() < MIN_FULL_NAME_LEN {
            errors.push(format!(
                "fullName must be at least {MIN_FULL_NAME_LEN} characters"
            ));
        }
        if errors.is_empty() {
            Ok(self)
        } else {
            Err(AppError::Validation(errors))
        }
    }
}

/// Request body for login.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

impl LoginRequest {
    pub fn validate(mut self) -> Result<Self, AppError> {
        self.username = self.username.trim().to_string();

        let mut errors = Vec::new();
        if !is_valid_username(&self.username) {
            errors.push(format!(
                "username must be at least {MIN_USERNAME_LEN} characters without spaces"
            ));
        }
        if self.password.is_empty() {
            errors.push("password should not be empty".to_string());
        }
        if errors.is_empty() {
            Ok(self)
        } else {
            Err(AppError::Validation(errors))
        }
    }
}

/// Returned by login.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Returned by refresh.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessToken {
    pub access_token: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn register(username: &str, password: &str, full_name: &str) -> RegisterRequest {
        RegisterRequest {
            username: username.into(),
            password: password.into(),
            full_name: full_name.into(),
        }
    }

    #[test]
    fn register_request_is_trimmed() {
        let req = register("  kryptoblack ", "pw", " Pratik Thakare ")
            .validate()
            .expect("valid");
        assert_eq!(req.username, "kryptoblack");
        assert_eq!(req.full_name, "Pratik Thakare");
    }

    #[test]
    fn register_request_reports_all_problems() {
        let Err(AppError::Validation(errors)) = register("abc", "", "Bob").validate() else {
            panic!("expected validation error");
        };
        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn username_with_inner_space_is_rejected() {
        assert!(!is_valid_username("john doe"));
        assert!(is_valid_username("john_doe"));
        assert!(!is_valid_username("short"));
    }

    #[test]
    fn login_request_needs_password() {
        let req = LoginRequest {
            username: "johndoe".into(),
            password: String::new(),
        };
        assert!(matches!(req.validate(), Err(AppError::Validation(_))));
    }

    #[test]
    fn token_pair_serializes_camel_case() {
        let json = serde_json::to_value(TokenPair {
            access_token: "a".into(),
            refresh_token: "r".into(),
        })
        .unwrap();
        assert_eq!(json["accessToken"], "a");
        assert_eq!(json["refreshToken"], "r");
    }
}
