use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use super::repo_types::{Referral, ReferralState};
use crate::error::AppError;

fn is_valid_code(code: &str) -> bool {
    lazy_static! {
        static ref CODE_RE: Regex = Regex::new(r"^[0-9a-f]+$").unwrap();
    }
    CODE_RE.is_match(code)
}

fn check_code(code: &str, errors: &mut Vec<String>) {
    if code.is_empty() {
        errors.push("code should not be empty".to_string());
    } else if !is_valid_code(code) {
        errors.push("code must be lowercase hex".to_string());
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyReferralRequest {
    pub code: String,
    pub referrer_user_id: Uuid,
}

impl VerifyReferralRequest {
    pub fn validate(mut self) -> Result<Self, AppError> {
        self.code = self.code.trim().to_string();
        let mut errors = Vec::new();
        check_code(&self.code, &mut errors);
        if errors.is_empty() {
            Ok(self)
        } else {
            Err(AppError::Validation(errors))
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ExpireReferralRequest {
    pub code: String,
}

impl ExpireReferralRequest {
    pub fn validate(mut self) -> Result<Self, AppError> {
        self.code = self.code.trim().to_string();
        let mut errors = Vec::new();
        check_code(&self.code, &mut errors);
        if errors.is_empty() {
            Ok(self)
        } else {
            Err(AppError::Validation(errors))
        }
    }
}

/// Referral as shown to the referee after a successful verification.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferralView {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub code: String,
    pub state: ReferralState,
    pub usage_count: i32,
    #[serde(with = "time::serde::rfc3339")]
    pub expire_by: OffsetDateTime,
}

impl From<Referral> for ReferralView {
    fn from(r: Referral) -> Self {
        Self {
            id: r.id,
            owner_id: r.owner_id,
            code: r.code,
            state: r.state,
            usage_count: r.usage_count,
            expire_by: r.expire_by,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_must_be_lowercase_hex() {
        assert!(is_valid_code("abc1234"));
        assert!(!is_valid_code("ABC1234"));
        assert!(!is_valid_code("xyz"));
        assert!(!is_valid_code(""));
    }

    #[test]
    fn verify_request_reads_camel_case() {
        let id = Uuid::new_v4();
        let req: VerifyReferralRequest = serde_json::from_value(serde_json::json!({
            "code": " abc1234 ",
            "referrerUserId": id,
        }))
        .unwrap();
        let req = req.validate().expect("valid");
        assert_eq!(req.code, "abc1234");
        assert_eq!(req.referrer_user_id, id);
    }

    #[test]
    fn empty_code_is_rejected() {
        let req = ExpireReferralRequest { code: "  ".into() };
        let Err(AppError::Validation(errors)) = req.validate() else {
            panic!("expected validation error");
        };
        assert_eq!(errors, vec!["code should not be empty".to_string()]);
    }
}
