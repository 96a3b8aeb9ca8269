//! Input checks applied before anything reaches the backend.

use crate::error::{ClientError, ClientResult};
use regex::Regex;
use std::sync::OnceLock;

pub const MIN_PASSWORD_LEN: usize = 6;

fn email_regex() -> &'static Regex {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    EMAIL.get_or_init(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid email pattern"))
}

pub fn is_valid_email(email: &str) -> bool {
    email_regex().is_match(email)
}

pub fn is_valid_password(password: &str) -> bool {
    password.chars().count() >= MIN_PASSWORD_LEN
}

pub fn validate_email(email: &str) -> ClientResult<()> {
    if is_valid_email(email) {
        Ok(())
    } else {
        Err(ClientError::Validation(format!("'{email}' is not a valid email address")))
    }
}

pub fn validate_password(password: &str) -> ClientResult<()> {
    if is_valid_password(password) {
        Ok(())
    } else {
        Err(ClientError::Validation(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )))
    }
}

pub fn validate_title(title: &str) -> ClientResult<()> {
    if title.trim().is_empty() {
        Err(ClientError::Validation("title is required".to_string()))
    } else {
        Ok(())
    }
}
