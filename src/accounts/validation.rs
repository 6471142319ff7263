use lazy_static::lazy_static;
use regex::Regex;
use uuid::Uuid;

use super::repo_types::Role;
use crate::auth::password::MIN_PASSWORD_LEN;
use crate::config::AccountConfig;
use crate::error::{ServiceError, ServiceResult};

pub const VALIDATION_FAILED: &str = "Validation failed";
pub const INVALID_ROLE: &str = "Invalid role";
pub const INVALID_FILE_TYPE: &str = "Invalid file type";
pub const FILE_TOO_LARGE: &str = "File too large";

pub fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

pub fn validate_user_id(user_id: &str) -> ServiceResult<Uuid> {
    let user_id = user_id.trim();
    if user_id.is_empty() {
        return Err(ServiceError::validation(VALIDATION_FAILED, "Valid user ID is required"));
    }
    Uuid::parse_str(user_id)
        .map_err(|_| ServiceError::validation(VALIDATION_FAILED, "Valid user ID is required"))
}

pub fn validate_email(email: &str) -> ServiceResult<()> {
    if !is_valid_email(email) {
        return Err(ServiceError::validation(VALIDATION_FAILED, "Valid email is required"));
    }
    Ok(())
}

pub fn validate_role(role: &str) -> ServiceResult<Role> {
    Role::parse(role).ok_or_else(|| {
        let allowed: Vec<&str> = Role::ALL.iter().map(|r| r.as_str()).collect();
        ServiceError::validation(
            INVALID_ROLE,
            format!("Role must be one of: {}", allowed.join(", ")),
        )
    })
}

pub fn validate_password_change(current: &str, new: &str) -> ServiceResult<()> {
    if current.is_empty() || new.is_empty() {
        return Err(ServiceError::validation(
            VALIDATION_FAILED,
            "Current password and new password are required",
        ));
    }
    if new.chars().count() < MIN_PASSWORD_LEN {
        return Err(ServiceError::validation(
            VALIDATION_FAILED,
            format!("New password must be at least {MIN_PASSWORD_LEN} characters long"),
        ));
    }
    Ok(())
}

pub fn validate_image(cfg: &AccountConfig, size: usize, mimetype: &str) -> ServiceResult<()> {
    if !cfg.allowed_mime_types.contains(mimetype) {
        return Err(ServiceError::validation(
            INVALID_FILE_TYPE,
            "Only JPG, PNG and WebP images are allowed",
        ));
    }
    if size > cfg.max_file_size_bytes {
        return Err(ServiceError::validation(
            FILE_TOO_LARGE,
            format!(
                "Image size must be less than {}MB",
                cfg.max_file_size_bytes / (1024 * 1024)
            ),
        ));
    }
    Ok(())
}
