use app_config::PasswordConfig;
use app_error::{AppError, AppResult};
use lazy_static::lazy_static;
use regex::Regex;

const SPECIAL_CHARACTERS: &str = "@$!%*?&#^-_+=.,:;";

lazy_static! {
    static ref EMAIL_REGEX: Regex = Regex::new(
        r"(?i)^([a-z0-9_+]([a-z0-9_+.\-]*[a-z0-9_+])?)@([a-z0-9]+([\-\.]{1}[a-z0-9]+)*\.[a-z]{2,24})$"
    )
    .expect("email regex is valid");

    // Letters, digits, underscores and hyphens, 3-30 characters
    static ref USERNAME_REGEX: Regex =
        Regex::new(r"^[a-zA-Z0-9_-]{3,30}$").expect("username regex is valid");

    static ref ROLE_NAME_REGEX: Regex =
        Regex::new(r"^[a-z][a-z0-9_-]{1,49}$").expect("role name regex is valid");
}

pub fn validate_username(username: &str) -> AppResult<()> {
    if username.trim().is_empty() {
        return Err(AppError::validation("username", "Username cannot be empty"));
    }

    if !USERNAME_REGEX.is_match(username) {
        return Err(AppError::validation(
            "username",
            "Username must be 3-30 characters long and can only contain letters, numbers, underscores, and hyphens",
        ));
    }

    Ok(())
}

pub fn validate_email(email: &str) -> AppResult<()> {
    if email.trim().is_empty() {
        return Err(AppError::validation("email", "Email cannot be empty"));
    }

    if email.len() > 254 || !EMAIL_REGEX.is_match(email) {
        return Err(AppError::validation("email", "Invalid email format"));
    }

    Ok(())
}

/// Checks a new password against the configured policy.
pub fn validate_password(password: &str, policy: &PasswordConfig) -> AppResult<()> {
    if password.trim().is_empty() {
        return Err(AppError::validation("password", "Password cannot be empty"));
    }

    if password.chars().count() < policy.min_length {
        return Err(AppError::validation(
            "password",
            &format!(
                "Password must be at least {} characters long",
                policy.min_length
            ),
        ));
    }

    let has_lowercase = password.chars().any(|c| c.is_lowercase());
    let has_uppercase = password.chars().any(|c| c.is_uppercase());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    let has_special = password.chars().any(|c| SPECIAL_CHARACTERS.contains(c));

    let mut missing = Vec::new();
    if policy.require_lowercase && !has_lowercase {
        missing.push("lowercase letter".to_string());
    }
    if policy.require_uppercase && !has_uppercase {
        missing.push("uppercase letter".to_string());
    }
    if policy.require_number && !has_digit {
        missing.push("number".to_string());
    }
    if policy.require_special && !has_special {
        missing.push(format!("special character ({})", SPECIAL_CHARACTERS));
    }

    if !missing.is_empty() {
        return Err(AppError::validation(
            "password",
            &format!(
                "Password must contain at least one {}",
                missing.join(", one ")
            ),
        ));
    }

    Ok(())
}

/// Role names are lowercase identifiers, e.g. `support-staff`.
pub fn validate_role_name(name: &str) -> AppResult<()> {
    if !ROLE_NAME_REGEX.is_match(name) {
        return Err(AppError::validation(
            "name",
            "Role name must be 2-50 characters, start with a lowercase letter and contain only lowercase letters, numbers, underscores, and hyphens",
        ));
    }
    Ok(())
}

pub fn sanitize_string(input: &str) -> String {
    input.trim().to_string()
}
