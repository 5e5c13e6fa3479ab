//! Client-side field rules.
//!
//! Every check here runs before any network call and fails with
//! [`ApiError::Validation`].

use once_cell::sync::Lazy;
use regex::Regex;

use crate::api::error::ApiError;

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^[A-Z0-9._%+-]+@[A-Z0-9.-]+\.[A-Z]{2,}$").expect("valid email regex")
});

static PHONE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9+\s-]{10,15}$").expect("valid phone regex"));

const MIN_USERNAME_LEN: usize = 3;
const MIN_PASSWORD_LEN: usize = 6;

fn required(field: &str, value: &str, message: &str) -> Result<(), ApiError> {
    if value.trim().is_empty() {
        return Err(ApiError::validation(field, message));
    }
    Ok(())
}

fn min_len(field: &str, value: &str, min: usize, message: &str) -> Result<(), ApiError> {
    if value.chars().count() < min {
        return Err(ApiError::validation(field, message));
    }
    Ok(())
}

fn password(field: &str, value: &str, required_message: &str) -> Result<(), ApiError> {
    required(field, value, required_message)?;
    min_len(
        field,
        value,
        MIN_PASSWORD_LEN,
        "Password must be at least 6 characters",
    )
}

fn confirmation(field: &str, value: &str, expected: &str) -> Result<(), ApiError> {
    if value != expected {
        return Err(ApiError::validation(field, "Passwords do not match"));
    }
    Ok(())
}

pub fn validate_email(email: &str) -> Result<(), ApiError> {
    required("email", email, "Email is required")?;
    if !EMAIL_RE.is_match(email.trim()) {
        return Err(ApiError::validation("email", "Invalid email address"));
    }
    Ok(())
}

fn validate_phone(phone: &str) -> Result<(), ApiError> {
    if !PHONE_RE.is_match(phone.trim()) {
        return Err(ApiError::validation("phone", "Invalid phone number"));
    }
    Ok(())
}

pub fn validate_login(username: &str, pass: &str) -> Result<(), ApiError> {
    required("username", username, "Username is required")?;
    min_len(
        "username",
        username.trim(),
        MIN_USERNAME_LEN,
        "Username must be at least 3 characters",
    )?;
    password("password", pass, "Password is required")
}

/// Registration form as entered by the user
#[derive(Debug, Clone, Default)]
pub struct SignupForm {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub password: String,
    pub confirm_password: String,
}

pub fn validate_signup(form: &SignupForm) -> Result<(), ApiError> {
    required("name", &form.name, "Name is required")?;
    validate_email(&form.email)?;
    required("phone", &form.phone, "Phone number is required")?;
    validate_phone(&form.phone)?;
    password("password", &form.password, "Password is required")?;
    required(
        "confirm_password",
        &form.confirm_password,
        "Please confirm your password",
    )?;
    confirmation("confirm_password", &form.confirm_password, &form.password)
}

/// Password change form
#[derive(Debug, Clone, Default)]
pub struct PasswordChangeForm {
    pub current_password: String,
    pub new_password: String,
    pub confirm_password: String,
}

pub fn validate_password_change(form: &PasswordChangeForm) -> Result<(), ApiError> {
    required(
        "current_password",
        &form.current_password,
        "Current password is required",
    )?;
    password("new_password", &form.new_password, "New password is required")?;
    required(
        "confirm_password",
        &form.confirm_password,
        "Please confirm your new password",
    )?;
    confirmation("confirm_password", &form.confirm_password, &form.new_password)
}

/// Profile edit form
#[derive(Debug, Clone, Default)]
pub struct ProfileForm {
    pub name: String,
    pub phone: Option<String>,
    pub date_of_birth: Option<String>,
    pub address: Option<String>,
}

pub fn validate_profile(form: &ProfileForm) -> Result<(), ApiError> {
    required("name", &form.name, "Name is required")?;
    match form.phone.as_deref() {
        Some(phone) if !phone.trim().is_empty() => validate_phone(phone),
        _ => Ok(()),
    }
}

pub fn validate_account_number(account_number: &str) -> Result<(), ApiError> {
    required(
        "account_number",
        account_number,
        "Account/Meter number is required",
    )
}

/// Parse a manually entered amount; must be a finite number greater than zero
pub fn parse_manual_amount(raw: &str) -> Result<f64, ApiError> {
    required("amount", raw, "Amount is required")?;
    match raw.trim().parse::<f64>() {
        Ok(amount) if amount.is_finite() && amount > 0.0 => Ok(amount),
        _ => Err(ApiError::validation("amount", "Amount must be greater than 0")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field_of(err: ApiError) -> String {
        match err {
            ApiError::Validation { field, .. } => field,
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    fn signup_form() -> SignupForm {
        SignupForm {
            name: "Ada Lovelace".to_string(),
            email: "ada@example.com".to_string(),
            phone: "+234 801-234-5678".to_string(),
            password: "hunter22".to_string(),
            confirm_password: "hunter22".to_string(),
        }
    }

    #[test]
    fn test_login_rules() {
        assert!(validate_login("ada", "secret").is_ok());
        assert_eq!(field_of(validate_login("", "secret").unwrap_err()), "username");
        assert_eq!(field_of(validate_login("ad", "secret").unwrap_err()), "username");
        assert_eq!(field_of(validate_login("ada", "12345").unwrap_err()), "password");
    }

    #[test]
    fn test_email_pattern() {
        assert!(validate_email("USER.name+tag@Mail.Example.NG").is_ok());
        assert!(validate_email("no-at-sign.com").is_err());
        assert!(validate_email("a@b.c").is_err());
        assert!(validate_email("   ").is_err());
    }

    #[test]
    fn test_signup_rules() {
        assert!(validate_signup(&signup_form()).is_ok());

        let mut form = signup_form();
        form.phone = "12345".to_string();
        assert_eq!(field_of(validate_signup(&form).unwrap_err()), "phone");

        let mut form = signup_form();
        form.confirm_password = "hunter23".to_string();
        let err = validate_signup(&form).unwrap_err();
        assert_eq!(err.user_message(""), "Passwords do not match");
    }

    #[test]
    fn test_password_change_rules() {
        let form = PasswordChangeForm {
            current_password: "old-pass".to_string(),
            new_password: "new-pass".to_string(),
            confirm_password: "new-pass".to_string(),
        };
        assert!(validate_password_change(&form).is_ok());

        let short = PasswordChangeForm {
            new_password: "abc".to_string(),
            confirm_password: "abc".to_string(),
            ..form.clone()
        };
        assert_eq!(
            field_of(validate_password_change(&short).unwrap_err()),
            "new_password"
        );
    }

    #[test]
    fn test_profile_phone_optional() {
        let mut form = ProfileForm {
            name: "Ada".to_string(),
            ..Default::default()
        };
        assert!(validate_profile(&form).is_ok());
        form.phone = Some("abc".to_string());
        assert_eq!(field_of(validate_profile(&form).unwrap_err()), "phone");
    }

    #[test]
    fn test_manual_amount() {
        assert_eq!(parse_manual_amount(" 2500.50 ").unwrap(), 2500.5);
        assert!(parse_manual_amount("").is_err());
        assert!(parse_manual_amount("0").is_err());
        assert!(parse_manual_amount("-10").is_err());
        assert!(parse_manual_amount("ten").is_err());
        assert!(parse_manual_amount("NaN").is_err());
        assert!(parse_manual_amount("inf").is_err());
    }

    #[test]
    fn test_account_number_required() {
        assert!(validate_account_number("  ").is_err());
        assert!(validate_account_number("45012345678").is_ok());
    }
}
