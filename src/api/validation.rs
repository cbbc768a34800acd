//! Input validation for API requests.
//!
//! Validators return `Result<(), String>`; handlers collect failures into a
//! `ValidationErrorBuilder` from the `error` module.

use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// Usernames: lowercase alphanumeric with dots, dashes and underscores
    static ref USER_NAME_REGEX: Regex = Regex::new(r"^[a-z0-9][a-z0-9._-]*$").unwrap();

    /// Pragmatic email shape check; deliverability is proven by the
    /// verification mail, not the regex
    static ref EMAIL_REGEX: Regex =
        Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();

    /// UUID v4 format used for all entity identifiers
    static ref UUID_REGEX: Regex = Regex::new(
        r"^[0-9a-f]{8}-[0-9a-f]{4}-4[0-9a-f]{3}-[89ab][0-9a-f]{3}-[0-9a-f]{12}$"
    ).unwrap();
}

pub fn validate_user_name(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("Username is required".to_string());
    }
    if name.len() < 3 {
        return Err("Username is too short (min 3 characters)".to_string());
    }
    if name.len() > 30 {
        return Err("Username is too long (max 30 characters)".to_string());
    }
    if !USER_NAME_REGEX.is_match(name) {
        return Err(
            "Username must be lowercase alphanumeric with dots, dashes or underscores".to_string(),
        );
    }
    Ok(())
}

pub fn validate_email(email: &str) -> Result<(), String> {
    if email.is_empty() {
        return Err("Email is required".to_string());
    }
    if email.len() > 254 || !EMAIL_REGEX.is_match(email) {
        return Err("Invalid email address".to_string());
    }
    Ok(())
}

pub fn validate_password(password: &str) -> Result<(), String> {
    if password.is_empty() {
        return Err("Password is required".to_string());
    }
    if password.len() < 8 {
        return Err("Password must be at least 8 characters".to_string());
    }
    if password.len() > 128 {
        return Err("Password is too long (max 128 characters)".to_string());
    }
    Ok(())
}

pub fn validate_uuid(id: &str, field: &str) -> Result<(), String> {
    if id.is_empty() {
        return Err(format!("{} is required", field));
    }
    if !UUID_REGEX.is_match(id) {
        return Err(format!("{} is not a valid identifier", field));
    }
    Ok(())
}

pub fn validate_stars(stars: i64) -> Result<(), String> {
    if !(1..=5).contains(&stars) {
        return Err("Stars must be between 1 and 5".to_string());
    }
    Ok(())
}

pub fn validate_quantity(quantity: i64) -> Result<(), String> {
    if quantity <= 0 {
        return Err("Quantity must be greater than zero".to_string());
    }
    Ok(())
}

pub fn validate_price(price: f64) -> Result<(), String> {
    if !price.is_finite() || price < 0.0 {
        return Err("Price must be a non-negative number".to_string());
    }
    Ok(())
}

pub fn validate_discount_percent(percent: f64) -> Result<(), String> {
    if !percent.is_finite() || percent < 0.0 {
        return Err("Discount percent must be a non-negative number".to_string());
    }
    if percent > 100.0 {
        return Err("Discount percent cannot exceed 100".to_string());
    }
    Ok(())
}

/// Parse an offer expiry and require it to be strictly in the future
pub fn validate_future_expiry(raw: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>, String> {
    let parsed = DateTime::parse_from_rfc3339(raw)
        .map_err(|_| "Expiry must be an RFC 3339 timestamp".to_string())?
        .with_timezone(&Utc);
    if parsed <= now {
        return Err("Expiry must be in the future".to_string());
    }
    Ok(parsed)
}

pub const ADDRESS_LABELS: &[&str] = &["primary", "secondary", "work", "home"];

pub fn validate_address_label(label: &str) -> Result<(), String> {
    if ADDRESS_LABELS.contains(&label) {
        Ok(())
    } else {
        Err("Address label must be one of: primary, secondary, work, home".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_user_name_rules() {
        assert!(validate_user_name("jane.doe-42").is_ok());
        assert!(validate_user_name("ab").is_err());
        assert!(validate_user_name("JaneDoe").is_err());
        assert!(validate_user_name("-leading").is_err());
        assert!(validate_user_name("").is_err());
    }

    #[test]
    fn test_email_shape() {
        assert!(validate_email("jane@example.com").is_ok());
        assert!(validate_email("nope").is_err());
        assert!(validate_email("a b@example.com").is_err());
        assert!(validate_email("").is_err());
    }

    #[test]
    fn test_password_length_bounds() {
        assert!(validate_password("correct horse").is_ok());
        assert!(validate_password("short").is_err());
        assert!(validate_password(&"x".repeat(200)).is_err());
    }

    #[test]
    fn test_uuid_format() {
        assert!(validate_uuid(&uuid::Uuid::new_v4().to_string(), "product_id").is_ok());
        assert!(validate_uuid("not-a-uuid", "product_id").is_err());
        assert!(validate_uuid("", "product_id").is_err());
    }

    #[test]
    fn test_stars_bounds() {
        assert!(validate_stars(1).is_ok());
        assert!(validate_stars(5).is_ok());
        assert!(validate_stars(0).is_err());
        assert!(validate_stars(6).is_err());
    }

    #[test]
    fn test_future_expiry() {
        let now = Utc::now();
        let future = (now + Duration::days(1)).to_rfc3339();
        assert!(validate_future_expiry(&future, now).is_ok());

        let past = (now - Duration::days(1)).to_rfc3339();
        assert!(validate_future_expiry(&past, now).is_err());
        assert!(validate_future_expiry("tomorrow", now).is_err());
    }

    #[test]
    fn test_discount_percent_bounds() {
        assert!(validate_discount_percent(0.0).is_ok());
        assert!(validate_discount_percent(35.5).is_ok());
        assert!(validate_discount_percent(-1.0).is_err());
        assert!(validate_discount_percent(101.0).is_err());
        assert!(validate_discount_percent(f64::NAN).is_err());
    }
}
