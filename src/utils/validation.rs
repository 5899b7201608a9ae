use chrono::{NaiveDate, NaiveTime};
use mongodb::bson::oid::ObjectId;
use regex::Regex;
use std::sync::LazyLock;
use validator::ValidationError;

use super::ApiError;

static PHONE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\+?[0-9][0-9 \-]{5,18}[0-9]$").expect("valid phone regex"));

pub fn validate_phone(phone: &str) -> bool {
    let digits = phone.chars().filter(char::is_ascii_digit).count();
    PHONE_RE.is_match(phone) && (7..=15).contains(&digits)
}

/// `validator` custom rule for contact numbers.
pub fn phone_rule(phone: &str) -> Result<(), ValidationError> {
    if validate_phone(phone) {
        Ok(())
    } else {
        Err(ValidationError::new("phone"))
    }
}

/// Rejects empty or whitespace-only strings.
pub fn not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        Err(ValidationError::new("blank"))
    } else {
        Ok(())
    }
}

/// Pickup dates are calendar dates in `YYYY-MM-DD`.
pub fn date_rule(date: &str) -> Result<(), ValidationError> {
    NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .map(|_| ())
        .map_err(|_| ValidationError::new("date"))
}

/// Pickup times are 24h `HH:MM`.
pub fn time_rule(time: &str) -> Result<(), ValidationError> {
    NaiveTime::parse_from_str(time, "%H:%M")
        .map(|_| ())
        .map_err(|_| ValidationError::new("time"))
}

pub fn parse_object_id(id: &str, what: &str) -> Result<ObjectId, ApiError> {
    ObjectId::parse_str(id).map_err(|_| ApiError::bad_request(format!("Invalid {} ID", what)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phone_numbers() {
        assert!(validate_phone("9876543210"));
        assert!(validate_phone("+254 712 345 678"));
        assert!(validate_phone("020-7946-0958"));
        assert!(!validate_phone("12345"));
        assert!(!validate_phone("call me maybe"));
        assert!(!validate_phone("+1234567890123456"));
    }

    #[test]
    fn pickup_date_and_time_formats() {
        assert!(date_rule("2024-02-29").is_ok());
        assert!(date_rule("2023-02-29").is_err());
        assert!(date_rule("29/02/2024").is_err());
        assert!(time_rule("07:30").is_ok());
        assert!(time_rule("24:00").is_err());
        assert!(time_rule("7.30am").is_err());
    }

    #[test]
    fn blank_strings() {
        assert!(not_blank("Eco Recyclers").is_ok());
        assert!(not_blank("").is_err());
        assert!(not_blank("   \t").is_err());
    }

    #[test]
    fn object_ids() {
        assert!(parse_object_id("65a1f0c2e4b0a1b2c3d4e5f6", "partner").is_ok());
        let err = parse_object_id("not-an-id", "partner").unwrap_err();
        assert_eq!(err.message, "Invalid partner ID");
    }
}
