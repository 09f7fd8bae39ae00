//! Input validation for API requests.
//!
//! Validators return `Err(message)` so handlers can collect several of them
//! with `ValidationErrorBuilder`.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// Zero-padded 24h time of day. Padding keeps string order equal to time order.
    static ref TIME_OF_DAY_REGEX: Regex = Regex::new(r"^([01][0-9]|2[0-3]):[0-5][0-9]$").unwrap();

    /// Loose email shape check; deliverability is not our concern
    static ref EMAIL_REGEX: Regex = Regex::new(
        r"^[^@\s]+@[^@\s]+\.[^@\s]+$"
    ).unwrap();
}

/// Minimum number of options per assessment question
pub const MIN_QUESTION_OPTIONS: usize = 2;

/// Highest score a single option may carry
pub const MAX_QUESTION_SCORE: i64 = 1000;

pub fn validate_email(email: &str) -> Result<(), String> {
    if email.is_empty() {
        return Err("Email is required".to_string());
    }
    if email.len() > 254 {
        return Err("Email is too long (max 254 characters)".to_string());
    }
    if !EMAIL_REGEX.is_match(email) {
        return Err("Invalid email address".to_string());
    }
    Ok(())
}

pub fn validate_name(name: &str) -> Result<(), String> {
    let name = name.trim();
    if name.is_empty() {
        return Err("Name is required".to_string());
    }
    if name.len() > 100 {
        return Err("Name is too long (max 100 characters)".to_string());
    }
    Ok(())
}

/// Validate password strength
pub fn validate_password(password: &str) -> Result<(), String> {
    if password.len() < 8 {
        return Err("Password must be at least 8 characters".to_string());
    }
    if password.len() > 128 {
        return Err("Password is too long (max 128 characters)".to_string());
    }

    let has_letter = password.chars().any(|c| c.is_alphabetic());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    if !has_letter || !has_digit {
        return Err("Password must contain at least one letter and one digit".to_string());
    }

    Ok(())
}

/// Validate a `HH:MM` time of day
pub fn validate_time_of_day(time: &str) -> Result<(), String> {
    if time.is_empty() {
        return Err("Time is required".to_string());
    }
    if !TIME_OF_DAY_REGEX.is_match(time) {
        return Err("Time must be zero-padded 24-hour HH:MM".to_string());
    }
    Ok(())
}

/// Validate both ends of a time range and that it is not empty
pub fn validate_time_range(start: &str, end: &str) -> Result<(), String> {
    validate_time_of_day(start)?;
    validate_time_of_day(end)?;
    if start >= end {
        return Err("Start time must be before end time".to_string());
    }
    Ok(())
}

/// Validate a required text field with a maximum length
pub fn validate_text(value: &str, field_name: &str, max_len: usize) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{} is required", field_name));
    }
    if value.len() > max_len {
        return Err(format!(
            "{} is too long (max {} characters)",
            field_name, max_len
        ));
    }
    Ok(())
}

/// Validate an optional text field with a maximum length
pub fn validate_optional_text(
    value: &Option<String>,
    field_name: &str,
    max_len: usize,
) -> Result<(), String> {
    match value {
        Some(v) if v.len() > max_len => Err(format!(
            "{} is too long (max {} characters)",
            field_name, max_len
        )),
        _ => Ok(()),
    }
}

/// Validate one question's options and their parallel score rubric
pub fn validate_question_rubric(options: &[String], scores: &[i64]) -> Result<(), String> {
    if options.len() < MIN_QUESTION_OPTIONS {
        return Err(format!(
            "A question needs at least {} options",
            MIN_QUESTION_OPTIONS
        ));
    }
    if options.len() != scores.len() {
        return Err(format!(
            "Options and scores must have the same length ({} options, {} scores)",
            options.len(),
            scores.len()
        ));
    }
    if options.iter().any(|o| o.trim().is_empty()) {
        return Err("Options cannot be empty".to_string());
    }
    for (i, option) in options.iter().enumerate() {
        if options[..i].contains(option) {
            return Err(format!("Duplicate option '{}'", option));
        }
    }
    if scores.iter().any(|s| *s < 0) {
        return Err("Scores cannot be negative".to_string());
    }
    if scores.iter().any(|s| *s > MAX_QUESTION_SCORE) {
        return Err(format!("Scores cannot exceed {}", MAX_QUESTION_SCORE));
    }
    Ok(())
}

/// Validate a UUID string
pub fn validate_uuid(id: &str, field_name: &str) -> Result<(), String> {
    if id.is_empty() {
        return Err(format!("{} is required", field_name));
    }

    if uuid::Uuid::parse_str(id).is_err() {
        return Err(format!("Invalid {} format", field_name));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_validate_time_of_day() {
        assert!(validate_time_of_day("00:00").is_ok());
        assert!(validate_time_of_day("09:30").is_ok());
        assert!(validate_time_of_day("23:59").is_ok());

        assert!(validate_time_of_day("").is_err());
        assert!(validate_time_of_day("9:30").is_err()); // not padded
        assert!(validate_time_of_day("24:00").is_err());
        assert!(validate_time_of_day("12:60").is_err());
        assert!(validate_time_of_day("12:00:00").is_err());
    }

    #[test]
    fn test_validate_time_range() {
        assert!(validate_time_range("09:00", "10:00").is_ok());
        assert!(validate_time_range("10:00", "10:00").is_err());
        assert!(validate_time_range("11:00", "10:00").is_err());
        assert!(validate_time_range("9:00", "10:00").is_err());
    }

    #[test]
    fn test_validate_email() {
        assert!(validate_email("jo@example.org").is_ok());
        assert!(validate_email("").is_err());
        assert!(validate_email("jo@").is_err());
        assert!(validate_email("jo example@org.com").is_err());
    }

    #[test]
    fn test_validate_password() {
        assert!(validate_password("calm-waters-42").is_ok());
        assert!(validate_password("short1").is_err());
        assert!(validate_password("onlyletters").is_err());
        assert!(validate_password("1234567890").is_err());
    }

    #[test]
    fn test_validate_question_rubric() {
        assert!(validate_question_rubric(&strings(&["No", "Yes"]), &[0, 1]).is_ok());

        assert!(validate_question_rubric(&strings(&["Only"]), &[1]).is_err());
        assert!(validate_question_rubric(&strings(&["No", "Yes"]), &[0]).is_err());
        assert!(validate_question_rubric(&strings(&["No", "No"]), &[0, 1]).is_err());
        assert!(validate_question_rubric(&strings(&["No", " "]), &[0, 1]).is_err());
        assert!(validate_question_rubric(&strings(&["No", "Yes"]), &[0, -1]).is_err());

        assert!(validate_question_rubric(&strings(&["No", "Yes"]), &[0, MAX_QUESTION_SCORE]).is_ok());
        assert!(
            validate_question_rubric(&strings(&["No", "Yes"]), &[0, MAX_QUESTION_SCORE + 1])
                .is_err()
        );
        assert!(
            validate_question_rubric(&strings(&["No", "Yes"]), &[0, 100_000_000_000_000_000])
                .is_err()
        );
    }

    #[test]
    fn test_validate_text_fields() {
        assert!(validate_text("Mood check-in", "Title", 200).is_ok());
        assert!(validate_text("   ", "Title", 200).is_err());
        assert!(validate_text(&"x".repeat(201), "Title", 200).is_err());
        assert!(validate_optional_text(&None, "Bio", 10).is_ok());
        assert!(validate_optional_text(&Some("x".repeat(11)), "Bio", 10).is_err());
    }

    #[test]
    fn test_validate_uuid() {
        assert!(validate_uuid("67e55044-10b1-426f-9247-bb680e5fe0c8", "id").is_ok());
        assert!(validate_uuid("", "id").is_err());
        assert!(validate_uuid("not-a-uuid", "id").is_err());
    }
}
