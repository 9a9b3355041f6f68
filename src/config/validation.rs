//! Configuration validation logic.

use super::ServerConfig;
use crate::errors::call_error::{CallError, CallResult};

/// Validates a phone number in E.164 form.
///
/// Requires a leading `+` followed by 7 to 15 digits. Returns the trimmed
/// number on success.
pub fn validate_phone_number(phone: &str) -> Result<&str, String> {
    let trimmed = phone.trim();

    let Some(digits) = trimmed.strip_prefix('+') else {
        return Err(format!("'{trimmed}' must start with '+' (E.164)"));
    };

    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(format!(
            "'{trimmed}' may only contain digits after the leading '+'"
        ));
    }

    if !(7..=15).contains(&digits.len()) {
        return Err(format!(
            "'{trimmed}' must contain 7 to 15 digits (E.164)"
        ));
    }

    Ok(trimmed)
}

/// Cross-field validation applied after loading.
pub(super) fn validate(config: &ServerConfig) -> CallResult<()> {
    validate_phone_number(&config.from_number)
        .map_err(|e| CallError::MissingConfiguration(format!("FROM_NUMBER: {e}")))?;
    validate_phone_number(&config.user_number)
        .map_err(|e| CallError::MissingConfiguration(format!("USER_NUMBER: {e}")))?;

    if config.stt_silence_ms == 0 {
        return Err(CallError::MissingConfiguration(
            "STT_SILENCE_MS must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_e164_numbers() {
        assert_eq!(validate_phone_number("+15559876543").unwrap(), "+15559876543");
        assert_eq!(validate_phone_number(" +442071838750 ").unwrap(), "+442071838750");
    }

    #[test]
    fn test_missing_plus_rejected() {
        assert!(validate_phone_number("15559876543").is_err());
    }

    #[test]
    fn test_non_digits_rejected() {
        assert!(validate_phone_number("+1555abc9876").is_err());
        assert!(validate_phone_number("+").is_err());
    }

    #[test]
    fn test_length_bounds() {
        assert!(validate_phone_number("+123456").is_err()); // 6 digits
        assert!(validate_phone_number("+1234567").is_ok()); // 7 digits
        assert!(validate_phone_number("+1234567890123456").is_err()); // 16 digits
    }
}
