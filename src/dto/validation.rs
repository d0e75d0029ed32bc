//! Validation helpers for DTOs.

use validator::ValidationError;

use crate::services::room_code::CODE_LENGTH;

/// Validates that a join code is made of exactly four ASCII letters or digits.
///
/// Lower-case letters are accepted; codes are upper-cased before lookup.
pub fn validate_room_code(code: &str) -> Result<(), ValidationError> {
    let code = code.trim();
    if code.chars().count() != CODE_LENGTH {
        let mut err = ValidationError::new("room_code_length");
        err.message = Some(
            format!(
                "Room code must be exactly {CODE_LENGTH} characters (got {})",
                code.chars().count()
            )
            .into(),
        );
        return Err(err);
    }

    if !code.chars().all(|c| c.is_ascii_alphanumeric()) {
        let mut err = ValidationError::new("room_code_format");
        err.message = Some("Room code must contain only letters and digits".into());
        return Err(err);
    }

    Ok(())
}

/// Validates that a display name is not blank once trimmed.
pub fn validate_not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        let mut err = ValidationError::new("blank");
        err.message = Some("Value must not be blank".into());
        return Err(err);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_four_alphanumerics() {
        assert!(validate_room_code("AB12").is_ok());
        assert!(validate_room_code("zz9q").is_ok());
        assert!(validate_room_code(" K7P2 ").is_ok());
    }

    #[test]
    fn rejects_wrong_length() {
        assert!(validate_room_code("AB1").is_err());
        assert!(validate_room_code("AB123").is_err());
        assert!(validate_room_code("").is_err());
    }

    #[test]
    fn rejects_symbols_and_accents() {
        assert!(validate_room_code("AB-1").is_err());
        assert!(validate_room_code("ÁB12").is_err());
        assert!(validate_room_code("A B1").is_err());
    }

    #[test]
    fn blank_values_are_rejected() {
        assert!(validate_not_blank("Ana").is_ok());
        assert!(validate_not_blank("   ").is_err());
    }
}
