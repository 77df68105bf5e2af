//! Validation helpers for DTOs.

use validator::ValidationError;

/// Rejects strings made only of whitespace.
pub fn validate_not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        let mut err = ValidationError::new("blank");
        err.message = Some("value must not be blank".into());
        return Err(err);
    }
    Ok(())
}

/// Canonical form of a caller-supplied room code: trimmed and upper-cased.
pub fn normalize_room_code(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}

/// Validates that a normalized room code only contains ASCII letters and digits.
///
/// # Examples
///
/// ```ignore
/// validate_room_code("K7PX2M") // Ok
/// validate_room_code("")       // Err - empty
/// validate_room_code("AB CD")  // Err - space
/// ```
pub fn validate_room_code(code: &str) -> Result<(), ValidationError> {
    if code.is_empty() {
        let mut err = ValidationError::new("room_code_length");
        err.message = Some("Room code must not be empty".into());
        return Err(err);
    }

    if !code.chars().all(|c| c.is_ascii_alphanumeric()) {
        let mut err = ValidationError::new("room_code_format");
        err.message = Some("Room code must contain only letters and digits".into());
        return Err(err);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_room_code() {
        assert_eq!(normalize_room_code("  k7px2m \n"), "K7PX2M");
        assert_eq!(normalize_room_code("ABCDEF"), "ABCDEF");
    }

    #[test]
    fn test_validate_room_code() {
        assert!(validate_room_code("K7PX2M").is_ok());
        assert!(validate_room_code("").is_err());
        assert!(validate_room_code("AB CD").is_err());
        assert!(validate_room_code("ABC-12").is_err());
    }

    #[test]
    fn test_validate_not_blank() {
        assert!(validate_not_blank("text").is_ok());
        assert!(validate_not_blank("  \t").is_err());
        assert!(validate_not_blank("").is_err());
    }
}
