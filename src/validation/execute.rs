use crate::error::{AppError, Result};

/// Validates a user id.
///
/// # Arguments
///
/// * `user_id` - The user id to validate.
///
/// # Returns
///
/// A `Result<()>` indicating whether the user id is valid.
pub fn validate_user_id(user_id: &str) -> Result<()> {
    if user_id.is_empty() {
        return Err(AppError::Validation("User id cannot be empty".to_string()));
    }

    if user_id.len() > 64 {
        return Err(AppError::Validation(
            "User id must be at most 64 characters".to_string(),
        ));
    }

    if !user_id.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '-') {
        return Err(AppError::Validation(
            "User id can only contain letters, numbers, underscores, and hyphens".to_string(),
        ));
    }

    Ok(())
}

/// Validates an inbound message body.
pub fn validate_message(message: &str) -> Result<()> {
    if message.trim().is_empty() {
        return Err(AppError::Validation("Message cannot be empty".to_string()));
    }

    if message.len() > 4096 {
        return Err(AppError::Validation(
            "Message must be at most 4096 characters".to_string(),
        ));
    }

    Ok(())
}

/// Validates an optional timezone string.
pub fn validate_timezone(timezone: Option<&str>) -> Result<()> {
    if let Some(timezone) = timezone {
        if timezone.is_empty() || timezone.len() > 64 {
            return Err(AppError::Validation(
                "Timezone must be between 1 and 64 characters".to_string(),
            ));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_platform_user_ids() {
        assert!(validate_user_id("12345").is_ok());
        assert!(validate_user_id("user_a-1").is_ok());
    }

    #[test]
    fn rejects_malformed_user_ids() {
        assert!(validate_user_id("").is_err());
        assert!(validate_user_id("user:1").is_err());
        assert!(validate_user_id(&"x".repeat(65)).is_err());
    }

    #[test]
    fn rejects_blank_messages() {
        assert!(validate_message("   ").is_err());
        assert!(validate_message("book dinner at 7").is_ok());
    }

    #[test]
    fn timezone_is_optional() {
        assert!(validate_timezone(None).is_ok());
        assert!(validate_timezone(Some("Asia/Kolkata")).is_ok());
        assert!(validate_timezone(Some("")).is_err());
    }
}
