//! Input validation for request bodies and path parameters

use anyhow::{anyhow, Result};

/// Maximum lengths
pub const MAX_USER_ID_LENGTH: usize = 128;
pub const MAX_SUMMARY_LENGTH: usize = 50_000; // 50KB
pub const MAX_QUERY_LENGTH: usize = 2_000;
pub const MAX_USER_NAME_LENGTH: usize = 256;

/// Validate user_id; it doubles as the graph partition key
pub fn validate_user_id(user_id: &str) -> Result<()> {
    if user_id.is_empty() {
        return Err(anyhow!("user_id cannot be empty"));
    }

    if user_id.chars().count() > MAX_USER_ID_LENGTH {
        return Err(anyhow!(
            "user_id too long: {} chars (max: {})",
            user_id.chars().count(),
            MAX_USER_ID_LENGTH
        ));
    }

    if !user_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '@' | '.'))
    {
        return Err(anyhow!(
            "user_id contains invalid characters (allowed: alphanumeric, -, _, @, .)"
        ));
    }

    Ok(())
}

/// Validate free text: non-blank and at most `max` bytes
pub fn validate_text(field: &str, value: &str, max: usize) -> Result<()> {
    if value.trim().is_empty() {
        return Err(anyhow!("{field} cannot be empty"));
    }

    if value.len() > max {
        return Err(anyhow!(
            "{field} too long: {} bytes (max: {max})",
            value.len()
        ));
    }

    Ok(())
}

/// Validate center_node_uuid (UUID format)
pub fn validate_center_node_uuid(center_node_uuid: &str) -> Result<uuid::Uuid> {
    uuid::Uuid::parse_str(center_node_uuid)
        .map_err(|e| anyhow!("Invalid center_node_uuid UUID format: {e}"))
}

pub fn validate_session_number(session_number: u32) -> Result<()> {
    if session_number == 0 {
        return Err(anyhow!("session_number must be at least 1"));
    }
    Ok(())
}
