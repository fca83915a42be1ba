//! Input validation shared by the service orchestrators.

use crate::domain::errors::ServiceError;

/// Reject empty or whitespace-only text fields.
pub fn require(field: &str, value: &str) -> Result<(), ServiceError> {
    if value.trim().is_empty() {
        return Err(ServiceError::invalid_argument(format!("{} is required", field)));
    }
    Ok(())
}

/// Reject ids that are empty or not UUIDs.
pub fn entity_id(field: &str, value: &str) -> Result<(), ServiceError> {
    require(field, value)?;
    uuid::Uuid::parse_str(value)
        .map(|_| ())
        .map_err(|_| ServiceError::invalid_argument(format!("{} {:?} is not a valid id", field, value)))
}
