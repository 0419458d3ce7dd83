//! Validation of caller-supplied collection names.

use thiserror::Error;

const MAX_COLLECTION_NAME_LEN: usize = 64;

/// Reasons a caller-supplied value was rejected before reaching ChromaDB.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Name was empty.
    #[error("Collection name cannot be empty")]
    EmptyName,
    /// Name exceeded the length limit.
    #[error("Collection name cannot be longer than 64 characters")]
    NameTooLong,
    /// Name contained characters outside `[A-Za-z0-9_-]`.
    #[error("Collection name can only contain letters, numbers, underscores, and hyphens")]
    InvalidCharacters,
}

/// Check a collection name against the naming rules applied by this server.
pub fn validate_collection_name(name: &str) -> Result<(), ValidationError> {
    if name.is_empty() {
        return Err(ValidationError::EmptyName);
    }
    if name.chars().count() > MAX_COLLECTION_NAME_LEN {
        return Err(ValidationError::NameTooLong);
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(ValidationError::InvalidCharacters);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_typical_names() {
        assert!(validate_collection_name("my_docs-2024").is_ok());
        assert!(validate_collection_name(&"a".repeat(64)).is_ok());
    }

    #[test]
    fn rejects_bad_names() {
        assert_eq!(validate_collection_name(""), Err(ValidationError::EmptyName));
        assert_eq!(
            validate_collection_name(&"a".repeat(65)),
            Err(ValidationError::NameTooLong)
        );
        assert_eq!(
            validate_collection_name("has space"),
            Err(ValidationError::InvalidCharacters)
        );
        assert_eq!(
            validate_collection_name("dots.not.allowed"),
            Err(ValidationError::InvalidCharacters)
        );
    }
}
