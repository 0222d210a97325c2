//! Unique ID generator.

use uuid::Uuid;

/// Generates unique identifiers for gateway entities.
pub struct IdGenerator;

impl IdGenerator {
    /// Generates a connection profile ID (UUID v4).
    pub fn profile_id() -> String {
        Uuid::new_v4().to_string()
    }

    /// Generates a request ID (UUID v4).
    pub fn request_id() -> String {
        Uuid::new_v4().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_id_is_unique() {
        assert_ne!(IdGenerator::profile_id(), IdGenerator::profile_id());
    }

    #[test]
    fn test_profile_id_is_uuid() {
        assert!(Uuid::parse_str(&IdGenerator::profile_id()).is_ok());
    }
}
