//! Validation helpers for DTOs.

use validator::ValidationError;

/// Maximum accepted length for a team display name.
const TEAM_NAME_MAX: usize = 64;

/// Validates that a team name is non-blank and within length bounds.
pub fn validate_team_name(name: &str) -> Result<(), ValidationError> {
    if name.trim().is_empty() {
        let mut err = ValidationError::new("team_name_blank");
        err.message = Some("Team name must not be blank".into());
        return Err(err);
    }

    if name.chars().count() > TEAM_NAME_MAX {
        let mut err = ValidationError::new("team_name_length");
        err.message = Some(
            format!(
                "Team name must be at most {TEAM_NAME_MAX} characters (got {})",
                name.chars().count()
            )
            .into(),
        );
        return Err(err);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_team_name_valid() {
        assert!(validate_team_name("Team Rocket").is_ok());
        assert!(validate_team_name("a").is_ok());
        assert!(validate_team_name(&"x".repeat(64)).is_ok());
    }

    #[test]
    fn test_validate_team_name_blank() {
        assert!(validate_team_name("").is_err());
        assert!(validate_team_name("   ").is_err());
        assert!(validate_team_name("\t\n").is_err());
    }

    #[test]
    fn test_validate_team_name_too_long() {
        assert!(validate_team_name(&"x".repeat(65)).is_err());
    }
}
