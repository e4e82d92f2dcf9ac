//! Talent profile records held by the profile service.

use serde::{Deserialize, Serialize};
use validator::Validate;

use super::Principal;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct Profile {
    /// Assigned by the profile service from the caller identity; ignored on create/update.
    pub id: Principal,
    #[validate(length(min = 1, max = 64))]
    pub name: String,
    #[validate(length(min = 1, max = 64))]
    pub skill: String,
    #[validate(length(max = 2000))]
    pub description: String,
    #[validate(length(max = 32))]
    pub achievements: Vec<String>,
    #[validate(nested)]
    pub stats: UserStats,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct UserStats {
    pub years_experience: u8,
    pub projects_completed: u8,
    #[validate(range(max = 100))]
    pub client_satisfaction: u8,
}

impl Profile {
    /// Start a profile draft; the service fills in the real identity.
    pub fn draft(name: impl Into<String>, skill: impl Into<String>) -> Self {
        Self {
            id: Principal::management(),
            name: name.into(),
            skill: skill.into(),
            description: String::new(),
            achievements: Vec::new(),
            stats: UserStats::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_draft_is_valid() {
        let profile = Profile::draft("Ada", "Compilers");
        assert!(profile.validate().is_ok());
    }

    #[test]
    fn test_rejects_empty_name_and_bad_satisfaction() {
        let mut profile = Profile::draft("", "Compilers");
        profile.stats.client_satisfaction = 140;
        let errors = profile.validate().unwrap_err();
        assert!(errors.errors().contains_key("name"));
        assert!(errors.errors().contains_key("stats"));
    }
}
