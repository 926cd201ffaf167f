use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::{SkillId, UserId};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ProfileError {
    #[error("email cannot be empty")]
    EmptyEmail,

    #[error("display name cannot be empty")]
    EmptyDisplayName,

    #[error("unknown role: {0}")]
    UnknownRole(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Admin,
}

impl Role {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ProfileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "admin" => Ok(Role::Admin),
            other => Err(ProfileError::UnknownRole(other.to_owned())),
        }
    }
}

/// Profile document stored alongside an identity.
///
/// The role is fixed at creation; the enrolled set only grows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserProfile {
    id: UserId,
    email: String,
    display_name: String,
    role: Role,
    enrolled_skills: BTreeSet<SkillId>,
}

impl UserProfile {
    /// Profile for a freshly signed-up user: role `user`, nothing enrolled.
    ///
    /// # Errors
    ///
    /// Returns `ProfileError` if the email or display name is blank.
    pub fn new_member(
        id: UserId,
        email: impl Into<String>,
        display_name: impl Into<String>,
    ) -> Result<Self, ProfileError> {
        Self::from_persisted(id, email, display_name, Role::User, BTreeSet::new())
    }

    /// Rehydrate a profile from storage.
    ///
    /// # Errors
    ///
    /// Returns `ProfileError` if the email or display name is blank.
    pub fn from_persisted(
        id: UserId,
        email: impl Into<String>,
        display_name: impl Into<String>,
        role: Role,
        enrolled_skills: BTreeSet<SkillId>,
    ) -> Result<Self, ProfileError> {
        let email = email.into().trim().to_owned();
        let display_name = display_name.into().trim().to_owned();
        if email.is_empty() {
            return Err(ProfileError::EmptyEmail);
        }
        if display_name.is_empty() {
            return Err(ProfileError::EmptyDisplayName);
        }
        Ok(Self {
            id,
            email,
            display_name,
            role,
            enrolled_skills,
        })
    }

    #[must_use]
    pub fn id(&self) -> UserId {
        self.id
    }

    #[must_use]
    pub fn email(&self) -> &str {
        &self.email
    }

    #[must_use]
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// First word of the display name, used for greetings.
    #[must_use]
    pub fn first_name(&self) -> &str {
        self.display_name
            .split_whitespace()
            .next()
            .unwrap_or(&self.display_name)
    }

    #[must_use]
    pub fn role(&self) -> Role {
        self.role
    }

    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    #[must_use]
    pub fn enrolled_skills(&self) -> &BTreeSet<SkillId> {
        &self.enrolled_skills
    }

    #[must_use]
    pub fn is_enrolled(&self, skill_id: SkillId) -> bool {
        self.enrolled_skills.contains(&skill_id)
    }

    /// Adds a skill to the enrolled set. Returns `false` if it was already there.
    pub fn enroll(&mut self, skill_id: SkillId) -> bool {
        self.enrolled_skills.insert(skill_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_member_is_plain_user_with_no_enrollments() {
        let profile = UserProfile::new_member(UserId::generate(), "a@b.io", "Asha Rao").unwrap();
        assert_eq!(profile.role(), Role::User);
        assert!(!profile.is_admin());
        assert!(profile.enrolled_skills().is_empty());
        assert_eq!(profile.first_name(), "Asha");
    }

    #[test]
    fn enroll_is_idempotent() {
        let mut profile =
            UserProfile::new_member(UserId::generate(), "a@b.io", "Asha").unwrap();
        let skill = SkillId::generate();
        assert!(profile.enroll(skill));
        assert!(!profile.enroll(skill));
        assert_eq!(profile.enrolled_skills().len(), 1);
    }

    #[test]
    fn rejects_blank_display_name() {
        let err = UserProfile::new_member(UserId::generate(), "a@b.io", "  ").unwrap_err();
        assert_eq!(err, ProfileError::EmptyDisplayName);
    }

    #[test]
    fn role_round_trips_through_str() {
        assert_eq!("admin".parse::<Role>().unwrap(), Role::Admin);
        assert_eq!(Role::User.to_string(), "user");
        assert!("root".parse::<Role>().is_err());
    }
}
