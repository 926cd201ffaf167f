use serde::Deserialize;
use skill_core::model::{Difficulty, Skill, SkillMetadata, SkillStep};

use crate::auth::SessionContext;
use crate::catalog_service::{CatalogService, CoverImage, StepDraft};
use crate::error::AuthoringError;

pub const DEFAULT_CATEGORY: &str = "General";

fn default_category() -> String {
    DEFAULT_CATEGORY.to_owned()
}

/// A skill module as filled in by an admin.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SkillDraft {
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub difficulty: Difficulty,
    #[serde(default = "default_category")]
    pub category: String,
    pub steps: Vec<StepDraft>,
}

impl SkillDraft {
    /// Empty form with the defaults the authoring page starts from.
    #[must_use]
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            difficulty: Difficulty::default(),
            category: default_category(),
            steps: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_step(mut self, title: impl Into<String>, instruction: impl Into<String>) -> Self {
        self.steps.push(StepDraft {
            title: title.into(),
            instruction: instruction.into(),
        });
        self
    }

    /// # Errors
    ///
    /// Returns `AuthoringError::Draft` if the JSON does not describe a draft.
    pub fn from_json(json: &str) -> Result<Self, AuthoringError> {
        serde_json::from_str(json).map_err(|e| AuthoringError::Draft(e.to_string()))
    }

    fn metadata(&self) -> SkillMetadata {
        SkillMetadata {
            title: self.title.clone(),
            description: self.description.clone(),
            difficulty: self.difficulty,
            category: self.category.clone(),
        }
    }

    /// # Errors
    ///
    /// Returns `AuthoringError::Skill` for the first missing field or step text.
    pub fn validate(&self) -> Result<(), AuthoringError> {
        self.metadata().validate()?;
        let steps = SkillStep::numbered(
            self.steps
                .iter()
                .map(|s| (s.title.as_str(), s.instruction.as_str())),
        );
        SkillStep::validate_sequence(&steps)?;
        Ok(())
    }
}

/// Admin-only creation of skill modules.
#[derive(Clone)]
pub struct AuthoringService {
    catalog: CatalogService,
}

impl AuthoringService {
    #[must_use]
    pub fn new(catalog: CatalogService) -> Self {
        Self { catalog }
    }

    /// Validate the draft and cover, then create the skill.
    ///
    /// # Errors
    ///
    /// - `AuthoringError::Forbidden` unless `ctx` belongs to an admin.
    /// - `AuthoringError::Skill` for missing fields or steps.
    /// - `AuthoringError::MissingCoverImage` / `UnsupportedCoverImage` for the cover.
    /// - `AuthoringError::Catalog` if the upload or insert fails.
    pub async fn publish(
        &self,
        ctx: &SessionContext,
        draft: SkillDraft,
        cover: Option<CoverImage>,
    ) -> Result<Skill, AuthoringError> {
        if !ctx.is_admin() {
            tracing::warn!(user = %ctx.user_id(), "non-admin tried to author a skill");
            return Err(AuthoringError::Forbidden);
        }
        draft.validate()?;
        let cover = cover
            .filter(|c| !c.bytes.is_empty())
            .ok_or(AuthoringError::MissingCoverImage)?;
        if !infer::is_image(&cover.bytes) {
            return Err(AuthoringError::UnsupportedCoverImage);
        }

        let metadata = draft.metadata();
        let skill = self
            .catalog
            .create_skill(metadata, draft.steps, &cover)
            .await?;
        Ok(skill)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Identity;
    use skill_core::model::{Role, SkillError, UserId, UserProfile};
    use skill_core::time::fixed_clock;
    use std::collections::BTreeSet;
    use std::sync::Arc;
    use storage::repository::InMemoryRepository;

    const PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];

    fn ctx(role: Role) -> SessionContext {
        let user_id = UserId::generate();
        let profile = UserProfile::from_persisted(
            user_id,
            "admin@skillar.in",
            "Admin",
            role,
            BTreeSet::new(),
        )
        .unwrap();
        SessionContext::new(
            Identity {
                user_id,
                email: "admin@skillar.in".into(),
            },
            Some(profile),
        )
    }

    fn service(repo: &InMemoryRepository) -> AuthoringService {
        AuthoringService::new(CatalogService::new(
            fixed_clock(),
            Arc::new(repo.clone()),
            Arc::new(repo.clone()),
            Arc::new(repo.clone()),
        ))
    }

    fn draft() -> SkillDraft {
        SkillDraft::new("Basic Electrical Wiring", "Wire a switch board")
            .with_step("Identify the neutral wire", "Locate the blue wire")
            .with_step("Strip insulation", "Remove 1cm")
    }

    fn cover(bytes: &[u8]) -> Option<CoverImage> {
        Some(CoverImage {
            file_name: "wiring.png".into(),
            bytes: bytes.to_vec(),
        })
    }

    #[tokio::test]
    async fn admin_publishes_with_defaults() {
        let repo = InMemoryRepository::new();
        let skill = service(&repo)
            .publish(&ctx(Role::Admin), draft(), cover(PNG))
            .await
            .unwrap();
        assert_eq!(skill.category(), "General");
        assert_eq!(skill.difficulty(), Difficulty::Beginner);
        assert_eq!(skill.step_count(), 2);
    }

    #[tokio::test]
    async fn members_are_forbidden() {
        let repo = InMemoryRepository::new();
        let err = service(&repo)
            .publish(&ctx(Role::User), draft(), cover(PNG))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthoringError::Forbidden));
    }

    #[tokio::test]
    async fn cover_is_required_and_must_be_an_image() {
        let repo = InMemoryRepository::new();
        let authoring = service(&repo);
        let admin = ctx(Role::Admin);

        let err = authoring.publish(&admin, draft(), None).await.unwrap_err();
        assert!(matches!(err, AuthoringError::MissingCoverImage));
        let err = authoring
            .publish(&admin, draft(), cover(&[]))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthoringError::MissingCoverImage));
        let err = authoring
            .publish(&admin, draft(), cover(b"plain text, not an image"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthoringError::UnsupportedCoverImage));
    }

    #[tokio::test]
    async fn draft_needs_at_least_one_complete_step() {
        let repo = InMemoryRepository::new();
        let authoring = service(&repo);
        let admin = ctx(Role::Admin);

        let empty = SkillDraft::new("Welding", "Join steel");
        let err = authoring
            .publish(&admin, empty, cover(PNG))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthoringError::Skill(SkillError::NoSteps)));

        let blank = SkillDraft::new("Welding", "Join steel").with_step("", "Tack");
        let err = authoring
            .publish(&admin, blank, cover(PNG))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AuthoringError::Skill(SkillError::EmptyStepTitle { position: 1 })
        ));
    }

    #[test]
    fn draft_parses_from_json_with_defaults() {
        let draft = SkillDraft::from_json(
            r#"{
                "title": "Plumbing",
                "description": "Fix a leak",
                "difficulty": "Intermediate",
                "steps": [{"title": "Shut off", "description": "Close the main valve"}]
            }"#,
        )
        .unwrap();
        assert_eq!(draft.category, "General");
        assert_eq!(draft.difficulty, Difficulty::Intermediate);
        assert_eq!(draft.steps[0].instruction, "Close the main valve");
        assert!(matches!(
            SkillDraft::from_json("{}"),
            Err(AuthoringError::Draft(_))
        ));
    }
}
