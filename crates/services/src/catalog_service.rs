use std::sync::Arc;

use skill_core::model::{Skill, SkillId, SkillMetadata, SkillStep, UserId};
use storage::repository::{BlobStore, SkillRepository, StorageError, UserRepository};
use uuid::Uuid;

use crate::Clock;
use crate::error::CatalogError;

/// One step as entered by an author, before ids and order are assigned.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
pub struct StepDraft {
    pub title: String,
    #[serde(alias = "description")]
    pub instruction: String,
}

/// Cover image bytes together with the original file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoverImage {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// Blob path for a cover upload: `skills/{uuid}-{file_name}`.
#[must_use]
pub fn cover_blob_path(file_name: &str) -> String {
    let name = file_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(file_name)
        .trim();
    format!("skills/{}-{name}", Uuid::new_v4())
}

/// Read access to skill modules plus creation and enrollment.
#[derive(Clone)]
pub struct CatalogService {
    clock: Clock,
    skills: Arc<dyn SkillRepository>,
    users: Arc<dyn UserRepository>,
    blobs: Arc<dyn BlobStore>,
}

impl CatalogService {
    #[must_use]
    pub fn new(
        clock: Clock,
        skills: Arc<dyn SkillRepository>,
        users: Arc<dyn UserRepository>,
        blobs: Arc<dyn BlobStore>,
    ) -> Self {
        Self {
            clock,
            skills,
            users,
            blobs,
        }
    }

    /// All skills, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::Storage` on fetch failure.
    pub async fn list_skills(&self) -> Result<Vec<Skill>, CatalogError> {
        Ok(self.skills.list_skills().await?)
    }

    /// # Errors
    ///
    /// Returns `CatalogError::Storage` on fetch failure.
    pub async fn get_skill(&self, id: SkillId) -> Result<Option<Skill>, CatalogError> {
        Ok(self.skills.get_skill(id).await?)
    }

    /// Upload the cover, then store the skill with numbered steps.
    ///
    /// Metadata and steps are validated before anything is uploaded.
    ///
    /// # Errors
    ///
    /// - `CatalogError::Skill` for invalid metadata or steps.
    /// - `CatalogError::Storage` if the upload or the insert fails.
    pub async fn create_skill(
        &self,
        metadata: SkillMetadata,
        steps: Vec<StepDraft>,
        cover: &CoverImage,
    ) -> Result<Skill, CatalogError> {
        metadata.validate()?;
        let steps = SkillStep::numbered(steps.into_iter().map(|s| (s.title, s.instruction)));
        SkillStep::validate_sequence(&steps)?;

        let path = cover_blob_path(&cover.file_name);
        let blob = self.blobs.upload(&path, &cover.bytes).await?;
        let cover_url = self.blobs.public_url(blob).await?;

        let skill = Skill::new(
            SkillId::generate(),
            metadata,
            cover_url,
            steps,
            self.clock.now(),
        )?;
        self.skills.insert_skill(&skill).await?;
        tracing::info!(
            skill = %skill.id(),
            title = skill.title(),
            steps = skill.step_count(),
            "skill created"
        );
        Ok(skill)
    }

    /// Add `skill_id` to the user's enrolled set. Enrolling twice is a no-op.
    ///
    /// # Errors
    ///
    /// - `CatalogError::SkillNotFound` for an unknown skill.
    /// - `CatalogError::MissingProfile` if the user has no profile.
    /// - `CatalogError::Storage` on write failure.
    pub async fn enroll(&self, user: UserId, skill_id: SkillId) -> Result<(), CatalogError> {
        if self.skills.get_skill(skill_id).await?.is_none() {
            return Err(CatalogError::SkillNotFound(skill_id));
        }
        match self.users.add_enrolled_skill(user, skill_id).await {
            Ok(()) => {
                tracing::info!(user = %user, skill = %skill_id, "enrolled");
                Ok(())
            }
            Err(StorageError::NotFound) => Err(CatalogError::MissingProfile),
            Err(err) => Err(err.into()),
        }
    }
}
