mod ids;
mod profile;
mod session;
mod skill;

pub use ids::{BlobId, ParseIdError, SessionId, SkillId, StepId, UserId};

pub use profile::{ProfileError, Role, UserProfile};
pub use session::{TrainingSession, TrainingSessionError};
pub use skill::{Difficulty, Skill, SkillError, SkillMetadata, SkillStep};
