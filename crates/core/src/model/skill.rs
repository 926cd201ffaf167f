use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use url::Url;

use crate::model::ids::{SkillId, StepId};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SkillError {
    #[error("skill title cannot be empty")]
    EmptyTitle,

    #[error("skill description cannot be empty")]
    EmptyDescription,

    #[error("skill category cannot be empty")]
    EmptyCategory,

    #[error("a skill needs at least one step")]
    NoSteps,

    #[error("step {position} title cannot be empty")]
    EmptyStepTitle { position: usize },

    #[error("step {position} instruction cannot be empty")]
    EmptyStepInstruction { position: usize },

    #[error("step at position {position} has order {order}")]
    StepOrderMismatch { position: usize, order: u32 },

    #[error("duplicate step id {0}")]
    DuplicateStepId(StepId),

    #[error("unknown difficulty: {0}")]
    UnknownDifficulty(String),
}

//
// ─── DIFFICULTY ────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Difficulty {
    #[default]
    Beginner,
    Intermediate,
    Advanced,
}

impl Difficulty {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Difficulty::Beginner => "Beginner",
            Difficulty::Intermediate => "Intermediate",
            Difficulty::Advanced => "Advanced",
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Difficulty {
    type Err = SkillError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "beginner" => Ok(Difficulty::Beginner),
            "intermediate" => Ok(Difficulty::Intermediate),
            "advanced" => Ok(Difficulty::Advanced),
            _ => Err(SkillError::UnknownDifficulty(s.to_owned())),
        }
    }
}

//
// ─── STEP ──────────────────────────────────────────────────────────────────────
//

/// One instructional step of a skill module.
///
/// `order` is 1-based and always equals the step's position in its skill.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkillStep {
    id: StepId,
    title: String,
    instruction: String,
    order: u32,
}

impl SkillStep {
    #[must_use]
    pub fn from_persisted(id: StepId, title: String, instruction: String, order: u32) -> Self {
        Self {
            id,
            title,
            instruction,
            order,
        }
    }

    /// Assigns fresh ids and dense 1-based order to `(title, instruction)` pairs.
    #[must_use]
    pub fn numbered<I, T, D>(drafts: I) -> Vec<Self>
    where
        I: IntoIterator<Item = (T, D)>,
        T: Into<String>,
        D: Into<String>,
    {
        drafts
            .into_iter()
            .zip(1_u32..)
            .map(|((title, instruction), order)| Self {
                id: StepId::generate(),
                title: title.into().trim().to_owned(),
                instruction: instruction.into().trim().to_owned(),
                order,
            })
            .collect()
    }

    #[must_use]
    pub fn id(&self) -> StepId {
        self.id
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn instruction(&self) -> &str {
        &self.instruction
    }

    #[must_use]
    pub fn order(&self) -> u32 {
        self.order
    }

    /// Checks a step list: non-empty, no blank text, order equal to
    /// position (1..N), ids unique.
    ///
    /// # Errors
    ///
    /// Returns the first `SkillError` found.
    pub fn validate_sequence(steps: &[SkillStep]) -> Result<(), SkillError> {
        if steps.is_empty() {
            return Err(SkillError::NoSteps);
        }

        let mut seen = std::collections::HashSet::with_capacity(steps.len());
        for (idx, step) in steps.iter().enumerate() {
            let position = idx + 1;
            if step.title.trim().is_empty() {
                return Err(SkillError::EmptyStepTitle { position });
            }
            if step.instruction.trim().is_empty() {
                return Err(SkillError::EmptyStepInstruction { position });
            }
            if usize::try_from(step.order).ok() != Some(position) {
                return Err(SkillError::StepOrderMismatch {
                    position,
                    order: step.order,
                });
            }
            if !seen.insert(step.id) {
                return Err(SkillError::DuplicateStepId(step.id));
            }
        }
        Ok(())
    }
}

//
// ─── SKILL ─────────────────────────────────────────────────────────────────────
//

/// Metadata for a skill module, separated from its steps and cover image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkillMetadata {
    pub title: String,
    pub description: String,
    pub difficulty: Difficulty,
    pub category: String,
}

impl SkillMetadata {
    /// # Errors
    ///
    /// Returns `SkillError` for the first blank text field.
    pub fn validate(&self) -> Result<(), SkillError> {
        if self.title.trim().is_empty() {
            return Err(SkillError::EmptyTitle);
        }
        if self.description.trim().is_empty() {
            return Err(SkillError::EmptyDescription);
        }
        if self.category.trim().is_empty() {
            return Err(SkillError::EmptyCategory);
        }
        Ok(())
    }
}

/// A named, ordered sequence of steps a user trains through.
///
/// Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Skill {
    id: SkillId,
    title: String,
    description: String,
    difficulty: Difficulty,
    category: String,
    cover_url: Url,
    steps: Vec<SkillStep>,
    created_at: DateTime<Utc>,
}

impl Skill {
    /// Creates a skill, validating metadata and step numbering.
    ///
    /// # Errors
    ///
    /// Returns `SkillError` if any text field is blank, the step list is empty,
    /// step ids repeat, or step order does not match position (1..N).
    pub fn new(
        id: SkillId,
        metadata: SkillMetadata,
        cover_url: Url,
        steps: Vec<SkillStep>,
        created_at: DateTime<Utc>,
    ) -> Result<Self, SkillError> {
        metadata.validate()?;
        SkillStep::validate_sequence(&steps)?;

        Ok(Self {
            id,
            title: metadata.title.trim().to_owned(),
            description: metadata.description.trim().to_owned(),
            difficulty: metadata.difficulty,
            category: metadata.category.trim().to_owned(),
            cover_url,
            steps,
            created_at,
        })
    }

    #[must_use]
    pub fn id(&self) -> SkillId {
        self.id
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    #[must_use]
    pub fn difficulty(&self) -> Difficulty {
        self.difficulty
    }

    #[must_use]
    pub fn category(&self) -> &str {
        &self.category
    }

    #[must_use]
    pub fn cover_url(&self) -> &Url {
        &self.cover_url
    }

    #[must_use]
    pub fn steps(&self) -> &[SkillStep] {
        &self.steps
    }

    #[must_use]
    pub fn step(&self, index: usize) -> Option<&SkillStep> {
        self.steps.get(index)
    }

    #[must_use]
    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;

    fn metadata() -> SkillMetadata {
        SkillMetadata {
            title: "Basic Electrical Wiring".into(),
            description: "Wire a junction box safely".into(),
            difficulty: Difficulty::Beginner,
            category: "Electrical".into(),
        }
    }

    fn cover() -> Url {
        Url::parse("https://blobs.example/skills/cover.png").unwrap()
    }

    #[test]
    fn numbered_steps_are_dense_and_match_position() {
        let steps = SkillStep::numbered([
            ("Identify the neutral wire", "Locate the blue wire"),
            ("Strip the insulation", "Remove 1cm of insulation"),
            ("Connect", "Twist and cap"),
        ]);
        for (idx, step) in steps.iter().enumerate() {
            assert_eq!(step.order() as usize, idx + 1);
        }
        let skill =
            Skill::new(SkillId::generate(), metadata(), cover(), steps, fixed_now()).unwrap();
        assert_eq!(skill.step_count(), 3);
    }

    #[test]
    fn rejects_empty_steps() {
        let err = Skill::new(SkillId::generate(), metadata(), cover(), Vec::new(), fixed_now())
            .unwrap_err();
        assert_eq!(err, SkillError::NoSteps);
    }

    #[test]
    fn rejects_sparse_order() {
        let steps = vec![
            SkillStep::from_persisted(StepId::generate(), "A".into(), "a".into(), 1),
            SkillStep::from_persisted(StepId::generate(), "B".into(), "b".into(), 3),
        ];
        let err = Skill::new(SkillId::generate(), metadata(), cover(), steps, fixed_now())
            .unwrap_err();
        assert_eq!(
            err,
            SkillError::StepOrderMismatch {
                position: 2,
                order: 3
            }
        );
    }

    #[test]
    fn rejects_blank_title() {
        let mut meta = metadata();
        meta.title = "   ".into();
        let steps = SkillStep::numbered([("A", "a")]);
        let err = Skill::new(SkillId::generate(), meta, cover(), steps, fixed_now()).unwrap_err();
        assert_eq!(err, SkillError::EmptyTitle);
    }

    #[test]
    fn rejects_blank_step_instruction() {
        let steps = SkillStep::numbered([("A", "a"), ("B", " ")]);
        let err = Skill::new(SkillId::generate(), metadata(), cover(), steps, fixed_now())
            .unwrap_err();
        assert_eq!(err, SkillError::EmptyStepInstruction { position: 2 });
    }

    #[test]
    fn difficulty_parses_case_insensitively() {
        assert_eq!("advanced".parse::<Difficulty>().unwrap(), Difficulty::Advanced);
        assert_eq!(
            " Intermediate ".parse::<Difficulty>().unwrap(),
            Difficulty::Intermediate
        );
        assert!("expert".parse::<Difficulty>().is_err());
    }
}
