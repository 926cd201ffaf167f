use chrono::{DateTime, Utc};
use skill_core::model::{SessionId, Skill, SkillId, SkillStep, TrainingSession, UserId};
use skill_core::scoring::Score;

use super::oracle::{StepContext, Verdict};
use crate::error::TrainingError;

pub const SKILL_NOT_FOUND_MESSAGE: &str = "Skill not found";

//
// ─── PHASES ────────────────────────────────────────────────────────────────────
//

/// Why an attempt could not start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrainingFault {
    SkillNotFound,
    FetchFailed(String),
}

/// Outcome of the camera permission request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraStatus {
    Active,
    Denied,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrainingPhase {
    Loading,
    StepActive { index: usize },
    Analyzing { index: usize },
    StepResult { index: usize, verdict: Verdict },
    Complete,
    Error(TrainingFault),
}

impl TrainingPhase {
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            TrainingPhase::Loading => "loading",
            TrainingPhase::StepActive { .. } => "step active",
            TrainingPhase::Analyzing { .. } => "analyzing",
            TrainingPhase::StepResult { .. } => "showing a step result",
            TrainingPhase::Complete => "complete",
            TrainingPhase::Error(_) => "in error",
        }
    }

    /// Zero-based index of the step the phase refers to, if any.
    #[must_use]
    pub fn step_index(&self) -> Option<usize> {
        match self {
            TrainingPhase::StepActive { index }
            | TrainingPhase::Analyzing { index }
            | TrainingPhase::StepResult { index, .. } => Some(*index),
            _ => None,
        }
    }
}

/// Proof that an analysis was started; required to apply its verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnalysisTicket {
    generation: u64,
    index: usize,
}

impl AnalysisTicket {
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    #[must_use]
    pub fn step_index(&self) -> usize {
        self.index
    }
}

/// Step position for progress display ("Step 2/5").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrainingProgress {
    pub step_number: usize,
    pub total_steps: usize,
    pub recorded_scores: usize,
}

impl TrainingProgress {
    /// Percentage of steps reached, for the progress bar.
    #[must_use]
    pub fn percent(&self) -> u32 {
        if self.total_steps == 0 {
            return 0;
        }
        u32::try_from(self.step_number * 100 / self.total_steps).unwrap_or(100)
    }
}

//
// ─── ATTEMPT ───────────────────────────────────────────────────────────────────
//

/// One pass through a skill's steps.
///
/// Pure state machine: the service layer performs the I/O and feeds results in.
#[derive(Debug, Clone)]
pub struct TrainingAttempt {
    skill_id: SkillId,
    skill: Option<Skill>,
    phase: TrainingPhase,
    camera: Option<CameraStatus>,
    step_scores: Vec<Score>,
    feedback: Option<String>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    generation: u64,
    pending: Option<u64>,
    session: Option<TrainingSession>,
    persisted: bool,
}

impl TrainingAttempt {
    #[must_use]
    pub fn loading(skill_id: SkillId) -> Self {
        Self {
            skill_id,
            skill: None,
            phase: TrainingPhase::Loading,
            camera: None,
            step_scores: Vec::new(),
            feedback: None,
            started_at: None,
            completed_at: None,
            generation: 0,
            pending: None,
            session: None,
            persisted: false,
        }
    }

    /// Start directly on the first step of an already fetched skill.
    #[must_use]
    pub fn start(skill: Skill, now: DateTime<Utc>) -> Self {
        let mut attempt = Self::loading(skill.id());
        attempt.phase = TrainingPhase::StepActive { index: 0 };
        attempt.skill = Some(skill);
        attempt.started_at = Some(now);
        attempt
    }

    /// Resolve the skill fetch. `None` means the skill does not exist.
    ///
    /// # Errors
    ///
    /// Returns `TrainingError::InvalidTransition` unless the attempt is loading.
    pub fn skill_loaded(
        &mut self,
        skill: Option<Skill>,
        now: DateTime<Utc>,
    ) -> Result<(), TrainingError> {
        self.expect_phase("load a skill", matches!(self.phase, TrainingPhase::Loading))?;
        match skill {
            Some(skill) => *self = Self::start(skill, now),
            None => {
                self.phase = TrainingPhase::Error(TrainingFault::SkillNotFound);
                self.feedback = Some(SKILL_NOT_FOUND_MESSAGE.to_owned());
            }
        }
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `TrainingError::InvalidTransition` unless the attempt is loading.
    pub fn skill_failed(&mut self, reason: impl Into<String>) -> Result<(), TrainingError> {
        self.expect_phase("load a skill", matches!(self.phase, TrainingPhase::Loading))?;
        let reason = reason.into();
        self.feedback = Some(format!("Failed to load skill: {reason}"));
        self.phase = TrainingPhase::Error(TrainingFault::FetchFailed(reason));
        Ok(())
    }

    /// Record the answer to the camera permission request.
    pub fn camera_ready(&mut self, status: CameraStatus) {
        if status == CameraStatus::Denied {
            self.feedback =
                Some("Camera access denied. Please enable camera permissions.".to_owned());
        }
        self.camera = Some(status);
    }

    /// Enter `Analyzing` for the current step.
    ///
    /// Legal from an active step, or straight from a failed step result.
    ///
    /// # Errors
    ///
    /// - `TrainingError::AnalysisPending` if a verification is already running.
    /// - `TrainingError::SkillNotFound` if the skill never loaded.
    /// - `TrainingError::CameraUnavailable` without an active camera.
    /// - `TrainingError::InvalidTransition` from any other phase.
    pub fn begin_analysis(&mut self) -> Result<AnalysisTicket, TrainingError> {
        let index = match &self.phase {
            TrainingPhase::StepActive { index } => *index,
            TrainingPhase::StepResult { index, verdict } if !verdict.is_success() => *index,
            TrainingPhase::Analyzing { .. } => return Err(TrainingError::AnalysisPending),
            TrainingPhase::Error(TrainingFault::SkillNotFound) => {
                return Err(TrainingError::SkillNotFound(self.skill_id));
            }
            other => {
                return Err(TrainingError::InvalidTransition {
                    action: "verify a step",
                    phase: other.label(),
                });
            }
        };
        if self.camera != Some(CameraStatus::Active) {
            return Err(TrainingError::CameraUnavailable);
        }
        self.generation += 1;
        self.pending = Some(self.generation);
        self.feedback = None;
        self.phase = TrainingPhase::Analyzing { index };
        Ok(AnalysisTicket {
            generation: self.generation,
            index,
        })
    }

    /// Apply the oracle's verdict for a pending analysis.
    ///
    /// # Errors
    ///
    /// Returns `TrainingError::StaleAnalysis` if the ticket is not the pending one;
    /// the attempt is left untouched.
    pub fn apply_verdict(
        &mut self,
        ticket: AnalysisTicket,
        verdict: Verdict,
    ) -> Result<(), TrainingError> {
        if !self.is_pending(ticket) {
            return Err(TrainingError::StaleAnalysis);
        }
        self.pending = None;
        self.feedback = Some(verdict.feedback());
        self.phase = TrainingPhase::StepResult {
            index: ticket.index,
            verdict,
        };
        Ok(())
    }

    /// Abort a pending analysis and return to the active step.
    ///
    /// Returns `false` if the ticket was not pending.
    pub fn cancel_analysis(&mut self, ticket: AnalysisTicket) -> bool {
        if !self.is_pending(ticket) {
            return false;
        }
        self.pending = None;
        self.phase = TrainingPhase::StepActive {
            index: ticket.index,
        };
        true
    }

    fn is_pending(&self, ticket: AnalysisTicket) -> bool {
        self.pending == Some(ticket.generation)
            && self.phase
                == (TrainingPhase::Analyzing {
                    index: ticket.index,
                })
    }

    /// Leave the step result screen.
    ///
    /// A success records the step score and moves on (or completes at the last
    /// step); a failure returns to the same step without recording anything.
    ///
    /// # Errors
    ///
    /// Returns `TrainingError::InvalidTransition` unless a step result is shown.
    pub fn advance(&mut self, now: DateTime<Utc>) -> Result<(), TrainingError> {
        let TrainingPhase::StepResult { index, verdict } = self.phase.clone() else {
            return Err(TrainingError::InvalidTransition {
                action: "advance",
                phase: self.phase.label(),
            });
        };
        self.feedback = None;
        if !verdict.is_success() {
            self.phase = TrainingPhase::StepActive { index };
            return Ok(());
        }
        self.step_scores.push(verdict.score());
        if index + 1 < self.step_count() {
            self.phase = TrainingPhase::StepActive { index: index + 1 };
        } else {
            self.phase = TrainingPhase::Complete;
            self.completed_at = Some(now);
        }
        Ok(())
    }

    /// The session record for this completed pass.
    ///
    /// Built once; later calls return the same record (same id).
    ///
    /// # Errors
    ///
    /// Returns `TrainingError::InvalidTransition` before completion.
    pub fn session_record(&mut self, user: UserId) -> Result<TrainingSession, TrainingError> {
        if let Some(session) = &self.session {
            return Ok(session.clone());
        }
        let (Some(started_at), Some(completed_at)) = (self.started_at, self.completed_at) else {
            return Err(TrainingError::InvalidTransition {
                action: "build the session record",
                phase: self.phase.label(),
            });
        };
        if self.phase != TrainingPhase::Complete {
            return Err(TrainingError::InvalidTransition {
                action: "build the session record",
                phase: self.phase.label(),
            });
        }
        let session = TrainingSession::completed(
            SessionId::generate(),
            user,
            self.skill_id,
            started_at,
            completed_at,
            &self.step_scores,
        )?;
        self.session = Some(session.clone());
        Ok(session)
    }

    pub fn mark_persisted(&mut self) {
        self.persisted = true;
    }

    /// Id of the stored session record, once the append succeeded.
    #[must_use]
    pub fn session_id(&self) -> Option<SessionId> {
        if self.persisted {
            self.session.as_ref().map(TrainingSession::id)
        } else {
            None
        }
    }

    #[must_use]
    pub fn session(&self) -> Option<&TrainingSession> {
        self.session.as_ref()
    }

    #[must_use]
    pub fn skill_id(&self) -> SkillId {
        self.skill_id
    }

    #[must_use]
    pub fn skill(&self) -> Option<&Skill> {
        self.skill.as_ref()
    }

    #[must_use]
    pub fn phase(&self) -> &TrainingPhase {
        &self.phase
    }

    #[must_use]
    pub fn camera_status(&self) -> Option<CameraStatus> {
        self.camera
    }

    /// Transient message for the current screen, cleared on advance.
    #[must_use]
    pub fn feedback(&self) -> Option<&str> {
        self.feedback.as_deref()
    }

    #[must_use]
    pub fn step_scores(&self) -> &[Score] {
        &self.step_scores
    }

    #[must_use]
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    #[must_use]
    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.phase == TrainingPhase::Complete
    }

    #[must_use]
    pub fn step_count(&self) -> usize {
        self.skill.as_ref().map_or(0, Skill::step_count)
    }

    #[must_use]
    pub fn current_step(&self) -> Option<&SkillStep> {
        let index = self.phase.step_index()?;
        self.skill.as_ref()?.step(index)
    }

    #[must_use]
    pub fn progress(&self) -> TrainingProgress {
        let total_steps = self.step_count();
        let step_number = match self.phase {
            TrainingPhase::Complete => total_steps,
            _ => self.phase.step_index().map_or(0, |i| i + 1),
        };
        TrainingProgress {
            step_number,
            total_steps,
            recorded_scores: self.step_scores.len(),
        }
    }

    /// What the oracle needs to know about the step being analysed.
    #[must_use]
    pub fn step_context(&self, ticket: AnalysisTicket) -> Option<StepContext> {
        let skill = self.skill.as_ref()?;
        let step = skill.step(ticket.index)?;
        Some(StepContext {
            skill_id: skill.id(),
            skill_title: skill.title().to_owned(),
            step_index: ticket.index,
            step_title: step.title().to_owned(),
            instruction: step.instruction().to_owned(),
        })
    }

    fn expect_phase(&self, action: &'static str, ok: bool) -> Result<(), TrainingError> {
        if ok {
            Ok(())
        } else {
            Err(TrainingError::InvalidTransition {
                action,
                phase: self.phase.label(),
            })
        }
    }
}
