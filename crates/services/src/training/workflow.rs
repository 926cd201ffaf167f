use std::sync::Arc;

use skill_core::model::{SessionId, SkillId, UserId};
use storage::repository::{SessionLogRepository, SkillRepository};

use super::attempt::{AnalysisTicket, CameraStatus, TrainingAttempt};
use super::camera::{CameraCapture, CameraError, CameraLease, Facing};
use super::oracle::{Verdict, VerificationOracle};
use crate::Clock;
use crate::auth::SessionContext;
use crate::error::TrainingError;

/// A training attempt together with the camera it holds.
///
/// Dropping it releases the camera.
#[derive(Debug)]
pub struct ActiveTraining {
    user_id: UserId,
    attempt: TrainingAttempt,
    camera: Option<CameraLease>,
}

impl ActiveTraining {
    #[must_use]
    pub fn attempt(&self) -> &TrainingAttempt {
        &self.attempt
    }

    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    #[must_use]
    pub fn holds_camera(&self) -> bool {
        self.camera.is_some()
    }
}

/// Returns the attempt to its active step unless the verdict was applied.
///
/// Covers early returns and a verify future dropped mid-analysis.
struct AnalysisGuard<'a> {
    attempt: &'a mut TrainingAttempt,
    ticket: AnalysisTicket,
    settled: bool,
}

impl<'a> AnalysisGuard<'a> {
    fn new(attempt: &'a mut TrainingAttempt, ticket: AnalysisTicket) -> Self {
        Self {
            attempt,
            ticket,
            settled: false,
        }
    }

    fn settle(mut self, verdict: Verdict) -> Result<(), TrainingError> {
        self.settled = true;
        self.attempt.apply_verdict(self.ticket, verdict)
    }
}

impl Drop for AnalysisGuard<'_> {
    fn drop(&mut self) {
        if !self.settled && self.attempt.cancel_analysis(self.ticket) {
            tracing::debug!(
                generation = self.ticket.generation(),
                "analysis abandoned before a verdict"
            );
        }
    }
}

/// Drives a trainee through a skill: fetch, camera, verify, persist.
#[derive(Clone)]
pub struct TrainingLoopService {
    clock: Clock,
    skills: Arc<dyn SkillRepository>,
    sessions: Arc<dyn SessionLogRepository>,
    camera: Arc<dyn CameraCapture>,
    oracle: Arc<dyn VerificationOracle>,
}

impl TrainingLoopService {
    #[must_use]
    pub fn new(
        clock: Clock,
        skills: Arc<dyn SkillRepository>,
        sessions: Arc<dyn SessionLogRepository>,
        camera: Arc<dyn CameraCapture>,
        oracle: Arc<dyn VerificationOracle>,
    ) -> Self {
        Self {
            clock,
            skills,
            sessions,
            camera,
            oracle,
        }
    }

    /// Load the skill and, if it exists, ask for the camera.
    ///
    /// A missing skill or failed fetch is not an error here: the returned
    /// attempt sits in its `Error` phase and never touches the camera.
    ///
    /// # Errors
    ///
    /// Returns `TrainingError::InvalidTransition` only on internal misuse.
    pub async fn open(
        &self,
        ctx: &SessionContext,
        skill_id: SkillId,
    ) -> Result<ActiveTraining, TrainingError> {
        self.open_for(ctx.user_id(), skill_id).await
    }

    async fn open_for(
        &self,
        user_id: UserId,
        skill_id: SkillId,
    ) -> Result<ActiveTraining, TrainingError> {
        let mut attempt = TrainingAttempt::loading(skill_id);
        match self.skills.get_skill(skill_id).await {
            Ok(skill) => attempt.skill_loaded(skill, self.clock.now())?,
            Err(err) => {
                tracing::warn!(skill = %skill_id, error = %err, "skill fetch failed");
                attempt.skill_failed(err.to_string())?;
            }
        }

        let mut active = ActiveTraining {
            user_id,
            attempt,
            camera: None,
        };
        if active.attempt.skill().is_some() {
            self.request_camera(&mut active).await;
            tracing::info!(
                user = %user_id,
                skill = %skill_id,
                steps = active.attempt.step_count(),
                camera = ?active.attempt.camera_status(),
                "training started"
            );
        }
        Ok(active)
    }

    async fn request_camera(&self, active: &mut ActiveTraining) {
        match CameraLease::acquire(Arc::clone(&self.camera), Facing::Environment).await {
            Ok(lease) => {
                active.camera = Some(lease);
                active.attempt.camera_ready(CameraStatus::Active);
            }
            Err(CameraError::PermissionDenied) => {
                active.attempt.camera_ready(CameraStatus::Denied);
            }
            Err(err) => {
                tracing::warn!(error = %err, "camera unavailable");
                active.attempt.camera_ready(CameraStatus::Denied);
            }
        }
    }

    /// Capture a frame for the current step and have the oracle judge it.
    ///
    /// The attempt is `Analyzing` while the oracle runs. If this future is
    /// dropped, or capture or the oracle fails, the step becomes active again
    /// and nothing is recorded.
    ///
    /// # Errors
    ///
    /// - `TrainingError::CameraUnavailable` when permission was denied.
    /// - `TrainingError::AnalysisPending` / `InvalidTransition` from the wrong phase.
    /// - `TrainingError::Camera` / `Oracle` if capture or analysis fails.
    pub async fn verify(&self, active: &mut ActiveTraining) -> Result<Verdict, TrainingError> {
        let ticket = active.attempt.begin_analysis()?;
        let guard = AnalysisGuard::new(&mut active.attempt, ticket);

        let lease = active
            .camera
            .as_ref()
            .ok_or(TrainingError::CameraUnavailable)?;
        let frame = lease.capture()?;
        let context =
            guard
                .attempt
                .step_context(ticket)
                .ok_or(TrainingError::InvalidTransition {
                    action: "verify a step",
                    phase: "without a loaded skill",
                })?;

        let verdict = self.oracle.verify(&frame, &context).await?;
        guard.settle(verdict)?;
        tracing::info!(
            step = ticket.step_index() + 1,
            success = verdict.is_success(),
            score = verdict.score().value(),
            "step analysed"
        );
        Ok(verdict)
    }

    /// Leave the step result. Completing the last step releases the camera
    /// and saves the session.
    ///
    /// Returns the stored session id once the pass is complete and saved.
    ///
    /// # Errors
    ///
    /// - `TrainingError::InvalidTransition` unless a step result is showing.
    /// - `TrainingError::Storage` if the session could not be saved; the
    ///   attempt stays complete and [`Self::finalize_session`] retries.
    pub async fn advance(
        &self,
        active: &mut ActiveTraining,
    ) -> Result<Option<SessionId>, TrainingError> {
        active.attempt.advance(self.clock.now())?;
        if !active.attempt.is_complete() {
            return Ok(None);
        }
        active.camera = None;
        self.finalize_session(active).await.map(Some)
    }

    /// Save the completed pass. Safe to call again after a failed save; a
    /// saved session is never written twice.
    ///
    /// # Errors
    ///
    /// - `TrainingError::InvalidTransition` before completion.
    /// - `TrainingError::Storage` if the append fails.
    pub async fn finalize_session(
        &self,
        active: &mut ActiveTraining,
    ) -> Result<SessionId, TrainingError> {
        if let Some(id) = active.attempt.session_id() {
            return Ok(id);
        }
        let record = active.attempt.session_record(active.user_id)?;
        if let Err(err) = self.sessions.append_session(&record).await {
            tracing::error!(
                session = %record.id(),
                user = %record.user_id(),
                error = %err,
                "failed to save training session"
            );
            return Err(err.into());
        }
        active.attempt.mark_persisted();
        tracing::info!(
            session = %record.id(),
            skill = %record.skill_id(),
            accuracy = record.accuracy().value(),
            "training session saved"
        );
        Ok(record.id())
    }

    /// Throw the current attempt away and start the same skill from scratch.
    ///
    /// # Errors
    ///
    /// Same as [`Self::open`].
    pub async fn retry_module(
        &self,
        active: ActiveTraining,
    ) -> Result<ActiveTraining, TrainingError> {
        let user_id = active.user_id;
        let skill_id = active.attempt.skill_id();
        // The camera must be free before it is requested again.
        drop(active);
        self.open_for(user_id, skill_id).await
    }

    /// Leave without saving anything.
    pub fn abandon(&self, active: ActiveTraining) {
        tracing::info!(
            user = %active.user_id,
            skill = %active.attempt.skill_id(),
            recorded_steps = active.attempt.step_scores().len(),
            "training abandoned"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Identity;
    use crate::training::{ScriptedOracle, SyntheticCamera, TrainingPhase};
    use skill_core::model::{Difficulty, Skill, SkillMetadata, SkillStep};
    use skill_core::scoring::Score;
    use skill_core::time::{fixed_clock, fixed_now};
    use storage::repository::InMemoryRepository;
    use url::Url;

    fn ctx() -> SessionContext {
        SessionContext::new(
            Identity {
                user_id: UserId::generate(),
                email: "t@b.io".into(),
            },
            None,
        )
    }

    async fn seed_skill(repo: &InMemoryRepository, steps: usize) -> SkillId {
        let pairs: Vec<(String, String)> =
            (1..=steps).map(|n| (format!("Step {n}"), "Do it".to_owned())).collect();
        let skill = Skill::new(
            SkillId::generate(),
            SkillMetadata {
                title: "Plumbing".into(),
                description: "Fix a leak".into(),
                difficulty: Difficulty::Beginner,
                category: "Plumbing".into(),
            },
            Url::parse("memory://blobs/skills/p.png").unwrap(),
            SkillStep::numbered(pairs),
            fixed_now(),
        )
        .unwrap();
        repo.insert_skill(&skill).await.unwrap();
        skill.id()
    }

    fn service(
        repo: &InMemoryRepository,
        camera: Arc<SyntheticCamera>,
        oracle: Arc<ScriptedOracle>,
    ) -> TrainingLoopService {
        TrainingLoopService::new(
            fixed_clock(),
            Arc::new(repo.clone()),
            Arc::new(repo.clone()),
            camera,
            oracle,
        )
    }

    #[tokio::test]
    async fn oracle_failure_returns_to_active_step() {
        let repo = InMemoryRepository::new();
        let skill = seed_skill(&repo, 1).await;
        let camera = Arc::new(SyntheticCamera::granted());
        let oracle = Arc::new(ScriptedOracle::default());
        let training = service(&repo, camera, oracle);

        let mut active = training.open(&ctx(), skill).await.unwrap();
        let err = training.verify(&mut active).await.unwrap_err();
        assert!(matches!(err, TrainingError::Oracle(_)));
        assert_eq!(
            active.attempt().phase(),
            &TrainingPhase::StepActive { index: 0 }
        );
    }

    #[tokio::test]
    async fn retry_module_reacquires_camera_after_release() {
        let repo = InMemoryRepository::new();
        let skill = seed_skill(&repo, 2).await;
        let camera = Arc::new(SyntheticCamera::granted());
        let oracle = Arc::new(ScriptedOracle::new([Verdict::success(
            Score::new(90).unwrap(),
        )]));
        let training = service(&repo, camera.clone(), oracle);

        let mut active = training.open(&ctx(), skill).await.unwrap();
        training.verify(&mut active).await.unwrap();
        training.advance(&mut active).await.unwrap();
        assert_eq!(active.attempt().step_scores().len(), 1);

        let fresh = training.retry_module(active).await.unwrap();
        assert_eq!(fresh.attempt().phase(), &TrainingPhase::StepActive { index: 0 });
        assert!(fresh.attempt().step_scores().is_empty());
        assert!(fresh.holds_camera());
        assert_eq!(camera.acquired_count(), 2);
        assert_eq!(camera.active_streams(), 1);
    }
}
