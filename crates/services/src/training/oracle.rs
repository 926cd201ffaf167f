use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use skill_core::model::SkillId;
use skill_core::scoring::Score;
use thiserror::Error;

use super::camera::Frame;

/// Default time the simulated analysis takes before producing a verdict.
pub const DEFAULT_ANALYSIS_DELAY: Duration = Duration::from_millis(2000);

/// Probability that the simulated analysis accepts the technique.
pub const SIMULATED_SUCCESS_RATE: f64 = 0.8;

/// What the oracle is asked to check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepContext {
    pub skill_id: SkillId,
    pub skill_title: String,
    pub step_index: usize,
    pub step_title: String,
    pub instruction: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationOutcome {
    Success,
    Failure,
}

/// Outcome of analysing one frame, with the accuracy the oracle assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verdict {
    outcome: VerificationOutcome,
    score: Score,
}

impl Verdict {
    #[must_use]
    pub fn success(score: Score) -> Self {
        Self {
            outcome: VerificationOutcome::Success,
            score,
        }
    }

    #[must_use]
    pub fn failure(score: Score) -> Self {
        Self {
            outcome: VerificationOutcome::Failure,
            score,
        }
    }

    #[must_use]
    pub fn outcome(&self) -> VerificationOutcome {
        self.outcome
    }

    #[must_use]
    pub fn score(&self) -> Score {
        self.score
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.outcome == VerificationOutcome::Success
    }

    /// Message shown to the trainee under the camera view.
    #[must_use]
    pub fn feedback(&self) -> String {
        match self.outcome {
            VerificationOutcome::Success => {
                format!("Excellent! Step verified. Accuracy: {}", self.score)
            }
            VerificationOutcome::Failure => {
                "Incorrect technique detected. Please adjust your angle and try again.".to_owned()
            }
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum OracleError {
    #[error("verification service unavailable: {0}")]
    Unavailable(String),
    #[error("no scripted verdict left")]
    Exhausted,
}

/// Judges whether a captured frame shows the step performed correctly.
#[async_trait]
pub trait VerificationOracle: Send + Sync {
    /// # Errors
    ///
    /// Returns `OracleError` if no verdict could be produced.
    async fn verify(&self, frame: &Frame, step: &StepContext) -> Result<Verdict, OracleError>;
}

/// Stand-in for a real vision model: waits a fixed latency, then succeeds
/// with probability `success_rate`.
///
/// Success scores fall in `80..=99`, failure scores in `20..=59`.
#[derive(Debug)]
pub struct SimulatedOracle {
    latency: Duration,
    success_rate: f64,
    rng: Mutex<StdRng>,
}

impl SimulatedOracle {
    #[must_use]
    pub fn new(latency: Duration) -> Self {
        Self {
            latency,
            success_rate: SIMULATED_SUCCESS_RATE,
            rng: Mutex::new(StdRng::from_os_rng()),
        }
    }

    /// Deterministic variant for tests and reproducible demos.
    #[must_use]
    pub fn seeded(latency: Duration, seed: u64) -> Self {
        Self {
            latency,
            success_rate: SIMULATED_SUCCESS_RATE,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    #[must_use]
    pub fn with_success_rate(mut self, success_rate: f64) -> Self {
        self.success_rate = success_rate.clamp(0.0, 1.0);
        self
    }

    #[must_use]
    pub fn latency(&self) -> Duration {
        self.latency
    }

    fn roll(&self) -> Result<Verdict, OracleError> {
        let mut rng = self
            .rng
            .lock()
            .map_err(|e| OracleError::Unavailable(e.to_string()))?;
        let success = rng.random_bool(self.success_rate);
        let (raw, verdict): (u32, fn(Score) -> Verdict) = if success {
            (rng.random_range(80..=99), Verdict::success)
        } else {
            (rng.random_range(20..=59), Verdict::failure)
        };
        let score = Score::new(raw).map_err(|e| OracleError::Unavailable(e.to_string()))?;
        Ok(verdict(score))
    }
}

impl Default for SimulatedOracle {
    fn default() -> Self {
        Self::new(DEFAULT_ANALYSIS_DELAY)
    }
}

#[async_trait]
impl VerificationOracle for SimulatedOracle {
    async fn verify(&self, _frame: &Frame, step: &StepContext) -> Result<Verdict, OracleError> {
        tokio::time::sleep(self.latency).await;
        let verdict = self.roll()?;
        tracing::debug!(
            skill = %step.skill_id,
            step = step.step_index,
            success = verdict.is_success(),
            score = verdict.score().value(),
            "simulated verdict"
        );
        Ok(verdict)
    }
}

/// Replays a fixed list of verdicts in order.
#[derive(Debug, Default)]
pub struct ScriptedOracle {
    verdicts: Mutex<VecDeque<Verdict>>,
    seen: Mutex<Vec<StepContext>>,
}

impl ScriptedOracle {
    #[must_use]
    pub fn new(verdicts: impl IntoIterator<Item = Verdict>) -> Self {
        Self {
            verdicts: Mutex::new(verdicts.into_iter().collect()),
            seen: Mutex::new(Vec::new()),
        }
    }

    /// Steps the oracle has been asked about, in call order.
    #[must_use]
    pub fn seen(&self) -> Vec<StepContext> {
        self.seen.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl VerificationOracle for ScriptedOracle {
    async fn verify(&self, _frame: &Frame, step: &StepContext) -> Result<Verdict, OracleError> {
        if let Ok(mut seen) = self.seen.lock() {
            seen.push(step.clone());
        }
        let mut verdicts = self
            .verdicts
            .lock()
            .map_err(|e| OracleError::Unavailable(e.to_string()))?;
        verdicts.pop_front().ok_or(OracleError::Exhausted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame() -> Frame {
        Frame {
            width: 1,
            height: 1,
            pixels: vec![0, 0, 0],
        }
    }

    fn step() -> StepContext {
        StepContext {
            skill_id: SkillId::generate(),
            skill_title: "Welding".into(),
            step_index: 0,
            step_title: "Tack".into(),
            instruction: "Tack weld the corners".into(),
        }
    }

    #[test]
    fn feedback_matches_outcome() {
        let ok = Verdict::success(Score::new(85).unwrap());
        assert_eq!(ok.feedback(), "Excellent! Step verified. Accuracy: 85%");
        let bad = Verdict::failure(Score::new(40).unwrap());
        assert_eq!(
            bad.feedback(),
            "Incorrect technique detected. Please adjust your angle and try again."
        );
    }

    #[tokio::test(start_paused = true)]
    async fn simulated_scores_stay_in_band() {
        let oracle = SimulatedOracle::seeded(DEFAULT_ANALYSIS_DELAY, 7);
        for _ in 0..200 {
            let verdict = oracle.verify(&frame(), &step()).await.unwrap();
            let score = verdict.score().value();
            if verdict.is_success() {
                assert!((80..=99).contains(&score), "success score {score}");
            } else {
                assert!((20..=59).contains(&score), "failure score {score}");
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn simulated_latency_elapses_before_verdict() {
        let oracle = SimulatedOracle::seeded(Duration::from_millis(2000), 1);
        let start = tokio::time::Instant::now();
        oracle.verify(&frame(), &step()).await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(2000));
    }

    #[tokio::test(start_paused = true)]
    async fn success_rate_extremes_are_deterministic() {
        let always = SimulatedOracle::seeded(Duration::ZERO, 3).with_success_rate(1.0);
        let never = SimulatedOracle::seeded(Duration::ZERO, 3).with_success_rate(0.0);
        for _ in 0..20 {
            assert!(always.verify(&frame(), &step()).await.unwrap().is_success());
            assert!(!never.verify(&frame(), &step()).await.unwrap().is_success());
        }
    }

    #[tokio::test]
    async fn scripted_oracle_replays_then_runs_dry() {
        let oracle = ScriptedOracle::new([Verdict::failure(Score::new(30).unwrap())]);
        let first = oracle.verify(&frame(), &step()).await.unwrap();
        assert!(!first.is_success());
        assert_eq!(
            oracle.verify(&frame(), &step()).await.unwrap_err(),
            OracleError::Exhausted
        );
        assert_eq!(oracle.seen().len(), 2);
    }
}
