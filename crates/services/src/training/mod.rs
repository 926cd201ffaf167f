//! Camera-verified training sessions.

mod attempt;
mod camera;
mod oracle;
mod workflow;

pub use crate::error::TrainingError;
pub use attempt::{
    AnalysisTicket, CameraStatus, SKILL_NOT_FOUND_MESSAGE, TrainingAttempt, TrainingFault,
    TrainingPhase, TrainingProgress,
};
pub use camera::{
    CameraCapture, CameraError, CameraLease, CameraStream, Facing, Frame, SyntheticCamera,
};
pub use oracle::{
    DEFAULT_ANALYSIS_DELAY, OracleError, SIMULATED_SUCCESS_RATE, ScriptedOracle,
    SimulatedOracle, StepContext, Verdict, VerificationOracle, VerificationOutcome,
};
pub use workflow::{ActiveTraining, TrainingLoopService};
