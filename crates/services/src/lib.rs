#![forbid(unsafe_code)]

pub mod app_services;
pub mod auth;
pub mod authoring;
pub mod catalog_service;
pub mod dashboard;
pub mod error;
pub mod session_log_service;
pub mod training;

pub use skill_core::Clock;

pub use app_services::{AppServices, Devices};
pub use auth::{
    AccountService, AuthGate, GateState, Identity, IdentityProvider, LocalIdentityProvider,
    SessionContext, SignUpForm,
};
pub use authoring::{AuthoringService, SkillDraft};
pub use catalog_service::{CatalogService, CoverImage, StepDraft};
pub use dashboard::{DashboardService, DashboardVm};
pub use error::{AuthError, AuthoringError, CatalogError, DashboardError, FormError, TrainingError};
pub use session_log_service::{SessionListItem, SessionLogService};
pub use training::{ActiveTraining, TrainingLoopService};
