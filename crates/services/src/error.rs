//! Shared error types for the services crate.

use thiserror::Error;

use skill_core::model::{SkillError, SkillId, TrainingSessionError};
use storage::repository::StorageError;

use crate::training::{CameraError, OracleError};

/// Field-level problems with the sign-up form, worded for inline display.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum FormError {
    #[error("Full name is required")]
    NameRequired,
    #[error("Email is required")]
    EmailRequired,
    #[error("Invalid email address")]
    InvalidEmail,
    #[error("Password is required")]
    PasswordRequired,
    #[error("Password must be at least 6 characters")]
    PasswordTooShort,
    #[error("Please confirm your password")]
    ConfirmRequired,
    #[error("Passwords do not match")]
    PasswordMismatch,
}

/// Errors emitted by the identity provider and account flows.
///
/// Display strings are the literal messages shown on the forms.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AuthError {
    #[error("Invalid email or password.")]
    InvalidCredential,
    #[error("This email is already registered.")]
    EmailAlreadyInUse,
    #[error(transparent)]
    Form(#[from] FormError),
    #[error("An error occurred. Please try again.")]
    Unknown(String),
    /// Registration failed for a reason other than a taken email.
    #[error("Failed to create account. Please try again.")]
    SignUpFailed(String),
}

impl From<StorageError> for AuthError {
    fn from(err: StorageError) -> Self {
        AuthError::Unknown(err.to_string())
    }
}

/// Errors emitted by `CatalogService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CatalogError {
    #[error("skill {0} not found")]
    SkillNotFound(SkillId),
    #[error("user has no profile")]
    MissingProfile,
    #[error(transparent)]
    Skill(#[from] SkillError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted by `AuthoringService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AuthoringError {
    #[error("only admins can author skill modules")]
    Forbidden,
    #[error("Please select a cover image")]
    MissingCoverImage,
    #[error("cover image is not a recognised image format")]
    UnsupportedCoverImage,
    #[error("invalid skill draft: {0}")]
    Draft(String),
    #[error(transparent)]
    Skill(#[from] SkillError),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

/// Errors emitted by the training session engine.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TrainingError {
    #[error("Skill not found")]
    SkillNotFound(SkillId),
    #[error("camera is not available for verification")]
    CameraUnavailable,
    #[error("a verification is already in progress")]
    AnalysisPending,
    #[error("verification result no longer applies to this session")]
    StaleAnalysis,
    #[error("cannot {action} while {phase}")]
    InvalidTransition {
        action: &'static str,
        phase: &'static str,
    },
    #[error(transparent)]
    Camera(#[from] CameraError),
    #[error(transparent)]
    Oracle(#[from] OracleError),
    #[error(transparent)]
    Session(#[from] TrainingSessionError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted by `DashboardService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DashboardError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

