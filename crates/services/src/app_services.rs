use std::sync::Arc;
use std::time::Duration;

use storage::repository::Storage;

use crate::Clock;
use crate::auth::{AccountService, AuthGate, IdentityProvider, LocalIdentityProvider};
use crate::authoring::AuthoringService;
use crate::catalog_service::CatalogService;
use crate::dashboard::DashboardService;
use crate::session_log_service::SessionLogService;
use crate::training::{CameraCapture, SimulatedOracle, TrainingLoopService, VerificationOracle};

/// Device-side collaborators of the training engine.
#[derive(Clone)]
pub struct Devices {
    pub camera: Arc<dyn CameraCapture>,
    pub oracle: Arc<dyn VerificationOracle>,
}

impl Devices {
    /// The given camera with the simulated oracle at `analysis_delay`.
    #[must_use]
    pub fn simulated(camera: Arc<dyn CameraCapture>, analysis_delay: Duration) -> Self {
        Self {
            camera,
            oracle: Arc::new(SimulatedOracle::new(analysis_delay)),
        }
    }
}

/// Assembles app-facing services over one `Storage`.
#[derive(Clone)]
pub struct AppServices {
    identity: Arc<dyn IdentityProvider>,
    accounts: Arc<AccountService>,
    gate: Arc<AuthGate>,
    catalog: Arc<CatalogService>,
    authoring: Arc<AuthoringService>,
    session_log: Arc<SessionLogService>,
    dashboard: Arc<DashboardService>,
    training: Arc<TrainingLoopService>,
}

impl AppServices {
    #[must_use]
    pub fn from_storage(storage: &Storage, clock: Clock, devices: Devices) -> Self {
        let identity: Arc<dyn IdentityProvider> = Arc::new(LocalIdentityProvider::new(
            clock,
            Arc::clone(&storage.credentials),
        ));
        let accounts = Arc::new(AccountService::new(
            Arc::clone(&identity),
            Arc::clone(&storage.users),
        ));
        let gate = Arc::new(AuthGate::new(Arc::clone(&storage.users)));
        let catalog = CatalogService::new(
            clock,
            Arc::clone(&storage.skills),
            Arc::clone(&storage.users),
            Arc::clone(&storage.blobs),
        );
        let session_log = SessionLogService::new(
            Arc::clone(&storage.sessions),
            Arc::clone(&storage.skills),
        );
        let authoring = Arc::new(AuthoringService::new(catalog.clone()));
        let dashboard = Arc::new(DashboardService::new(catalog.clone(), session_log.clone()));
        let training = Arc::new(TrainingLoopService::new(
            clock,
            Arc::clone(&storage.skills),
            Arc::clone(&storage.sessions),
            devices.camera,
            devices.oracle,
        ));

        Self {
            identity,
            accounts,
            gate,
            catalog: Arc::new(catalog),
            authoring,
            session_log: Arc::new(session_log),
            dashboard,
            training,
        }
    }

    #[must_use]
    pub fn identity(&self) -> Arc<dyn IdentityProvider> {
        Arc::clone(&self.identity)
    }

    #[must_use]
    pub fn accounts(&self) -> Arc<AccountService> {
        Arc::clone(&self.accounts)
    }

    #[must_use]
    pub fn gate(&self) -> Arc<AuthGate> {
        Arc::clone(&self.gate)
    }

    #[must_use]
    pub fn catalog(&self) -> Arc<CatalogService> {
        Arc::clone(&self.catalog)
    }

    #[must_use]
    pub fn authoring(&self) -> Arc<AuthoringService> {
        Arc::clone(&self.authoring)
    }

    #[must_use]
    pub fn session_log(&self) -> Arc<SessionLogService> {
        Arc::clone(&self.session_log)
    }

    #[must_use]
    pub fn dashboard(&self) -> Arc<DashboardService> {
        Arc::clone(&self.dashboard)
    }

    #[must_use]
    pub fn training(&self) -> Arc<TrainingLoopService> {
        Arc::clone(&self.training)
    }
}
