//! services/api/src/web/state.rs
//!
//! Defines the application's shared state: the configuration, the current
//! backend handle and the view machine that every request reads or drives.

use crate::config::Config;
use chore_tracker_core::ports::{BackendService, PortError, PortResult};
use chore_tracker_core::{
    ChecklistService, CopyFlags, HouseholdService, RoutineService, ViewMachine, WeeklyStatsService,
};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

//=========================================================================================
// AppState (Shared Across All Requests)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
pub struct AppState {
    pub config: Arc<Config>,
    /// `None` until credentials are supplied; replaced on re-submit, dropped on reset.
    backend: RwLock<Option<Arc<dyn BackendService>>>,
    pub view: Mutex<ViewMachine>,
    pub copy_flags: CopyFlags,
}

impl AppState {
    pub fn new(config: Arc<Config>) -> Self {
        Self {
            config,
            backend: RwLock::new(None),
            view: Mutex::new(ViewMachine::new()),
            copy_flags: CopyFlags::default(),
        }
    }

    /// Starts with a backend already installed (used by tests and at startup).
    pub fn with_backend(config: Arc<Config>, backend: Arc<dyn BackendService>) -> Self {
        Self {
            backend: RwLock::new(Some(backend)),
            ..Self::new(config)
        }
    }

    /// The current backend handle, or `NotConfigured` when there is none.
    pub async fn backend(&self) -> PortResult<Arc<dyn BackendService>> {
        self.backend
            .read()
            .await
            .clone()
            .ok_or(PortError::NotConfigured)
    }

    /// Installs (or, with `None`, drops) the backend handle.
    pub async fn replace_backend(&self, backend: Option<Arc<dyn BackendService>>) {
        *self.backend.write().await = backend;
    }

    pub async fn household(&self) -> PortResult<HouseholdService> {
        Ok(HouseholdService::new(self.backend().await?))
    }

    /// Routine services share one set of copy flags, so a second copy for the
    /// same child is refused across requests.
    pub async fn routines(&self) -> PortResult<RoutineService> {
        Ok(RoutineService::with_flags(
            self.backend().await?,
            self.copy_flags.clone(),
        ))
    }

    pub async fn checklist(&self) -> PortResult<ChecklistService> {
        Ok(ChecklistService::new(self.backend().await?))
    }

    pub async fn stats(&self) -> PortResult<WeeklyStatsService> {
        Ok(WeeklyStatsService::new(self.backend().await?))
    }
}
