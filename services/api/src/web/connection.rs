//! services/api/src/web/connection.rs
//!
//! Connects the service to a backend and runs the probe that decides the first
//! screen: list the users while a long-loading timer runs beside the request,
//! then hand the outcome to the view machine.

use crate::adapters;
use crate::config::BackendCredentials;
use crate::web::state::AppState;
use chore_tracker_core::ports::PortError;
use chore_tracker_core::ViewSnapshot;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Upper bound for a single backend request or pool acquire.
pub const BACKEND_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Startup: probe the configured backend, or go straight to the config view.
pub async fn initialize(state: Arc<AppState>) -> ViewSnapshot {
    match state.config.credentials.clone() {
        Some(credentials) => configure(state, credentials).await,
        None => {
            info!("No backend credentials configured. Waiting for the client to submit them.");
            let mut view = state.view.lock().await;
            view.not_configured();
            view.snapshot()
        }
    }
}

/// Builds a handle for the submitted credentials, installs it and re-runs the
/// whole probe. Credentials that cannot work leave the current handle alone.
pub async fn configure(state: Arc<AppState>, credentials: BackendCredentials) -> ViewSnapshot {
    let handle = credentials
        .validate()
        .map_err(|e| PortError::Validation(e.to_string()))
        .and_then(|()| adapters::connect(&credentials, BACKEND_REQUEST_TIMEOUT));

    match handle {
        Ok(backend) => {
            info!("Using the {} backend.", credentials.kind());
            state.replace_backend(Some(backend)).await;
            probe(state).await
        }
        Err(e) => {
            warn!("Rejected {} credentials: {}", credentials.kind(), e);
            let mut view = state.view.lock().await;
            view.config_rejected(&e);
            view.snapshot()
        }
    }
}

/// Drops the backend handle and returns to the not-configured config view.
pub async fn reset(state: &AppState) -> ViewSnapshot {
    state.replace_backend(None).await;
    info!("Backend handle dropped.");
    let mut view = state.view.lock().await;
    view.not_configured();
    view.snapshot()
}

/// Lists the users with the current handle and moves the view to `setup`,
/// `login` or `config`.
///
/// The long-loading timer is cancelled on every way out of this function,
/// including the future being dropped mid-request.
pub async fn probe(state: Arc<AppState>) -> ViewSnapshot {
    let backend = match state.backend().await {
        Ok(backend) => backend,
        Err(_) => {
            let mut view = state.view.lock().await;
            view.not_configured();
            return view.snapshot();
        }
    };

    let generation = state.view.lock().await.begin_probe();
    info!("Probing the {} backend (probe #{}).", backend.kind(), generation);

    let timer = CancellationToken::new();
    let cancel_timer = timer.clone().drop_guard();
    tokio::spawn(long_loading_timer(state.clone(), generation, timer));

    let result = backend.list_users().await;
    drop(cancel_timer);

    let mut view = state.view.lock().await;
    match result {
        Ok(users) => {
            let count = users.len();
            if view.probe_succeeded(generation, users) {
                info!("Probe #{} succeeded with {} user(s).", generation, count);
            } else {
                debug!("Ignoring the result of superseded probe #{}.", generation);
            }
        }
        Err(e) => {
            if view.probe_failed(generation, &e) {
                warn!("Probe #{} failed: {}", generation, e);
            } else {
                debug!("Ignoring the failure of superseded probe #{}: {}", generation, e);
            }
        }
    }
    view.snapshot()
}

async fn long_loading_timer(state: Arc<AppState>, generation: u64, token: CancellationToken) {
    let delay = state.config.probe_timeout;
    tokio::select! {
        _ = token.cancelled() => {}
        _ = tokio::time::sleep(delay) => {
            if state.view.lock().await.long_loading_elapsed(generation) {
                warn!("Probe #{} is still running after {:?}.", generation, delay);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use async_trait::async_trait;
    use chore_tracker_core::domain::{DayOfWeek, NewRecord, Record, Task, User};
    use chore_tracker_core::ports::{BackendService, PortResult};
    use chore_tracker_core::testing::MemoryBackend;
    use chore_tracker_core::{ConnectionIssue, ViewState};
    use chrono::NaiveDate;

    /// Only the probe's call is implemented; it answers after `delay`.
    struct SlowUsers {
        delay: Duration,
    }

    #[async_trait]
    impl BackendService for SlowUsers {
        fn kind(&self) -> &'static str {
            "slow"
        }
        async fn list_users(&self) -> PortResult<Vec<User>> {
            tokio::time::sleep(self.delay).await;
            Ok(vec![User {
                id: "kid".to_string(),
                name: "Mina".to_string(),
                avatar: "🦊".to_string(),
            }])
        }
        async fn create_user(&self, _: &str, _: &str) -> PortResult<User> {
            unimplemented!()
        }
        async fn list_tasks(&self, _: &str, _: Option<DayOfWeek>) -> PortResult<Vec<Task>> {
            unimplemented!()
        }
        async fn create_task(&self, _: &str, _: &str, _: DayOfWeek) -> PortResult<Task> {
            unimplemented!()
        }
        async fn delete_task(&self, _: &str) -> PortResult<()> {
            unimplemented!()
        }
        async fn copy_tasks_atomic(&self, _: &str, _: DayOfWeek, _: DayOfWeek) -> PortResult<usize> {
            unimplemented!()
        }
        async fn list_records(&self, _: &str, _: NaiveDate) -> PortResult<Vec<Record>> {
            unimplemented!()
        }
        async fn list_records_in_range(&self, _: NaiveDate, _: NaiveDate) -> PortResult<Vec<Record>> {
            unimplemented!()
        }
        async fn create_record(&self, _: NewRecord) -> PortResult<Record> {
            unimplemented!()
        }
        async fn delete_record(&self, _: &str) -> PortResult<()> {
            unimplemented!()
        }
        async fn get_parent_pin(&self) -> PortResult<String> {
            unimplemented!()
        }
        async fn set_parent_pin(&self, _: &str) -> PortResult<()> {
            unimplemented!()
        }
    }

    fn state(backend: Option<Arc<dyn BackendService>>) -> Arc<AppState> {
        let config = Arc::new(Config::default());
        Arc::new(match backend {
            Some(backend) => AppState::with_backend(config, backend),
            None => AppState::new(config),
        })
    }

    #[tokio::test]
    async fn no_credentials_means_config_without_a_probe() {
        let state = state(None);
        let snapshot = initialize(state.clone()).await;
        assert_eq!(snapshot.view, ViewState::Config);
        assert_eq!(snapshot.issue, Some(ConnectionIssue::NotConfigured));
        assert_eq!(state.view.lock().await.generation(), 1);
    }

    #[tokio::test]
    async fn empty_backend_lands_in_setup_and_populated_in_login() {
        let memory = Arc::new(MemoryBackend::new());
        let state = state(Some(memory.clone()));
        assert_eq!(probe(state.clone()).await.view, ViewState::Setup);

        memory.create_user("Mina", "🦊").await.unwrap();
        let snapshot = probe(state.clone()).await;
        assert_eq!(snapshot.view, ViewState::Login);
        assert_eq!(snapshot.users.len(), 1);
    }

    #[tokio::test]
    async fn missing_tables_show_setup_instructions() {
        let memory = Arc::new(MemoryBackend::new());
        memory.fail("list_users", PortError::Unprovisioned("relation \"users\" does not exist".to_string()));
        let snapshot = probe(state(Some(memory))).await;
        assert_eq!(snapshot.view, ViewState::Config);
        assert_eq!(snapshot.issue, Some(ConnectionIssue::Unprovisioned));
        assert!(snapshot.show_setup_instructions);
        assert!(snapshot.error.unwrap().contains("does not exist"));
    }

    #[tokio::test]
    async fn invalid_credentials_are_rejected_before_probing() {
        let memory = Arc::new(MemoryBackend::new());
        let state = state(Some(memory.clone()));
        let credentials = BackendCredentials::Supabase {
            url: "ftp://example.supabase.co".to_string(),
            anon_key: "anon".to_string(),
        };
        let snapshot = configure(state.clone(), credentials).await;
        assert_eq!(snapshot.view, ViewState::Config);
        assert_eq!(snapshot.issue, Some(ConnectionIssue::InvalidConfig));
        assert_eq!(state.backend().await.unwrap().kind(), "memory");
    }

    #[tokio::test]
    async fn reset_drops_the_handle() {
        let state = state(Some(Arc::new(MemoryBackend::new())));
        let snapshot = reset(&state).await;
        assert_eq!(snapshot.issue, Some(ConnectionIssue::NotConfigured));
        assert_eq!(state.backend().await.err(), Some(PortError::NotConfigured));
        assert_eq!(probe(state).await.view, ViewState::Config);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_probe_raises_the_long_loading_hint() {
        let state = state(Some(Arc::new(SlowUsers {
            delay: Duration::from_secs(30),
        })));
        let running = tokio::spawn(probe(state.clone()));

        tokio::time::sleep(Duration::from_secs(11)).await;
        let snapshot = state.view.lock().await.snapshot();
        assert_eq!(snapshot.view, ViewState::Connecting);
        assert!(snapshot.long_loading);
        assert!(snapshot.hint.is_some());

        let finished = running.await.unwrap();
        assert_eq!(finished.view, ViewState::Login);
        assert!(!finished.long_loading);
    }

    #[tokio::test(start_paused = true)]
    async fn escaping_abandons_the_probe_in_flight() {
        let state = state(Some(Arc::new(SlowUsers {
            delay: Duration::from_secs(30),
        })));
        let running = tokio::spawn(probe(state.clone()));

        tokio::time::sleep(Duration::from_secs(11)).await;
        state.view.lock().await.escape_to_config();

        let late = running.await.unwrap();
        assert_eq!(late.view, ViewState::Config);
        assert_eq!(late.issue, Some(ConnectionIssue::TimedOut));
    }

    #[tokio::test(start_paused = true)]
    async fn fast_probe_never_raises_the_hint() {
        let state = state(Some(Arc::new(SlowUsers {
            delay: Duration::from_secs(1),
        })));
        let snapshot = probe(state.clone()).await;
        assert_eq!(snapshot.view, ViewState::Login);

        tokio::time::sleep(Duration::from_secs(20)).await;
        assert!(!state.view.lock().await.is_long_loading());
    }

    #[tokio::test(start_paused = true)]
    async fn aborted_probe_takes_its_timer_with_it() {
        let state = state(Some(Arc::new(SlowUsers {
            delay: Duration::from_secs(30),
        })));
        let running = tokio::spawn(probe(state.clone()));
        tokio::time::sleep(Duration::from_secs(1)).await;
        running.abort();

        tokio::time::sleep(Duration::from_secs(20)).await;
        let view = state.view.lock().await;
        assert_eq!(view.state(), ViewState::Connecting);
        assert!(!view.is_long_loading());
    }
}
