//! crates/chore_tracker_core/src/view.rs
//!
//! The connection/view state machine that decides which screen the client
//! shows, and the PIN gate in front of the parent screens.
//!
//! The machine itself is synchronous and owns no timers. Whoever runs the probe
//! asks for a generation number with `begin_probe`, and every later event for
//! that probe carries it back; events for a superseded generation are dropped.

use serde::Serialize;

use crate::domain::User;
use crate::ports::PortError;

/// Shown in the connecting view when the long-loading timer fires.
pub const LONG_LOADING_HINT: &str =
    "Connecting is taking a while. Check the network or go to the connection settings.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewState {
    Connecting,
    Config,
    Setup,
    Login,
    Child,
    Parent,
}

/// Why the machine ended up in the config view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionIssue {
    NotConfigured,
    /// Reachable but missing tables/collections: show setup instructions.
    Unprovisioned,
    Unavailable,
    Unauthorized,
    InvalidConfig,
    TimedOut,
    Unexpected,
}

impl ConnectionIssue {
    pub fn from_port_error(err: &PortError) -> Self {
        match err {
            PortError::NotConfigured => ConnectionIssue::NotConfigured,
            PortError::Unprovisioned(_) => ConnectionIssue::Unprovisioned,
            PortError::Unavailable(_) => ConnectionIssue::Unavailable,
            PortError::Unauthorized(_) => ConnectionIssue::Unauthorized,
            PortError::Validation(_) => ConnectionIssue::InvalidConfig,
            PortError::NotFound(_) | PortError::Busy(_) | PortError::Unexpected(_) => {
                ConnectionIssue::Unexpected
            }
        }
    }

    /// A message fit for the config screen.
    pub fn message(self) -> &'static str {
        match self {
            ConnectionIssue::NotConfigured => {
                "No backend is configured yet. Enter the connection settings to get started."
            }
            ConnectionIssue::Unprovisioned => {
                "Connected, but the expected tables or collections are missing. Follow the setup instructions, then reconnect."
            }
            ConnectionIssue::Unavailable => {
                "Could not reach the backend. Check the connection settings and the network."
            }
            ConnectionIssue::Unauthorized => {
                "The backend rejected the credentials. Check the key in the connection settings."
            }
            ConnectionIssue::InvalidConfig => "The connection settings are not valid.",
            ConnectionIssue::TimedOut => {
                "Connecting took too long. Check the connection settings and try again."
            }
            ConnectionIssue::Unexpected => {
                "Failed to connect to the backend. Check the connection settings."
            }
        }
    }

    pub fn needs_setup_instructions(self) -> bool {
        self == ConnectionIssue::Unprovisioned
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("cannot {action} while in the {from:?} view")]
    NotAllowed { action: &'static str, from: ViewState },
    #[error("unknown child {0}")]
    UnknownChild(String),
}

/// The outcome of submitting a PIN.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PinOutcome {
    Granted,
    Denied,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PinGate {
    pub open: bool,
    /// What has been typed so far; cleared whenever the gate opens or a PIN is rejected.
    #[serde(skip)]
    pub input: String,
}

/// A serializable copy of everything a client needs to render the current screen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ViewSnapshot {
    pub view: ViewState,
    pub long_loading: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issue: Option<ConnectionIssue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub show_setup_instructions: bool,
    pub users: Vec<User>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_child: Option<User>,
    pub pin_gate_open: bool,
}

#[derive(Debug, Clone)]
pub struct ViewMachine {
    state: ViewState,
    generation: u64,
    long_loading: bool,
    issue: Option<ConnectionIssue>,
    error: Option<String>,
    users: Vec<User>,
    current_child: Option<User>,
    pin_gate: PinGate,
}

impl Default for ViewMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl ViewMachine {
    pub fn new() -> Self {
        Self {
            state: ViewState::Connecting,
            generation: 0,
            long_loading: false,
            issue: None,
            error: None,
            users: Vec::new(),
            current_child: None,
            pin_gate: PinGate::default(),
        }
    }

    pub fn state(&self) -> ViewState {
        self.state
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn users(&self) -> &[User] {
        &self.users
    }

    pub fn current_child(&self) -> Option<&User> {
        self.current_child.as_ref()
    }

    pub fn pin_gate(&self) -> &PinGate {
        &self.pin_gate
    }

    pub fn is_long_loading(&self) -> bool {
        self.long_loading
    }

    pub fn snapshot(&self) -> ViewSnapshot {
        ViewSnapshot {
            view: self.state,
            long_loading: self.long_loading,
            hint: self.long_loading.then_some(LONG_LOADING_HINT),
            issue: self.issue,
            error: self.error.clone(),
            show_setup_instructions: self.issue.map_or(false, ConnectionIssue::needs_setup_instructions),
            users: self.users.clone(),
            current_child: self.current_child.clone(),
            pin_gate_open: self.pin_gate.open,
        }
    }

    //-------------------------------------------------------------------------------------
    // Connection
    //-------------------------------------------------------------------------------------

    /// No credentials: go straight to config without probing.
    pub fn not_configured(&mut self) {
        self.generation += 1;
        self.enter_config(Some(ConnectionIssue::NotConfigured), None);
    }

    /// Enters `connecting` for a new probe and returns its generation.
    ///
    /// Allowed from any state, so a re-submitted configuration always re-runs
    /// the full probe.
    pub fn begin_probe(&mut self) -> u64 {
        self.generation += 1;
        self.state = ViewState::Connecting;
        self.long_loading = false;
        self.issue = None;
        self.error = None;
        self.users.clear();
        self.current_child = None;
        self.pin_gate = PinGate::default();
        self.generation
    }

    /// The long-loading timer fired. Returns false when the event is stale.
    pub fn long_loading_elapsed(&mut self, generation: u64) -> bool {
        if !self.is_current_probe(generation) {
            return false;
        }
        self.long_loading = true;
        true
    }

    /// The probe listed the users. Returns false when the event is stale.
    pub fn probe_succeeded(&mut self, generation: u64, users: Vec<User>) -> bool {
        if !self.is_current_probe(generation) {
            return false;
        }
        self.long_loading = false;
        self.state = if users.is_empty() {
            ViewState::Setup
        } else {
            ViewState::Login
        };
        self.users = users;
        true
    }

    /// The probe failed. Returns false when the event is stale.
    pub fn probe_failed(&mut self, generation: u64, err: &PortError) -> bool {
        if !self.is_current_probe(generation) {
            return false;
        }
        let issue = ConnectionIssue::from_port_error(err);
        self.enter_config(Some(issue), Some(err.to_string()));
        true
    }

    /// The user gave up waiting (or asked for the settings) and jumps to config.
    /// Any probe still in flight is abandoned.
    pub fn escape_to_config(&mut self) {
        let issue = (self.state == ViewState::Connecting).then_some(ConnectionIssue::TimedOut);
        self.generation += 1;
        self.enter_config(issue, None);
    }

    /// Submitted credentials were rejected before any probe could run.
    pub fn config_rejected(&mut self, err: &PortError) {
        self.generation += 1;
        self.enter_config(Some(ConnectionIssue::InvalidConfig), Some(err.to_string()));
    }

    fn is_current_probe(&self, generation: u64) -> bool {
        generation == self.generation && self.state == ViewState::Connecting
    }

    fn enter_config(&mut self, issue: Option<ConnectionIssue>, detail: Option<String>) {
        self.state = ViewState::Config;
        self.long_loading = false;
        self.issue = issue;
        self.error = issue.map(|issue| match detail {
            Some(detail) => format!("{} ({})", issue.message(), detail),
            None => issue.message().to_string(),
        });
        self.users.clear();
        self.current_child = None;
        self.pin_gate = PinGate::default();
    }

    //-------------------------------------------------------------------------------------
    // Login, child and parent screens
    //-------------------------------------------------------------------------------------

    /// Refreshes the cached user list, e.g. after a parent added a child.
    pub fn refresh_users(&mut self, users: Vec<User>) {
        self.users = users;
    }

    pub fn select_child(&mut self, child_id: &str) -> Result<&User, TransitionError> {
        self.require(ViewState::Login, "select a child")?;
        let child = self
            .users
            .iter()
            .find(|u| u.id == child_id)
            .cloned()
            .ok_or_else(|| TransitionError::UnknownChild(child_id.to_string()))?;
        self.pin_gate = PinGate::default();
        self.state = ViewState::Child;
        Ok(self.current_child.insert(child))
    }

    /// Opens the PIN gate with an empty input.
    pub fn open_pin_gate(&mut self) -> Result<(), TransitionError> {
        self.require(ViewState::Login, "open the parent gate")?;
        self.pin_gate = PinGate {
            open: true,
            input: String::new(),
        };
        Ok(())
    }

    pub fn close_pin_gate(&mut self) {
        self.pin_gate = PinGate::default();
    }

    pub fn set_pin_input(&mut self, input: &str) -> Result<(), TransitionError> {
        self.require_gate_open()?;
        self.pin_gate.input = input.to_string();
        Ok(())
    }

    /// Compares the typed PIN with the stored one. On a match the gate closes
    /// and the parent view opens; otherwise the input is cleared and the gate
    /// stays open.
    pub fn submit_pin(&mut self, stored_pin: &str) -> Result<PinOutcome, TransitionError> {
        self.require_gate_open()?;
        if self.pin_gate.input == stored_pin {
            self.pin_gate = PinGate::default();
            self.state = ViewState::Parent;
            Ok(PinOutcome::Granted)
        } else {
            self.pin_gate.input.clear();
            Ok(PinOutcome::Denied)
        }
    }

    /// Child logout or parent "back": both return to the login screen.
    pub fn back_to_login(&mut self) -> Result<(), TransitionError> {
        match self.state {
            ViewState::Child | ViewState::Parent => {
                self.state = ViewState::Login;
                self.current_child = None;
                self.pin_gate = PinGate::default();
                Ok(())
            }
            from => Err(TransitionError::NotAllowed {
                action: "log out",
                from,
            }),
        }
    }

    fn require(&self, expected: ViewState, action: &'static str) -> Result<(), TransitionError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(TransitionError::NotAllowed {
                action,
                from: self.state,
            })
        }
    }

    fn require_gate_open(&self) -> Result<(), TransitionError> {
        self.require(ViewState::Login, "enter a PIN")?;
        if self.pin_gate.open {
            Ok(())
        } else {
            Err(TransitionError::NotAllowed {
                action: "enter a PIN with the gate closed",
                from: self.state,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kid(id: &str) -> User {
        User {
            id: id.to_string(),
            name: format!("Kid {}", id),
            avatar: "🦊".to_string(),
        }
    }

    fn logged_in() -> ViewMachine {
        let mut machine = ViewMachine::new();
        let generation = machine.begin_probe();
        assert!(machine.probe_succeeded(generation, vec![kid("a"), kid("b")]));
        machine
    }

    #[test]
    fn missing_credentials_go_straight_to_config() {
        let mut machine = ViewMachine::new();
        machine.not_configured();
        let snapshot = machine.snapshot();
        assert_eq!(snapshot.view, ViewState::Config);
        assert_eq!(snapshot.issue, Some(ConnectionIssue::NotConfigured));
        assert!(!snapshot.show_setup_instructions);
    }

    #[test]
    fn probe_with_no_users_lands_in_setup() {
        let mut machine = ViewMachine::new();
        let generation = machine.begin_probe();
        assert!(machine.probe_succeeded(generation, Vec::new()));
        assert_eq!(machine.state(), ViewState::Setup);
    }

    #[test]
    fn probe_with_users_lands_in_login_with_cache() {
        let machine = logged_in();
        assert_eq!(machine.state(), ViewState::Login);
        assert_eq!(machine.users().len(), 2);
    }

    #[test]
    fn unprovisioned_backend_routes_to_setup_instructions() {
        let mut machine = ViewMachine::new();
        let generation = machine.begin_probe();
        machine.probe_failed(generation, &PortError::Unprovisioned("relation \"users\" does not exist".into()));
        let snapshot = machine.snapshot();
        assert_eq!(snapshot.view, ViewState::Config);
        assert_eq!(snapshot.issue, Some(ConnectionIssue::Unprovisioned));
        assert!(snapshot.show_setup_instructions);
        assert!(snapshot.error.unwrap().contains("missing"));
    }

    #[test]
    fn generic_failure_is_distinguished_from_unprovisioned() {
        let mut machine = ViewMachine::new();
        let generation = machine.begin_probe();
        machine.probe_failed(generation, &PortError::Unavailable("connection refused".into()));
        let snapshot = machine.snapshot();
        assert_eq!(snapshot.issue, Some(ConnectionIssue::Unavailable));
        assert!(!snapshot.show_setup_instructions);
    }

    #[test]
    fn long_loading_enables_escape_and_stale_results_are_ignored() {
        let mut machine = ViewMachine::new();
        let generation = machine.begin_probe();
        assert!(machine.long_loading_elapsed(generation));
        assert!(machine.snapshot().long_loading);
        assert!(machine.snapshot().hint.is_some());

        machine.escape_to_config();
        assert_eq!(machine.state(), ViewState::Config);
        assert_eq!(machine.snapshot().issue, Some(ConnectionIssue::TimedOut));

        // The abandoned probe finally answers: nothing changes.
        assert!(!machine.probe_succeeded(generation, vec![kid("a")]));
        assert!(!machine.long_loading_elapsed(generation));
        assert_eq!(machine.state(), ViewState::Config);
    }

    #[test]
    fn escape_from_login_opens_config_without_an_error() {
        let mut machine = logged_in();
        machine.escape_to_config();
        let snapshot = machine.snapshot();
        assert_eq!(snapshot.view, ViewState::Config);
        assert_eq!(snapshot.issue, None);
        assert_eq!(snapshot.error, None);
        assert!(snapshot.users.is_empty());
    }

    #[test]
    fn resubmitting_config_reruns_the_probe() {
        let mut machine = ViewMachine::new();
        let first = machine.begin_probe();
        machine.probe_failed(first, &PortError::Unavailable("dns".into()));
        let second = machine.begin_probe();
        assert_ne!(first, second);
        assert_eq!(machine.state(), ViewState::Connecting);
        assert!(machine.snapshot().error.is_none());
        assert!(!machine.probe_failed(first, &PortError::Unavailable("late".into())));
        assert!(machine.probe_succeeded(second, vec![kid("a")]));
        assert_eq!(machine.state(), ViewState::Login);
    }

    #[test]
    fn child_selection_and_logout() {
        let mut machine = logged_in();
        assert_eq!(machine.select_child("b").unwrap().id, "b");
        assert_eq!(machine.state(), ViewState::Child);
        machine.back_to_login().unwrap();
        assert_eq!(machine.state(), ViewState::Login);
        assert!(machine.current_child().is_none());
    }

    #[test]
    fn unknown_child_is_rejected() {
        let mut machine = logged_in();
        assert_eq!(
            machine.select_child("zzz"),
            Err(TransitionError::UnknownChild("zzz".into()))
        );
        assert_eq!(machine.state(), ViewState::Login);
    }

    #[test]
    fn wrong_pin_clears_input_and_keeps_gate_open() {
        let mut machine = logged_in();
        machine.open_pin_gate().unwrap();
        machine.set_pin_input("1234").unwrap();
        assert_eq!(machine.submit_pin("0000").unwrap(), PinOutcome::Denied);
        assert!(machine.pin_gate().open);
        assert!(machine.pin_gate().input.is_empty());
        assert_eq!(machine.state(), ViewState::Login);
    }

    #[test]
    fn right_pin_opens_parent_view() {
        let mut machine = logged_in();
        machine.open_pin_gate().unwrap();
        machine.set_pin_input("0000").unwrap();
        assert_eq!(machine.submit_pin("0000").unwrap(), PinOutcome::Granted);
        assert!(!machine.pin_gate().open);
        assert_eq!(machine.state(), ViewState::Parent);
        machine.back_to_login().unwrap();
        assert_eq!(machine.state(), ViewState::Login);
    }

    #[test]
    fn illegal_transitions_leave_state_untouched() {
        let mut machine = ViewMachine::new();
        machine.begin_probe();
        assert!(machine.select_child("a").is_err());
        assert!(machine.open_pin_gate().is_err());
        assert!(machine.back_to_login().is_err());
        assert!(machine.set_pin_input("0000").is_err());
        assert_eq!(machine.state(), ViewState::Connecting);

        let mut machine = logged_in();
        assert!(machine.submit_pin("0000").is_err(), "gate is closed");
    }
}
