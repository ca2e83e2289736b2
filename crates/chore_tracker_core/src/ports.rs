//! crates/chore_tracker_core/src/ports.rs
//!
//! Defines the service contract (trait) between the core logic and the hosted
//! backends. Both the document-store and the relational adapter implement the
//! same port, so nothing above this boundary knows which one is configured.

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::domain::{DayOfWeek, NewRecord, Record, Task, User};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from the backends (HTTP, SQL, network).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PortError {
    /// No backend credentials have been supplied yet.
    #[error("Backend is not configured")]
    NotConfigured,
    /// The backend answered but the expected tables/collections are absent.
    #[error("Backend is reachable but not provisioned: {0}")]
    Unprovisioned(String),
    /// Network failure, timeout or a 5xx from the backend.
    #[error("Backend is unavailable: {0}")]
    Unavailable(String),
    #[error("Invalid input: {0}")]
    Validation(String),
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("Item not found: {0}")]
    NotFound(String),
    /// The same operation is already running.
    #[error("Busy: {0}")]
    Busy(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

impl PortError {
    /// Errors that mean the backend itself cannot be used, as opposed to one
    /// request having failed. Non-critical reads never swallow these.
    pub fn is_connection_level(&self) -> bool {
        matches!(self, PortError::NotConfigured | PortError::Unprovisioned(_))
    }
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Backend Port
//=========================================================================================

#[async_trait]
pub trait BackendService: Send + Sync {
    /// A short name for logs ("firestore", "supabase", ...).
    fn kind(&self) -> &'static str;

    // --- Child profiles ---
    async fn list_users(&self) -> PortResult<Vec<User>>;

    async fn create_user(&self, name: &str, avatar: &str) -> PortResult<User>;

    // --- Routine tasks ---
    /// Lists a child's tasks, optionally restricted to one day of the week.
    async fn list_tasks(&self, child_id: &str, day: Option<DayOfWeek>) -> PortResult<Vec<Task>>;

    async fn create_task(&self, child_id: &str, title: &str, day: DayOfWeek) -> PortResult<Task>;

    async fn delete_task(&self, task_id: &str) -> PortResult<()>;

    /// Replaces every task of `(child_id, to)` with copies of the tasks of
    /// `(child_id, from)` in one atomic write. Returns the number of copies.
    async fn copy_tasks_atomic(
        &self,
        child_id: &str,
        from: DayOfWeek,
        to: DayOfWeek,
    ) -> PortResult<usize>;

    // --- Completion records ---
    async fn list_records(&self, child_id: &str, date: NaiveDate) -> PortResult<Vec<Record>>;

    /// All records, for every child, with `start <= date <= end`.
    async fn list_records_in_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> PortResult<Vec<Record>>;

    async fn create_record(&self, record: NewRecord) -> PortResult<Record>;

    async fn delete_record(&self, record_id: &str) -> PortResult<()>;

    // --- Settings ---
    /// The stored parent PIN, or `DEFAULT_PARENT_PIN` when none was ever set.
    async fn get_parent_pin(&self) -> PortResult<String>;

    async fn set_parent_pin(&self, pin: &str) -> PortResult<()>;
}
