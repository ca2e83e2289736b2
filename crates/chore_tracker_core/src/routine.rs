//! crates/chore_tracker_core/src/routine.rs
//!
//! Parent-side routine management: listing, adding and removing a child's
//! tasks for a day, and copying one day's routine over another.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tracing::info;

use crate::domain::{DayOfWeek, Task};
use crate::ports::{BackendService, PortError, PortResult};
use crate::stats::degrade_to_empty;

/// The set of children with a routine copy in flight. Clones share the set.
#[derive(Clone, Default)]
pub struct CopyFlags(Arc<Mutex<HashSet<String>>>);

impl CopyFlags {
    fn lock(&self) -> std::sync::MutexGuard<'_, HashSet<String>> {
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Holds a child's "copying" flag until dropped.
struct CopyInFlight {
    flags: CopyFlags,
    child_id: String,
}

impl Drop for CopyInFlight {
    fn drop(&mut self) {
        self.flags.lock().remove(&self.child_id);
    }
}

#[derive(Clone)]
pub struct RoutineService {
    backend: Arc<dyn BackendService>,
    flags: CopyFlags,
}

impl RoutineService {
    pub fn new(backend: Arc<dyn BackendService>) -> Self {
        Self::with_flags(backend, CopyFlags::default())
    }

    /// Services built with the same flags refuse concurrent copies for the same child.
    pub fn with_flags(backend: Arc<dyn BackendService>, flags: CopyFlags) -> Self {
        Self { backend, flags }
    }

    /// The child's tasks for one day. A failed read shows an empty routine.
    pub async fn routine(&self, child_id: &str, day: DayOfWeek) -> PortResult<Vec<Task>> {
        degrade_to_empty(self.backend.list_tasks(child_id, Some(day)).await, "tasks")
    }

    pub async fn add_task(&self, child_id: &str, title: &str, day: DayOfWeek) -> PortResult<Task> {
        let title = title.trim();
        if title.is_empty() {
            return Err(PortError::Validation("task title cannot be empty".to_string()));
        }
        if child_id.is_empty() {
            return Err(PortError::Validation("a child must be selected".to_string()));
        }
        let task = self.backend.create_task(child_id, title, day).await?;
        info!("Added task {} for child {} on {}", task.id, child_id, day);
        Ok(task)
    }

    pub async fn delete_task(&self, task_id: &str) -> PortResult<()> {
        self.backend.delete_task(task_id).await?;
        info!("Deleted task {}", task_id);
        Ok(())
    }

    /// Replaces the routine of `to` with a copy of the routine of `from`.
    ///
    /// Rejected without touching the backend when both days are the same, when
    /// `from` has no tasks, or while another copy for the same child runs.
    pub async fn copy_routine(&self, child_id: &str, from: DayOfWeek, to: DayOfWeek) -> PortResult<usize> {
        if from == to {
            return Err(PortError::Validation(
                "cannot copy a routine onto the same day".to_string(),
            ));
        }
        let _in_flight = self.start_copy(child_id)?;

        let source = self.backend.list_tasks(child_id, Some(from)).await?;
        if source.is_empty() {
            return Err(PortError::Validation(format!(
                "there are no tasks on {} to copy",
                from
            )));
        }

        let copied = self.backend.copy_tasks_atomic(child_id, from, to).await?;
        info!(
            "Copied {} task(s) for child {} from {} to {} via {}",
            copied,
            child_id,
            from,
            to,
            self.backend.kind()
        );
        Ok(copied)
    }

    pub fn is_copying(&self, child_id: &str) -> bool {
        self.flags.lock().contains(child_id)
    }

    fn start_copy(&self, child_id: &str) -> PortResult<CopyInFlight> {
        if !self.flags.lock().insert(child_id.to_string()) {
            return Err(PortError::Busy(format!(
                "a routine copy for child {} is already running",
                child_id
            )));
        }
        Ok(CopyInFlight {
            flags: self.flags.clone(),
            child_id: child_id.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryBackend;

    fn day(value: u8) -> DayOfWeek {
        DayOfWeek::new(value).unwrap()
    }

    async fn seeded() -> (Arc<MemoryBackend>, RoutineService) {
        let backend = Arc::new(MemoryBackend::new());
        let service = RoutineService::new(backend.clone());
        service.add_task("kid", "Brush teeth", day(1)).await.unwrap();
        service.add_task("kid", "Make bed", day(1)).await.unwrap();
        service.add_task("kid", "Old Tuesday task", day(2)).await.unwrap();
        service.add_task("sibling", "Sibling Tuesday task", day(2)).await.unwrap();
        (backend, service)
    }

    #[tokio::test]
    async fn copy_overwrites_the_target_day() {
        let (_backend, service) = seeded().await;

        let copied = service.copy_routine("kid", day(1), day(2)).await.unwrap();

        assert_eq!(copied, 2);
        let tuesday = service.routine("kid", day(2)).await.unwrap();
        let mut titles: Vec<_> = tuesday.iter().map(|t| t.title.as_str()).collect();
        titles.sort();
        assert_eq!(titles, ["Brush teeth", "Make bed"]);
        // Source untouched, other child untouched.
        assert_eq!(service.routine("kid", day(1)).await.unwrap().len(), 2);
        assert_eq!(service.routine("sibling", day(2)).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn copies_get_fresh_ids() {
        let (_backend, service) = seeded().await;
        service.copy_routine("kid", day(1), day(5)).await.unwrap();

        let source: HashSet<String> = service.routine("kid", day(1)).await.unwrap().into_iter().map(|t| t.id).collect();
        let target = service.routine("kid", day(5)).await.unwrap();
        assert_eq!(target.len(), 2);
        assert!(target.iter().all(|t| !source.contains(&t.id) && t.day_of_week == day(5)));
    }

    #[tokio::test]
    async fn copy_to_empty_day_yields_source_count() {
        let (_backend, service) = seeded().await;
        assert!(service.routine("kid", day(6)).await.unwrap().is_empty());
        assert_eq!(service.copy_routine("kid", day(1), day(6)).await.unwrap(), 2);
        assert_eq!(service.routine("kid", day(6)).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn empty_source_is_rejected_before_any_write() {
        let (backend, service) = seeded().await;
        let writes = backend.writes();

        let result = service.copy_routine("kid", day(4), day(2)).await;

        assert!(matches!(result, Err(PortError::Validation(_))));
        assert_eq!(backend.writes(), writes);
        assert_eq!(service.routine("kid", day(2)).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn same_day_copy_is_rejected() {
        let (backend, service) = seeded().await;
        let writes = backend.writes();
        let result = service.copy_routine("kid", day(1), day(1)).await;
        assert!(matches!(result, Err(PortError::Validation(_))));
        assert_eq!(backend.writes(), writes);
    }

    #[tokio::test]
    async fn failed_copy_releases_the_busy_flag() {
        let (backend, service) = seeded().await;
        backend.fail("copy_tasks_atomic", PortError::Unavailable("reset".into()));

        assert!(service.copy_routine("kid", day(1), day(2)).await.is_err());
        assert!(!service.is_copying("kid"));

        backend.heal("copy_tasks_atomic");
        assert_eq!(service.copy_routine("kid", day(1), day(2)).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn concurrent_copy_for_same_child_is_busy() {
        let (_backend, service) = seeded().await;
        let _held = service.start_copy("kid").unwrap();

        let result = service.copy_routine("kid", day(1), day(2)).await;

        assert!(matches!(result, Err(PortError::Busy(_))));
        assert_eq!(service.routine("kid", day(2)).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn services_with_shared_flags_see_each_others_copies() {
        let (backend, service) = seeded().await;
        let flags = CopyFlags::default();
        let first = RoutineService::with_flags(backend.clone(), flags.clone());
        let second = RoutineService::with_flags(backend, flags);
        let _held = first.start_copy("kid").unwrap();

        assert!(second.is_copying("kid"));
        assert!(!service.is_copying("kid"));
    }

    #[tokio::test]
    async fn blank_titles_are_rejected() {
        let (_backend, service) = seeded().await;
        let result = service.add_task("kid", "   ", day(3)).await;
        assert!(matches!(result, Err(PortError::Validation(_))));
    }

    #[tokio::test]
    async fn routine_read_failure_shows_empty_list() {
        let (backend, service) = seeded().await;
        backend.fail("list_tasks", PortError::Unavailable("503".into()));
        assert!(service.routine("kid", day(1)).await.unwrap().is_empty());
    }
}
