//! crates/chore_tracker_core/src/checklist.rs
//!
//! The child's daily checklist: today's routine joined with today's records.

use chrono::NaiveDate;
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

use crate::domain::{DayOfWeek, NewRecord, Record, Task};
use crate::ports::{BackendService, PortError, PortResult};
use crate::stats::degrade_to_empty;
use crate::week::completion_percentage;

/// One row of the checklist: the task and, once handled, its record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChecklistItem {
    pub task: Task,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record: Option<Record>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DailyChecklist {
    pub child_id: String,
    pub date: NaiveDate,
    pub day_of_week: DayOfWeek,
    pub items: Vec<ChecklistItem>,
    /// Share of tasks with any record (done or pass).
    pub progress: u32,
    pub all_complete: bool,
}

impl DailyChecklist {
    pub fn build(child_id: &str, date: NaiveDate, tasks: Vec<Task>, records: Vec<Record>) -> Self {
        let total = tasks.len();
        let items: Vec<ChecklistItem> = tasks
            .into_iter()
            .map(|task| {
                let record = records.iter().rev().find(|r| r.task_id == task.id).cloned();
                ChecklistItem { task, record }
            })
            .collect();
        let handled = items.iter().filter(|item| item.record.is_some()).count();
        let all_complete = total > 0 && handled == total;

        Self {
            child_id: child_id.to_string(),
            date,
            day_of_week: DayOfWeek::of(date),
            items,
            progress: completion_percentage(handled, total),
            all_complete,
        }
    }
}

#[derive(Clone)]
pub struct ChecklistService {
    backend: Arc<dyn BackendService>,
}

impl ChecklistService {
    pub fn new(backend: Arc<dyn BackendService>) -> Self {
        Self { backend }
    }

    pub async fn load(&self, child_id: &str, date: NaiveDate) -> PortResult<DailyChecklist> {
        let (tasks, records) = futures::join!(
            self.backend.list_tasks(child_id, Some(DayOfWeek::of(date))),
            self.backend.list_records(child_id, date),
        );
        let tasks = degrade_to_empty(tasks, "tasks")?;
        let records = degrade_to_empty(records, "records")?;
        Ok(DailyChecklist::build(child_id, date, tasks, records))
    }

    /// Marks a task done for the date.
    pub async fn check(&self, child_id: &str, task_id: &str, date: NaiveDate) -> PortResult<Record> {
        self.store(NewRecord::done(child_id, task_id, date)).await
    }

    /// Excuses a task for the date. The reason is mandatory.
    pub async fn pass(&self, child_id: &str, task_id: &str, date: NaiveDate, reason: &str) -> PortResult<Record> {
        self.store(NewRecord::pass(child_id, task_id, date, reason)).await
    }

    /// Undoes a check or pass by deleting its record.
    pub async fn undo(&self, record_id: &str) -> PortResult<()> {
        self.backend.delete_record(record_id).await?;
        info!("Removed record {}", record_id);
        Ok(())
    }

    async fn store(&self, record: NewRecord) -> PortResult<Record> {
        record.validate()?;
        if record.child_id.is_empty() || record.task_id.is_empty() {
            return Err(PortError::Validation(
                "child and task are required".to_string(),
            ));
        }
        let stored = self.backend.create_record(record).await?;
        info!(
            "Recorded task {} as {} for child {} on {}",
            stored.task_id,
            stored.status.as_str(),
            stored.child_id,
            stored.date
        );
        Ok(stored)
    }
}
