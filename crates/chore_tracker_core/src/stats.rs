//! crates/chore_tracker_core/src/stats.rs
//!
//! The weekly report: per-day completion percentages for the chart plus a
//! per-day log of what happened to every scheduled task.

use chrono::NaiveDate;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::domain::{DayOfWeek, Record, RecordStatus, Task};
use crate::ports::{BackendService, PortResult};
use crate::week::{completion_percentage, day_label, WeekRange};

//=========================================================================================
// Report Types
//=========================================================================================

/// One bar of the weekly chart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DayStat {
    pub label: String,
    pub percentage: u32,
    pub done: usize,
    pub total: usize,
    pub date: NaiveDate,
}

/// What happened to a task on a given date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryStatus {
    Done,
    Pass,
    None,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEntry {
    pub task_title: String,
    pub status: EntryStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DayLog {
    pub date: NaiveDate,
    pub label: String,
    pub entries: Vec<LogEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WeeklyReport {
    pub child_id: String,
    pub week: WeekRange,
    /// Monday..Sunday.
    pub chart: Vec<DayStat>,
    /// Monday..Sunday, parallel to `chart`.
    pub log: Vec<DayLog>,
}

//=========================================================================================
// Aggregation
//=========================================================================================

/// Reduces a week's records and a child's tasks into a `WeeklyReport`.
///
/// `records` may contain other children's records and dates outside the week;
/// they are ignored. When a task has several records on the same date, the
/// last one given decides both the count and the detail log.
pub fn aggregate_week(
    child_id: &str,
    reference: NaiveDate,
    tasks: &[Task],
    records: &[Record],
) -> PortResult<WeeklyReport> {
    let week = WeekRange::containing(reference)?;

    // One record per (task, date) slot; later records replace earlier ones.
    let mut slots: HashMap<(&str, NaiveDate), &Record> = HashMap::new();
    for record in records
        .iter()
        .filter(|r| r.child_id == child_id && week.contains(r.date))
    {
        slots.insert((record.task_id.as_str(), record.date), record);
    }

    let mut chart = Vec::with_capacity(7);
    let mut log = Vec::with_capacity(7);
    for date in week.days() {
        let day = DayOfWeek::of(date);
        let label = day_label(day.weekday());
        let scheduled: Vec<&Task> = tasks
            .iter()
            .filter(|t| t.child_id == child_id && t.day_of_week == day)
            .collect();

        let total = scheduled.len();
        let done = slots
            .iter()
            .filter(|((_, d), r)| *d == date && r.status == RecordStatus::Done)
            .count();
        chart.push(DayStat {
            label: label.clone(),
            percentage: completion_percentage(done, total),
            done,
            total,
            date,
        });

        let entries = scheduled
            .iter()
            .map(|task| match slots.get(&(task.id.as_str(), date)) {
                Some(record) => LogEntry {
                    task_title: task.title.clone(),
                    status: match record.status {
                        RecordStatus::Done => EntryStatus::Done,
                        RecordStatus::Pass => EntryStatus::Pass,
                    },
                    reason: match record.status {
                        RecordStatus::Pass => record.reason.clone(),
                        RecordStatus::Done => None,
                    },
                },
                None => LogEntry {
                    task_title: task.title.clone(),
                    status: EntryStatus::None,
                    reason: None,
                },
            })
            .collect();
        log.push(DayLog {
            date,
            label,
            entries,
        });
    }

    Ok(WeeklyReport {
        child_id: child_id.to_string(),
        week,
        chart,
        log,
    })
}

//=========================================================================================
// Service
//=========================================================================================

#[derive(Clone)]
pub struct WeeklyStatsService {
    backend: Arc<dyn BackendService>,
}

impl WeeklyStatsService {
    pub fn new(backend: Arc<dyn BackendService>) -> Self {
        Self { backend }
    }

    /// Fetches the week around `reference` and aggregates it for `child_id`.
    ///
    /// Both reads are non-critical: a failed fetch is logged and treated as an
    /// empty list, unless the backend is unconfigured or unprovisioned.
    pub async fn weekly_report(&self, child_id: &str, reference: NaiveDate) -> PortResult<WeeklyReport> {
        let week = WeekRange::containing(reference)?;
        info!(
            "Building weekly report for child {} ({} .. {})",
            child_id, week.monday, week.sunday
        );

        let (records, tasks) = futures::join!(
            self.backend.list_records_in_range(week.monday, week.sunday),
            self.backend.list_tasks(child_id, None),
        );
        let records = degrade_to_empty(records, "weekly records")?;
        let tasks = degrade_to_empty(tasks, "tasks")?;

        aggregate_week(child_id, reference, &tasks, &records)
    }
}

/// Turns a failed non-critical list read into an empty list.
pub(crate) fn degrade_to_empty<T>(result: PortResult<Vec<T>>, what: &str) -> PortResult<Vec<T>> {
    match result {
        Ok(items) => Ok(items),
        Err(e) if e.is_connection_level() => Err(e),
        Err(e) => {
            warn!("Failed to fetch {}, showing none: {}", what, e);
            Ok(Vec::new())
        }
    }
}
