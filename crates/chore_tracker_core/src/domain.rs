//! crates/chore_tracker_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! These structs are independent of either backend's field naming; adapters map
//! their documents and rows onto them.

use chrono::{Datelike, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ports::PortError;

/// The key of the single global settings record.
pub const SETTINGS_ID: &str = "global_settings";

/// The parent PIN used when no settings record exists yet.
pub const DEFAULT_PARENT_PIN: &str = "0000";

/// A child profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
    pub avatar: String,
}

/// A day of the week as stored by both backends: 0 = Sunday .. 6 = Saturday.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct DayOfWeek(u8);

impl DayOfWeek {
    pub const SUNDAY: DayOfWeek = DayOfWeek(0);
    pub const MONDAY: DayOfWeek = DayOfWeek(1);
    pub const WEDNESDAY: DayOfWeek = DayOfWeek(3);
    pub const SATURDAY: DayOfWeek = DayOfWeek(6);

    pub fn new(value: u8) -> Result<Self, PortError> {
        if value <= 6 {
            Ok(Self(value))
        } else {
            Err(PortError::Validation(format!(
                "day of week must be in 0..=6 (0 = Sunday), got {}",
                value
            )))
        }
    }

    pub fn of(date: NaiveDate) -> Self {
        Self(date.weekday().num_days_from_sunday() as u8)
    }

    pub fn value(self) -> u8 {
        self.0
    }

    pub fn weekday(self) -> Weekday {
        match self.0 {
            0 => Weekday::Sun,
            1 => Weekday::Mon,
            2 => Weekday::Tue,
            3 => Weekday::Wed,
            4 => Weekday::Thu,
            5 => Weekday::Fri,
            _ => Weekday::Sat,
        }
    }
}

impl TryFrom<u8> for DayOfWeek {
    type Error = PortError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        DayOfWeek::new(value)
    }
}

impl From<DayOfWeek> for u8 {
    fn from(day: DayOfWeek) -> Self {
        day.0
    }
}

impl From<Weekday> for DayOfWeek {
    fn from(weekday: Weekday) -> Self {
        DayOfWeek(weekday.num_days_from_sunday() as u8)
    }
}

impl fmt::Display for DayOfWeek {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.weekday())
    }
}

/// A routine item: one task a child should do on one day of the week.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub child_id: String,
    pub title: String,
    pub day_of_week: DayOfWeek,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    Done,
    Pass,
}

impl RecordStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RecordStatus::Done => "done",
            RecordStatus::Pass => "pass",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, PortError> {
        match raw {
            "done" => Ok(RecordStatus::Done),
            "pass" => Ok(RecordStatus::Pass),
            other => Err(PortError::Unexpected(format!(
                "unknown record status '{}'",
                other
            ))),
        }
    }
}

/// A completion event for one task on one calendar date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    pub id: String,
    pub child_id: String,
    pub task_id: String,
    pub status: RecordStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub date: NaiveDate,
}

/// A record that has not been stored yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewRecord {
    pub child_id: String,
    pub task_id: String,
    pub status: RecordStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub date: NaiveDate,
}

impl NewRecord {
    pub fn done(child_id: &str, task_id: &str, date: NaiveDate) -> Self {
        Self {
            child_id: child_id.to_string(),
            task_id: task_id.to_string(),
            status: RecordStatus::Done,
            reason: None,
            date,
        }
    }

    pub fn pass(child_id: &str, task_id: &str, date: NaiveDate, reason: &str) -> Self {
        Self {
            child_id: child_id.to_string(),
            task_id: task_id.to_string(),
            status: RecordStatus::Pass,
            reason: Some(reason.trim().to_string()),
            date,
        }
    }

    /// A pass must say why; a done record never carries a reason.
    pub fn validate(&self) -> Result<(), PortError> {
        match self.status {
            RecordStatus::Pass => match self.reason.as_deref().map(str::trim) {
                Some(reason) if !reason.is_empty() => Ok(()),
                _ => Err(PortError::Validation(
                    "a reason is required when passing a task".to_string(),
                )),
            },
            RecordStatus::Done if self.reason.is_some() => Err(PortError::Validation(
                "a done record cannot carry a reason".to_string(),
            )),
            RecordStatus::Done => Ok(()),
        }
    }

    pub fn into_record(self, id: String) -> Record {
        Record {
            id,
            child_id: self.child_id,
            task_id: self.task_id,
            status: self.status,
            reason: self.reason,
            date: self.date,
        }
    }
}
