pub mod checklist;
pub mod domain;
pub mod household;
pub mod ports;
pub mod routine;
pub mod stats;
pub mod view;
pub mod week;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use checklist::{ChecklistItem, ChecklistService, DailyChecklist};
pub use domain::{DayOfWeek, NewRecord, Record, RecordStatus, Task, User, DEFAULT_PARENT_PIN};
pub use household::HouseholdService;
pub use ports::{BackendService, PortError, PortResult};
pub use routine::{CopyFlags, RoutineService};
pub use stats::{aggregate_week, DayLog, DayStat, EntryStatus, LogEntry, WeeklyReport, WeeklyStatsService};
pub use view::{ConnectionIssue, PinOutcome, TransitionError, ViewMachine, ViewSnapshot, ViewState};
pub use week::WeekRange;
