//! crates/chore_tracker_core/src/testing.rs
//!
//! An in-memory `BackendService` for tests. Every operation can be made to fail
//! with a chosen `PortError` to exercise the error paths of the services.

use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::domain::{DayOfWeek, NewRecord, Record, Task, User, DEFAULT_PARENT_PIN};
use crate::ports::{BackendService, PortError, PortResult};

#[derive(Default)]
struct Store {
    users: Vec<User>,
    tasks: Vec<Task>,
    records: Vec<Record>,
    parent_pin: Option<String>,
    next_id: u64,
    writes: usize,
    failures: HashMap<&'static str, PortError>,
}

impl Store {
    fn fresh_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}-{}", prefix, self.next_id)
    }

    fn check(&self, operation: &'static str) -> PortResult<()> {
        match self.failures.get(operation) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

#[derive(Default)]
pub struct MemoryBackend {
    store: Mutex<Store>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every later call of `operation` (a trait method name) fail.
    pub fn fail(&self, operation: &'static str, err: PortError) {
        self.lock().failures.insert(operation, err);
    }

    pub fn heal(&self, operation: &'static str) {
        self.lock().failures.remove(operation);
    }

    /// Number of successful mutating calls so far.
    pub fn writes(&self) -> usize {
        self.lock().writes
    }

    pub fn tasks(&self) -> Vec<Task> {
        self.lock().tasks.clone()
    }

    pub fn records(&self) -> Vec<Record> {
        self.lock().records.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Store> {
        self.store.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl BackendService for MemoryBackend {
    fn kind(&self) -> &'static str {
        "memory"
    }

    async fn list_users(&self) -> PortResult<Vec<User>> {
        let store = self.lock();
        store.check("list_users")?;
        Ok(store.users.clone())
    }

    async fn create_user(&self, name: &str, avatar: &str) -> PortResult<User> {
        let mut store = self.lock();
        store.check("create_user")?;
        let user = User {
            id: store.fresh_id("user"),
            name: name.to_string(),
            avatar: avatar.to_string(),
        };
        store.users.push(user.clone());
        store.writes += 1;
        Ok(user)
    }

    async fn list_tasks(&self, child_id: &str, day: Option<DayOfWeek>) -> PortResult<Vec<Task>> {
        let store = self.lock();
        store.check("list_tasks")?;
        Ok(store
            .tasks
            .iter()
            .filter(|t| t.child_id == child_id && day.map_or(true, |d| t.day_of_week == d))
            .cloned()
            .collect())
    }

    async fn create_task(&self, child_id: &str, title: &str, day: DayOfWeek) -> PortResult<Task> {
        let mut store = self.lock();
        store.check("create_task")?;
        let task = Task {
            id: store.fresh_id("task"),
            child_id: child_id.to_string(),
            title: title.to_string(),
            day_of_week: day,
        };
        store.tasks.push(task.clone());
        store.writes += 1;
        Ok(task)
    }

    async fn delete_task(&self, task_id: &str) -> PortResult<()> {
        let mut store = self.lock();
        store.check("delete_task")?;
        store.tasks.retain(|t| t.id != task_id);
        store.writes += 1;
        Ok(())
    }

    async fn copy_tasks_atomic(
        &self,
        child_id: &str,
        from: DayOfWeek,
        to: DayOfWeek,
    ) -> PortResult<usize> {
        let mut store = self.lock();
        store.check("copy_tasks_atomic")?;
        let sources: Vec<String> = store
            .tasks
            .iter()
            .filter(|t| t.child_id == child_id && t.day_of_week == from)
            .map(|t| t.title.clone())
            .collect();
        store
            .tasks
            .retain(|t| !(t.child_id == child_id && t.day_of_week == to));
        for title in &sources {
            let id = store.fresh_id("task");
            store.tasks.push(Task {
                id,
                child_id: child_id.to_string(),
                title: title.clone(),
                day_of_week: to,
            });
        }
        store.writes += 1;
        Ok(sources.len())
    }

    async fn list_records(&self, child_id: &str, date: NaiveDate) -> PortResult<Vec<Record>> {
        let store = self.lock();
        store.check("list_records")?;
        Ok(store
            .records
            .iter()
            .filter(|r| r.child_id == child_id && r.date == date)
            .cloned()
            .collect())
    }

    async fn list_records_in_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> PortResult<Vec<Record>> {
        let store = self.lock();
        store.check("list_records_in_range")?;
        Ok(store
            .records
            .iter()
            .filter(|r| start <= r.date && r.date <= end)
            .cloned()
            .collect())
    }

    async fn create_record(&self, record: NewRecord) -> PortResult<Record> {
        let mut store = self.lock();
        store.check("create_record")?;
        let id = store.fresh_id("record");
        let record = record.into_record(id);
        store.records.push(record.clone());
        store.writes += 1;
        Ok(record)
    }

    async fn delete_record(&self, record_id: &str) -> PortResult<()> {
        let mut store = self.lock();
        store.check("delete_record")?;
        store.records.retain(|r| r.id != record_id);
        store.writes += 1;
        Ok(())
    }

    async fn get_parent_pin(&self) -> PortResult<String> {
        let store = self.lock();
        store.check("get_parent_pin")?;
        Ok(store
            .parent_pin
            .clone()
            .unwrap_or_else(|| DEFAULT_PARENT_PIN.to_string()))
    }

    async fn set_parent_pin(&self, pin: &str) -> PortResult<()> {
        let mut store = self.lock();
        store.check("set_parent_pin")?;
        store.parent_pin = Some(pin.to_string());
        store.writes += 1;
        Ok(())
    }
}
