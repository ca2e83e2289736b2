//! services/api/src/adapters/supabase.rs
//!
//! The relational-table adapter. It implements the `BackendService` port from
//! the `core` crate against the REST API (`/rest/v1`) of a Supabase project,
//! authenticated with the project's anon key. Columns are snake_case
//! (`child_id`, `day_of_week`); ids are uuids handed to the core as strings.

use async_trait::async_trait;
use chore_tracker_core::domain::{
    DayOfWeek, NewRecord, Record, RecordStatus, Task, User, DEFAULT_PARENT_PIN, SETTINGS_ID,
};
use chore_tracker_core::ports::{BackendService, PortError, PortResult};
use chrono::NaiveDate;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

/// The provisioning script shown on the setup-instructions screen.
pub const SCHEMA_SQL: &str = include_str!("../../migrations/0001_chore_tracker.sql");

const TASK_COLUMNS: &str = "id,child_id,title,day_of_week";
const RECORD_COLUMNS: &str = "id,child_id,task_id,status,reason,date";

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements the `BackendService` port over PostgREST.
#[derive(Clone)]
pub struct SupabaseAdapter {
    client: Client,
    rest_url: String,
}

impl SupabaseAdapter {
    /// Creates a new `SupabaseAdapter` for the project at `url`.
    /// Nothing touches the network until the first request, which is the probe.
    pub fn new(url: &str, anon_key: &str, request_timeout: Duration) -> PortResult<Self> {
        let invalid_key = |_| PortError::Validation("the anon key is not a valid header value".to_string());
        let mut api_key = HeaderValue::from_str(anon_key).map_err(invalid_key)?;
        api_key.set_sensitive(true);
        let mut bearer = HeaderValue::from_str(&format!("Bearer {}", anon_key)).map_err(invalid_key)?;
        bearer.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert("apikey", api_key);
        headers.insert(AUTHORIZATION, bearer);

        let client = Client::builder()
            .timeout(request_timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| PortError::Unexpected(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            rest_url: format!("{}/rest/v1", url.trim_end_matches('/')),
        })
    }

    fn request(&self, method: Method, resource: &str) -> RequestBuilder {
        self.client.request(method, format!("{}/{}", self.rest_url, resource))
    }

    /// Sends a request, turning error responses into `PortError`s.
    async fn send(&self, request: RequestBuilder) -> PortResult<Response> {
        let response = request.send().await.map_err(map_transport_error)?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.json::<ErrorBody>().await.unwrap_or_default();
        Err(classify_response(status, &body))
    }

    async fn fetch<T: DeserializeOwned>(&self, request: RequestBuilder) -> PortResult<T> {
        self.send(request)
            .await?
            .json::<T>()
            .await
            .map_err(map_transport_error)
    }

    /// Inserts one row and returns it as stored.
    async fn insert<T: DeserializeOwned>(
        &self,
        table: &str,
        columns: &str,
        row: serde_json::Value,
    ) -> PortResult<T> {
        let request = self
            .request(Method::POST, table)
            .query(&[("select", columns)])
            .header("Prefer", "return=representation")
            .json(&json!([row]));
        let mut rows: Vec<T> = self.fetch(request).await?;
        if rows.is_empty() {
            return Err(PortError::Unexpected(format!("insert into {} returned no row", table)));
        }
        Ok(rows.swap_remove(0))
    }

    async fn delete_by_id(&self, table: &str, id: &str) -> PortResult<()> {
        let request = self
            .request(Method::DELETE, table)
            .query(&[("id", format!("eq.{}", id))]);
        self.send(request).await?;
        Ok(())
    }
}

//=========================================================================================
// "Impure" Database Row Structs
//=========================================================================================

#[derive(Deserialize)]
struct UserRow {
    id: String,
    name: String,
    avatar: String,
}
impl UserRow {
    fn to_domain(self) -> User {
        User {
            id: self.id,
            name: self.name,
            avatar: self.avatar,
        }
    }
}

#[derive(Deserialize)]
struct TaskRow {
    id: String,
    child_id: String,
    title: String,
    day_of_week: i16,
}
impl TaskRow {
    fn to_domain(self) -> PortResult<Task> {
        let day = u8::try_from(self.day_of_week)
            .map_err(|_| PortError::Unexpected(format!("bad day_of_week {}", self.day_of_week)))?;
        Ok(Task {
            id: self.id,
            child_id: self.child_id,
            title: self.title,
            day_of_week: DayOfWeek::new(day)?,
        })
    }
}

#[derive(Deserialize)]
struct RecordRow {
    id: String,
    child_id: String,
    task_id: String,
    status: String,
    reason: Option<String>,
    date: NaiveDate,
}
impl RecordRow {
    fn to_domain(self) -> PortResult<Record> {
        Ok(Record {
            id: self.id,
            child_id: self.child_id,
            task_id: self.task_id,
            status: RecordStatus::parse(&self.status)?,
            reason: self.reason,
            date: self.date,
        })
    }
}

#[derive(Deserialize)]
struct SettingsRow {
    parent_pin: Option<String>,
}

//=========================================================================================
// Error Mapping
//=========================================================================================

/// The error object PostgREST answers with. `code` is a SQLSTATE or a
/// `PGRST...` code of PostgREST's own.
#[derive(Debug, Default, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub details: Option<String>,
    #[serde(default)]
    pub hint: Option<String>,
}

/// Maps an HTTP status and PostgREST error body onto the port's error taxonomy.
pub fn classify_response(status: StatusCode, body: &ErrorBody) -> PortError {
    let message = body.message.as_deref().unwrap_or_default();
    let detail = match (message.is_empty(), &body.code) {
        (true, _) => format!("HTTP {}", status),
        (false, Some(code)) => format!("{} ({})", message, code),
        (false, None) => message.to_string(),
    };

    // Tables or the copy function not created yet, or not yet in PostgREST's cache.
    let missing_schema =
        message.contains("Could not find the table") || message.contains("schema cache");
    match body.code.as_deref() {
        Some("42P01") | Some("42703") | Some("42883") | Some("PGRST202") | Some("PGRST205") => {
            return PortError::Unprovisioned(detail)
        }
        _ if missing_schema => return PortError::Unprovisioned(detail),
        // invalid_text_representation: e.g. an id that is not a uuid
        Some("22P02") | Some("23514") | Some("23502") | Some("23505") => {
            return PortError::Validation(detail)
        }
        // foreign_key_violation: unknown child
        Some("23503") => return PortError::NotFound(detail),
        Some("28P01") | Some("28000") | Some("42501") | Some("PGRST301") => {
            return PortError::Unauthorized(detail)
        }
        Some(code) if code.starts_with("08") || code == "57P01" || code == "53300" => {
            return PortError::Unavailable(detail)
        }
        _ => {}
    }

    match status {
        StatusCode::BAD_REQUEST => PortError::Validation(detail),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => PortError::Unauthorized(detail),
        StatusCode::NOT_FOUND => PortError::NotFound(detail),
        StatusCode::CONFLICT => PortError::Busy(detail),
        StatusCode::TOO_MANY_REQUESTS | StatusCode::REQUEST_TIMEOUT => PortError::Unavailable(detail),
        s if s.is_server_error() => PortError::Unavailable(detail),
        _ => PortError::Unexpected(detail),
    }
}

fn map_transport_error(e: reqwest::Error) -> PortError {
    if e.is_timeout() || e.is_connect() || e.is_request() {
        PortError::Unavailable(e.to_string())
    } else if e.is_decode() {
        PortError::Unexpected(format!("unreadable Supabase response: {}", e))
    } else {
        PortError::Unexpected(e.to_string())
    }
}

//=========================================================================================
// `BackendService` Trait Implementation
//=========================================================================================

#[async_trait]
impl BackendService for SupabaseAdapter {
    fn kind(&self) -> &'static str {
        "supabase"
    }

    async fn list_users(&self) -> PortResult<Vec<User>> {
        let request = self
            .request(Method::GET, "users")
            .query(&[("select", "id,name,avatar"), ("order", "created_at.asc")]);
        let rows: Vec<UserRow> = self.fetch(request).await?;
        Ok(rows.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn create_user(&self, name: &str, avatar: &str) -> PortResult<User> {
        let row: UserRow = self
            .insert("users", "id,name,avatar", json!({ "name": name, "avatar": avatar }))
            .await?;
        Ok(row.to_domain())
    }

    async fn list_tasks(&self, child_id: &str, day: Option<DayOfWeek>) -> PortResult<Vec<Task>> {
        let mut filters = vec![("child_id", format!("eq.{}", child_id))];
        if let Some(day) = day {
            filters.push(("day_of_week", format!("eq.{}", day.value())));
        }
        let request = self
            .request(Method::GET, "tasks")
            .query(&[("select", TASK_COLUMNS), ("order", "created_at.asc")])
            .query(&filters);
        let rows: Vec<TaskRow> = self.fetch(request).await?;
        rows.into_iter().map(|r| r.to_domain()).collect()
    }

    async fn create_task(&self, child_id: &str, title: &str, day: DayOfWeek) -> PortResult<Task> {
        let row: TaskRow = self
            .insert(
                "tasks",
                TASK_COLUMNS,
                json!({ "child_id": child_id, "title": title, "day_of_week": day.value() }),
            )
            .await?;
        row.to_domain()
    }

    async fn delete_task(&self, task_id: &str) -> PortResult<()> {
        self.delete_by_id("tasks", task_id).await
    }

    /// Calls the `copy_routine` function from the provisioning script, which
    /// locks the source rows, then deletes and inserts in one transaction.
    async fn copy_tasks_atomic(
        &self,
        child_id: &str,
        from: DayOfWeek,
        to: DayOfWeek,
    ) -> PortResult<usize> {
        let request = self.request(Method::POST, "rpc/copy_routine").json(&json!({
            "p_child_id": child_id,
            "p_from_day": from.value(),
            "p_to_day": to.value(),
        }));
        let copied: i64 = self.fetch(request).await?;
        if copied <= 0 {
            return Err(PortError::Validation(format!("there are no tasks on {} to copy", from)));
        }
        usize::try_from(copied)
            .map_err(|_| PortError::Unexpected(format!("copy_routine returned {}", copied)))
    }

    async fn list_records(&self, child_id: &str, date: NaiveDate) -> PortResult<Vec<Record>> {
        let request = self.request(Method::GET, "records").query(&[
            ("select", RECORD_COLUMNS.to_string()),
            ("child_id", format!("eq.{}", child_id)),
            ("date", format!("eq.{}", date)),
            ("order", "created_at.asc".to_string()),
        ]);
        let rows: Vec<RecordRow> = self.fetch(request).await?;
        rows.into_iter().map(|r| r.to_domain()).collect()
    }

    async fn list_records_in_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> PortResult<Vec<Record>> {
        let request = self.request(Method::GET, "records").query(&[
            ("select", RECORD_COLUMNS.to_string()),
            ("date", format!("gte.{}", start)),
            ("date", format!("lte.{}", end)),
            ("order", "created_at.asc".to_string()),
        ]);
        let rows: Vec<RecordRow> = self.fetch(request).await?;
        rows.into_iter().map(|r| r.to_domain()).collect()
    }

    async fn create_record(&self, record: NewRecord) -> PortResult<Record> {
        let row: RecordRow = self
            .insert(
                "records",
                RECORD_COLUMNS,
                json!({
                    "child_id": record.child_id,
                    "task_id": record.task_id,
                    "status": record.status.as_str(),
                    "reason": record.reason,
                    "date": record.date,
                }),
            )
            .await?;
        row.to_domain()
    }

    async fn delete_record(&self, record_id: &str) -> PortResult<()> {
        self.delete_by_id("records", record_id).await
    }

    async fn get_parent_pin(&self) -> PortResult<String> {
        let request = self
            .request(Method::GET, "settings")
            .query(&[("select", "parent_pin".to_string()), ("id", format!("eq.{}", SETTINGS_ID))]);
        let rows: Vec<SettingsRow> = self.fetch(request).await?;
        Ok(rows
            .into_iter()
            .next()
            .and_then(|row| row.parent_pin)
            .filter(|pin| !pin.is_empty())
            .unwrap_or_else(|| DEFAULT_PARENT_PIN.to_string()))
    }

    async fn set_parent_pin(&self, pin: &str) -> PortResult<()> {
        let request = self
            .request(Method::POST, "settings")
            .query(&[("on_conflict", "id")])
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(&json!([{ "id": SETTINGS_ID, "parent_pin": pin }]));
        self.send(request).await?;
        Ok(())
    }
}
