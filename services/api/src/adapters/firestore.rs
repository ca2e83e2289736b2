//! services/api/src/adapters/firestore.rs
//!
//! The document-store adapter. It implements the `BackendService` port from the
//! `core` crate against the Cloud Firestore REST API of a Firebase project,
//! authenticated with the project's web API key. Fields are camelCase
//! (`childId`, `dayOfWeek`, `parentPin`); document ids are Firestore's.

use async_trait::async_trait;
use chore_tracker_core::domain::{
    DayOfWeek, NewRecord, Record, RecordStatus, Task, User, DEFAULT_PARENT_PIN, SETTINGS_ID,
};
use chore_tracker_core::ports::{BackendService, PortError, PortResult};
use chrono::NaiveDate;
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::time::Duration;
use uuid::Uuid;

const FIRESTORE_ROOT: &str = "https://firestore.googleapis.com/v1";

const USERS: &str = "users";
const TASKS: &str = "tasks";
const RECORDS: &str = "records";
const SETTINGS: &str = "settings";

/// The collections the setup-instructions screen lists for Firestore.
pub const COLLECTIONS: [&str; 4] = [USERS, TASKS, RECORDS, SETTINGS];

//=========================================================================================
// Wire Types
//=========================================================================================

/// A Firestore `Value`. Only the kinds this application stores are modelled.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Value {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub string_value: Option<String>,
    /// Firestore sends 64-bit integers as JSON strings.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub integer_value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub double_value: Option<f64>,
}

impl Value {
    pub fn string(value: &str) -> Self {
        Self {
            string_value: Some(value.to_string()),
            ..Self::default()
        }
    }

    pub fn integer(value: i64) -> Self {
        Self {
            integer_value: Some(value.to_string()),
            ..Self::default()
        }
    }

    fn as_i64(&self) -> Option<i64> {
        match (&self.integer_value, self.double_value) {
            (Some(raw), _) => raw.parse().ok(),
            (None, Some(d)) if d.fract() == 0.0 => Some(d as i64),
            _ => None,
        }
    }
}

pub type Fields = BTreeMap<String, Value>;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Document {
    /// `projects/{p}/databases/(default)/documents/{collection}/{id}`
    pub name: String,
    #[serde(default)]
    pub fields: Fields,
}

impl Document {
    pub fn id(&self) -> &str {
        self.name.rsplit('/').next().unwrap_or_default()
    }

    fn string(&self, field: &str) -> PortResult<String> {
        self.fields
            .get(field)
            .and_then(|v| v.string_value.clone())
            .ok_or_else(|| self.missing(field))
    }

    fn optional_string(&self, field: &str) -> Option<String> {
        self.fields.get(field).and_then(|v| v.string_value.clone())
    }

    fn integer(&self, field: &str) -> PortResult<i64> {
        self.fields
            .get(field)
            .and_then(Value::as_i64)
            .ok_or_else(|| self.missing(field))
    }

    fn missing(&self, field: &str) -> PortError {
        PortError::Unexpected(format!("document {} has no usable '{}' field", self.name, field))
    }
}

#[derive(Debug, Deserialize)]
struct RunQueryItem {
    #[serde(default)]
    document: Option<Document>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub status: String,
}

#[derive(Debug, Deserialize)]
struct BeginTransaction {
    transaction: String,
}

impl ErrorBody {
    /// Pulls the error out of a failure body. Unary calls answer with
    /// `{"error": {...}}`; the streaming `:runQuery` wraps it in an array.
    pub fn from_json(body: &serde_json::Value) -> Self {
        let envelope = match body {
            serde_json::Value::Array(items) => items.iter().find(|item| item.get("error").is_some()),
            other => Some(other),
        };
        envelope
            .and_then(|envelope| envelope.get("error"))
            .and_then(|error| serde_json::from_value(error.clone()).ok())
            .unwrap_or_default()
    }
}

//=========================================================================================
// Document <-> Domain Mapping
//=========================================================================================

fn user_from(doc: &Document) -> PortResult<User> {
    Ok(User {
        id: doc.id().to_string(),
        name: doc.string("name")?,
        avatar: doc.optional_string("avatar").unwrap_or_default(),
    })
}

fn task_from(doc: &Document) -> PortResult<Task> {
    let day = doc.integer("dayOfWeek")?;
    let day = u8::try_from(day)
        .map_err(|_| PortError::Unexpected(format!("bad dayOfWeek {} in {}", day, doc.name)))?;
    Ok(Task {
        id: doc.id().to_string(),
        child_id: doc.string("childId")?,
        title: doc.string("title")?,
        day_of_week: DayOfWeek::new(day)?,
    })
}

fn task_fields(child_id: &str, title: &str, day: DayOfWeek) -> Fields {
    Fields::from([
        ("childId".to_string(), Value::string(child_id)),
        ("title".to_string(), Value::string(title)),
        ("dayOfWeek".to_string(), Value::integer(i64::from(day.value()))),
    ])
}

fn record_from(doc: &Document) -> PortResult<Record> {
    let date = doc.string("date")?;
    let date = NaiveDate::parse_from_str(&date, "%Y-%m-%d")
        .map_err(|e| PortError::Unexpected(format!("bad date '{}' in {}: {}", date, doc.name, e)))?;
    Ok(Record {
        id: doc.id().to_string(),
        child_id: doc.string("childId")?,
        task_id: doc.string("taskId")?,
        status: RecordStatus::parse(&doc.string("status")?)?,
        reason: doc.optional_string("reason"),
        date,
    })
}

fn record_fields(record: &NewRecord) -> Fields {
    let mut fields = Fields::from([
        ("childId".to_string(), Value::string(&record.child_id)),
        ("taskId".to_string(), Value::string(&record.task_id)),
        ("status".to_string(), Value::string(record.status.as_str())),
        ("date".to_string(), Value::string(&record.date.format("%Y-%m-%d").to_string())),
    ]);
    if let Some(reason) = &record.reason {
        fields.insert("reason".to_string(), Value::string(reason));
    }
    fields
}

/// One `fieldFilter` of a structured query.
fn field_filter(field: &str, op: &str, value: Value) -> serde_json::Value {
    json!({ "fieldFilter": { "field": { "fieldPath": field }, "op": op, "value": value } })
}

/// A structured query over one collection, AND-ing the given filters.
fn structured_query(collection: &str, mut filters: Vec<serde_json::Value>) -> serde_json::Value {
    let mut query = json!({ "from": [{ "collectionId": collection }] });
    match filters.len() {
        0 => {}
        1 => query["where"] = filters.remove(0),
        _ => {
            query["where"] = json!({ "compositeFilter": { "op": "AND", "filters": filters } });
        }
    }
    json!({ "structuredQuery": query })
}

//=========================================================================================
// Error Mapping
//=========================================================================================

/// Maps an HTTP status and Firestore error body onto the port's error taxonomy.
pub fn classify_response(status: StatusCode, body: &ErrorBody) -> PortError {
    let detail = if body.message.is_empty() {
        format!("HTTP {}", status)
    } else {
        format!("{} ({})", body.message, body.status)
    };
    let message = body.message.to_lowercase();

    // A project without a Firestore database, or with the API switched off.
    // Missing documents also name ".../databases/(default)/...", so only the
    // database-level wording counts here.
    let missing_database = message.contains("the database") && message.contains("does not exist");
    let api_disabled = message.contains("has not been used") || message.contains("is disabled");
    if missing_database || api_disabled {
        return PortError::Unprovisioned(detail);
    }

    match status {
        StatusCode::BAD_REQUEST if body.status == "INVALID_ARGUMENT" && message.contains("api key") => {
            PortError::Unauthorized(detail)
        }
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
        PortError::Unexpected(format!("unreadable Firestore response: {}", e))
    } else {
        PortError::Unexpected(e.to_string())
    }
}

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements the `BackendService` port using the Firestore REST API.
#[derive(Clone)]
pub struct FirestoreAdapter {
    client: Client,
    project_id: String,
    api_key: String,
    base_url: String,
}

impl FirestoreAdapter {
    /// Creates a new `FirestoreAdapter` for the given Firebase project.
    pub fn new(project_id: &str, api_key: &str, request_timeout: Duration) -> PortResult<Self> {
        Self::with_base_url(FIRESTORE_ROOT, project_id, api_key, request_timeout)
    }

    /// Points the adapter at another Firestore-compatible root, e.g. the emulator.
    pub fn with_base_url(
        root: &str,
        project_id: &str,
        api_key: &str,
        request_timeout: Duration,
    ) -> PortResult<Self> {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| PortError::Unexpected(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            project_id: project_id.to_string(),
            api_key: api_key.to_string(),
            base_url: root.trim_end_matches('/').to_string(),
        })
    }

    /// The resource name of the database's document root.
    fn documents_root(&self) -> String {
        format!("projects/{}/databases/(default)/documents", self.project_id)
    }

    fn document_name(&self, collection: &str, id: &str) -> String {
        format!("{}/{}/{}", self.documents_root(), collection, id)
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    /// Sends a request and decodes the JSON body, mapping failures.
    /// `Ok(None)` is returned for a 404 when `allow_missing` is set.
    async fn send<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<serde_json::Value>,
        allow_missing: bool,
    ) -> PortResult<Option<T>> {
        let mut request = self
            .client
            .request(method, self.url(path))
            .query(&[("key", self.api_key.as_str())])
            .query(query);
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await.map_err(map_transport_error)?;
        let status = response.status();
        if status.is_success() {
            let decoded = response.json::<T>().await.map_err(map_transport_error)?;
            return Ok(Some(decoded));
        }

        let body = response
            .json::<serde_json::Value>()
            .await
            .map(|raw| ErrorBody::from_json(&raw))
            .unwrap_or_default();
        let err = classify_response(status, &body);
        match err {
            PortError::NotFound(_) if allow_missing => Ok(None),
            err => Err(err),
        }
    }

    async fn run_query(&self, query: serde_json::Value) -> PortResult<Vec<Document>> {
        self.run_query_in(query, None).await
    }

    /// Runs a structured query, inside `transaction` when one is given.
    async fn run_query_in(
        &self,
        mut query: serde_json::Value,
        transaction: Option<&str>,
    ) -> PortResult<Vec<Document>> {
        let path = format!("{}:runQuery", self.documents_root());
        if let Some(transaction) = transaction {
            query["transaction"] = json!(transaction);
        }
        let items: Vec<RunQueryItem> = self
            .send(Method::POST, &path, &[], Some(query), false)
            .await?
            .unwrap_or_default();
        Ok(items.into_iter().filter_map(|item| item.document).collect())
    }

    async fn create_document(&self, collection: &str, fields: Fields) -> PortResult<Document> {
        let path = format!("{}/{}", self.documents_root(), collection);
        self.send(Method::POST, &path, &[], Some(json!({ "fields": fields })), false)
            .await?
            .ok_or_else(|| PortError::Unexpected("Firestore returned no document".to_string()))
    }

    async fn delete_document(&self, collection: &str, id: &str) -> PortResult<()> {
        let path = self.document_name(collection, id);
        // Deleting a missing document succeeds in Firestore; the body is `{}`.
        let _: Option<serde_json::Value> =
            self.send(Method::DELETE, &path, &[], None, true).await?;
        Ok(())
    }

    async fn begin_transaction(&self) -> PortResult<String> {
        let path = format!("{}:beginTransaction", self.documents_root());
        let begun: Option<BeginTransaction> = self
            .send(Method::POST, &path, &[], Some(json!({})), false)
            .await?;
        begun
            .map(|begun| begun.transaction)
            .ok_or_else(|| PortError::Unexpected("Firestore returned no transaction".to_string()))
    }

    /// Best effort; an abandoned transaction also expires on the server.
    async fn rollback(&self, transaction: &str) {
        let path = format!("{}:rollback", self.documents_root());
        let result: PortResult<Option<serde_json::Value>> = self
            .send(Method::POST, &path, &[], Some(json!({ "transaction": transaction })), false)
            .await;
        if let Err(e) = result {
            tracing::warn!("Failed to roll back Firestore transaction: {}", e);
        }
    }

    async fn commit(&self, writes: Vec<serde_json::Value>, transaction: Option<&str>) -> PortResult<()> {
        let path = format!("{}:commit", self.documents_root());
        let mut body = json!({ "writes": writes });
        if let Some(transaction) = transaction {
            body["transaction"] = json!(transaction);
        }
        let _: Option<serde_json::Value> = self
            .send(Method::POST, &path, &[], Some(body), false)
            .await?;
        Ok(())
    }

    async fn query_tasks(
        &self,
        child_id: &str,
        day: Option<DayOfWeek>,
        transaction: Option<&str>,
    ) -> PortResult<Vec<Document>> {
        let mut filters = vec![field_filter("childId", "EQUAL", Value::string(child_id))];
        if let Some(day) = day {
            filters.push(field_filter("dayOfWeek", "EQUAL", Value::integer(i64::from(day.value()))));
        }
        self.run_query_in(structured_query(TASKS, filters), transaction).await
    }

    /// Reads both days and builds the batch inside `transaction`.
    async fn prepare_copy(
        &self,
        child_id: &str,
        from: DayOfWeek,
        to: DayOfWeek,
        transaction: &str,
    ) -> PortResult<(usize, Vec<serde_json::Value>)> {
        let sources = self.query_tasks(child_id, Some(from), Some(transaction)).await?;
        if sources.is_empty() {
            return Err(PortError::Validation(format!("there are no tasks on {} to copy", from)));
        }
        let targets = self.query_tasks(child_id, Some(to), Some(transaction)).await?;
        let writes = copy_writes(self, &sources, &targets, child_id, to)?;
        Ok((sources.len(), writes))
    }
}

/// Builds the batch that replaces the target day's tasks with copies of `sources`.
fn copy_writes(
    adapter: &FirestoreAdapter,
    sources: &[Document],
    targets: &[Document],
    child_id: &str,
    to: DayOfWeek,
) -> PortResult<Vec<serde_json::Value>> {
    let mut writes = Vec::with_capacity(sources.len() + targets.len());
    for target in targets {
        writes.push(json!({ "delete": target.name }));
    }
    for source in sources {
        let title = source.string("title")?;
        let name = adapter.document_name(TASKS, &Uuid::new_v4().simple().to_string());
        writes.push(json!({
            "update": { "name": name, "fields": task_fields(child_id, &title, to) },
            "currentDocument": { "exists": false }
        }));
    }
    Ok(writes)
}

//=========================================================================================
// `BackendService` Trait Implementation
//=========================================================================================

#[async_trait]
impl BackendService for FirestoreAdapter {
    fn kind(&self) -> &'static str {
        "firestore"
    }

    async fn list_users(&self) -> PortResult<Vec<User>> {
        let docs = self.run_query(structured_query(USERS, Vec::new())).await?;
        docs.iter().map(user_from).collect()
    }

    async fn create_user(&self, name: &str, avatar: &str) -> PortResult<User> {
        let fields = Fields::from([
            ("name".to_string(), Value::string(name)),
            ("avatar".to_string(), Value::string(avatar)),
        ]);
        let doc = self.create_document(USERS, fields).await?;
        user_from(&doc)
    }

    async fn list_tasks(&self, child_id: &str, day: Option<DayOfWeek>) -> PortResult<Vec<Task>> {
        let docs = self.query_tasks(child_id, day, None).await?;
        docs.iter().map(task_from).collect()
    }

    async fn create_task(&self, child_id: &str, title: &str, day: DayOfWeek) -> PortResult<Task> {
        let doc = self
            .create_document(TASKS, task_fields(child_id, title, day))
            .await?;
        task_from(&doc)
    }

    async fn delete_task(&self, task_id: &str) -> PortResult<()> {
        self.delete_document(TASKS, task_id).await
    }

    /// Reads both days inside a read-write transaction, then deletes and
    /// recreates in the transaction's `commit`. Firestore rejects the commit
    /// if either day changed after it was read.
    async fn copy_tasks_atomic(
        &self,
        child_id: &str,
        from: DayOfWeek,
        to: DayOfWeek,
    ) -> PortResult<usize> {
        let transaction = self.begin_transaction().await?;
        let (copied, writes) = match self.prepare_copy(child_id, from, to, &transaction).await {
            Ok(prepared) => prepared,
            Err(e) => {
                self.rollback(&transaction).await;
                return Err(e);
            }
        };
        self.commit(writes, Some(&transaction)).await?;
        Ok(copied)
    }

    async fn list_records(&self, child_id: &str, date: NaiveDate) -> PortResult<Vec<Record>> {
        let filters = vec![
            field_filter("childId", "EQUAL", Value::string(child_id)),
            field_filter("date", "EQUAL", Value::string(&date.format("%Y-%m-%d").to_string())),
        ];
        let docs = self.run_query(structured_query(RECORDS, filters)).await?;
        docs.iter().map(record_from).collect()
    }

    /// Dates are stored as `YYYY-MM-DD` strings, so string range comparison
    /// selects the right days.
    async fn list_records_in_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> PortResult<Vec<Record>> {
        let filters = vec![
            field_filter(
                "date",
                "GREATER_THAN_OR_EQUAL",
                Value::string(&start.format("%Y-%m-%d").to_string()),
            ),
            field_filter(
                "date",
                "LESS_THAN_OR_EQUAL",
                Value::string(&end.format("%Y-%m-%d").to_string()),
            ),
        ];
        let docs = self.run_query(structured_query(RECORDS, filters)).await?;
        docs.iter().map(record_from).collect()
    }

    async fn create_record(&self, record: NewRecord) -> PortResult<Record> {
        let doc = self.create_document(RECORDS, record_fields(&record)).await?;
        record_from(&doc)
    }

    async fn delete_record(&self, record_id: &str) -> PortResult<()> {
        self.delete_document(RECORDS, record_id).await
    }

    async fn get_parent_pin(&self) -> PortResult<String> {
        let path = self.document_name(SETTINGS, SETTINGS_ID);
        let doc: Option<Document> = self.send(Method::GET, &path, &[], None, true).await?;
        Ok(doc
            .and_then(|doc| doc.optional_string("parentPin"))
            .filter(|pin| !pin.is_empty())
            .unwrap_or_else(|| DEFAULT_PARENT_PIN.to_string()))
    }

    /// Upserts the settings document, touching only `parentPin`.
    async fn set_parent_pin(&self, pin: &str) -> PortResult<()> {
        let path = self.document_name(SETTINGS, SETTINGS_ID);
        let fields = Fields::from([("parentPin".to_string(), Value::string(pin))]);
        let _: Option<Document> = self
            .send(
                Method::PATCH,
                &path,
                &[("updateMask.fieldPaths", "parentPin")],
                Some(json!({ "fields": fields })),
                false,
            )
            .await?;
        Ok(())
    }
}
