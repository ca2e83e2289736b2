//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the REST API endpoints and the master
//! definition for the OpenAPI specification.

use crate::adapters::{firestore, supabase};
use crate::config::BackendCredentials;
use crate::web::connection;
use crate::web::state::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use chore_tracker_core::domain::DayOfWeek;
use chore_tracker_core::ports::PortError;
use chore_tracker_core::{PinOutcome, TransitionError};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};
use utoipa::{IntoParams, OpenApi, ToSchema};

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        get_view_handler,
        submit_config_handler,
        reset_config_handler,
        escape_config_handler,
        setup_instructions_handler,
        probe_handler,
        select_child_handler,
        open_pin_gate_handler,
        close_pin_gate_handler,
        submit_pin_handler,
        logout_handler,
        list_users_handler,
        create_user_handler,
        list_tasks_handler,
        create_task_handler,
        delete_task_handler,
        copy_routine_handler,
        checklist_handler,
        check_task_handler,
        pass_task_handler,
        delete_record_handler,
        weekly_stats_handler,
        change_pin_handler,
    ),
    components(
        schemas(
            BackendCredentials,
            SetupInstructions,
            SelectChildRequest,
            PinRequest,
            CreateUserRequest,
            CreateTaskRequest,
            CopyRoutineRequest,
            CopyRoutineResponse,
            CheckTaskRequest,
            PassTaskRequest,
            ChangePinRequest,
        )
    ),
    tags(
        (name = "Chore Tracker API", description = "Daily routines, check-offs and weekly progress for a household.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// API Payload Structs
//=========================================================================================

/// What the setup-instructions screen shows for the configured backend.
#[derive(Serialize, ToSchema)]
pub struct SetupInstructions {
    /// `firestore`, `supabase`, or absent when nothing is configured.
    backend: Option<String>,
    /// Collections to create in the Firestore database.
    collections: Vec<String>,
    /// SQL to run in the Supabase SQL editor.
    sql: String,
}

#[derive(Deserialize, ToSchema)]
pub struct SelectChildRequest {
    child_id: String,
}

#[derive(Deserialize, ToSchema)]
pub struct PinRequest {
    pin: String,
}

#[derive(Deserialize, ToSchema)]
pub struct CreateUserRequest {
    name: String,
    #[serde(default)]
    avatar: String,
}

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct TasksQuery {
    child_id: String,
    /// 0 = Sunday .. 6 = Saturday
    #[param(value_type = u8)]
    day: DayOfWeek,
}

#[derive(Deserialize, ToSchema)]
pub struct CreateTaskRequest {
    child_id: String,
    title: String,
    #[schema(value_type = u8)]
    day_of_week: DayOfWeek,
}

#[derive(Deserialize, ToSchema)]
pub struct CopyRoutineRequest {
    child_id: String,
    #[schema(value_type = u8)]
    from_day: DayOfWeek,
    #[schema(value_type = u8)]
    to_day: DayOfWeek,
}

#[derive(Serialize, ToSchema)]
pub struct CopyRoutineResponse {
    copied: usize,
}

/// A child and a day; the day defaults to today.
#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ChildDayQuery {
    child_id: String,
    date: Option<NaiveDate>,
}

#[derive(Deserialize, ToSchema)]
pub struct CheckTaskRequest {
    child_id: String,
    task_id: String,
    date: Option<NaiveDate>,
}

#[derive(Deserialize, ToSchema)]
pub struct PassTaskRequest {
    child_id: String,
    task_id: String,
    date: Option<NaiveDate>,
    reason: String,
}

#[derive(Deserialize, ToSchema)]
pub struct ChangePinRequest {
    pin: String,
    confirmation: String,
}

//=========================================================================================
// Error Mapping
//=========================================================================================

type HandlerError = (StatusCode, String);

/// Maps a port error onto an HTTP status and logs it.
pub fn port_error_response(context: &str, e: PortError) -> HandlerError {
    let status = match &e {
        PortError::NotConfigured => StatusCode::SERVICE_UNAVAILABLE,
        PortError::Unprovisioned(_) => StatusCode::FAILED_DEPENDENCY,
        PortError::Unavailable(_) => StatusCode::BAD_GATEWAY,
        PortError::Validation(_) => StatusCode::BAD_REQUEST,
        PortError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        PortError::NotFound(_) => StatusCode::NOT_FOUND,
        PortError::Busy(_) => StatusCode::CONFLICT,
        PortError::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        error!("{}: {:?}", context, e);
    } else {
        warn!("{}: {}", context, e);
    }
    (status, e.to_string())
}

fn transition_error_response(e: TransitionError) -> HandlerError {
    let status = match e {
        TransitionError::NotAllowed { .. } => StatusCode::CONFLICT,
        TransitionError::UnknownChild(_) => StatusCode::NOT_FOUND,
    };
    warn!("Refused view transition: {}", e);
    (status, e.to_string())
}

fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

//=========================================================================================
// Connection and View Handlers
//=========================================================================================

/// The current view snapshot: which screen to show and what it needs.
#[utoipa::path(
    get,
    path = "/view",
    responses((status = 200, description = "The current view snapshot"))
)]
pub async fn get_view_handler(State(app_state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(app_state.view.lock().await.snapshot())
}

/// Submit backend credentials. A valid set replaces the backend handle and
/// re-runs the probe; the response is the view it ended in.
#[utoipa::path(
    post,
    path = "/config",
    request_body = BackendCredentials,
    responses((status = 200, description = "The view after the probe (config on failure)"))
)]
pub async fn submit_config_handler(
    State(app_state): State<Arc<AppState>>,
    Json(credentials): Json<BackendCredentials>,
) -> impl IntoResponse {
    Json(connection::configure(app_state, credentials).await)
}

/// Drop the backend handle and return to the config view.
#[utoipa::path(
    post,
    path = "/config/reset",
    responses((status = 200, description = "The not-configured config view"))
)]
pub async fn reset_config_handler(State(app_state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(connection::reset(&app_state).await)
}

/// Jump to the config view, abandoning a probe that is taking too long.
#[utoipa::path(
    post,
    path = "/config/escape",
    responses((status = 200, description = "The config view"))
)]
pub async fn escape_config_handler(State(app_state): State<Arc<AppState>>) -> impl IntoResponse {
    let mut view = app_state.view.lock().await;
    view.escape_to_config();
    info!("Client escaped to the config view.");
    Json(view.snapshot())
}

/// What to provision: the Firestore collections and the Supabase SQL.
#[utoipa::path(
    get,
    path = "/config/setup-instructions",
    responses((status = 200, description = "Provisioning instructions", body = SetupInstructions))
)]
pub async fn setup_instructions_handler(
    State(app_state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let backend = app_state.backend().await.ok().map(|b| b.kind().to_string());
    Json(SetupInstructions {
        backend,
        collections: firestore::COLLECTIONS.iter().map(|c| c.to_string()).collect(),
        sql: supabase::SCHEMA_SQL.to_string(),
    })
}

/// Re-run the probe with the current backend handle.
#[utoipa::path(
    post,
    path = "/probe",
    responses((status = 200, description = "The view after the probe"))
)]
pub async fn probe_handler(State(app_state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(connection::probe(app_state).await)
}

//=========================================================================================
// Login Handlers
//=========================================================================================

#[utoipa::path(
    post,
    path = "/login/child",
    request_body = SelectChildRequest,
    responses(
        (status = 200, description = "The child view"),
        (status = 404, description = "No such child"),
        (status = 409, description = "Not on the login screen")
    )
)]
pub async fn select_child_handler(
    State(app_state): State<Arc<AppState>>,
    Json(payload): Json<SelectChildRequest>,
) -> Result<impl IntoResponse, HandlerError> {
    let mut view = app_state.view.lock().await;
    let child = view
        .select_child(&payload.child_id)
        .map_err(transition_error_response)?;
    info!("Child {} logged in.", child.id);
    Ok(Json(view.snapshot()))
}

/// Open the parent PIN gate with an empty input.
#[utoipa::path(
    post,
    path = "/login/parent/open",
    responses(
        (status = 200, description = "The login view with the gate open"),
        (status = 409, description = "Not on the login screen")
    )
)]
pub async fn open_pin_gate_handler(
    State(app_state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, HandlerError> {
    let mut view = app_state.view.lock().await;
    view.open_pin_gate().map_err(transition_error_response)?;
    Ok(Json(view.snapshot()))
}

#[utoipa::path(
    post,
    path = "/login/parent/close",
    responses((status = 200, description = "The login view with the gate closed"))
)]
pub async fn close_pin_gate_handler(State(app_state): State<Arc<AppState>>) -> impl IntoResponse {
    let mut view = app_state.view.lock().await;
    view.close_pin_gate();
    Json(view.snapshot())
}

/// Submit the parent PIN. A match opens the parent view; a mismatch clears
/// the input and keeps the gate open.
#[utoipa::path(
    post,
    path = "/login/parent",
    request_body = PinRequest,
    responses(
        (status = 200, description = "The parent view"),
        (status = 401, description = "Incorrect PIN"),
        (status = 409, description = "The PIN gate is not open")
    )
)]
pub async fn submit_pin_handler(
    State(app_state): State<Arc<AppState>>,
    Json(payload): Json<PinRequest>,
) -> Result<impl IntoResponse, HandlerError> {
    app_state
        .view
        .lock()
        .await
        .set_pin_input(&payload.pin)
        .map_err(transition_error_response)?;

    // A failed read leaves the gate open with the typed input.
    let household = app_state
        .household()
        .await
        .map_err(|e| port_error_response("Failed to read the parent PIN", e))?;
    let stored = household
        .parent_pin()
        .await
        .map_err(|e| port_error_response("Failed to read the parent PIN", e))?;

    let mut view = app_state.view.lock().await;
    match view.submit_pin(&stored).map_err(transition_error_response)? {
        PinOutcome::Granted => {
            info!("Parent view unlocked.");
            Ok(Json(view.snapshot()))
        }
        PinOutcome::Denied => {
            warn!("Incorrect parent PIN entered.");
            Err((StatusCode::UNAUTHORIZED, "Incorrect PIN".to_string()))
        }
    }
}

/// Leave the child or parent view for the login screen.
#[utoipa::path(
    post,
    path = "/logout",
    responses(
        (status = 200, description = "The login view"),
        (status = 409, description = "Nobody is logged in")
    )
)]
pub async fn logout_handler(
    State(app_state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, HandlerError> {
    let mut view = app_state.view.lock().await;
    view.back_to_login().map_err(transition_error_response)?;
    Ok(Json(view.snapshot()))
}

//=========================================================================================
// Profile Handlers
//=========================================================================================

#[utoipa::path(
    get,
    path = "/users",
    responses((status = 200, description = "Every child profile"))
)]
pub async fn list_users_handler(
    State(app_state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, HandlerError> {
    let household = app_state
        .household()
        .await
        .map_err(|e| port_error_response("Failed to list users", e))?;
    let users = household
        .children()
        .await
        .map_err(|e| port_error_response("Failed to list users", e))?;
    app_state.view.lock().await.refresh_users(users.clone());
    Ok(Json(users))
}

/// Add a child profile (parent only).
#[utoipa::path(
    post,
    path = "/users",
    request_body = CreateUserRequest,
    responses(
        (status = 201, description = "The new child"),
        (status = 400, description = "Blank name"),
        (status = 403, description = "Parent access required")
    )
)]
pub async fn create_user_handler(
    State(app_state): State<Arc<AppState>>,
    Json(payload): Json<CreateUserRequest>,
) -> Result<impl IntoResponse, HandlerError> {
    let household = app_state
        .household()
        .await
        .map_err(|e| port_error_response("Failed to create user", e))?;
    let user = household
        .add_child(&payload.name, &payload.avatar)
        .await
        .map_err(|e| port_error_response("Failed to create user", e))?;

    match household.children().await {
        Ok(users) => app_state.view.lock().await.refresh_users(users),
        Err(e) => warn!("Created user {} but could not refresh the list: {}", user.id, e),
    }
    Ok((StatusCode::CREATED, Json(user)))
}

//=========================================================================================
// Routine Handlers
//=========================================================================================

/// A child's routine for one day.
#[utoipa::path(
    get,
    path = "/tasks",
    params(TasksQuery),
    responses((status = 200, description = "The tasks, empty when the read failed"))
)]
pub async fn list_tasks_handler(
    State(app_state): State<Arc<AppState>>,
    Query(query): Query<TasksQuery>,
) -> Result<impl IntoResponse, HandlerError> {
    let routines = app_state
        .routines()
        .await
        .map_err(|e| port_error_response("Failed to list tasks", e))?;
    let tasks = routines
        .routine(&query.child_id, query.day)
        .await
        .map_err(|e| port_error_response("Failed to list tasks", e))?;
    Ok(Json(tasks))
}

#[utoipa::path(
    post,
    path = "/tasks",
    request_body = CreateTaskRequest,
    responses(
        (status = 201, description = "The new task"),
        (status = 400, description = "Blank title or no child"),
        (status = 403, description = "Parent access required")
    )
)]
pub async fn create_task_handler(
    State(app_state): State<Arc<AppState>>,
    Json(payload): Json<CreateTaskRequest>,
) -> Result<impl IntoResponse, HandlerError> {
    let routines = app_state
        .routines()
        .await
        .map_err(|e| port_error_response("Failed to create task", e))?;
    let task = routines
        .add_task(&payload.child_id, &payload.title, payload.day_of_week)
        .await
        .map_err(|e| port_error_response("Failed to create task", e))?;
    Ok((StatusCode::CREATED, Json(task)))
}

#[utoipa::path(
    delete,
    path = "/tasks/{id}",
    params(("id" = String, Path, description = "The task id")),
    responses(
        (status = 204, description = "Deleted (or already gone)"),
        (status = 403, description = "Parent access required")
    )
)]
pub async fn delete_task_handler(
    State(app_state): State<Arc<AppState>>,
    Path(task_id): Path<String>,
) -> Result<impl IntoResponse, HandlerError> {
    let routines = app_state
        .routines()
        .await
        .map_err(|e| port_error_response("Failed to delete task", e))?;
    routines
        .delete_task(&task_id)
        .await
        .map_err(|e| port_error_response("Failed to delete task", e))?;
    Ok(StatusCode::NO_CONTENT)
}

/// Replace one day's routine with a copy of another day's.
#[utoipa::path(
    post,
    path = "/routines/copy",
    request_body = CopyRoutineRequest,
    responses(
        (status = 200, description = "Copied", body = CopyRoutineResponse),
        (status = 400, description = "Same day, or nothing to copy"),
        (status = 403, description = "Parent access required"),
        (status = 409, description = "A copy for this child is already running")
    )
)]
pub async fn copy_routine_handler(
    State(app_state): State<Arc<AppState>>,
    Json(payload): Json<CopyRoutineRequest>,
) -> Result<impl IntoResponse, HandlerError> {
    let routines = app_state
        .routines()
        .await
        .map_err(|e| port_error_response("Failed to copy routine", e))?;
    let copied = routines
        .copy_routine(&payload.child_id, payload.from_day, payload.to_day)
        .await
        .map_err(|e| port_error_response("Failed to copy routine", e))?;
    Ok(Json(CopyRoutineResponse { copied }))
}

//=========================================================================================
// Checklist Handlers
//=========================================================================================

/// A child's checklist for a day (today by default).
#[utoipa::path(
    get,
    path = "/checklist",
    params(ChildDayQuery),
    responses((status = 200, description = "The day's tasks with their records and progress"))
)]
pub async fn checklist_handler(
    State(app_state): State<Arc<AppState>>,
    Query(query): Query<ChildDayQuery>,
) -> Result<impl IntoResponse, HandlerError> {
    let checklist = app_state
        .checklist()
        .await
        .map_err(|e| port_error_response("Failed to load the checklist", e))?;
    let day = checklist
        .load(&query.child_id, query.date.unwrap_or_else(today))
        .await
        .map_err(|e| port_error_response("Failed to load the checklist", e))?;
    Ok(Json(day))
}

#[utoipa::path(
    post,
    path = "/checklist/check",
    request_body = CheckTaskRequest,
    responses((status = 201, description = "The new done record"))
)]
pub async fn check_task_handler(
    State(app_state): State<Arc<AppState>>,
    Json(payload): Json<CheckTaskRequest>,
) -> Result<impl IntoResponse, HandlerError> {
    let checklist = app_state
        .checklist()
        .await
        .map_err(|e| port_error_response("Failed to check off the task", e))?;
    let record = checklist
        .check(&payload.child_id, &payload.task_id, payload.date.unwrap_or_else(today))
        .await
        .map_err(|e| port_error_response("Failed to check off the task", e))?;
    Ok((StatusCode::CREATED, Json(record)))
}

/// Excuse a task for the day. The reason is required.
#[utoipa::path(
    post,
    path = "/checklist/pass",
    request_body = PassTaskRequest,
    responses(
        (status = 201, description = "The new pass record"),
        (status = 400, description = "Blank reason")
    )
)]
pub async fn pass_task_handler(
    State(app_state): State<Arc<AppState>>,
    Json(payload): Json<PassTaskRequest>,
) -> Result<impl IntoResponse, HandlerError> {
    let checklist = app_state
        .checklist()
        .await
        .map_err(|e| port_error_response("Failed to pass the task", e))?;
    let record = checklist
        .pass(
            &payload.child_id,
            &payload.task_id,
            payload.date.unwrap_or_else(today),
            &payload.reason,
        )
        .await
        .map_err(|e| port_error_response("Failed to pass the task", e))?;
    Ok((StatusCode::CREATED, Json(record)))
}

/// Undo a check-off or pass.
#[utoipa::path(
    delete,
    path = "/records/{id}",
    params(("id" = String, Path, description = "The record id")),
    responses((status = 204, description = "Deleted (or already gone)"))
)]
pub async fn delete_record_handler(
    State(app_state): State<Arc<AppState>>,
    Path(record_id): Path<String>,
) -> Result<impl IntoResponse, HandlerError> {
    let checklist = app_state
        .checklist()
        .await
        .map_err(|e| port_error_response("Failed to delete record", e))?;
    checklist
        .undo(&record_id)
        .await
        .map_err(|e| port_error_response("Failed to delete record", e))?;
    Ok(StatusCode::NO_CONTENT)
}

//=========================================================================================
// Stats and Settings Handlers
//=========================================================================================

/// Seven chart rows and seven log rows for the week containing `date`.
#[utoipa::path(
    get,
    path = "/stats/weekly",
    params(ChildDayQuery),
    responses(
        (status = 200, description = "The weekly report"),
        (status = 403, description = "Parent access required")
    )
)]
pub async fn weekly_stats_handler(
    State(app_state): State<Arc<AppState>>,
    Query(query): Query<ChildDayQuery>,
) -> Result<impl IntoResponse, HandlerError> {
    let stats = app_state
        .stats()
        .await
        .map_err(|e| port_error_response("Failed to build the weekly report", e))?;
    let report = stats
        .weekly_report(&query.child_id, query.date.unwrap_or_else(today))
        .await
        .map_err(|e| port_error_response("Failed to build the weekly report", e))?;
    Ok(Json(report))
}

#[utoipa::path(
    put,
    path = "/settings/pin",
    request_body = ChangePinRequest,
    responses(
        (status = 204, description = "PIN changed"),
        (status = 400, description = "Not four digits, or the confirmation differs"),
        (status = 403, description = "Parent access required")
    )
)]
pub async fn change_pin_handler(
    State(app_state): State<Arc<AppState>>,
    Json(payload): Json<ChangePinRequest>,
) -> Result<impl IntoResponse, HandlerError> {
    let household = app_state
        .household()
        .await
        .map_err(|e| port_error_response("Failed to change the PIN", e))?;
    household
        .change_pin(&payload.pin, &payload.confirmation)
        .await
        .map_err(|e| port_error_response("Failed to change the PIN", e))?;
    Ok(StatusCode::NO_CONTENT)
}
