pub mod connection;
pub mod middleware;
pub mod rest;
pub mod state;

pub use middleware::require_parent_access;
pub use state::AppState;

use axum::{
    middleware as axum_middleware,
    routing::{delete, get, post, put},
    Router,
};
use std::sync::Arc;

use rest::*;

/// Builds the API router. CORS and the Swagger UI are layered on by the binary.
///
/// Parent-only endpoints (profile, routine and settings changes, weekly stats)
/// carry the `require_parent_access` layer on their own method router, since
/// some share a path with an open endpoint.
pub fn router(app_state: Arc<AppState>) -> Router {
    let parent_only =
        axum_middleware::from_fn_with_state(app_state.clone(), require_parent_access);

    Router::new()
        // Connection and view
        .route("/view", get(get_view_handler))
        .route("/config", post(submit_config_handler))
        .route("/config/reset", post(reset_config_handler))
        .route("/config/escape", post(escape_config_handler))
        .route("/config/setup-instructions", get(setup_instructions_handler))
        .route("/probe", post(probe_handler))
        // Login
        .route("/login/child", post(select_child_handler))
        .route("/login/parent/open", post(open_pin_gate_handler))
        .route("/login/parent/close", post(close_pin_gate_handler))
        .route("/login/parent", post(submit_pin_handler))
        .route("/logout", post(logout_handler))
        // Profiles and routines
        .route(
            "/users",
            get(list_users_handler)
                .merge(post(create_user_handler).route_layer(parent_only.clone())),
        )
        .route(
            "/tasks",
            get(list_tasks_handler)
                .merge(post(create_task_handler).route_layer(parent_only.clone())),
        )
        .route(
            "/tasks/{id}",
            delete(delete_task_handler).route_layer(parent_only.clone()),
        )
        .route(
            "/routines/copy",
            post(copy_routine_handler).route_layer(parent_only.clone()),
        )
        // Checklist
        .route("/checklist", get(checklist_handler))
        .route("/checklist/check", post(check_task_handler))
        .route("/checklist/pass", post(pass_task_handler))
        .route("/records/{id}", delete(delete_record_handler))
        // Stats and settings
        .route(
            "/stats/weekly",
            get(weekly_stats_handler).route_layer(parent_only.clone()),
        )
        .route(
            "/settings/pin",
            put(change_pin_handler).route_layer(parent_only),
        )
        .with_state(app_state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use axum::body::{to_bytes, Body};
    use axum::http::{Method, Request, StatusCode};
    use chore_tracker_core::ports::{BackendService, PortError};
    use chore_tracker_core::testing::MemoryBackend;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn app(backend: Option<Arc<MemoryBackend>>) -> (Router, Arc<AppState>) {
        let config = Arc::new(Config::default());
        let state = Arc::new(match backend {
            Some(backend) => AppState::with_backend(config, backend),
            None => AppState::new(config),
        });
        (router(state.clone()), state)
    }

    async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };
        (status, body)
    }

    #[tokio::test]
    async fn first_run_setup_then_parent_login() {
        let (app, _) = app(Some(Arc::new(MemoryBackend::new())));

        let (status, view) = send(&app, Method::POST, "/probe", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(view["view"], "setup");

        let (status, child) = send(
            &app,
            Method::POST,
            "/users",
            Some(json!({ "name": "Mina", "avatar": "🦊" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(child["name"], "Mina");

        let (_, view) = send(&app, Method::POST, "/probe", None).await;
        assert_eq!(view["view"], "login");

        let (_, view) = send(&app, Method::POST, "/login/parent/open", None).await;
        assert_eq!(view["pin_gate_open"], true);

        let (status, _) = send(&app, Method::POST, "/login/parent", Some(json!({ "pin": "1234" }))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let (_, view) = send(&app, Method::GET, "/view", None).await;
        assert_eq!(view["view"], "login");
        assert_eq!(view["pin_gate_open"], true);

        let (status, view) = send(&app, Method::POST, "/login/parent", Some(json!({ "pin": "0000" }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(view["view"], "parent");
        assert_eq!(view["pin_gate_open"], false);
    }

    #[tokio::test]
    async fn parent_routes_are_closed_outside_the_parent_view() {
        let memory = Arc::new(MemoryBackend::new());
        memory.create_user("Mina", "🦊").await.unwrap();
        let (app, _) = app(Some(memory.clone()));
        send(&app, Method::POST, "/probe", None).await;

        let (status, _) = send(
            &app,
            Method::POST,
            "/tasks",
            Some(json!({ "child_id": "user-1", "title": "Brush", "day_of_week": 1 })),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(memory.writes(), 1);

        // The open half of a shared path still answers.
        let (status, tasks) = send(&app, Method::GET, "/tasks?child_id=user-1&day=1", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(tasks, json!([]));
    }

    #[tokio::test]
    async fn parent_manages_routines_and_reads_the_week() {
        let memory = Arc::new(MemoryBackend::new());
        let (app, _) = app(Some(memory.clone()));
        send(&app, Method::POST, "/probe", None).await;
        let (_, child) = send(&app, Method::POST, "/users", Some(json!({ "name": "Mina", "avatar": "🦊" }))).await;
        let child_id = child["id"].as_str().unwrap().to_string();
        send(&app, Method::POST, "/probe", None).await;
        send(&app, Method::POST, "/login/parent/open", None).await;
        send(&app, Method::POST, "/login/parent", Some(json!({ "pin": "0000" }))).await;

        for title in ["Brush teeth", "Make bed"] {
            let (status, _) = send(
                &app,
                Method::POST,
                "/tasks",
                Some(json!({ "child_id": child_id, "title": title, "day_of_week": 3 })),
            )
            .await;
            assert_eq!(status, StatusCode::CREATED);
        }

        let (status, copied) = send(
            &app,
            Method::POST,
            "/routines/copy",
            Some(json!({ "child_id": child_id, "from_day": 3, "to_day": 4 })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(copied["copied"], 2);

        let (status, _) = send(
            &app,
            Method::POST,
            "/routines/copy",
            Some(json!({ "child_id": child_id, "from_day": 4, "to_day": 4 })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let wednesday_task = memory
            .tasks()
            .into_iter()
            .find(|t| t.day_of_week.value() == 3)
            .unwrap();
        let (status, _) = send(
            &app,
            Method::POST,
            "/checklist/check",
            Some(json!({ "child_id": child_id, "task_id": wednesday_task.id, "date": "2024-06-12" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let uri = format!("/stats/weekly?child_id={}&date=2024-06-12", child_id);
        let (status, report) = send(&app, Method::GET, &uri, None).await;
        assert_eq!(status, StatusCode::OK);
        let wednesday = &report["chart"][2];
        assert_eq!(wednesday["done"], 1);
        assert_eq!(wednesday["total"], 2);
        assert_eq!(wednesday["percentage"], 50);
    }

    #[tokio::test]
    async fn weekly_report_at_the_calendar_edge_is_a_bad_request() {
        let memory = Arc::new(MemoryBackend::new());
        let (app, _) = app(Some(memory.clone()));
        let (_, view) = send(&app, Method::POST, "/probe", None).await;
        assert_eq!(view["view"], "setup");

        let (status, _) = send(&app, Method::GET, "/stats/weekly?child_id=kid&date=%2B262142-12-31", None).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = send(&app, Method::GET, "/stats/weekly?child_id=kid&date=2024-06-12", None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn pass_without_a_reason_is_a_bad_request() {
        let (app, _) = app(Some(Arc::new(MemoryBackend::new())));
        let (status, _) = send(
            &app,
            Method::POST,
            "/checklist/pass",
            Some(json!({ "child_id": "kid", "task_id": "t1", "date": "2024-06-12", "reason": "  " })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn backend_failures_map_to_distinct_statuses() {
        let (unconfigured, _) = app(None);
        let (status, _) = send(&unconfigured, Method::GET, "/users", None).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

        let memory = Arc::new(MemoryBackend::new());
        memory.fail("list_users", PortError::Unprovisioned("no users table".to_string()));
        let (app, _) = app(Some(memory.clone()));
        let (status, _) = send(&app, Method::GET, "/users", None).await;
        assert_eq!(status, StatusCode::FAILED_DEPENDENCY);

        memory.fail("list_users", PortError::Unavailable("timeout".to_string()));
        let (status, _) = send(&app, Method::GET, "/users", None).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn reset_and_escape_both_land_in_config() {
        let (app, _) = app(Some(Arc::new(MemoryBackend::new())));
        let (_, view) = send(&app, Method::POST, "/config/escape", None).await;
        assert_eq!(view["view"], "config");

        let (_, view) = send(&app, Method::POST, "/config/reset", None).await;
        assert_eq!(view["issue"], "not_configured");
        let (_, instructions) = send(&app, Method::GET, "/config/setup-instructions", None).await;
        assert_eq!(instructions["backend"], Value::Null);
        assert!(instructions["sql"].as_str().unwrap().contains("create table"));
        assert_eq!(instructions["collections"][0], "users");
    }

    #[tokio::test]
    async fn login_actions_are_refused_while_connecting() {
        let (app, _) = app(Some(Arc::new(MemoryBackend::new())));
        let (status, _) = send(&app, Method::POST, "/login/child", Some(json!({ "child_id": "kid" }))).await;
        assert_eq!(status, StatusCode::CONFLICT);
        let (status, _) = send(&app, Method::POST, "/logout", None).await;
        assert_eq!(status, StatusCode::CONFLICT);
    }
}
