//! services/api/src/web/middleware.rs
//!
//! Access middleware for the parent-only routes.

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use chore_tracker_core::ViewState;
use std::sync::Arc;
use tracing::warn;

use crate::web::state::AppState;

/// Admits a request only while the parent screens are open, or while the
/// household is being set up (no children yet, so no PIN gate to pass).
///
/// Anything else gets 403 Forbidden.
pub async fn require_parent_access(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let view = state.view.lock().await.state();
    match view {
        ViewState::Parent | ViewState::Setup => Ok(next.run(req).await),
        other => {
            warn!(
                "Refused {} {} from the {:?} view.",
                req.method(),
                req.uri().path(),
                other
            );
            Err(StatusCode::FORBIDDEN)
        }
    }
}
