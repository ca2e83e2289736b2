//! services/api/src/adapters/mod.rs
//!
//! The two `BackendService` implementations and the factory that picks one
//! for a set of credentials.

pub mod firestore;
pub mod supabase;

pub use firestore::FirestoreAdapter;
pub use supabase::SupabaseAdapter;

use crate::config::BackendCredentials;
use chore_tracker_core::ports::{BackendService, PortResult};
use std::sync::Arc;
use std::time::Duration;

/// Builds a backend handle for the given credentials.
///
/// Nothing is contacted here; the first real request is the probe. `timeout`
/// bounds each HTTP request.
pub fn connect(
    credentials: &BackendCredentials,
    timeout: Duration,
) -> PortResult<Arc<dyn BackendService>> {
    match credentials {
        BackendCredentials::Firestore { project_id, api_key } => {
            Ok(Arc::new(FirestoreAdapter::new(project_id, api_key, timeout)?))
        }
        BackendCredentials::Supabase { url, anon_key } => {
            Ok(Arc::new(SupabaseAdapter::new(url, anon_key, timeout)?))
        }
    }
}
