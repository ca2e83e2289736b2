//! crates/chore_tracker_core/src/household.rs
//!
//! Child profiles and the parent PIN.

use std::sync::Arc;
use tracing::info;

use crate::domain::User;
use crate::ports::{BackendService, PortError, PortResult};

#[derive(Clone)]
pub struct HouseholdService {
    backend: Arc<dyn BackendService>,
}

impl HouseholdService {
    pub fn new(backend: Arc<dyn BackendService>) -> Self {
        Self { backend }
    }

    pub async fn children(&self) -> PortResult<Vec<User>> {
        self.backend.list_users().await
    }

    pub async fn add_child(&self, name: &str, avatar: &str) -> PortResult<User> {
        let name = name.trim();
        if name.is_empty() {
            return Err(PortError::Validation("a name is required".to_string()));
        }
        if avatar.trim().is_empty() {
            return Err(PortError::Validation("an avatar is required".to_string()));
        }
        let user = self.backend.create_user(name, avatar.trim()).await?;
        info!("Added child profile {} ({})", user.id, user.name);
        Ok(user)
    }

    pub async fn parent_pin(&self) -> PortResult<String> {
        self.backend.get_parent_pin().await
    }

    /// Stores a new parent PIN: exactly four digits, typed the same way twice.
    pub async fn change_pin(&self, new_pin: &str, confirmation: &str) -> PortResult<()> {
        validate_pin(new_pin)?;
        if new_pin != confirmation {
            return Err(PortError::Validation("the PINs do not match".to_string()));
        }
        self.backend.set_parent_pin(new_pin).await?;
        info!("Parent PIN changed");
        Ok(())
    }
}

pub fn validate_pin(pin: &str) -> PortResult<()> {
    if pin.len() == 4 && pin.bytes().all(|b| b.is_ascii_digit()) {
        Ok(())
    } else {
        Err(PortError::Validation("the PIN must be exactly 4 digits".to_string()))
    }
}
