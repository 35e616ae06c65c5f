//! Role registry implementation
//!
//! Holds the single publisher slot and the subscriber set. Every mutation
//! takes the write lock, so a snapshot taken under the read lock always sees
//! a fully applied admission or release.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::{RwLock, RwLockWriteGuard};

use super::config::RegistryConfig;
use super::entry::{ConnectionHandle, RegistryStats};
use super::error::RegistryError;
use super::role::Role;

#[derive(Default)]
struct RegistryState {
    publisher: Option<Arc<ConnectionHandle>>,
    subscribers: BTreeMap<u64, Arc<ConnectionHandle>>,
}

/// Registry of connection roles
///
/// Owned by the server and shared with every session through an `Arc`.
pub struct RoleRegistry {
    state: RwLock<RegistryState>,

    /// Configuration
    config: RegistryConfig,
}

impl RoleRegistry {
    /// Create a new registry with default configuration
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    /// Create a new registry with custom configuration
    pub fn with_config(config: RegistryConfig) -> Self {
        Self {
            state: RwLock::new(RegistryState::default()),
            config,
        }
    }

    /// Get the registry configuration
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    async fn write_for_admission(
        &self,
    ) -> Result<RwLockWriteGuard<'_, RegistryState>, RegistryError> {
        let timeout = self.config.admission_timeout;
        tokio::time::timeout(timeout, self.state.write())
            .await
            .map_err(|_| RegistryError::AdmissionTimeout(timeout))
    }

    fn check_role(handle: &ConnectionHandle, expected: Role) -> Result<(), RegistryError> {
        if handle.role() != expected {
            return Err(RegistryError::RoleMismatch {
                expected,
                actual: handle.role(),
            });
        }
        Ok(())
    }

    /// Install `handle` as the publisher
    ///
    /// Returns `AlreadyStreaming` if the slot is held. Under concurrent
    /// calls exactly one succeeds.
    pub async fn admit_publisher(&self, handle: Arc<ConnectionHandle>) -> Result<(), RegistryError> {
        Self::check_role(&handle, Role::Publisher)?;
        let mut state = self.write_for_admission().await?;

        if let Some(ref current) = state.publisher {
            tracing::warn!(
                session_id = handle.id(),
                publisher_id = current.id(),
                peer = %handle.peer(),
                "Publisher rejected, slot already held"
            );
            return Err(RegistryError::AlreadyStreaming {
                publisher_id: current.id(),
            });
        }

        tracing::info!(
            session_id = handle.id(),
            peer = %handle.peer(),
            subscribers = state.subscribers.len(),
            "Publisher registered"
        );
        state.publisher = Some(handle);
        Ok(())
    }

    /// Add `handle` to the subscriber set
    pub async fn admit_subscriber(
        &self,
        handle: Arc<ConnectionHandle>,
    ) -> Result<(), RegistryError> {
        Self::check_role(&handle, Role::Subscriber)?;
        let mut state = self.write_for_admission().await?;

        let id = handle.id();
        let peer = handle.peer();
        state.subscribers.insert(id, handle);

        tracing::info!(
            session_id = id,
            peer = %peer,
            subscribers = state.subscribers.len(),
            "Subscriber added"
        );
        Ok(())
    }

    /// Clear the publisher slot if `session_id` holds it
    ///
    /// Returns whether the slot was cleared. A stale id never clears a newer
    /// publisher.
    pub async fn release_publisher(&self, session_id: u64) -> bool {
        let mut state = self.state.write().await;

        match state.publisher.as_ref().map(|p| p.id()) {
            Some(held_by) if held_by == session_id => {
                state.publisher = None;
                tracing::info!(session_id = session_id, "Publisher released");
                true
            }
            Some(held_by) => {
                tracing::warn!(
                    expected = held_by,
                    actual = session_id,
                    "Publisher release mismatch"
                );
                false
            }
            None => false,
        }
    }

    /// Remove a subscriber; no-op if absent
    pub async fn release_subscriber(&self, session_id: u64) -> bool {
        let mut state = self.state.write().await;
        let removed = state.subscribers.remove(&session_id).is_some();

        if removed {
            tracing::debug!(
                session_id = session_id,
                subscribers = state.subscribers.len(),
                "Subscriber removed"
            );
        }
        removed
    }

    /// Current subscribers, in admission (id) order
    pub async fn snapshot(&self) -> Vec<Arc<ConnectionHandle>> {
        let state = self.state.read().await;
        state.subscribers.values().cloned().collect()
    }

    pub async fn publisher_id(&self) -> Option<u64> {
        self.state.read().await.publisher.as_ref().map(|p| p.id())
    }

    pub async fn has_publisher(&self) -> bool {
        self.state.read().await.publisher.is_some()
    }

    pub async fn subscriber_count(&self) -> usize {
        self.state.read().await.subscribers.len()
    }

    /// Get registry statistics
    pub async fn stats(&self) -> RegistryStats {
        let state = self.state.read().await;
        RegistryStats {
            publisher_id: state.publisher.as_ref().map(|p| p.id()),
            subscriber_count: state.subscribers.len(),
            stale_subscribers: state.subscribers.values().filter(|s| !s.is_open()).count(),
        }
    }
}

impl Default for RoleRegistry {
    fn default() -> Self {
        Self::new()
    }
}
