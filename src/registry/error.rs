//! Registry error types
//!
//! Error types for role registry operations.

use std::time::Duration;

use super::role::Role;

/// Error type for registry operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// The publisher slot is already held
    AlreadyStreaming { publisher_id: u64 },
    /// The registry lock could not be taken in time
    AdmissionTimeout(Duration),
    /// Handle was offered for a role it does not hold
    RoleMismatch { expected: Role, actual: Role },
}

impl std::fmt::Display for RegistryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistryError::AlreadyStreaming { publisher_id } => {
                write!(f, "A publisher is already streaming (session {})", publisher_id)
            }
            RegistryError::AdmissionTimeout(timeout) => {
                write!(f, "Admission timed out after {:?}", timeout)
            }
            RegistryError::RoleMismatch { expected, actual } => {
                write!(f, "Role mismatch: expected {}, got {}", expected, actual)
            }
        }
    }
}

impl std::error::Error for RegistryError {}
