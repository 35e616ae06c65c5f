//! Publisher credentials
//!
//! Only publisher upgrades carry a token. The server asks a
//! [`CredentialStore`] whether it is acceptable; [`StaticToken`] accepts a
//! single configured value.

use std::fmt;

/// Lookup of publisher tokens
pub trait CredentialStore: Send + Sync + 'static {
    /// Whether `token` may publish
    fn verify_publisher(&self, token: &str) -> bool;
}

/// Accepts exactly one token
#[derive(Clone)]
pub struct StaticToken {
    token: String,
}

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

impl CredentialStore for StaticToken {
    fn verify_publisher(&self, token: &str) -> bool {
        // Constant-time comparison
        if token.len() != self.token.len() {
            return false;
        }

        let mut result = 0u8;
        for (a, b) in token.bytes().zip(self.token.bytes()) {
            result |= a ^ b;
        }
        result == 0
    }
}

impl fmt::Debug for StaticToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StaticToken([REDACTED])")
    }
}
