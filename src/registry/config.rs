//! Registry configuration

use std::time::Duration;

use crate::protocol::constants::DEFAULT_ADMISSION_TIMEOUT;

/// Role registry configuration
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Upper bound on waiting for the registry lock during admission
    pub admission_timeout: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            admission_timeout: DEFAULT_ADMISSION_TIMEOUT,
        }
    }
}

impl RegistryConfig {
    /// Set the admission timeout
    pub fn admission_timeout(mut self, timeout: Duration) -> Self {
        self.admission_timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RegistryConfig::default();
        assert_eq!(config.admission_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_builder_admission_timeout() {
        let config = RegistryConfig::default().admission_timeout(Duration::from_millis(250));
        assert_eq!(config.admission_timeout, Duration::from_millis(250));
    }
}
