//! Client configuration

use std::time::Duration;

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

use crate::error::{Error, Result};
use crate::protocol::constants::STREAM_PATH;
use crate::registry::Role;

/// Query component escapes: everything but RFC 3986 unreserved characters
const QUERY_VALUE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Configuration for connecting to a relay server
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server URL, e.g. `ws://localhost:8080`
    ///
    /// The stream path is appended unless the URL already ends with it.
    pub url: String,

    /// Publisher token
    pub token: Option<String>,

    /// Bound on TCP connect plus the upgrade handshake
    pub connect_timeout: Duration,

    /// How long to wait for the next message from the server
    pub reply_timeout: Duration,
}

impl ClientConfig {
    /// Create a new configuration for the given server URL
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            token: None,
            connect_timeout: Duration::from_secs(10),
            reply_timeout: Duration::from_secs(30),
        }
    }

    /// Set the publisher token
    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Set the connect timeout
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the reply timeout
    pub fn reply_timeout(mut self, timeout: Duration) -> Self {
        self.reply_timeout = timeout;
        self
    }

    /// Full upgrade URL for `role`
    pub fn stream_url(&self, role: Role) -> Result<String> {
        let base = self.url.trim();
        if !(base.starts_with("ws://") || base.starts_with("wss://")) {
            return Err(Error::InvalidUrl(format!(
                "expected a ws:// or wss:// URL, got {:?}",
                self.url
            )));
        }
        if base.contains('?') || base.contains('#') {
            return Err(Error::InvalidUrl(format!(
                "URL must not carry a query or fragment: {:?}",
                self.url
            )));
        }

        let base = base.trim_end_matches('/');
        let mut url = if base.ends_with(STREAM_PATH) {
            base.to_string()
        } else {
            format!("{}{}", base, STREAM_PATH)
        };

        url.push_str("?socket_type=");
        url.push_str(&role.socket_type().to_string());

        if role.is_publisher() {
            if let Some(token) = self.token.as_deref() {
                url.push_str("&token=");
                url.extend(utf8_percent_encode(token, QUERY_VALUE));
            }
        }

        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscriber_url() {
        let config = ClientConfig::new("ws://localhost:8080/").token("ignored");
        assert_eq!(
            config.stream_url(Role::Subscriber).unwrap(),
            "ws://localhost:8080/api/stream/ws?socket_type=1"
        );
    }

    #[test]
    fn test_publisher_url_escapes_token() {
        let config = ClientConfig::new("ws://localhost:8080/api/stream/ws").token("a b&c=d~");
        assert_eq!(
            config.stream_url(Role::Publisher).unwrap(),
            "ws://localhost:8080/api/stream/ws?socket_type=2&token=a%20b%26c%3Dd~"
        );
    }

    #[test]
    fn test_publisher_url_without_token() {
        let config = ClientConfig::new("wss://relay.example");
        assert_eq!(
            config.stream_url(Role::Publisher).unwrap(),
            "wss://relay.example/api/stream/ws?socket_type=2"
        );
    }

    #[test]
    fn test_invalid_urls() {
        for url in ["http://localhost:8080", "localhost", "ws://host/?x=1"] {
            let err = ClientConfig::new(url).stream_url(Role::Subscriber).unwrap_err();
            assert!(matches!(err, Error::InvalidUrl(_)), "{}", url);
        }
    }
}
