//! Configuration for sync sessions.

use std::time::Duration;

use textsync_protocol::ClientId;

/// Configuration for one sync session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Identifier stamped on every local update.
    pub client_id: ClientId,
    /// Delay before re-pushing while pending updates remain.
    pub push_retry_delay: Duration,
    /// Delay before re-pulling after a failed or malformed pull.
    pub fault_retry_delay: Duration,
    /// Upper bound for the initial document fetch (`None` waits forever).
    pub attach_timeout: Option<Duration>,
    /// Upper bound for each pull and push (`None` waits forever).
    pub request_timeout: Option<Duration>,
}

impl SessionConfig {
    /// Creates a configuration with a freshly generated client id.
    pub fn new() -> Self {
        Self {
            client_id: ClientId::generate(),
            push_retry_delay: Duration::from_millis(100),
            fault_retry_delay: Duration::from_millis(100),
            attach_timeout: None,
            request_timeout: None,
        }
    }

    /// Sets the client id.
    pub fn with_client_id(mut self, client_id: impl Into<ClientId>) -> Self {
        self.client_id = client_id.into();
        self
    }

    /// Sets the push retry delay.
    pub fn with_push_retry_delay(mut self, delay: Duration) -> Self {
        self.push_retry_delay = delay;
        self
    }

    /// Sets the fault retry delay.
    pub fn with_fault_retry_delay(mut self, delay: Duration) -> Self {
        self.fault_retry_delay = delay;
        self
    }

    /// Bounds the initial document fetch.
    pub fn with_attach_timeout(mut self, timeout: Duration) -> Self {
        self.attach_timeout = Some(timeout);
        self
    }

    /// Bounds every pull and push request.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.push_retry_delay, Duration::from_millis(100));
        assert_eq!(config.fault_retry_delay, Duration::from_millis(100));
        assert!(config.attach_timeout.is_none());
        assert!(config.request_timeout.is_none());
    }

    #[test]
    fn session_config_builder() {
        let config = SessionConfig::new()
            .with_client_id("editor-a")
            .with_push_retry_delay(Duration::from_millis(5))
            .with_attach_timeout(Duration::from_secs(2))
            .with_request_timeout(Duration::from_secs(30));

        assert_eq!(config.client_id.as_str(), "editor-a");
        assert_eq!(config.push_retry_delay, Duration::from_millis(5));
        assert_eq!(config.attach_timeout, Some(Duration::from_secs(2)));
        assert_eq!(config.request_timeout, Some(Duration::from_secs(30)));
    }
}
