//! Server configuration.

/// Configuration for the authority.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Document content at version 0.
    pub initial_document: String,
    /// Maximum number of updates accepted in one push.
    pub max_push_batch: usize,
}

impl ServerConfig {
    /// Creates a new server configuration.
    pub fn new(initial_document: impl Into<String>) -> Self {
        Self {
            initial_document: initial_document.into(),
            max_push_batch: 1000,
        }
    }

    /// Sets the maximum push batch size.
    pub fn with_max_push_batch(mut self, size: usize) -> Self {
        self.max_push_batch = size;
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new("Start document")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.initial_document, "Start document");
        assert_eq!(config.max_push_batch, 1000);
    }

    #[test]
    fn config_builder() {
        let config = ServerConfig::new("abc").with_max_push_batch(2);
        assert_eq!(config.initial_document, "abc");
        assert_eq!(config.max_push_batch, 2);
    }
}
