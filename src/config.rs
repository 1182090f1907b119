use std::time::Duration;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Where and how the client talks to the service. Picking the endpoint for
/// an environment (acceptance, production) is up to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub endpoint: String,
    /// Per-call budget handed to the transport; `None` waits indefinitely.
    pub timeout: Option<Duration>,
    /// Identifies the submitting party in every request, when set.
    pub sender_id: Option<String>,
}

impl ClientConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            timeout: Some(DEFAULT_TIMEOUT),
            sender_id: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_sender(mut self, sender_id: impl Into<String>) -> Self {
        self.sender_id = Some(sender_id.into());
        self
    }
}
