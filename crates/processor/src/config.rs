use std::time::Duration;

/// Immutable settings of an [`OrderProcessor`](crate::OrderProcessor).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessorConfig {
    /// Upper bound for persisting an order and adjusting its stock. `None`
    /// waits for the store indefinitely.
    pub request_timeout: Option<Duration>,
}

impl ProcessorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }
}
