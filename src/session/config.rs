use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct SessionConfig {
    allow_empty_client_id: bool,
    base_retry_timeout: Duration,
}

impl SessionConfig {
    #[must_use]
    pub const fn new(allow_empty_client_id: bool, base_retry_timeout: Duration) -> Self {
        Self {
            allow_empty_client_id,
            base_retry_timeout,
        }
    }

    #[must_use]
    pub const fn allow_empty_client_id(&self) -> bool {
        self.allow_empty_client_id
    }

    #[must_use]
    pub const fn base_retry_timeout(&self) -> Duration {
        self.base_retry_timeout
    }
}
