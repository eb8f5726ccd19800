use serde::{Deserialize, Serialize};

use crate::error::Error;

/// General broker-wide options (spec §6 configuration table, minus the
/// TTL keys which live in [`super::ttl::Ttl`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct General {
    /// Listener backpressure bound (`maxConnections`).
    max_connections: usize,

    /// Initial QoS-1 resend delay in milliseconds, doubled per retry
    /// (`baseRetryTimeout`).
    base_retry_timeout_ms: u64,
}

fn default_max_connections() -> usize {
    100_000
}

fn default_base_retry_timeout_ms() -> u64 {
    1_000
}

impl Default for General {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            base_retry_timeout_ms: default_base_retry_timeout_ms(),
        }
    }
}

impl General {
    #[must_use]
    pub const fn max_connections(&self) -> usize {
        self.max_connections
    }

    #[must_use]
    pub const fn base_retry_timeout_ms(&self) -> u64 {
        self.base_retry_timeout_ms
    }

    /// # Errors
    ///
    /// Returns an error if `max_connections` or `base_retry_timeout_ms`
    /// is zero.
    pub fn validate(&self) -> Result<(), Error> {
        if self.max_connections == 0 {
            return Err(Error::new(
                crate::error::ErrorKind::ConfigError,
                "general.max_connections must be greater than zero",
            ));
        }
        if self.base_retry_timeout_ms == 0 {
            return Err(Error::new(
                crate::error::ErrorKind::ConfigError,
                "general.base_retry_timeout_ms must be greater than zero",
            ));
        }
        Ok(())
    }
}
