use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, ErrorKind};

/// TTL configuration for the persistence store (spec §4.2, §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Ttl {
    retained_ms: u64,
    subscriptions_ms: u64,
    packets_ms: u64,
    check_frequency_ms: u64,
}

impl Default for Ttl {
    fn default() -> Self {
        Self {
            // Retained messages are meant to live far longer than
            // subscriptions/offline packets; default to a week.
            retained_ms: 604_800_000,
            subscriptions_ms: 3_600_000,
            packets_ms: 3_600_000,
            check_frequency_ms: 60_000,
        }
    }
}

impl Ttl {
    #[cfg(test)]
    #[must_use]
    pub(crate) fn with_retained_ms(mut self, ms: u64) -> Self {
        self.retained_ms = ms;
        self
    }

    #[must_use]
    pub fn retained(&self) -> Duration {
        Duration::from_millis(self.retained_ms)
    }

    #[must_use]
    pub fn subscriptions(&self) -> Duration {
        Duration::from_millis(self.subscriptions_ms)
    }

    #[must_use]
    pub fn packets(&self) -> Duration {
        Duration::from_millis(self.packets_ms)
    }

    #[must_use]
    pub fn check_frequency(&self) -> Duration {
        Duration::from_millis(self.check_frequency_ms)
    }

    /// # Errors
    ///
    /// Returns an error if `check_frequency_ms` is zero — a zero period
    /// would spin the sweeper task.
    pub fn validate(&self) -> Result<(), Error> {
        if self.check_frequency_ms == 0 {
            return Err(Error::new(
                ErrorKind::ConfigError,
                "ttl.check_frequency_ms must be greater than zero",
            ));
        }
        Ok(())
    }
}
