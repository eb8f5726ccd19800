mod general;
mod listener;
mod log;
mod ttl;

pub use general::General;
pub use listener::Listener;
pub use log::{Log, LogLevel};
pub use ttl::Ttl;

use serde::{Deserialize, Serialize};

use crate::error::Error;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    general: General,
    listener: Listener,
    ttl: Ttl,
    log: Log,
}

impl Config {
    #[must_use]
    pub const fn general(&self) -> &General {
        &self.general
    }

    #[must_use]
    pub const fn listener(&self) -> &Listener {
        &self.listener
    }

    #[must_use]
    pub const fn ttl(&self) -> &Ttl {
        &self.ttl
    }

    #[must_use]
    pub const fn log(&self) -> &Log {
        &self.log
    }

    /// # Errors
    ///
    /// Returns an error from whichever section fails validation first.
    pub fn validate(&self) -> Result<(), Error> {
        self.general.validate()?;
        self.listener.validate()?;
        self.ttl.validate()?;
        self.log.validate()?;
        Ok(())
    }

    /// Like [`Self::validate`] but skips binding the listener address,
    /// for use in integration tests that want their own ephemeral port
    /// picked up front.
    ///
    /// # Errors
    ///
    /// Returns an error from whichever section fails validation first.
    pub fn validate_without_bind(&self) -> Result<(), Error> {
        self.general.validate()?;
        self.ttl.validate()?;
        self.log.validate()?;
        Ok(())
    }
}
