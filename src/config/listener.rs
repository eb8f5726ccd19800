use std::net::{SocketAddr, TcpListener as StdTcpListener};

use serde::{Deserialize, Serialize};

use crate::error::{Error, ErrorKind};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Listener {
    /// `bindAddress:port`.
    address: SocketAddr,
    allow_anonymous: bool,
    allow_empty_client_id: bool,
}

impl Default for Listener {
    fn default() -> Self {
        Self {
            address: "0.0.0.0:1883".parse().expect("valid default address"),
            allow_anonymous: true,
            allow_empty_client_id: true,
        }
    }
}

impl Listener {
    #[must_use]
    pub const fn address(&self) -> SocketAddr {
        self.address
    }

    #[must_use]
    pub const fn allow_anonymous(&self) -> bool {
        self.allow_anonymous
    }

    #[must_use]
    pub const fn allow_empty_client_id(&self) -> bool {
        self.allow_empty_client_id
    }

    /// Binds a throwaway socket at the configured address to fail fast
    /// on a bad config rather than at `Listener::bind` time deep inside
    /// startup.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound.
    pub fn validate(&self) -> Result<(), Error> {
        StdTcpListener::bind(self.address).map_err(|err| {
            Error::from_string(
                ErrorKind::ConfigError,
                format!("failed to bind listener address {}: {err}", self.address),
            )
        })?;
        Ok(())
    }
}
