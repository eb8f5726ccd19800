//! Pluggable authentication/authorization hooks (spec §6).
//!
//! The spec models these as three plain callbacks, default-allow, not as
//! a separately-scheduled bus-connected subsystem — unlike the other
//! three components this crate realizes as actors, `Hooks` is a trait
//! object shared by reference across session tasks. See DESIGN.md for
//! the reasoning.

use async_trait::async_trait;

use crate::error::Error;

#[async_trait]
pub trait Hooks: Send + Sync {
    /// Returns `Ok(true)` to accept the CONNECT, `Ok(false)` to send
    /// CONNACK return code 5, or `Err` on a hook-internal failure.
    async fn authenticate(
        &self,
        client_id: &str,
        username: Option<&str>,
        password: Option<&[u8]>,
    ) -> Result<bool, Error>;

    async fn authorize_publish(&self, client_id: &str, topic: &str, payload: &[u8]) -> Result<bool, Error>;

    async fn authorize_subscribe(&self, client_id: &str, filter: &str) -> Result<bool, Error>;
}

/// Default allow-all implementation, matching spec §6 ("default
/// allow-all").
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAll;

#[async_trait]
impl Hooks for AllowAll {
    async fn authenticate(
        &self,
        _client_id: &str,
        _username: Option<&str>,
        _password: Option<&[u8]>,
    ) -> Result<bool, Error> {
        Ok(true)
    }

    async fn authorize_publish(&self, _client_id: &str, _topic: &str, _payload: &[u8]) -> Result<bool, Error> {
        Ok(true)
    }

    async fn authorize_subscribe(&self, _client_id: &str, _filter: &str) -> Result<bool, Error> {
        Ok(true)
    }
}
