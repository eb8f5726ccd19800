//! A value tagged with the instant past which it is stale, per spec §9
//! ("every persisted record carries a TTL measured from last write").

use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct Expiring<T> {
    value: T,
    expires_at: Instant,
}

impl<T> Expiring<T> {
    pub fn new(value: T, ttl: Duration) -> Self {
        Self {
            value,
            expires_at: Instant::now() + ttl,
        }
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn into_value(self) -> T {
        self.value
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}
