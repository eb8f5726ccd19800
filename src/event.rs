//! Broker lifecycle events (spec §6): `ready`, `closed`, `error`,
//! `clientConnected`, `clientDisconnected`, `published`. Realized as
//! structured `log` lines plus an optional broadcast channel for
//! embedders that want to observe broker lifecycle programmatically.

use tokio::sync::broadcast;

use crate::types::SessionInfo;

#[derive(Debug, Clone)]
pub enum Event {
    Ready,
    Closed,
    Error(String),
    ClientConnected(SessionInfo),
    ClientDisconnected(SessionInfo),
    Published { topic: String, client_id: String },
}

/// Cheap to clone; every actor that emits events holds a handle.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Event>,
}

impl EventBus {
    #[must_use]
    pub fn new() -> (Self, broadcast::Receiver<Event>) {
        let (sender, receiver) = broadcast::channel(64);
        (Self { sender }, receiver)
    }

    /// Logs the event at the appropriate level, then broadcasts it.
    /// Having no subscribers is the common case and not an error.
    pub fn emit(&self, event: Event) {
        match &event {
            Event::Ready => log::info!("event: ready"),
            Event::Closed => log::info!("event: closed"),
            Event::Error(err) => log::error!("event: error: {err}"),
            Event::ClientConnected(info) => log::info!("event: clientConnected {info}"),
            Event::ClientDisconnected(info) => log::info!("event: clientDisconnected {info}"),
            Event::Published { topic, client_id } => {
                log::info!("event: published topic={topic} client={client_id}");
            }
        }
        let _ = self.sender.send(event);
    }
}
