//! Connection state machine (component D, spec §4.4).
//!
//! One task per accepted TCP connection. Owns the wire framing and the
//! inflight QoS-1 retransmission state; everything else (auth decisions,
//! the client registry, retained/offline replay) is delegated to the
//! listener over the `SessionToListenerCmd`/`ListenerToSessionCmd`
//! channel pair.

mod client;
mod config;
mod listener;

use std::collections::HashMap;
use std::time::{Duration, Instant};

use futures::{SinkExt, StreamExt};
use rand::Rng;
use tokio::sync::mpsc::{Receiver, Sender};
use tokio::time::{self, MissedTickBehavior};

use crate::commands::{ListenerToSessionCmd, SessionToListenerCmd};
use crate::error::{Error, ErrorKind};
use crate::packet::Packet;
use crate::types::SessionId;
use crate::wire::{self, WireStream};

pub use config::SessionConfig;

const RETRY_TICK: Duration = Duration::from_millis(200);
const WATCHDOG_TICK: Duration = Duration::from_secs(1);
const MAX_RETRIES: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    AwaitingConnect,
    Connected,
    Closing,
    Closed,
}

#[derive(Debug)]
struct Inflight {
    packet: Packet,
    attempt: u32,
    next_retry: Instant,
}

pub struct Session {
    id: SessionId,
    config: SessionConfig,
    stream: WireStream,

    state: State,
    client_id: String,
    clean_session: bool,
    /// 1.5x the negotiated keep-alive, per [MQTT-3.1.2-24]. Zero disables
    /// the watchdog.
    watchdog_timeout: Duration,
    last_activity: Instant,

    next_message_id: u16,
    inflight: HashMap<u16, Inflight>,
    /// Set once a DISCONNECT packet is received, so the final
    /// `Disconnected` notification can distinguish a clean shutdown
    /// (no will published) from an abrupt one (will published).
    graceful_disconnect: bool,

    to_listener: Sender<SessionToListenerCmd>,
    from_listener: Receiver<ListenerToSessionCmd>,
}

fn random_client_id() -> String {
    let suffix: u64 = rand::rng().random();
    format!("brokerd-{suffix:016x}")
}

impl Session {
    #[must_use]
    pub fn new(
        id: SessionId,
        config: SessionConfig,
        stream: WireStream,
        to_listener: Sender<SessionToListenerCmd>,
        from_listener: Receiver<ListenerToSessionCmd>,
    ) -> Self {
        Self {
            id,
            config,
            stream,
            state: State::AwaitingConnect,
            client_id: String::new(),
            clean_session: true,
            watchdog_timeout: Duration::ZERO,
            last_activity: Instant::now(),
            next_message_id: rand::rng().random(),
            inflight: HashMap::new(),
            graceful_disconnect: false,
            to_listener,
            from_listener,
        }
    }

    pub async fn run_loop(mut self) {
        let mut retry_tick = time::interval(RETRY_TICK);
        retry_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut watchdog_tick = time::interval(WATCHDOG_TICK);
        watchdog_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if matches!(self.state, State::Closed | State::Closing) {
                break;
            }

            tokio::select! {
                frame = self.stream.next() => {
                    match frame {
                        Some(Ok(packet)) => {
                            self.reset_watchdog();
                            if let Err(err) = self.handle_wire_packet(packet).await {
                                log::warn!("session {}: {err}", self.id);
                                self.state = State::Closed;
                            }
                        }
                        Some(Err(err)) => {
                            log::warn!("session {}: decode error: {err}", self.id);
                            self.state = State::Closed;
                        }
                        None => {
                            log::debug!("session {}: connection closed by peer", self.id);
                            self.state = State::Closed;
                        }
                    }
                }
                Some(cmd) = self.from_listener.recv() => {
                    if let Err(err) = self.handle_listener_cmd(cmd).await {
                        log::warn!("session {}: failed to handle listener cmd: {err}", self.id);
                        self.state = State::Closed;
                    }
                }
                _ = retry_tick.tick() => {
                    if let Err(err) = self.retry_inflight().await {
                        log::warn!("session {}: retransmit failed: {err}", self.id);
                        self.state = State::Closed;
                    }
                }
                _ = watchdog_tick.tick() => {
                    if self.watchdog_expired() {
                        log::info!("session {}: keepalive watchdog expired", self.id);
                        self.state = State::Closed;
                    }
                }
            }
        }

        if !self.client_id.is_empty() {
            let _ = self
                .to_listener
                .send(SessionToListenerCmd::Disconnected {
                    session_id: self.id,
                    graceful: self.graceful_disconnect,
                })
                .await;
        }
    }

    fn reset_watchdog(&mut self) {
        self.last_activity = Instant::now();
    }

    fn watchdog_expired(&self) -> bool {
        self.watchdog_timeout > Duration::ZERO && self.last_activity.elapsed() > self.watchdog_timeout
    }

    fn next_message_id(&mut self) -> u16 {
        let id = self.next_message_id;
        self.next_message_id = if self.next_message_id == u16::MAX { 1 } else { self.next_message_id + 1 };
        id
    }

    async fn send_wire(&mut self, packet: rumq_core::mqtt4::Packet) -> Result<(), Error> {
        self.stream
            .send(packet)
            .await
            .map_err(|err| Error::from_string(ErrorKind::EncodeError, err.to_string()))
    }

    /// Queues a QoS-aware delivery. QoS-0 packets are fire-and-forget;
    /// QoS-1 packets enter the inflight map and are retried with
    /// exponential backoff until acknowledged or exhausted (spec §4.4).
    async fn forward(&mut self, mut packet: Packet) -> Result<(), Error> {
        // The packet's incoming message_id (if any) belongs to the
        // publisher, not this session; a fresh id always comes from this
        // session's own counter so `inflight` entries can't collide with
        // another delivery that happened to reuse the same upstream id.
        if packet.qos == crate::packet::Qos::AtLeastOnce {
            packet = packet.with_message_id(self.next_message_id());
        }
        self.actual_send(&packet).await?;
        if packet.qos == crate::packet::Qos::AtLeastOnce {
            if let Some(message_id) = packet.message_id {
                self.inflight.insert(
                    message_id,
                    Inflight {
                        packet,
                        attempt: 0,
                        next_retry: Instant::now() + self.config.base_retry_timeout(),
                    },
                );
            }
        }
        Ok(())
    }

    async fn actual_send(&mut self, packet: &Packet) -> Result<(), Error> {
        self.send_wire(wire::publish_to_wire(packet)).await
    }

    async fn retry_inflight(&mut self) -> Result<(), Error> {
        let now = Instant::now();
        let due: Vec<u16> = self
            .inflight
            .iter()
            .filter(|(_, inflight)| inflight.next_retry <= now)
            .map(|(message_id, _)| *message_id)
            .collect();

        for message_id in due {
            let exhausted = {
                let inflight = self.inflight.get(&message_id).expect("checked above");
                inflight.attempt >= MAX_RETRIES
            };
            if exhausted {
                self.inflight.remove(&message_id);
                let err = Error::new(
                    ErrorKind::DeliveryExhausted,
                    &format!("message {message_id} exhausted {MAX_RETRIES} delivery attempts"),
                );
                log::warn!("session {}: {err}", self.id);
                continue;
            }

            let packet = {
                let inflight = self.inflight.get_mut(&message_id).expect("checked above");
                inflight.attempt += 1;
                let backoff = self.config.base_retry_timeout() * 2u32.pow(inflight.attempt);
                inflight.next_retry = Instant::now() + backoff;
                inflight.packet.clone()
            };
            self.actual_send(&packet).await?;
        }
        Ok(())
    }
}
