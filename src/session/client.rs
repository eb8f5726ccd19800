//! Handles frames decoded off the wire.

use super::{random_client_id, Session, State};
use crate::commands::SessionToListenerCmd;
use crate::error::{Error, ErrorKind};
use crate::wire::{self, InboundEvent};

impl Session {
    pub(super) async fn handle_wire_packet(
        &mut self,
        packet: rumq_core::mqtt4::Packet,
    ) -> Result<(), Error> {
        let Some(event) = wire::from_wire(packet) else {
            return Err(Error::new(ErrorKind::ProtocolError, "unexpected packet type from client"));
        };

        // Only a CONNECT is legal in AwaitingConnect; everything else is
        // legal only once connected (spec §4.4 state machine).
        match (&self.state, &event) {
            (State::AwaitingConnect, InboundEvent::Connect { .. }) => self.on_connect(event).await,
            (State::AwaitingConnect, _) => Err(Error::new(
                ErrorKind::ProtocolError,
                "first packet on a new connection must be CONNECT",
            )),
            (State::Connected, InboundEvent::Connect { .. }) => Err(Error::new(
                ErrorKind::ProtocolError,
                "CONNECT received on an already-connected session",
            )),
            (State::Connected, _) => self.on_connected_event(event).await,
            (State::Closing | State::Closed, _) => Ok(()),
        }
    }

    async fn on_connect(&mut self, event: InboundEvent) -> Result<(), Error> {
        let InboundEvent::Connect {
            mut client_id,
            clean_session,
            keep_alive,
            username,
            password,
            will,
        } = event
        else {
            unreachable!("caller matched Connect")
        };

        if client_id.is_empty() {
            if self.config.allow_empty_client_id() {
                client_id = random_client_id();
            } else {
                self.send_wire(wire::connack_not_authorized()).await?;
                self.state = State::Closed;
                return Ok(());
            }
        }

        // A zero-byte client id with clean_session=false has nowhere to
        // persist a session against; reject it the same way.
        if !clean_session && client_id.is_empty() {
            self.send_wire(wire::connack_not_authorized()).await?;
            self.state = State::Closed;
            return Ok(());
        }

        self.client_id = client_id.clone();
        self.clean_session = clean_session;
        self.watchdog_timeout = if keep_alive == 0 {
            std::time::Duration::ZERO
        } else {
            std::time::Duration::from_millis(u64::from(keep_alive) * 1000 * 5 / 4)
        };

        self.to_listener
            .send(SessionToListenerCmd::Connect {
                session_id: self.id,
                client_id,
                clean_session,
                keep_alive,
                username,
                password,
                will,
            })
            .await?;
        Ok(())
    }

    async fn on_connected_event(&mut self, event: InboundEvent) -> Result<(), Error> {
        match event {
            InboundEvent::Connect { .. } => unreachable!("filtered by caller"),
            InboundEvent::Publish(packet) => {
                self.to_listener
                    .send(SessionToListenerCmd::Publish {
                        session_id: self.id,
                        packet,
                    })
                    .await?;
            }
            InboundEvent::Subscribe { pkid, filters } => {
                self.to_listener
                    .send(SessionToListenerCmd::Subscribe {
                        session_id: self.id,
                        pkid,
                        filters,
                    })
                    .await?;
            }
            InboundEvent::Unsubscribe { pkid, filters } => {
                self.to_listener
                    .send(SessionToListenerCmd::Unsubscribe {
                        session_id: self.id,
                        pkid,
                        filters,
                    })
                    .await?;
            }
            InboundEvent::PubAck { message_id } => {
                if self.inflight.remove(&message_id).is_none() {
                    log::warn!("session {}: PUBACK for unknown message id {message_id}", self.id);
                }
                self.to_listener
                    .send(SessionToListenerCmd::PubAck {
                        session_id: self.id,
                        message_id,
                    })
                    .await?;
            }
            InboundEvent::PingReq => {
                self.send_wire(wire::pingresp()).await?;
            }
            InboundEvent::Disconnect => {
                self.graceful_disconnect = true;
                self.state = State::Closing;
            }
        }
        Ok(())
    }
}
