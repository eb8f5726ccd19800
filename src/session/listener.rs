//! Handles commands sent down from the listener.

use super::{Session, State};
use crate::commands::ListenerToSessionCmd;
use crate::error::Error;
use crate::packet::Qos;
use crate::wire;

impl Session {
    pub(super) async fn handle_listener_cmd(&mut self, cmd: ListenerToSessionCmd) -> Result<(), Error> {
        match cmd {
            ListenerToSessionCmd::ConnectAck { accepted } => self.on_connect_ack(accepted).await,
            ListenerToSessionCmd::Deliver(packet) => self.forward(packet).await,
            ListenerToSessionCmd::SubAck { pkid, granted } => {
                self.send_wire(wire::suback(pkid, granted)).await
            }
            ListenerToSessionCmd::UnsubAck { pkid } => self.send_wire(wire::unsuback(pkid)).await,
            ListenerToSessionCmd::PublishAck { message_id, qos, accepted } => {
                self.on_publish_ack(message_id, qos, accepted).await
            }
            ListenerToSessionCmd::Displaced => {
                log::info!("session {}: displaced by a newer connection with the same client id", self.id);
                self.state = State::Closed;
                Ok(())
            }
            ListenerToSessionCmd::Shutdown => {
                log::debug!("session {}: closing for broker shutdown", self.id);
                self.graceful_disconnect = true;
                self.state = State::Closed;
                Ok(())
            }
        }
    }

    async fn on_connect_ack(&mut self, accepted: bool) -> Result<(), Error> {
        if accepted {
            self.send_wire(wire::connack_accepted()).await?;
            self.state = State::Connected;
        } else {
            self.send_wire(wire::connack_not_authorized()).await?;
            self.state = State::Closed;
        }
        Ok(())
    }

    async fn on_publish_ack(&mut self, message_id: Option<u16>, qos: Qos, accepted: bool) -> Result<(), Error> {
        // A server that denies a PUBLISH has no positive-ack encoding to
        // fall back on, so it must close the connection [MQTT-3.3.5-2].
        if !accepted {
            self.state = State::Closed;
            return Ok(());
        }
        if qos == Qos::AtLeastOnce {
            if let Some(message_id) = message_id {
                self.send_wire(wire::puback(message_id)).await?;
            }
        }
        Ok(())
    }
}
