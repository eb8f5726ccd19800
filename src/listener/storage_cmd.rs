//! Handles replies arriving from the storage actor: retained-message
//! delivery and the two-step reconnect handshake that finishes a pending
//! CONNECT (spec §4.5).

use crate::commands::{ListenerToDispatcherCmd, ListenerToSessionCmd, ListenerToStorageCmd, StorageToListenerCmd};
use crate::error::Error;
use crate::event::Event;
use crate::packet::{Packet, Qos};
use crate::types::SessionInfo;

use super::SessionRecord;

impl super::Listener {
    pub(super) async fn handle_storage_cmd(&mut self, cmd: StorageToListenerCmd) -> Result<(), Error> {
        match cmd {
            StorageToListenerCmd::RetainedMatches { requester, qos, packets } => {
                let items = packets.into_iter().map(|packet| (packet, qos)).collect();
                self.deliver_to(requester, items).await
            }
            StorageToListenerCmd::Subscriptions { client_id, subscriptions } => {
                self.on_subscriptions_loaded(client_id, subscriptions).await
            }
            StorageToListenerCmd::OfflinePackets { client_id, packets } => {
                self.on_offline_packets_loaded(client_id, packets).await
            }
        }
    }

    /// Applies the subscriber's granted qos to each packet before handing
    /// it to the session, same rule as live fan-out [MQTT-3.8.4-6].
    async fn deliver_to(&mut self, session_id: crate::types::SessionId, packets: Vec<(Packet, Qos)>) -> Result<(), Error> {
        if let Some(sender) = self.session_senders.get(&session_id) {
            for (mut packet, qos) in packets {
                packet.qos = packet.qos.min(qos);
                sender.send(ListenerToSessionCmd::Deliver(packet)).await?;
            }
        }
        Ok(())
    }

    /// Reconnect orchestration step 2: re-register the durable
    /// subscriptions with the dispatcher, then ask storage for offline
    /// packets.
    async fn on_subscriptions_loaded(&mut self, client_id: String, subscriptions: Vec<(String, crate::packet::Qos)>) -> Result<(), Error> {
        let Some(pending) = self.pending_connects.get(&client_id) else {
            return Ok(());
        };
        let session_id = pending.session_id;
        let clean_session = pending.clean_session;

        for (filter, qos) in subscriptions {
            self.dispatcher_sender
                .send(ListenerToDispatcherCmd::Subscribe {
                    session_id,
                    client_id: client_id.clone(),
                    filter: filter.clone(),
                    qos,
                })
                .await?;
            self.subscriptions.entry(session_id).or_default().insert(filter, qos);
        }

        self.storage_sender
            .send(ListenerToStorageCmd::StreamOfflinePackets { client_id, clean_session })
            .await?;
        Ok(())
    }

    /// Reconnect orchestration step 3: finalize the pending connect, send
    /// CONNACK, and replay whatever was queued while the client was away.
    async fn on_offline_packets_loaded(&mut self, client_id: String, packets: Vec<(Packet, Qos)>) -> Result<(), Error> {
        let Some(pending) = self.pending_connects.remove(&client_id) else {
            return Ok(());
        };
        let session_id = pending.session_id;

        self.sessions.insert(
            session_id,
            SessionRecord {
                client_id: client_id.clone(),
                clean_session: pending.clean_session,
                will: pending.will,
            },
        );

        if let Some(sender) = self.session_senders.get(&session_id) {
            sender.send(ListenerToSessionCmd::ConnectAck { accepted: true }).await?;
        }
        self.events.emit(Event::ClientConnected(SessionInfo {
            session_id,
            client_id,
            clean_session: pending.clean_session,
        }));
        self.deliver_to(session_id, packets).await
    }
}
