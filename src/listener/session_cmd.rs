//! Handles commands arriving from session tasks: CONNECT orchestration,
//! SUBSCRIBE/UNSUBSCRIBE authorization, PUBLISH authorization, and the
//! disconnect/will path.

use std::collections::HashMap;

use crate::commands::{
    ListenerToDispatcherCmd, ListenerToSessionCmd, ListenerToStorageCmd, SessionToListenerCmd,
};
use crate::error::Error;
use crate::event::Event;
use crate::packet::{Packet, Qos};
use crate::types::SessionId;

use super::{Listener, PendingConnect};

impl Listener {
    pub(super) async fn handle_session_cmd(&mut self, cmd: SessionToListenerCmd) -> Result<(), Error> {
        match cmd {
            SessionToListenerCmd::Connect {
                session_id,
                client_id,
                clean_session,
                keep_alive: _,
                username,
                password,
                will,
            } => {
                self.on_session_connect(session_id, client_id, clean_session, username, password, will)
                    .await
            }
            SessionToListenerCmd::Subscribe { session_id, pkid, filters } => {
                self.on_session_subscribe(session_id, pkid, filters).await
            }
            SessionToListenerCmd::Unsubscribe { session_id, pkid, filters } => {
                self.on_session_unsubscribe(session_id, pkid, filters).await
            }
            SessionToListenerCmd::Publish { session_id, packet } => {
                self.on_session_publish(session_id, packet).await
            }
            SessionToListenerCmd::PubAck { session_id: _, message_id: _ } => {
                // Only informational: the session already removed the
                // inflight entry itself. Nothing for the listener to do.
                Ok(())
            }
            SessionToListenerCmd::Disconnected { session_id, graceful } => {
                self.on_session_disconnected(session_id, graceful).await
            }
        }
    }

    async fn on_session_connect(
        &mut self,
        session_id: SessionId,
        client_id: String,
        clean_session: bool,
        username: Option<String>,
        password: Option<Vec<u8>>,
        will: Option<Packet>,
    ) -> Result<(), Error> {
        if username.is_none() && !self.allow_anonymous {
            return self.reject_connect(session_id).await;
        }

        let authenticated = self
            .hooks
            .authenticate(&client_id, username.as_deref(), password.as_deref())
            .await
            .unwrap_or_else(|err| {
                self.events.emit(Event::Error(format!("authenticate hook failed for {client_id}: {err}")));
                false
            });
        if !authenticated {
            return self.reject_connect(session_id).await;
        }

        // The Server MUST process a second CONNECT for a client id already
        // connected as a protocol violation against the OLD connection,
        // not the new one [MQTT-3.1.0-2]: displace it.
        if let Some(&old_session_id) = self.client_ids.get(&client_id) {
            self.displacing.insert(old_session_id);
            if let Some(sender) = self.session_senders.get(&old_session_id) {
                let _ = sender.send(ListenerToSessionCmd::Displaced).await;
            }
        }
        self.client_ids.insert(client_id.clone(), session_id);

        self.pending_connects
            .insert(client_id.clone(), PendingConnect { session_id, will, clean_session });
        self.storage_sender
            .send(ListenerToStorageCmd::LookupSubscriptions { client_id, clean_session })
            .await?;
        Ok(())
    }

    async fn reject_connect(&mut self, session_id: SessionId) -> Result<(), Error> {
        if let Some(sender) = self.session_senders.get(&session_id) {
            let _ = sender.send(ListenerToSessionCmd::ConnectAck { accepted: false }).await;
        }
        Ok(())
    }

    async fn on_session_subscribe(
        &mut self,
        session_id: SessionId,
        pkid: u16,
        filters: Vec<(String, Qos)>,
    ) -> Result<(), Error> {
        let Some(record) = self.sessions.get(&session_id) else {
            return Ok(());
        };
        let client_id = record.client_id.clone();

        let mut granted = Vec::with_capacity(filters.len());
        for (filter, qos) in filters {
            // A re-SUBSCRIBE of an already-subscribed filter updates the
            // granted qos in place without touching the bus registration;
            // the bus handler still closes over the original qos, and
            // delivery picks up the new one only via the listener's own
            // subscriptions map (see handle_dispatcher_cmd).
            let already_subscribed = self
                .subscriptions
                .get(&session_id)
                .is_some_and(|subs| subs.contains_key(&filter));
            if already_subscribed {
                self.subscriptions.entry(session_id).or_default().insert(filter, qos);
                granted.push(Some(qos));
                continue;
            }

            let authorized = self
                .hooks
                .authorize_subscribe(&client_id, &filter)
                .await
                .unwrap_or_else(|err| {
                    log::error!("listener: authorize_subscribe hook failed for {client_id}: {err}");
                    false
                });
            if authorized {
                self.dispatcher_sender
                    .send(ListenerToDispatcherCmd::Subscribe {
                        session_id,
                        client_id: client_id.clone(),
                        filter: filter.clone(),
                        qos,
                    })
                    .await?;
                self.subscriptions.entry(session_id).or_default().insert(filter.clone(), qos);
                self.storage_sender
                    .send(ListenerToStorageCmd::LookupRetained { requester: session_id, filter, qos })
                    .await?;
                granted.push(Some(qos));
            } else {
                granted.push(None);
            }
        }

        if let Some(sender) = self.session_senders.get(&session_id) {
            sender.send(ListenerToSessionCmd::SubAck { pkid, granted }).await?;
        }
        Ok(())
    }

    async fn on_session_unsubscribe(&mut self, session_id: SessionId, pkid: u16, filters: Vec<String>) -> Result<(), Error> {
        let Some(record) = self.sessions.get(&session_id) else {
            return Ok(());
        };
        let client_id = record.client_id.clone();

        for filter in filters {
            self.dispatcher_sender
                .send(ListenerToDispatcherCmd::Unsubscribe { session_id, client_id: client_id.clone(), filter: filter.clone() })
                .await?;
            if let Some(subs) = self.subscriptions.get_mut(&session_id) {
                subs.remove(&filter);
            }
        }

        if let Some(sender) = self.session_senders.get(&session_id) {
            sender.send(ListenerToSessionCmd::UnsubAck { pkid }).await?;
        }
        Ok(())
    }

    async fn on_session_publish(&mut self, session_id: SessionId, packet: Packet) -> Result<(), Error> {
        let Some(record) = self.sessions.get(&session_id) else {
            return Ok(());
        };
        let client_id = record.client_id.clone();

        let authorized = self
            .hooks
            .authorize_publish(&client_id, &packet.topic, &packet.payload)
            .await
            .unwrap_or_else(|err| {
                log::error!("listener: authorize_publish hook failed for {client_id}: {err}");
                false
            });

        if let Some(sender) = self.session_senders.get(&session_id) {
            sender
                .send(ListenerToSessionCmd::PublishAck {
                    message_id: packet.message_id,
                    qos: packet.qos,
                    accepted: authorized,
                })
                .await?;
        }
        if !authorized {
            return Ok(());
        }

        if packet.retain {
            self.storage_sender.send(ListenerToStorageCmd::StoreRetained(packet.clone())).await?;
        }
        self.events.emit(Event::Published { topic: packet.topic.clone(), client_id: client_id.clone() });
        self.dispatcher_sender
            .send(ListenerToDispatcherCmd::Publish { origin_session: session_id, client_id, packet })
            .await?;
        Ok(())
    }

    async fn on_session_disconnected(&mut self, session_id: SessionId, graceful: bool) -> Result<(), Error> {
        self.session_senders.remove(&session_id);

        if self.displacing.remove(&session_id) {
            // A newer connection for this client id is already live; its
            // registry entries must not be touched.
            self.subscriptions.remove(&session_id);
            return Ok(());
        }

        let Some(record) = self.sessions.remove(&session_id) else {
            return Ok(());
        };

        self.events.emit(Event::ClientDisconnected(crate::types::SessionInfo {
            session_id,
            client_id: record.client_id.clone(),
            clean_session: record.clean_session,
        }));

        if self.client_ids.get(&record.client_id) == Some(&session_id) {
            self.client_ids.remove(&record.client_id);
        }

        self.dispatcher_sender
            .send(ListenerToDispatcherCmd::UnsubscribeAll { session_id, client_id: record.client_id.clone() })
            .await?;

        let subs: HashMap<String, Qos> = self.subscriptions.remove(&session_id).unwrap_or_default();
        if !record.clean_session {
            self.storage_sender
                .send(ListenerToStorageCmd::StoreSubscriptions {
                    client_id: record.client_id.clone(),
                    clean_session: false,
                    subscriptions: subs.into_iter().collect(),
                })
                .await?;
        }

        // A Will Message MUST be published when the Network Connection is
        // closed other than by a DISCONNECT packet [MQTT-3.1.2-8].
        if !graceful {
            if let Some(will) = record.will {
                if will.retain {
                    self.storage_sender.send(ListenerToStorageCmd::StoreRetained(will.clone())).await?;
                }
                self.dispatcher_sender
                    .send(ListenerToDispatcherCmd::Publish {
                        origin_session: session_id,
                        client_id: record.client_id,
                        packet: will,
                    })
                    .await?;
            }
        }
        Ok(())
    }
}
