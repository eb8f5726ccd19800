//! Pub/sub bus and wildcard matcher (components A + C, spec §4.1/§4.3).
//!
//! One [`Matcher`] instance backs both live bus fan-out and the durable
//! subscription index: a client's live tokens and its durable-index
//! tokens are never both present at once (the index row for a client is
//! only written at disconnect and removed again on the next lookup), so
//! a single trie, distinguishing the two kinds of token by prefix, is
//! enough to satisfy both jobs. See DESIGN.md.

use std::collections::HashMap;

use tokio::sync::mpsc::{Receiver, Sender};

use crate::commands::{
    DispatcherToListenerCmd, DispatcherToStorageCmd, ListenerToDispatcherCmd, StorageToDispatcherCmd,
};
use crate::error::Error;
use crate::matcher::Matcher;
use crate::types::{make_token, SessionId};

const LIVE_PREFIX: &str = "live";
const DURABLE_PREFIX: &str = "durable";

fn live_token(session_id: SessionId, filter: &str) -> String {
    format!("{LIVE_PREFIX}:{}", make_token(filter, &session_id.to_string()))
}

fn durable_token(client_id: &str, filter: &str) -> String {
    format!("{DURABLE_PREFIX}:{}", make_token(filter, client_id))
}

#[derive(Debug, Clone)]
struct LiveSub {
    session_id: SessionId,
    filter: String,
    requested_qos: crate::packet::Qos,
}

pub struct Dispatcher {
    matcher: Matcher,
    /// token -> live subscription detail, so a match on a live token can
    /// be turned back into a `Deliver` command.
    live: HashMap<String, LiveSub>,
    /// token -> (client_id, granted qos), the durable-index counterpart of
    /// `live`.
    durable: HashMap<String, (String, crate::packet::Qos)>,

    listener_receiver: Receiver<ListenerToDispatcherCmd>,
    listener_sender: Sender<DispatcherToListenerCmd>,
    storage_receiver: Receiver<StorageToDispatcherCmd>,
    storage_sender: Sender<DispatcherToStorageCmd>,
}

impl Dispatcher {
    #[must_use]
    pub fn new(
        listener_receiver: Receiver<ListenerToDispatcherCmd>,
        listener_sender: Sender<DispatcherToListenerCmd>,
        storage_receiver: Receiver<StorageToDispatcherCmd>,
        storage_sender: Sender<DispatcherToStorageCmd>,
    ) -> Self {
        Self {
            matcher: Matcher::new(),
            live: HashMap::new(),
            durable: HashMap::new(),
            listener_receiver,
            listener_sender,
            storage_receiver,
            storage_sender,
        }
    }

    /// Seeds the durable side of the matcher at startup from persisted
    /// subscription rows (spec §4.5, "rebuild in-memory indices").
    pub fn seed_durable_index(&mut self, rows: Vec<(String, String, crate::packet::Qos)>) {
        for (filter, client_id, qos) in rows {
            let token = durable_token(&client_id, &filter);
            self.matcher.add(&filter, &token);
            self.durable.insert(token, (client_id, qos));
        }
    }

    /// Runs until `shutdown` fires, then returns (spec §4.5 `close`).
    pub async fn run_loop(&mut self, mut shutdown: tokio::sync::broadcast::Receiver<()>) {
        loop {
            tokio::select! {
                Some(cmd) = self.listener_receiver.recv() => {
                    if let Err(err) = self.handle_listener_cmd(cmd).await {
                        log::error!("dispatcher: handle listener cmd failed: {err}");
                    }
                }
                Some(cmd) = self.storage_receiver.recv() => {
                    self.handle_storage_cmd(cmd);
                }
                _ = shutdown.recv() => {
                    log::info!("dispatcher: shutting down");
                    break;
                }
            }
        }
    }

    async fn handle_listener_cmd(&mut self, cmd: ListenerToDispatcherCmd) -> Result<(), Error> {
        match cmd {
            ListenerToDispatcherCmd::Subscribe { session_id, client_id: _, filter, qos } => {
                let token = live_token(session_id, &filter);
                self.matcher.add(&filter, &token);
                self.live.insert(token, LiveSub { session_id, filter, requested_qos: qos });
            }
            ListenerToDispatcherCmd::Unsubscribe { session_id, client_id: _, filter } => {
                let token = live_token(session_id, &filter);
                self.matcher.remove(&token);
                self.live.remove(&token);
            }
            ListenerToDispatcherCmd::UnsubscribeAll { session_id, client_id: _ } => {
                let tokens: Vec<String> = self
                    .live
                    .iter()
                    .filter(|(_, sub)| sub.session_id == session_id)
                    .map(|(token, _)| token.clone())
                    .collect();
                for token in tokens {
                    self.matcher.remove(&token);
                    self.live.remove(&token);
                }
            }
            ListenerToDispatcherCmd::Publish { origin_session: _, client_id, packet } => {
                self.publish(&client_id, packet).await?;
            }
        }
        Ok(())
    }

    async fn publish(&mut self, _publisher_client_id: &str, packet: crate::packet::Packet) -> Result<(), Error> {
        let matches = self.matcher.match_topic(&packet.topic);
        for token in matches {
            if let Some(sub) = self.live.get(&token) {
                self.listener_sender
                    .send(DispatcherToListenerCmd::Deliver {
                        session_id: sub.session_id,
                        filter: sub.filter.clone(),
                        requested_qos: sub.requested_qos,
                        packet: packet.clone(),
                    })
                    .await?;
            } else if let Some((client_id, qos)) = self.durable.get(&token) {
                self.storage_sender
                    .send(DispatcherToStorageCmd::StoreOfflinePacket {
                        client_id: client_id.clone(),
                        packet: packet.clone(),
                        qos: *qos,
                    })
                    .await?;
            }
        }
        Ok(())
    }

    fn handle_storage_cmd(&mut self, cmd: StorageToDispatcherCmd) {
        match cmd {
            StorageToDispatcherCmd::IndexAdd { filter, client_id, qos } => {
                let token = durable_token(&client_id, &filter);
                self.matcher.add(&filter, &token);
                self.durable.insert(token, (client_id, qos));
            }
            StorageToDispatcherCmd::IndexRemove { filter, client_id } => {
                let token = durable_token(&client_id, &filter);
                self.matcher.remove(&token);
                self.durable.remove(&token);
            }
            StorageToDispatcherCmd::IndexRemoveAll { client_id } => {
                let tokens: Vec<String> = self
                    .durable
                    .iter()
                    .filter(|(_, (c, _))| *c == client_id)
                    .map(|(token, _)| token.clone())
                    .collect();
                for token in tokens {
                    self.matcher.remove(&token);
                    self.durable.remove(&token);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::{Packet, Qos};
    use tokio::sync::mpsc;

    fn wire() -> (
        Sender<ListenerToDispatcherCmd>,
        Receiver<DispatcherToListenerCmd>,
        Sender<StorageToDispatcherCmd>,
        Receiver<DispatcherToStorageCmd>,
        Dispatcher,
    ) {
        let (l_tx, l_rx) = mpsc::channel(16);
        let (dl_tx, dl_rx) = mpsc::channel(16);
        let (s_tx, s_rx) = mpsc::channel(16);
        let (ds_tx, ds_rx) = mpsc::channel(16);
        let dispatcher = Dispatcher::new(l_rx, dl_tx, s_rx, ds_tx);
        (l_tx, dl_rx, s_tx, ds_rx, dispatcher)
    }

    #[tokio::test]
    async fn live_subscriber_receives_publish() {
        let (_l_tx, mut dl_rx, _s_tx, _ds_rx, mut dispatcher) = wire();
        dispatcher
            .handle_listener_cmd(ListenerToDispatcherCmd::Subscribe {
                session_id: 1,
                client_id: "sub".to_string(),
                filter: "a/+".to_string(),
                qos: Qos::AtLeastOnce,
            })
            .await
            .unwrap();
        dispatcher
            .publish("pub", Packet::new("a/b", b"hi".to_vec(), Qos::AtLeastOnce))
            .await
            .unwrap();
        match dl_rx.recv().await.unwrap() {
            DispatcherToListenerCmd::Deliver { session_id, .. } => assert_eq!(session_id, 1),
        }
    }

    #[tokio::test]
    async fn durable_index_match_routes_to_storage() {
        let (_l_tx, _dl_rx, _s_tx, mut ds_rx, mut dispatcher) = wire();
        dispatcher.seed_durable_index(vec![("a/+".to_string(), "offline-client".to_string(), Qos::AtLeastOnce)]);
        dispatcher
            .publish("pub", Packet::new("a/b", b"hi".to_vec(), Qos::AtLeastOnce))
            .await
            .unwrap();
        match ds_rx.recv().await.unwrap() {
            DispatcherToStorageCmd::StoreOfflinePacket { client_id, qos, .. } => {
                assert_eq!(client_id, "offline-client");
                assert_eq!(qos, Qos::AtLeastOnce);
            }
        }
    }

    #[tokio::test]
    async fn index_remove_all_clears_durable_tokens() {
        let (_l_tx, _dl_rx, _s_tx, _ds_rx, mut dispatcher) = wire();
        dispatcher.seed_durable_index(vec![("a/+".to_string(), "c1".to_string(), Qos::AtLeastOnce)]);
        dispatcher.handle_storage_cmd(StorageToDispatcherCmd::IndexRemoveAll { client_id: "c1".to_string() });
        assert!(dispatcher.matcher.is_empty());
    }
}
