//! Persistence store (component B, spec §4.2).
//!
//! Backed by plain in-memory maps standing in for "the on-disk key-value
//! engine used under persistence", which the spec treats as an external
//! collaborator. The six operations plus `close` are the real contract;
//! swapping this actor's internals for a real embedded database does not
//! change any other module.

mod expiring;

use std::collections::{HashMap, VecDeque};

use tokio::sync::mpsc::{Receiver, Sender};
use tokio::time;

use crate::commands::{
    DispatcherToStorageCmd, ListenerToStorageCmd, StorageToDispatcherCmd, StorageToListenerCmd,
};
use crate::config::Ttl;
use crate::error::Error;
use crate::matcher::filter_matches;
use crate::packet::{Packet, Qos};

use expiring::Expiring;

pub struct Storage {
    retained: HashMap<String, Expiring<Packet>>,
    durable_subs: HashMap<String, Expiring<HashMap<String, Qos>>>,
    // A `VecDeque` per client sidesteps the key-collision problem a keyed
    // store would have for same-millisecond offline publishes: order is
    // preserved and no key needs to be synthesized at all. Each entry
    // carries the qos the matching durable subscription was granted at
    // store time, so replay can downgrade to it [MQTT-3.8.4-6].
    offline_packets: HashMap<String, VecDeque<Expiring<(Packet, Qos)>>>,

    ttl: Ttl,

    listener_receiver: Receiver<ListenerToStorageCmd>,
    listener_sender: Sender<StorageToListenerCmd>,
    dispatcher_receiver: Receiver<DispatcherToStorageCmd>,
    dispatcher_sender: Sender<StorageToDispatcherCmd>,
}

impl Storage {
    #[must_use]
    pub fn new(
        ttl: Ttl,
        listener_receiver: Receiver<ListenerToStorageCmd>,
        listener_sender: Sender<StorageToListenerCmd>,
        dispatcher_receiver: Receiver<DispatcherToStorageCmd>,
        dispatcher_sender: Sender<StorageToDispatcherCmd>,
    ) -> Self {
        Self {
            retained: HashMap::new(),
            durable_subs: HashMap::new(),
            offline_packets: HashMap::new(),
            ttl,
            listener_receiver,
            listener_sender,
            dispatcher_receiver,
            dispatcher_sender,
        }
    }

    /// Snapshot of every persisted subscription-index row, used by the
    /// supervisor to rebuild the matcher at startup (§4.5).
    #[must_use]
    pub fn rebuild_index(&self) -> Vec<(String, String, Qos)> {
        let mut rows = Vec::new();
        for (client_id, record) in &self.durable_subs {
            for (filter, qos) in record.value() {
                rows.push((filter.clone(), client_id.clone(), *qos));
            }
        }
        rows
    }

    /// Runs until `shutdown` fires, then closes persistence and returns
    /// (spec §4.5 `close`).
    pub async fn run_loop(&mut self, mut shutdown: tokio::sync::broadcast::Receiver<()>) {
        let mut sweep = time::interval(self.ttl.check_frequency());
        loop {
            tokio::select! {
                Some(cmd) = self.listener_receiver.recv() => {
                    if let Err(err) = self.handle_listener_cmd(cmd).await {
                        log::error!("storage: handle listener cmd failed: {err}");
                    }
                }
                Some(cmd) = self.dispatcher_receiver.recv() => {
                    if let Err(err) = self.handle_dispatcher_cmd(cmd).await {
                        log::error!("storage: handle dispatcher cmd failed: {err}");
                    }
                }
                _ = sweep.tick() => {
                    self.sweep_expired().await;
                }
                _ = shutdown.recv() => {
                    log::info!("storage: shutting down, closing persistence");
                    self.close();
                    break;
                }
            }
        }
    }

    async fn handle_listener_cmd(&mut self, cmd: ListenerToStorageCmd) -> Result<(), Error> {
        match cmd {
            ListenerToStorageCmd::StoreRetained(packet) => {
                self.store_retained(packet);
            }
            ListenerToStorageCmd::LookupRetained { requester, filter, qos } => {
                let packets = self.lookup_retained(&filter);
                self.listener_sender
                    .send(StorageToListenerCmd::RetainedMatches { requester, qos, packets })
                    .await?;
            }
            ListenerToStorageCmd::StoreSubscriptions {
                client_id,
                clean_session,
                subscriptions,
            } => {
                self.store_subscriptions(client_id, clean_session, subscriptions).await?;
            }
            ListenerToStorageCmd::LookupSubscriptions {
                client_id,
                clean_session,
            } => {
                let subscriptions = self.lookup_subscriptions(&client_id, clean_session).await?;
                self.listener_sender
                    .send(StorageToListenerCmd::Subscriptions { client_id, subscriptions })
                    .await?;
            }
            ListenerToStorageCmd::StreamOfflinePackets { client_id, clean_session } => {
                let packets = self.stream_offline_packets(&client_id, clean_session);
                self.listener_sender
                    .send(StorageToListenerCmd::OfflinePackets { client_id, packets })
                    .await?;
            }
        }
        Ok(())
    }

    async fn handle_dispatcher_cmd(&mut self, cmd: DispatcherToStorageCmd) -> Result<(), Error> {
        match cmd {
            DispatcherToStorageCmd::StoreOfflinePacket { client_id, packet, qos } => {
                self.store_offline_packet(client_id, packet, qos);
            }
        }
        Ok(())
    }

    fn store_retained(&mut self, packet: Packet) {
        if packet.payload.is_empty() {
            self.retained.remove(&packet.topic);
        } else {
            let ttl = self.ttl.retained();
            self.retained.insert(packet.topic.clone(), Expiring::new(packet, ttl));
        }
    }

    fn lookup_retained(&self, filter: &str) -> Vec<Packet> {
        self.retained
            .iter()
            .filter(|(topic, entry)| !entry.is_expired() && filter_matches(filter, topic))
            .map(|(_, entry)| entry.value().clone())
            .collect()
    }

    async fn store_subscriptions(
        &mut self,
        client_id: String,
        clean_session: bool,
        subscriptions: Vec<(String, Qos)>,
    ) -> Result<(), Error> {
        if clean_session {
            return Ok(());
        }

        // Clear whatever was there before (e.g. a prior durable record
        // from a previous disconnect that was never reconnected to).
        self.remove_durable_record(&client_id).await?;

        let durable: HashMap<String, Qos> = subscriptions
            .into_iter()
            .filter(|(_, qos)| *qos == Qos::AtLeastOnce)
            .collect();

        for (filter, qos) in &durable {
            self.dispatcher_sender
                .send(StorageToDispatcherCmd::IndexAdd {
                    filter: filter.clone(),
                    client_id: client_id.clone(),
                    qos: *qos,
                })
                .await?;
        }

        if !durable.is_empty() {
            self.durable_subs
                .insert(client_id, Expiring::new(durable, self.ttl.subscriptions()));
        }
        Ok(())
    }

    async fn lookup_subscriptions(
        &mut self,
        client_id: &str,
        clean_session: bool,
    ) -> Result<Vec<(String, Qos)>, Error> {
        if clean_session {
            self.remove_durable_record(client_id).await?;
            self.discard_offline_packets(client_id);
            return Ok(Vec::new());
        }

        let record = self
            .durable_subs
            .get(client_id)
            .map(|r| r.value().iter().map(|(f, q)| (f.clone(), *q)).collect())
            .unwrap_or_default();

        // The client is reconnecting and will re-register these filters
        // as live bus subscriptions; the durable (offline) record must
        // not coexist with the live one.
        self.remove_durable_record(client_id).await?;

        Ok(record)
    }

    async fn remove_durable_record(&mut self, client_id: &str) -> Result<(), Error> {
        if self.durable_subs.remove(client_id).is_some() {
            self.dispatcher_sender
                .send(StorageToDispatcherCmd::IndexRemoveAll {
                    client_id: client_id.to_string(),
                })
                .await?;
        }
        Ok(())
    }

    fn discard_offline_packets(&mut self, client_id: &str) {
        self.offline_packets.remove(client_id);
    }

    fn store_offline_packet(&mut self, client_id: String, packet: Packet, qos: Qos) {
        let entry = Expiring::new((packet, qos), self.ttl.packets());
        self.offline_packets.entry(client_id).or_default().push_back(entry);
    }

    fn stream_offline_packets(&mut self, client_id: &str, clean_session: bool) -> Vec<(Packet, Qos)> {
        let Some(queue) = self.offline_packets.remove(client_id) else {
            return Vec::new();
        };
        if clean_session {
            return Vec::new();
        }
        queue.into_iter().map(Expiring::into_value).collect()
    }

    async fn sweep_expired(&mut self) {
        self.retained.retain(|_, entry| !entry.is_expired());

        let expired_clients: Vec<String> = self
            .durable_subs
            .iter()
            .filter(|(_, record)| record.is_expired())
            .map(|(client_id, _)| client_id.clone())
            .collect();
        for client_id in expired_clients {
            log::debug!("storage: durable subscription record for {client_id} expired");
            if let Err(err) = self.remove_durable_record(&client_id).await {
                log::warn!("storage: failed to notify dispatcher of expired record: {err}");
            }
        }

        for queue in self.offline_packets.values_mut() {
            queue.retain(|entry| !entry.is_expired());
        }
        self.offline_packets.retain(|_, queue| !queue.is_empty());
    }

    /// Flushes and releases the underlying engine (spec §4.2 `close`).
    /// The in-memory backend has nothing to flush.
    pub fn close(&mut self) {
        self.retained.clear();
        self.durable_subs.clear();
        self.offline_packets.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn channels() -> (
        Sender<ListenerToStorageCmd>,
        Receiver<StorageToListenerCmd>,
        Sender<DispatcherToStorageCmd>,
        Receiver<StorageToDispatcherCmd>,
        Storage,
    ) {
        let (l_tx, l_rx) = mpsc::channel(16);
        let (sl_tx, sl_rx) = mpsc::channel(16);
        let (d_tx, d_rx) = mpsc::channel(16);
        let (sd_tx, sd_rx) = mpsc::channel(16);
        let storage = Storage::new(Ttl::default(), l_rx, sl_tx, d_rx, sd_tx);
        (l_tx, sl_rx, d_tx, sd_rx, storage)
    }

    #[test]
    fn retain_empty_payload_deletes() {
        let (_l_tx, _sl_rx, _d_tx, _sd_rx, mut storage) = channels();
        storage.store_retained(Packet::new("a/b", b"21".to_vec(), Qos::AtMostOnce));
        assert_eq!(storage.lookup_retained("a/#").len(), 1);
        storage.store_retained(Packet::new("a/b", Vec::new(), Qos::AtMostOnce));
        assert!(storage.lookup_retained("a/#").is_empty());
    }

    #[tokio::test]
    async fn retained_sweep_expires_stale_entries() {
        let (l_tx, sl_rx, d_tx, sd_rx, mut storage) = channels();
        drop((l_tx, sl_rx, d_tx, sd_rx));
        storage.ttl = storage.ttl.clone().with_retained_ms(1);
        storage.store_retained(Packet::new("a/b", b"21".to_vec(), Qos::AtMostOnce));
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(storage.lookup_retained("a/#").is_empty());
        storage.sweep_expired().await;
        assert!(storage.retained.is_empty());
    }

    #[tokio::test]
    async fn clean_session_lookup_clears_everything() {
        let (_l_tx, mut sl_rx, _d_tx, mut sd_rx, mut storage) = channels();
        storage
            .store_subscriptions(
                "a".to_string(),
                false,
                vec![("x/y".to_string(), Qos::AtLeastOnce)],
            )
            .await
            .unwrap();
        sd_rx.recv().await.unwrap(); // IndexAdd
        storage.store_offline_packet("a".to_string(), Packet::new("x/y", b"1".to_vec(), Qos::AtLeastOnce), Qos::AtLeastOnce);

        let subs = storage.lookup_subscriptions("a", true).await.unwrap();
        assert!(subs.is_empty());
        assert!(storage.offline_packets.get("a").is_none());
        let _ = sl_rx.try_recv();
        match sd_rx.recv().await.unwrap() {
            StorageToDispatcherCmd::IndexRemoveAll { client_id } => assert_eq!(client_id, "a"),
            other => panic!("unexpected: {other:?}"),
        }
    }
}
