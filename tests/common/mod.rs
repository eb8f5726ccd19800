//! Spins up a fully-wired broker (storage + dispatcher + listener, the
//! same three actors `ServerContext::run_loop` wires in production) on an
//! ephemeral port, and a tiny raw-socket MQTT client for driving it.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use brokerd::auth::{AllowAll, Hooks};
use brokerd::config::Config;
use brokerd::dispatcher::Dispatcher;
use brokerd::event::EventBus;
use brokerd::storage::Storage;
use brokerd::wire::{self, WireStream};

use futures::{SinkExt, StreamExt};
use rumq_core::mqtt4::{Connect, Packet, QoS, Subscribe, SubscribeTopic, Unsubscribe};
use tokio::net::TcpStream;
use tokio::sync::mpsc;

const TEST_CONFIG: &str = r#"
[general]
max_connections = 1000
base_retry_timeout_ms = 50

[listener]
address = "127.0.0.1:0"
allow_anonymous = true
allow_empty_client_id = true

[ttl]
subscriptions_ms = 3600000
packets_ms = 3600000
check_frequency_ms = 100000
"#;

const CHANNEL_CAPACITY: usize = 64;

/// Boots storage, dispatcher, and listener tasks on an ephemeral port and
/// returns the bound address. The tasks run for the lifetime of the test
/// process (this mirrors how `ServerContext::run_loop` never returns).
pub async fn spawn_broker() -> SocketAddr {
    spawn_broker_with_hooks(Arc::new(AllowAll)).await
}

pub async fn spawn_broker_with_hooks(hooks: Arc<dyn Hooks>) -> SocketAddr {
    let config: Config = toml::from_str(TEST_CONFIG).expect("valid test config");

    let (l2d_tx, l2d_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let (d2l_tx, d2l_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let (l2s_tx, l2s_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let (s2l_tx, s2l_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let (d2s_tx, d2s_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let (s2d_tx, s2d_rx) = mpsc::channel(CHANNEL_CAPACITY);

    let mut storage = Storage::new(config.ttl().clone(), l2s_rx, s2l_tx, d2s_rx, s2d_tx);
    let mut dispatcher = Dispatcher::new(l2d_rx, d2l_tx, s2d_rx, d2s_tx);
    dispatcher.seed_durable_index(storage.rebuild_index());

    let (events, _receiver) = EventBus::new();
    let mut listener = brokerd::listener::Listener::bind(1, &config, hooks, events, l2d_tx, d2l_rx, l2s_tx, s2l_rx)
        .await
        .expect("bind ephemeral listener");
    let addr = listener.local_addr().expect("bound address");

    // Tests never trigger a shutdown; leaking the sender keeps the
    // broadcast channel open for the lifetime of the test process instead
    // of tripping each run_loop's shutdown arm the instant it's dropped.
    let (shutdown_tx, _) = tokio::sync::broadcast::channel::<()>(1);
    let storage_shutdown = shutdown_tx.subscribe();
    let dispatcher_shutdown = shutdown_tx.subscribe();
    let listener_shutdown = shutdown_tx.subscribe();
    std::mem::forget(shutdown_tx);

    tokio::spawn(async move { storage.run_loop(storage_shutdown).await });
    tokio::spawn(async move { dispatcher.run_loop(dispatcher_shutdown).await });
    tokio::spawn(async move { listener.run_loop(listener_shutdown).await });

    addr
}

/// A raw MQTT client, built directly on the same codec the broker uses,
/// for scenario-level assertions that must see exactly what goes over
/// the wire (SUBACK return codes, retained replay, will delivery).
pub struct TestClient {
    stream: WireStream,
}

impl TestClient {
    pub async fn connect(addr: SocketAddr, client_id: &str, clean_session: bool, keep_alive: u16) -> Self {
        let mut client = Self::connect_unacked(addr, client_id, clean_session, keep_alive, None).await;
        client.expect_connack(true).await;
        client
    }

    pub async fn connect_with_will(addr: SocketAddr, client_id: &str, will: rumq_core::mqtt4::Publish) -> Self {
        let mut client = Self::connect_unacked(addr, client_id, true, 60, Some(will)).await;
        client.expect_connack(true).await;
        client
    }

    async fn connect_unacked(
        addr: SocketAddr,
        client_id: &str,
        clean_session: bool,
        keep_alive: u16,
        will: Option<rumq_core::mqtt4::Publish>,
    ) -> Self {
        let tcp = TcpStream::connect(addr).await.expect("connect to broker");
        let mut stream = wire::framed(tcp);

        let mut connect = Connect::new(client_id, keep_alive);
        connect.clean_session = clean_session;
        if let Some(will) = will {
            connect.last_will = Some(rumq_core::mqtt4::LastWill {
                topic: will.topic_name,
                message: String::from_utf8_lossy(&will.payload).into_owned(),
                qos: will.qos,
                retain: will.retain,
            });
        }

        stream.send(Packet::Connect(connect)).await.expect("send CONNECT");
        Self { stream }
    }

    async fn expect_connack(&mut self, accepted: bool) {
        match self.stream.next().await.expect("stream open").expect("decode CONNACK") {
            Packet::Connack(connack) => {
                let ok = matches!(connack.code, rumq_core::mqtt4::ConnectReturnCode::Accepted);
                assert_eq!(ok, accepted, "unexpected CONNACK code {:?}", connack.code);
            }
            other => panic!("expected CONNACK, got {other:?}"),
        }
    }

    pub async fn subscribe(&mut self, pkid: u16, filter: &str, qos: QoS) {
        let subscribe = Subscribe {
            pkid,
            topics: vec![SubscribeTopic { topic_path: filter.to_string(), qos }],
        };
        self.stream.send(Packet::Subscribe(subscribe)).await.expect("send SUBSCRIBE");
        match self.stream.next().await.expect("stream open").expect("decode SUBACK") {
            Packet::Suback(_) => {}
            other => panic!("expected SUBACK, got {other:?}"),
        }
    }

    pub async fn unsubscribe(&mut self, pkid: u16, filter: &str) {
        let unsubscribe = Unsubscribe { pkid, topics: vec![filter.to_string()] };
        self.stream.send(Packet::Unsubscribe(unsubscribe)).await.expect("send UNSUBSCRIBE");
        match self.stream.next().await.expect("stream open").expect("decode UNSUBACK") {
            Packet::Unsuback(_) => {}
            other => panic!("expected UNSUBACK, got {other:?}"),
        }
    }

    pub async fn publish(&mut self, topic: &str, payload: &[u8], qos: QoS, retain: bool) {
        let mut publish = rumq_core::mqtt4::publish(topic.to_string(), qos, payload.to_vec());
        publish.retain = retain;
        if qos != QoS::AtMostOnce {
            publish.pkid = Some(1);
        }
        self.stream.send(Packet::Publish(publish)).await.expect("send PUBLISH");
        if qos != QoS::AtMostOnce {
            match self.stream.next().await.expect("stream open").expect("decode PUBACK") {
                Packet::Puback(_) => {}
                other => panic!("expected PUBACK, got {other:?}"),
            }
        }
    }

    pub async fn disconnect(mut self) {
        let _ = self.stream.send(Packet::Disconnect).await;
    }

    /// Drops the connection without sending DISCONNECT, simulating an
    /// abrupt client failure.
    pub fn abandon(self) {
        drop(self.stream);
    }

    pub async fn recv_publish(&mut self) -> rumq_core::mqtt4::Publish {
        match tokio::time::timeout(Duration::from_secs(2), self.stream.next())
            .await
            .expect("timed out waiting for PUBLISH")
            .expect("stream open")
            .expect("decode frame")
        {
            Packet::Publish(publish) => {
                if publish.qos != QoS::AtMostOnce {
                    let _ = self.stream.send(Packet::Puback(publish.pkid.expect("qos>=1 has pkid"))).await;
                }
                publish
            }
            other => panic!("expected PUBLISH, got {other:?}"),
        }
    }

    pub async fn expect_no_publish_within(&mut self, duration: Duration) {
        let result = tokio::time::timeout(duration, self.stream.next()).await;
        assert!(result.is_err(), "expected no delivery, but got a frame");
    }

    pub async fn expect_closed(&mut self) {
        let frame = tokio::time::timeout(Duration::from_secs(3), self.stream.next())
            .await
            .expect("timed out waiting for close");
        assert!(frame.is_none() || frame.unwrap().is_err(), "expected connection to close");
    }
}
