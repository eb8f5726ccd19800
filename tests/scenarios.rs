//! End-to-end scenarios (SPEC_FULL.md §8, S1-S6) driven against a fully
//! wired broker over real TCP sockets.

mod common;

use std::time::Duration;

use common::{spawn_broker, TestClient};
use rumq_core::mqtt4::QoS;

#[tokio::test]
async fn s1_qos1_durable_offline_delivery() {
    let addr = spawn_broker().await;

    let mut a = TestClient::connect(addr, "client-a", false, 60).await;
    a.subscribe(1, "a/+/c", QoS::AtLeastOnce).await;
    a.disconnect().await;

    let mut b = TestClient::connect(addr, "client-b", true, 60).await;
    b.publish("a/b/c", b"x", QoS::AtLeastOnce, false).await;

    let mut a = TestClient::connect(addr, "client-a", false, 60).await;
    let delivered = a.recv_publish().await;
    assert_eq!(delivered.topic_name, "a/b/c");
    assert_eq!(delivered.payload.as_ref(), b"x");
    assert_eq!(delivered.qos, QoS::AtLeastOnce);

    // The packet was already drained from the offline queue on reconnect;
    // nothing further should arrive.
    a.expect_no_publish_within(Duration::from_millis(200)).await;
}

#[tokio::test]
async fn s2_retained_replay_on_subscribe() {
    let addr = spawn_broker().await;

    let mut b = TestClient::connect(addr, "publisher", true, 60).await;
    b.publish("home/temp", b"21", QoS::AtMostOnce, true).await;

    let mut a = TestClient::connect(addr, "subscriber", true, 60).await;
    a.subscribe(1, "home/#", QoS::AtMostOnce).await;

    let delivered = a.recv_publish().await;
    assert_eq!(delivered.topic_name, "home/temp");
    assert_eq!(delivered.payload.as_ref(), b"21");
}

#[tokio::test]
async fn s3_retained_clear_with_empty_payload() {
    let addr = spawn_broker().await;

    let mut b = TestClient::connect(addr, "publisher", true, 60).await;
    b.publish("home/temp", b"21", QoS::AtMostOnce, true).await;
    b.publish("home/temp", b"", QoS::AtMostOnce, true).await;

    let mut a = TestClient::connect(addr, "subscriber", true, 60).await;
    a.subscribe(1, "home/#", QoS::AtMostOnce).await;
    a.expect_no_publish_within(Duration::from_millis(200)).await;
}

#[tokio::test(start_paused = true)]
async fn s4_keepalive_expiry_closes_idle_connection() {
    let addr = spawn_broker().await;

    let mut a = TestClient::connect(addr, "idle-client", true, 2).await;
    tokio::time::advance(Duration::from_millis(2600)).await;
    a.expect_closed().await;
}

#[tokio::test]
async fn s5_will_delivered_on_abrupt_close_only() {
    let addr = spawn_broker().await;

    let mut subscriber = TestClient::connect(addr, "subscriber", true, 60).await;
    subscriber.subscribe(1, "bye", QoS::AtMostOnce).await;

    let will = rumq_core::mqtt4::publish("bye".to_string(), QoS::AtMostOnce, b"A".to_vec());
    let a = TestClient::connect_with_will(addr, "abrupt-client", will).await;
    a.abandon();

    let delivered = subscriber.recv_publish().await;
    assert_eq!(delivered.topic_name, "bye");
    assert_eq!(delivered.payload.as_ref(), b"A");
}

#[tokio::test]
async fn s5_graceful_disconnect_suppresses_will() {
    let addr = spawn_broker().await;

    let mut subscriber = TestClient::connect(addr, "subscriber2", true, 60).await;
    subscriber.subscribe(1, "bye", QoS::AtMostOnce).await;

    let will = rumq_core::mqtt4::publish("bye".to_string(), QoS::AtMostOnce, b"A".to_vec());
    let a = TestClient::connect_with_will(addr, "graceful-client", will).await;
    a.disconnect().await;

    subscriber.expect_no_publish_within(Duration::from_millis(200)).await;
}

#[tokio::test]
async fn s6_auth_deny_on_publish_closes_connection() {
    let addr = common::spawn_broker_with_hooks(std::sync::Arc::new(DenyPublish)).await;

    let mut a = TestClient::connect(addr, "denied-client", true, 60).await;
    a.publish("a/b", b"nope", QoS::AtMostOnce, false).await;
    a.expect_closed().await;
}

#[derive(Debug)]
struct DenyPublish;

#[async_trait::async_trait]
impl brokerd::auth::Hooks for DenyPublish {
    async fn authenticate(&self, _: &str, _: Option<&str>, _: Option<&[u8]>) -> Result<bool, brokerd::Error> {
        Ok(true)
    }
    async fn authorize_publish(&self, _: &str, _: &str, _: &[u8]) -> Result<bool, brokerd::Error> {
        Ok(false)
    }
    async fn authorize_subscribe(&self, _: &str, _: &str) -> Result<bool, brokerd::Error> {
        Ok(true)
    }
}
