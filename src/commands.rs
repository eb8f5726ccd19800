//! Command enums passed between actor tasks over `mpsc` channels. One
//! enum per direction per subsystem boundary, mirroring the rest of
//! this codebase.

use crate::packet::{Packet, Qos};
use crate::types::SessionId;

/// Listener -> Session.
#[derive(Debug)]
pub enum ListenerToSessionCmd {
    /// CONNACK verdict reached; `true` to proceed, `false` to send
    /// return-code-5 and drop.
    ConnectAck { accepted: bool },
    /// A message delivered to this session, either from a live bus fan-out
    /// or replayed from retained/offline storage.
    Deliver(Packet),
    /// Per-filter authorization verdicts for a SUBSCRIBE, in request order.
    SubAck { pkid: u16, granted: Vec<Option<Qos>> },
    UnsubAck { pkid: u16 },
    /// Authorization verdict for a QoS>=1 PUBLISH from this session.
    /// `accepted: false` has no positive-ack encoding in MQTT 3.1, so the
    /// session closes the connection instead [MQTT-3.3.5-2].
    PublishAck { message_id: Option<u16>, qos: Qos, accepted: bool },
    /// Force-close this session because a newer CONNECT displaced it.
    Displaced,
    /// Broker shutdown in progress: close gracefully, no will published.
    Shutdown,
}

/// Session -> Listener.
#[derive(Debug)]
pub enum SessionToListenerCmd {
    Connect {
        session_id: SessionId,
        client_id: String,
        clean_session: bool,
        keep_alive: u16,
        username: Option<String>,
        password: Option<Vec<u8>>,
        will: Option<Packet>,
    },
    Subscribe {
        session_id: SessionId,
        pkid: u16,
        filters: Vec<(String, Qos)>,
    },
    Unsubscribe {
        session_id: SessionId,
        pkid: u16,
        filters: Vec<String>,
    },
    Publish {
        session_id: SessionId,
        packet: Packet,
    },
    PubAck {
        session_id: SessionId,
        message_id: u16,
    },
    Disconnected {
        session_id: SessionId,
        graceful: bool,
    },
}

/// Listener -> Dispatcher (bus + matcher, component A+C).
#[derive(Debug)]
pub enum ListenerToDispatcherCmd {
    Subscribe {
        session_id: SessionId,
        client_id: String,
        filter: String,
        qos: Qos,
    },
    Unsubscribe {
        session_id: SessionId,
        client_id: String,
        filter: String,
    },
    UnsubscribeAll {
        session_id: SessionId,
        client_id: String,
    },
    Publish {
        origin_session: SessionId,
        client_id: String,
        packet: Packet,
    },
}

/// Dispatcher -> Listener: deliver one matched packet to one subscribed
/// session.
#[derive(Debug)]
pub enum DispatcherToListenerCmd {
    Deliver {
        session_id: SessionId,
        filter: String,
        requested_qos: Qos,
        packet: Packet,
    },
}

/// Listener -> Storage (persistence, component B). Session-triggered
/// operations: retained lookup/store and the reconnect orchestration
/// (§4.5).
#[derive(Debug)]
pub enum ListenerToStorageCmd {
    StoreRetained(Packet),
    /// `requester` is echoed back unchanged so the listener can route the
    /// reply to the right session without guessing from the filter alone.
    /// `qos` is the qos just granted for `filter`, so the reply can be
    /// downgraded to it per [MQTT-3.8.4-6] before delivery.
    LookupRetained {
        requester: SessionId,
        filter: String,
        qos: Qos,
    },
    /// Reconnect orchestration step 1 (§4.5): returns the durable
    /// subscription map, clearing it first if `clean_session`.
    LookupSubscriptions {
        client_id: String,
        clean_session: bool,
    },
    /// Persist the final subscription map for a `clean=false` client that
    /// just disconnected.
    StoreSubscriptions {
        client_id: String,
        clean_session: bool,
        subscriptions: Vec<(String, Qos)>,
    },
    /// Reconnect orchestration step 3: drain offline packets.
    StreamOfflinePackets {
        client_id: String,
        clean_session: bool,
    },
}

#[derive(Debug)]
pub enum StorageToListenerCmd {
    RetainedMatches {
        requester: SessionId,
        qos: Qos,
        packets: Vec<Packet>,
    },
    Subscriptions {
        client_id: String,
        subscriptions: Vec<(String, Qos)>,
    },
    /// Each packet pairs with the qos the durable subscription it matched
    /// was granted at store time, so it can be downgraded at replay
    /// [MQTT-3.8.4-6].
    OfflinePackets {
        client_id: String,
        packets: Vec<(Packet, Qos)>,
    },
}

/// Dispatcher -> Storage: publish-path bookkeeping that does not travel
/// through a specific session.
#[derive(Debug)]
pub enum DispatcherToStorageCmd {
    /// `qos` is the durable subscription's granted qos, looked up from the
    /// dispatcher's own index at routing time.
    StoreOfflinePacket { client_id: String, packet: Packet, qos: Qos },
}

/// Storage -> Dispatcher: mirrors subscription-index changes into the
/// shared matcher (component A) that the dispatcher owns.
#[derive(Debug)]
pub enum StorageToDispatcherCmd {
    IndexAdd {
        filter: String,
        client_id: String,
        qos: Qos,
    },
    IndexRemove {
        filter: String,
        client_id: String,
    },
    IndexRemoveAll {
        client_id: String,
    },
}
