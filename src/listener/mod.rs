//! Server supervisor (component E, spec §4.5): the TCP accept loop, the
//! client registry, and the orchestration between sessions, the pluggable
//! auth hooks, the dispatcher, and storage.

mod dispatcher_cmd;
mod init;
mod run;
mod session_cmd;
mod storage_cmd;

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener as TokioTcpListener;
use tokio::sync::mpsc::{Receiver, Sender};

use crate::auth::Hooks;
use crate::commands::{
    DispatcherToListenerCmd, ListenerToDispatcherCmd, ListenerToSessionCmd, ListenerToStorageCmd,
    SessionToListenerCmd, StorageToListenerCmd,
};
use crate::event::EventBus;
use crate::packet::Packet;
use crate::types::{ListenerId, SessionId};

const CHANNEL_CAPACITY: usize = 64;

/// Bookkeeping for a CONNECT that authenticated but is still waiting on
/// the durable-subscription lookup and offline-packet replay before the
/// CONNACK can be sent (spec §4.5 reconnect orchestration).
struct PendingConnect {
    session_id: SessionId,
    will: Option<Packet>,
    clean_session: bool,
}

/// A registered, fully connected client.
struct SessionRecord {
    client_id: String,
    clean_session: bool,
    will: Option<Packet>,
}

pub struct Listener {
    id: ListenerId,
    tcp: TokioTcpListener,
    allow_anonymous: bool,
    allow_empty_client_id: bool,
    max_connections: usize,
    base_retry_timeout: Duration,

    current_session_id: SessionId,
    session_senders: HashMap<SessionId, Sender<ListenerToSessionCmd>>,
    client_ids: BTreeMap<String, SessionId>,
    sessions: HashMap<SessionId, SessionRecord>,
    /// Session ids being torn down because a newer CONNECT for the same
    /// client id displaced them; their eventual `Disconnected` cmd must
    /// not publish a will or overwrite the new session's registry entry.
    displacing: HashSet<SessionId>,

    pending_connects: HashMap<String, PendingConnect>,
    /// Live per-session subscription state, mirrored here because the
    /// dispatcher owns the matcher and never reports it back; needed to
    /// reconstruct the final set to persist at disconnect time.
    subscriptions: HashMap<SessionId, HashMap<String, crate::packet::Qos>>,

    hooks: Arc<dyn Hooks>,
    events: EventBus,

    session_sender: Sender<SessionToListenerCmd>,
    session_receiver: Option<Receiver<SessionToListenerCmd>>,

    dispatcher_sender: Sender<ListenerToDispatcherCmd>,
    dispatcher_receiver: Option<Receiver<DispatcherToListenerCmd>>,

    storage_sender: Sender<ListenerToStorageCmd>,
    storage_receiver: Option<Receiver<StorageToListenerCmd>>,
}
