//! Binds the listening socket and wires up the channels to the
//! dispatcher and storage actors.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use tokio::net::TcpListener as TokioTcpListener;
use tokio::sync::mpsc;

use super::{Listener, CHANNEL_CAPACITY};
use crate::auth::Hooks;
use crate::commands::{DispatcherToListenerCmd, ListenerToDispatcherCmd, ListenerToStorageCmd, StorageToListenerCmd};
use crate::config::Config;
use crate::error::Error;
use crate::event::EventBus;
use crate::types::ListenerId;

impl Listener {
    /// # Errors
    ///
    /// Returns an error if the configured address cannot be bound.
    #[allow(clippy::too_many_arguments)]
    pub async fn bind(
        id: ListenerId,
        config: &Config,
        hooks: Arc<dyn Hooks>,
        events: EventBus,
        dispatcher_sender: mpsc::Sender<ListenerToDispatcherCmd>,
        dispatcher_receiver: mpsc::Receiver<DispatcherToListenerCmd>,
        storage_sender: mpsc::Sender<ListenerToStorageCmd>,
        storage_receiver: mpsc::Receiver<StorageToListenerCmd>,
    ) -> Result<Self, Error> {
        let address = config.listener().address();
        log::info!("listener: binding mqtt://{address}");
        let tcp = TokioTcpListener::bind(address).await?;

        let (session_sender, session_receiver) = mpsc::channel(CHANNEL_CAPACITY);

        Ok(Self {
            id,
            tcp,
            allow_anonymous: config.listener().allow_anonymous(),
            allow_empty_client_id: config.listener().allow_empty_client_id(),
            max_connections: config.general().max_connections(),
            base_retry_timeout: std::time::Duration::from_millis(config.general().base_retry_timeout_ms()),

            current_session_id: 0,
            session_senders: HashMap::new(),
            client_ids: BTreeMap::new(),
            sessions: HashMap::new(),
            displacing: HashSet::new(),
            pending_connects: HashMap::new(),
            subscriptions: HashMap::new(),

            hooks,
            events,

            session_sender,
            session_receiver: Some(session_receiver),

            dispatcher_sender,
            dispatcher_receiver: Some(dispatcher_receiver),

            storage_sender,
            storage_receiver: Some(storage_receiver),
        })
    }

    pub(super) fn next_session_id(&mut self) -> crate::types::SessionId {
        self.current_session_id += 1;
        self.current_session_id
    }
}

impl Listener {
    /// The address actually bound, useful when the configured address
    /// uses an ephemeral port (`:0`), e.g. in integration tests.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying socket has no local address.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.tcp.local_addr()
    }
}
