use tokio::sync::{broadcast, mpsc};

use crate::dispatcher::Dispatcher;
use crate::error::Error;
use crate::event::Event;
use crate::listener::Listener;
use crate::storage::Storage;

const CHANNEL_CAPACITY: usize = 64;

impl super::ServerContext {
    /// Wires the dispatcher, storage, and listener actors together and
    /// runs them until ctrl-c, then shuts every actor down in parallel
    /// and closes persistence (spec §4.5 `close`).
    ///
    /// # Errors
    ///
    /// Returns an error if the listener fails to bind its socket.
    pub async fn run_loop(&mut self) -> Result<(), Error> {
        let (l2d_tx, l2d_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (d2l_tx, d2l_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (l2s_tx, l2s_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (s2l_tx, s2l_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (d2s_tx, d2s_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (s2d_tx, s2d_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (shutdown_tx, _) = broadcast::channel::<()>(1);

        let mut storage = Storage::new(self.config.ttl().clone(), l2s_rx, s2l_tx, d2s_rx, s2d_tx);
        let mut dispatcher = Dispatcher::new(l2d_rx, d2l_tx, s2d_rx, d2s_tx);
        dispatcher.seed_durable_index(storage.rebuild_index());

        let mut listener =
            Listener::bind(1, &self.config, self.hooks.clone(), self.events.clone(), l2d_tx, d2l_rx, l2s_tx, s2l_rx).await?;

        log::info!("brokerd: starting storage, dispatcher, and listener tasks");
        let storage_shutdown = shutdown_tx.subscribe();
        let dispatcher_shutdown = shutdown_tx.subscribe();
        let listener_shutdown = shutdown_tx.subscribe();
        let storage_task = tokio::spawn(async move { storage.run_loop(storage_shutdown).await });
        let dispatcher_task = tokio::spawn(async move { dispatcher.run_loop(dispatcher_shutdown).await });
        let listener_task = tokio::spawn(async move { listener.run_loop(listener_shutdown).await });

        self.events.emit(Event::Ready);

        if let Err(err) = tokio::signal::ctrl_c().await {
            log::error!("brokerd: failed to listen for ctrl-c: {err}");
        }
        log::info!("brokerd: shutdown signal received");
        let _ = shutdown_tx.send(());

        let _ = tokio::join!(listener_task, dispatcher_task, storage_task);
        self.events.emit(Event::Closed);
        Ok(())
    }
}
