use tokio::sync::{broadcast, mpsc};

use super::Listener;
use super::CHANNEL_CAPACITY;
use crate::commands::ListenerToSessionCmd;
use crate::session::{Session, SessionConfig};
use crate::wire;

impl Listener {
    /// Runs the accept loop until `shutdown` fires, then closes every live
    /// connection in parallel and returns (spec §4.5 `close`).
    ///
    /// # Panics
    ///
    /// Panics if called more than once (the inner receivers are taken on
    /// the first call).
    pub async fn run_loop(&mut self, mut shutdown: broadcast::Receiver<()>) {
        let mut session_receiver = self.session_receiver.take().expect("run_loop called twice");
        let mut dispatcher_receiver = self.dispatcher_receiver.take().expect("run_loop called twice");
        let mut storage_receiver = self.storage_receiver.take().expect("run_loop called twice");

        loop {
            tokio::select! {
                accepted = self.tcp.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            if self.session_senders.len() >= self.max_connections {
                                log::warn!("listener: max_connections reached, rejecting {peer}");
                                continue;
                            }
                            log::debug!("listener: accepted connection from {peer}");
                            self.spawn_session(stream);
                        }
                        Err(err) => log::error!("listener: accept failed: {err}"),
                    }
                }
                Some(cmd) = session_receiver.recv() => {
                    if let Err(err) = self.handle_session_cmd(cmd).await {
                        log::error!("listener: handle session cmd failed: {err}");
                    }
                }
                Some(cmd) = dispatcher_receiver.recv() => {
                    if let Err(err) = self.handle_dispatcher_cmd(cmd).await {
                        log::error!("listener: handle dispatcher cmd failed: {err}");
                    }
                }
                Some(cmd) = storage_receiver.recv() => {
                    if let Err(err) = self.handle_storage_cmd(cmd).await {
                        log::error!("listener: handle storage cmd failed: {err}");
                    }
                }
                _ = shutdown.recv() => {
                    log::info!("listener: shutting down, closing {} live connections", self.session_senders.len());
                    for sender in self.session_senders.values() {
                        let _ = sender.send(ListenerToSessionCmd::Shutdown).await;
                    }
                    break;
                }
            }
        }
    }

    fn spawn_session(&mut self, stream: tokio::net::TcpStream) {
        let session_id = self.next_session_id();
        let (to_session, from_listener) = mpsc::channel(CHANNEL_CAPACITY);
        self.session_senders.insert(session_id, to_session);

        let config = SessionConfig::new(self.allow_empty_client_id, self.base_retry_timeout);
        let session = Session::new(session_id, config, wire::framed(stream), self.session_sender.clone(), from_listener);
        tokio::spawn(session.run_loop());
    }
}
