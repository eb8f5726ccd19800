//! Handles matched-publish deliveries arriving from the dispatcher.

use crate::commands::{DispatcherToListenerCmd, ListenerToSessionCmd};
use crate::error::Error;

impl super::Listener {
    pub(super) async fn handle_dispatcher_cmd(&mut self, cmd: DispatcherToListenerCmd) -> Result<(), Error> {
        match cmd {
            DispatcherToListenerCmd::Deliver { session_id, filter, requested_qos, mut packet } => {
                // The live bus registration's qos is fixed at subscribe
                // time and never updated by a re-SUBSCRIBE (preserved
                // quirk, see SPEC_FULL.md open question "duplicate
                // subscribe"); the listener's own subscriptions map is
                // the one a re-SUBSCRIBE does update, so prefer it here.
                let effective_qos = self
                    .subscriptions
                    .get(&session_id)
                    .and_then(|subs| subs.get(&filter))
                    .copied()
                    .unwrap_or(requested_qos);
                // The effective QoS of a delivery is the lesser of what the
                // publisher sent and what the subscriber asked for
                // [MQTT-3.8.4-6].
                packet.qos = packet.qos.min(effective_qos);
                if let Some(sender) = self.session_senders.get(&session_id) {
                    sender.send(ListenerToSessionCmd::Deliver(packet)).await?;
                }
                Ok(())
            }
        }
    }
}
