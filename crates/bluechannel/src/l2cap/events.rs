//! Channel events pushed to the host application

use log::trace;
use tokio::sync::broadcast;

use super::psm::Psm;
use super::types::Direction;
use crate::device::{DeviceId, RemoteDevice};

/// Channel events for subscribers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// A session was established and registered
    PeerConnected {
        /// Remote device
        remote: RemoteDevice,
        /// Protocol/Service Multiplexer
        psm: Psm,
        /// Who initiated the session
        direction: Direction,
    },
    /// The stack reported a registered session as gone
    SessionClosed {
        /// Remote device
        remote: DeviceId,
        /// Protocol/Service Multiplexer
        psm: Psm,
        /// Reason for disconnection
        reason: String,
    },
}

/// Fan-out of channel events
#[derive(Debug, Clone)]
pub struct EventNotifier {
    sender: broadcast::Sender<ChannelEvent>,
}

impl EventNotifier {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChannelEvent> {
        self.sender.subscribe()
    }

    /// Emit an event; having no subscribers is fine
    pub fn notify(&self, event: ChannelEvent) {
        trace!("Emitting {:?}", event);
        let _ = self.sender.send(event);
    }
}
