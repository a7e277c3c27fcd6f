//! Radio backend interface
//!
//! The manager talks to the native stack through [`RadioBackend`] and hears
//! back through [`StackEvent`]s. Backends never call into the manager
//! directly; they queue events that are applied by
//! [`L2capManager::handle_stack_event`](super::core::L2capManager::handle_stack_event),
//! usually through the event pump.

use std::fmt;

use super::psm::Psm;
use super::stream::ChannelStream;
use super::types::{PowerState, RequestToken};
use crate::device::{DeviceId, RemoteDevice};
use crate::error::L2capResult;

/// Requests the manager issues to the underlying radio stack.
///
/// Each asynchronous request carries a token that the stack must echo in
/// its completion event. An `Err` return means the stack rejected the
/// request outright and no completion event will follow.
pub trait RadioBackend: Send + Sync {
    /// Create the native manager object. Called once, on first use; the
    /// stack reports the resulting state with `PowerStateChanged`.
    fn initialize(&self);

    /// Publish a server channel; completes with `ChannelPublished`
    fn publish_channel(&self, token: RequestToken, secure: bool) -> L2capResult<()>;

    /// Unpublish a server channel; completes with `ChannelUnpublished`
    fn unpublish_channel(&self, token: RequestToken, psm: Psm) -> L2capResult<()>;

    /// Open an outbound channel; completes with `ChannelOpened`
    fn open_channel(
        &self,
        token: RequestToken,
        device: &DeviceId,
        psm: Psm,
        secure: bool,
    ) -> L2capResult<()>;
}

/// A channel whose transport is up, ready to become a session
pub struct OpenedChannel {
    pub psm: Psm,
    pub peer: RemoteDevice,
    pub stream: Box<dyn ChannelStream>,
}

impl fmt::Debug for OpenedChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenedChannel")
            .field("psm", &self.psm)
            .field("peer", &self.peer)
            .finish_non_exhaustive()
    }
}

/// Completion and notification events raised by the radio stack
#[derive(Debug)]
pub enum StackEvent {
    /// Adapter power state changed
    PowerStateChanged(PowerState),
    /// Result of `publish_channel`
    ChannelPublished {
        token: RequestToken,
        result: Result<Psm, String>,
    },
    /// Result of `unpublish_channel`
    ChannelUnpublished {
        token: RequestToken,
        psm: Psm,
        result: Result<(), String>,
    },
    /// A channel opened. Without a token this is a peer connecting to one
    /// of our server channels; with a token it answers `open_channel`.
    ChannelOpened {
        token: Option<RequestToken>,
        result: Result<OpenedChannel, String>,
    },
    /// The stack lost an established channel
    ChannelClosed {
        psm: Psm,
        device: DeviceId,
        reason: String,
    },
}
