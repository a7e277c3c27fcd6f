//! In-process radio backend
//!
//! `LoopbackRadio` behaves like a native stack without any hardware: it
//! assigns dynamic PSMs, connects outbound channels to in-memory peers and
//! lets callers play the remote side of every session. Completions are
//! queued as [`StackEvent`]s exactly as a native delegate would raise them.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use log::debug;
use tokio::sync::mpsc;

use super::backend::{OpenedChannel, RadioBackend, StackEvent};
use super::psm::{DynamicPsmAllocator, Psm, LE_PSM_DYNAMIC_MIN};
use super::stream::{ChannelStream, MemoryStream};
use super::types::{PowerState, RequestToken};
use crate::device::{DeviceId, RemoteDevice};
use crate::error::{ChannelError, L2capResult};

/// Behaviour of a [`LoopbackRadio`]
#[derive(Debug, Clone)]
pub struct LoopbackConfig {
    /// Power state reported once the radio is initialized
    pub power_state: PowerState,
    /// First PSM handed out by `publish_channel`
    pub first_dynamic_psm: u16,
    /// Whether outbound channels can be opened
    pub supports_outbound: bool,
    /// Bytes buffered per stream direction
    pub stream_capacity: usize,
}

impl Default for LoopbackConfig {
    fn default() -> Self {
        Self {
            power_state: PowerState::PoweredOn,
            first_dynamic_psm: LE_PSM_DYNAMIC_MIN,
            supports_outbound: true,
            stream_capacity: usize::MAX,
        }
    }
}

#[derive(Debug)]
struct LoopbackState {
    power_state: PowerState,
    allocator: DynamicPsmAllocator,
    /// Published PSMs and whether each requires encryption
    published: HashMap<Psm, bool>,
    /// Remote ends of channels opened outbound
    peers: HashMap<(Psm, DeviceId), MemoryStream>,
    fail_next_publish: Option<String>,
    fail_next_open: Option<String>,
    publish_calls: usize,
    unpublish_calls: usize,
    open_calls: usize,
}

/// Simulated radio stack
#[derive(Debug)]
pub struct LoopbackRadio {
    config: LoopbackConfig,
    events: mpsc::UnboundedSender<StackEvent>,
    state: Mutex<LoopbackState>,
}

impl LoopbackRadio {
    /// Create a radio and the event stream to feed into
    /// [`L2capManager::spawn_event_pump`](super::core::L2capManager::spawn_event_pump)
    pub fn new(config: LoopbackConfig) -> (Arc<Self>, mpsc::UnboundedReceiver<StackEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let state = LoopbackState {
            power_state: config.power_state,
            allocator: DynamicPsmAllocator::starting_at(config.first_dynamic_psm),
            published: HashMap::new(),
            peers: HashMap::new(),
            fail_next_publish: None,
            fail_next_open: None,
            publish_calls: 0,
            unpublish_calls: 0,
            open_calls: 0,
        };
        let radio = Arc::new(Self {
            config,
            events,
            state: Mutex::new(state),
        });
        (radio, rx)
    }

    fn lock(&self) -> MutexGuard<'_, LoopbackState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn emit(&self, event: StackEvent) {
        if self.events.send(event).is_err() {
            debug!("Loopback event dropped: no receiver");
        }
    }

    fn new_stream_pair(&self) -> (MemoryStream, MemoryStream) {
        MemoryStream::pair_with_capacity(self.config.stream_capacity)
    }

    /// Change the reported power state
    pub fn set_power_state(&self, state: PowerState) {
        self.lock().power_state = state;
        self.emit(StackEvent::PowerStateChanged(state));
    }

    /// Make the next publish fail with `reason`
    pub fn fail_next_publish(&self, reason: impl Into<String>) {
        self.lock().fail_next_publish = Some(reason.into());
    }

    /// Make the next outbound open fail with `reason`
    pub fn fail_next_open(&self, reason: impl Into<String>) {
        self.lock().fail_next_open = Some(reason.into());
    }

    /// A peer connects to `psm`. Returns the peer's end of the stream.
    pub fn simulate_inbound(&self, psm: Psm, peer: RemoteDevice) -> L2capResult<MemoryStream> {
        let (local, mut remote) = self.new_stream_pair();
        remote.open().map_err(ChannelError::StreamReadFailed)?;
        self.emit(StackEvent::ChannelOpened {
            token: None,
            result: Ok(OpenedChannel {
                psm,
                peer,
                stream: Box::new(local),
            }),
        });
        Ok(remote)
    }

    /// An inbound channel fails to come up
    pub fn simulate_inbound_failure(&self, reason: impl Into<String>) {
        self.emit(StackEvent::ChannelOpened {
            token: None,
            result: Err(reason.into()),
        });
    }

    /// The link to `device` on `psm` drops
    pub fn simulate_disconnect(&self, psm: Psm, device: DeviceId, reason: impl Into<String>) {
        if let Some(mut peer) = self.lock().peers.remove(&(psm, device)) {
            let _ = peer.close();
        }
        self.emit(StackEvent::ChannelClosed {
            psm,
            device,
            reason: reason.into(),
        });
    }

    /// Take the remote end of an outbound channel
    pub fn take_peer_stream(&self, psm: Psm, device: &DeviceId) -> Option<MemoryStream> {
        self.lock().peers.remove(&(psm, *device))
    }

    pub fn is_published(&self, psm: Psm) -> bool {
        self.lock().published.contains_key(&psm)
    }

    /// Whether `psm` was published requiring encryption; `None` if not published
    pub fn published_secure(&self, psm: Psm) -> Option<bool> {
        self.lock().published.get(&psm).copied()
    }

    pub fn publish_calls(&self) -> usize {
        self.lock().publish_calls
    }

    pub fn unpublish_calls(&self) -> usize {
        self.lock().unpublish_calls
    }

    pub fn open_calls(&self) -> usize {
        self.lock().open_calls
    }
}

impl RadioBackend for LoopbackRadio {
    fn initialize(&self) {
        let state = self.lock().power_state;
        debug!("Loopback radio initialized ({})", state);
        self.emit(StackEvent::PowerStateChanged(state));
    }

    fn publish_channel(&self, token: RequestToken, secure: bool) -> L2capResult<()> {
        let result = {
            let mut state = self.lock();
            state.publish_calls += 1;
            match state.fail_next_publish.take() {
                Some(reason) => Err(reason),
                None => match state.allocator.allocate() {
                    Some(psm) => {
                        state.published.insert(psm, secure);
                        Ok(psm)
                    }
                    None => Err("no dynamic PSM available".to_string()),
                },
            }
        };
        self.emit(StackEvent::ChannelPublished { token, result });
        Ok(())
    }

    fn unpublish_channel(&self, token: RequestToken, psm: Psm) -> L2capResult<()> {
        let result = {
            let mut state = self.lock();
            state.unpublish_calls += 1;
            if state.published.remove(&psm).is_some() {
                state.allocator.release(psm);
                Ok(())
            } else {
                Err(format!("psm {} is not published", psm))
            }
        };
        self.emit(StackEvent::ChannelUnpublished { token, psm, result });
        Ok(())
    }

    fn open_channel(
        &self,
        token: RequestToken,
        device: &DeviceId,
        psm: Psm,
        _secure: bool,
    ) -> L2capResult<()> {
        if !self.config.supports_outbound {
            return Err(ChannelError::PlatformUnsupported);
        }

        let failure = {
            let mut state = self.lock();
            state.open_calls += 1;
            state.fail_next_open.take()
        };
        if let Some(reason) = failure {
            self.emit(StackEvent::ChannelOpened {
                token: Some(token),
                result: Err(reason),
            });
            return Ok(());
        }

        let (local, mut remote) = self.new_stream_pair();
        remote.open().map_err(|e| ChannelError::ConnectFailed(e.to_string()))?;
        self.lock().peers.insert((psm, *device), remote);

        self.emit(StackEvent::ChannelOpened {
            token: Some(token),
            result: Ok(OpenedChannel {
                psm,
                peer: RemoteDevice::new(*device),
                stream: Box::new(local),
            }),
        });
        Ok(())
    }
}
