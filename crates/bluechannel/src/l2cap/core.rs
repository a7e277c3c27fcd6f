//! L2CAP Core Manager implementation
//!
//! This module provides the manager that ties the subsystem together:
//! - Publishing and unpublishing server channels
//! - Initiating outbound channels
//! - Accepting inbound sessions reported by the stack
//! - Reading, writing and closing sessions
//!
//! All registry and pending-request state lives behind one mutex, which is
//! never held across an `.await`.

use std::collections::HashSet;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use log::{debug, error, info, trace, warn};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;

use super::backend::{OpenedChannel, RadioBackend, StackEvent};
use super::events::{ChannelEvent, EventNotifier};
use super::pending::{PendingRequest, PendingRequests};
use super::power::PowerStateGate;
use super::psm::Psm;
use super::registry::{ChannelRegistry, ServerChannelInfo};
use super::session::{ConnectionSession, SessionInfo};
use super::types::{ChannelOrigin, Direction, PowerState, RequestToken};
use crate::config::ManagerConfig;
use crate::device::DeviceId;
use crate::error::{ChannelError, L2capResult};

/// Result of a single bounded read
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadOutcome {
    pub device: DeviceId,
    pub psm: Psm,
    pub payload: Vec<u8>,
}

impl ReadOutcome {
    pub fn bytes_read(&self) -> usize {
        self.payload.len()
    }
}

/// State guarded by the manager's single lock
#[derive(Debug, Default)]
struct ManagerState {
    registry: ChannelRegistry,
    pending: PendingRequests,
    /// PSMs torn down locally whose unpublish has not completed yet
    closing: HashSet<Psm>,
}

struct Inner {
    backend: Arc<dyn RadioBackend>,
    power: PowerStateGate,
    state: Mutex<ManagerState>,
    events: EventNotifier,
    config: ManagerConfig,
}

/// L2CAP Manager responsible for channel and session management
#[derive(Clone)]
pub struct L2capManager {
    inner: Arc<Inner>,
}

impl L2capManager {
    /// Create a new manager on top of a radio backend
    pub fn new(backend: Arc<dyn RadioBackend>, config: ManagerConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                power: PowerStateGate::new(backend.clone()),
                backend,
                state: Mutex::new(ManagerState::default()),
                events: EventNotifier::new(config.event_capacity),
                config,
            }),
        }
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.inner.config
    }

    fn lock_state(&self) -> MutexGuard<'_, ManagerState> {
        // Registry mutations complete before any call that could panic
        self.inner
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Current radio power state, without waiting
    pub fn power_state(&self) -> PowerState {
        self.inner.power.current_state()
    }

    /// Wait until the radio has reported a power state
    pub async fn await_powered_on(&self) -> PowerState {
        self.inner.power.await_powered_on().await
    }

    /// Subscribe to channel events
    pub fn subscribe(&self) -> broadcast::Receiver<ChannelEvent> {
        self.inner.events.subscribe()
    }

    async fn require_powered_on(&self) -> L2capResult<()> {
        let state = self.inner.power.await_powered_on().await;
        if state != PowerState::PoweredOn {
            debug!("Radio is not powered on ({}), refusing request", state);
            return Err(ChannelError::RadioNotReady(state));
        }
        Ok(())
    }

    async fn await_reply<T>(&self, reply: oneshot::Receiver<L2capResult<T>>) -> L2capResult<T> {
        reply.await.map_err(|_| ChannelError::RequestAbandoned)?
    }

    /// Publish a server channel and return the PSM the stack assigned
    pub async fn listen(&self, secure: bool) -> L2capResult<Psm> {
        self.require_powered_on().await?;

        let (reply, rx) = oneshot::channel();
        let token = self
            .lock_state()
            .pending
            .insert(PendingRequest::Listen { secure, reply });

        debug!("Publishing L2CAP channel (secure: {}) as {}", secure, token);
        if let Err(e) = self.inner.backend.publish_channel(token, secure) {
            self.lock_state().pending.take(token);
            error!("Publishing L2CAP channel rejected: {}", e);
            return Err(e);
        }

        self.await_reply(rx).await
    }

    /// Open an outbound channel to `remote_id` on `psm`
    pub async fn connect(&self, remote_id: &str, psm: Psm, secure: bool) -> L2capResult<Psm> {
        let device: DeviceId = remote_id.parse()?;
        self.require_powered_on().await?;

        let (reply, rx) = oneshot::channel();
        let token = self
            .lock_state()
            .pending
            .insert(PendingRequest::Connect { device, psm, reply });

        debug!("Opening L2CAP channel to {} / psm {} as {}", device, psm, token);
        if let Err(e) = self.inner.backend.open_channel(token, &device, psm, secure) {
            self.lock_state().pending.take(token);
            error!("Opening L2CAP channel to {} rejected: {}", device, e);
            return Err(e);
        }

        self.await_reply(rx).await
    }

    /// Close every session on `psm` and unpublish it.
    ///
    /// Closing a PSM that is not known is a successful no-op.
    pub async fn close_server(&self, psm: Psm) -> L2capResult<()> {
        let (reply, rx) = oneshot::channel();
        let token = {
            let mut state = self.lock_state();
            let Some(mut channel) = state.registry.remove_channel(psm) else {
                debug!("No server channel found with psm {}", psm);
                return Ok(());
            };

            let closed = channel.close_all();
            info!("Closed {} session(s) on psm {}", closed, psm);

            if channel.origin() == ChannelOrigin::Implicit {
                return Ok(());
            }
            state.closing.insert(psm);
            state.pending.insert(PendingRequest::CloseServer { psm, reply })
        };

        debug!("Unpublishing L2CAP channel {} as {}", psm, token);
        if let Err(e) = self.inner.backend.unpublish_channel(token, psm) {
            let mut state = self.lock_state();
            state.pending.take(token);
            state.closing.remove(&psm);
            error!("Unpublishing psm {} rejected: {}", psm, e);
            return Err(e);
        }

        self.await_reply(rx).await
    }

    /// Read whatever is available on the session, up to the read buffer size
    pub fn read(&self, psm: Psm, remote_id: &str) -> L2capResult<ReadOutcome> {
        let device: DeviceId = remote_id.parse()?;
        let mut state = self.lock_state();
        let session = state
            .registry
            .session_mut(psm, &device)
            .ok_or(ChannelError::ChannelNotFound { psm, device })?;

        let payload = session.read().map_err(|e| {
            error!("Read from {} / psm {} failed: {}", device, psm, e);
            e
        })?;

        Ok(ReadOutcome {
            device,
            psm,
            payload,
        })
    }

    /// Write `payload` to the session, returning the number of bytes accepted
    pub fn write(&self, psm: Psm, remote_id: &str, payload: &[u8]) -> L2capResult<usize> {
        let device: DeviceId = remote_id.parse()?;
        let mut state = self.lock_state();
        let session = state
            .registry
            .session_mut(psm, &device)
            .ok_or(ChannelError::ChannelNotFound { psm, device })?;

        let written = session.write(payload).map_err(|e| {
            error!("Write to {} / psm {} failed: {}", device, psm, e);
            e
        })?;
        if written < payload.len() {
            warn!("Short write to {}: {} of {} bytes", device, written, payload.len());
        }

        Ok(written)
    }

    /// Close one session. Closing a session that does not exist succeeds.
    pub fn close(&self, psm: Psm, remote_id: &str) -> L2capResult<()> {
        let device: DeviceId = remote_id.parse()?;
        let mut state = self.lock_state();
        match state.registry.remove_session(psm, &device) {
            Some(mut session) => {
                if let Err(e) = session.close() {
                    warn!("Error closing streams of {} / psm {}: {}", device, psm, e);
                }
                info!("Closed L2CAP session with {} / psm {}", device, psm);
            }
            None => debug!("No channel found matching device {} / psm {}", device, psm),
        }
        Ok(())
    }

    /// Snapshot of all server channels
    pub fn server_channels(&self) -> Vec<ServerChannelInfo> {
        self.lock_state().registry.server_channels()
    }

    /// Snapshot of all open sessions
    pub fn sessions(&self) -> Vec<SessionInfo> {
        self.lock_state().registry.sessions()
    }

    /// Number of requests waiting for a stack completion
    pub fn pending_requests(&self) -> usize {
        self.lock_state().pending.len()
    }

    /// Apply one event raised by the radio stack
    pub fn handle_stack_event(&self, event: StackEvent) {
        trace!("Handling stack event {:?}", event);
        match event {
            StackEvent::PowerStateChanged(state) => self.handle_power_state(state),
            StackEvent::ChannelPublished { token, result } => self.handle_published(token, result),
            StackEvent::ChannelUnpublished { token, psm, result } => {
                self.handle_unpublished(token, psm, result)
            }
            StackEvent::ChannelOpened { token, result } => self.handle_opened(token, result),
            StackEvent::ChannelClosed {
                psm,
                device,
                reason,
            } => self.handle_closed(psm, device, reason),
        }
    }

    /// Apply stack events from `events` on a background task until the
    /// sender side goes away or the manager is dropped
    pub fn spawn_event_pump(&self, mut events: mpsc::UnboundedReceiver<StackEvent>) -> JoinHandle<()> {
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                L2capManager { inner }.handle_stack_event(event);
            }
            debug!("Stack event pump stopped");
        })
    }

    fn handle_power_state(&self, state: PowerState) {
        self.inner.power.set_state(state);
        if !state.is_known() || state == PowerState::PoweredOn {
            return;
        }

        let drained = {
            let mut state = self.lock_state();
            state.closing.clear();
            state.pending.drain_where(|_| true)
        };
        for request in drained {
            warn!("Failing pending {} request: radio is {}", request.kind(), state);
            match request {
                PendingRequest::Listen { reply, .. } | PendingRequest::Connect { reply, .. } => {
                    let _ = reply.send(Err(ChannelError::RadioNotReady(state)));
                }
                // The channel is gone along with the radio
                PendingRequest::CloseServer { reply, .. } => {
                    let _ = reply.send(Ok(()));
                }
            }
        }
    }

    fn handle_published(&self, token: RequestToken, result: Result<Psm, String>) {
        let mut state = self.lock_state();
        let request = state
            .pending
            .take_if(token, |r| matches!(r, PendingRequest::Listen { .. }));

        let Some(PendingRequest::Listen { secure, reply }) = request else {
            warn!("Publish completion {} does not match a pending listen request", token);
            return;
        };

        match result {
            Ok(psm) => {
                info!("Published L2CAP channel with psm {} successfully", psm);
                state.registry.publish(psm, secure);
                let _ = reply.send(Ok(psm));
            }
            Err(reason) => {
                error!("Publishing L2CAP channel failed: {}", reason);
                let _ = reply.send(Err(ChannelError::PublishFailed(reason)));
            }
        }
    }

    fn handle_unpublished(&self, token: RequestToken, psm: Psm, result: Result<(), String>) {
        let request = {
            let mut state = self.lock_state();
            let request = state
                .pending
                .take_if(token, |r| matches!(r, PendingRequest::CloseServer { .. }));
            if let Some(PendingRequest::CloseServer { psm, .. }) = &request {
                state.closing.remove(psm);
            }
            request
        };

        let Some(PendingRequest::CloseServer { reply, .. }) = request else {
            warn!("Unpublish completion {} for psm {} has no pending request", token, psm);
            return;
        };

        let outcome = result.map_err(|reason| {
            error!("Unpublishing psm {} failed: {}", psm, reason);
            ChannelError::UnpublishFailed(reason)
        });
        if outcome.is_ok() {
            info!("Unpublished L2CAP channel with psm {}", psm);
        }
        let _ = reply.send(outcome);
    }

    fn handle_opened(&self, token: Option<RequestToken>, result: Result<OpenedChannel, String>) {
        let mut state = self.lock_state();

        let Some(token) = token else {
            match result {
                Ok(mut channel) if state.closing.contains(&channel.psm) => {
                    warn!(
                        "Rejecting {} on psm {}: server channel is closing",
                        channel.peer.id, channel.psm
                    );
                    if let Err(e) = channel.stream.close() {
                        warn!("Error closing rejected stream of {}: {}", channel.peer.id, e);
                    }
                }
                Ok(channel) => {
                    if let Err(e) = self.install_session(&mut state, channel, Direction::Inbound) {
                        error!("Accepting inbound channel failed: {}", e);
                    }
                }
                Err(reason) => error!("Inbound channel failed to open: {}", reason),
            }
            return;
        };

        let request = state
            .pending
            .take_if(token, |r| matches!(r, PendingRequest::Connect { .. }));
        let Some(PendingRequest::Connect { device, psm, reply }) = request else {
            warn!("Open completion {} does not match a pending connect request", token);
            if let Ok(mut channel) = result {
                let _ = channel.stream.close();
            }
            return;
        };

        let outcome = match result {
            Ok(channel) => {
                if channel.peer.id != device || channel.psm != psm {
                    warn!(
                        "Requested {} / psm {} but stack opened {} / psm {}",
                        device, psm, channel.peer.id, channel.psm
                    );
                }
                self.install_session(&mut state, channel, Direction::Outbound)
                    .map_err(|e| ChannelError::ConnectFailed(e.to_string()))
            }
            Err(reason) => Err(ChannelError::ConnectFailed(reason)),
        };
        if let Err(e) = &outcome {
            error!("Connecting to {} / psm {} failed: {}", device, psm, e);
        }
        let _ = reply.send(outcome);
    }

    fn install_session(
        &self,
        state: &mut ManagerState,
        channel: OpenedChannel,
        direction: Direction,
    ) -> io::Result<Psm> {
        let OpenedChannel { psm, peer, stream } = channel;
        let mut session = ConnectionSession::new(
            psm,
            peer.clone(),
            direction,
            stream,
            self.inner.config.read_buffer_size,
        );
        session.open()?;

        if let Some(mut displaced) = state.registry.install_session(session) {
            warn!("Replacing existing session with {} on psm {}", peer.id, psm);
            if let Err(e) = displaced.close() {
                warn!("Error closing streams of {} / psm {}: {}", peer.id, psm, e);
            }
        }
        info!("L2CAP session with {} / psm {} opened ({:?})", peer.id, psm, direction);

        self.inner.events.notify(ChannelEvent::PeerConnected {
            remote: peer,
            psm,
            direction,
        });
        Ok(psm)
    }

    fn handle_closed(&self, psm: Psm, device: DeviceId, reason: String) {
        let removed = self.lock_state().registry.remove_session(psm, &device);
        let Some(mut session) = removed else {
            debug!("Stack closed unknown session {} / psm {}", device, psm);
            return;
        };

        if let Err(e) = session.close() {
            warn!("Error closing streams of {} / psm {}: {}", device, psm, e);
        }
        info!("L2CAP session with {} / psm {} lost: {}", device, psm, reason);
        self.inner.events.notify(ChannelEvent::SessionClosed {
            remote: device,
            psm,
            reason,
        });
    }
}
