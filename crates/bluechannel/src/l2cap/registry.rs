//! Channel registry
//!
//! Maps a PSM to its [`ServerChannel`] and, through it, (PSM, device) to the
//! open [`ConnectionSession`]. The registry is the only owner of sessions:
//! removing a server channel drops every session it holds.

use std::collections::HashMap;

use log::{debug, warn};

use super::psm::Psm;
use super::session::{ConnectionSession, SessionInfo};
use super::types::ChannelOrigin;
use crate::device::DeviceId;

/// Snapshot of a server channel for introspection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerChannelInfo {
    pub psm: Psm,
    pub requires_encryption: bool,
    pub origin: ChannelOrigin,
    pub session_count: usize,
}

/// A PSM known to this process together with the sessions running over it
#[derive(Debug)]
pub struct ServerChannel {
    psm: Psm,
    requires_encryption: bool,
    origin: ChannelOrigin,
    sessions: HashMap<DeviceId, ConnectionSession>,
}

impl ServerChannel {
    pub fn new(psm: Psm, requires_encryption: bool, origin: ChannelOrigin) -> Self {
        Self {
            psm,
            requires_encryption,
            origin,
            sessions: HashMap::new(),
        }
    }

    pub fn psm(&self) -> Psm {
        self.psm
    }

    pub fn requires_encryption(&self) -> bool {
        self.requires_encryption
    }

    pub fn origin(&self) -> ChannelOrigin {
        self.origin
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn session_mut(&mut self, device: &DeviceId) -> Option<&mut ConnectionSession> {
        self.sessions.get_mut(device)
    }

    /// Install an open session, returning the one it displaced, if any
    pub fn install(&mut self, session: ConnectionSession) -> Option<ConnectionSession> {
        self.sessions.insert(session.remote().id, session)
    }

    pub fn remove(&mut self, device: &DeviceId) -> Option<ConnectionSession> {
        self.sessions.remove(device)
    }

    /// Force-close every session. Individual stream errors are logged and ignored.
    pub fn close_all(&mut self) -> usize {
        let count = self.sessions.len();
        for (device, mut session) in self.sessions.drain() {
            if let Err(e) = session.close() {
                warn!("Error closing session with {} on psm {}: {}", device, self.psm, e);
            }
        }
        count
    }

    pub fn info(&self) -> ServerChannelInfo {
        ServerChannelInfo {
            psm: self.psm,
            requires_encryption: self.requires_encryption,
            origin: self.origin,
            session_count: self.sessions.len(),
        }
    }
}

/// Registry of server channels and their sessions
#[derive(Debug, Default)]
pub struct ChannelRegistry {
    channels: HashMap<Psm, ServerChannel>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a successfully published PSM.
    ///
    /// If sessions already run over the PSM under an implicit entry, the
    /// entry is promoted and keeps its sessions.
    pub fn publish(&mut self, psm: Psm, requires_encryption: bool) {
        let channel = self
            .channels
            .entry(psm)
            .or_insert_with(|| ServerChannel::new(psm, requires_encryption, ChannelOrigin::Published));
        channel.origin = ChannelOrigin::Published;
        channel.requires_encryption = requires_encryption;
    }

    pub fn get(&self, psm: Psm) -> Option<&ServerChannel> {
        self.channels.get(&psm)
    }

    pub fn contains(&self, psm: Psm) -> bool {
        self.channels.contains_key(&psm)
    }

    /// Remove a server channel and hand it to the caller for teardown
    pub fn remove_channel(&mut self, psm: Psm) -> Option<ServerChannel> {
        self.channels.remove(&psm)
    }

    pub fn session_mut(&mut self, psm: Psm, device: &DeviceId) -> Option<&mut ConnectionSession> {
        self.channels.get_mut(&psm)?.session_mut(device)
    }

    /// Install an open session under its PSM.
    ///
    /// A server channel is created on the fly when the PSM was never
    /// published here. Returns the session displaced from the same
    /// (psm, device) slot.
    pub fn install_session(&mut self, session: ConnectionSession) -> Option<ConnectionSession> {
        let psm = session.psm();
        let channel = self.channels.entry(psm).or_insert_with(|| {
            debug!("Creating implicit server channel for psm {}", psm);
            ServerChannel::new(psm, false, ChannelOrigin::Implicit)
        });
        channel.install(session)
    }

    /// Remove a session. Implicit channels left without sessions are dropped.
    pub fn remove_session(&mut self, psm: Psm, device: &DeviceId) -> Option<ConnectionSession> {
        let channel = self.channels.get_mut(&psm)?;
        let session = channel.remove(device);
        if channel.origin == ChannelOrigin::Implicit && channel.session_count() == 0 {
            self.channels.remove(&psm);
        }
        session
    }

    pub fn server_channels(&self) -> Vec<ServerChannelInfo> {
        let mut infos: Vec<_> = self.channels.values().map(ServerChannel::info).collect();
        infos.sort_by_key(|info| info.psm);
        infos
    }

    pub fn sessions(&self) -> Vec<SessionInfo> {
        let mut infos: Vec<_> = self
            .channels
            .values()
            .flat_map(|channel| channel.sessions.values().map(ConnectionSession::info))
            .collect();
        infos.sort_by_key(|info| (info.psm, info.remote.id.to_string()));
        infos
    }
}
