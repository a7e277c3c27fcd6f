//! Type definitions for L2CAP channel management
//!
//! This module contains the small value types shared between the manager,
//! the registry and the radio backend.

use std::fmt;

/// Radio/adapter power state as reported by the stack
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PowerState {
    /// The stack has not reported a state yet
    #[default]
    Unknown,
    PoweredOn,
    PoweredOff,
    /// The platform has no usable radio
    Unsupported,
    /// The application is not allowed to use the radio
    Unauthorized,
    /// The connection with the system service was momentarily lost
    Resetting,
}

impl PowerState {
    pub fn is_known(&self) -> bool {
        *self != PowerState::Unknown
    }
}

impl fmt::Display for PowerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => write!(f, "Unknown"),
            Self::PoweredOn => write!(f, "Powered on"),
            Self::PoweredOff => write!(f, "Powered off"),
            Self::Unsupported => write!(f, "Unsupported"),
            Self::Unauthorized => write!(f, "Unauthorized"),
            Self::Resetting => write!(f, "Resetting"),
        }
    }
}

/// Which side initiated a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Peer connected to one of our server channels
    Inbound,
    /// We connected to the peer
    Outbound,
}

/// Connection session state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Streams are being opened
    Opening,
    /// Session is registered and ready for data transfer
    Open,
    /// Session is closed; terminal
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Opening => write!(f, "Opening"),
            Self::Open => write!(f, "Open"),
            Self::Closed => write!(f, "Closed"),
        }
    }
}

/// How a server channel entry came to exist
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelOrigin {
    /// Published by this process; must be unpublished on close
    Published,
    /// Created on the fly for a session on a PSM this process never published
    Implicit,
}

/// Correlates a backend request with its completion event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestToken(pub(crate) u64);

impl RequestToken {
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for RequestToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}
