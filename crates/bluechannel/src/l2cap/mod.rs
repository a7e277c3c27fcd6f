//! L2CAP connection-oriented channel management
//!
//! This module is responsible for:
//! - Publishing server channels and tracking the PSMs the stack assigns
//! - Opening outbound channels to remote devices
//! - Multiplexing byte-stream sessions per (PSM, remote device)
//! - Gating every request on the radio power state

pub mod backend;
pub mod core;
pub mod events;
pub mod loopback;
pub mod pending;
pub mod power;
pub mod psm;
pub mod registry;
pub mod session;
pub mod stream;
pub mod types;

// Re-export the public API
pub use self::backend::{OpenedChannel, RadioBackend, StackEvent};
pub use self::core::{L2capManager, ReadOutcome};
pub use self::events::{ChannelEvent, EventNotifier};
pub use self::loopback::{LoopbackConfig, LoopbackRadio};
pub use self::psm::Psm;
pub use self::registry::{ChannelRegistry, ServerChannel, ServerChannelInfo};
pub use self::session::{ConnectionSession, SessionInfo};
pub use self::stream::{ChannelStream, MemoryStream};
pub use self::types::*;
