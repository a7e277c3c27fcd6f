//! bluechannel - L2CAP channel management for Bluetooth LE
//!
//! This library publishes connection-oriented L2CAP channels, accepts and
//! initiates peer connections over them and multiplexes the resulting byte
//! streams per remote device. The native radio stack sits behind the
//! [`RadioBackend`] trait; [`LoopbackRadio`] provides an in-process stack.
//! The [`messages`] module adapts the manager to a host message channel.

pub mod config;
pub mod device;
pub mod error;
pub mod l2cap;
pub mod messages;

// Re-export common types for convenience
pub use config::ManagerConfig;
pub use device::{BdAddr, DeviceId, RemoteDevice};
pub use error::{ChannelError, L2capResult};
pub use l2cap::{
    ChannelEvent, L2capManager, LoopbackConfig, LoopbackRadio, PowerState, Psm, RadioBackend,
    ReadOutcome, StackEvent,
};
