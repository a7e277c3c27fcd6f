//! Error types for the bluechannel library
//!
//! This module defines the error taxonomy shared by every channel operation,
//! together with the stable error codes reported across the message boundary.

use thiserror::Error;

use crate::device::DeviceId;
use crate::l2cap::psm::Psm;
use crate::l2cap::types::PowerState;

/// Errors that can occur while managing L2CAP channels
#[derive(Error, Debug)]
pub enum ChannelError {
    #[error("Radio is not ready (power state: {0})")]
    RadioNotReady(PowerState),

    #[error("Invalid remote device identifier: {0:?}")]
    InvalidIdentifier(String),

    #[error("No open channel found for device {device} / psm {psm}")]
    ChannelNotFound { psm: Psm, device: DeviceId },

    #[error("Publishing L2CAP channel failed: {0}")]
    PublishFailed(String),

    #[error("Opening L2CAP channel failed: {0}")]
    ConnectFailed(String),

    #[error("Unpublishing L2CAP channel failed: {0}")]
    UnpublishFailed(String),

    #[error("Reading from input stream failed: {0}")]
    StreamReadFailed(std::io::Error),

    #[error("Writing to output stream failed: {0}")]
    StreamWriteFailed(std::io::Error),

    #[error("Operation not supported on this platform")]
    PlatformUnsupported,

    #[error("Request was dropped before completion")]
    RequestAbandoned,
}

impl ChannelError {
    /// Stable error code reported to the host application
    pub fn code(&self) -> &'static str {
        match self {
            Self::RadioNotReady(_) => "bluetooth_turned_off",
            Self::InvalidIdentifier(_) => "invalid_remote_id",
            Self::ChannelNotFound { .. } => "no_open_l2cap_channel_found",
            Self::PublishFailed(_) | Self::ConnectFailed(_) => "open_l2cap_channel_failed",
            Self::UnpublishFailed(_) => "close_l2cap_channel_failed",
            Self::StreamReadFailed(_) => "input_stream_read_failed",
            Self::StreamWriteFailed(_) => "output_stream_write_failed",
            Self::PlatformUnsupported => "platform_not_supported",
            Self::RequestAbandoned => "request_abandoned",
        }
    }
}

/// Result type for channel operations
pub type L2capResult<T> = std::result::Result<T, ChannelError>;
