//! Request/response schema for the host message channel
//!
//! Requests arrive as a method name plus a JSON argument map. Each method is
//! decoded into a typed request; required fields must be present, payloads
//! travel hex-encoded. Failures are reported as an [`ErrorReply`] carrying a
//! stable error code.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::device::RemoteDevice;
use crate::error::ChannelError;
use crate::l2cap::{ChannelEvent, L2capManager, Psm, ReadOutcome};

pub const LISTEN_L2CAP_CHANNEL: &str = "listenL2CapChannel";
pub const CONNECT_TO_L2CAP_CHANNEL: &str = "connectToL2CapChannel";
pub const READ_L2CAP_CHANNEL: &str = "readL2CapChannel";
pub const WRITE_L2CAP_CHANNEL: &str = "writeL2CapChannel";
pub const CLOSE_L2CAP_CHANNEL: &str = "closeL2CapChannel";
pub const CLOSE_L2CAP_SERVER: &str = "closeL2CapServer";
/// Method name of the push event sent when a peer connects
pub const DEVICE_CONNECTED: &str = "deviceConnectedToL2CapChannel";

/// Errors decoding a request
#[derive(Error, Debug)]
pub enum MessageError {
    #[error("Missing required argument `{0}`")]
    MissingArgument(&'static str),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Unknown method: {0}")]
    UnknownMethod(String),
}

impl MessageError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingArgument(_) => "message_arguments_not_provided",
            Self::InvalidArgument(_) => "invalid_argument",
            Self::UnknownMethod(_) => "unknown_method",
        }
    }
}

/// Error sent back over the message channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorReply {
    pub code: String,
    pub message: String,
}

impl From<ChannelError> for ErrorReply {
    fn from(error: ChannelError) -> Self {
        Self {
            code: error.code().to_string(),
            message: error.to_string(),
        }
    }
}

impl From<MessageError> for ErrorReply {
    fn from(error: MessageError) -> Self {
        Self {
            code: error.code().to_string(),
            message: error.to_string(),
        }
    }
}

/// A decoded request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Listen {
        secure: bool,
    },
    Connect {
        remote_id: String,
        psm: Psm,
        secure: bool,
    },
    Read {
        psm: Psm,
        remote_id: String,
    },
    Write {
        psm: Psm,
        remote_id: String,
        value: Vec<u8>,
    },
    CloseChannel {
        psm: Psm,
        remote_id: String,
    },
    CloseServer {
        psm: Psm,
    },
}

// Wire shapes. Every field is optional here so that absence can be reported
// explicitly instead of defaulting to zero or an empty string.
#[derive(Deserialize)]
struct RawListen {
    secure: Option<bool>,
}

#[derive(Deserialize)]
struct RawChannelArgs {
    psm: Option<i64>,
    remote_id: Option<String>,
    secure: Option<bool>,
    value: Option<String>,
}

fn required<T>(value: Option<T>, name: &'static str) -> Result<T, MessageError> {
    value.ok_or(MessageError::MissingArgument(name))
}

fn parse_psm(value: Option<i64>) -> Result<Psm, MessageError> {
    let raw = required(value, "psm")?;
    Psm::try_from(raw).map_err(|v| MessageError::InvalidArgument(format!("psm out of range: {}", v)))
}

fn decode<T: DeserializeOwned>(arguments: Value) -> Result<T, MessageError> {
    let arguments = if arguments.is_null() {
        Value::Object(Default::default())
    } else {
        arguments
    };
    serde_json::from_value(arguments).map_err(|e| MessageError::InvalidArgument(e.to_string()))
}

impl Request {
    /// Decode a method call
    pub fn parse(method: &str, arguments: Value) -> Result<Self, MessageError> {
        if method == LISTEN_L2CAP_CHANNEL {
            let raw: RawListen = decode(arguments)?;
            return Ok(Request::Listen {
                secure: raw.secure.unwrap_or(false),
            });
        }

        let raw: RawChannelArgs = match method {
            CONNECT_TO_L2CAP_CHANNEL | READ_L2CAP_CHANNEL | WRITE_L2CAP_CHANNEL
            | CLOSE_L2CAP_CHANNEL | CLOSE_L2CAP_SERVER => decode(arguments)?,
            other => return Err(MessageError::UnknownMethod(other.to_string())),
        };

        let request = match method {
            CONNECT_TO_L2CAP_CHANNEL => Request::Connect {
                remote_id: required(raw.remote_id, "remote_id")?,
                psm: parse_psm(raw.psm)?,
                secure: raw.secure.unwrap_or(false),
            },
            READ_L2CAP_CHANNEL => Request::Read {
                psm: parse_psm(raw.psm)?,
                remote_id: required(raw.remote_id, "remote_id")?,
            },
            WRITE_L2CAP_CHANNEL => {
                let hex_value = required(raw.value, "value")?;
                Request::Write {
                    psm: parse_psm(raw.psm)?,
                    remote_id: required(raw.remote_id, "remote_id")?,
                    value: hex::decode(&hex_value)
                        .map_err(|e| MessageError::InvalidArgument(format!("value: {}", e)))?,
                }
            }
            CLOSE_L2CAP_CHANNEL => Request::CloseChannel {
                psm: parse_psm(raw.psm)?,
                remote_id: required(raw.remote_id, "remote_id")?,
            },
            _ => Request::CloseServer {
                psm: parse_psm(raw.psm)?,
            },
        };
        Ok(request)
    }
}

/// Response carrying a PSM (listen, connect)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PsmResponse {
    pub psm: u16,
}

/// Response to a read
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReadResponse {
    pub remote_id: String,
    pub psm: u16,
    pub bytes_read: usize,
    /// Hex-encoded payload
    pub value: String,
}

impl From<ReadOutcome> for ReadResponse {
    fn from(outcome: ReadOutcome) -> Self {
        Self {
            remote_id: outcome.device.to_string(),
            psm: outcome.psm.value(),
            bytes_read: outcome.bytes_read(),
            value: hex::encode(&outcome.payload),
        }
    }
}

/// Response to a write
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WriteResponse {
    pub bytes_written: usize,
}

/// A successful response
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Response {
    Psm(PsmResponse),
    Read(ReadResponse),
    Write(WriteResponse),
    /// Serialized as `null`
    Ack,
}

/// Remote device as shown to the host application
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BluetoothDevice {
    pub remote_id: String,
    pub platform_name: String,
}

impl From<&RemoteDevice> for BluetoothDevice {
    fn from(device: &RemoteDevice) -> Self {
        Self {
            remote_id: device.id.to_string(),
            platform_name: device.display_name.clone().unwrap_or_default(),
        }
    }
}

/// Push event sent when a session is established
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceConnected {
    #[serde(rename = "bluetoothDevice")]
    pub bluetooth_device: BluetoothDevice,
    pub psm: u16,
}

impl DeviceConnected {
    /// Build the push event for a channel event, if it has one
    pub fn from_event(event: &ChannelEvent) -> Option<Self> {
        match event {
            ChannelEvent::PeerConnected { remote, psm, .. } => Some(Self {
                bluetooth_device: BluetoothDevice::from(remote),
                psm: psm.value(),
            }),
            ChannelEvent::SessionClosed { .. } => None,
        }
    }
}

/// Execute a decoded request against the manager
pub async fn dispatch(manager: &L2capManager, request: Request) -> Result<Response, ErrorReply> {
    let response = match request {
        Request::Listen { secure } => {
            let psm = manager.listen(secure).await?;
            Response::Psm(PsmResponse { psm: psm.value() })
        }
        Request::Connect {
            remote_id,
            psm,
            secure,
        } => {
            let psm = manager.connect(&remote_id, psm, secure).await?;
            Response::Psm(PsmResponse { psm: psm.value() })
        }
        Request::Read { psm, remote_id } => Response::Read(manager.read(psm, &remote_id)?.into()),
        Request::Write {
            psm,
            remote_id,
            value,
        } => Response::Write(WriteResponse {
            bytes_written: manager.write(psm, &remote_id, &value)?,
        }),
        Request::CloseChannel { psm, remote_id } => {
            manager.close(psm, &remote_id)?;
            Response::Ack
        }
        Request::CloseServer { psm } => {
            manager.close_server(psm).await?;
            Response::Ack
        }
    };
    Ok(response)
}

/// Decode, execute and encode one method call
pub async fn handle_method_call(
    manager: &L2capManager,
    method: &str,
    arguments: Value,
) -> Result<Value, ErrorReply> {
    let request = Request::parse(method, arguments)?;
    let response = dispatch(manager, request).await?;
    serde_json::to_value(response).map_err(|e| ErrorReply {
        code: "internal_error".to_string(),
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ManagerConfig;
    use crate::l2cap::{ChannelStream, Direction, LoopbackConfig, LoopbackRadio};
    use serde_json::json;

    #[test]
    fn test_parse_requests() {
        assert_eq!(
            Request::parse(LISTEN_L2CAP_CHANNEL, Value::Null).unwrap(),
            Request::Listen { secure: false }
        );
        assert_eq!(
            Request::parse(
                CONNECT_TO_L2CAP_CHANNEL,
                json!({"remote_id": "AA:BB:CC:DD:EE:FF", "psm": 192})
            )
            .unwrap(),
            Request::Connect {
                remote_id: "AA:BB:CC:DD:EE:FF".into(),
                psm: Psm::new(192),
                secure: false
            }
        );
        assert_eq!(
            Request::parse(
                WRITE_L2CAP_CHANNEL,
                json!({"remote_id": "x", "psm": 129, "value": "0a0B"})
            )
            .unwrap(),
            Request::Write {
                psm: Psm::new(129),
                remote_id: "x".into(),
                value: vec![0x0a, 0x0b]
            }
        );
    }

    #[test]
    fn test_required_fields_are_not_defaulted() {
        let err = Request::parse(READ_L2CAP_CHANNEL, json!({"remote_id": "x"})).unwrap_err();
        assert!(matches!(err, MessageError::MissingArgument("psm")));
        assert_eq!(err.code(), "message_arguments_not_provided");

        let err = Request::parse(CLOSE_L2CAP_CHANNEL, json!({"psm": 129})).unwrap_err();
        assert!(matches!(err, MessageError::MissingArgument("remote_id")));

        let err = Request::parse(CLOSE_L2CAP_SERVER, Value::Null).unwrap_err();
        assert!(matches!(err, MessageError::MissingArgument("psm")));
    }

    #[test]
    fn test_invalid_arguments() {
        let err = Request::parse(CLOSE_L2CAP_SERVER, json!({"psm": -4})).unwrap_err();
        assert_eq!(err.code(), "invalid_argument");

        let err = Request::parse(
            WRITE_L2CAP_CHANNEL,
            json!({"remote_id": "x", "psm": 129, "value": "abc"}),
        )
        .unwrap_err();
        assert_eq!(err.code(), "invalid_argument");

        let err = Request::parse(LISTEN_L2CAP_CHANNEL, json!({"secure": "yes"})).unwrap_err();
        assert_eq!(err.code(), "invalid_argument");

        let err = Request::parse("discoverServices", Value::Null).unwrap_err();
        assert_eq!(err.code(), "unknown_method");
    }

    #[test]
    fn test_response_encoding() {
        let read = ReadResponse {
            remote_id: "AA:BB:CC:DD:EE:FF".into(),
            psm: 192,
            bytes_read: 2,
            value: "cafe".into(),
        };
        assert_eq!(
            serde_json::to_value(Response::Read(read)).unwrap(),
            json!({"remote_id": "AA:BB:CC:DD:EE:FF", "psm": 192, "bytes_read": 2, "value": "cafe"})
        );
        assert_eq!(serde_json::to_value(Response::Ack).unwrap(), Value::Null);

        let event = ChannelEvent::PeerConnected {
            remote: RemoteDevice::with_name("AA:BB:CC:DD:EE:FF".parse().unwrap(), "Tag"),
            psm: Psm::new(192),
            direction: Direction::Inbound,
        };
        let pushed = DeviceConnected::from_event(&event).unwrap();
        assert_eq!(
            serde_json::to_value(pushed).unwrap(),
            json!({
                "bluetoothDevice": {"remote_id": "AA:BB:CC:DD:EE:FF", "platform_name": "Tag"},
                "psm": 192
            })
        );
    }

    #[tokio::test]
    async fn test_method_calls_round_trip_through_manager() {
        let config = LoopbackConfig {
            first_dynamic_psm: 0xC0,
            ..LoopbackConfig::default()
        };
        let (radio, events) = LoopbackRadio::new(config);
        let manager = L2capManager::new(radio.clone(), ManagerConfig::default());
        manager.spawn_event_pump(events);

        let listen = handle_method_call(&manager, LISTEN_L2CAP_CHANNEL, json!({"secure": false}))
            .await
            .unwrap();
        assert_eq!(listen, json!({"psm": 192}));

        let peer_id = "11:22:33:44:55:66";
        let mut peer = radio
            .simulate_inbound(Psm::new(192), RemoteDevice::new(peer_id.parse().unwrap()))
            .unwrap();
        // Let the pump install the session
        while manager.sessions().is_empty() {
            tokio::task::yield_now().await;
        }

        let written = handle_method_call(
            &manager,
            WRITE_L2CAP_CHANNEL,
            json!({"psm": 192, "remote_id": peer_id, "value": "68690a"}),
        )
        .await
        .unwrap();
        assert_eq!(written, json!({"bytes_written": 3}));
        assert_eq!(peer.read_available(), b"hi\n".to_vec());

        peer.write(&[0xde, 0xad]).unwrap();
        let read = handle_method_call(
            &manager,
            READ_L2CAP_CHANNEL,
            json!({"psm": 192, "remote_id": peer_id}),
        )
        .await
        .unwrap();
        assert_eq!(read["bytes_read"], json!(2));
        assert_eq!(read["value"], json!("dead"));

        let err = handle_method_call(
            &manager,
            READ_L2CAP_CHANNEL,
            json!({"psm": 192, "remote_id": "not-a-uuid"}),
        )
        .await
        .unwrap_err();
        assert_eq!(err.code, "invalid_remote_id");

        let ack = handle_method_call(&manager, CLOSE_L2CAP_SERVER, json!({"psm": 192}))
            .await
            .unwrap();
        assert_eq!(ack, Value::Null);

        let err = handle_method_call(
            &manager,
            READ_L2CAP_CHANNEL,
            json!({"psm": 192, "remote_id": peer_id}),
        )
        .await
        .unwrap_err();
        assert_eq!(err.code, "no_open_l2cap_channel_found");
    }
}
