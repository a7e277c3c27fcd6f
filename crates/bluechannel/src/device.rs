//! Remote device identity
//!
//! Peers are identified either by a platform-assigned UUID (the identifier a
//! peripheral-role stack hands out for a connected central) or by their
//! Bluetooth device address. Both forms are validated before they reach the
//! channel registry.

use std::fmt;
use std::str::FromStr;

use serde::{Serialize, Serializer};

use crate::error::ChannelError;

/// Bluetooth device address, stored little-endian as received over HCI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BdAddr {
    pub bytes: [u8; 6],
}

impl BdAddr {
    pub fn new(bytes: [u8; 6]) -> Self {
        Self { bytes }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }
}

impl fmt::Display for BdAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            self.bytes[5],
            self.bytes[4],
            self.bytes[3],
            self.bytes[2],
            self.bytes[1],
            self.bytes[0]
        )
    }
}

impl FromStr for BdAddr {
    type Err = ChannelError;

    /// Parses the textual `AA:BB:CC:DD:EE:FF` form (most significant octet first)
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ChannelError::InvalidIdentifier(s.to_string());

        let mut bytes = [0u8; 6];
        let mut parts = s.split(':');
        for slot in (0..6).rev() {
            let part = parts.next().ok_or_else(invalid)?;
            if part.len() != 2 || !part.bytes().all(|b| b.is_ascii_hexdigit()) {
                return Err(invalid());
            }
            bytes[slot] = u8::from_str_radix(part, 16).map_err(|_| invalid())?;
        }
        if parts.next().is_some() {
            return Err(invalid());
        }

        Ok(Self { bytes })
    }
}

/// Validated identity of a remote device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceId {
    /// Stack-assigned peer identifier
    Uuid(uuid::Uuid),
    /// Bluetooth device address
    Address(BdAddr),
}

impl FromStr for DeviceId {
    type Err = ChannelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.contains(':') {
            return trimmed.parse::<BdAddr>().map(DeviceId::Address);
        }
        // Only the hyphenated form is canonical; the uuid crate would also
        // accept simple and braced forms.
        if trimmed.len() != 36 {
            return Err(ChannelError::InvalidIdentifier(s.to_string()));
        }
        uuid::Uuid::parse_str(trimmed)
            .map(DeviceId::Uuid)
            .map_err(|_| ChannelError::InvalidIdentifier(s.to_string()))
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceId::Uuid(id) => write!(f, "{}", id.hyphenated().to_string().to_uppercase()),
            DeviceId::Address(addr) => write!(f, "{}", addr),
        }
    }
}

impl Serialize for DeviceId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// A remote device as reported by the radio stack
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteDevice {
    pub id: DeviceId,
    /// Advertised or cached name, if the stack knows one
    pub display_name: Option<String>,
}

impl RemoteDevice {
    pub fn new(id: DeviceId) -> Self {
        Self {
            id,
            display_name: None,
        }
    }

    pub fn with_name(id: DeviceId, name: impl Into<String>) -> Self {
        Self {
            id,
            display_name: Some(name.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_uuid_identifier() {
        let id: DeviceId = "9f2c4e1a-0b7d-4c3e-8a55-1d2e3f405162".parse().unwrap();
        assert!(matches!(id, DeviceId::Uuid(_)));
        // Case-insensitive, rendered upper-case
        assert_eq!(id.to_string(), "9F2C4E1A-0B7D-4C3E-8A55-1D2E3F405162");
        let again: DeviceId = id.to_string().parse().unwrap();
        assert_eq!(id, again);
    }

    #[test]
    fn test_parse_address_identifier() {
        let id: DeviceId = "aa:bb:cc:dd:ee:01".parse().unwrap();
        match id {
            DeviceId::Address(addr) => {
                assert_eq!(addr.bytes, [0x01, 0xEE, 0xDD, 0xCC, 0xBB, 0xAA]);
                assert_eq!(addr.to_string(), "AA:BB:CC:DD:EE:01");
            }
            other => panic!("Expected address, got {:?}", other),
        }
    }

    #[test]
    fn test_reject_malformed_identifiers() {
        for bad in [
            "not-a-uuid",
            "",
            "9f2c4e1a0b7d4c3e8a551d2e3f405162",
            "AA:BB:CC:DD:EE",
            "AA:BB:CC:DD:EE:FF:00",
            "AA:BB:CC:DD:EE:GG",
            "AAA:BB:CC:DD:EE:F",
            "+A:BB:CC:DD:EE:FF",
            "AA:BB:CC:DD:EE:-1",
        ] {
            let err = bad.parse::<DeviceId>().unwrap_err();
            assert!(matches!(err, ChannelError::InvalidIdentifier(_)), "{}", bad);
        }
    }
}
