//! Protocol/Service Multiplexer (PSM) handling for LE L2CAP
//!
//! LE credit-based channels use the SPSM space: values `0x0001..=0x007F` are
//! assigned by the Bluetooth SIG, values `0x0080..=0x00FF` are handed out
//! dynamically by the stack when a server channel is published.

use std::collections::HashSet;
use std::fmt;

/// First dynamically assigned LE PSM
pub const LE_PSM_DYNAMIC_MIN: u16 = 0x0080;
/// Last dynamically assigned LE PSM
pub const LE_PSM_DYNAMIC_MAX: u16 = 0x00FF;

/// Protocol/Service Multiplexer identifying an L2CAP endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Psm(u16);

impl Psm {
    /// Enhanced ATT bearer
    pub const EATT: Psm = Psm(0x0027);
    /// Internet Protocol Support Profile
    pub const IPSP: Psm = Psm(0x0023);
    /// Object Transfer Service
    pub const OTS: Psm = Psm(0x0025);

    pub const fn new(value: u16) -> Self {
        Psm(value)
    }

    /// Get the PSM value as u16
    pub const fn value(&self) -> u16 {
        self.0
    }

    /// Whether the value lies in the stack-assigned dynamic range
    pub fn is_dynamic(&self) -> bool {
        (LE_PSM_DYNAMIC_MIN..=LE_PSM_DYNAMIC_MAX).contains(&self.0)
    }

    fn well_known_name(&self) -> Option<&'static str> {
        match *self {
            Psm::EATT => Some("EATT"),
            Psm::IPSP => Some("IPSP"),
            Psm::OTS => Some("OTS"),
            _ => None,
        }
    }
}

impl From<u16> for Psm {
    fn from(value: u16) -> Self {
        Psm(value)
    }
}

impl TryFrom<i64> for Psm {
    type Error = i64;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        u16::try_from(value).map(Psm).map_err(|_| value)
    }
}

impl fmt::Display for Psm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.well_known_name() {
            Some(name) => write!(f, "{} (0x{:04X})", name, self.0),
            None => write!(f, "0x{:04X}", self.0),
        }
    }
}

/// Hands out dynamic PSMs, skipping values that are still published
#[derive(Debug)]
pub struct DynamicPsmAllocator {
    next: u16,
    in_use: HashSet<u16>,
}

impl DynamicPsmAllocator {
    /// Start allocating at `first`, clamped into the dynamic range
    pub fn starting_at(first: u16) -> Self {
        let next = first.clamp(LE_PSM_DYNAMIC_MIN, LE_PSM_DYNAMIC_MAX);
        Self {
            next,
            in_use: HashSet::new(),
        }
    }

    /// Obtain a new dynamic PSM, or `None` once the range is exhausted
    pub fn allocate(&mut self) -> Option<Psm> {
        let starting = self.next;
        loop {
            let candidate = self.next;

            self.next = if self.next >= LE_PSM_DYNAMIC_MAX {
                LE_PSM_DYNAMIC_MIN
            } else {
                self.next + 1
            };

            if self.in_use.insert(candidate) {
                return Some(Psm(candidate));
            }
            // Gone full circle
            if self.next == starting {
                return None;
            }
        }
    }

    /// Return a PSM to the pool
    pub fn release(&mut self, psm: Psm) {
        self.in_use.remove(&psm.value());
    }
}

impl Default for DynamicPsmAllocator {
    fn default() -> Self {
        Self::starting_at(LE_PSM_DYNAMIC_MIN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_psm_display() {
        assert_eq!(Psm::new(0x00C0).to_string(), "0x00C0");
        assert_eq!(Psm::EATT.to_string(), "EATT (0x0027)");
    }

    #[test]
    fn test_psm_from_wire_value() {
        assert_eq!(Psm::try_from(192i64), Ok(Psm::new(192)));
        assert_eq!(Psm::try_from(-1i64), Err(-1));
        assert_eq!(Psm::try_from(70_000i64), Err(70_000));
        assert!(Psm::new(192).is_dynamic());
        assert!(!Psm::IPSP.is_dynamic());
    }

    #[test]
    fn test_dynamic_allocation_skips_in_use() {
        let mut allocator = DynamicPsmAllocator::starting_at(0x00FE);
        assert_eq!(allocator.allocate(), Some(Psm::new(0x00FE)));
        assert_eq!(allocator.allocate(), Some(Psm::new(0x00FF)));
        // Wraps back to the start of the range
        assert_eq!(allocator.allocate(), Some(Psm::new(0x0080)));

        allocator.release(Psm::new(0x00FE));
        let mut seen = Vec::new();
        while let Some(psm) = allocator.allocate() {
            seen.push(psm);
        }
        // 0x81..=0xFD plus the released 0xFE
        assert_eq!(seen.len(), 0x7D + 1);
        assert!(seen.contains(&Psm::new(0x00FE)));
        assert_eq!(allocator.allocate(), None);
    }
}
