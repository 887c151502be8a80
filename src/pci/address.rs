//! PCI Bus:Device.Function addresses

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::RootPortError;

/// A segment-qualified bus number. Bus numbers only repeat across segments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BusKey {
    /// PCI segment group (domain)
    pub domain: u32,
    /// Bus number within the segment
    pub bus: u8,
}

impl fmt::Display for BusKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04x}:{:02x}", self.domain, self.bus)
    }
}

/// Device address (e.g. "0000:03:00.0")
///
/// Parses both the full `domain:bus:device.function` form printed by
/// `lspci -D` and sysfs, and the short `bus:device.function` form printed by
/// plain `lspci` (domain 0).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PciAddress {
    pub domain: u32,
    pub bus: u8,
    pub device: u8,
    pub function: u8,
}

impl PciAddress {
    pub fn new(domain: u32, bus: u8, device: u8, function: u8) -> Self {
        Self {
            domain,
            bus,
            device,
            function,
        }
    }

    /// The bus this address sits on.
    pub fn bus_key(&self) -> BusKey {
        BusKey {
            domain: self.domain,
            bus: self.bus,
        }
    }

    /// A bus in the same segment as this address.
    pub fn sibling_bus(&self, bus: u8) -> BusKey {
        BusKey {
            domain: self.domain,
            bus,
        }
    }
}

impl fmt::Display for PciAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04x}:{:02x}:{:02x}.{:x}",
            self.domain, self.bus, self.device, self.function
        )
    }
}

impl FromStr for PciAddress {
    type Err = RootPortError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let bad = |why: &str| RootPortError::Parse(format!("invalid PCI address '{}': {}", s, why));

        let (location, function) = s.rsplit_once('.').ok_or_else(|| bad("missing function"))?;
        let mut parts = location.rsplitn(3, ':');
        let device = parts.next().ok_or_else(|| bad("missing device"))?;
        let bus = parts.next().ok_or_else(|| bad("missing bus"))?;
        let domain = parts.next().unwrap_or("0");

        let domain = u32::from_str_radix(domain, 16).map_err(|_| bad("domain is not hex"))?;
        let bus = u8::from_str_radix(bus, 16).map_err(|_| bad("bus is not a hex byte"))?;
        let device = u8::from_str_radix(device, 16).map_err(|_| bad("device is not hex"))?;
        let function = u8::from_str_radix(function, 16).map_err(|_| bad("function is not hex"))?;

        if device > 0x1f {
            return Err(bad("device out of range"));
        }
        if function > 0x07 {
            return Err(bad("function out of range"));
        }

        Ok(Self::new(domain, bus, device, function))
    }
}

impl TryFrom<String> for PciAddress {
    type Error = RootPortError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<PciAddress> for String {
    fn from(addr: PciAddress) -> Self {
        addr.to_string()
    }
}
