//! PCI class codes and configuration header types

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::RootPortError;

/// PCI device class (major categories)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PciClass {
    /// 00: Unclassified
    Unclassified,
    /// 01: Mass storage controller (SATA, NVMe, RAID, etc.)
    MassStorage,
    /// 02: Network controller (Ethernet, WiFi, etc.)
    NetworkController,
    /// 03: Display controller (GPU, VGA)
    DisplayController,
    /// 04: Multimedia controller (audio, video)
    MultimediaController,
    /// 05: Memory controller
    MemoryController,
    /// 06: Bridge (PCI-to-PCI, host bridge, ISA bridge)
    Bridge,
    /// 07: Communication controller (serial, modem)
    CommunicationController,
    /// 08: System peripheral (DMA, timer, PIC)
    SystemPeripheral,
    /// 0C: Serial bus controller (USB, FireWire, SMBus)
    SerialBusController,
    /// 12: Processing accelerator (NPU, FPGA)
    ProcessingAccelerator,
    /// Other/unknown class
    Other(u8),
}

impl PciClass {
    /// Classify a PCI device by its base class byte.
    pub fn from_base_class(class_byte: u8) -> Self {
        match class_byte {
            0x00 => Self::Unclassified,
            0x01 => Self::MassStorage,
            0x02 => Self::NetworkController,
            0x03 => Self::DisplayController,
            0x04 => Self::MultimediaController,
            0x05 => Self::MemoryController,
            0x06 => Self::Bridge,
            0x07 => Self::CommunicationController,
            0x08 => Self::SystemPeripheral,
            0x0C => Self::SerialBusController,
            0x12 => Self::ProcessingAccelerator,
            other => Self::Other(other),
        }
    }
}

impl fmt::Display for PciClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unclassified => write!(f, "Unclassified"),
            Self::MassStorage => write!(f, "Mass Storage"),
            Self::NetworkController => write!(f, "Network Controller"),
            Self::DisplayController => write!(f, "Display Controller"),
            Self::MultimediaController => write!(f, "Multimedia"),
            Self::MemoryController => write!(f, "Memory Controller"),
            Self::Bridge => write!(f, "Bridge"),
            Self::CommunicationController => write!(f, "Communication"),
            Self::SystemPeripheral => write!(f, "System Peripheral"),
            Self::SerialBusController => write!(f, "Serial Bus"),
            Self::ProcessingAccelerator => write!(f, "Processing Accelerator"),
            Self::Other(c) => write!(f, "Other(0x{:02x})", c),
        }
    }
}

/// Class code register: base class, subclass, programming interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ClassCode {
    pub base: u8,
    pub subclass: u8,
    pub prog_if: u8,
}

impl ClassCode {
    /// Base class of display controllers (VGA, XGA, 3D).
    pub const DISPLAY_CONTROLLER: u8 = 0x03;

    pub fn new(base: u8, subclass: u8, prog_if: u8) -> Self {
        Self {
            base,
            subclass,
            prog_if,
        }
    }

    /// Build from the 24-bit value held in sysfs `class` (e.g. 0x030200).
    pub fn from_u32(code: u32) -> Self {
        Self::new((code >> 16) as u8, (code >> 8) as u8, code as u8)
    }

    pub fn as_u32(&self) -> u32 {
        (u32::from(self.base) << 16) | (u32::from(self.subclass) << 8) | u32::from(self.prog_if)
    }

    pub fn class(&self) -> PciClass {
        PciClass::from_base_class(self.base)
    }

    pub fn is_display_controller(&self) -> bool {
        self.base == Self::DISPLAY_CONTROLLER
    }
}

impl fmt::Display for ClassCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:06x}", self.as_u32())
    }
}

impl FromStr for ClassCode {
    type Err = RootPortError;

    /// Accepts the sysfs form (`0x030200`), the `setpci CLASS` word
    /// (`0302`) and a bare base class (`03`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex = s.trim().trim_start_matches("0x");
        let value = u32::from_str_radix(hex, 16)
            .map_err(|_| RootPortError::Parse(format!("invalid class code '{}'", s.trim())))?;
        match hex.len() {
            6 => Ok(Self::from_u32(value)),
            4 => Ok(Self::from_u32(value << 8)),
            2 => Ok(Self::from_u32(value << 16)),
            _ => Err(RootPortError::Parse(format!(
                "class code '{}' has unexpected width",
                s.trim()
            ))),
        }
    }
}

impl TryFrom<String> for ClassCode {
    type Error = RootPortError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ClassCode> for String {
    fn from(code: ClassCode) -> Self {
        code.to_string()
    }
}

/// Configuration header layout (header type register, low seven bits)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HeaderLayout {
    /// Type 0: a terminal function
    Endpoint,
    /// Type 1: PCI-to-PCI bridge (root ports and switch ports included)
    Bridge,
    /// Type 2 (CardBus) or anything reserved
    Other(u8),
}

/// Raw header type register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HeaderType(pub u8);

impl HeaderType {
    pub const ENDPOINT: u8 = 0x00;
    pub const BRIDGE: u8 = 0x01;
    const MULTI_FUNCTION: u8 = 0x80;

    pub fn raw(&self) -> u8 {
        self.0
    }

    pub fn layout(&self) -> HeaderLayout {
        match self.0 & !Self::MULTI_FUNCTION {
            Self::ENDPOINT => HeaderLayout::Endpoint,
            Self::BRIDGE => HeaderLayout::Bridge,
            other => HeaderLayout::Other(other),
        }
    }

    pub fn is_multi_function(&self) -> bool {
        self.0 & Self::MULTI_FUNCTION != 0
    }

    pub fn is_endpoint(&self) -> bool {
        self.layout() == HeaderLayout::Endpoint
    }

    pub fn is_bridge(&self) -> bool {
        self.layout() == HeaderLayout::Bridge
    }
}

impl fmt::Display for HeaderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:02x}", self.0)
    }
}

impl FromStr for HeaderType {
    type Err = RootPortError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        u8::from_str_radix(s.trim().trim_start_matches("0x"), 16)
            .map(HeaderType)
            .map_err(|_| RootPortError::Parse(format!("invalid header type '{}'", s.trim())))
    }
}
