//! Linux sysfs attribute source
//!
//! Reads `class` and the first 64 bytes of `config` from
//! `/sys/bus/pci/devices/<bdf>/`. Both are world-readable, so discovery
//! works without root.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Result, RootPortError};
use crate::pci::{ClassCode, HeaderType, PciAddress};

use super::DeviceAttributeSource;

const HEADER_TYPE_OFFSET: usize = 0x0e;
const PRIMARY_BUS_OFFSET: usize = 0x18;
const SECONDARY_BUS_OFFSET: usize = 0x19;

/// Attribute source backed by `/sys/bus/pci/devices`
#[derive(Debug, Clone)]
pub struct SysfsSource {
    root: PathBuf,
}

impl SysfsSource {
    pub const DEFAULT_ROOT: &'static str = "/sys/bus/pci/devices";

    pub fn new() -> Self {
        Self::with_root(Self::DEFAULT_ROOT)
    }

    /// Use a different devices directory (chroots, test fixtures).
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn device_dir(&self, address: PciAddress) -> PathBuf {
        self.root.join(address.to_string())
    }

    fn read_config(&self, address: PciAddress, attribute: &'static str) -> Result<Vec<u8>> {
        let path = self.device_dir(address).join("config");
        let bytes = fs::read(&path)
            .map_err(|e| RootPortError::attribute(address, attribute, format!("{}: {}", path.display(), e)))?;
        if bytes.len() <= SECONDARY_BUS_OFFSET {
            return Err(RootPortError::attribute(
                address,
                attribute,
                format!("config space truncated to {} bytes", bytes.len()),
            ));
        }
        Ok(bytes)
    }
}

impl Default for SysfsSource {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceAttributeSource for SysfsSource {
    fn list_device_addresses(&self) -> Result<Vec<PciAddress>> {
        let entries = fs::read_dir(&self.root).map_err(|e| {
            RootPortError::SourceUnavailable(format!("Cannot read {}: {}", self.root.display(), e))
        })?;

        let mut addresses = Vec::new();
        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().to_string();
            match name.parse::<PciAddress>() {
                Ok(addr) => addresses.push(addr),
                Err(e) => log::debug!("Ignoring sysfs entry {}: {}", name, e),
            }
        }

        // read_dir order is unspecified; lspci lists by address
        addresses.sort();
        Ok(addresses)
    }

    fn class_code(&self, address: PciAddress) -> Result<ClassCode> {
        let path = self.device_dir(address).join("class");
        let content = fs::read_to_string(&path)
            .map_err(|e| RootPortError::attribute(address, "class", format!("{}: {}", path.display(), e)))?;
        content
            .parse::<ClassCode>()
            .map_err(|e| RootPortError::attribute(address, "class", e.to_string()))
    }

    fn header_type(&self, address: PciAddress) -> Result<HeaderType> {
        let config = self.read_config(address, "header_type")?;
        Ok(HeaderType(config[HEADER_TYPE_OFFSET]))
    }

    fn secondary_bus_number(&self, address: PciAddress) -> Result<u8> {
        let config = self.read_config(address, "secondary_bus")?;
        if !HeaderType(config[HEADER_TYPE_OFFSET]).is_bridge() {
            return Err(RootPortError::attribute(address, "secondary_bus", "not a bridge"));
        }
        Ok(config[SECONDARY_BUS_OFFSET])
    }

    fn primary_bus_number(&self, address: PciAddress) -> Result<u8> {
        let config = self.read_config(address, "primary_bus")?;
        if HeaderType(config[HEADER_TYPE_OFFSET]).is_bridge() {
            Ok(config[PRIMARY_BUS_OFFSET])
        } else {
            Ok(address.bus)
        }
    }

    fn name(&self) -> &'static str {
        "sysfs"
    }
}
