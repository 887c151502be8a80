//! Captured device attributes, replayable without touching the host.
//!
//! A snapshot is what `rootport snapshot` writes: the raw attributes of every
//! device at capture time. Attributes that could not be read are omitted and
//! replay as `AttributeUnavailable`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::{Result, RootPortError};
use crate::pci::{ClassCode, HeaderType, PciAddress};

use super::DeviceAttributeSource;

/// Attributes of one device as captured
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotDevice {
    pub address: PciAddress,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_code: Option<ClassCode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header_type: Option<HeaderType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secondary_bus: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_bus: Option<u8>,
}

impl SnapshotDevice {
    /// Type 0 function with the given 24-bit class code.
    pub fn endpoint(address: PciAddress, class_code: u32) -> Self {
        Self {
            address,
            class_code: Some(ClassCode::from_u32(class_code)),
            header_type: Some(HeaderType(HeaderType::ENDPOINT)),
            secondary_bus: None,
            primary_bus: None,
        }
    }

    /// VGA-compatible display controller.
    pub fn gpu(address: PciAddress) -> Self {
        Self::endpoint(address, 0x030000)
    }

    /// PCI-to-PCI bridge sitting on its address bus.
    pub fn bridge(address: PciAddress, secondary_bus: u8) -> Self {
        Self {
            address,
            class_code: Some(ClassCode::from_u32(0x060400)),
            header_type: Some(HeaderType(HeaderType::BRIDGE)),
            secondary_bus: Some(secondary_bus),
            primary_bus: Some(address.bus),
        }
    }
}

/// A full capture of a host's PCI attributes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub captured_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub devices: Vec<SnapshotDevice>,
}

impl Snapshot {
    pub fn new(devices: Vec<SnapshotDevice>) -> Self {
        Self {
            captured_at: None,
            devices,
        }
    }

    /// Read every attribute of every device from a live source.
    pub fn capture<S: DeviceAttributeSource>(source: &S) -> Result<Self> {
        let addresses = source.list_device_addresses()?;
        let mut devices = Vec::with_capacity(addresses.len());

        for address in addresses {
            let header_type = source.header_type(address).ok();
            let is_bridge = header_type.map(|h| h.is_bridge()).unwrap_or(false);
            let (secondary_bus, primary_bus) = if is_bridge {
                (
                    source.secondary_bus_number(address).ok(),
                    source.primary_bus_number(address).ok(),
                )
            } else {
                (None, None)
            };

            devices.push(SnapshotDevice {
                address,
                class_code: source.class_code(address).ok(),
                header_type,
                secondary_bus,
                primary_bus,
            });
        }

        log::info!("Captured {} devices from {}", devices.len(), source.name());
        Ok(Self {
            captured_at: Some(Utc::now()),
            devices,
        })
    }

    pub fn from_json(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            RootPortError::SourceUnavailable(format!("Cannot read snapshot {}: {}", path.display(), e))
        })?;
        Self::from_json(&content)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Attribute source replaying a [`Snapshot`]
#[derive(Debug)]
pub struct SnapshotSource {
    snapshot: Snapshot,
    /// Position of each address in `snapshot.devices`; first entry wins.
    positions: HashMap<PciAddress, usize>,
    unavailable: Option<String>,
    queries: AtomicUsize,
}

impl SnapshotSource {
    pub fn new(snapshot: Snapshot) -> Self {
        let mut positions = HashMap::with_capacity(snapshot.devices.len());
        for (i, device) in snapshot.devices.iter().enumerate() {
            positions.entry(device.address).or_insert(i);
        }
        Self {
            snapshot,
            positions,
            unavailable: None,
            queries: AtomicUsize::new(0),
        }
    }

    pub fn from_devices(devices: Vec<SnapshotDevice>) -> Self {
        Self::new(Snapshot::new(devices))
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        Snapshot::from_json_file(path).map(Self::new)
    }

    /// A source whose enumeration always fails.
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            unavailable: Some(reason.into()),
            ..Self::new(Snapshot::new(Vec::new()))
        }
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    /// Number of per-device attribute reads served so far.
    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::Relaxed)
    }

    fn device(&self, address: PciAddress) -> Option<&SnapshotDevice> {
        self.queries.fetch_add(1, Ordering::Relaxed);
        self.positions
            .get(&address)
            .and_then(|&i| self.snapshot.devices.get(i))
    }

    fn attribute<T>(
        &self,
        address: PciAddress,
        attribute: &'static str,
        read: impl FnOnce(&SnapshotDevice) -> Option<T>,
    ) -> Result<T> {
        let device = self
            .device(address)
            .ok_or_else(|| RootPortError::attribute(address, attribute, "device not present"))?;
        read(device).ok_or_else(|| RootPortError::attribute(address, attribute, "not captured"))
    }
}

impl DeviceAttributeSource for SnapshotSource {
    fn list_device_addresses(&self) -> Result<Vec<PciAddress>> {
        if let Some(reason) = &self.unavailable {
            return Err(RootPortError::SourceUnavailable(reason.clone()));
        }
        Ok(self.snapshot.devices.iter().map(|d| d.address).collect())
    }

    fn class_code(&self, address: PciAddress) -> Result<ClassCode> {
        self.attribute(address, "class", |d| d.class_code)
    }

    fn header_type(&self, address: PciAddress) -> Result<HeaderType> {
        self.attribute(address, "header_type", |d| d.header_type)
    }

    fn secondary_bus_number(&self, address: PciAddress) -> Result<u8> {
        self.attribute(address, "secondary_bus", |d| {
            d.header_type
                .filter(|h| h.is_bridge())
                .and(d.secondary_bus)
        })
    }

    fn primary_bus_number(&self, address: PciAddress) -> Result<u8> {
        self.attribute(address, "primary_bus", |d| d.primary_bus.or(Some(d.address.bus)))
    }

    fn name(&self) -> &'static str {
        "snapshot"
    }
}
