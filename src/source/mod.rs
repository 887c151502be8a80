//! Device attribute sources.
//!
//! Discovery only ever talks to the host through [`DeviceAttributeSource`]:
//! one call to list addresses, then single-attribute reads per device.
//!
//! - [`SysfsSource`]: `/sys/bus/pci/devices/<bdf>/{class,config}`
//! - [`SetpciSource`]: `lspci -D` and `setpci -s <bdf> <REGISTER>`
//! - [`SnapshotSource`]: captured attributes replayed from memory or JSON

use crate::error::Result;
use crate::pci::{ClassCode, HeaderType, PciAddress};

mod setpci;
mod snapshot;
mod sysfs;

pub use setpci::{CommandRunner, SetpciSource, SystemCommandRunner};
pub use snapshot::{Snapshot, SnapshotDevice, SnapshotSource};
pub use sysfs::SysfsSource;

/// Read-only view of the host PCI configuration space.
pub trait DeviceAttributeSource {
    /// All device addresses currently visible, unfiltered.
    ///
    /// Fails with `SourceUnavailable` if the query mechanism cannot run.
    fn list_device_addresses(&self) -> Result<Vec<PciAddress>>;

    /// Class code register. Fails with `AttributeUnavailable`.
    fn class_code(&self, address: PciAddress) -> Result<ClassCode>;

    /// Header type register. Fails with `AttributeUnavailable`.
    fn header_type(&self, address: PciAddress) -> Result<HeaderType>;

    /// Secondary bus number; only meaningful for bridges.
    fn secondary_bus_number(&self, address: PciAddress) -> Result<u8>;

    /// Bus the device itself sits on. Bridges report it in config space;
    /// sources that cannot read it fall back to the address bus field.
    fn primary_bus_number(&self, address: PciAddress) -> Result<u8> {
        Ok(address.bus)
    }

    /// Short name for logs and reports.
    fn name(&self) -> &'static str;
}

impl<S: DeviceAttributeSource + ?Sized> DeviceAttributeSource for &S {
    fn list_device_addresses(&self) -> Result<Vec<PciAddress>> {
        (**self).list_device_addresses()
    }

    fn class_code(&self, address: PciAddress) -> Result<ClassCode> {
        (**self).class_code(address)
    }

    fn header_type(&self, address: PciAddress) -> Result<HeaderType> {
        (**self).header_type(address)
    }

    fn secondary_bus_number(&self, address: PciAddress) -> Result<u8> {
        (**self).secondary_bus_number(address)
    }

    fn primary_bus_number(&self, address: PciAddress) -> Result<u8> {
        (**self).primary_bus_number(address)
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}

impl<S: DeviceAttributeSource + ?Sized> DeviceAttributeSource for Box<S> {
    fn list_device_addresses(&self) -> Result<Vec<PciAddress>> {
        (**self).list_device_addresses()
    }

    fn class_code(&self, address: PciAddress) -> Result<ClassCode> {
        (**self).class_code(address)
    }

    fn header_type(&self, address: PciAddress) -> Result<HeaderType> {
        (**self).header_type(address)
    }

    fn secondary_bus_number(&self, address: PciAddress) -> Result<u8> {
        (**self).secondary_bus_number(address)
    }

    fn primary_bus_number(&self, address: PciAddress) -> Result<u8> {
        (**self).primary_bus_number(address)
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}
