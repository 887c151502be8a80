//! Per-device attribute records and their collection from a source.

use serde::{Deserialize, Serialize};

use crate::error::{Result, RootPortError};
use crate::pci::{BusKey, ClassCode, HeaderLayout, HeaderType, PciAddress};
use crate::source::DeviceAttributeSource;

/// Attributes of one device at one point in time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRecord {
    pub address: PciAddress,
    pub class_code: ClassCode,
    pub header_type: HeaderType,
    /// Bus downstream of a bridge; `None` for endpoints.
    pub secondary_bus: Option<u8>,
    /// Bus a bridge sits on, as read from its config space.
    pub primary_bus: Option<u8>,
}

impl DeviceRecord {
    pub fn is_bridge(&self) -> bool {
        self.header_type.is_bridge()
    }

    pub fn is_endpoint(&self) -> bool {
        self.header_type.is_endpoint()
    }

    /// The bus this device is attached to (upstream side for bridges).
    pub fn primary_bus_key(&self) -> BusKey {
        self.address.sibling_bus(self.primary_bus.unwrap_or(self.address.bus))
    }

    /// The bus a bridge feeds; `None` for anything that is not a bridge.
    pub fn secondary_bus_key(&self) -> Option<BusKey> {
        if !self.is_bridge() {
            return None;
        }
        self.secondary_bus.map(|bus| self.address.sibling_bus(bus))
    }
}

/// A device left out of a pass because one of its attributes was unreadable
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedDevice {
    pub address: PciAddress,
    pub attribute: String,
    pub reason: String,
}

/// Outcome of probing one device.
#[derive(Debug)]
pub(crate) enum Probe {
    Record(DeviceRecord),
    /// Neither endpoint nor bridge (CardBus and reserved layouts).
    Ignored,
    Skipped(SkippedDevice),
}

/// Read the attributes of one device: one query per attribute, and only
/// the attributes its header layout makes meaningful.
pub(crate) fn probe_device<S>(source: &S, address: PciAddress) -> Probe
where
    S: DeviceAttributeSource + ?Sized,
{
    match try_probe(source, address) {
        Ok(Some(record)) => Probe::Record(record),
        Ok(None) => Probe::Ignored,
        Err(RootPortError::AttributeUnavailable {
            address,
            attribute,
            reason,
        }) => {
            log::debug!("Skipping {}: {} unavailable ({})", address, attribute, reason);
            Probe::Skipped(SkippedDevice {
                address,
                attribute: attribute.to_string(),
                reason,
            })
        }
        Err(other) => {
            log::debug!("Skipping {}: {}", address, other);
            Probe::Skipped(SkippedDevice {
                address,
                attribute: "unknown".to_string(),
                reason: other.to_string(),
            })
        }
    }
}

fn try_probe<S>(source: &S, address: PciAddress) -> Result<Option<DeviceRecord>>
where
    S: DeviceAttributeSource + ?Sized,
{
    let header_type = source.header_type(address)?;
    if let HeaderLayout::Other(layout) = header_type.layout() {
        log::debug!("Ignoring {}: header layout 0x{:02x}", address, layout);
        return Ok(None);
    }

    let class_code = source.class_code(address)?;

    let (secondary_bus, primary_bus) = if header_type.is_bridge() {
        let secondary = source.secondary_bus_number(address)?;
        let primary = match source.primary_bus_number(address) {
            Ok(bus) => Some(bus),
            Err(e) => {
                log::debug!("{}: primary bus unreadable, using address bus ({})", address, e);
                None
            }
        };
        (Some(secondary), primary)
    } else {
        (None, None)
    };

    Ok(Some(DeviceRecord {
        address,
        class_code,
        header_type,
        secondary_bus,
        primary_bus,
    }))
}

/// Records and skips from probing an enumeration, both in enumeration order.
#[derive(Debug, Default)]
pub struct CollectedRecords {
    pub records: Vec<DeviceRecord>,
    pub skipped: Vec<SkippedDevice>,
}

/// Probe every address, fanning out over `workers` scoped threads.
///
/// Each worker owns a contiguous slice of the enumeration and the slices are
/// concatenated after all workers join, so the result is identical to a
/// sequential probe regardless of `workers`.
pub fn collect_records<S>(source: &S, addresses: &[PciAddress], workers: usize) -> CollectedRecords
where
    S: DeviceAttributeSource + Sync + ?Sized,
{
    let workers = workers.min(addresses.len());
    let probes: Vec<Probe> = if workers <= 1 {
        addresses.iter().map(|&a| probe_device(source, a)).collect()
    } else {
        let chunk_size = (addresses.len() + workers - 1) / workers;
        std::thread::scope(|scope| {
            let handles: Vec<_> = addresses
                .chunks(chunk_size)
                .map(|chunk| {
                    scope.spawn(move || {
                        chunk
                            .iter()
                            .map(|&a| probe_device(source, a))
                            .collect::<Vec<_>>()
                    })
                })
                .collect();

            handles
                .into_iter()
                .flat_map(|h| h.join().unwrap_or_else(|e| std::panic::resume_unwind(e)))
                .collect()
        })
    };

    let mut collected = CollectedRecords::default();
    for probe in probes {
        match probe {
            Probe::Record(record) => collected.records.push(record),
            Probe::Skipped(skipped) => collected.skipped.push(skipped),
            Probe::Ignored => {}
        }
    }
    collected
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{SnapshotDevice, SnapshotSource};

    fn addr(s: &str) -> PciAddress {
        s.parse().unwrap()
    }

    fn fixture() -> SnapshotSource {
        let mut cardbus = SnapshotDevice::endpoint(addr("00:1e.0"), 0x060700);
        cardbus.header_type = Some(HeaderType(0x02));
        let mut vanished = SnapshotDevice::gpu(addr("04:00.0"));
        vanished.class_code = None;
        SnapshotSource::from_devices(vec![
            SnapshotDevice::bridge(addr("00:01.0"), 1),
            cardbus,
            SnapshotDevice::gpu(addr("01:00.0")),
            vanished,
            SnapshotDevice::endpoint(addr("01:00.1"), 0x040300),
        ])
    }

    #[test]
    fn test_collects_in_enumeration_order() {
        let source = fixture();
        let addrs = source.list_device_addresses().unwrap();
        let collected = collect_records(&source, &addrs, 1);

        let got: Vec<_> = collected.records.iter().map(|r| r.address).collect();
        assert_eq!(got, vec![addr("00:01.0"), addr("01:00.0"), addr("01:00.1")]);
        assert_eq!(collected.skipped.len(), 1);
        assert_eq!(collected.skipped[0].address, addr("04:00.0"));
        assert_eq!(collected.skipped[0].attribute, "class");
    }

    #[test]
    fn test_queries_only_what_the_layout_needs() {
        let source = fixture();
        let addrs = source.list_device_addresses().unwrap();
        let _ = collect_records(&source, &addrs, 1);
        // bridge: 4, cardbus: 1, endpoints: 2 each
        assert_eq!(source.query_count(), 4 + 1 + 2 + 2 + 2);
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let source = fixture();
        let addrs = source.list_device_addresses().unwrap();
        let sequential = collect_records(&source, &addrs, 1);
        for workers in [2, 3, 8, 64] {
            let parallel = collect_records(&source, &addrs, workers);
            assert_eq!(parallel.records, sequential.records);
            assert_eq!(parallel.skipped, sequential.skipped);
        }
    }

    #[test]
    fn test_more_workers_than_devices() {
        let source = fixture();
        let addrs = source.list_device_addresses().unwrap();
        let sequential = collect_records(&source, &addrs, 1);
        let parallel = collect_records(&source, &addrs, usize::MAX);
        assert_eq!(parallel.records, sequential.records);
        assert_eq!(parallel.skipped, sequential.skipped);
        assert!(collect_records(&source, &[], usize::MAX).records.is_empty());
    }

    #[test]
    fn test_bus_keys() {
        let record = DeviceRecord {
            address: addr("0001:02:01.0"),
            class_code: ClassCode::from_u32(0x060400),
            header_type: HeaderType(0x01),
            secondary_bus: Some(3),
            primary_bus: Some(2),
        };
        assert_eq!(record.primary_bus_key(), BusKey { domain: 1, bus: 2 });
        assert_eq!(record.secondary_bus_key(), Some(BusKey { domain: 1, bus: 3 }));

        let endpoint = DeviceRecord {
            header_type: HeaderType(0x00),
            secondary_bus: None,
            primary_bus: None,
            ..record
        };
        assert_eq!(endpoint.secondary_bus_key(), None);
        assert_eq!(endpoint.primary_bus_key(), BusKey { domain: 1, bus: 2 });
    }
}
