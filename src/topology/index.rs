//! Bus → bridge lookup, built once per discovery pass.

use std::collections::BTreeMap;

use crate::pci::{BusKey, PciAddress};

use super::{DeviceRecord, TopologyAnomaly};

/// A bridge as seen from the bus it feeds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BridgeEntry {
    pub address: PciAddress,
    /// Bus the bridge itself sits on; the next bus to look up when climbing.
    pub primary_bus: BusKey,
}

/// Read-only snapshot mapping each secondary bus to the bridge feeding it
#[derive(Debug, Clone, Default)]
pub struct TopologyIndex {
    bridges: BTreeMap<BusKey, BridgeEntry>,
    anomalies: Vec<TopologyAnomaly>,
}

impl TopologyIndex {
    /// Index every bridge record by its secondary bus. When two bridges claim
    /// the same bus the first in `records` order wins and the clash is kept
    /// as an anomaly.
    pub fn build(records: &[DeviceRecord]) -> Self {
        let mut index = Self::default();

        for record in records {
            let Some(bus) = record.secondary_bus_key() else {
                continue;
            };
            // bus 0 is a root bus; no bridge can feed it
            if bus.bus == 0 {
                let anomaly = TopologyAnomaly::UnassignedSecondaryBus {
                    bridge: record.address,
                };
                log::warn!("Topology anomaly: {}", anomaly);
                index.anomalies.push(anomaly);
                continue;
            }
            let entry = BridgeEntry {
                address: record.address,
                primary_bus: record.primary_bus_key(),
            };

            if let Some(kept) = index.bridges.get(&bus) {
                let anomaly = TopologyAnomaly::DuplicateSecondaryBus {
                    bus,
                    kept: kept.address,
                    ignored: entry.address,
                };
                log::warn!("Topology anomaly: {}", anomaly);
                index.anomalies.push(anomaly);
                continue;
            }

            if entry.primary_bus.bus != record.address.bus {
                log::debug!(
                    "{}: primary bus register {:02x} differs from address bus",
                    record.address,
                    entry.primary_bus.bus
                );
            }
            index.bridges.insert(bus, entry);
        }

        log::debug!("Indexed {} bridges", index.bridges.len());
        index
    }

    /// The bridge feeding `bus`, if any.
    pub fn lookup(&self, bus: BusKey) -> Option<&BridgeEntry> {
        self.bridges.get(&bus)
    }

    pub fn len(&self) -> usize {
        self.bridges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bridges.is_empty()
    }

    /// (secondary bus, bridge) pairs in bus order.
    pub fn bridges(&self) -> impl Iterator<Item = (&BusKey, &BridgeEntry)> {
        self.bridges.iter()
    }

    pub fn anomalies(&self) -> &[TopologyAnomaly] {
        &self.anomalies
    }

    /// Duplicate-claim anomalies recorded for `bus`.
    pub fn anomalies_for(&self, bus: BusKey) -> impl Iterator<Item = &TopologyAnomaly> {
        self.anomalies.iter().filter(move |a| {
            matches!(a, TopologyAnomaly::DuplicateSecondaryBus { bus: b, .. } if *b == bus)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pci::{ClassCode, HeaderType};

    fn addr(s: &str) -> PciAddress {
        s.parse().unwrap()
    }

    fn bridge(s: &str, secondary: u8) -> DeviceRecord {
        let address = addr(s);
        DeviceRecord {
            address,
            class_code: ClassCode::from_u32(0x060400),
            header_type: HeaderType(0x01),
            secondary_bus: Some(secondary),
            primary_bus: Some(address.bus),
        }
    }

    fn gpu(s: &str) -> DeviceRecord {
        DeviceRecord {
            address: addr(s),
            class_code: ClassCode::from_u32(0x030000),
            header_type: HeaderType(0x00),
            secondary_bus: None,
            primary_bus: None,
        }
    }

    #[test]
    fn test_round_trips_bridge_to_bus_to_bridge() {
        let records = vec![bridge("00:01.0", 1), bridge("01:00.0", 2), gpu("02:00.0")];
        let index = TopologyIndex::build(&records);

        assert_eq!(index.len(), 2);
        for record in records.iter().filter(|r| r.is_bridge()) {
            let bus = record.secondary_bus_key().unwrap();
            assert_eq!(index.lookup(bus).unwrap().address, record.address);
        }
        assert!(index.anomalies().is_empty());
    }

    #[test]
    fn test_endpoints_are_not_indexed() {
        let index = TopologyIndex::build(&[gpu("05:00.0")]);
        assert!(index.is_empty());
        assert!(index.lookup(addr("05:00.0").bus_key()).is_none());
    }

    #[test]
    fn test_duplicate_secondary_keeps_first_and_reports() {
        let records = vec![bridge("00:01.0", 2), bridge("00:02.0", 2)];
        let index = TopologyIndex::build(&records);
        let bus = BusKey { domain: 0, bus: 2 };

        assert_eq!(index.lookup(bus).unwrap().address, addr("00:01.0"));
        assert_eq!(
            index.anomalies(),
            &[TopologyAnomaly::DuplicateSecondaryBus {
                bus,
                kept: addr("00:01.0"),
                ignored: addr("00:02.0"),
            }]
        );
        assert_eq!(index.anomalies_for(bus).count(), 1);
        assert_eq!(index.anomalies_for(BusKey { domain: 0, bus: 3 }).count(), 0);
    }

    #[test]
    fn test_segments_do_not_collide() {
        let records = vec![bridge("0000:00:01.0", 1), bridge("0001:00:01.0", 1)];
        let index = TopologyIndex::build(&records);
        assert_eq!(index.len(), 2);
        assert!(index.anomalies().is_empty());
    }

    #[test]
    fn test_primary_bus_register_is_used() {
        let mut record = bridge("00:01.0", 4);
        record.primary_bus = Some(0x20);
        let index = TopologyIndex::build(&[record]);
        let entry = index.lookup(BusKey { domain: 0, bus: 4 }).unwrap();
        assert_eq!(entry.primary_bus, BusKey { domain: 0, bus: 0x20 });
    }

    #[test]
    fn test_unassigned_bridge_is_not_indexed() {
        let records = vec![bridge("00:1c.4", 0), bridge("00:01.0", 1), gpu("00:02.0")];
        let index = TopologyIndex::build(&records);

        assert_eq!(index.len(), 1);
        assert!(index.lookup(BusKey { domain: 0, bus: 0 }).is_none());
        assert_eq!(
            index.anomalies(),
            &[TopologyAnomaly::UnassignedSecondaryBus {
                bridge: addr("00:1c.4"),
            }]
        );
    }
}
