//! PCI topology reconstruction: records, bridge index, GPU classification
//! and the upward root-port walk.
//!
//! PCI exposes no parent links. The only upward edge available is "bridge B
//! feeds bus N" (B's secondary bus), so the index maps each bus to the
//! bridge feeding it and the tracer climbs bus by bus until no bridge feeds
//! the current bus. The last bridge climbed is the root port.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::pci::{BusKey, PciAddress};

mod classifier;
mod index;
mod record;
mod tracer;

pub use classifier::{is_gpu, GpuClassifier};
pub use index::{BridgeEntry, TopologyIndex};
pub use record::{collect_records, CollectedRecords, DeviceRecord, SkippedDevice};
pub use tracer::{RootPortResult, RootPortTracer, DEFAULT_MAX_HOPS};

/// Non-fatal inconsistency in the reported topology
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TopologyAnomaly {
    /// Two bridges claim the same secondary bus; the first seen is kept.
    DuplicateSecondaryBus {
        bus: BusKey,
        kept: PciAddress,
        ignored: PciAddress,
    },
    /// A trace climbed `hops` bridges without reaching the top.
    HopLimitExceeded {
        gpu: PciAddress,
        hops: usize,
        last: PciAddress,
    },
    /// A bridge reports secondary bus 0, which firmware leaves in place on
    /// ports it never enumerated. The bridge is left out of the index.
    UnassignedSecondaryBus { bridge: PciAddress },
}

impl fmt::Display for TopologyAnomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateSecondaryBus { bus, kept, ignored } => write!(
                f,
                "bus {} is fed by both {} and {}; using {}",
                bus, kept, ignored, kept
            ),
            Self::HopLimitExceeded { gpu, hops, last } => write!(
                f,
                "trace from {} gave up after {} hops at {}",
                gpu, hops, last
            ),
            Self::UnassignedSecondaryBus { bridge } => {
                write!(f, "bridge {} has no secondary bus assigned; ignored", bridge)
            }
        }
    }
}
