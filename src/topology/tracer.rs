//! Upward walk from a GPU to its root port

use serde::{Deserialize, Serialize};

use crate::pci::PciAddress;

use super::{TopologyAnomaly, TopologyIndex};

/// One hop per possible bus number.
pub const DEFAULT_MAX_HOPS: usize = 256;

/// A GPU and the root port it resolves to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootPortResult {
    pub gpu: PciAddress,
    /// Topmost bridge above the GPU, or the GPU itself when no bridge
    /// feeds its bus.
    pub root_port: PciAddress,
    /// Bridges climbed.
    pub hops: usize,
    /// Anomalies met on this GPU's path.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub anomalies: Vec<TopologyAnomaly>,
}

impl RootPortResult {
    /// No upstream bridge was found.
    pub fn is_self_mapped(&self) -> bool {
        self.gpu == self.root_port
    }

    pub fn is_degraded(&self) -> bool {
        !self.anomalies.is_empty()
    }
}

/// Resolves GPUs to root ports against a shared [`TopologyIndex`]
#[derive(Debug, Clone, Copy)]
pub struct RootPortTracer<'a> {
    index: &'a TopologyIndex,
    max_hops: usize,
}

impl<'a> RootPortTracer<'a> {
    pub fn new(index: &'a TopologyIndex) -> Self {
        Self::with_max_hops(index, DEFAULT_MAX_HOPS)
    }

    pub fn with_max_hops(index: &'a TopologyIndex, max_hops: usize) -> Self {
        Self { index, max_hops }
    }

    /// Climb from `gpu`'s bus through the bridges feeding each bus.
    ///
    /// Each climbed bridge moves the search to the bus the bridge sits on.
    /// The walk ends at the first bus nothing feeds, or after `max_hops`
    /// bridges, in which case the last bridge reached is returned together
    /// with a `HopLimitExceeded` anomaly.
    pub fn trace(&self, gpu: PciAddress) -> RootPortResult {
        let mut current = gpu;
        let mut bus = gpu.bus_key();
        let mut hops = 0;
        let mut anomalies = Vec::new();

        while let Some(bridge) = self.index.lookup(bus) {
            if hops == self.max_hops {
                let anomaly = TopologyAnomaly::HopLimitExceeded {
                    gpu,
                    hops,
                    last: current,
                };
                log::warn!("Topology anomaly: {}", anomaly);
                anomalies.push(anomaly);
                break;
            }

            for dup in self.index.anomalies_for(bus) {
                if !anomalies.contains(dup) {
                    anomalies.push(dup.clone());
                }
            }

            log::trace!("{}: bus {} fed by {}", gpu, bus, bridge.address);
            current = bridge.address;
            bus = bridge.primary_bus;
            hops += 1;
        }

        RootPortResult {
            gpu,
            root_port: current,
            hops,
            anomalies,
        }
    }
}
