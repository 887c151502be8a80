// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2026 nervosys

//! GPU root-port discovery pass.
//!
//! Enumerates once, probes each device once, builds the bridge index once,
//! then traces every GPU against that shared index. Tracing issues no
//! further queries to the source.
//!
//! # Examples
//!
//! ```no_run
//! use rootport::discovery::discover_gpu_root_ports;
//! use rootport::source::SysfsSource;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let report = discover_gpu_root_ports(&SysfsSource::new())?;
//! for result in &report.results {
//!     println!("GPU {} -> root port {}", result.gpu, result.root_port);
//! }
//! # Ok(())
//! # }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::DiscoveryConfig;
use crate::error::Result;
use crate::pci::{PciAddress, PciClass};
use crate::source::DeviceAttributeSource;
use crate::topology::{
    collect_records, CollectedRecords, DeviceRecord, GpuClassifier, RootPortResult, RootPortTracer,
    SkippedDevice, TopologyAnomaly, TopologyIndex,
};

/// Number of probed devices in one class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassCount {
    pub class: PciClass,
    pub count: usize,
}

/// Tally records by base class, in first-seen order.
fn class_counts(records: &[DeviceRecord]) -> Vec<ClassCount> {
    let mut counts: Vec<ClassCount> = Vec::new();
    for record in records {
        let class = record.class_code.class();
        match counts.iter_mut().find(|c| c.class == class) {
            Some(entry) => entry.count += 1,
            None => counts.push(ClassCount { class, count: 1 }),
        }
    }
    counts
}

/// Outcome of one discovery pass
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryReport {
    /// Name of the attribute source used.
    pub source: String,
    pub generated_at: DateTime<Utc>,
    pub devices_enumerated: usize,
    pub bridges_indexed: usize,
    /// Probed devices per class.
    #[serde(default)]
    pub classes: Vec<ClassCount>,
    /// One entry per GPU, in discovery order.
    pub results: Vec<RootPortResult>,
    /// Every anomaly met during the pass.
    pub anomalies: Vec<TopologyAnomaly>,
    /// Devices excluded because an attribute could not be read.
    pub skipped: Vec<SkippedDevice>,
}

impl DiscoveryReport {
    /// Distinct root ports in first-seen order.
    pub fn root_ports(&self) -> Vec<PciAddress> {
        let mut ports: Vec<PciAddress> = Vec::new();
        for result in &self.results {
            if !ports.contains(&result.root_port) {
                ports.push(result.root_port);
            }
        }
        ports
    }

    /// GPUs sharing `root_port`.
    pub fn gpus_behind(&self, root_port: PciAddress) -> Vec<PciAddress> {
        self.results
            .iter()
            .filter(|r| r.root_port == root_port)
            .map(|r| r.gpu)
            .collect()
    }

    pub fn has_anomalies(&self) -> bool {
        !self.anomalies.is_empty()
    }
}

/// A configured discovery pass over one attribute source
#[derive(Debug)]
pub struct Discovery<S> {
    source: S,
    config: DiscoveryConfig,
}

impl<S: DeviceAttributeSource + Sync> Discovery<S> {
    pub fn new(source: S) -> Self {
        Self::with_config(source, DiscoveryConfig::default())
    }

    pub fn with_config(source: S, config: DiscoveryConfig) -> Self {
        Self { source, config }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn config(&self) -> &DiscoveryConfig {
        &self.config
    }

    /// Enumerate and probe every device. `SourceUnavailable` is returned
    /// as-is; per-device failures end up in `skipped`.
    pub fn collect_records(&self) -> Result<(usize, CollectedRecords)> {
        let addresses = self.source.list_device_addresses()?;
        log::debug!(
            "{} enumerated {} devices",
            self.source.name(),
            addresses.len()
        );
        let collected = collect_records(&self.source, &addresses, self.config.workers.max(1));
        Ok((addresses.len(), collected))
    }

    /// Run the pass against current host state.
    pub fn run(&self) -> Result<DiscoveryReport> {
        let (devices_enumerated, collected) = self.collect_records()?;

        let index = TopologyIndex::build(&collected.records);
        let classifier = GpuClassifier::new(self.config.require_single_function);
        let gpus = classifier.gpus(&collected.records);

        let tracer = RootPortTracer::with_max_hops(&index, self.config.max_hops);
        let results: Vec<RootPortResult> = gpus.into_iter().map(|gpu| tracer.trace(gpu)).collect();

        let mut anomalies = index.anomalies().to_vec();
        for result in &results {
            for anomaly in &result.anomalies {
                if !anomalies.contains(anomaly) {
                    anomalies.push(anomaly.clone());
                }
            }
        }

        let report = DiscoveryReport {
            source: self.source.name().to_string(),
            generated_at: Utc::now(),
            devices_enumerated,
            bridges_indexed: index.len(),
            classes: class_counts(&collected.records),
            results,
            anomalies,
            skipped: collected.skipped,
        };

        log::info!(
            "Discovered {} GPUs behind {} root ports ({} devices, {} bridges, {} skipped, {} anomalies)",
            report.results.len(),
            report.root_ports().len(),
            report.devices_enumerated,
            report.bridges_indexed,
            report.skipped.len(),
            report.anomalies.len()
        );

        Ok(report)
    }
}

/// Resolve every GPU on the host to its root port with default settings.
pub fn discover_gpu_root_ports<S>(source: &S) -> Result<DiscoveryReport>
where
    S: DeviceAttributeSource + Sync + ?Sized,
{
    Discovery::new(source).run()
}
