//! # rootport
//!
//! Finds every GPU on a host and the PCIe root port it sits behind, so that
//! link resets and diagnostics can target the port without reading
//! `lspci -t` by hand.
//!
//! PCI configuration space has no parent pointers. Discovery reads each
//! device's class code, header type and (for bridges) bus numbers once,
//! indexes bridges by the bus they feed, and climbs from each GPU's bus to
//! the topmost bridge.
//!
//! ## Quick Start
//!
//! ```no_run
//! use rootport::{discover_gpu_root_ports, SysfsSource};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let report = discover_gpu_root_ports(&SysfsSource::new())?;
//! for port in report.root_ports() {
//!     println!("{} feeds {:?}", port, report.gpus_behind(port));
//! }
//! for anomaly in &report.anomalies {
//!     eprintln!("warning: {}", anomaly);
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod discovery;
pub mod error;
pub mod pci;
pub mod source;
pub mod topology;

pub use config::{Backend, DiscoveryConfig, LogLevel, RootPortConfig, SourceConfig};
pub use discovery::{discover_gpu_root_ports, ClassCount, Discovery, DiscoveryReport};
pub use error::{Result, RootPortError};
pub use pci::{BusKey, ClassCode, HeaderType, PciAddress, PciClass};
pub use source::{
    DeviceAttributeSource, SetpciSource, Snapshot, SnapshotDevice, SnapshotSource, SysfsSource,
};
pub use topology::{
    DeviceRecord, GpuClassifier, RootPortResult, RootPortTracer, SkippedDevice, TopologyAnomaly,
    TopologyIndex,
};
