// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2026 nervosys

//! TOML configuration for discovery and attribute sources

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Result, RootPortError};
use crate::source::{DeviceAttributeSource, SetpciSource, SnapshotSource, SysfsSource};
use crate::topology::DEFAULT_MAX_HOPS;

/// Log level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl Default for LogLevel {
    fn default() -> Self { LogLevel::Warn }
}

impl LogLevel {
    /// Filter string understood by `env_logger`.
    pub fn as_filter(&self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
        }
    }
}

/// Where device attributes come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// `/sys/bus/pci/devices`
    Sysfs,
    /// `lspci` + `setpci`
    Setpci,
    /// A JSON snapshot captured earlier
    Snapshot,
}

impl Default for Backend {
    fn default() -> Self { Backend::Sysfs }
}

impl std::str::FromStr for Backend {
    type Err = RootPortError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "sysfs" => Ok(Self::Sysfs),
            "setpci" | "pciutils" => Ok(Self::Setpci),
            "snapshot" => Ok(Self::Snapshot),
            _ => Err(RootPortError::Configuration(format!(
                "Unknown backend '{}'. Supported: sysfs, setpci, snapshot",
                s
            ))),
        }
    }
}

/// `[source]` table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub backend: Backend,
    pub sysfs_root: PathBuf,
    pub lspci: String,
    pub setpci: String,
    pub snapshot: Option<PathBuf>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Sysfs,
            sysfs_root: PathBuf::from(SysfsSource::DEFAULT_ROOT),
            lspci: "lspci".into(),
            setpci: "setpci".into(),
            snapshot: None,
        }
    }
}

impl SourceConfig {
    /// Build the configured attribute source.
    pub fn open(&self) -> Result<Box<dyn DeviceAttributeSource + Send + Sync>> {
        match self.backend {
            Backend::Sysfs => Ok(Box::new(SysfsSource::with_root(&self.sysfs_root))),
            Backend::Setpci => Ok(Box::new(
                SetpciSource::new().with_programs(&self.lspci, &self.setpci),
            )),
            Backend::Snapshot => {
                let path = self.snapshot.as_ref().ok_or_else(|| {
                    RootPortError::Configuration("snapshot backend needs a snapshot path".into())
                })?;
                Ok(Box::new(SnapshotSource::from_json_file(path)?))
            }
        }
    }
}

/// `[discovery]` table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Bridges climbed before a trace is declared cyclic.
    pub max_hops: usize,
    /// Threads probing devices; 1 probes sequentially.
    pub workers: usize,
    /// Only accept GPUs whose header type byte is exactly 0x00.
    pub require_single_function: bool,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            max_hops: DEFAULT_MAX_HOPS,
            workers: 1,
            require_single_function: false,
        }
    }
}

/// Top-level configuration file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RootPortConfig {
    pub log_level: LogLevel,
    pub source: SourceConfig,
    pub discovery: DiscoveryConfig,
}

impl RootPortConfig {
    /// Load from TOML file
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| RootPortError::Configuration(format!("Cannot read {}: {}", path.display(), e)))?;
        Self::from_toml(&content)
    }

    /// Parse from TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| RootPortError::Configuration(format!("TOML parse error: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.discovery.max_hops == 0 {
            return Err(RootPortError::Configuration("max_hops must be at least 1".into()));
        }
        if self.discovery.workers == 0 {
            return Err(RootPortError::Configuration("workers must be at least 1".into()));
        }
        if self.source.backend == Backend::Snapshot && self.source.snapshot.is_none() {
            return Err(RootPortError::Configuration(
                "backend = \"snapshot\" requires snapshot = \"<file>\"".into(),
            ));
        }
        Ok(())
    }

    /// Generate sample config
    pub fn sample_toml() -> String {
        r#"# rootport configuration
log_level = "Warn"

[source]
# sysfs | setpci | snapshot
backend = "sysfs"
sysfs_root = "/sys/bus/pci/devices"
lspci = "lspci"
setpci = "setpci"
# snapshot = "/var/tmp/rootport-snapshot.json"

[discovery]
max_hops = 256
workers = 1
require_single_function = false
"#
        .into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_parses_to_default() {
        let config = RootPortConfig::from_toml(&RootPortConfig::sample_toml()).unwrap();
        assert_eq!(config, RootPortConfig::default());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = RootPortConfig::from_toml(
            r#"
            [discovery]
            workers = 8
            "#,
        )
        .unwrap();
        assert_eq!(config.discovery.workers, 8);
        assert_eq!(config.discovery.max_hops, DEFAULT_MAX_HOPS);
        assert_eq!(config.source.backend, Backend::Sysfs);
    }

    #[test]
    fn test_setpci_backend() {
        let config = RootPortConfig::from_toml(
            r#"
            log_level = "Debug"
            [source]
            backend = "setpci"
            setpci = "/usr/sbin/setpci"
            "#,
        )
        .unwrap();
        assert_eq!(config.log_level.as_filter(), "debug");
        assert_eq!(config.source.backend, Backend::Setpci);
        assert_eq!(config.source.setpci, "/usr/sbin/setpci");
        assert_eq!(config.source.open().unwrap().name(), "setpci");
    }

    #[test]
    fn test_rejects_invalid_values() {
        assert!(RootPortConfig::from_toml("[discovery]\nmax_hops = 0\n").is_err());
        assert!(RootPortConfig::from_toml("[discovery]\nworkers = 0\n").is_err());
        assert!(RootPortConfig::from_toml("[source]\nbackend = \"snapshot\"\n").is_err());
        assert!(RootPortConfig::from_toml("[source]\nbackend = \"ebpf\"\n").is_err());
        assert!(RootPortConfig::from_toml("log_level = 3").is_err());
    }

    #[test]
    fn test_backend_from_str() {
        assert_eq!("SYSFS".parse::<Backend>().unwrap(), Backend::Sysfs);
        assert_eq!("pciutils".parse::<Backend>().unwrap(), Backend::Setpci);
        assert!("nvml".parse::<Backend>().is_err());
    }

    #[test]
    fn test_missing_file() {
        match RootPortConfig::from_toml_file("/nonexistent/rootport.toml") {
            Err(RootPortError::Configuration(msg)) => assert!(msg.contains("Cannot read")),
            other => panic!("Expected Configuration error, got {:?}", other),
        }
    }
}
