//! Error types for rootport

use std::io;
use thiserror::Error;

use crate::pci::PciAddress;

/// Result type alias for rootport operations
pub type Result<T> = std::result::Result<T, RootPortError>;

/// Errors surfaced by attribute sources, configuration and discovery
#[derive(Error, Debug)]
pub enum RootPortError {
    /// The enumeration mechanism itself is broken (utility missing,
    /// sysfs not mounted, permission denied). Fatal to a discovery pass.
    #[error("Device source unavailable: {0}")]
    SourceUnavailable(String),

    /// A single device attribute could not be read. Recovered per device.
    #[error("Attribute {attribute} unavailable for {address}: {reason}")]
    AttributeUnavailable {
        address: PciAddress,
        attribute: &'static str,
        reason: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Parse error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Command failed
    #[error("Command failed: {0}")]
    CommandFailed(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl RootPortError {
    pub(crate) fn attribute(
        address: PciAddress,
        attribute: &'static str,
        reason: impl Into<String>,
    ) -> Self {
        Self::AttributeUnavailable {
            address,
            attribute,
            reason: reason.into(),
        }
    }

    /// Whether this error aborts a whole discovery pass.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::AttributeUnavailable { .. })
    }
}
