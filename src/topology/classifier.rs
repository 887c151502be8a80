//! GPU endpoint classification

use crate::pci::{HeaderType, PciAddress};

use super::DeviceRecord;

/// A GPU is a display-class (0x03) function with an endpoint header.
pub fn is_gpu(record: &DeviceRecord) -> bool {
    GpuClassifier::default().is_gpu(record)
}

/// Filters device records down to GPU endpoints
#[derive(Debug, Clone, Copy, Default)]
pub struct GpuClassifier {
    /// Compare the raw header byte against 0x00, rejecting multi-function
    /// GPUs (header 0x80) the way a literal `HEADER_TYPE == 00` check does.
    pub require_single_function: bool,
}

impl GpuClassifier {
    pub fn new(require_single_function: bool) -> Self {
        Self {
            require_single_function,
        }
    }

    pub fn is_gpu(&self, record: &DeviceRecord) -> bool {
        if !record.class_code.is_display_controller() {
            return false;
        }
        if self.require_single_function {
            record.header_type.raw() == HeaderType::ENDPOINT
        } else {
            record.is_endpoint()
        }
    }

    /// GPU addresses in record (enumeration) order.
    pub fn gpus(&self, records: &[DeviceRecord]) -> Vec<PciAddress> {
        records
            .iter()
            .filter(|r| self.is_gpu(r))
            .map(|r| r.address)
            .collect()
    }
}
