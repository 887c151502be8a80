//! PCI addressing and configuration-space vocabulary.

mod address;
mod class;

pub use address::{BusKey, PciAddress};
pub use class::{ClassCode, HeaderLayout, HeaderType, PciClass};
