//! pciutils attribute source (`lspci` + `setpci`)

use std::process::Command;

use crate::error::{Result, RootPortError};
use crate::pci::{ClassCode, HeaderType, PciAddress};

use super::DeviceAttributeSource;

/// Runs an external program and returns its trimmed stdout.
pub trait CommandRunner {
    fn run(&self, program: &str, args: &[&str]) -> Result<String>;
}

/// Spawns real processes via `std::process::Command`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemCommandRunner;

impl CommandRunner for SystemCommandRunner {
    fn run(&self, program: &str, args: &[&str]) -> Result<String> {
        let output = Command::new(program).args(args).output()?;
        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
        } else {
            Err(RootPortError::CommandFailed(format!(
                "{} {}: {}",
                program,
                args.join(" "),
                String::from_utf8_lossy(&output.stderr).trim()
            )))
        }
    }
}

/// Attribute source that shells out to pciutils.
///
/// Each attribute read is one `setpci -s <bdf> <REGISTER>` invocation.
#[derive(Debug, Clone)]
pub struct SetpciSource<R = SystemCommandRunner> {
    lspci: String,
    setpci: String,
    runner: R,
}

impl SetpciSource<SystemCommandRunner> {
    pub fn new() -> Self {
        Self::with_runner(SystemCommandRunner)
    }
}

impl Default for SetpciSource<SystemCommandRunner> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: CommandRunner> SetpciSource<R> {
    pub fn with_runner(runner: R) -> Self {
        Self {
            lspci: "lspci".into(),
            setpci: "setpci".into(),
            runner,
        }
    }

    /// Override the utility paths (e.g. `/usr/sbin/lspci`).
    pub fn with_programs(mut self, lspci: impl Into<String>, setpci: impl Into<String>) -> Self {
        self.lspci = lspci.into();
        self.setpci = setpci.into();
        self
    }

    fn read_register(&self, address: PciAddress, register: &'static str) -> Result<String> {
        let bdf = address.to_string();
        let value = self
            .runner
            .run(&self.setpci, &["-s", &bdf, register])
            .map_err(|e| RootPortError::attribute(address, register, e.to_string()))?;
        if value.is_empty() {
            // setpci prints nothing for a BDF that matches no device
            return Err(RootPortError::attribute(address, register, "no such device"));
        }
        Ok(value)
    }

    fn read_byte(&self, address: PciAddress, register: &'static str) -> Result<u8> {
        let value = self.read_register(address, register)?;
        u8::from_str_radix(value.trim_start_matches("0x"), 16).map_err(|_| {
            RootPortError::attribute(address, register, format!("unexpected output '{}'", value))
        })
    }
}

impl<R: CommandRunner> DeviceAttributeSource for SetpciSource<R> {
    fn list_device_addresses(&self) -> Result<Vec<PciAddress>> {
        let output = self.runner.run(&self.lspci, &["-D"]).map_err(|e| {
            RootPortError::SourceUnavailable(format!("{} failed: {}", self.lspci, e))
        })?;

        let mut addresses = Vec::new();
        for line in output.lines() {
            let Some(token) = line.split_whitespace().next() else {
                continue;
            };
            match token.parse::<PciAddress>() {
                Ok(addr) => addresses.push(addr),
                Err(e) => log::debug!("Ignoring lspci line '{}': {}", line, e),
            }
        }
        Ok(addresses)
    }

    fn class_code(&self, address: PciAddress) -> Result<ClassCode> {
        let value = self.read_register(address, "CLASS")?;
        value
            .parse::<ClassCode>()
            .map_err(|e| RootPortError::attribute(address, "CLASS", e.to_string()))
    }

    fn header_type(&self, address: PciAddress) -> Result<HeaderType> {
        self.read_byte(address, "HEADER_TYPE").map(HeaderType)
    }

    fn secondary_bus_number(&self, address: PciAddress) -> Result<u8> {
        // Offset 0x19 is BAR space on endpoints; callers check the header first
        self.read_byte(address, "SECONDARY_BUS")
    }

    fn primary_bus_number(&self, address: PciAddress) -> Result<u8> {
        self.read_byte(address, "PRIMARY_BUS")
    }

    fn name(&self) -> &'static str {
        "setpci"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io;

    /// Canned command outputs keyed by "program arg arg ..."
    #[derive(Default)]
    struct FakeRunner {
        outputs: HashMap<String, String>,
    }

    impl FakeRunner {
        fn with(mut self, command: &str, output: &str) -> Self {
            self.outputs.insert(command.to_string(), output.to_string());
            self
        }
    }

    impl CommandRunner for FakeRunner {
        fn run(&self, program: &str, args: &[&str]) -> Result<String> {
            let line = std::iter::once(program).chain(args.iter().copied()).collect::<Vec<_>>().join(" ");
            self.outputs.get(&line).cloned().ok_or_else(|| {
                RootPortError::Io(io::Error::new(io::ErrorKind::NotFound, "no such program"))
            })
        }
    }

    fn addr(s: &str) -> PciAddress {
        s.parse().unwrap()
    }

    #[test]
    fn test_lists_lspci_addresses() {
        let runner = FakeRunner::default().with(
            "lspci -D",
            "0000:00:01.0 PCI bridge: Intel Corporation Device 1234\n\
             0000:01:00.0 VGA compatible controller: NVIDIA Corporation Device 2684\n\
             \n",
        );
        let source = SetpciSource::with_runner(runner);
        let addrs = source.list_device_addresses().unwrap();
        assert_eq!(addrs, vec![addr("0000:00:01.0"), addr("0000:01:00.0")]);
    }

    #[test]
    fn test_missing_lspci_is_source_unavailable() {
        let source = SetpciSource::with_runner(FakeRunner::default());
        match source.list_device_addresses() {
            Err(RootPortError::SourceUnavailable(msg)) => assert!(msg.contains("lspci")),
            other => panic!("Expected SourceUnavailable, got {:?}", other),
        }
    }

    #[test]
    fn test_reads_registers() {
        let runner = FakeRunner::default()
            .with("setpci -s 0000:00:01.0 CLASS", "0604")
            .with("setpci -s 0000:00:01.0 HEADER_TYPE", "81")
            .with("setpci -s 0000:00:01.0 SECONDARY_BUS", "01")
            .with("setpci -s 0000:00:01.0 PRIMARY_BUS", "00");
        let source = SetpciSource::with_runner(runner);
        let bridge = addr("0000:00:01.0");

        assert_eq!(source.class_code(bridge).unwrap(), ClassCode::new(0x06, 0x04, 0));
        assert!(source.header_type(bridge).unwrap().is_bridge());
        assert_eq!(source.secondary_bus_number(bridge).unwrap(), 1);
        assert_eq!(source.primary_bus_number(bridge).unwrap(), 0);
    }

    #[test]
    fn test_custom_program_paths() {
        let runner = FakeRunner::default().with("/usr/sbin/lspci -D", "0000:05:00.0 3D controller");
        let source = SetpciSource::with_runner(runner).with_programs("/usr/sbin/lspci", "/usr/sbin/setpci");
        assert_eq!(source.list_device_addresses().unwrap(), vec![addr("0000:05:00.0")]);
    }

    #[test]
    fn test_failed_register_is_attribute_unavailable() {
        let runner = FakeRunner::default().with("setpci -s 0000:07:00.0 HEADER_TYPE", "");
        let source = SetpciSource::with_runner(runner);
        let gpu = addr("0000:07:00.0");

        assert!(matches!(
            source.header_type(gpu),
            Err(RootPortError::AttributeUnavailable { .. })
        ));
        assert!(matches!(
            source.class_code(gpu),
            Err(RootPortError::AttributeUnavailable { .. })
        ));
    }

    #[test]
    fn test_discovery_over_setpci() {
        let runner = FakeRunner::default()
            .with(
                "lspci -D",
                "0000:00:01.0 PCI bridge: Intel Corporation Device 1234\n\
                 0000:01:00.0 VGA compatible controller: NVIDIA Corporation Device 2684\n\
                 0000:01:00.1 Audio device: NVIDIA Corporation Device 22ba",
            )
            .with("setpci -s 0000:00:01.0 HEADER_TYPE", "01")
            .with("setpci -s 0000:00:01.0 CLASS", "060400")
            .with("setpci -s 0000:00:01.0 SECONDARY_BUS", "01")
            .with("setpci -s 0000:00:01.0 PRIMARY_BUS", "00")
            .with("setpci -s 0000:01:00.0 HEADER_TYPE", "80")
            .with("setpci -s 0000:01:00.0 CLASS", "030000")
            .with("setpci -s 0000:01:00.1 HEADER_TYPE", "80")
            .with("setpci -s 0000:01:00.1 CLASS", "040300");
        let source = SetpciSource::with_runner(runner);

        let report = crate::discovery::discover_gpu_root_ports(&source).unwrap();
        assert_eq!(report.source, "setpci");
        assert_eq!(report.results.len(), 1);
        assert_eq!(report.results[0].gpu, addr("0000:01:00.0"));
        assert_eq!(report.results[0].root_port, addr("0000:00:01.0"));
        assert!(report.skipped.is_empty());
    }
}
