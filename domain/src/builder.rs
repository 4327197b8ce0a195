use crate::capabilities::Capabilities;
use crate::descriptor::*;
use crate::error::DomainError;
use crate::mac::MacAddress;
use crate::value::{Amount, Unit};
use rand::TryRngCore;
use rand::rngs::OsRng;

const VCPU_COUNT: u32 = 2;
const MEMORY_GB: u64 = 4;
const CURRENT_MEMORY_GB: u64 = 2;
const ARCH: &str = "x86_64";
const MACHINE: &str = "pc";
const EMULATOR: &str = "/usr/bin/qemu-kvm";
const DISK_DRIVER: &str = "qemu";
const DISK_TARGET: &str = "vda";
const DEFAULT_NETWORK: &str = "default";
const DEFAULT_BRIDGE: &str = "virbr0";
const NIC_MODEL: &str = "virtio";
const NIC_ALIAS: &str = "net0";

/// Kernel, initrd and command line for direct kernel boot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectBoot {
    pub kernel: String,
    pub initrd: Option<String>,
    pub cmdline: Option<String>,
    pub init: Option<String>,
}

/// Assembles a [`Domain`] from a name, a disk image path and the host
/// capabilities.
///
/// CPU model and vendor are copied from the capabilities as-is; when the host
/// does not report them the domain does not carry them either.
#[derive(Debug, Clone)]
pub struct DomainBuilder<'a> {
    name: String,
    disk_path: String,
    capabilities: &'a Capabilities,
    network: String,
    bridge: Option<String>,
    direct_boot: Option<DirectBoot>,
    features: Vec<Feature>,
}

impl<'a> DomainBuilder<'a> {
    pub fn new(
        name: impl Into<String>,
        disk_path: impl Into<String>,
        capabilities: &'a Capabilities,
    ) -> Self {
        Self {
            name: name.into(),
            disk_path: disk_path.into(),
            capabilities,
            network: DEFAULT_NETWORK.to_string(),
            bridge: Some(DEFAULT_BRIDGE.to_string()),
            direct_boot: None,
            features: Vec::new(),
        }
    }

    pub fn network(mut self, network: impl Into<String>, bridge: Option<String>) -> Self {
        self.network = network.into();
        self.bridge = bridge;
        self
    }

    pub fn direct_boot(mut self, boot: DirectBoot) -> Self {
        self.direct_boot = Some(boot);
        self
    }

    pub fn feature(mut self, feature: Feature) -> Self {
        self.features.push(feature);
        self
    }

    pub fn build(self) -> Result<Domain, DomainError> {
        self.build_with(&mut OsRng)
    }

    /// Builds the descriptor, drawing the interface MAC address from `rng`.
    pub fn build_with<R: TryRngCore + ?Sized>(self, rng: &mut R) -> Result<Domain, DomainError> {
        if self.name.is_empty() {
            return Err(DomainError::InvalidInput("domain name is empty".to_string()));
        }
        if self.disk_path.is_empty() {
            return Err(DomainError::InvalidInput("disk path is empty".to_string()));
        }
        if let Some(boot) = &self.direct_boot
            && boot.kernel.is_empty()
        {
            return Err(DomainError::InvalidInput("kernel path is empty".to_string()));
        }

        let mac = MacAddress::generate_with(rng)?;

        let host_cpu = &self.capabilities.host.cpu;
        let cpu = Cpu {
            arch: None,
            model: host_cpu.model.clone(),
            vendor: host_cpu.vendor.clone(),
        };

        let boot = self.direct_boot.unwrap_or_default();
        let os = Os {
            os_type: OsType {
                arch: ARCH.to_string(),
                machine: MACHINE.to_string(),
                boot: BootType::Hvm,
            },
            kernel: Some(boot.kernel).filter(|k| !k.is_empty()),
            initrd: boot.initrd,
            cmdline: boot.cmdline,
            init: boot.init,
        };

        let disk = Disk::file(
            self.disk_path,
            DiskDriver {
                name: DISK_DRIVER.to_string(),
                format: ImageFormat::Qcow2,
                cache: CacheMode::None,
                io: IoMode::Native,
            },
            DiskTarget {
                dev: DISK_TARGET.to_string(),
                bus: DiskBus::Virtio,
            },
        );

        let interface = Interface::network(
            mac,
            self.network,
            self.bridge,
            NIC_MODEL,
            Some(NIC_ALIAS.to_string()),
        )?;

        let features = if self.features.is_empty() {
            None
        } else {
            Some(self.features.into_iter().collect())
        };

        let domain = Domain::new(
            self.name,
            Amount::new(MEMORY_GB, Unit::Gb),
            Amount::new(CURRENT_MEMORY_GB, Unit::Gb),
            Vcpu {
                placement: Placement::Static,
                count: VCPU_COUNT,
            },
            os,
            cpu,
            features,
            Devices {
                emulator: Some(EMULATOR.to_string()),
                disk: vec![disk],
                interface: vec![interface],
            },
        );

        tracing::debug!(
            name = %domain.name,
            uuid = %domain.uuid(),
            mac = %mac,
            "Built domain descriptor"
        );

        Ok(domain)
    }
}
