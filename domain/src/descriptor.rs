//! Domain descriptor model.
//!
//! These types serialize to the libvirt domain XML schema. Element and
//! attribute names are part of the wire contract with the hypervisor.

use crate::error::DomainError;
use crate::mac::MacAddress;
use crate::value::Amount;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

xml_enum! {
    #[derive(Default)]
    pub enum DomainType {
        #[default]
        Kvm => "kvm",
    }
}

xml_enum! {
    #[derive(Default)]
    pub enum Placement {
        #[default]
        Static => "static",
        Auto => "auto",
    }
}

xml_enum! {
    /// Action taken when the guest powers off, reboots or crashes.
    #[derive(Default)]
    pub enum LifecycleAction {
        #[default]
        Destroy => "destroy",
        Restart => "restart",
        Preserve => "preserve",
        RenameRestart => "rename-restart",
    }
}

xml_enum! {
    #[derive(Default)]
    pub enum ClockOffset {
        #[default]
        Utc => "utc",
        Localtime => "localtime",
    }
}

xml_enum! {
    #[derive(Default)]
    pub enum BootType {
        #[default]
        Hvm => "hvm",
    }
}

xml_enum! {
    pub enum CacheMode {
        None => "none",
        Writeback => "writeback",
        Writethrough => "writethrough",
        Directsync => "directsync",
        Unsafe => "unsafe",
    }
}

xml_enum! {
    pub enum IoMode {
        Native => "native",
        Threads => "threads",
        IoUring => "io_uring",
    }
}

xml_enum! {
    pub enum ImageFormat {
        Raw => "raw",
        Qcow2 => "qcow2",
    }
}

xml_enum! {
    pub enum DiskBus {
        Virtio => "virtio",
        Sata => "sata",
        Scsi => "scsi",
        Ide => "ide",
    }
}

xml_enum! {
    /// Optional hypervisor features exposed to the guest.
    pub enum Feature {
        Acpi => "acpi",
        Apic => "apic",
        Pae => "pae",
    }
}

/// A complete guest domain description.
///
/// The UUID is assigned when the descriptor is created and has no setter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename = "domain")]
pub struct Domain {
    #[serde(rename = "@type")]
    pub domain_type: DomainType,
    pub name: String,
    uuid: Uuid,
    pub memory: Amount,
    #[serde(rename = "currentMemory")]
    pub current_memory: Amount,
    pub vcpu: Vcpu,
    pub on_poweroff: LifecycleAction,
    pub on_reboot: LifecycleAction,
    pub on_crash: LifecycleAction,
    pub os: Os,
    pub cpu: Cpu,
    pub clock: Clock,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub features: Option<Features>,
    pub devices: Devices,
}

impl Domain {
    /// Assembles a descriptor with a freshly generated UUID.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        name: String,
        memory: Amount,
        current_memory: Amount,
        vcpu: Vcpu,
        os: Os,
        cpu: Cpu,
        features: Option<Features>,
        devices: Devices,
    ) -> Self {
        Self {
            domain_type: DomainType::Kvm,
            name,
            uuid: Uuid::new_v4(),
            memory,
            current_memory,
            vcpu,
            on_poweroff: LifecycleAction::Destroy,
            on_reboot: LifecycleAction::Destroy,
            on_crash: LifecycleAction::Destroy,
            os,
            cpu,
            clock: Clock::default(),
            features,
            devices,
        }
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn to_xml(&self) -> Result<String, DomainError> {
        quick_xml::se::to_string(self).map_err(|e| DomainError::Serialization(e.to_string()))
    }

    pub fn from_xml(xml: &str) -> Result<Self, DomainError> {
        quick_xml::de::from_str(xml).map_err(|e| DomainError::Deserialization(e.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vcpu {
    #[serde(rename = "@placement")]
    pub placement: Placement,
    #[serde(rename = "$text")]
    pub count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Os {
    #[serde(rename = "type")]
    pub os_type: OsType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kernel: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initrd: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cmdline: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub init: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OsType {
    #[serde(rename = "@arch")]
    pub arch: String,
    #[serde(rename = "@machine")]
    pub machine: String,
    #[serde(rename = "$text")]
    pub boot: BootType,
}

/// CPU description, shared by domain documents and host capabilities.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cpu {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<CpuModel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vendor: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpuModel {
    #[serde(rename = "@fallback", default, skip_serializing_if = "Option::is_none")]
    pub fallback: Option<String>,
    #[serde(rename = "$text")]
    pub name: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Clock {
    #[serde(rename = "@offset")]
    pub offset: ClockOffset,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Empty {}

/// Feature flags render as empty marker elements, e.g. `<features><acpi/></features>`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Features {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acpi: Option<Empty>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub apic: Option<Empty>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pae: Option<Empty>,
}

impl Features {
    pub fn enable(&mut self, feature: Feature) {
        let slot = match feature {
            Feature::Acpi => &mut self.acpi,
            Feature::Apic => &mut self.apic,
            Feature::Pae => &mut self.pae,
        };
        *slot = Some(Empty {});
    }

    pub fn is_enabled(&self, feature: Feature) -> bool {
        match feature {
            Feature::Acpi => self.acpi.is_some(),
            Feature::Apic => self.apic.is_some(),
            Feature::Pae => self.pae.is_some(),
        }
    }
}

impl FromIterator<Feature> for Features {
    fn from_iter<I: IntoIterator<Item = Feature>>(iter: I) -> Self {
        let mut features = Features::default();
        for feature in iter {
            features.enable(feature);
        }
        features
    }
}

/// Devices attached to the guest. The builder always produces exactly one
/// disk and one interface; the lists leave room for more.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Devices {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emulator: Option<String>,
    #[serde(default)]
    pub disk: Vec<Disk>,
    #[serde(default)]
    pub interface: Vec<Interface>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Disk {
    #[serde(rename = "@type")]
    pub disk_type: String,
    #[serde(rename = "@device")]
    pub device: String,
    pub driver: DiskDriver,
    pub source: DiskSource,
    pub target: DiskTarget,
}

impl Disk {
    /// A file-backed disk with the given driver hints.
    pub fn file(path: impl Into<String>, driver: DiskDriver, target: DiskTarget) -> Self {
        Self {
            disk_type: "file".to_string(),
            device: "disk".to_string(),
            driver,
            source: DiskSource { file: path.into() },
            target,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskDriver {
    #[serde(rename = "@name")]
    pub name: String,
    #[serde(rename = "@type")]
    pub format: ImageFormat,
    #[serde(rename = "@cache")]
    pub cache: CacheMode,
    #[serde(rename = "@io")]
    pub io: IoMode,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskSource {
    #[serde(rename = "@file")]
    pub file: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskTarget {
    #[serde(rename = "@dev")]
    pub dev: String,
    #[serde(rename = "@bus")]
    pub bus: DiskBus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interface {
    #[serde(rename = "@type")]
    pub interface_type: String,
    pub mac: InterfaceMac,
    pub source: InterfaceSource,
    pub model: InterfaceModel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<Alias>,
}

impl Interface {
    /// An interface attached to a named virtual network.
    ///
    /// Fails with [`DomainError::InvalidMac`] unless `mac` is a locally
    /// administered unicast address.
    pub fn network(
        mac: MacAddress,
        network: impl Into<String>,
        bridge: Option<String>,
        model: impl Into<String>,
        alias: Option<String>,
    ) -> Result<Self, DomainError> {
        if !mac.is_local_unicast() {
            return Err(DomainError::InvalidMac(format!(
                "{} is not a locally administered unicast address",
                mac
            )));
        }

        Ok(Self {
            interface_type: "network".to_string(),
            mac: InterfaceMac { address: mac },
            source: InterfaceSource {
                network: network.into(),
                bridge,
            },
            model: InterfaceModel {
                model_type: model.into(),
            },
            alias: alias.map(|name| Alias { name }),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceMac {
    #[serde(rename = "@address")]
    pub address: MacAddress,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceSource {
    #[serde(rename = "@network")]
    pub network: String,
    #[serde(rename = "@bridge", default, skip_serializing_if = "Option::is_none")]
    pub bridge: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceModel {
    #[serde(rename = "@type")]
    pub model_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alias {
    #[serde(rename = "@name")]
    pub name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interface_rejects_multicast_mac() {
        let mac = MacAddress::new([0x03, 0x11, 0x22, 0x33, 0x44, 0x55]);
        let result = Interface::network(mac, "default", None, "virtio", None);
        assert!(matches!(result, Err(DomainError::InvalidMac(_))));
    }

    #[test]
    fn test_features_from_iter() {
        let features: Features = [Feature::Acpi, Feature::Apic].into_iter().collect();
        assert!(features.is_enabled(Feature::Acpi));
        assert!(features.is_enabled(Feature::Apic));
        assert!(!features.is_enabled(Feature::Pae));
    }

    #[test]
    fn test_lifecycle_action_text() {
        assert_eq!(LifecycleAction::RenameRestart.to_string(), "rename-restart");
        assert_eq!(
            "preserve".parse::<LifecycleAction>().unwrap(),
            LifecycleAction::Preserve
        );
    }
}
