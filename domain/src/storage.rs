//! Storage pool and volume descriptors.

use crate::descriptor::ImageFormat;
use crate::error::DomainError;
use crate::value::{Amount, Unit};
use serde::{Deserialize, Serialize};
use std::path::Path;
use uuid::Uuid;

const DEFAULT_CAPACITY_GIB: u64 = 10;
const QEMU_UID: &str = "107";
const QEMU_GID: &str = "107";
const IMAGE_MODE: &str = "0744";
const IMAGE_LABEL: &str = "virt_image_t";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageFormat {
    #[serde(rename = "@type")]
    pub format_type: ImageFormat,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoragePermissions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageTarget {
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<StorageFormat>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permissions: Option<StoragePermissions>,
}

/// A storage pool as reported by the hypervisor. Never authored locally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename = "pool")]
pub struct StoragePool {
    pub name: String,
    #[serde(default)]
    pub uuid: Option<Uuid>,
    pub capacity: Amount,
    pub allocation: Amount,
    pub available: Amount,
    pub target: StorageTarget,
}

impl StoragePool {
    pub fn from_xml(xml: &str) -> Result<Self, DomainError> {
        quick_xml::de::from_str(xml).map_err(|e| DomainError::Deserialization(e.to_string()))
    }

    pub fn target_path(&self) -> &Path {
        Path::new(&self.target.path)
    }
}

/// A disk image inside a storage pool.
///
/// The target path is always the image directory joined with the volume
/// name; there is no way to supply it separately.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename = "volume")]
pub struct StorageVolume {
    name: String,
    allocation: u64,
    capacity: Amount,
    target: StorageTarget,
}

impl StorageVolume {
    pub fn new(name: &str, image_dir: impl AsRef<Path>) -> Result<Self, DomainError> {
        if name.is_empty() {
            return Err(DomainError::InvalidInput("volume name is empty".to_string()));
        }
        if name.contains('/') || name == "." || name == ".." {
            return Err(DomainError::InvalidInput(format!(
                "volume name must be a single path component: {}",
                name
            )));
        }

        let path = image_dir.as_ref().join(name);

        Ok(Self {
            name: name.to_string(),
            allocation: 0,
            capacity: Amount::new(DEFAULT_CAPACITY_GIB, Unit::G),
            target: StorageTarget {
                path: path.to_string_lossy().into_owned(),
                format: Some(StorageFormat {
                    format_type: ImageFormat::Qcow2,
                }),
                permissions: Some(StoragePermissions {
                    owner: Some(QEMU_UID.to_string()),
                    group: Some(QEMU_GID.to_string()),
                    mode: Some(IMAGE_MODE.to_string()),
                    label: Some(IMAGE_LABEL.to_string()),
                }),
            },
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn allocation(&self) -> u64 {
        self.allocation
    }

    pub fn capacity(&self) -> Amount {
        self.capacity
    }

    pub fn target(&self) -> &StorageTarget {
        &self.target
    }

    pub fn path(&self) -> &str {
        &self.target.path
    }

    pub fn to_xml(&self) -> Result<String, DomainError> {
        quick_xml::se::to_string(self).map_err(|e| DomainError::Serialization(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gegen_core::size::GIB;

    const POOL_XML: &str = r#"<pool type='dir'>
  <name>default</name>
  <uuid>9f5a1c2e-3b4d-4e6f-8a7b-0c1d2e3f4a5b</uuid>
  <capacity unit='bytes'>107374182400</capacity>
  <allocation unit='bytes'>21474836480</allocation>
  <available unit='bytes'>85899345920</available>
  <source>
  </source>
  <target>
    <path>/var/lib/libvirt/images</path>
    <permissions>
      <mode>0711</mode>
      <owner>0</owner>
      <group>0</group>
    </permissions>
  </target>
</pool>"#;

    #[test]
    fn test_volume_path_is_derived() {
        let volume = StorageVolume::new("engine", "/var/lib/libvirt/images").unwrap();
        assert_eq!(volume.path(), "/var/lib/libvirt/images/engine");
        assert_eq!(volume.allocation(), 0);
        assert_eq!(volume.capacity().bytes(), 10 * GIB);
    }

    #[test]
    fn test_volume_rejects_bad_names() {
        for name in ["", "..", "a/b", "."] {
            let result = StorageVolume::new(name, "/images");
            assert!(matches!(result, Err(DomainError::InvalidInput(_))), "{name}");
        }
    }

    #[test]
    fn test_volume_xml() {
        let volume = StorageVolume::new("engine", "/images").unwrap();
        let xml = volume.to_xml().unwrap();

        assert!(xml.starts_with("<volume>"));
        assert!(xml.contains("<name>engine</name>"));
        assert!(xml.contains("<allocation>0</allocation>"));
        assert!(xml.contains(r#"<capacity unit="G">10</capacity>"#));
        assert!(xml.contains("<path>/images/engine</path>"));
        assert!(xml.contains(r#"<format type="qcow2"/>"#));
        assert!(xml.contains(
            "<permissions><owner>107</owner><group>107</group><mode>0744</mode><label>virt_image_t</label></permissions>"
        ));
    }

    #[test]
    fn test_pool_from_xml() {
        let pool = StoragePool::from_xml(POOL_XML).unwrap();
        assert_eq!(pool.name, "default");
        assert!(pool.uuid.is_some());
        assert_eq!(pool.available.bytes(), 80 * GIB);
        assert_eq!(pool.capacity.unit, Unit::Bytes);
        assert_eq!(pool.target_path(), Path::new("/var/lib/libvirt/images"));

        let permissions = pool.target.permissions.unwrap();
        assert_eq!(permissions.mode.as_deref(), Some("0711"));
        assert_eq!(permissions.label, None);
    }

    #[test]
    fn test_pool_from_garbage() {
        let result = StoragePool::from_xml("<pool><name>x</name></pool>");
        assert!(matches!(result, Err(DomainError::Deserialization(_))));
    }
}
