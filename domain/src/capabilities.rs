//! Host capability document, read once per run from the hypervisor.

use crate::descriptor::Cpu;
use crate::error::DomainError;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename = "capabilities")]
pub struct Capabilities {
    pub host: Host,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Host {
    #[serde(default)]
    pub uuid: Option<Uuid>,
    #[serde(default)]
    pub cpu: Cpu,
}

impl Capabilities {
    pub fn from_xml(xml: &str) -> Result<Self, DomainError> {
        quick_xml::de::from_str(xml).map_err(|e| DomainError::Deserialization(e.to_string()))
    }

    pub fn to_xml(&self) -> Result<String, DomainError> {
        quick_xml::se::to_string(self).map_err(|e| DomainError::Serialization(e.to_string()))
    }
}
