//! Small value types shared by the descriptor documents.

use gegen_core::size::{GB, GIB, KB, KIB, MB, MIB, TB, TIB};
use serde::{Deserialize, Serialize};

/// Declares a closed set of keywords that travel as plain strings in the
/// descriptor documents, whether they end up in an attribute or element text.
macro_rules! xml_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $($(#[$vmeta:meta])* $variant:ident => $text:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        $vis enum $name {
            $($(#[$vmeta])* $variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = crate::DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    other => Err(crate::DomainError::Deserialization(format!(
                        "unknown {} value: {}",
                        stringify!($name),
                        other
                    ))),
                }
            }
        }

        impl serde::Serialize for $name {
            fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.as_str())
            }
        }

        impl<'de> serde::Deserialize<'de> for $name {
            fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let value = String::deserialize(deserializer)?;
                value.trim().parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

xml_enum! {
    /// Size units understood by the hypervisor. The single-letter forms are
    /// binary multiples, matching the libvirt convention.
    pub enum Unit {
        Bytes => "bytes",
        B => "b",
        Kib => "KiB",
        Mib => "MiB",
        Gib => "GiB",
        Tib => "TiB",
        Kb => "KB",
        Mb => "MB",
        Gb => "GB",
        Tb => "TB",
        K => "K",
        M => "M",
        G => "G",
        T => "T",
    }
}

impl Unit {
    pub fn multiplier(&self) -> u64 {
        match self {
            Unit::Bytes | Unit::B => 1,
            Unit::Kib | Unit::K => KIB,
            Unit::Mib | Unit::M => MIB,
            Unit::Gib | Unit::G => GIB,
            Unit::Tib | Unit::T => TIB,
            Unit::Kb => KB,
            Unit::Mb => MB,
            Unit::Gb => GB,
            Unit::Tb => TB,
        }
    }
}

/// A magnitude with its unit, e.g. `<memory unit="GB">4</memory>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Amount {
    #[serde(rename = "@unit")]
    pub unit: Unit,
    #[serde(rename = "$text")]
    pub value: u64,
}

impl Amount {
    pub fn new(value: u64, unit: Unit) -> Self {
        Self { unit, value }
    }

    pub fn bytes(&self) -> u64 {
        self.value.saturating_mul(self.unit.multiplier())
    }
}
