//! Hardware address generation for guest network interfaces.

use crate::error::DomainError;
use rand::TryRngCore;
use rand::rngs::OsRng;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

const MULTICAST_BIT: u8 = 0b0000_0001;
const LOCAL_BIT: u8 = 0b0000_0010;

/// A 6-byte MAC address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MacAddress([u8; 6]);

impl MacAddress {
    pub fn new(octets: [u8; 6]) -> Self {
        Self(octets)
    }

    /// Generates a locally administered unicast address from the OS entropy source.
    pub fn generate() -> Result<Self, DomainError> {
        Self::generate_with(&mut OsRng)
    }

    /// Generates a locally administered unicast address from `rng`.
    pub fn generate_with<R: TryRngCore + ?Sized>(rng: &mut R) -> Result<Self, DomainError> {
        let mut octets = [0u8; 6];
        rng.try_fill_bytes(&mut octets)
            .map_err(|e| DomainError::RandomnessUnavailable(e.to_string()))?;

        octets[0] = (octets[0] | LOCAL_BIT) & !MULTICAST_BIT;

        let mac = Self(octets);
        tracing::debug!(mac = %mac, "Generated MAC address");
        Ok(mac)
    }

    pub fn octets(&self) -> [u8; 6] {
        self.0
    }

    /// True when the address is unicast and locally administered.
    pub fn is_local_unicast(&self) -> bool {
        self.0[0] & (LOCAL_BIT | MULTICAST_BIT) == LOCAL_BIT
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

impl FromStr for MacAddress {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut octets = [0u8; 6];
        let mut groups = s.split(':');

        for octet in octets.iter_mut() {
            let group = groups
                .next()
                .ok_or_else(|| DomainError::InvalidMac(s.to_string()))?;
            if group.len() != 2 {
                return Err(DomainError::InvalidMac(s.to_string()));
            }
            *octet = u8::from_str_radix(group, 16)
                .map_err(|_| DomainError::InvalidMac(s.to_string()))?;
        }

        if groups.next().is_some() {
            return Err(DomainError::InvalidMac(s.to_string()));
        }

        Ok(Self(octets))
    }
}

impl Serialize for MacAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for MacAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        value.parse().map_err(serde::de::Error::custom)
    }
}
