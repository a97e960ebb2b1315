// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Mac address type and logic.

use arrayvec::ArrayVec;
use std::fmt::Display;
use std::str::FromStr;

/// A [MAC Address] type.
///
/// Transparent wrapper around `[u8; 6]` adding the predicates and parsing
/// the simulation needs.
///
/// [MAC Address]: https://en.wikipedia.org/wiki/MAC_address
#[repr(transparent)]
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
#[serde(try_from = "String", into = "String")]
pub struct Mac(pub [u8; 6]);

impl Mac {
    /// The broadcast `Mac`.
    pub const BROADCAST: Mac = Mac([u8::MAX; 6]);
    /// The zero `Mac`; used as the placeholder target in ARP requests.
    pub const ZERO: Mac = Mac([0; 6]);

    /// Returns true iff every bit of the [`Mac`] is one.
    #[must_use]
    pub fn is_broadcast(&self) -> bool {
        self == &Mac::BROADCAST
    }

    /// Returns true iff the group bit (LSB of the first octet) is set.
    #[must_use]
    pub fn is_multicast(&self) -> bool {
        self.0[0] & 0x01 == 0x01
    }

    /// Returns true iff the group bit is clear.
    #[must_use]
    pub fn is_unicast(&self) -> bool {
        !self.is_multicast()
    }

    /// Returns true iff every bit of the [`Mac`] is zero.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self == &Mac::ZERO
    }
}

impl From<[u8; 6]> for Mac {
    fn from(value: [u8; 6]) -> Self {
        Mac(value)
    }
}

impl From<Mac> for [u8; 6] {
    fn from(value: Mac) -> Self {
        value.0
    }
}

impl AsRef<[u8; 6]> for Mac {
    fn as_ref(&self) -> &[u8; 6] {
        &self.0
    }
}

impl Display for Mac {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            self.0[0], self.0[1], self.0[2], self.0[3], self.0[4], self.0[5]
        )
    }
}

/// Errors which can occur while converting a string to a [`Mac`].
#[derive(Debug, thiserror::Error)]
pub enum MacFromStringError {
    /// Invalid string representation of mac address
    #[error("invalid string representation of mac address: {0}")]
    Invalid(String),
}

impl TryFrom<String> for Mac {
    type Error = MacFromStringError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Mac> for String {
    fn from(value: Mac) -> Self {
        value.to_string()
    }
}

impl FromStr for Mac {
    type Err = MacFromStringError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        const MAX_OCTETS: usize = 6;
        let octets = value
            .split(':')
            .try_fold(ArrayVec::<u8, MAX_OCTETS>::new(), |mut acc, octet| {
                if octet.len() != 2 || !octet.chars().all(|c| c.is_ascii_hexdigit()) {
                    return Err(MacFromStringError::Invalid(value.to_string()));
                }
                let parsed = u8::from_str_radix(octet, 16)
                    .map_err(|_| MacFromStringError::Invalid(value.to_string()))?;
                acc.try_push(parsed)
                    .map_err(|_| MacFromStringError::Invalid(value.to_string()))?;
                Ok(acc)
            })?;
        match octets.as_slice() {
            [o0, o1, o2, o3, o4, o5] => Ok(Mac([*o0, *o1, *o2, *o3, *o4, *o5])),
            _ => Err(MacFromStringError::Invalid(value.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_display() {
        let mac: Mac = "aa:bb:cc:00:11:22".parse().unwrap();
        assert_eq!(mac, Mac([0xaa, 0xbb, 0xcc, 0x00, 0x11, 0x22]));
        assert_eq!(mac.to_string(), "aa:bb:cc:00:11:22");
    }

    #[test]
    fn parse_rejects_malformed() {
        assert!("aa:bb:cc:00:11".parse::<Mac>().is_err());
        assert!("aa:bb:cc:00:11:22:33".parse::<Mac>().is_err());
        assert!("aa:bb:cc:00:11:zz".parse::<Mac>().is_err());
        assert!("aabb:cc:00:11:22".parse::<Mac>().is_err());
    }

    #[test]
    fn predicates() {
        assert!(Mac::BROADCAST.is_broadcast());
        assert!(Mac::BROADCAST.is_multicast());
        assert!(Mac([0x01, 0, 0x5e, 0, 0, 1]).is_multicast());
        assert!(Mac([0xaa, 0, 0, 0, 0, 1]).is_unicast());
        assert!(Mac::ZERO.is_zero());
    }
}
