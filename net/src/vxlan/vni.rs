// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

use core::fmt::Display;
use std::fmt::Formatter;
use std::num::NonZero;

/// A [VXLAN][RFC7348] Network Identifier.
///
/// A `Vni` is a 24-bit value that identifies a VXLAN overlay network. Value
/// 0 is reserved and cannot be represented; use [`Vni::new_checked`] to
/// construct a legal value.
///
/// [RFC7348]: https://datatracker.ietf.org/doc/html/rfc7348#section-5
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[derive(serde::Deserialize, serde::Serialize)]
#[serde(try_from = "u32", into = "u32")]
#[repr(transparent)]
pub struct Vni(NonZero<u32>);

impl Vni {
    /// The minimum legal [`Vni`] value (1).
    pub const MIN: u32 = 1;
    /// The maximum legal [`Vni`] value (2<sup>24</sup> - 1).
    pub const MAX: u32 = 0x00FF_FFFF;

    /// Create a new [`Vni`] from a `u32`.
    ///
    /// # Errors
    ///
    /// Returns an [`InvalidVni`] error if the value is 0 or greater than
    /// [`Vni::MAX`].
    pub fn new_checked(vni: u32) -> Result<Vni, InvalidVni> {
        match NonZero::<u32>::new(vni) {
            None => Err(InvalidVni::ReservedZero),
            _ if vni > Vni::MAX => Err(InvalidVni::TooLarge(vni)),
            Some(vni) => Ok(Vni(vni)),
        }
    }

    /// Get the value of the [`Vni`] as a `u32`.
    #[must_use]
    pub fn as_u32(self) -> u32 {
        self.0.get()
    }
}

impl Display for Vni {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0.get())
    }
}

impl TryFrom<u32> for Vni {
    type Error = InvalidVni;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Vni::new_checked(value)
    }
}

impl From<Vni> for u32 {
    fn from(value: Vni) -> Self {
        value.as_u32()
    }
}

/// Errors which can occur when converting a `u32` to a [`Vni`].
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum InvalidVni {
    /// Zero is reserved.
    #[error("vni 0 is reserved")]
    ReservedZero,
    /// The value exceeds 24 bits.
    #[error("{0} exceeds the maximum legal vni ({max})", max = Vni::MAX)]
    TooLarge(u32),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legal_range() {
        assert!(Vni::new_checked(Vni::MIN).is_ok());
        assert!(Vni::new_checked(Vni::MAX).is_ok());
        assert_eq!(Vni::new_checked(0), Err(InvalidVni::ReservedZero));
        assert_eq!(
            Vni::new_checked(Vni::MAX + 1),
            Err(InvalidVni::TooLarge(Vni::MAX + 1))
        );
    }

    #[test]
    fn round_trip() {
        let vni = Vni::new_checked(4242).unwrap();
        assert_eq!(u32::from(vni), 4242);
        assert_eq!(vni.to_string(), "4242");
    }
}
