//! Validated satellite identity.

use crate::error::Error;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Highest PRN this crate will track (GPS + SBAS).
pub const MAX_PRN: u8 = 71;

/// Highest PRN assigned to the GPS constellation; anything above is SBAS.
pub const MAX_GPS_PRN: u8 = 32;

/// Satellite pseudo-random-noise identifier, validated to 1..=71 at
/// construction. GPS vehicles occupy 1..=32, SBAS vehicles 33..=71.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Prn(u8);

impl Prn {
    /// Builds a [Prn], rejecting values outside the supported range.
    pub fn new(prn: u8) -> Result<Self, Error> {
        if prn == 0 || prn > MAX_PRN {
            return Err(Error::InvalidPrn(prn));
        }
        Ok(Self(prn))
    }

    /// Raw PRN number.
    pub fn get(&self) -> u8 {
        self.0
    }

    /// True for SBAS vehicles (PRN above the GPS range).
    pub fn is_sbas(&self) -> bool {
        self.0 > MAX_GPS_PRN
    }
}

impl std::fmt::Display for Prn {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        if self.is_sbas() {
            write!(f, "S{:02}", self.0)
        } else {
            write!(f, "G{:02}", self.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validated_range() {
        assert!(Prn::new(0).is_err());
        assert!(Prn::new(72).is_err());
        assert_eq!(Prn::new(1).unwrap().get(), 1);
        assert_eq!(Prn::new(71).unwrap().get(), 71);
    }

    #[test]
    fn sbas_split() {
        assert!(!Prn::new(32).unwrap().is_sbas());
        assert!(Prn::new(33).unwrap().is_sbas());
        assert_eq!(format!("{}", Prn::new(7).unwrap()), "G07");
        assert_eq!(format!("{}", Prn::new(38).unwrap()), "S38");
    }
}
