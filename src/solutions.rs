//! Baseline solutions published by the tracker.

use crate::coordinate::Coordinate;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Quality grade attached to every published baseline.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Confidence {
    /// Solved from five or more double differences, drift estimated.
    Good,
    /// Solved from exactly four double differences, no drift term.
    Fair,
    /// Carried forward on the last known baseline velocity; the
    /// payload counts the epochs extrapolated over so far.
    Extrapolated(u32),
    /// No trustworthy baseline: tracking just (re)started, diverged,
    /// or the outage limit was exceeded.
    #[default]
    Bad,
}

impl Confidence {
    /// True when the solution came from an actual solve this epoch.
    pub fn is_solved(&self) -> bool {
        matches!(self, Confidence::Good | Confidence::Fair)
    }
}

/// Relative position of a remote receiver with respect to the local
/// one, for one epoch.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BaselineResult {
    /// Remote receiver identifier.
    pub peer: String,
    /// Integer-second GPS epoch of the solution.
    pub epoch: i64,
    /// ECEF vector from local to remote, meters.
    pub baseline: Coordinate,
    pub confidence: Confidence,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn solved_grades() {
        assert!(Confidence::Good.is_solved());
        assert!(Confidence::Fair.is_solved());
        assert!(!Confidence::Extrapolated(2).is_solved());
        assert!(!Confidence::Bad.is_solved());
        assert_eq!(Confidence::default(), Confidence::Bad);
    }
}
