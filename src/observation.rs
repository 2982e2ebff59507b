//! Raw receiver records and the per-epoch processed product.

use std::collections::HashMap;

use crate::{coordinate::Coordinate, ephemeris::EphemerisDatum, prn::Prn, time::GpsTime};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// One channel's raw measurement as delivered by the receiver, before
/// any filtering or correction.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RawObservation {
    pub prn: Prn,
    /// Pseudorange, meters.
    pub pseudorange: f64,
    /// Accumulated carrier phase, cycles.
    pub carrier_phase: f64,
    /// Doppler shift, Hz.
    pub doppler_shift: f64,
    /// Carrier-to-noise density, dB-Hz.
    pub signal_strength: f64,
    /// Receiver tracking quality indicator.
    pub quality: i32,
    /// Loss-of-lock word. Bit 0 flags a lock break since the previous
    /// epoch, bit 1 a possible half-cycle ambiguity.
    pub loss_of_lock: u32,
}

/// All raw channel measurements sharing one receive time.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RawObservations {
    pub receive_time: GpsTime,
    pub observations: Vec<RawObservation>,
}

/// Receiver-reported clock solution for one epoch.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RawClockData {
    /// Receiver clock bias, seconds.
    pub clock_bias: f64,
    /// Receiver clock drift, s/s.
    pub clock_drift: f64,
    pub time_accuracy: f64,
    pub freq_accuracy: f64,
}

/// Receiver-reported navigation solution for one epoch.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RawNavData {
    pub receive_time: GpsTime,
    /// Fix type as reported; anything below 2 (2D) is unusable.
    pub gps_fix: i32,
    /// Standalone ECEF position, meters.
    pub position: Coordinate,
    pub position_accuracy: f64,
    /// ECEF velocity, m/s.
    pub velocity: [f64; 3],
    pub speed_accuracy: f64,
    pub pdop: f64,
}

/// One satellite's measurement after preprocessing, with the ephemeris
/// snapshot it was corrected against.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SatelliteObservation {
    pub ephemeris: EphemerisDatum,
    /// Pseudorange, meters.
    pub pseudorange: f64,
    /// Carrier phase scaled to meters.
    pub carrier_range: f64,
    /// Doppler shift, Hz.
    pub doppler_shift: f64,
    /// Carrier-to-noise density, dB-Hz.
    pub signal_strength: f64,
    /// The receiver may be off by half a cycle on this channel.
    pub half_cycle_ambiguity: bool,
    /// A cycle slip was detected at this epoch.
    pub cycle_slip: bool,
}

/// Per-PRN map of processed observations for one epoch.
#[derive(Debug, Default, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ObservationSet {
    collection: HashMap<Prn, SatelliteObservation>,
}

impl ObservationSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, prn: Prn, observation: SatelliteObservation) {
        self.collection.insert(prn, observation);
    }

    pub fn get(&self, prn: Prn) -> Option<&SatelliteObservation> {
        self.collection.get(&prn)
    }

    pub fn get_mut(&mut self, prn: Prn) -> Option<&mut SatelliteObservation> {
        self.collection.get_mut(&prn)
    }

    pub fn remove(&mut self, prn: Prn) -> Option<SatelliteObservation> {
        self.collection.remove(&prn)
    }

    pub fn contains(&self, prn: Prn) -> bool {
        self.collection.contains_key(&prn)
    }

    pub fn len(&self) -> usize {
        self.collection.len()
    }

    pub fn is_empty(&self) -> bool {
        self.collection.is_empty()
    }

    pub fn prns(&self) -> impl Iterator<Item = Prn> + '_ {
        self.collection.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Prn, &SatelliteObservation)> {
        self.collection.iter().map(|(prn, obs)| (*prn, obs))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (Prn, &mut SatelliteObservation)> {
        self.collection.iter_mut().map(|(prn, obs)| (*prn, obs))
    }

    pub fn values(&self) -> impl Iterator<Item = &SatelliteObservation> {
        self.collection.values()
    }

    /// Drops every observation the predicate rejects.
    pub fn retain(&mut self, keep: impl FnMut(&Prn, &mut SatelliteObservation) -> bool) {
        self.collection.retain(keep);
    }
}

/// The preprocessor's per-epoch product for one receiver: corrected
/// observations, the standalone position and the receiver clock state.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ProcessedData {
    /// Receiver identifier.
    pub id: String,
    /// Integer-second epoch the observations were extrapolated to.
    pub receive_epoch: i64,
    /// Estimated receiver clock bias, seconds.
    pub receiver_clock_bias: f64,
    /// Receiver clock drift, s/s.
    pub receiver_clock_drift: f64,
    pub pdop: f64,
    pub position_accuracy: f64,
    /// Standalone absolute position.
    pub absolute_location: Coordinate,
    pub observations: ObservationSet,
}

impl ProcessedData {
    pub fn new(id: impl Into<String>, receive_epoch: i64, absolute_location: Coordinate) -> Self {
        Self {
            id: id.into(),
            receive_epoch,
            receiver_clock_bias: 0.0,
            receiver_clock_drift: 0.0,
            pdop: 0.0,
            position_accuracy: 0.0,
            absolute_location,
            observations: ObservationSet::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn observation() -> SatelliteObservation {
        SatelliteObservation {
            ephemeris: EphemerisDatum::new(Prn::new(12).unwrap()),
            pseudorange: 2.2E7,
            carrier_range: 2.2E7,
            doppler_shift: 1000.0,
            signal_strength: 45.0,
            half_cycle_ambiguity: false,
            cycle_slip: false,
        }
    }

    #[test]
    fn set_keys_are_unique() {
        let prn = Prn::new(12).unwrap();
        let mut set = ObservationSet::new();
        set.insert(prn, observation());
        set.insert(prn, observation());
        assert_eq!(set.len(), 1);
        assert!(set.contains(prn));
        assert!(set.remove(prn).is_some());
        assert!(set.is_empty());
    }

    #[test]
    fn retain_filters() {
        let mut set = ObservationSet::new();
        for prn in [3_u8, 14, 27] {
            let mut obs = observation();
            obs.signal_strength = f64::from(prn);
            set.insert(Prn::new(prn).unwrap(), obs);
        }
        set.retain(|_, obs| obs.signal_strength > 10.0);
        assert_eq!(set.len(), 2);
        assert!(!set.contains(Prn::new(3).unwrap()));
    }
}
